//! Headless rendering without a window.
//!
//! Each call creates its own GPU context, so these functions suit tests,
//! batch jobs and command-line tools rather than interactive use.

use std::path::Path;
use std::sync::Arc;

use ibrelight_core::{LoadingMonitor, ViewSet};
use ibrelight_gl::{ColorReadback, Context, FramebufferSize, ImageFileFormat};
use ibrelight_scene::{
    ProjectRenderingEngine, QueueSummary, RenderRequest, RequestQueue, RequestTarget,
    VertexShaderChoice,
};

use crate::error::Result;
use crate::mesh::MeshData;
use crate::project::ProjectDescription;

fn build_engine(
    context: &Context,
    project: &ProjectDescription,
    mesh: &MeshData,
    width: u32,
    height: u32,
) -> Result<ProjectRenderingEngine> {
    let geometry = mesh.upload(context)?;
    let (centroid, scale) = mesh.bounds();
    let scene = project.scene_model(centroid, scale).into_shared();
    let mut engine = ProjectRenderingEngine::new(
        context.clone(),
        Arc::new(project.views.clone()),
        scene,
        &geometry,
        project.settings.clone(),
        FramebufferSize::new(width, height),
    )?;
    engine.initialize()?;
    engine.update()?;
    Ok(engine)
}

fn render_frame(mut engine: ProjectRenderingEngine) -> Result<ColorReadback> {
    engine.render_frame()?;
    let frame = engine.read_frame()?;
    engine.close();
    Ok(frame)
}

/// Renders one frame from the first captured view into an RGBA8 readback.
///
/// # Example
/// ```no_run
/// use ibrelight::*;
///
/// let project = ProjectDescription::load("project.json").unwrap();
/// let mesh = MeshData::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![Vec3::Z; 3]);
/// let frame = render_to_image(&project, &mesh, 800, 600).unwrap();
/// assert_eq!(frame.data().len(), 800 * 600 * 4);
/// ```
pub fn render_to_image(
    project: &ProjectDescription,
    mesh: &MeshData,
    width: u32,
    height: u32,
) -> Result<ColorReadback> {
    let context = Context::new_headless(width, height)?;
    render_frame(build_engine(&context, project, mesh, width, height)?)
}

/// Renders one frame through captured view `index`.
pub fn render_view_to_image(
    project: &ProjectDescription,
    mesh: &MeshData,
    index: usize,
    width: u32,
    height: u32,
) -> Result<ColorReadback> {
    let view = project.views.view(index)?;
    let context = Context::new_headless(width, height)?;
    let mut engine = build_engine(&context, project, mesh, width, height)?;
    engine.set_camera(view.pose, view.projection.to_matrix());
    render_frame(engine)
}

/// Renders one frame and saves it; the format follows the file extension,
/// falling back to PNG.
pub fn render_to_file(
    project: &ProjectDescription,
    mesh: &MeshData,
    path: impl AsRef<Path>,
    width: u32,
    height: u32,
) -> Result<()> {
    let path = path.as_ref();
    let format = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(ImageFileFormat::from_extension)
        .unwrap_or(ImageFileFormat::Png);
    render_to_image(project, mesh, width, height)?.save(path, format)?;
    log::info!("saved {width}x{height} frame to {}", path.display());
    Ok(())
}

/// Renders every captured view through the camera with `fragment_shader` and
/// writes one PNG per view into `output_directory`.
pub fn render_views_to_directory(
    project: &ProjectDescription,
    mesh: &MeshData,
    fragment_shader: impl AsRef<Path>,
    output_directory: impl AsRef<Path>,
    size: FramebufferSize,
    monitor: Arc<dyn LoadingMonitor>,
) -> Result<QueueSummary> {
    let context = Context::new_headless(size.width, size.height)?;
    let views: Arc<dyn ViewSet> = Arc::new(project.views.clone());
    let target = RequestTarget {
        context: context.clone(),
        views,
        settings: project.settings.clone(),
        geometry: Some(mesh.upload(&context)?),
    };
    let request = RenderRequest::builder(
        fragment_shader.as_ref(),
        output_directory.as_ref(),
    )
    .width(size.width)
    .height(size.height)
    .vertex_shader(VertexShaderChoice::CameraSpace)
    .build();

    let queue: RequestQueue = RequestQueue::new();
    queue.enqueue(Box::new(request));
    Ok(queue.execute_queue(&target, &monitor))
}
