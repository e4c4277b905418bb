//! Headless GPU tests of the render graph.
//!
//! These need a GPU adapter (real or software fallback). Without one, each test
//! prints a note to stderr and returns early.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use glam::{Mat4, Vec3};
use ibrelight_core::{
    CameraViewport, LoadingMonitor, NullMonitor, RenderSettings, ViewSet, ViewSetData,
};
use ibrelight_gl::{
    AttachmentSpec, ColorFormat, Context, DepthPrecision, Framebuffer, FramebufferSize,
    GraphicsResource,
};
use ibrelight_scene::*;

fn context() -> Option<Context> {
    match Context::new_headless(4, 4) {
        Ok(context) => Some(context),
        Err(e) => {
            eprintln!("Skipping GPU test: no adapter available ({e})");
            None
        }
    }
}

fn settings() -> RenderSettings {
    RenderSettings {
        shader_directory: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/../../shaders")),
        shadow_map_resolution: 64,
        screen_space_depth_resolution: 32,
        subdivision_width: 16,
        subdivision_height: 16,
        ..RenderSettings::default()
    }
}

fn views() -> Arc<dyn ViewSet> {
    Arc::new(ViewSetData::from_poses([
        Mat4::look_at_rh(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO, Vec3::Y),
        Mat4::look_at_rh(Vec3::new(3.0, 0.0, 0.0), Vec3::ZERO, Vec3::Y),
    ]))
}

/// One triangle facing +Z, with texture coordinates.
fn geometry(context: &Context) -> SubjectGeometry {
    let positions = [-0.5, -0.5, 0.0, 0.5, -0.5, 0.0, 0.0, 0.5, 0.0];
    let normals = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0];
    let tex_coords = [0.0, 0.0, 1.0, 0.0, 0.5, 1.0];
    SubjectGeometry {
        position: Rc::new(context.create_vertex_buffer(3, &positions).unwrap()),
        normal: Rc::new(context.create_vertex_buffer(3, &normals).unwrap()),
        tex_coord: Some(Rc::new(context.create_vertex_buffer(2, &tex_coords).unwrap())),
    }
}

fn engine(context: &Context, settings: RenderSettings) -> ProjectRenderingEngine {
    ProjectRenderingEngine::new(
        context.clone(),
        views(),
        SceneModel::default().into_shared(),
        &geometry(context),
        settings,
        FramebufferSize::new(40, 24),
    )
    .expect("engine assembly should not touch the GPU")
}

#[test]
fn test_engine_renders_tiled_frame() {
    let Some(context) = context() else { return };
    let mut engine = engine(&context, settings());
    engine.initialize().unwrap();
    engine.update().unwrap();
    engine.render_frame().unwrap();

    assert!(engine.last_draw_error().is_none());
    let frame = engine.read_frame().unwrap();
    assert_eq!((frame.width(), frame.height()), (40, 24));
}

#[test]
fn test_half_resolution_reallocates_frame() {
    let Some(context) = context() else { return };
    let mut engine = engine(&context, settings());
    engine.initialize().unwrap();

    let mut half = settings();
    half.half_resolution_enabled = true;
    engine.set_settings(half).unwrap();
    engine.render_frame().unwrap();
    let frame = engine.read_frame().unwrap();
    assert_eq!((frame.width(), frame.height()), (20, 12));

    engine.resize(FramebufferSize::new(10, 10)).unwrap();
    engine.render_frame().unwrap();
    let frame = engine.read_frame().unwrap();
    assert_eq!((frame.width(), frame.height()), (5, 5));
}

#[test]
fn test_light_calibration_snaps_to_nearest_view() {
    let Some(context) = context() else { return };
    let mut calibration = settings();
    calibration.light_calibration_mode = true;
    calibration.visible_camera_poses = true;
    let mut engine = engine(&context, calibration);
    engine.initialize().unwrap();

    let near_second = Mat4::look_at_rh(Vec3::new(2.9, 0.2, 0.1), Vec3::ZERO, Vec3::Y);
    engine.set_camera(near_second, Mat4::perspective_rh(0.8, 40.0 / 24.0, 0.1, 10.0));
    engine.render_frame().unwrap();
    assert_eq!(engine.snap_index().get(), Some(1));
}

#[test]
fn test_engine_rejects_draws_after_close() {
    let Some(context) = context() else { return };
    let mut engine = engine(&context, settings());
    assert!(matches!(
        engine.render_frame(),
        Err(SceneError::NotInitialized(_))
    ));

    engine.initialize().unwrap();
    engine.close();
    engine.close();
    assert!(engine.lifecycle().is_closed());
    assert!(matches!(engine.render_frame(), Err(SceneError::Closed(_))));
    assert!(engine.framebuffer().is_none());
}

#[test]
fn test_render_request_writes_one_image_per_view() {
    let Some(context) = context() else { return };
    let output = std::env::temp_dir().join(format!("ibrelight-scene-{}", std::process::id()));
    let settings = settings();
    let target = RequestTarget {
        context: context.clone(),
        views: views(),
        geometry: Some(geometry(&context)),
        settings: settings.clone(),
    };

    let request = RenderRequest::builder(settings.shader_path("common/debug_view.wgsl"), &output)
        .width(8)
        .height(8)
        .vertex_shader(VertexShaderChoice::CameraSpace)
        .build();
    let expected: Vec<PathBuf> = (0..target.views.camera_pose_count())
        .map(|index| request.output_path(target.views.as_ref(), index))
        .collect();
    let queue: RequestQueue = RequestQueue::new();
    queue.enqueue(Box::new(request));
    let monitor: Arc<dyn LoadingMonitor> = Arc::new(NullMonitor);
    let summary = queue.execute_queue(&target, &monitor);

    assert_eq!(summary.completed, 1);
    for path in &expected {
        assert!(path.is_file(), "{} was not written", path.display());
    }
    std::fs::remove_dir_all(&output).ok();
}

fn assert_lighting_bound(subject: &Rc<RefCell<IbrSubject>>) {
    let subject = subject.borrow();
    let program = subject.shader().program().unwrap();
    for name in ["shadow_maps", "screen_space_depth", "environment_map"] {
        assert!(program.texture_unit(name).is_some(), "{name} is not bound");
    }
}

#[test]
fn test_subject_samples_every_lighting_buffer() {
    let Some(context) = context() else { return };
    let settings = settings();
    let scene = SceneModel::default().into_shared();
    let geometry = geometry(&context);

    let mut shadows = ShadowLightingResources::new(context.clone(), Rc::clone(&scene), &settings);
    shadows
        .set_shadow_caster(Rc::clone(&geometry.position))
        .unwrap();
    let shadows = Rc::new(RefCell::new(shadows));
    let lighting: SharedLighting = shadows.clone();
    let subject = Rc::new(RefCell::new(
        IbrSubject::new(
            context.clone(),
            Rc::clone(&scene),
            Rc::downgrade(&lighting),
            &geometry,
            &settings,
        )
        .unwrap(),
    ));
    let mut root = LitRoot::new(lighting);
    root.set_content(Box::new(Rc::clone(&subject)));
    root.initialize().unwrap();

    let mut framebuffer = context
        .build_framebuffer_object(16, 16)
        .add_color_attachment(AttachmentSpec::color(ColorFormat::RGBA8))
        .add_depth_attachment(AttachmentSpec::depth(DepthPrecision::Fixed24))
        .create_framebuffer_object()
        .unwrap();
    let camera = CameraViewport::new(
        Mat4::look_at_rh(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO, Vec3::Y),
        Mat4::perspective_rh(0.8, 1.0, 0.1, 10.0),
        framebuffer.full_viewport(),
    );

    // Without an environment map the subject still binds a placeholder.
    root.draw(&framebuffer, &camera).unwrap();
    framebuffer.flush().unwrap();
    assert_lighting_bound(&subject);

    let environment = context
        .build_color_cubemap(4)
        .set_internal_format(ColorFormat::RGBA8)
        .create_texture()
        .unwrap();
    shadows.borrow_mut().take_environment_map(Some(environment));
    root.draw(&framebuffer, &camera).unwrap();
    framebuffer.flush().unwrap();
    assert_lighting_bound(&subject);

    root.close();
    framebuffer.close();
}

#[test]
fn test_calibration_half_renders_beside_main_view() {
    let Some(context) = context() else { return };
    let mut engine = engine(&context, settings());
    engine.initialize().unwrap();
    engine.render_frame().unwrap();

    let mut calibration = settings();
    calibration.light_calibration_mode = true;
    engine.set_settings(calibration).unwrap();
    engine.set_camera(
        Mat4::look_at_rh(Vec3::new(0.2, 0.1, 3.0), Vec3::ZERO, Vec3::Y),
        Mat4::perspective_rh(0.8, 40.0 / 24.0, 0.1, 10.0),
    );
    engine.render_frame().unwrap();
    assert_eq!(engine.snap_index().get(), Some(0));
    assert!(engine.last_draw_error().is_none());

    engine.set_settings(settings()).unwrap();
    engine.render_frame().unwrap();
}
