//! Frustum widgets marking the captured camera poses.

use std::rc::Rc;
use std::sync::Arc;

use glam::{Mat4, Vec3, Vec4};
use ibrelight_core::matrix::VIEW_INVERSE_TOLERANCE;
use ibrelight_core::{quick_inverse, CameraViewport, RenderSettings, ViewSet};
use ibrelight_gl::{Context, Framebuffer, PrimitiveMode};

use crate::component::RenderedComponent;
use crate::error::SceneResult;
use crate::scene_model::SharedSceneModel;
use crate::shader_component::{ProgramSpec, ShaderComponent};
use crate::view_snap::SnapIndex;

const WIDGETS: &str = "camera widgets";

/// Widget size relative to the subject scale.
const WIDGET_SCALE: f32 = 0.1;

const WIDGET_COLOR: Vec4 = Vec4::new(0.6, 0.6, 0.6, 1.0);
const SNAPPED_WIDGET_COLOR: Vec4 = Vec4::new(1.0, 0.5, 0.0, 1.0);

/// Line-list vertices of a unit frustum with its apex at the origin looking down -Z.
///
/// The far rectangle spans `[-1, 1]²` at `z = -1`.
#[must_use]
pub fn frustum_lines() -> Vec<f32> {
    let corners = [
        Vec3::new(-1.0, -1.0, -1.0),
        Vec3::new(1.0, -1.0, -1.0),
        Vec3::new(1.0, 1.0, -1.0),
        Vec3::new(-1.0, 1.0, -1.0),
    ];
    let mut vertices = Vec::with_capacity(16 * 3);
    for (i, corner) in corners.iter().enumerate() {
        let next = corners[(i + 1) % corners.len()];
        for point in [Vec3::ZERO, *corner, *corner, next] {
            vertices.extend_from_slice(&point.to_array());
        }
    }
    vertices
}

/// Draws one frustum per captured view, highlighting the snapped one.
pub struct CameraWidgetGroup {
    shader: ShaderComponent,
    views: Arc<dyn ViewSet>,
    scene: SharedSceneModel,
    snap: Option<SnapIndex>,
    visible: bool,
}

impl std::fmt::Debug for CameraWidgetGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraWidgetGroup")
            .field("views", &self.views.camera_pose_count())
            .field("visible", &self.visible)
            .field("snap", &self.snap)
            .finish_non_exhaustive()
    }
}

impl CameraWidgetGroup {
    pub fn new(
        context: Context,
        views: Arc<dyn ViewSet>,
        scene: SharedSceneModel,
        settings: &RenderSettings,
    ) -> Self {
        let spec = ProgramSpec::from_file(settings.shader_path("common/camera_widget.wgsl"));
        Self {
            shader: ShaderComponent::new(context, WIDGETS, spec).with_mode(PrimitiveMode::Lines),
            views,
            scene,
            snap: None,
            visible: settings.visible_camera_poses,
        }
    }

    /// Highlights the view selected by a [`crate::ViewSnap`].
    #[must_use]
    pub fn with_snap_index(mut self, snap: SnapIndex) -> Self {
        self.snap = Some(snap);
        self
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Object-space transform of the widget for view `index`.
    fn widget_transform(&self, index: usize, scale: f32) -> SceneResult<Mat4> {
        let projection = self.views.camera_projection(index);
        let half_height = (0.5 * projection.vertical_fov).tan();
        let half_width = half_height * projection.aspect_ratio;
        let camera_to_object = quick_inverse(self.views.camera_pose(index), VIEW_INVERSE_TOLERANCE)?;
        Ok(camera_to_object * Mat4::from_scale(scale * Vec3::new(half_width, half_height, 1.0)))
    }
}

impl RenderedComponent for CameraWidgetGroup {
    fn initialize(&mut self) -> SceneResult<()> {
        let frustum = self
            .shader
            .context()
            .create_vertex_buffer(3, &frustum_lines())?;
        self.shader.add_vertex_buffer("position", Rc::new(frustum))?;
        self.shader.initialize()
    }

    fn update(&mut self) -> SceneResult<()> {
        self.shader.update()
    }

    fn reload_shaders(&mut self) -> SceneResult<()> {
        self.shader.reload_shaders()
    }

    fn draw(&mut self, framebuffer: &dyn Framebuffer, camera: &CameraViewport) -> SceneResult<()> {
        self.shader.lifecycle().ensure_ready(WIDGETS)?;
        if !self.visible {
            return Ok(());
        }

        let (model_view, scale) = {
            let scene = self.scene.borrow();
            (scene.model_view(camera.view), scene.scale * WIDGET_SCALE)
        };
        let snapped = self.snap.as_ref().and_then(SnapIndex::get);

        for index in 0..self.views.camera_pose_count() {
            let widget = model_view * self.widget_transform(index, scale)?;
            let color = if snapped == Some(index) {
                SNAPPED_WIDGET_COLOR
            } else {
                WIDGET_COLOR
            };
            let program = self.shader.program_mut()?;
            program.set_uniform("model_view", widget)?;
            program.set_uniform("projection", camera.viewport_projection())?;
            program.set_uniform("color", color)?;
            self.shader.draw_primitives(framebuffer, camera)?;
        }
        Ok(())
    }

    fn close(&mut self) {
        self.shader.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frustum_has_eight_segments() {
        let vertices = frustum_lines();
        assert_eq!(vertices.len(), 16 * 3);

        let points: Vec<Vec3> = vertices.chunks(3).map(Vec3::from_slice).collect();
        let apex_segments = points
            .chunks(2)
            .filter(|segment| segment[0] == Vec3::ZERO)
            .count();
        assert_eq!(apex_segments, 4);
        assert!(points
            .iter()
            .filter(|p| **p != Vec3::ZERO)
            .all(|p| p.z == -1.0 && p.x.abs() == 1.0 && p.y.abs() == 1.0));
    }
}
