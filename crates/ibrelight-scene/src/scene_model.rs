//! Scene state shared by the render graph: model placement, lights and geometry.

use std::cell::RefCell;
use std::rc::Rc;

use glam::{Mat3, Mat4, Vec3};
use ibrelight_gl::VertexBuffer;

/// Upper bound on lights passed to the lit shaders.
pub const MAX_VIRTUAL_LIGHTS: usize = 4;

/// One virtual light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightInstance {
    /// World-to-light transform.
    pub view: Mat4,
    /// Linear RGB intensity.
    pub color: Vec3,
    /// Half-angle of the spot cone in radians.
    pub spot_size: f32,
    /// Falloff towards the cone edge in `[0, 1]`.
    pub spot_taper: f32,
}

impl Default for LightInstance {
    fn default() -> Self {
        Self {
            view: Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y),
            color: Vec3::ONE,
            spot_size: std::f32::consts::FRAC_PI_2,
            spot_taper: 0.0,
        }
    }
}

/// Placement of the subject and the lights around it.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneModel {
    /// Object-to-world transform of the subject.
    pub model: Mat4,
    /// Bounding box center in object coordinates.
    pub centroid: Vec3,
    /// Bounding box edge length.
    pub scale: f32,
    /// Object orientation used when sizing shadow frusta.
    pub orientation: Mat3,
    pub lights: Vec<LightInstance>,
    pub ground_plane_enabled: bool,
    pub ambient_color: Vec3,
    /// Diffuse albedo used when the subject has no textures.
    pub default_diffuse_color: Vec3,
    /// Rotation from world coordinates into environment map coordinates.
    pub environment_orientation: Mat3,
}

impl Default for SceneModel {
    fn default() -> Self {
        Self {
            model: Mat4::IDENTITY,
            centroid: Vec3::ZERO,
            scale: 1.0,
            orientation: Mat3::IDENTITY,
            lights: vec![LightInstance::default()],
            ground_plane_enabled: false,
            ambient_color: Vec3::ZERO,
            default_diffuse_color: Vec3::splat(0.125),
            environment_orientation: Mat3::IDENTITY,
        }
    }
}

/// Scene model shared between the nodes of one render graph.
pub type SharedSceneModel = Rc<RefCell<SceneModel>>;

impl SceneModel {
    #[must_use]
    pub fn into_shared(self) -> SharedSceneModel {
        Rc::new(RefCell::new(self))
    }

    #[must_use]
    pub fn light_count(&self) -> usize {
        self.lights.len()
    }

    /// Camera model-view for a world-to-camera `view`.
    #[must_use]
    pub fn model_view(&self, view: Mat4) -> Mat4 {
        view * self.model
    }

    /// Object-to-light transform of light `index`.
    #[must_use]
    pub fn light_model_view(&self, index: usize) -> Mat4 {
        self.lights
            .get(index)
            .map_or(Mat4::IDENTITY, |light| light.view * self.model)
    }

    /// Maps object-space directions into environment map coordinates.
    #[must_use]
    pub fn environment_matrix(&self) -> Mat4 {
        Mat4::from_mat3(self.environment_orientation) * self.model
    }

    /// Radius of the sphere inscribed in the oriented bounding cube.
    #[must_use]
    pub fn bounding_radius(&self) -> f32 {
        let half = 0.5 * self.scale;
        (self.orientation * Vec3::splat(half)).length() / 3.0_f32.sqrt()
    }

    /// Perspective projection of the shadow frustum of light `index`.
    ///
    /// The frustum is aimed from the light through the scene centroid and sized
    /// to cover the subject (and the ground plane when enabled), narrowed to the
    /// spot cone.
    #[must_use]
    pub fn light_projection(&self, index: usize) -> Mat4 {
        let spot_size = self
            .lights
            .get(index)
            .map_or(std::f32::consts::FRAC_PI_2, |light| light.spot_size);

        let to_centroid = self.light_model_view(index).transform_point3(self.centroid);
        let distance = to_centroid.length();
        let look_at = to_centroid.truncate().length();
        let radius = self.bounding_radius();

        let (fov, near, far) = if self.ground_plane_enabled {
            let fov = 2.0 * ((self.scale + look_at) / distance).min(0.99).asin();
            let far = distance + 2.0 * self.scale;
            let near = ((distance + radius) / 32.0).max(distance - 2.0 * radius);
            (fov, near, far)
        } else {
            let fov = 2.0 * ((radius + look_at) / distance).min(0.99).asin();
            let far = distance + radius;
            let near = (far / 1024.0).max(distance - 2.0 * radius);
            (fov, near, far)
        };

        let fov = fov.min(2.0 * spot_size);
        let near = near.max(1.0e-4);
        let far = far.max(2.0 * near);
        Mat4::perspective_rh(fov, 1.0, near, far)
    }
}

/// Vertex buffers of the subject mesh.
///
/// Buffers are shared; the nodes drawing them never close them.
#[derive(Debug, Clone)]
pub struct SubjectGeometry {
    pub position: Rc<VertexBuffer>,
    pub normal: Rc<VertexBuffer>,
    pub tex_coord: Option<Rc<VertexBuffer>>,
}

impl SubjectGeometry {
    /// Named attribute buffers in binding order.
    #[must_use]
    pub fn attributes(&self) -> Vec<(&'static str, Rc<VertexBuffer>)> {
        let mut attributes = vec![
            ("position", Rc::clone(&self.position)),
            ("normal", Rc::clone(&self.normal)),
        ];
        if let Some(tex_coord) = &self.tex_coord {
            attributes.push(("tex_coord", Rc::clone(tex_coord)));
        }
        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overhead_scene(spot_size: f32) -> SceneModel {
        SceneModel {
            scale: 2.0,
            lights: vec![LightInstance {
                view: Mat4::look_at_rh(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y),
                spot_size,
                ..LightInstance::default()
            }],
            ..SceneModel::default()
        }
    }

    #[test]
    fn test_bounding_radius() {
        let scene = SceneModel {
            scale: 2.0,
            ..SceneModel::default()
        };
        assert!((scene.bounding_radius() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_light_projection_covers_subject() {
        let scene = overhead_scene(std::f32::consts::PI);
        let expected = Mat4::perspective_rh(2.0 * 0.1_f32.asin(), 1.0, 8.0, 11.0);
        assert!(scene.light_projection(0).abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn test_light_projection_narrowed_to_spot() {
        let scene = overhead_scene(0.05);
        let expected = Mat4::perspective_rh(0.1, 1.0, 8.0, 11.0);
        assert!(scene.light_projection(0).abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn test_light_projection_with_ground_plane() {
        let mut scene = overhead_scene(std::f32::consts::PI);
        scene.ground_plane_enabled = true;
        let expected = Mat4::perspective_rh(2.0 * 0.2_f32.asin(), 1.0, 8.0, 14.0);
        assert!(scene.light_projection(0).abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn test_environment_matrix_rotates_directions() {
        let scene = SceneModel {
            model: Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)),
            environment_orientation: Mat3::from_rotation_y(std::f32::consts::FRAC_PI_2),
            ..SceneModel::default()
        };
        let direction = scene.environment_matrix().transform_vector3(Vec3::X);
        assert!(direction.abs_diff_eq(Vec3::new(0.0, 0.0, -1.0), 1e-6));
    }

    #[test]
    fn test_model_view_composes_model() {
        let scene = SceneModel {
            model: Mat4::from_translation(Vec3::X),
            ..SceneModel::default()
        };
        let view = Mat4::from_translation(Vec3::Z);
        let origin = scene.model_view(view).transform_point3(Vec3::ZERO);
        assert!(origin.abs_diff_eq(Vec3::new(1.0, 0.0, 1.0), 1e-6));
    }
}
