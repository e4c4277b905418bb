//! Project descriptions: captured views, lights and render settings in one JSON file.
//!
//! ```json
//! {
//!   "views": { "views": [{ "pose": [...16 floats...], "image_name": "IMG_0001" }] },
//!   "lights": [{ "position": [0, 0, 5], "color": [1, 1, 1] }],
//!   "settings": { "shadows_enabled": true }
//! }
//! ```

use std::path::Path;

use glam::{Mat4, Vec3};
use ibrelight_core::{RenderSettings, ViewSetData};
use ibrelight_scene::{LightInstance, SceneModel, MAX_VIRTUAL_LIGHTS};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A virtual light aimed at a target point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightSpec {
    pub position: Vec3,
    pub target: Vec3,
    pub color: Vec3,
    /// Half-angle of the spotlight cone in radians.
    pub spot_size: f32,
    pub spot_taper: f32,
}

impl Default for LightSpec {
    fn default() -> Self {
        let light = LightInstance::default();
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::ZERO,
            color: light.color,
            spot_size: light.spot_size,
            spot_taper: light.spot_taper,
        }
    }
}

impl LightSpec {
    /// The light as a scene instance with a look-at view matrix.
    #[must_use]
    pub fn to_instance(&self) -> LightInstance {
        let forward = (self.target - self.position).normalize_or_zero();
        let up = if forward.cross(Vec3::Y).length_squared() < 1e-6 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        LightInstance {
            view: Mat4::look_at_rh(self.position, self.target, up),
            color: self.color,
            spot_size: self.spot_size,
            spot_taper: self.spot_taper,
        }
    }
}

/// Everything needed to render a project besides its mesh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectDescription {
    pub views: ViewSetData,
    pub lights: Vec<LightSpec>,
    pub ground_plane: bool,
    pub settings: RenderSettings,
}

impl ProjectDescription {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let project: Self = serde_json::from_str(json)?;
        if project.lights.len() > MAX_VIRTUAL_LIGHTS {
            log::warn!(
                "project declares {} lights; only the first {MAX_VIRTUAL_LIGHTS} are rendered",
                project.lights.len()
            );
        }
        Ok(project)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let project = Self::from_json_str(&text)?;
        log::info!(
            "loaded project {} with {} views",
            path.as_ref().display(),
            project.views.views.len()
        );
        Ok(project)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Scene model with this project's lights, framing a subject at `centroid`
    /// with bounding size `scale`.
    #[must_use]
    pub fn scene_model(&self, centroid: Vec3, scale: f32) -> SceneModel {
        SceneModel {
            centroid,
            scale,
            lights: self.lights.iter().map(LightSpec::to_instance).collect(),
            ground_plane_enabled: self.ground_plane,
            ..SceneModel::default()
        }
    }
}
