//! Render settings shared by the rendering engine and batch requests.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

/// Settings that shape how a project is rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Whether the offscreen target is multisampled.
    pub multisampling_enabled: bool,

    /// Whether the offscreen target is rendered at half resolution.
    pub half_resolution_enabled: bool,

    /// Whether the light calibration split view is shown.
    pub light_calibration_mode: bool,

    /// Whether shadow maps are refreshed and sampled.
    pub shadows_enabled: bool,

    /// Whether image-based relighting is enabled.
    pub relighting_enabled: bool,

    /// Whether captured camera poses are drawn as widgets.
    pub visible_camera_poses: bool,

    /// Tile width for subdivided drawing, in pixels.
    pub subdivision_width: u32,

    /// Tile height for subdivided drawing, in pixels.
    pub subdivision_height: u32,

    /// Edge length of each shadow map layer.
    pub shadow_map_resolution: u32,

    /// Edge length of the screen-space depth buffer.
    pub screen_space_depth_resolution: u32,

    /// Upper bound on parallel view-render workers; `None` uses all cores.
    pub max_stream_threads: Option<usize>,

    /// Root directory of shader sources.
    pub shader_directory: PathBuf,

    /// Display gamma.
    pub gamma: f32,

    /// Exponent applied to view weights.
    pub weight_exponent: f32,

    /// Depth bias for visibility tests.
    pub occlusion_bias: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            multisampling_enabled: false,
            half_resolution_enabled: false,
            light_calibration_mode: false,
            shadows_enabled: true,
            relighting_enabled: true,
            visible_camera_poses: false,
            subdivision_width: 1024,
            subdivision_height: 1024,
            shadow_map_resolution: 2048,
            screen_space_depth_resolution: 512,
            max_stream_threads: None,
            shader_directory: PathBuf::from("shaders"),
            gamma: 2.2,
            weight_exponent: 16.0,
            occlusion_bias: 0.0025,
        }
    }
}

impl RenderSettings {
    /// Parses settings from JSON; missing fields take their default values.
    pub fn from_json_str(json: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let settings = Self::from_json_str(&text)?;
        log::debug!("loaded render settings from {}", path.as_ref().display());
        Ok(settings)
    }

    /// Writes settings to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> CoreResult<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), text)?;
        Ok(())
    }

    /// Resolves a shader path relative to [`Self::shader_directory`].
    #[must_use]
    pub fn shader_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.shader_directory.join(relative)
    }

    /// Number of worker threads a parallel view stream should use.
    #[must_use]
    pub fn stream_threads(&self) -> usize {
        let available = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        self.max_stream_threads
            .map_or(available, |limit| limit.clamp(1, available.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = RenderSettings::default();
        assert_eq!(settings.shadow_map_resolution, 2048);
        assert_eq!(settings.screen_space_depth_resolution, 512);
        assert!(settings.shadows_enabled);
        assert!(settings.max_stream_threads.is_none());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings =
            RenderSettings::from_json_str(r#"{"light_calibration_mode": true, "subdivision_width": 256}"#)
                .unwrap();
        assert!(settings.light_calibration_mode);
        assert_eq!(settings.subdivision_width, 256);
        assert_eq!(settings.subdivision_height, 1024);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("ibrelight-settings-{}.json", std::process::id()));
        let settings = RenderSettings {
            gamma: 1.8,
            max_stream_threads: Some(2),
            ..RenderSettings::default()
        };
        settings.save(&path).unwrap();
        let loaded = RenderSettings::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_stream_threads_never_zero() {
        let settings = RenderSettings {
            max_stream_threads: Some(0),
            ..RenderSettings::default()
        };
        assert_eq!(settings.stream_threads(), 1);
    }
}
