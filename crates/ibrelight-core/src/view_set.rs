//! Read-only access to the captured camera poses of a project.

use glam::Mat4;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Projection parameters of one captured view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewProjection {
    /// Vertical field of view in radians.
    pub vertical_fov: f32,
    /// Width over height.
    pub aspect_ratio: f32,
    pub near_plane: f32,
    pub far_plane: f32,
}

impl ViewProjection {
    /// Right-handed perspective matrix with a `[0, 1]` depth range.
    #[must_use]
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.vertical_fov,
            self.aspect_ratio,
            self.near_plane,
            self.far_plane,
        )
    }
}

impl Default for ViewProjection {
    fn default() -> Self {
        Self {
            vertical_fov: std::f32::consts::FRAC_PI_4,
            aspect_ratio: 1.0,
            near_plane: 0.01,
            far_plane: 100.0,
        }
    }
}

/// Indexed collection of camera poses.
///
/// Poses are model-to-camera transforms; index order is the capture order.
pub trait ViewSet: Send + Sync {
    /// Number of camera poses.
    fn camera_pose_count(&self) -> usize;

    /// The model-to-camera transform of pose `index`.
    fn camera_pose(&self, index: usize) -> Mat4;

    /// Projection parameters for pose `index`.
    fn camera_projection(&self, index: usize) -> ViewProjection;

    /// Base file name (without extension) of the image captured at `index`.
    fn image_name(&self, index: usize) -> String {
        format!("view_{index:04}")
    }
}

/// One pose of a [`ViewSetData`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedView {
    pub pose: Mat4,
    #[serde(default)]
    pub projection: ViewProjection,
    #[serde(default)]
    pub image_name: Option<String>,
}

/// In-memory view set, loadable from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewSetData {
    pub views: Vec<CapturedView>,
}

impl ViewSetData {
    /// Creates a view set from bare poses with default projections.
    #[must_use]
    pub fn from_poses(poses: impl IntoIterator<Item = Mat4>) -> Self {
        Self {
            views: poses
                .into_iter()
                .map(|pose| CapturedView {
                    pose,
                    projection: ViewProjection::default(),
                    image_name: None,
                })
                .collect(),
        }
    }

    /// Parses a view set from JSON.
    pub fn from_json_str(json: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Checked access to a captured view.
    pub fn view(&self, index: usize) -> CoreResult<&CapturedView> {
        self.views.get(index).ok_or(CoreError::IndexOutOfRange {
            kind: "view set",
            index,
            len: self.views.len(),
        })
    }
}

impl ViewSet for ViewSetData {
    fn camera_pose_count(&self) -> usize {
        self.views.len()
    }

    fn camera_pose(&self, index: usize) -> Mat4 {
        self.views[index].pose
    }

    fn camera_projection(&self, index: usize) -> ViewProjection {
        self.views[index].projection
    }

    fn image_name(&self, index: usize) -> String {
        self.views[index]
            .image_name
            .clone()
            .unwrap_or_else(|| format!("view_{index:04}"))
    }
}
