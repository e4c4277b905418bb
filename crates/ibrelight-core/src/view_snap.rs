//! Nearest captured view selection.

use glam::Mat4;

use crate::error::{CoreError, CoreResult};
use crate::matrix::{forward_direction, quick_inverse};
use crate::view_set::ViewSet;

/// Tolerance for inverting camera poses while snapping.
pub const SNAP_INVERSE_TOLERANCE: f32 = 0.002;

/// The captured view chosen for a requested camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapResult {
    /// Index into the view set.
    pub index: usize,
    /// Cosine between the requested and chosen forward directions.
    pub similarity: f32,
    /// World-to-camera transform that reproduces the chosen pose under `model`.
    pub view: Mat4,
}

/// Picks the camera pose whose viewing direction best matches `target_view`.
///
/// Each pose is placed in world space through `model · pose⁻¹` and scored by the
/// dot product of its forward direction with the target's. The first pose with
/// the highest score wins.
///
/// # Errors
///
/// Returns [`CoreError::EmptyViewSet`] when there is nothing to snap to, and
/// propagates inverse failures for degenerate target or pose matrices.
pub fn snap_to_view(target_view: Mat4, model: Mat4, views: &dyn ViewSet) -> CoreResult<SnapResult> {
    let count = views.camera_pose_count();
    if count == 0 {
        return Err(CoreError::EmptyViewSet);
    }

    let target_forward = forward_direction(quick_inverse(target_view, SNAP_INVERSE_TOLERANCE)?);

    let mut best: Option<(usize, f32)> = None;
    for index in 0..count {
        let pose = views.camera_pose(index);
        let camera_to_world = model * quick_inverse(pose, SNAP_INVERSE_TOLERANCE)?;
        let similarity = target_forward.dot(forward_direction(camera_to_world));

        if best.map_or(true, |(_, best_similarity)| similarity > best_similarity) {
            best = Some((index, similarity));
        }
    }

    let (index, similarity) = best.ok_or(CoreError::EmptyViewSet)?;
    let model_inverse = quick_inverse(model, SNAP_INVERSE_TOLERANCE).unwrap_or_else(|_| model.inverse());
    Ok(SnapResult {
        index,
        similarity,
        view: views.camera_pose(index) * model_inverse,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view_set::ViewSetData;
    use glam::Vec3;
    use proptest::prelude::*;

    fn orbit_pose(angle: f32) -> Mat4 {
        let eye = Vec3::new(5.0 * angle.sin(), 0.0, 5.0 * angle.cos());
        Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y)
    }

    #[test]
    fn test_empty_view_set_fails() {
        let views = ViewSetData::default();
        assert!(matches!(
            snap_to_view(Mat4::IDENTITY, Mat4::IDENTITY, &views),
            Err(CoreError::EmptyViewSet)
        ));
    }

    #[test]
    fn test_identity_pose_matches_identity_target() {
        let views = ViewSetData::from_poses([orbit_pose(1.5), Mat4::IDENTITY, orbit_pose(-2.0)]);
        let result = snap_to_view(Mat4::IDENTITY, Mat4::IDENTITY, &views).unwrap();
        assert_eq!(result.index, 1);
        assert!((result.similarity - 1.0).abs() < 1e-6);
        assert!(result.view.abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }

    #[test]
    fn test_ties_pick_first_index() {
        let views = ViewSetData::from_poses([Mat4::IDENTITY, Mat4::IDENTITY, Mat4::IDENTITY]);
        let result = snap_to_view(Mat4::IDENTITY, Mat4::IDENTITY, &views).unwrap();
        assert_eq!(result.index, 0);
    }

    #[test]
    fn test_model_rotation_is_applied_to_poses() {
        // Rotating the model by 90° about Y moves pose 1 onto the target direction.
        let views = ViewSetData::from_poses([orbit_pose(0.0), orbit_pose(-std::f32::consts::FRAC_PI_2)]);
        let model = Mat4::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let result = snap_to_view(orbit_pose(0.0), model, &views).unwrap();
        assert_eq!(result.index, 1);
        assert!(result.similarity > 0.999);
    }

    proptest! {
        #[test]
        fn prop_exact_pose_always_wins(
            angles in proptest::collection::vec(-3.0f32..3.0, 1..12),
            pick in 0usize..12,
        ) {
            let pick = pick % angles.len();
            let views = ViewSetData::from_poses(angles.iter().map(|&a| orbit_pose(a)));
            let result = snap_to_view(orbit_pose(angles[pick]), Mat4::IDENTITY, &views).unwrap();
            prop_assert!((result.similarity - 1.0).abs() < 1e-4);
            // Another pose facing the same way may win the tie.
            let chosen = angles[result.index];
            prop_assert!((chosen.sin() - angles[pick].sin()).abs() < 2e-2);
            prop_assert!((chosen.cos() - angles[pick].cos()).abs() < 2e-2);
        }
    }
}
