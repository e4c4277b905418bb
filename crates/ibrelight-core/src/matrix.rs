//! Matrix helpers for camera and light transforms.

use glam::{Mat3, Mat4, Vec3};

use crate::error::{CoreError, CoreResult};

/// Tolerance used when inverting view matrices for camera positions.
pub const VIEW_INVERSE_TOLERANCE: f32 = 0.01;

/// Inverts a rigid transform with optional uniform scale without a general inverse.
///
/// The candidate `(Rᵀ / s²) · translate(-t)` is multiplied back onto `m` and the
/// product must be the identity within `tolerance` (translation entries are
/// compared against `tolerance · |t|`).
///
/// # Errors
///
/// Returns [`CoreError::QuickInverseFailed`] when `m` has shear, non-uniform
/// scale, a projective row, or is singular.
pub fn quick_inverse(m: Mat4, tolerance: f32) -> CoreResult<Mat4> {
    let rotation_scale = Mat3::from_mat4(m);
    let determinant = rotation_scale.determinant();
    let scale_squared = determinant.abs().powf(2.0 / 3.0);
    if !scale_squared.is_normal() {
        return Err(CoreError::QuickInverseFailed { tolerance });
    }

    let translation = m.w_axis.truncate();
    let candidate = Mat4::from_mat3(rotation_scale.transpose() * (1.0 / scale_squared))
        * Mat4::from_translation(-translation);

    let identity = m * candidate;
    let translation_tolerance = tolerance * translation.length();

    for col in 0..4 {
        for row in 0..4 {
            let expected = if row == col { 1.0 } else { 0.0 };
            let limit = if col == 3 && row < 3 {
                translation_tolerance
            } else {
                tolerance
            };
            if (identity.col(col)[row] - expected).abs() > limit {
                return Err(CoreError::QuickInverseFailed { tolerance });
            }
        }
    }

    Ok(candidate)
}

/// World-space position of the eye of a view matrix.
///
/// # Errors
///
/// Propagates [`quick_inverse`] failures.
pub fn view_position(view: Mat4) -> CoreResult<Vec3> {
    Ok(quick_inverse(view, VIEW_INVERSE_TOLERANCE)?.w_axis.truncate())
}

/// World-space forward (look) direction of a camera-to-world transform.
///
/// Cameras look down their local -Z axis.
#[must_use]
pub fn forward_direction(camera_to_world: Mat4) -> Vec3 {
    (-camera_to_world.z_axis.truncate()).normalize_or_zero()
}
