//! View matrix sanity checks

use periscope_common::RawMatrix;
use thiserror::Error;

/// Reason a view matrix was rejected, in check order
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum MatrixRejection {
    #[error("non-finite marker component")]
    NonFinite,

    #[error("diagonal markers are all zero")]
    AllZero,

    #[error("translation component {axis} = {value} outside world bound {bound}")]
    OutOfBounds { axis: char, value: f32, bound: f32 },

    #[error("translation too close to origin (len² = {len_sq})")]
    NearOrigin { len_sq: f32 },
}

/// Validate a raw view matrix; the first failing check wins
///
/// 1. M11, M22, M33, M44 and M41 must be finite
/// 2. M11, M22, M33, M44 must not all be exactly zero
/// 3. |M41|, |M42|, |M43| must not exceed `world_bound`
/// 4. while a session is active the translation must not sit at the origin
pub fn validate_view_matrix(
    m: &RawMatrix,
    in_session: bool,
    world_bound: f32,
) -> Result<(), MatrixRejection> {
    let markers = [m.m11, m.m22, m.m33, m.m44, m.m41];
    if markers.iter().any(|v| !v.is_finite()) {
        return Err(MatrixRejection::NonFinite);
    }

    if m.diagonal().iter().all(|v| *v == 0.0) {
        return Err(MatrixRejection::AllZero);
    }

    for (axis, value) in [('x', m.m41), ('y', m.m42), ('z', m.m43)] {
        if value.abs() > world_bound {
            return Err(MatrixRejection::OutOfBounds {
                axis,
                value,
                bound: world_bound,
            });
        }
    }

    if in_session {
        let len_sq = m.translation().length_squared();
        if len_sq < 1.0 {
            return Err(MatrixRejection::NearOrigin { len_sq });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUND: f32 = 5000.0;

    fn placed(x: f32, y: f32, z: f32) -> RawMatrix {
        let mut m = RawMatrix::IDENTITY;
        m.m41 = x;
        m.m42 = y;
        m.m43 = z;
        m
    }

    #[test]
    fn test_plausible_matrix_accepted() {
        assert_eq!(
            validate_view_matrix(&placed(120.0, 4.0, -300.0), true, BOUND),
            Ok(())
        );
    }

    #[test]
    fn test_nan_marker_rejected() {
        let mut m = placed(10.0, 0.0, 0.0);
        m.m11 = f32::NAN;
        assert_eq!(
            validate_view_matrix(&m, true, BOUND),
            Err(MatrixRejection::NonFinite)
        );

        let mut m = placed(10.0, 0.0, 0.0);
        m.m41 = f32::INFINITY;
        assert_eq!(
            validate_view_matrix(&m, false, BOUND),
            Err(MatrixRejection::NonFinite)
        );
    }

    #[test]
    fn test_all_zero_rejected() {
        assert_eq!(
            validate_view_matrix(&RawMatrix::default(), false, BOUND),
            Err(MatrixRejection::AllZero)
        );
    }

    #[test]
    fn test_world_bound_boundary() {
        assert!(matches!(
            validate_view_matrix(&placed(5000.01, 0.0, 0.0), true, BOUND),
            Err(MatrixRejection::OutOfBounds { axis: 'x', .. })
        ));
        assert!(matches!(
            validate_view_matrix(&placed(0.0, 0.0, -5000.01), true, BOUND),
            Err(MatrixRejection::OutOfBounds { axis: 'z', .. })
        ));
        assert_eq!(
            validate_view_matrix(&placed(4999.99, 0.0, 0.0), true, BOUND),
            Ok(())
        );
    }

    #[test]
    fn test_origin_check_only_in_session() {
        let near = placed(0.99f32.sqrt(), 0.0, 0.0);
        let far = placed(1.01f32.sqrt(), 0.0, 0.0);
        assert!(matches!(
            validate_view_matrix(&near, true, BOUND),
            Err(MatrixRejection::NearOrigin { .. })
        ));
        assert_eq!(validate_view_matrix(&far, true, BOUND), Ok(()));
        assert_eq!(validate_view_matrix(&near, false, BOUND), Ok(()));
        assert_eq!(
            validate_view_matrix(&RawMatrix::IDENTITY, false, BOUND),
            Ok(())
        );
    }
}
