//! Rotation group helpers used by the preintegrator.
//!
//! Rotations are perturbed on the right, `R * Exp(delta)`, so every derivative with respect to a
//! rotation in this module is expressed in the local (body) frame of that rotation.

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};
#[cfg(feature = "no_std")]
use num_traits::float::Float;

use crate::skew;

/// Below this angle the closed-form Jacobians are replaced by their Taylor series.
const SMALL_ANGLE: f64 = 1e-6;

/// Exponential map from a rotation vector to a rotation.
pub fn expmap(theta: &Vector3<f64>) -> Rotation3<f64> {
    Rotation3::new(*theta)
}

/// Exponential map together with its differential, the right Jacobian `Jr(theta)`, so that
/// `Exp(theta + delta) ≈ Exp(theta) * Exp(Jr(theta) * delta)`.
pub fn expmap_with_derivative(theta: &Vector3<f64>) -> (Rotation3<f64>, Matrix3<f64>) {
    (expmap(theta), right_jacobian(theta))
}

/// Logarithm map, the inverse of [`expmap`] for angles below pi.
///
/// The angle is recovered as `2 atan2(|q_v|, q_w)` from the quaternion of the rotation, which keeps
/// full relative precision near the identity where `acos` of the trace does not.
pub fn logmap(rotation: &Rotation3<f64>) -> Vector3<f64> {
    let q = UnitQuaternion::from_rotation_matrix(rotation);
    // q and -q are the same rotation, pick the one with an angle in [0, pi]
    let (w, v) = if q.scalar() < 0.0 {
        (-q.scalar(), -q.imag())
    } else {
        (q.scalar(), q.imag())
    };
    let n = v.norm();
    if n < SMALL_ANGLE {
        // 2 atan(n / w) / n = 2 / w + O(n²)
        return v * (2.0 / w);
    }
    v * (2.0 * n.atan2(w) / n)
}

/// Right Jacobian of the exponential map
///
/// ```text
/// Jr(φ) = I - (1 - cos|φ|)/|φ|² [φ]× + (|φ| - sin|φ|)/|φ|³ [φ]×²
/// ```
pub fn right_jacobian(theta: &Vector3<f64>) -> Matrix3<f64> {
    let angle = theta.norm();
    let w = skew(theta);
    if angle < SMALL_ANGLE {
        return Matrix3::identity() - 0.5 * w + (1.0 / 6.0) * w * w;
    }
    let angle2 = angle * angle;
    Matrix3::identity() - ((1.0 - angle.cos()) / angle2) * w
        + ((angle - angle.sin()) / (angle2 * angle)) * w * w
}

/// Inverse of the right Jacobian
///
/// ```text
/// Jr⁻¹(φ) = I + 0.5 [φ]× + (1/|φ|² - (1 + cos|φ|)/(2|φ| sin|φ|)) [φ]×²
/// ```
///
/// Singular at `|φ| = 2π`, which a single integration window never reaches at sane rates.
pub fn right_jacobian_inverse(theta: &Vector3<f64>) -> Matrix3<f64> {
    let angle = theta.norm();
    let w = skew(theta);
    if angle < SMALL_ANGLE {
        return Matrix3::identity() + 0.5 * w + (1.0 / 12.0) * w * w;
    }
    let coeff = 1.0 / (angle * angle) - (1.0 + angle.cos()) / (2.0 * angle * angle.sin());
    Matrix3::identity() + 0.5 * w + coeff * w * w
}

/// Rotate `v` by `rotation` and return the derivatives of the result with respect to a local
/// perturbation of the rotation and with respect to `v`.
pub fn rotate_with_jacobians(
    rotation: &Rotation3<f64>,
    v: &Vector3<f64>,
) -> (Vector3<f64>, Matrix3<f64>, Matrix3<f64>) {
    let r = rotation.matrix();
    (rotation * v, -r * skew(v), *r)
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn right_jacobian_is_identity_at_zero() {
        assert_relative_eq!(right_jacobian(&Vector3::zeros()), Matrix3::identity());
        assert_relative_eq!(right_jacobian_inverse(&Vector3::zeros()), Matrix3::identity());
    }

    #[test]
    fn right_jacobian_inverse_relationship() {
        for theta in [
            Vector3::new(0.1, 0.2, 0.3),
            Vector3::new(-1.2, 0.4, 2.0),
            Vector3::new(3e-7, -1e-7, 2e-7),
        ] {
            assert_relative_eq!(
                right_jacobian(&theta) * right_jacobian_inverse(&theta),
                Matrix3::identity(),
                epsilon = 1e-10
            );
        }
    }

    #[test]
    fn right_jacobian_matches_numerical_derivative() {
        let theta = Vector3::new(0.4, -0.7, 0.25);
        let (rot, jr) = expmap_with_derivative(&theta);
        let h = 1e-6;
        for i in 0..3 {
            let mut delta = Vector3::zeros();
            delta[i] = h;
            let plus = logmap(&(rot.inverse() * expmap(&(theta + delta))));
            let minus = logmap(&(rot.inverse() * expmap(&(theta - delta))));
            let column = (plus - minus) / (2.0 * h);
            assert_relative_eq!(column, jr.column(i).into_owned(), epsilon = 1e-8);
        }
    }

    #[test]
    fn logmap_is_accurate_near_identity() {
        for angle in [1e-3, 1e-5, 1e-7, 1e-9] {
            let theta = Vector3::new(0.6, -0.48, 0.64) * angle;
            assert_relative_eq!(logmap(&expmap(&theta)), theta, max_relative = 1e-9);
        }
        assert_relative_eq!(logmap(&Rotation3::identity()), Vector3::zeros());
    }

    #[test]
    fn logmap_large_angles() {
        for theta in [Vector3::new(0.0, 2.5, -1.0), Vector3::new(-3.0, 0.2, 0.1)] {
            assert_relative_eq!(logmap(&expmap(&theta)), theta, epsilon = 1e-12);
        }
    }

    #[test]
    fn expmap_logmap_inverse() {
        let theta = Vector3::new(0.3, -1.1, 0.8);
        assert_relative_eq!(logmap(&expmap(&theta)), theta, epsilon = 1e-12);
    }

    #[test]
    fn rotate_jacobians_match_numerical_derivative() {
        let rot = expmap(&Vector3::new(0.2, 0.1, -0.5));
        let v = Vector3::new(1.0, -2.0, 9.81);
        let (rv, d_rot, d_v) = rotate_with_jacobians(&rot, &v);
        assert_relative_eq!(rv, rot.matrix() * v);
        assert_relative_eq!(d_v, *rot.matrix());
        let h = 1e-6;
        for i in 0..3 {
            let mut delta = Vector3::zeros();
            delta[i] = h;
            let plus = (rot * expmap(&delta)) * v;
            let minus = (rot * expmap(&-delta)) * v;
            assert_relative_eq!(
                (plus - minus) / (2.0 * h),
                d_rot.column(i).into_owned(),
                epsilon = 1e-8
            );
        }
    }
}
