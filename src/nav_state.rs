use nalgebra::{Rotation3, Vector3};

use crate::{skew, so3, Matrix9, Vector9, POS, ROT, VEL};

/// Attitude, position and velocity of a body in the navigation frame
///
/// The tangent space is ordered as (rotation, position, velocity). Perturbations of all three
/// blocks are expressed in the body frame, see [`retract`](NavState::retract).
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NavState {
    /// Rotation from body to navigation frame
    pub attitude: Rotation3<f64>,
    /// Position in the navigation frame
    pub position: Vector3<f64>,
    /// Velocity in the navigation frame
    pub velocity: Vector3<f64>,
}

impl NavState {
    /// Create a state from its parts
    pub fn new(attitude: Rotation3<f64>, position: Vector3<f64>, velocity: Vector3<f64>) -> Self {
        Self {
            attitude,
            position,
            velocity,
        }
    }

    /// Body frame aligned with the navigation frame, at rest in the origin
    pub fn identity() -> Self {
        Self::new(Rotation3::identity(), Vector3::zeros(), Vector3::zeros())
    }

    /// Apply a body frame tangent increment
    ///
    /// `(R, p, v) ⊕ ξ = (R Exp(ξ_θ), p + R ξ_p, v + R ξ_v)`
    pub fn retract(&self, xi: &Vector9) -> NavState {
        let theta = xi.fixed_rows::<3>(ROT).into_owned();
        let dp = xi.fixed_rows::<3>(POS).into_owned();
        let dv = xi.fixed_rows::<3>(VEL).into_owned();
        NavState {
            attitude: self.attitude * so3::expmap(&theta),
            position: self.position + self.attitude * dp,
            velocity: self.velocity + self.attitude * dv,
        }
    }

    /// [`retract`](NavState::retract) together with the derivatives of the result with respect to
    /// this state and with respect to `xi`, both in the tangent space of the result.
    pub fn retract_with_jacobians(&self, xi: &Vector9) -> (NavState, Matrix9, Matrix9) {
        let result = self.retract(xi);
        let theta = xi.fixed_rows::<3>(ROT).into_owned();
        let et = so3::expmap(&theta).transpose().into_inner();

        let mut d_state = Matrix9::zeros();
        d_state.fixed_view_mut::<3, 3>(ROT, ROT).copy_from(&et);
        d_state
            .fixed_view_mut::<3, 3>(POS, ROT)
            .copy_from(&(-et * skew(&xi.fixed_rows::<3>(POS).into_owned())));
        d_state.fixed_view_mut::<3, 3>(POS, POS).copy_from(&et);
        d_state
            .fixed_view_mut::<3, 3>(VEL, ROT)
            .copy_from(&(-et * skew(&xi.fixed_rows::<3>(VEL).into_owned())));
        d_state.fixed_view_mut::<3, 3>(VEL, VEL).copy_from(&et);

        (result, d_state, Self::retract_derivative(xi))
    }

    /// Derivative of `state ⊕ xi` with respect to `xi`, which does not depend on the state:
    /// `blockdiag(Jr(ξ_θ), Exp(ξ_θ)ᵀ, Exp(ξ_θ)ᵀ)`.
    pub fn retract_derivative(xi: &Vector9) -> Matrix9 {
        let theta = xi.fixed_rows::<3>(ROT).into_owned();
        let (rot, jr) = so3::expmap_with_derivative(&theta);
        let rt = rot.transpose().into_inner();
        let mut h = Matrix9::zeros();
        h.fixed_view_mut::<3, 3>(ROT, ROT).copy_from(&jr);
        h.fixed_view_mut::<3, 3>(POS, POS).copy_from(&rt);
        h.fixed_view_mut::<3, 3>(VEL, VEL).copy_from(&rt);
        h
    }

    /// Tangent increment taking this state to `other`, the inverse of
    /// [`retract`](NavState::retract).
    pub fn local(&self, other: &NavState) -> Vector9 {
        let rt = self.attitude.inverse();
        let mut xi = Vector9::zeros();
        xi.fixed_rows_mut::<3>(ROT)
            .copy_from(&so3::logmap(&(rt * other.attitude)));
        xi.fixed_rows_mut::<3>(POS)
            .copy_from(&(rt * (other.position - self.position)));
        xi.fixed_rows_mut::<3>(VEL)
            .copy_from(&(rt * (other.velocity - self.velocity)));
        xi
    }
}

impl Default for NavState {
    fn default() -> Self {
        Self::identity()
    }
}
