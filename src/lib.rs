//! # IMU Preintegration
//! Summarizes a window of high-rate [Inertial Measurement Unit
//! (IMU)](https://en.wikipedia.org/wiki/Inertial_measurement_unit) samples into a single
//! "preintegrated measurement" relating two navigation states, following the on-manifold approach
//! of [Forster et al.](https://arxiv.org/abs/1512.02363).
//!
//! The accumulated quantity is a 9 dimensional tangent vector `zeta = [theta, position,
//! velocity]` expressed in the body frame at the start of the window. Every accelerometer and
//! gyroscope sample is folded into `zeta` with an exact mean propagation, and the 9x9 covariance of
//! `zeta` is propagated through the analytic Jacobians of that step. A downstream estimator can
//! then predict the end-of-window state from any starting state, or use the covariance as the
//! noise model of a single inertial constraint.
//!
//! ## Usage
//! ```
//! use imu_preint::{Builder, ImuBias, NavState, PreIntegrator};
//! use nalgebra::Vector3;
//!
//! // Noise densities of the IMU and gravity in the navigation frame
//! let params = Builder::new()
//!     .accelerometer_noise_density(0.01)
//!     .gyroscope_noise_density(0.001)
//!     .build();
//! // One integrator per window between two estimator states
//! let mut preint = PreIntegrator::new(params, ImuBias::zero()).expect("valid parameters");
//! // Read measurements from the IMU at 100 Hz
//! for _ in 0..100 {
//!     preint
//!         .integrate_measurement(Vector3::new(0.0, 0.0, -9.81), Vector3::zeros(), 0.01)
//!         .expect("valid sample");
//! }
//! // A stationary IMU stays where it started
//! let end = preint.predict(&NavState::identity(), &ImuBias::zero());
//! assert!(end.position.norm() < 1e-9);
//! // The uncertainty of the summary is available as a noise model
//! let noise = preint.noise_model().expect("enough samples for a full rank covariance");
//! assert_eq!(noise.dim(), 9);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![cfg_attr(not(feature = "std"), no_std)]

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};

#[cfg(any(
    all(feature = "std", feature = "no_std"),
    not(any(feature = "std", feature = "no_std"))
))]
compile_error!("Exactly one of features `std` and `no_std` must be enabled");

mod bias;
mod nav_state;
mod noise;
mod params;
mod preintegrator;
pub mod so3;

pub use bias::ImuBias;
pub use nav_state::NavState;
pub use noise::GaussianNoise;
pub use params::{Builder, CovarianceCorrection, Params};
pub use preintegrator::{PreIntegrator, PredictJacobians, StepJacobians};

/// Potential errors raised during operations
#[derive(Copy, Clone, Debug, PartialEq, thiserror::Error)]
pub enum Error {
    /// The time step of a measurement was zero, negative or not finite. The discrete noise
    /// covariance of a step is the continuous density divided by `dt`, so such a step would
    /// corrupt the accumulated covariance. The integrator state is left untouched.
    #[error("time step must be finite and strictly positive, got {0}")]
    InvalidTimeStep(f64),
    /// A measured acceleration or angular velocity contained `NaN` or infinite components.
    #[error("measurement contains non-finite components")]
    NonFiniteMeasurement,
    /// Integrating a sample would overflow the accumulated state, for instance a subnormal time
    /// step that turns the per-step noise covariance infinite. The integrator state is left
    /// untouched.
    #[error("update of the accumulated state is not finite")]
    NonFiniteUpdate,
    /// The configured gravity vector has `NaN` or infinite components.
    #[error("gravity vector contains non-finite components")]
    NonFiniteGravity,
    /// A covariance matrix is not symmetric or has significantly negative eigenvalues.
    #[error("covariance is not symmetric positive semi-definite")]
    CovarianceNotPositiveSemidefinite,
    /// It is not always possible to factorize a covariance matrix. This happens when building a
    /// noise model from a rank deficient covariance, for instance right after construction when
    /// no noise has been accumulated yet.
    #[error("covariance could not be factorized")]
    InversionError,
}

/// Helper definition to make it easier to work with errors
pub type Result<T> = core::result::Result<T, Error>;

/// 9 dimensional tangent vector ordered as (rotation, position, velocity)
pub type Vector9 = SVector<f64, 9>;
/// 9x9 matrix over the tangent space, e.g. a covariance or a state Jacobian
pub type Matrix9 = SMatrix<f64, 9, 9>;
/// 9x3 Jacobian of the tangent space with respect to a 3 dimensional input
pub type Matrix9x3 = SMatrix<f64, 9, 3>;
/// 9x6 Jacobian of the tangent space with respect to the stacked `[acc, gyro]` bias
pub type Matrix9x6 = SMatrix<f64, 9, 6>;
/// Stacked `[accelerometer, gyroscope]` bias vector
pub type Vector6 = SVector<f64, 6>;

/// Row offset of the rotation block in a tangent vector
pub const ROT: usize = 0;
/// Row offset of the position block in a tangent vector
pub const POS: usize = 3;
/// Row offset of the velocity block in a tangent vector
pub const VEL: usize = 6;

/// Create the skew-symmetric matrix from a vector, such that `skew(v) * u == v.cross(&u)`
#[rustfmt::skip]
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0., -v.z, v.y,
                 v.z, 0., -v.x,
                 -v.y, v.x, 0.)
}
