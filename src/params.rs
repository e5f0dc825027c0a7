use nalgebra::{Matrix3, Vector3};
#[cfg(feature = "no_std")]
use num_traits::float::Float;

use crate::noise::is_positive_semidefinite;
use crate::{Error, Result};

/// Which covariance the preintegrator reports as the noise of its summary
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CovarianceCorrection {
    /// Report the covariance accumulated in tangent coordinates as is.
    #[default]
    None,
    /// Report the covariance mapped through the derivative of the retraction used by
    /// [`predict`](crate::PreIntegrator::predict), `H Σ Hᵀ`.
    Retract,
}

/// Sensor noise and gravity shared by every integration window
///
/// The noise matrices are continuous-time spectral densities. The discrete covariance of a sample
/// of duration `dt` is the density divided by `dt`.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Params {
    /// Accelerometer white noise density in `(m/s²)²/Hz`
    pub accelerometer_covariance: Matrix3<f64>,
    /// Gyroscope white noise density in `(rad/s)²/Hz`
    pub gyroscope_covariance: Matrix3<f64>,
    /// Gravity vector in the navigation frame in `m/s²`
    pub gravity: Vector3<f64>,
    /// Covariance reported by the noise model
    pub covariance_correction: CovarianceCorrection,
}

impl Params {
    /// Check that both noise densities are symmetric positive semi-definite and that gravity is
    /// finite.
    pub fn validate(&self) -> Result<()> {
        if !self.gravity.iter().all(|g| g.is_finite()) {
            return Err(Error::NonFiniteGravity);
        }
        for covariance in [&self.accelerometer_covariance, &self.gyroscope_covariance] {
            if !is_positive_semidefinite(covariance) {
                return Err(Error::CovarianceNotPositiveSemidefinite);
            }
        }
        Ok(())
    }
}

impl Default for Params {
    fn default() -> Self {
        Builder::default().build()
    }
}

/// Builder for [`Params`]
#[derive(Copy, Clone, Debug)]
pub struct Builder {
    acc_cov: Matrix3<f64>,
    gyr_cov: Matrix3<f64>,
    gravity: Vector3<f64>,
    covariance_correction: CovarianceCorrection,
}

impl Builder {
    /// Create a new builder modelling a perfect IMU under 9.81 m/s² gravity
    pub fn new() -> Self {
        Builder::default()
    }

    /// Set the accelerometer noise density, the same on all axes
    ///
    /// The density should be `m/(s²√Hz)`
    pub fn accelerometer_noise_density(mut self, sigma: f64) -> Self {
        self.acc_cov = Matrix3::from_diagonal_element(sigma.powi(2));
        self
    }

    /// Set the accelerometer noise density per axis
    ///
    /// The density should be a vector in [`m/(s²√Hz)`, 3]
    pub fn accelerometer_noise_density_from_vec(mut self, sigma: Vector3<f64>) -> Self {
        self.acc_cov = Matrix3::from_diagonal(&sigma.map(|e| e.powi(2)));
        self
    }

    /// Set the full accelerometer noise density matrix in `(m/s²)²/Hz`
    pub fn accelerometer_covariance(mut self, covariance: Matrix3<f64>) -> Self {
        self.acc_cov = covariance;
        self
    }

    /// Set the gyroscope noise density, the same on all axes
    ///
    /// The density should be `rad/(s√Hz)`
    pub fn gyroscope_noise_density(mut self, sigma: f64) -> Self {
        self.gyr_cov = Matrix3::from_diagonal_element(sigma.powi(2));
        self
    }

    /// Set the gyroscope noise density per axis
    ///
    /// The density should be a vector in [`rad/(s√Hz)`, 3]
    pub fn gyroscope_noise_density_from_vec(mut self, sigma: Vector3<f64>) -> Self {
        self.gyr_cov = Matrix3::from_diagonal(&sigma.map(|e| e.powi(2)));
        self
    }

    /// Set the full gyroscope noise density matrix in `(rad/s)²/Hz`
    pub fn gyroscope_covariance(mut self, covariance: Matrix3<f64>) -> Self {
        self.gyr_cov = covariance;
        self
    }

    /// Set the used gravity in m/s², along the navigation frame z-axis.
    ///
    /// The default value is 9.81 m/s², i.e. a z-axis pointing down.
    pub fn gravity(mut self, gravity: f64) -> Self {
        self.gravity = Vector3::new(0.0, 0.0, gravity);
        self
    }

    /// Set an arbitrary gravity vector in the navigation frame
    pub fn gravity_vector(mut self, gravity: Vector3<f64>) -> Self {
        self.gravity = gravity;
        self
    }

    /// Choose which covariance the noise model reports
    pub fn covariance_correction(mut self, correction: CovarianceCorrection) -> Self {
        self.covariance_correction = correction;
        self
    }

    /// Convert the builder into parameters
    pub fn build(self) -> Params {
        Params {
            accelerometer_covariance: self.acc_cov,
            gyroscope_covariance: self.gyr_cov,
            gravity: self.gravity,
            covariance_correction: self.covariance_correction,
        }
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            acc_cov: Matrix3::zeros(),
            gyr_cov: Matrix3::zeros(),
            gravity: Vector3::new(0.0, 0.0, 9.81),
            covariance_correction: CovarianceCorrection::None,
        }
    }
}
