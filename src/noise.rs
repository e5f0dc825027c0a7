use nalgebra::{SMatrix, SVector};

use crate::{Error, Result};

/// Zero-mean Gaussian noise model of dimension `D`
///
/// Stores the covariance `Σ` together with its lower Cholesky factor `L` (`Σ = L Lᵀ`) and the
/// square root information matrix `R = L⁻¹`, so that `RᵀR = Σ⁻¹`. Whitening a residual `e` with
/// `R` turns the Mahalanobis distance `eᵀ Σ⁻¹ e` into a plain squared norm, which is what a
/// least-squares solver consumes.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GaussianNoise<const D: usize> {
    covariance: SMatrix<f64, D, D>,
    sqrt_covariance: SMatrix<f64, D, D>,
    sqrt_information: SMatrix<f64, D, D>,
}

impl<const D: usize> GaussianNoise<D> {
    /// Build a noise model from a symmetric positive definite covariance. Only the lower triangle
    /// is read by the factorization.
    ///
    /// Fails with [`Error::InversionError`] when the covariance is not positive definite.
    pub fn from_covariance(covariance: SMatrix<f64, D, D>) -> Result<Self> {
        let sqrt_covariance = covariance.cholesky().ok_or(Error::InversionError)?.l();
        let sqrt_information = sqrt_covariance
            .solve_lower_triangular(&SMatrix::<f64, D, D>::identity())
            .ok_or(Error::InversionError)?;
        Ok(Self {
            covariance,
            sqrt_covariance,
            sqrt_information,
        })
    }

    /// Build a diagonal noise model from per-axis standard deviations
    pub fn from_sigmas(sigmas: &SVector<f64, D>) -> Result<Self> {
        Self::from_covariance(SMatrix::from_diagonal(&sigmas.component_mul(sigmas)))
    }

    /// Dimension of the modelled noise
    pub fn dim(&self) -> usize {
        D
    }

    /// Covariance `Σ`
    pub fn covariance(&self) -> &SMatrix<f64, D, D> {
        &self.covariance
    }

    /// Information matrix `Σ⁻¹`
    pub fn information(&self) -> SMatrix<f64, D, D> {
        self.sqrt_information.transpose() * self.sqrt_information
    }

    /// Square root information matrix `R` with `RᵀR = Σ⁻¹`
    pub fn sqrt_information(&self) -> &SMatrix<f64, D, D> {
        &self.sqrt_information
    }

    /// Whiten a residual, `R e`
    pub fn whiten(&self, e: &SVector<f64, D>) -> SVector<f64, D> {
        self.sqrt_information * e
    }

    /// Inverse of [`whiten`](GaussianNoise::whiten), `L e`
    pub fn unwhiten(&self, e: &SVector<f64, D>) -> SVector<f64, D> {
        self.sqrt_covariance * e
    }

    /// Squared Mahalanobis distance `eᵀ Σ⁻¹ e`
    pub fn squared_mahalanobis_distance(&self, e: &SVector<f64, D>) -> f64 {
        self.whiten(e).norm_squared()
    }
}

/// Symmetric and free of eigenvalues below `-1e-10 |M|max`, checked by factorizing the matrix
/// with a small diagonal jitter.
pub(crate) fn is_positive_semidefinite<const D: usize>(m: &SMatrix<f64, D, D>) -> bool {
    if !m.iter().all(|e| e.is_finite()) {
        return false;
    }
    let scale = m.amax();
    if (m - m.transpose()).amax() > 1e-12 * scale {
        return false;
    }
    let jitter = 1e-10 * scale + f64::MIN_POSITIVE;
    (m + SMatrix::<f64, D, D>::identity() * jitter)
        .cholesky()
        .is_some()
}

#[cfg(test)]
mod test {
    use super::{is_positive_semidefinite, GaussianNoise};
    use crate::Error;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, Vector3};

    fn covariance() -> Matrix3<f64> {
        Matrix3::new(4.0, 1.0, 0.5, 1.0, 3.0, -0.2, 0.5, -0.2, 2.0)
    }

    #[test]
    fn information_is_inverse_covariance() {
        let noise = GaussianNoise::from_covariance(covariance()).unwrap();
        assert_relative_eq!(
            noise.information() * noise.covariance(),
            Matrix3::identity(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn whitening() {
        let noise = GaussianNoise::from_covariance(covariance()).unwrap();
        let e = Vector3::new(0.3, -1.2, 2.0);
        let expected = (e.transpose() * covariance().try_inverse().unwrap() * e)[0];
        assert_relative_eq!(noise.squared_mahalanobis_distance(&e), expected, epsilon = 1e-12);
        assert_relative_eq!(noise.unwhiten(&noise.whiten(&e)), e, epsilon = 1e-12);
    }

    #[test]
    fn diagonal_from_sigmas() {
        let noise = GaussianNoise::from_sigmas(&Vector3::new(0.1, 0.2, 0.3)).unwrap();
        assert_relative_eq!(
            *noise.covariance(),
            Matrix3::from_diagonal(&Vector3::new(0.01, 0.04, 0.09)),
            epsilon = 1e-15
        );
        assert_relative_eq!(
            noise.whiten(&Vector3::new(0.1, 0.2, 0.3)),
            Vector3::new(1.0, 1.0, 1.0),
            epsilon = 1e-12
        );
        assert_eq!(noise.dim(), 3);
    }

    #[test]
    fn singular_covariance_is_rejected() {
        let singular = Matrix3::from_diagonal(&Vector3::new(1.0, 0.0, 1.0));
        assert_eq!(
            GaussianNoise::from_covariance(singular).unwrap_err(),
            Error::InversionError
        );
    }

    #[test]
    fn semidefinite_check() {
        assert!(is_positive_semidefinite(&Matrix3::<f64>::zeros()));
        assert!(is_positive_semidefinite(&covariance()));
        let v = Vector3::new(1.0, 2.0, -1.0);
        assert!(is_positive_semidefinite(&(v * v.transpose())));
        assert!(!is_positive_semidefinite(&Matrix3::from_diagonal(
            &Vector3::new(1.0, -1e-3, 1.0)
        )));
        assert!(!is_positive_semidefinite(&Matrix3::new(
            1.0, 0.5, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0
        )));
    }
}
