use core::ops::Sub;

use nalgebra::Vector3;

use crate::Vector6;

/// Constant accelerometer and gyroscope offsets over one integration window
///
/// The bias is estimated elsewhere, the preintegrator only subtracts it from every raw sample.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImuBias {
    /// Accelerometer offset in `m/s²`
    pub accelerometer: Vector3<f64>,
    /// Gyroscope offset in `rad/s`
    pub gyroscope: Vector3<f64>,
}

impl ImuBias {
    /// Create a bias from accelerometer and gyroscope offsets
    pub fn new(accelerometer: Vector3<f64>, gyroscope: Vector3<f64>) -> Self {
        Self {
            accelerometer,
            gyroscope,
        }
    }

    /// A perfect IMU without offsets
    pub fn zero() -> Self {
        Self::new(Vector3::zeros(), Vector3::zeros())
    }

    /// Stacked `[accelerometer, gyroscope]` vector
    pub fn vector(&self) -> Vector6 {
        let mut v = Vector6::zeros();
        v.fixed_rows_mut::<3>(0).copy_from(&self.accelerometer);
        v.fixed_rows_mut::<3>(3).copy_from(&self.gyroscope);
        v
    }

    /// Inverse of [`vector`](ImuBias::vector)
    pub fn from_vector(v: &Vector6) -> Self {
        Self::new(
            v.fixed_rows::<3>(0).into_owned(),
            v.fixed_rows::<3>(3).into_owned(),
        )
    }

    /// Remove the accelerometer offset from a raw reading
    pub fn correct_accelerometer(&self, measured: &Vector3<f64>) -> Vector3<f64> {
        measured - self.accelerometer
    }

    /// Remove the gyroscope offset from a raw reading
    pub fn correct_gyroscope(&self, measured: &Vector3<f64>) -> Vector3<f64> {
        measured - self.gyroscope
    }
}

impl Default for ImuBias {
    fn default() -> Self {
        Self::zero()
    }
}

impl Sub for ImuBias {
    type Output = Vector6;

    fn sub(self, rhs: Self) -> Vector6 {
        self.vector() - rhs.vector()
    }
}
