use core::ops::{AddAssign, SubAssign};

use nalgebra::{Matrix3, Vector3};

use crate::noise::is_positive_semidefinite;
use crate::{
    skew, so3, CovarianceCorrection, Error, GaussianNoise, ImuBias, Matrix9, Matrix9x3, Matrix9x6,
    NavState, Params, Result, Vector9, POS, ROT, VEL,
};

/// Jacobians of a single [`update_estimate`](PreIntegrator::update_estimate) step
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StepJacobians {
    /// Derivative of the new tangent delta with respect to the previous one
    pub a: Matrix9,
    /// Derivative with respect to the bias corrected acceleration
    pub b_acc: Matrix9x3,
    /// Derivative with respect to the bias corrected angular velocity
    pub b_omega: Matrix9x3,
}

/// Jacobians of [`predict`](PreIntegrator::predict), in the tangent space of the predicted state
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PredictJacobians {
    /// Derivative with respect to the starting state
    pub state: Matrix9,
    /// Derivative with respect to the stacked `[acc, gyro]` bias at the starting state
    pub bias: Matrix9x6,
}

/// Accumulates IMU measurements between two navigation states.
///
/// The integrator keeps the tangent delta `zeta = [theta, position, velocity]` relative to the
/// body frame at the start of the window, the covariance of `zeta` induced by sensor noise, and the
/// derivative of `zeta` with respect to the bias. A new integrator is created for every window.
///
/// # Example
/// ```
/// # use imu_preint::{Builder, ImuBias, NavState, PreIntegrator};
/// # use nalgebra::Vector3;
/// let params = Builder::new().accelerometer_noise_density(0.01).build();
/// let mut preint = PreIntegrator::new(params, ImuBias::zero()).unwrap();
///
/// // Integrate multiple IMU measurements (e.g., at 1000 Hz)
/// for _ in 0..10 {
///     preint
///         .integrate_measurement(Vector3::new(1.0, 0.0, -9.81), Vector3::zeros(), 0.001)
///         .unwrap();
/// }
///
/// // Relate the state at the start of the window to the state at its end
/// let state_j = preint.predict(&NavState::identity(), &ImuBias::zero());
/// assert!((state_j.velocity.x - 0.01).abs() < 1e-12);
/// ```
#[derive(Clone, Debug)]
pub struct PreIntegrator {
    params: Params,
    estimated_bias: ImuBias,
    /// Tangent delta since the start of the window. Order: (rotation, position, velocity)
    zeta: Vector9,
    /// 9x9 covariance of `zeta`
    covariance: Matrix9,
    /// 9x6 Jacobian of `zeta` w.r.t. the bias. Order: d(rotation, position, velocity)/d(acc_bias, gyr_bias)
    bias_jacobian: Matrix9x6,
    count: usize,
    delta_time: f64,
}

impl PreIntegrator {
    /// Start a new integration window with the given sensor parameters and bias estimate.
    ///
    /// Fails if the noise densities are not symmetric positive semi-definite or gravity is not
    /// finite.
    pub fn new(params: Params, estimated_bias: ImuBias) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            estimated_bias,
            zeta: Vector9::zeros(),
            covariance: Matrix9::zeros(),
            bias_jacobian: Matrix9x6::zeros(),
            count: 0,
            delta_time: 0.0,
        })
    }

    /// Propagate the tangent delta `zeta` by one bias corrected sample of duration `dt`.
    ///
    /// Rotation is integrated exactly through the inverse differential of the exponential map,
    /// position and velocity with the acceleration rotated into the start frame.
    ///
    /// `dt` must be strictly positive.
    pub fn update_estimate(
        zeta: &Vector9,
        acc: &Vector3<f64>,
        omega: &Vector3<f64>,
        dt: f64,
    ) -> Vector9 {
        debug_assert!(dt > 0.0, "time step must be positive, got {}", dt);
        let theta = zeta.fixed_rows::<3>(ROT).into_owned();
        let r_adt = so3::expmap(&theta) * (acc * dt);
        let inv_h = so3::right_jacobian_inverse(&theta);
        Self::propagate_mean(zeta, &r_adt, &(inv_h * (omega * dt)), dt)
    }

    /// [`update_estimate`](PreIntegrator::update_estimate) together with the Jacobians of the
    /// step.
    ///
    /// The derivatives with respect to the bias corrected inputs and the coupling of position and
    /// velocity to the rotation are exact. The rotation block with respect to itself uses the
    /// first order approximation `I - skew(omega dt) / 2`, which holds for the small per-sample
    /// rotations of a high rate IMU.
    pub fn update_estimate_with_jacobians(
        zeta: &Vector9,
        acc: &Vector3<f64>,
        omega: &Vector3<f64>,
        dt: f64,
    ) -> (Vector9, StepJacobians) {
        debug_assert!(dt > 0.0, "time step must be positive, got {}", dt);
        let a_dt = acc * dt;
        let w_dt = omega * dt;

        let theta = zeta.fixed_rows::<3>(ROT).into_owned();
        let (rot, d_r_theta) = so3::expmap_with_derivative(&theta);
        let inv_h = so3::right_jacobian_inverse(&theta);
        let (r_adt, d_radt_r, d_radt_adt) = so3::rotate_with_jacobians(&rot, &a_dt);

        let zeta_plus = Self::propagate_mean(zeta, &r_adt, &(inv_h * w_dt), dt);

        // Exact derivative of R*a*dt with respect to theta
        let d_radt_theta = d_radt_r * d_r_theta;
        let dt2 = 0.5 * dt;

        let mut a = Matrix9::identity();
        // First order (small angle) approximation of the derivative of invH*w*dt
        a.fixed_view_mut::<3, 3>(ROT, ROT)
            .add_assign(&skew(&(-0.5 * w_dt)));
        a.fixed_view_mut::<3, 3>(POS, ROT)
            .copy_from(&(d_radt_theta * dt2));
        a.fixed_view_mut::<3, 3>(POS, VEL)
            .copy_from(&(Matrix3::identity() * dt));
        a.fixed_view_mut::<3, 3>(VEL, ROT).copy_from(&d_radt_theta);

        let mut b_acc = Matrix9x3::zeros();
        b_acc
            .fixed_view_mut::<3, 3>(POS, 0)
            .copy_from(&(d_radt_adt * dt * dt2));
        b_acc
            .fixed_view_mut::<3, 3>(VEL, 0)
            .copy_from(&(d_radt_adt * dt));

        let mut b_omega = Matrix9x3::zeros();
        b_omega
            .fixed_view_mut::<3, 3>(ROT, 0)
            .copy_from(&(inv_h * dt));

        (zeta_plus, StepJacobians { a, b_acc, b_omega })
    }

    /// Mean propagation shared by both update variants, given the acceleration increment already
    /// rotated into the start frame and the rotation increment in tangent coordinates.
    fn propagate_mean(
        zeta: &Vector9,
        r_adt: &Vector3<f64>,
        d_theta: &Vector3<f64>,
        dt: f64,
    ) -> Vector9 {
        let mut zeta_plus = *zeta;
        zeta_plus.fixed_rows_mut::<3>(ROT).add_assign(d_theta);
        zeta_plus
            .fixed_rows_mut::<3>(POS)
            .add_assign(&(zeta.fixed_rows::<3>(VEL) * dt + r_adt * (0.5 * dt)));
        zeta_plus.fixed_rows_mut::<3>(VEL).add_assign(r_adt);
        zeta_plus
    }

    /// Integrate a single IMU measurement into the accumulated state.
    ///
    /// # Arguments
    /// - `measured_acc`: Measured acceleration from accelerometer (m/s²)
    /// - `measured_omega`: Measured angular velocity from gyroscope (rad/s)
    /// - `dt`: Time step since the previous measurement (seconds)
    ///
    /// # Errors
    /// Rejects a `dt` that is not finite and strictly positive, samples with non-finite
    /// components, and samples whose update overflows. A rejected sample leaves the integrator
    /// untouched.
    pub fn integrate_measurement(
        &mut self,
        measured_acc: Vector3<f64>,
        measured_omega: Vector3<f64>,
        dt: f64,
    ) -> Result<()> {
        if !(dt.is_finite() && dt > 0.0) {
            log::warn!("rejecting IMU sample {} with time step {}", self.count, dt);
            return Err(Error::InvalidTimeStep(dt));
        }
        if !measured_acc
            .iter()
            .chain(measured_omega.iter())
            .all(|e| e.is_finite())
        {
            log::warn!("rejecting non-finite IMU sample {}", self.count);
            return Err(Error::NonFiniteMeasurement);
        }

        let acc = self.estimated_bias.correct_accelerometer(&measured_acc);
        let omega = self.estimated_bias.correct_gyroscope(&measured_omega);

        let (zeta, j) = Self::update_estimate_with_jacobians(&self.zeta, &acc, &omega, dt);

        // Continuous noise densities become per-step covariances through division by dt
        let w = self.params.gyroscope_covariance / dt;
        let a = self.params.accelerometer_covariance / dt;
        let mut covariance = j.a * self.covariance * j.a.transpose()
            + j.b_omega * w * j.b_omega.transpose()
            + j.b_acc * a * j.b_acc.transpose();
        covariance.fill_lower_triangle_with_upper_triangle();

        // The inputs are measurement minus bias, hence the negated input Jacobians
        let mut bias_jacobian = j.a * self.bias_jacobian;
        bias_jacobian
            .fixed_view_mut::<9, 3>(0, 0)
            .sub_assign(&j.b_acc);
        bias_jacobian
            .fixed_view_mut::<9, 3>(0, 3)
            .sub_assign(&j.b_omega);

        // A tiny dt or huge sample can still overflow, e.g. a subnormal dt in `covariance / dt`
        if !zeta
            .iter()
            .chain(covariance.iter())
            .chain(bias_jacobian.iter())
            .all(|e| e.is_finite())
        {
            log::warn!(
                "rejecting IMU sample {} (dt = {}), the update is not finite",
                self.count,
                dt
            );
            return Err(Error::NonFiniteUpdate);
        }
        if !is_positive_semidefinite(&covariance) {
            log::warn!(
                "covariance is no longer positive semi-definite after IMU sample {}",
                self.count
            );
        }

        self.zeta = zeta;
        self.covariance = covariance;
        self.bias_jacobian = bias_jacobian;
        self.count += 1;
        self.delta_time += dt;
        log::trace!(
            "integrated IMU sample {} (dt = {}, window = {} s)",
            self.count,
            dt,
            self.delta_time
        );
        Ok(())
    }

    /// Predict the state at the end of the window from the state `state_i` at its start.
    ///
    /// `bias_i` is the bias estimate at `state_i`; its difference to the bias used during
    /// integration is applied as a first order correction.
    pub fn predict(&self, state_i: &NavState, bias_i: &ImuBias) -> NavState {
        state_i.retract(&self.corrected_zeta(state_i, bias_i))
    }

    /// [`predict`](PreIntegrator::predict) together with its derivatives with respect to the
    /// starting state and the bias.
    pub fn predict_with_jacobians(
        &self,
        state_i: &NavState,
        bias_i: &ImuBias,
    ) -> (NavState, PredictJacobians) {
        let zeta = self.corrected_zeta(state_i, bias_i);
        let (state_j, d_retract_state, d_retract_zeta) = state_i.retract_with_jacobians(&zeta);

        // The gravity and initial velocity correction depends on the starting attitude and velocity
        let rit = state_i.attitude.inverse();
        let dt = self.delta_time;
        let gt = self.params.gravity * dt;
        let mut d_zeta_state = Matrix9::zeros();
        d_zeta_state
            .fixed_view_mut::<3, 3>(POS, ROT)
            .copy_from(&skew(&(rit * (state_i.velocity * dt + 0.5 * dt * gt))));
        d_zeta_state
            .fixed_view_mut::<3, 3>(POS, VEL)
            .copy_from(&(Matrix3::identity() * dt));
        d_zeta_state
            .fixed_view_mut::<3, 3>(VEL, ROT)
            .copy_from(&skew(&(rit * gt)));

        let jacobians = PredictJacobians {
            state: d_retract_state + d_retract_zeta * d_zeta_state,
            bias: d_retract_zeta * self.bias_jacobian,
        };
        (state_j, jacobians)
    }

    fn corrected_zeta(&self, state_i: &NavState, bias_i: &ImuBias) -> Vector9 {
        let mut zeta = self.zeta + self.bias_jacobian * (*bias_i - self.estimated_bias);

        // Correct for initial velocity and gravity
        let rit = state_i.attitude.inverse();
        let dt = self.delta_time;
        let gt = self.params.gravity * dt;
        zeta.fixed_rows_mut::<3>(POS)
            .add_assign(&(rit * (state_i.velocity * dt + 0.5 * dt * gt)));
        zeta.fixed_rows_mut::<3>(VEL).add_assign(&(rit * gt));
        zeta
    }

    /// Covariance of `zeta` mapped through the derivative of the retraction applied by
    /// [`predict`](PreIntegrator::predict), `H Σ Hᵀ` with `H = blockdiag(Jr(θ), ΔRᵀ, ΔRᵀ)`.
    pub fn retract_covariance(&self) -> Matrix9 {
        let h = NavState::retract_derivative(&self.zeta);
        h * self.covariance * h.transpose()
    }

    /// Covariance of the preintegrated measurement, as selected by
    /// [`Params::covariance_correction`].
    pub fn preint_meas_cov(&self) -> Matrix9 {
        match self.params.covariance_correction {
            CovarianceCorrection::None => self.covariance,
            CovarianceCorrection::Retract => self.retract_covariance(),
        }
    }

    /// Gaussian noise model of the preintegrated measurement.
    ///
    /// Fails with [`Error::InversionError`] while the covariance is not positive definite, for
    /// instance before any measurement has been integrated.
    pub fn noise_model(&self) -> Result<GaussianNoise<9>> {
        GaussianNoise::from_covariance(self.preint_meas_cov()).inspect_err(|_| {
            log::debug!(
                "covariance after {} IMU samples is not positive definite",
                self.count
            )
        })
    }

    /// Check that the accumulated covariance is still symmetric positive semi-definite.
    pub fn check_covariance(&self) -> Result<()> {
        if is_positive_semidefinite(&self.covariance) {
            Ok(())
        } else {
            Err(Error::CovarianceNotPositiveSemidefinite)
        }
    }

    /// Tangent delta accumulated so far. Order: (rotation, position, velocity)
    pub fn zeta(&self) -> &Vector9 {
        &self.zeta
    }

    /// Rotation vector of the accumulated rotation
    pub fn theta(&self) -> Vector3<f64> {
        self.zeta.fixed_rows::<3>(ROT).into_owned()
    }

    /// Accumulated position change in the start frame, excluding gravity and initial velocity
    pub fn delta_position(&self) -> Vector3<f64> {
        self.zeta.fixed_rows::<3>(POS).into_owned()
    }

    /// Accumulated velocity change in the start frame, excluding gravity
    pub fn delta_velocity(&self) -> Vector3<f64> {
        self.zeta.fixed_rows::<3>(VEL).into_owned()
    }

    /// Covariance of [`zeta`](PreIntegrator::zeta)
    pub fn covariance(&self) -> &Matrix9 {
        &self.covariance
    }

    /// Derivative of [`zeta`](PreIntegrator::zeta) with respect to the stacked `[acc, gyro]` bias
    pub fn bias_jacobian(&self) -> &Matrix9x6 {
        &self.bias_jacobian
    }

    /// Number of integrated measurements
    pub fn count(&self) -> usize {
        self.count
    }

    /// Get the total accumulated time
    pub fn delta_time(&self) -> f64 {
        self.delta_time
    }

    /// Check if any measurements have been integrated
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Bias subtracted from every measurement of this window
    pub fn estimated_bias(&self) -> &ImuBias {
        &self.estimated_bias
    }

    /// Sensor parameters of this window
    pub fn params(&self) -> &Params {
        &self.params
    }
}
