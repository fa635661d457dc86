//! Indirect Kalman filter for attitude and gyro bias.
//!
//! This module contains the error-state filter itself. The nominal state (quaternion
//! plus gyro bias) is propagated by strapdown integration in [AhrsFilter::propagate];
//! the 6x6 error covariance rides along through a linearized transition matrix. The
//! accelerometer and magnetometer updates share one vector-observation correction
//! routine that computes the Kalman gain from a 3x3 closed-form inverse, estimates the
//! six-element error state, and folds it straight back into the quaternion and bias.
//!
//! The filter owns every matrix it touches. All working storage for an update (the
//! Jacobian, innovation covariance, gain) is stack-local to the call; only the
//! covariance, quaternion, bias, and the most recent sensor samples persist between
//! calls. Nothing here allocates and no operation can fail: a singular innovation
//! covariance skips that cycle's correction and bumps a diagnostic counter, and
//! propagation carries on at the next tick.

use std::fmt::{self, Debug, Display};

use nalgebra::{Matrix3, Matrix3x6, Matrix6, Matrix6x3, Quaternion, Vector3, Vector6};

use crate::AhrsStatus;
use crate::linalg::{eulers_of_rmat, invert_3x3, quat_derivative, rmat_of_quat};
use crate::params::FilterParams;

/// Error-state attitude/bias filter context.
///
/// One instance owns the whole filter state for the life of the process. The three
/// operations ([AhrsFilter::propagate], [AhrsFilter::update_accel],
/// [AhrsFilter::update_mag]) mutate it in place and must be invoked in order, never
/// concurrently; if they can fire from different interrupt priority levels the caller
/// must provide mutual exclusion for the duration of each call.
///
/// # Example
///
/// ```rust
/// use ahrs::filter::AhrsFilter;
/// use ahrs::params::FilterParams;
/// use nalgebra::Vector3;
///
/// let params = FilterParams::default();
/// let mut filter = AhrsFilter::new(params);
/// // Bias seed comes from the stationary aligner.
/// filter.align(Vector3::new(0.001, -0.002, 0.0005));
///
/// // Once per IMU tick:
/// filter.propagate(Vector3::new(0.001, -0.002, 0.0005));
/// // Whenever the accelerometer produces a sample:
/// filter.update_accel(Vector3::new(0.0, 0.0, -params.gravity));
///
/// let eulers = filter.euler_angles();
/// assert!(eulers.norm() < 1e-6);
/// ```
#[derive(Clone)]
pub struct AhrsFilter {
    params: FilterParams,
    /// Estimated attitude, navigation to body. Not renormalized after propagation;
    /// norm drift stays bounded in practice through the periodic corrections.
    quat: Quaternion<f64>,
    /// Navigation-to-body DCM, recomputed after every quaternion change.
    dcm: Matrix3<f64>,
    /// Estimated gyro bias in rad/s.
    bias: Vector3<f64>,
    /// Unbiased body rates from the last propagation, a published byproduct.
    rates: Vector3<f64>,
    /// Error-state covariance, order [attitude error; bias error].
    p: Matrix6<f64>,
    /// Most recent accelerometer sample, kept for the magnetometer path.
    last_accel: Vector3<f64>,
    /// Most recent magnetometer sample.
    last_mag: Vector3<f64>,
    status: AhrsStatus,
    skipped_updates: u32,
}

impl Debug for AhrsFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AhrsFilter")
            .field("quat", &self.quat)
            .field("bias", &self.bias)
            .field("p", &self.p)
            .field("status", &self.status)
            .field("skipped_updates", &self.skipped_updates)
            .finish()
    }
}

impl Display for AhrsFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let eulers = self.euler_angles();
        write!(
            f,
            "AhrsFilter {{ roll: {:.4}, pitch: {:.4}, yaw: {:.4}, bias: [{:.5}, {:.5}, {:.5}], status: {:?} }}",
            eulers.x, eulers.y, eulers.z, self.bias.x, self.bias.y, self.bias.z, self.status
        )
    }
}

impl Default for AhrsFilter {
    fn default() -> Self {
        AhrsFilter::new(FilterParams::default())
    }
}

impl AhrsFilter {
    /// Create a filter in the [AhrsStatus::Uninit] state.
    ///
    /// The quaternion starts at identity, the bias at zero, and the covariance at
    /// zero. The filter does nothing useful until [AhrsFilter::align] seeds the bias.
    pub fn new(params: FilterParams) -> Self {
        AhrsFilter {
            params,
            quat: Quaternion::new(1.0, 0.0, 0.0, 0.0),
            dcm: Matrix3::identity(),
            bias: Vector3::zeros(),
            rates: Vector3::zeros(),
            p: Matrix6::zeros(),
            last_accel: Vector3::zeros(),
            last_mag: Vector3::zeros(),
            status: AhrsStatus::Uninit,
            skipped_updates: 0,
        }
    }

    /// Seed the gyro bias from the stationary aligner and start running.
    ///
    /// `lp_gyro` is the low-pass averaged gyro output collected while the vehicle is
    /// at rest; the aligner is responsible for guaranteeing stationarity, no further
    /// validation happens here. The status transition is one-way.
    ///
    /// # Arguments
    /// * `lp_gyro` - averaged stationary gyro rates in rad/s
    pub fn align(&mut self, lp_gyro: Vector3<f64>) {
        self.bias = lp_gyro;
        self.status = AhrsStatus::Running;
    }

    /// Propagate the attitude and the error covariance over one tick.
    ///
    /// Runs the strapdown computation and the predict step of the filter:
    ///
    /// 1. Unbiased rates: $\omega = \omega_{gyro} - b$
    /// 2. Quaternion kinematics: $\dot{q} = \frac{1}{2}\Omega(\omega) q$, integrated
    ///    first order over the fixed tick period. No renormalization.
    /// 3. DCM refresh from the integrated quaternion.
    /// 4. Covariance: $P^- = T P T^T + Q_d$ with $T = I_6 + dt \cdot F$, where the
    ///    only nonzero block of $F$ couples attitude error to bias error through the
    ///    current attitude: $F_{[0..3][3..6]} = -C_b^n$. $Q_d$ is nonzero only on the
    ///    bias diagonal; attitude uncertainty growth is carried entirely by the
    ///    coupling term.
    ///
    /// # Arguments
    /// * `gyro` - raw gyro rates in rad/s, body frame
    pub fn propagate(&mut self, gyro: Vector3<f64>) {
        let dt = self.params.dt;

        // Strapdown: integrate the unbiased rates into the quaternion.
        self.rates = gyro - self.bias;
        let qdot = quat_derivative(&self.quat, &self.rates);
        self.quat = self.quat + qdot * dt;
        self.dcm = rmat_of_quat(&self.quat);

        // Only the error covariance propagates; the error itself is folded into the
        // nominal state after every correction, so its a priori value is zero.
        let mut t = Matrix6::<f64>::identity();
        t.fixed_view_mut::<3, 3>(0, 3)
            .copy_from(&(-dt * self.dcm.transpose()));
        let mut p_apriori = t * self.p * t.transpose();
        for i in 3..6 {
            p_apriori[(i, i)] += self.params.gyro_noise_variance;
        }
        self.p = p_apriori;
    }

    /// Correct attitude and bias from an accelerometer sample.
    ///
    /// The gravity vector is the navigation-frame reference. A single reference
    /// vector observes only the two attitude-error axes orthogonal to it, so the
    /// yaw-error column of the Jacobian is zero and this update never touches
    /// heading.
    ///
    /// # Arguments
    /// * `accel` - measured specific force in m/s^2, body frame
    pub fn update_accel(&mut self, accel: Vector3<f64>) {
        self.last_accel = accel;
        self.correct_vector_observation(accel, self.params.accel_variance);
    }

    /// Correct attitude and bias when a magnetometer sample arrives.
    ///
    /// The sample is recorded, but heading fusion is not wired up: this path repeats
    /// the gravity-reference correction against the most recent accelerometer sample
    /// and the accelerometer variance, so it tightens roll/pitch at the magnetometer
    /// cadence and leaves yaw free.
    // TODO: fuse params.mag_field / params.mag_variance with the recorded sample once
    // the heading observation model is validated in simulation.
    pub fn update_mag(&mut self, mag: Vector3<f64>) {
        self.last_mag = mag;
        let accel = self.last_accel;
        self.correct_vector_observation(accel, self.params.accel_variance);
    }

    /// Shared vector-observation measurement update.
    ///
    /// Parameterized by the measured body-frame vector and the scalar measurement
    /// variance; the navigation-frame reference is the down axis scaled by gravity,
    /// which is the only reference either sensor path currently uses.
    fn correct_vector_observation(&mut self, measured: Vector3<f64>, variance: f64) {
        let g = self.params.gravity;
        let p_apriori = self.p;

        // Measurement Jacobian. Columns 0-1 only: the reference vector is insensitive
        // to rotation about itself (yaw) and to bias error.
        let mut h = Matrix3x6::<f64>::zeros();
        for i in 0..3 {
            h[(i, 0)] = -self.dcm[(i, 1)] * g;
            h[(i, 1)] = self.dcm[(i, 0)] * g;
        }

        // Innovation covariance S = H P^- H^T + R I3, inverted in closed form. A
        // singular S aborts the correction for this cycle; propagation continues at
        // the next tick regardless.
        let s = h * p_apriori * h.transpose() + Matrix3::identity() * variance;
        let inv_s = match invert_3x3(&s) {
            Some(inv) => inv,
            None => {
                self.skipped_updates += 1;
                return;
            }
        };

        // Gain K = P^- H^T S^-1
        let k: Matrix6x3<f64> = p_apriori * h.transpose() * inv_s;

        // Innovation y: predicted body-frame reference minus the measured vector.
        let y = Vector3::new(
            -self.dcm[(0, 2)] * g - measured.x,
            -self.dcm[(1, 2)] * g - measured.y,
            -self.dcm[(2, 2)] * g - measured.z,
        );

        // The a priori error state is zero, so X = K y.
        let x: Vector6<f64> = k * y;

        // P = (I - K H) P^-, the simplified form. Cheaper than Joseph form; roundoff
        // asymmetry stays small at these dimensions.
        self.p = (Matrix6::identity() - k * h) * p_apriori;

        self.apply_error_state(&x);
    }

    /// Fold an error-state estimate into the nominal quaternion and bias.
    ///
    /// The attitude error X[0..2] is a small-angle rotation vector v. The error
    /// quaternion is $(\sqrt{1 - |v|^2/4},\ v/2)$; if $|v|^2/4 > 1$ (out of the
    /// small-angle regime, should not occur) the scalar part is pinned to 1 and the
    /// whole quaternion renormalized by $1/\sqrt{1 + |v|^2/4}$. The bias error
    /// X[3..5] is subtracted directly.
    fn apply_error_state(&mut self, x: &Vector6<f64>) {
        let v = Vector3::new(x[0], x[1], x[2]);
        let q_sq = v.norm_squared() / 4.0;
        let quat_err = if q_sq <= 1.0 {
            Quaternion::new((1.0 - q_sq).sqrt(), v.x / 2.0, v.y / 2.0, v.z / 2.0)
        } else {
            Quaternion::new(1.0, v.x / 2.0, v.y / 2.0, v.z / 2.0) * (1.0 / (1.0 + q_sq).sqrt())
        };

        self.quat = self.quat * quat_err;
        self.bias -= Vector3::new(x[3], x[4], x[5]);
        self.dcm = rmat_of_quat(&self.quat);
    }

    /// Current attitude quaternion, navigation to body.
    pub fn quaternion(&self) -> Quaternion<f64> {
        self.quat
    }

    /// Current navigation-to-body rotation matrix.
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.dcm
    }

    /// Current attitude as roll/pitch/yaw in radians.
    pub fn euler_angles(&self) -> Vector3<f64> {
        eulers_of_rmat(&self.dcm)
    }

    /// Unbiased body rates from the most recent propagation, rad/s.
    pub fn body_rates(&self) -> Vector3<f64> {
        self.rates
    }

    /// Current gyro bias estimate, rad/s.
    pub fn gyro_bias(&self) -> Vector3<f64> {
        self.bias
    }

    /// Error-state covariance, order [attitude error; bias error].
    pub fn covariance(&self) -> Matrix6<f64> {
        self.p
    }

    /// Lifecycle status.
    pub fn status(&self) -> AhrsStatus {
        self.status
    }

    /// Number of corrections skipped because the innovation covariance was singular.
    /// Diagnostic only; the filter never reports these as errors.
    pub fn skipped_updates(&self) -> u32 {
        self.skipped_updates
    }

    /// The parameter set this filter was built with.
    pub fn params(&self) -> &FilterParams {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn aligned_filter() -> AhrsFilter {
        let mut filter = AhrsFilter::new(FilterParams::default());
        filter.align(Vector3::zeros());
        filter
    }

    #[test]
    fn propagate_with_zero_unbiased_rate_keeps_quaternion() {
        let bias = Vector3::new(0.01, -0.02, 0.005);
        let mut filter = AhrsFilter::new(FilterParams::default());
        filter.align(bias);
        for _ in 0..100 {
            filter.propagate(bias);
        }
        let q = filter.quaternion();
        assert_eq!(q.w, 1.0);
        assert_eq!(q.i, 0.0);
        assert_eq!(q.j, 0.0);
        assert_eq!(q.k, 0.0);
        assert_eq!(filter.body_rates(), Vector3::zeros());
    }

    #[test]
    fn covariance_growth_is_bias_block_only() {
        let mut filter = aligned_filter();
        filter.propagate(Vector3::zeros());
        let p = filter.covariance();
        // Starting from P = 0, one tick leaves exactly the additive process noise:
        // gyro variance on the bias diagonal, nothing anywhere else.
        for i in 0..6 {
            for j in 0..6 {
                if i == j && i >= 3 {
                    assert_eq!(p[(i, j)], params::GYRO_NOISE_VARIANCE);
                } else {
                    assert_eq!(p[(i, j)], 0.0);
                }
            }
        }
    }

    #[test]
    fn covariance_stays_symmetric() {
        let mut filter = aligned_filter();
        let mut rng = StdRng::seed_from_u64(42);
        let g = filter.params().gravity;
        for step in 0..500usize {
            let gyro = Vector3::new(
                rng.random_range(-0.1..0.1),
                rng.random_range(-0.1..0.1),
                rng.random_range(-0.1..0.1),
            );
            filter.propagate(gyro);
            if step % 7 == 0 {
                let accel = Vector3::new(
                    rng.random_range(-0.5..0.5),
                    rng.random_range(-0.5..0.5),
                    -g + rng.random_range(-0.5..0.5),
                );
                filter.update_accel(accel);
            }
            if step % 13 == 0 {
                filter.update_mag(Vector3::new(200.0, 0.0, 400.0));
            }
        }
        let p = filter.covariance();
        for i in 0..6 {
            for j in 0..6 {
                assert_approx_eq!(p[(i, j)], p[(j, i)], 1e-9);
            }
        }
    }

    #[test]
    fn singular_innovation_covariance_skips_update() {
        // With P = 0 and zero measurement variance S is exactly singular; the whole
        // correction must be a no-op apart from the diagnostic counter.
        let degenerate = FilterParams {
            accel_variance: 0.0,
            ..FilterParams::default()
        };
        let mut filter = AhrsFilter::new(degenerate);
        filter.align(Vector3::zeros());

        let before_q = filter.quaternion();
        let before_bias = filter.gyro_bias();
        let before_p = filter.covariance();

        filter.update_accel(Vector3::new(0.0, 0.0, -params::GRAVITY));

        assert_eq!(filter.skipped_updates(), 1);
        assert_eq!(filter.quaternion(), before_q);
        assert_eq!(filter.gyro_bias(), before_bias);
        assert_eq!(filter.covariance(), before_p);
        assert_eq!(filter.status(), AhrsStatus::Running);
    }

    #[test]
    fn perfect_accel_reading_is_a_fixed_point() {
        let mut filter = aligned_filter();
        // Grow some covariance so the gain is nonzero.
        for _ in 0..50 {
            filter.propagate(Vector3::zeros());
        }
        let before = filter.quaternion();
        filter.update_accel(Vector3::new(0.0, 0.0, -params::GRAVITY));
        let after = filter.quaternion();
        // Zero innovation means zero error state; attitude and bias are untouched.
        assert_approx_eq!(after.w, before.w, 1e-15);
        assert_approx_eq!(after.i, before.i, 1e-15);
        assert_approx_eq!(after.j, before.j, 1e-15);
        assert_approx_eq!(after.k, before.k, 1e-15);
        assert_eq!(filter.gyro_bias(), Vector3::zeros());
        assert_eq!(filter.skipped_updates(), 0);
    }

    #[test]
    fn error_quaternion_out_of_range_branch_renormalizes() {
        let mut filter = aligned_filter();
        // |v|^2 / 4 = 9/4 > 1 forces the alternate branch; composed onto the identity
        // the result must come out unit norm.
        let x = Vector6::new(3.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        filter.apply_error_state(&x);
        assert_approx_eq!(filter.quaternion().norm(), 1.0, 1e-12);
    }

    #[test]
    fn error_quaternion_small_angle_branch_is_unit_norm() {
        let mut filter = aligned_filter();
        let x = Vector6::new(0.02, -0.01, 0.005, 0.0, 0.0, 0.0);
        filter.apply_error_state(&x);
        assert_approx_eq!(filter.quaternion().norm(), 1.0, 1e-12);
    }

    #[test]
    fn error_state_bias_part_is_subtracted() {
        let mut filter = aligned_filter();
        let x = Vector6::new(0.0, 0.0, 0.0, 0.001, -0.002, 0.003);
        filter.apply_error_state(&x);
        assert_approx_eq!(filter.gyro_bias().x, -0.001, 1e-15);
        assert_approx_eq!(filter.gyro_bias().y, 0.002, 1e-15);
        assert_approx_eq!(filter.gyro_bias().z, -0.003, 1e-15);
    }

    #[test]
    fn align_is_one_way() {
        let mut filter = AhrsFilter::new(FilterParams::default());
        assert_eq!(filter.status(), AhrsStatus::Uninit);
        filter.align(Vector3::new(0.01, 0.0, 0.0));
        assert_eq!(filter.status(), AhrsStatus::Running);
        assert_eq!(filter.gyro_bias(), Vector3::new(0.01, 0.0, 0.0));
        // A second align re-seeds the bias but the status stays Running.
        filter.align(Vector3::zeros());
        assert_eq!(filter.status(), AhrsStatus::Running);
    }
}
