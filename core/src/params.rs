//! Filter constants and tunable parameters.
//!
//! The AHRS is configured at compile time: the tick period, the process and
//! measurement noise variances, the gravity magnitude, and the local magnetic field
//! reference are all constants chosen for the target airframe. The [FilterParams]
//! value type exists so that simulations and tests can run the same filter code with
//! different numbers; the flight configuration is simply [FilterParams::default].

use nalgebra::Vector3;

/// Fixed propagation period in seconds. The IMU delivers samples at 512 Hz.
pub const AHRS_DT: f64 = 1.0 / 512.0;

/// Gyro process-noise variance in (rad/s)^2.
///
/// Measured at about 0.09 rad/s standard deviation on the bench; this feeds the bias
/// random walk, not the attitude states (see [crate::filter::AhrsFilter::propagate]).
pub const GYRO_NOISE_VARIANCE: f64 = 8e-3;

/// Accelerometer measurement variance in (m/s^2)^2 (5.0 standard deviation).
pub const ACCEL_VARIANCE: f64 = 5.0 * 5.0;

/// Magnetometer measurement variance in squared field units (300 standard deviation).
pub const MAG_VARIANCE: f64 = 300.0 * 300.0;

/// Gravity magnitude in m/s^2.
pub const GRAVITY: f64 = 9.81;

/// Local magnetic field reference vector in the navigation frame, field units.
pub const LOCAL_MAG_FIELD: [f64; 3] = [236.0, -2.0, 396.0];

/// The complete parameter set consumed by [crate::filter::AhrsFilter].
#[derive(Clone, Copy, Debug)]
pub struct FilterParams {
    /// Propagation period in seconds.
    pub dt: f64,
    /// Gyro process-noise variance, applied to the bias block of the covariance.
    pub gyro_noise_variance: f64,
    /// Accelerometer measurement variance.
    pub accel_variance: f64,
    /// Magnetometer measurement variance.
    pub mag_variance: f64,
    /// Gravity magnitude.
    pub gravity: f64,
    /// Local magnetic field vector in the navigation frame.
    pub mag_field: Vector3<f64>,
}

impl Default for FilterParams {
    fn default() -> Self {
        FilterParams {
            dt: AHRS_DT,
            gyro_noise_variance: GYRO_NOISE_VARIANCE,
            accel_variance: ACCEL_VARIANCE,
            mag_variance: MAG_VARIANCE,
            gravity: GRAVITY,
            mag_field: Vector3::new(LOCAL_MAG_FIELD[0], LOCAL_MAG_FIELD[1], LOCAL_MAG_FIELD[2]),
        }
    }
}
