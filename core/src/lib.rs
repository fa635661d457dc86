//! Attitude and heading reference system (AHRS) built on an indirect Kalman filter
//!
//! This crate estimates a vehicle's 3D orientation and gyroscope bias in real time by
//! fusing angular-rate, accelerometer, and magnetometer samples. It is intended as the
//! attitude subsystem of a larger flight-control stack: raw sensor acquisition, the
//! stationary aligner that produces the initial bias estimate, and downstream consumers
//! of the published attitude (guidance, control) all live outside this crate and talk
//! to it through plain floating-point vectors in physical units.
//!
//! The estimator is an indirect (error-state) Kalman filter. The nominal state, a
//! quaternion and a gyro bias vector, is propagated nonlinearly by strapdown
//! integration of the gyro rates. The filter itself only tracks a six-element error
//! state
//!
//! $$
//! X = [\delta\theta_x, \delta\theta_y, \delta\theta_z, \delta b_x, \delta b_y, \delta b_z]
//! $$
//!
//! and its 6x6 covariance. Whenever a vector-observation sensor (accelerometer,
//! magnetometer) delivers a sample, the filter computes the error estimate, folds it
//! back into the quaternion and bias immediately, and conceptually resets the error to
//! zero. Because the error is always zero a priori, only the covariance needs to be
//! propagated between corrections.
//!
//! This crate is primarily built off of [`nalgebra`](https://crates.io/crates/nalgebra),
//! which provides all fixed-dimension vector, matrix, and quaternion types used by the
//! filter. The simulation utilities additionally use
//! [`rand`](https://crates.io/crates/rand)/[`rand_distr`](https://crates.io/crates/rand_distr)
//! for sensor noise and [`serde`](https://crates.io/crates/serde) with
//! [`csv`](https://crates.io/crates/csv) for logging.
//!
//! ## Crate overview
//!
//! - [filter]: The error-state Kalman filter itself: strapdown propagation, covariance
//!   propagation, and the accelerometer/magnetometer measurement updates.
//! - [linalg]: Fixed-size linear algebra helpers (closed-form 3x3 inversion, quaternion
//!   kinematics, rotation-matrix and Euler conversions).
//! - [params]: Compile-time filter constants and the runtime-overridable parameter set.
//! - [sim]: Synthetic-scenario generation, CSV logging, and a closed-loop runner used
//!   by the `ahrs-sim` binary and the integration tests.
//!
//! ## Frames and conventions
//!
//! The navigation frame is North-East-Down. The rotation matrix maintained alongside
//! the quaternion is the navigation-to-body direction cosine matrix, so a resting
//! accelerometer measures $C_n^b \cdot [0, 0, -g]^T$. Euler angles are the usual
//! aerospace roll/pitch/yaw sequence in radians. All quantities are `f64`.
//!
//! ## Real-time contract
//!
//! [filter::AhrsFilter::propagate] runs once per IMU tick at a fixed period;
//! [filter::AhrsFilter::update_accel] and [filter::AhrsFilter::update_mag] run at
//! their own sensor cadences, interleaved with propagation. All three mutate the same
//! state in place and must never execute concurrently; the filter performs no
//! allocation and never blocks. No operation returns an error: numerical degeneracies
//! (a singular innovation covariance) cause that cycle's correction to be skipped and
//! are expected to self-correct on subsequent cycles.

pub mod filter;
pub mod linalg;
pub mod params;
pub mod sim;

use std::fmt::{self, Display};

use nalgebra::Vector3;

/// Lifecycle state of the AHRS.
///
/// The transition is one-way: [AhrsStatus::Uninit] to [AhrsStatus::Running] when the
/// filter is aligned. Numerical degeneracies while running are absorbed internally and
/// never revert the status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AhrsStatus {
    /// Freshly constructed; the bias estimate has not been seeded yet.
    #[default]
    Uninit,
    /// Aligned and estimating. The filter stays in this state until the hosting
    /// process terminates.
    Running,
}

/// One epoch of IMU data in physical units, body frame.
///
/// The crate does not talk to sensor hardware; conversion from raw counts happens in
/// the IMU driver. Fields are grouped here for the benefit of the simulation and
/// logging utilities; the filter operations themselves take the individual vectors
/// since the three sensors sample at different cadences.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImuSample {
    /// Angular rate in rad/s, body frame x, y, z axis
    pub gyro: Vector3<f64>,
    /// Specific force in m/s^2, body frame x, y, z axis
    pub accel: Vector3<f64>,
    /// Magnetic field in local field units, body frame x, y, z axis
    pub mag: Vector3<f64>,
}

impl Display for ImuSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ImuSample {{ gyro: [{:.4}, {:.4}, {:.4}], accel: [{:.4}, {:.4}, {:.4}], mag: [{:.1}, {:.1}, {:.1}] }}",
            self.gyro[0],
            self.gyro[1],
            self.gyro[2],
            self.accel[0],
            self.accel[1],
            self.accel[2],
            self.mag[0],
            self.mag[1],
            self.mag[2]
        )
    }
}
