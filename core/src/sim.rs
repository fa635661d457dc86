//! Simulation utilities and CSV logging for the attitude filter.
//!
//! This module provides:
//! - Synthetic stationary-vehicle scenario generation with Gaussian sensor noise
//! - A stationary gyro averaging helper standing in for the flight aligner
//! - A `SimRecord` struct for writing and re-reading filter logs as CSV
//! - A closed-loop runner that interleaves propagation and sensor updates at
//!   realistic cadences, used by the `ahrs-sim` binary and the integration tests

use nalgebra::Vector3;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::ImuSample;
use crate::filter::AhrsFilter;
use crate::params::FilterParams;

/// Configuration for a synthetic scenario and the closed-loop run over it.
#[derive(Clone, Copy, Debug)]
pub struct ScenarioConfig {
    /// Scenario length in seconds.
    pub duration_s: f64,
    /// True gyro bias in rad/s, constant over the scenario.
    pub true_gyro_bias: Vector3<f64>,
    /// Gyro noise standard deviation in rad/s.
    pub gyro_noise_std: f64,
    /// Accelerometer noise standard deviation in m/s^2.
    pub accel_noise_std: f64,
    /// Magnetometer noise standard deviation in field units.
    pub mag_noise_std: f64,
    /// Number of leading samples averaged into the initial bias seed.
    pub align_samples: usize,
    /// Accelerometer updates run every this many IMU ticks.
    pub accel_divider: usize,
    /// Magnetometer updates run every this many IMU ticks.
    pub mag_divider: usize,
    /// RNG seed so runs are reproducible.
    pub seed: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig {
            duration_s: 30.0,
            true_gyro_bias: Vector3::new(0.01, -0.005, 0.002),
            gyro_noise_std: 0.009,
            accel_noise_std: 0.3,
            mag_noise_std: 5.0,
            align_samples: 256,
            accel_divider: 10,
            mag_divider: 51,
            seed: 1,
        }
    }
}

/// Generate IMU samples for a level, stationary vehicle.
///
/// Truth attitude is identity for the whole scenario, so the body frame coincides
/// with the navigation frame: the gyro reads the true bias plus noise, the
/// accelerometer reads gravity pointing down plus noise, and the magnetometer reads
/// the local field vector plus noise.
///
/// # Arguments
/// * `config` - scenario noise levels, bias, duration, and seed
/// * `params` - filter parameters (tick period, gravity, field vector)
///
/// # Returns
/// One [ImuSample] per filter tick.
pub fn generate_stationary(config: &ScenarioConfig, params: &FilterParams) -> Vec<ImuSample> {
    let n = (config.duration_s / params.dt) as usize;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let gyro_noise = Normal::new(0.0, config.gyro_noise_std).expect("gyro noise std must be >= 0");
    let accel_noise =
        Normal::new(0.0, config.accel_noise_std).expect("accel noise std must be >= 0");
    let mag_noise = Normal::new(0.0, config.mag_noise_std).expect("mag noise std must be >= 0");

    let gravity_body = Vector3::new(0.0, 0.0, -params.gravity);
    let mut samples = Vec::with_capacity(n);
    for _ in 0..n {
        let gyro = config.true_gyro_bias
            + Vector3::new(
                gyro_noise.sample(&mut rng),
                gyro_noise.sample(&mut rng),
                gyro_noise.sample(&mut rng),
            );
        let accel = gravity_body
            + Vector3::new(
                accel_noise.sample(&mut rng),
                accel_noise.sample(&mut rng),
                accel_noise.sample(&mut rng),
            );
        let mag = params.mag_field
            + Vector3::new(
                mag_noise.sample(&mut rng),
                mag_noise.sample(&mut rng),
                mag_noise.sample(&mut rng),
            );
        samples.push(ImuSample { gyro, accel, mag });
    }
    samples
}

/// Average a batch of stationary gyro samples into a bias seed.
///
/// This is the simulation's stand-in for the flight aligner: it low-passes by plain
/// averaging and performs no stationarity validation, exactly like the collaborator
/// the filter expects.
pub fn average_stationary_gyro(samples: &[ImuSample]) -> Vector3<f64> {
    if samples.is_empty() {
        return Vector3::zeros();
    }
    let sum = samples
        .iter()
        .fold(Vector3::zeros(), |acc, s| acc + s.gyro);
    sum / samples.len() as f64
}

/// One row of a closed-loop run log.
///
/// Flat scalar fields so the row maps directly onto a CSV line via serde, in the
/// same shape the rest of the tooling expects.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SimRecord {
    /// Elapsed time in seconds
    pub time: f64,
    /// Estimated roll in radians
    pub roll: f64,
    /// Estimated pitch in radians
    pub pitch: f64,
    /// Estimated yaw in radians
    pub yaw: f64,
    /// Estimated gyro bias around the body x axis in rad/s
    pub bias_x: f64,
    /// Estimated gyro bias around the body y axis in rad/s
    pub bias_y: f64,
    /// Estimated gyro bias around the body z axis in rad/s
    pub bias_z: f64,
    /// Quaternion norm, a drift diagnostic
    pub quat_norm: f64,
    /// Corrections skipped so far due to a singular innovation covariance
    pub skipped_updates: u32,
}

impl SimRecord {
    /// Snapshot the published filter state at the given time.
    pub fn snapshot(time: f64, filter: &AhrsFilter) -> Self {
        let eulers = filter.euler_angles();
        let bias = filter.gyro_bias();
        SimRecord {
            time,
            roll: eulers.x,
            pitch: eulers.y,
            yaw: eulers.z,
            bias_x: bias.x,
            bias_y: bias.y,
            bias_z: bias.z,
            quat_norm: filter.quaternion().norm(),
            skipped_updates: filter.skipped_updates(),
        }
    }

    /// Write records to a CSV file.
    ///
    /// # Arguments
    /// * `records` - the rows to write
    /// * `path` - destination file path
    pub fn to_csv<P: AsRef<std::path::Path>>(
        records: &[Self],
        path: P,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let mut wtr = csv::Writer::from_path(path)?;
        for record in records {
            wtr.serialize(record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Read records back from a CSV file.
    ///
    /// # Arguments
    /// * `path` - CSV file to read
    pub fn from_csv<P: AsRef<std::path::Path>>(
        path: P,
    ) -> Result<Vec<Self>, Box<dyn std::error::Error>> {
        let mut rdr = csv::Reader::from_path(path)?;
        let mut records = Vec::new();
        for result in rdr.deserialize() {
            let record: Self = result?;
            records.push(record);
        }
        Ok(records)
    }
}

/// Run the filter closed loop over a sample stream.
///
/// The first [ScenarioConfig::align_samples] ticks are consumed by the aligner stand-in
/// and seed the bias; the filter then propagates once per remaining tick, with
/// accelerometer and magnetometer corrections interleaved at their configured
/// dividers. One [SimRecord] is logged per tick.
///
/// # Arguments
/// * `samples` - IMU sample stream, one entry per tick
/// * `config` - cadence and alignment configuration
/// * `params` - filter parameters
///
/// # Returns
/// The filter in its final state and the per-tick log.
pub fn run_closed_loop(
    samples: &[ImuSample],
    config: &ScenarioConfig,
    params: &FilterParams,
) -> (AhrsFilter, Vec<SimRecord>) {
    let mut filter = AhrsFilter::new(*params);

    let align_n = config.align_samples.min(samples.len());
    filter.align(average_stationary_gyro(&samples[..align_n]));

    let mut records = Vec::with_capacity(samples.len().saturating_sub(align_n));
    for (step, sample) in samples[align_n..].iter().enumerate() {
        filter.propagate(sample.gyro);
        if config.accel_divider > 0 && step % config.accel_divider == 0 {
            filter.update_accel(sample.accel);
        }
        if config.mag_divider > 0 && step % config.mag_divider == 0 {
            filter.update_mag(sample.mag);
        }
        let time = (align_n + step + 1) as f64 * params.dt;
        records.push(SimRecord::snapshot(time, &filter));
    }
    (filter, records)
}
