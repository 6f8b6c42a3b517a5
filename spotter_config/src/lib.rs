#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and validation for the spotting rig.
//!
//! `Config` and sub-structs are deserialized from TOML and validated before
//! any task is started. Every numeric knob the control loops use lives here
//! with a serde default matching the rig's bench calibration, so a minimal
//! config file only needs the sections it wants to override.
use serde::Deserialize;

/// I2C addresses and GPIO pin assignments.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Pins {
    /// Right-side IMU I2C address (AD0 low)
    pub imu_right_addr: u8,
    /// Left-side IMU I2C address (AD0 high)
    pub imu_left_addr: u8,
    /// Encoder channel A input pin
    pub encoder_a: u8,
    /// Encoder channel B input pin
    pub encoder_b: u8,
    /// H-bridge direction pins and PWM pin
    pub motor_in1: u8,
    pub motor_in2: u8,
    pub motor_pwm: u8,
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            imu_right_addr: 0x68,
            imu_left_addr: 0x69,
            encoder_a: 36,
            encoder_b: 39,
            motor_in1: 25,
            motor_in2: 26,
            motor_pwm: 27,
        }
    }
}

/// Velocity estimator tuning.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EstimatorCfg {
    /// Acceleration reads integrated into one velocity estimate
    pub window_samples: u32,
    /// Integration window duration in seconds
    pub window_s: f32,
    /// Pace between acceleration reads (ms)
    pub sample_period_ms: u64,
    /// Raw counts per m/s², right channel
    pub calib_right: f32,
    /// Raw counts per m/s², left channel
    pub calib_left: f32,
    /// Acceleration magnitude below which a sample is treated as noise (m/s²)
    pub noise_floor_mps2: f32,
    /// Velocity change below which the integrator snaps to zero (m/s)
    pub dead_band_mps: f32,
}

impl Default for EstimatorCfg {
    fn default() -> Self {
        Self {
            window_samples: 100,
            window_s: 0.1,
            sample_period_ms: 1,
            calib_right: 1825.5,
            calib_left: 1485.2,
            noise_floor_mps2: 0.3,
            dead_band_mps: 0.02,
        }
    }
}

/// Rep/spot state machine tuning.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SpotterCfg {
    /// State machine scheduling period (ms)
    pub cycle_ms: u64,
    /// Rep timer limit in cycles before a spot is forced
    pub max_rep_cycles: u32,
    /// Renewed-descent threshold during ascent (m/s, negative)
    pub sink_threshold_mps: f32,
}

impl Default for SpotterCfg {
    fn default() -> Self {
        Self {
            cycle_ms: 50,
            max_rep_cycles: 60,
            sink_threshold_mps: -0.06,
        }
    }
}

/// Winch controller tuning.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WinchCfg {
    /// Controller scheduling period (ms)
    pub cycle_ms: u64,
    /// Duty commanded while taking up slack
    pub duty: i16,
    /// Driver's maximum duty magnitude
    pub max_duty: i16,
    /// Encoder ticks to drum revolutions
    pub ticks_to_rev: f32,
    /// Drum revolutions to millimeters of cable
    pub rev_to_mm: f32,
    /// Cable travel that completes a spot (mm)
    pub target_mm: f32,
}

impl Default for WinchCfg {
    fn default() -> Self {
        Self {
            cycle_ms: 50,
            duty: 100,
            max_duty: 255,
            ticks_to_rev: (3.4 / 4096.0) / 2.0,
            rev_to_mm: 2.0 * std::f32::consts::PI * 3.0,
            // distance from bench to highest rack minus chest depth
            target_mm: 207.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Max sensor wait per read (ms)
    pub sensor_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { sensor_ms: 150 }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub pins: Pins,
    pub estimator: EstimatorCfg,
    pub spotter: SpotterCfg,
    pub winch: WinchCfg,
    pub timeouts: Timeouts,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Estimator
        if self.estimator.window_samples == 0 {
            eyre::bail!("estimator.window_samples must be > 0");
        }
        if !(self.estimator.window_s.is_finite() && self.estimator.window_s > 0.0) {
            eyre::bail!("estimator.window_s must be finite and > 0");
        }
        if self.estimator.sample_period_ms == 0 {
            eyre::bail!("estimator.sample_period_ms must be >= 1");
        }
        for (name, v) in [
            ("estimator.calib_right", self.estimator.calib_right),
            ("estimator.calib_left", self.estimator.calib_left),
        ] {
            if !(v.is_finite() && v > 0.0) {
                eyre::bail!("{name} must be finite and > 0");
            }
        }
        if self.estimator.noise_floor_mps2.is_sign_negative() {
            eyre::bail!("estimator.noise_floor_mps2 must be >= 0");
        }
        if self.estimator.dead_band_mps.is_sign_negative() {
            eyre::bail!("estimator.dead_band_mps must be >= 0");
        }

        // Spotter
        if self.spotter.cycle_ms == 0 {
            eyre::bail!("spotter.cycle_ms must be >= 1");
        }
        if self.spotter.max_rep_cycles == 0 {
            eyre::bail!("spotter.max_rep_cycles must be > 0");
        }
        if self.spotter.sink_threshold_mps >= 0.0 {
            eyre::bail!("spotter.sink_threshold_mps must be < 0");
        }

        // Winch
        if self.winch.cycle_ms == 0 {
            eyre::bail!("winch.cycle_ms must be >= 1");
        }
        if self.winch.duty == 0 {
            eyre::bail!("winch.duty must be nonzero");
        }
        if self.winch.max_duty <= 0 || self.winch.max_duty > 255 {
            eyre::bail!("winch.max_duty must be in 1..=255");
        }
        if self.winch.duty.unsigned_abs() > self.winch.max_duty.unsigned_abs() {
            eyre::bail!("winch.duty exceeds winch.max_duty");
        }
        if !(self.winch.ticks_to_rev.is_finite() && self.winch.ticks_to_rev > 0.0) {
            eyre::bail!("winch.ticks_to_rev must be finite and > 0");
        }
        if !(self.winch.rev_to_mm.is_finite() && self.winch.rev_to_mm > 0.0) {
            eyre::bail!("winch.rev_to_mm must be finite and > 0");
        }
        if !(self.winch.target_mm.is_finite() && self.winch.target_mm > 0.0) {
            eyre::bail!("winch.target_mm must be finite and > 0");
        }

        // Timeouts
        if self.timeouts.sensor_ms == 0 {
            eyre::bail!("timeouts.sensor_ms must be >= 1");
        }

        Ok(())
    }
}
