#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core control logic for the safety-spotting rig (hardware-agnostic).
//!
//! All hardware interactions go through `spotter_traits::Accelerometer` and
//! `spotter_traits::Winch`.
//!
//! ## Architecture
//!
//! - **Channels**: bounded drop-oldest queue + overwrite mailbox (`channel`)
//! - **Estimation**: acceleration → velocity integration with noise gating
//!   and drift dead-band (`estimator`)
//! - **Decision**: rep-progression state machine raising spot requests
//!   (`spot`)
//! - **Actuation**: winch position control off an interrupt-fed quadrature
//!   count (`winch`)
//! - **Telemetry**: velocity history fan-out and CSV rendering (`telemetry`)
//! - **Orchestration**: one thread per loop, wired through the channels
//!   (`runner`)
//!
//! Nothing in the running tasks is treated as fatal: sensor faults zero-fill
//! the current window, a stalled consumer sheds the oldest queue element,
//! and every loop keeps running. Config and build errors are the only hard
//! failures, raised before any task starts.

pub mod channel;
pub mod error;
pub mod estimator;
pub mod mocks;
pub mod runner;
pub mod spot;
pub mod telemetry;
pub mod winch;

pub use error::{BuildError, Result, SpotError};
pub use estimator::{VelocityEstimator, VelocitySample};
pub use spot::{RepPhase, SpotMachine};
pub use winch::{QuadratureDecoder, WinchController, WinchState};

/// Velocity estimator tuning. Defaults match the rig's bench calibration.
#[derive(Debug, Clone)]
pub struct EstimatorCfg {
    /// Acceleration reads integrated into one velocity estimate.
    pub window_samples: u32,
    /// Integration window duration in seconds.
    pub window_s: f32,
    /// Pace between acceleration reads (ms).
    pub sample_period_ms: u64,
    /// Raw counts per m/s² for each channel.
    pub calib_right: f32,
    pub calib_left: f32,
    /// Acceleration magnitude below which a sample is treated as noise (m/s²).
    pub noise_floor_mps2: f32,
    /// Velocity change below which the integrator snaps to zero (m/s).
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
#[derive(Debug, Clone)]
pub struct SpotterCfg {
    /// Scheduling period (ms).
    pub cycle_ms: u64,
    /// Rep timer limit in cycles before a spot is forced (~3 s at 50 ms).
    pub max_rep_cycles: u32,
    /// Renewed-descent threshold during ascent (m/s, negative).
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
#[derive(Debug, Clone)]
pub struct WinchCfg {
    /// Scheduling period (ms).
    pub cycle_ms: u64,
    /// Duty commanded while taking up slack; sign selects rotation sense.
    pub duty: i16,
    /// Driver's maximum duty magnitude.
    pub max_duty: i16,
    /// Encoder ticks → drum revolutions.
    pub ticks_to_rev: f32,
    /// Drum revolutions → millimeters of cable.
    pub rev_to_mm: f32,
    /// Cable travel that completes a spot (mm).
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
            target_mm: 207.0,
        }
    }
}

/// Timeouts and watchdogs.
#[derive(Debug, Clone)]
pub struct Timeouts {
    /// Max sensor wait per read (ms).
    pub sensor_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { sensor_ms: 150 }
    }
}

impl From<&spotter_config::EstimatorCfg> for EstimatorCfg {
    fn from(c: &spotter_config::EstimatorCfg) -> Self {
        Self {
            window_samples: c.window_samples,
            window_s: c.window_s,
            sample_period_ms: c.sample_period_ms,
            calib_right: c.calib_right,
            calib_left: c.calib_left,
            noise_floor_mps2: c.noise_floor_mps2,
            dead_band_mps: c.dead_band_mps,
        }
    }
}

impl From<&spotter_config::SpotterCfg> for SpotterCfg {
    fn from(c: &spotter_config::SpotterCfg) -> Self {
        Self {
            cycle_ms: c.cycle_ms,
            max_rep_cycles: c.max_rep_cycles,
            sink_threshold_mps: c.sink_threshold_mps,
        }
    }
}

impl From<&spotter_config::WinchCfg> for WinchCfg {
    fn from(c: &spotter_config::WinchCfg) -> Self {
        Self {
            cycle_ms: c.cycle_ms,
            duty: c.duty,
            max_duty: c.max_duty,
            ticks_to_rev: c.ticks_to_rev,
            rev_to_mm: c.rev_to_mm,
            target_mm: c.target_mm,
        }
    }
}

impl From<&spotter_config::Timeouts> for Timeouts {
    fn from(c: &spotter_config::Timeouts) -> Self {
        Self {
            sensor_ms: c.sensor_ms,
        }
    }
}
