//! Acceleration-to-velocity estimation.
//!
//! Two IMUs sample vertical acceleration once per ~1 ms tick; each ~100 ms
//! window their gated sums are integrated into one velocity pair. Two-stage
//! zero detection: a noise floor gates individual acceleration samples here,
//! and a dead-band snaps a non-moving integrator back to exactly 0.0 so the
//! state machine downstream can compare against zero bit-for-bit.

use crate::{EstimatorCfg, Timeouts};
use spotter_traits::Accelerometer;
use std::time::Duration;

/// Fixed offset zeroing the sensors at rest.
pub const GRAVITY_MPS2: f32 = 9.81;

/// One averaged velocity pair for both sensing points, in m/s, signed
/// (negative = descending). Produced once per estimation window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocitySample {
    pub right: f32,
    pub left: f32,
    /// Monotonically increasing window counter, 1-based.
    pub window: u64,
}

/// Cross-channel noise gate: both sensors must agree something is happening
/// before either channel's sample is trusted as signal.
#[inline]
pub fn gate(cfg: &EstimatorCfg, az_right: f32, az_left: f32) -> (f32, f32) {
    if az_right.abs() < cfg.noise_floor_mps2 || az_left.abs() < cfg.noise_floor_mps2 {
        (0.0, 0.0)
    } else {
        (az_right, az_left)
    }
}

pub struct VelocityEstimator<A: Accelerometer> {
    right: A,
    left: A,
    cfg: EstimatorCfg,
    timeouts: Timeouts,
    sum_right: f32,
    sum_left: f32,
    samples_in: u32,
    v_right: f32,
    v_left: f32,
    window: u64,
    fault_logged: bool,
}

impl<A: Accelerometer> VelocityEstimator<A> {
    pub fn new(right: A, left: A, cfg: EstimatorCfg, timeouts: Timeouts) -> Self {
        Self {
            right,
            left,
            cfg,
            timeouts,
            sum_right: 0.0,
            sum_left: 0.0,
            samples_in: 0,
            v_right: 0.0,
            v_left: 0.0,
            window: 0,
            fault_logged: false,
        }
    }

    /// Previous window's published velocities.
    pub fn velocity(&self) -> (f32, f32) {
        (self.v_right, self.v_left)
    }

    pub fn cfg(&self) -> &EstimatorCfg {
        &self.cfg
    }

    /// Whether the current window has accumulated its full sample count.
    pub fn window_full(&self) -> bool {
        self.samples_in >= self.cfg.window_samples
    }

    /// Read both channels once and accumulate. A read failure on either
    /// channel contributes zero for this sample; it never blocks or aborts
    /// the loop, since downstream safety decisions depend on a live stream.
    pub fn sample_once(&mut self) {
        let timeout = Duration::from_millis(self.timeouts.sensor_ms);
        let raw_r = self.right.read_z(timeout);
        let raw_l = self.left.read_z(timeout);
        match (raw_r, raw_l) {
            (Ok(r), Ok(l)) => {
                let az_r = r as f32 / self.cfg.calib_right - GRAVITY_MPS2;
                let az_l = l as f32 / self.cfg.calib_left - GRAVITY_MPS2;
                self.ingest_mps2(az_r, az_l);
            }
            (r, l) => {
                // Zero contribution for this sample; still counts toward the window.
                self.samples_in += 1;
                let err = r.err().or(l.err());
                if let Some(e) = err {
                    if self.fault_logged {
                        tracing::trace!(error = %e, "sensor read failed, zero-filled");
                    } else {
                        tracing::warn!(error = %e, "sensor read failed, zero-filling window");
                        self.fault_logged = true;
                    }
                }
            }
        }
    }

    /// Accumulate one calibrated acceleration pair (m/s², gravity removed).
    pub fn ingest_mps2(&mut self, az_right: f32, az_left: f32) {
        let (az_r, az_l) = gate(&self.cfg, az_right, az_left);
        self.sum_right += az_r;
        self.sum_left += az_l;
        self.samples_in += 1;
    }

    /// Integrate the accumulated window into a velocity pair and reset the
    /// accumulators: `v = (sum/W) * window_s + v_prev` per channel, then the
    /// dead-band snap. The dead-band is keyed on the right channel and zeroes
    /// both, matching the rig's calibration (the sensors drift together).
    pub fn finish_window(&mut self) -> VelocitySample {
        let w = self.cfg.window_samples.max(1) as f32;
        let mut v_r = self.sum_right / w * self.cfg.window_s + self.v_right;
        let mut v_l = self.sum_left / w * self.cfg.window_s + self.v_left;

        // Integrator drift: a stationary bar keeps reading its last nonzero
        // velocity, so an unchanged estimate collapses to exactly 0.
        if (v_r - self.v_right).abs() <= self.cfg.dead_band_mps {
            v_r = 0.0;
            v_l = 0.0;
        }

        self.v_right = v_r;
        self.v_left = v_l;
        self.sum_right = 0.0;
        self.sum_left = 0.0;
        self.samples_in = 0;
        self.window += 1;
        self.fault_logged = false;

        tracing::debug!(window = self.window, v_right = v_r, v_left = v_l, "velocity window");
        VelocitySample {
            right: v_r,
            left: v_l,
            window: self.window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::ScriptedImu;
    use rstest::rstest;

    fn estimator(cfg: EstimatorCfg) -> VelocityEstimator<ScriptedImu> {
        VelocityEstimator::new(
            ScriptedImu::constant(0),
            ScriptedImu::constant(0),
            cfg,
            Timeouts::default(),
        )
    }

    #[rstest]
    #[case(1.0, 0.1, (0.0, 0.0))]
    #[case(0.1, 1.0, (0.0, 0.0))]
    #[case(0.29, 0.29, (0.0, 0.0))]
    #[case(0.3, 0.3, (0.3, 0.3))]
    #[case(1.0, -1.0, (1.0, -1.0))]
    fn gate_zeroes_both_when_either_is_quiet(
        #[case] az_r: f32,
        #[case] az_l: f32,
        #[case] expected: (f32, f32),
    ) {
        let cfg = EstimatorCfg::default();
        assert_eq!(gate(&cfg, az_r, az_l), expected);
    }

    #[test]
    fn quiet_window_publishes_exact_zero() {
        let mut est = estimator(EstimatorCfg::default());
        for _ in 0..100 {
            est.ingest_mps2(0.1, -0.1); // below floor on both
        }
        let s = est.finish_window();
        assert_eq!(s.right, 0.0);
        assert_eq!(s.left, 0.0);
    }

    #[test]
    fn window_integrates_average_acceleration() {
        let mut est = estimator(EstimatorCfg::default());
        for _ in 0..100 {
            est.ingest_mps2(-1.0, -1.0);
        }
        let s = est.finish_window();
        // v = (-100/100) * 0.1 = -0.1 m/s
        assert!((s.right + 0.1).abs() < 1e-6);
        assert!((s.left + 0.1).abs() < 1e-6);
        assert_eq!(s.window, 1);
    }

    #[test]
    fn dead_band_snaps_unchanged_velocity_to_zero() {
        let mut est = estimator(EstimatorCfg::default());
        // First window establishes v = -0.1.
        for _ in 0..100 {
            est.ingest_mps2(-1.0, -1.0);
        }
        let s1 = est.finish_window();
        assert!(s1.right < 0.0);
        // Second window: no acceleration, v would repeat -> snapped to 0.
        let s2 = est.finish_window();
        assert_eq!(s2.right, 0.0);
        assert_eq!(s2.left, 0.0);
        assert_eq!(s2.window, 2);
    }

    #[test]
    fn dead_band_keyed_on_right_channel_zeroes_both() {
        let mut est = estimator(EstimatorCfg::default());
        // Right channel nets to zero over the window while the left keeps
        // moving; every sample clears the noise floor on both channels, so
        // only the dead-band can explain the snap.
        for i in 0..100 {
            let az_r = if i % 2 == 0 { 0.35 } else { -0.35 };
            est.ingest_mps2(az_r, -2.0);
        }
        let s = est.finish_window();
        assert_eq!((s.right, s.left), (0.0, 0.0));
    }

    #[test]
    fn read_failure_zero_fills_without_stalling() {
        use crate::mocks::FailingImu;
        let mut est = VelocityEstimator::new(
            FailingImu,
            FailingImu,
            EstimatorCfg::default(),
            Timeouts::default(),
        );
        for _ in 0..100 {
            est.sample_once();
        }
        assert!(est.window_full());
        let s = est.finish_window();
        assert_eq!((s.right, s.left), (0.0, 0.0));
    }
}
