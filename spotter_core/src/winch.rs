//! Winch position control off an interrupt-fed quadrature count.
//!
//! The decoder is the one datum shared between interrupt context and task
//! context, so it is an atomic tick counter updated by a handler that does
//! nothing but read two levels, branch and add. The controller polls the
//! spot-request mailbox, drives at a fixed duty and acknowledges through the
//! spot-complete mailbox once the commanded cable travel is reached.

use crate::channel::Mailbox;
use crate::error::{Result, map_hw_error_dyn};
use crate::WinchCfg;
use eyre::WrapErr;
use spotter_traits::Winch;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

/// Signed encoder tick count plus the edge-decode state.
///
/// `edge` is safe to call from an interrupt handler: no blocking, no channel
/// operations, no logging. Only the handler writes the count; task-side
/// readers observe it through `ticks()`.
///
/// The decode is deliberately partial: it counts only rising edges of
/// channel A against the level of channel B, not the full 4-state quadrature
/// table. Some transition sequences are missed and the count undercounts
/// slightly; the travel calibration constants were measured against this
/// decoder, so upgrading it would require recalibration.
#[derive(Debug, Default)]
pub struct QuadratureDecoder {
    count: AtomicI32,
    last_a: AtomicBool,
}

impl QuadratureDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interrupt-context entry point: called on any edge of either channel
    /// with the freshly read levels of A and B.
    pub fn edge(&self, a: bool, b: bool) {
        let prev_a = self.last_a.swap(a, Ordering::Relaxed);
        if a != prev_a && a {
            if b == a {
                self.count.fetch_add(1, Ordering::Relaxed);
            } else {
                self.count.fetch_sub(1, Ordering::Relaxed);
            }
        }
    }

    /// Task-context read of the live count.
    pub fn ticks(&self) -> i32 {
        self.count.load(Ordering::Relaxed)
    }

    /// Zero the count (slack reset between spots).
    pub fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WinchState {
    /// Duty 0, polling the spot-request mailbox.
    Idle,
    /// Driving at the configured duty until target travel.
    Driving,
    /// Target reached; stop and acknowledge, then return to idle.
    Reached,
}

pub struct WinchController<M: Winch> {
    motor: M,
    cfg: WinchCfg,
    encoder: std::sync::Arc<QuadratureDecoder>,
    state: WinchState,
    spot_request: Mailbox<bool>,
    spot_complete: Mailbox<bool>,
    commanded_duty: i16,
}

impl<M: Winch> WinchController<M> {
    pub fn new(
        motor: M,
        cfg: WinchCfg,
        encoder: std::sync::Arc<QuadratureDecoder>,
        spot_request: Mailbox<bool>,
        spot_complete: Mailbox<bool>,
    ) -> Self {
        Self {
            motor,
            cfg,
            encoder,
            state: WinchState::Idle,
            spot_request,
            spot_complete,
            commanded_duty: 0,
        }
    }

    pub fn state(&self) -> WinchState {
        self.state
    }

    /// Cable travel in millimeters, sign-flipped by the commanded duty so the
    /// distance pulled is reported as a positive, increasing quantity while
    /// driving.
    pub fn distance_mm(&self) -> f32 {
        let mut mm = self.encoder.ticks() as f32 * self.cfg.ticks_to_rev * self.cfg.rev_to_mm;
        if self.commanded_duty > 0 {
            mm = -mm;
        }
        mm
    }

    /// One controller cycle.
    pub fn step(&mut self) -> Result<()> {
        match self.state {
            WinchState::Idle => {
                if self.spot_request.get() {
                    let duty = self.cfg.duty.clamp(-self.cfg.max_duty, self.cfg.max_duty);
                    self.motor
                        .set_duty(duty)
                        .map_err(|e| eyre::Report::new(map_hw_error_dyn(&*e)))
                        .wrap_err("set_duty")?;
                    self.commanded_duty = duty;
                    self.state = WinchState::Driving;
                    tracing::info!(duty, "spot requested, winch driving");
                }
            }
            WinchState::Driving => {
                let mm = self.distance_mm();
                tracing::debug!(ticks = self.encoder.ticks(), distance_mm = mm, "winch position");
                if mm >= self.cfg.target_mm {
                    self.state = WinchState::Reached;
                }
            }
            WinchState::Reached => {
                self.motor
                    .stop()
                    .map_err(|e| eyre::Report::new(map_hw_error_dyn(&*e)))
                    .wrap_err("stop")?;
                self.commanded_duty = 0;
                self.spot_complete.put(true);
                self.spot_request.put(false);
                self.state = WinchState::Idle;
                tracing::info!(target_mm = self.cfg.target_mm, "spot travel reached, winch stopped");
            }
        }
        Ok(())
    }

    /// Best-effort motor stop for shutdown paths.
    pub fn motor_stop(&mut self) -> Result<()> {
        self.motor
            .stop()
            .map_err(|e| eyre::Report::new(map_hw_error_dyn(&*e)))
            .wrap_err("motor_stop")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{RecordingWinch, WinchCmd};
    use std::sync::Arc;

    #[test]
    fn partial_decode_counts_rising_edges_of_a() {
        let dec = QuadratureDecoder::new();
        // A rises with B high: forward.
        dec.edge(true, true);
        assert_eq!(dec.ticks(), 1);
        // A falls: ignored.
        dec.edge(false, true);
        assert_eq!(dec.ticks(), 1);
        // A rises with B low: reverse.
        dec.edge(true, false);
        assert_eq!(dec.ticks(), 0);
        // Repeated level without an edge: ignored.
        dec.edge(true, true);
        assert_eq!(dec.ticks(), 0);
    }

    fn controller(
        cfg: WinchCfg,
    ) -> (
        WinchController<RecordingWinch>,
        Arc<QuadratureDecoder>,
        Mailbox<bool>,
        Mailbox<bool>,
        std::sync::Arc<std::sync::Mutex<Vec<WinchCmd>>>,
    ) {
        let winch = RecordingWinch::new();
        let log = winch.commands();
        let encoder = Arc::new(QuadratureDecoder::new());
        let req = Mailbox::new(false);
        let done = Mailbox::new(false);
        let ctl = WinchController::new(winch, cfg, encoder.clone(), req.clone(), done.clone());
        (ctl, encoder, req, done, log)
    }

    /// Spin the simulated drum backwards (negative ticks); with positive duty
    /// the sign flip reports positive travel.
    fn reel_in(encoder: &QuadratureDecoder, edges: u32) {
        for _ in 0..edges {
            encoder.edge(true, false);
            encoder.edge(false, false);
        }
    }

    #[test]
    fn idle_until_requested_then_drives_at_configured_duty() {
        let (mut ctl, _enc, req, _done, log) = controller(WinchCfg::default());
        ctl.step().unwrap();
        assert_eq!(ctl.state(), WinchState::Idle);
        assert!(log.lock().unwrap().is_empty());

        req.put(true);
        ctl.step().unwrap();
        assert_eq!(ctl.state(), WinchState::Driving);
        assert_eq!(log.lock().unwrap().as_slice(), &[WinchCmd::Duty(100)]);
    }

    #[test]
    fn distance_is_positive_and_monotonic_while_driving() {
        let (mut ctl, enc, req, _done, _log) = controller(WinchCfg::default());
        req.put(true);
        ctl.step().unwrap();
        let mut last = ctl.distance_mm();
        assert!(last >= 0.0);
        for _ in 0..5 {
            reel_in(&enc, 100);
            let mm = ctl.distance_mm();
            assert!(mm > last, "distance must increase while reeling in");
            last = mm;
        }
    }

    #[test]
    fn reaching_target_stops_acknowledges_and_clears_request() {
        let cfg = WinchCfg {
            target_mm: 5.0,
            ..WinchCfg::default()
        };
        let (mut ctl, enc, req, done, log) = controller(cfg);
        req.put(true);
        ctl.step().unwrap(); // Idle -> Driving

        // 5 mm / (ticks_to_rev * rev_to_mm) ≈ 640 ticks
        reel_in(&enc, 700);
        ctl.step().unwrap(); // Driving -> Reached
        assert_eq!(ctl.state(), WinchState::Reached);
        ctl.step().unwrap(); // Reached -> Idle
        assert_eq!(ctl.state(), WinchState::Idle);
        assert!(done.get(), "spot-complete must latch true");
        assert!(!req.get(), "spot-request must be cleared");
        assert_eq!(
            log.lock().unwrap().as_slice(),
            &[WinchCmd::Duty(100), WinchCmd::Stop]
        );
    }

    #[test]
    fn duty_is_clamped_to_driver_max() {
        let cfg = WinchCfg {
            duty: 100,
            max_duty: 60,
            ..WinchCfg::default()
        };
        let (mut ctl, _enc, req, _done, log) = controller(cfg);
        req.put(true);
        ctl.step().unwrap();
        assert_eq!(log.lock().unwrap().as_slice(), &[WinchCmd::Duty(60)]);
    }

    #[test]
    fn negative_duty_reports_positive_travel_for_forward_ticks() {
        let cfg = WinchCfg {
            duty: -100,
            ..WinchCfg::default()
        };
        let (mut ctl, enc, req, _done, _log) = controller(cfg);
        req.put(true);
        ctl.step().unwrap();
        // Forward ticks, no sign flip for negative duty.
        for _ in 0..200 {
            enc.edge(true, true);
            enc.edge(false, true);
        }
        assert!(ctl.distance_mm() > 0.0);
    }
}
