//! Task orchestration: one thread per control loop, wired through the
//! crate's channels.
//!
//! Four threads run against shared state:
//!
//! - estimator: paced sensor reads, one velocity sample per window
//! - spotter: drains velocity samples, advances the rep state machine
//! - winch: polls the spot-request mailbox and drives the motor
//! - reporter: lowest cadence, drains history and renders CSV on demand
//!
//! Nothing a task hits at runtime is fatal; faults are logged and the loop
//! continues. Shutdown is a shared flag checked before every sleep, and the
//! rig joins all threads when stopped or dropped.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use spotter_traits::clock::Clock;
use spotter_traits::{Accelerometer, Winch};

use crate::channel::Mailbox;
use crate::error::BuildError;
use crate::estimator::VelocityEstimator;
use crate::spot::{RepPhase, SpotMachine};
use crate::telemetry::{self, Reporter, Row};
use crate::winch::{QuadratureDecoder, WinchController};
use crate::{EstimatorCfg, SpotterCfg, Timeouts, WinchCfg};

/// Velocity samples buffered between estimator and spotter. Kept shallow so a
/// stalled spotter reads fresh data, not a stale backlog.
pub const VELOCITY_QUEUE_CAPACITY: usize = 2;
/// Reporter cadence in milliseconds.
pub const REPORT_PERIOD_MS: u64 = 500;

/// Everything the rig needs to spawn.
#[derive(Debug, Clone, Default)]
pub struct RigCfg {
    pub estimator: EstimatorCfg,
    pub spotter: SpotterCfg,
    pub winch: WinchCfg,
    pub timeouts: Timeouts,
}

impl From<&spotter_config::Config> for RigCfg {
    fn from(c: &spotter_config::Config) -> Self {
        Self {
            estimator: (&c.estimator).into(),
            spotter: (&c.spotter).into(),
            winch: (&c.winch).into(),
            timeouts: (&c.timeouts).into(),
        }
    }
}

/// Mailboxes shared between the spotter and winch tasks.
#[derive(Clone)]
pub struct Shares {
    pub spot_request: Mailbox<bool>,
    pub spot_complete: Mailbox<bool>,
    pub send_data: Mailbox<bool>,
}

impl Shares {
    fn new() -> Self {
        Self {
            spot_request: Mailbox::new(false),
            spot_complete: Mailbox::new(false),
            send_data: Mailbox::new(false),
        }
    }
}

fn validate(cfg: &RigCfg) -> Result<(), BuildError> {
    if cfg.estimator.window_samples == 0 {
        return Err(BuildError::InvalidConfig("window_samples must be > 0"));
    }
    if cfg.spotter.cycle_ms == 0 || cfg.winch.cycle_ms == 0 {
        return Err(BuildError::InvalidConfig("cycle_ms must be > 0"));
    }
    if cfg.winch.max_duty <= 0 {
        return Err(BuildError::InvalidConfig("max_duty must be > 0"));
    }
    if cfg.winch.duty.unsigned_abs() > cfg.winch.max_duty.unsigned_abs() {
        return Err(BuildError::InvalidConfig("duty exceeds max_duty"));
    }
    Ok(())
}

/// Handle to the running task set. Stopping (or dropping) signals shutdown
/// and joins every thread.
pub struct Rig {
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
    shares: Shares,
    phase: Mailbox<RepPhase>,
    windows: Arc<AtomicU64>,
    reps: Arc<AtomicU32>,
    latest_report: Arc<Mutex<Option<String>>>,
}

impl Rig {
    /// Spawn the full task set.
    ///
    /// The caller owns the encoder's feed side: in hardware builds the GPIO
    /// interrupt handlers call [`QuadratureDecoder::edge`], in simulation a
    /// pump thread does.
    pub fn spawn<A, M>(
        imu_right: A,
        imu_left: A,
        winch: M,
        encoder: Arc<QuadratureDecoder>,
        cfg: RigCfg,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Result<Self, BuildError>
    where
        A: Accelerometer + Send + 'static,
        M: Winch + Send + 'static,
    {
        validate(&cfg)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shares = Shares::new();
        let phase = Mailbox::new(RepPhase::Racked);
        let windows = Arc::new(AtomicU64::new(0));
        let reps = Arc::new(AtomicU32::new(0));
        let latest_report = Arc::new(Mutex::new(None));

        let (vel_tx, vel_rx) = crate::channel::bounded(VELOCITY_QUEUE_CAPACITY);
        let (hist_tx, hist_rx) = telemetry::history();

        let mut handles = Vec::with_capacity(4);

        // Estimator task: W paced reads, then one velocity sample fan-out.
        {
            let shutdown = shutdown.clone();
            let windows = windows.clone();
            let clock = clock.clone();
            let window_samples = cfg.estimator.window_samples;
            let period = Duration::from_millis(cfg.estimator.sample_period_ms);
            let mut est = VelocityEstimator::new(
                imu_right,
                imu_left,
                cfg.estimator.clone(),
                cfg.timeouts.clone(),
            );
            handles.push(std::thread::spawn(move || {
                'outer: loop {
                    for _ in 0..window_samples {
                        if shutdown.load(Ordering::Relaxed) {
                            break 'outer;
                        }
                        est.sample_once();
                        clock.sleep(period);
                    }
                    let sample = est.finish_window();
                    let dropped = vel_tx.send(sample);
                    if dropped > 0 {
                        tracing::trace!(dropped, "velocity backlog shed");
                    }
                    hist_tx.send(Row {
                        window: sample.window,
                        right: sample.right,
                        left: sample.left,
                    });
                    windows.store(sample.window, Ordering::Relaxed);
                }
                tracing::debug!("estimator task exiting");
            }));
        }

        // Spotter task: consume velocity pairs, advance the rep machine.
        {
            let shutdown = shutdown.clone();
            let clock = clock.clone();
            let phase = phase.clone();
            let reps = reps.clone();
            let cycle = Duration::from_millis(cfg.spotter.cycle_ms);
            let mut machine = SpotMachine::new(
                cfg.spotter.clone(),
                shares.spot_request.clone(),
                shares.spot_complete.clone(),
                shares.send_data.clone(),
            );
            handles.push(std::thread::spawn(move || {
                while !shutdown.load(Ordering::Relaxed) {
                    if machine.wants_sample() {
                        if let Some(s) = vel_rx.recv_timeout(cycle) {
                            machine.step(s.right, s.left);
                        } else {
                            // Stream stalled; keep `Spotting` polling the
                            // winch acknowledgment on the cycle cadence.
                            machine.step_idle();
                        }
                    } else {
                        machine.step_idle();
                        clock.sleep(cycle);
                    }
                    phase.put(machine.phase());
                    reps.store(machine.reps(), Ordering::Relaxed);
                }
                tracing::debug!("spotter task exiting");
            }));
        }

        // Winch task: poll the request mailbox and drive toward target travel.
        {
            let shutdown = shutdown.clone();
            let clock = clock.clone();
            let cycle = Duration::from_millis(cfg.winch.cycle_ms);
            let mut ctl = WinchController::new(
                winch,
                cfg.winch.clone(),
                encoder,
                shares.spot_request.clone(),
                shares.spot_complete.clone(),
            );
            handles.push(std::thread::spawn(move || {
                while !shutdown.load(Ordering::Relaxed) {
                    if let Err(e) = ctl.step() {
                        tracing::warn!(error = %e, "winch step failed");
                    }
                    clock.sleep(cycle);
                }
                if let Err(e) = ctl.motor_stop() {
                    tracing::warn!(error = %e, "motor stop on shutdown failed");
                }
                tracing::debug!("winch task exiting");
            }));
        }

        // Reporter task: lowest priority, renders CSV when data is requested.
        {
            let shutdown = shutdown.clone();
            let clock = clock.clone();
            let latest = latest_report.clone();
            let period = Duration::from_millis(REPORT_PERIOD_MS);
            let mut reporter = Reporter::new(
                hist_rx,
                shares.send_data.clone(),
                cfg.estimator.window_s,
            );
            handles.push(std::thread::spawn(move || {
                while !shutdown.load(Ordering::Relaxed) {
                    if let Some(csv) = reporter.poll() {
                        let rows = csv.lines().count().saturating_sub(1);
                        tracing::info!(rows, "velocity report rendered");
                        let mut slot = latest.lock().unwrap_or_else(|e| e.into_inner());
                        *slot = Some(csv);
                    }
                    clock.sleep(period);
                }
                tracing::debug!("reporter task exiting");
            }));
        }

        Ok(Self {
            shutdown,
            handles,
            shares,
            phase,
            windows,
            reps,
            latest_report,
        })
    }

    pub fn shares(&self) -> &Shares {
        &self.shares
    }

    /// Latest rep phase published by the spotter task.
    pub fn phase(&self) -> RepPhase {
        self.phase.get()
    }

    /// Windows completed by the estimator so far.
    pub fn windows(&self) -> u64 {
        self.windows.load(Ordering::Relaxed)
    }

    pub fn reps(&self) -> u32 {
        self.reps.load(Ordering::Relaxed)
    }

    /// Ask the reporter to render on its next cycle.
    pub fn request_report(&self) {
        self.shares.send_data.put(true);
    }

    /// Take the most recent rendered report, if any.
    pub fn take_report(&self) -> Option<String> {
        let mut slot = self
            .latest_report
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        slot.take()
    }

    /// Signal shutdown and join every task.
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.join() {
                tracing::warn!(?e, "task panicked during shutdown");
            }
        }
    }
}

impl Drop for Rig {
    fn drop(&mut self) {
        self.halt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{NoopWinch, ScriptedImu};
    use spotter_traits::clock::MonotonicClock;

    /// A sensor resting at 1 g, i.e. a racked bar.
    fn rest_imu(calib: f32) -> ScriptedImu {
        ScriptedImu::constant((crate::estimator::GRAVITY_MPS2 * calib) as i16)
    }

    fn small_cfg() -> RigCfg {
        RigCfg {
            estimator: EstimatorCfg {
                window_samples: 5,
                window_s: 0.005,
                sample_period_ms: 1,
                ..EstimatorCfg::default()
            },
            spotter: SpotterCfg {
                cycle_ms: 5,
                ..SpotterCfg::default()
            },
            winch: WinchCfg {
                cycle_ms: 5,
                ..WinchCfg::default()
            },
            timeouts: Timeouts::default(),
        }
    }

    #[test]
    fn rejects_zero_window_samples() {
        let mut cfg = small_cfg();
        cfg.estimator.window_samples = 0;
        let err = Rig::spawn(
            ScriptedImu::constant(0),
            ScriptedImu::constant(0),
            NoopWinch,
            Arc::new(QuadratureDecoder::new()),
            cfg,
            Arc::new(MonotonicClock::new()),
        )
        .err()
        .expect("invalid config must be rejected");
        assert!(matches!(err, BuildError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_duty_over_max() {
        let mut cfg = small_cfg();
        cfg.winch.duty = 300;
        cfg.winch.max_duty = 255;
        let err = Rig::spawn(
            ScriptedImu::constant(0),
            ScriptedImu::constant(0),
            NoopWinch,
            Arc::new(QuadratureDecoder::new()),
            cfg,
            Arc::new(MonotonicClock::new()),
        )
        .err()
        .expect("invalid config must be rejected");
        assert!(matches!(err, BuildError::InvalidConfig(_)));
    }

    #[test]
    fn rig_runs_and_stops_cleanly() {
        let cfg = small_cfg();
        let rig = Rig::spawn(
            rest_imu(cfg.estimator.calib_right),
            rest_imu(cfg.estimator.calib_left),
            NoopWinch,
            Arc::new(QuadratureDecoder::new()),
            cfg,
            Arc::new(MonotonicClock::new()),
        )
        .expect("rig spawns");
        std::thread::sleep(Duration::from_millis(100));
        assert!(rig.windows() > 0, "estimator should complete windows");
        assert_eq!(rig.phase(), RepPhase::Racked);
        rig.stop();
    }

    #[test]
    fn report_request_produces_csv() {
        let cfg = small_cfg();
        let rig = Rig::spawn(
            rest_imu(cfg.estimator.calib_right),
            rest_imu(cfg.estimator.calib_left),
            NoopWinch,
            Arc::new(QuadratureDecoder::new()),
            cfg,
            Arc::new(MonotonicClock::new()),
        )
        .expect("rig spawns");
        std::thread::sleep(Duration::from_millis(50));
        rig.request_report();
        std::thread::sleep(Duration::from_millis(2 * REPORT_PERIOD_MS));
        let csv = rig.take_report().expect("report rendered");
        assert!(csv.starts_with(telemetry::CSV_HEADER));
        rig.stop();
    }

    #[test]
    fn spot_completion_is_polled_between_velocity_windows() {
        // Windows land ~600 ms apart; the spotter cycle is 5 ms. The
        // acknowledgment must be observed on the cycle cadence, not on the
        // next velocity sample.
        let mut cfg = small_cfg();
        cfg.estimator.window_samples = 60;
        cfg.estimator.sample_period_ms = 10;
        cfg.spotter.max_rep_cycles = 1;
        let rig = Rig::spawn(
            ScriptedImu::constant(0), // reads as a hard descent on both bars
            ScriptedImu::constant(0),
            NoopWinch,
            Arc::new(QuadratureDecoder::new()),
            cfg,
            Arc::new(MonotonicClock::new()),
        )
        .expect("rig spawns");

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while rig.phase() != RepPhase::Spotting {
            assert!(std::time::Instant::now() < deadline, "never reached spotting");
            std::thread::sleep(Duration::from_millis(5));
        }

        rig.shares().spot_request.put(false);
        rig.shares().spot_complete.put(true);
        let ack_deadline = std::time::Instant::now() + Duration::from_millis(250);
        while rig.phase() != RepPhase::SpotDone {
            assert!(
                std::time::Instant::now() < ack_deadline,
                "completion not observed until the next velocity window"
            );
            std::thread::sleep(Duration::from_millis(5));
        }
        rig.stop();
    }
}
