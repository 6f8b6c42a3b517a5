//! End-to-end scenarios coupling estimator, state machine and winch.
//!
//! The synchronous harness drives the three loops lockstep with simulated
//! devices, one machine step per estimation window; the final test runs the
//! whole threaded rig.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use spotter_core::channel::Mailbox;
use spotter_core::estimator::VelocityEstimator;
use spotter_core::mocks::FailingImu;
use spotter_core::runner::{Rig, RigCfg};
use spotter_core::spot::{RepPhase, SpotMachine};
use spotter_core::winch::{QuadratureDecoder, WinchController, WinchState};
use spotter_core::{EstimatorCfg, SpotterCfg, Timeouts, WinchCfg};
use spotter_hardware::{SimulatedImu, SimulatedWinch};
use spotter_traits::clock::MonotonicClock;

const W: u32 = 10;

fn est_cfg() -> EstimatorCfg {
    EstimatorCfg {
        window_samples: W,
        ..EstimatorCfg::default()
    }
}

/// Short-travel winch so simulated spots finish in hundreds of ticks.
fn winch_cfg() -> WinchCfg {
    WinchCfg {
        target_mm: 5.0,
        ..WinchCfg::default()
    }
}

struct Bench {
    est: VelocityEstimator<SimulatedImu>,
    machine: SpotMachine,
    ctl: WinchController<SimulatedWinch>,
    encoder: Arc<QuadratureDecoder>,
    duty: Arc<std::sync::atomic::AtomicI16>,
    spot_request: Mailbox<bool>,
}

impl Bench {
    /// Both sensors follow the same per-window acceleration profile (m/s²).
    fn new(profile: Vec<f32>, spotter: SpotterCfg) -> Self {
        let cfg = est_cfg();
        let est = VelocityEstimator::new(
            SimulatedImu::with_profile(profile.clone(), W, cfg.calib_right),
            SimulatedImu::with_profile(profile, W, cfg.calib_left),
            cfg,
            Timeouts::default(),
        );
        let spot_request = Mailbox::new(false);
        let spot_complete = Mailbox::new(false);
        let machine = SpotMachine::new(
            spotter,
            spot_request.clone(),
            spot_complete.clone(),
            Mailbox::new(false),
        );
        let encoder = Arc::new(QuadratureDecoder::new());
        let winch = SimulatedWinch::new(255);
        let duty = winch.duty_handle();
        let ctl = WinchController::new(
            winch,
            winch_cfg(),
            encoder.clone(),
            spot_request.clone(),
            spot_complete,
        );
        Self {
            est,
            machine,
            ctl,
            encoder,
            duty,
            spot_request,
        }
    }

    /// One full window: W sensor reads, one velocity pair, one machine cycle.
    fn window(&mut self) -> (f32, f32) {
        while !self.est.window_full() {
            self.est.sample_once();
        }
        let s = self.est.finish_window();
        if self.machine.wants_sample() {
            self.machine.step(s.right, s.left);
        } else {
            self.machine.step_idle();
        }
        (s.right, s.left)
    }

    /// Reel the drum while the motor is driven. The decoder sees only rising
    /// edges of A with B low, so the count runs negative while the cable is
    /// pulled in.
    fn pump(&self, edges: u32) {
        if self.duty.load(Ordering::Relaxed) > 0 {
            for _ in 0..edges {
                self.encoder.edge(true, false);
                self.encoder.edge(false, false);
            }
        }
    }
}

#[test]
fn successful_rep_counts_without_spotting() {
    // Descend, pause at chest, ascend, settle.
    let mut b = Bench::new(vec![-2.0, 0.0, 2.0, 0.0], SpotterCfg::default());

    b.window();
    assert_eq!(b.machine.phase(), RepPhase::Descending);
    b.window();
    assert_eq!(b.machine.phase(), RepPhase::ChestStopped);
    b.window();
    assert_eq!(b.machine.phase(), RepPhase::Ascending);
    b.window();
    assert_eq!(b.machine.phase(), RepPhase::Racked);
    assert_eq!(b.machine.reps(), 1);
    assert!(!b.spot_request.get());
    assert_eq!(b.ctl.state(), WinchState::Idle);
}

#[test]
fn stuck_at_chest_times_out_and_winch_completes_spot() {
    let spotter = SpotterCfg {
        max_rep_cycles: 3,
        ..SpotterCfg::default()
    };
    // Descend then stay pinned (no acceleration, bar stopped).
    let mut b = Bench::new(vec![-2.0, 0.0, 0.0, 0.0, 0.0, 0.0], spotter);

    while b.machine.phase() != RepPhase::Spotting {
        b.window();
    }
    assert!(b.spot_request.get());
    assert_eq!(b.machine.reps(), 0);

    // Winch cycle 1: request observed, motor driven.
    b.ctl.step().unwrap();
    assert_eq!(b.ctl.state(), WinchState::Driving);
    assert!(b.duty.load(Ordering::Relaxed) > 0);

    // 5 mm of cable at ~0.0078 mm per tick is ~640 ticks.
    b.pump(700);
    b.ctl.step().unwrap();
    assert_eq!(b.ctl.state(), WinchState::Reached);

    // Winch cycle 3: stop, acknowledge, clear the request.
    b.ctl.step().unwrap();
    assert_eq!(b.ctl.state(), WinchState::Idle);
    assert_eq!(b.duty.load(Ordering::Relaxed), 0);
    assert!(!b.spot_request.get());

    // The machine observes the acknowledgement on its next idle cycle.
    b.window();
    assert_eq!(b.machine.phase(), RepPhase::SpotDone);
    assert!(!b.machine.wants_sample());
}

#[test]
fn sink_during_ascent_raises_spot() {
    // Descend, chest pause, ascend, then the bar falls back.
    let mut b = Bench::new(vec![-2.0, 0.0, 2.0, -3.0], SpotterCfg::default());

    b.window();
    b.window();
    b.window();
    assert_eq!(b.machine.phase(), RepPhase::Ascending);
    let (r, l) = b.window();
    assert!(r < -0.06 && l < -0.06, "velocity pair {r}/{l} should sink");
    assert_eq!(b.machine.phase(), RepPhase::Spotting);
    assert!(b.spot_request.get());
}

#[test]
fn dead_sensors_hold_the_machine_racked() {
    let cfg = est_cfg();
    let mut est = VelocityEstimator::new(FailingImu, FailingImu, cfg, Timeouts::default());
    let mut machine = SpotMachine::new(
        SpotterCfg::default(),
        Mailbox::new(false),
        Mailbox::new(false),
        Mailbox::new(false),
    );
    for _ in 0..5 {
        while !est.window_full() {
            est.sample_once();
        }
        let s = est.finish_window();
        assert_eq!((s.right, s.left), (0.0, 0.0));
        machine.step(s.right, s.left);
    }
    assert_eq!(machine.phase(), RepPhase::Racked);
    assert_eq!(machine.reps(), 0);
}

#[test]
fn threaded_rig_spots_a_failed_rep() {
    let cfg = RigCfg {
        estimator: EstimatorCfg {
            window_samples: 10,
            sample_period_ms: 1,
            ..EstimatorCfg::default()
        },
        spotter: SpotterCfg {
            cycle_ms: 5,
            max_rep_cycles: 3,
            ..SpotterCfg::default()
        },
        winch: WinchCfg {
            cycle_ms: 5,
            target_mm: 5.0,
            ..WinchCfg::default()
        },
        timeouts: Timeouts::default(),
    };

    // Descend for two windows, then freeze under the bar.
    let profile = vec![-2.0, -0.5];
    let imu_r = SimulatedImu::with_profile(profile.clone(), 10, cfg.estimator.calib_right);
    let imu_l = SimulatedImu::with_profile(profile, 10, cfg.estimator.calib_left);
    let winch = SimulatedWinch::new(255);
    let duty = winch.duty_handle();
    let encoder = Arc::new(QuadratureDecoder::new());

    let rig = Rig::spawn(
        imu_r,
        imu_l,
        winch,
        encoder.clone(),
        cfg,
        Arc::new(MonotonicClock::new()),
    )
    .expect("rig spawns");

    // Encoder pump standing in for the drum: reel while the motor is driven.
    let pump_stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let pump = {
        let encoder = encoder.clone();
        let stop = pump_stop.clone();
        std::thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                if duty.load(Ordering::Relaxed) > 0 {
                    for _ in 0..50 {
                        encoder.edge(true, false);
                        encoder.edge(false, false);
                    }
                }
                std::thread::sleep(Duration::from_millis(1));
            }
        })
    };

    let deadline = Instant::now() + Duration::from_secs(5);
    while rig.phase() != RepPhase::SpotDone && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(rig.phase(), RepPhase::SpotDone);
    assert_eq!(rig.reps(), 0);

    // The spot latched a data request; the reporter renders on its cadence.
    let deadline = Instant::now() + Duration::from_secs(3);
    let mut report = None;
    while report.is_none() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
        report = rig.take_report();
    }
    let csv = report.expect("spot should trigger a velocity report");
    assert!(csv.starts_with("Time (s), Velocity R (m/s), Velocity L (m/s)"));

    pump_stop.store(true, Ordering::Relaxed);
    pump.join().expect("pump joins");
    rig.stop();
}
