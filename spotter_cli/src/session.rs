//! Rig assembly and run execution: config mapping, device selection
//! (hardware vs. simulated), shutdown wiring and the final report.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eyre::WrapErr;
use spotter_core::runner::{REPORT_PERIOD_MS, Rig, RigCfg};
use spotter_core::spot::RepPhase;
use spotter_core::winch::QuadratureDecoder;
use spotter_traits::clock::MonotonicClock;
use spotter_traits::{Accelerometer, Winch};

/// Poll cadence of the supervising loop below; everything fast runs inside
/// the rig's own threads.
const SUPERVISE_MS: u64 = 50;

/// Per-window acceleration profile the simulated sensors play back: one
/// clean rep, then a descent that stalls under the bar until the rep timer
/// forces a spot.
#[cfg(not(feature = "hardware"))]
const DEMO_PROFILE: [f32; 6] = [-2.0, 0.0, 2.0, 0.0, -2.0, 0.0];

/// One burst of simulated drum rotation while the motor is driven. The B
/// level mirrors the duty sign so the decoded travel advances toward the
/// target for either drive direction.
#[cfg(any(not(feature = "hardware"), test))]
fn pump_encoder(decoder: &QuadratureDecoder, duty: i16) {
    if duty == 0 {
        return;
    }
    let b = duty < 0;
    for _ in 0..50 {
        decoder.edge(true, b);
        decoder.edge(false, b);
    }
}

pub fn run(
    cfg: &spotter_config::Config,
    windows: Option<u64>,
    csv: Option<&Path>,
) -> eyre::Result<()> {
    let rig_cfg = RigCfg::from(cfg);
    let encoder = Arc::new(QuadratureDecoder::new());

    #[cfg(feature = "hardware")]
    {
        let imu_right = spotter_hardware::HardwareImu::new(1, cfg.pins.imu_right_addr)
            .wrap_err("open right IMU")?;
        let imu_left = spotter_hardware::HardwareImu::new(1, cfg.pins.imu_left_addr)
            .wrap_err("open left IMU")?;
        let winch = spotter_hardware::HardwareWinch::new(
            cfg.pins.motor_in1,
            cfg.pins.motor_in2,
            cfg.pins.motor_pwm,
            cfg.winch.max_duty,
        )
        .wrap_err("open winch pins")?;
        let decoder = encoder.clone();
        let _watch = spotter_hardware::EncoderWatch::new(
            cfg.pins.encoder_a,
            cfg.pins.encoder_b,
            move |a, b| decoder.edge(a, b),
        )
        .wrap_err("attach encoder interrupt")?;
        tracing::info!("hardware devices ready");
        supervise(imu_right, imu_left, winch, encoder, rig_cfg, windows, csv)
    }
    #[cfg(not(feature = "hardware"))]
    {
        let imu_right = spotter_hardware::SimulatedImu::with_profile(
            DEMO_PROFILE.to_vec(),
            rig_cfg.estimator.window_samples,
            rig_cfg.estimator.calib_right,
        );
        let imu_left = spotter_hardware::SimulatedImu::with_profile(
            DEMO_PROFILE.to_vec(),
            rig_cfg.estimator.window_samples,
            rig_cfg.estimator.calib_left,
        );
        let winch = spotter_hardware::SimulatedWinch::new(cfg.winch.max_duty);
        // Simulated drum: reel the encoder while the motor is driven.
        let duty = winch.duty_handle();
        let decoder = encoder.clone();
        let pump_stop = Arc::new(AtomicBool::new(false));
        let pump_stop_thread = pump_stop.clone();
        let pump = std::thread::spawn(move || {
            while !pump_stop_thread.load(Ordering::Relaxed) {
                pump_encoder(&decoder, duty.load(Ordering::Relaxed));
                std::thread::sleep(Duration::from_millis(1));
            }
        });
        tracing::info!("simulated devices ready");
        let result = supervise(imu_right, imu_left, winch, encoder, rig_cfg, windows, csv);
        pump_stop.store(true, Ordering::Relaxed);
        if pump.join().is_err() {
            tracing::warn!("encoder pump thread panicked");
        }
        result
    }
}

fn supervise<A, M>(
    imu_right: A,
    imu_left: A,
    winch: M,
    encoder: Arc<QuadratureDecoder>,
    rig_cfg: RigCfg,
    windows: Option<u64>,
    csv: Option<&Path>,
) -> eyre::Result<()>
where
    A: Accelerometer + Send + 'static,
    M: Winch + Send + 'static,
{
    let rig = Rig::spawn(
        imu_right,
        imu_left,
        winch,
        encoder,
        rig_cfg,
        Arc::new(MonotonicClock::new()),
    )
    .map_err(eyre::Report::new)
    .wrap_err("build rig")?;

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::Relaxed);
        })
        .wrap_err("install Ctrl-C handler")?;
    }

    tracing::info!(windows = ?windows, "rig running");
    let mut last_phase = rig.phase();
    loop {
        if interrupted.load(Ordering::Relaxed) {
            tracing::info!("interrupted, shutting down");
            break;
        }
        if let Some(n) = windows
            && rig.windows() >= n
        {
            tracing::info!(n, "window bound reached");
            break;
        }
        let phase = rig.phase();
        if phase != last_phase {
            tracing::info!(phase = phase.name(), reps = rig.reps(), "rig phase");
            last_phase = phase;
        }
        if phase == RepPhase::SpotDone && windows.is_none() {
            tracing::info!("spot finished, stopping run");
            break;
        }
        std::thread::sleep(Duration::from_millis(SUPERVISE_MS));
    }

    // Pull a final report before the tasks stop.
    rig.request_report();
    let deadline = std::time::Instant::now() + Duration::from_millis(3 * REPORT_PERIOD_MS);
    let mut report = rig.take_report();
    while report.is_none() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(SUPERVISE_MS));
        report = rig.take_report();
    }

    let reps = rig.reps();
    let total_windows = rig.windows();
    rig.stop();

    if let Some(csv_text) = report {
        match csv {
            Some(path) => {
                std::fs::write(path, &csv_text)
                    .wrap_err_with(|| format!("write report to {}", path.display()))?;
                tracing::info!(path = %path.display(), "velocity report written");
            }
            None => {
                let rows = csv_text.lines().count().saturating_sub(1);
                tracing::info!(rows, "velocity report rendered (pass --csv to save it)");
            }
        }
    } else if csv.is_some() {
        tracing::warn!("no velocity report was produced");
    }

    println!("run finished: {total_windows} windows, {reps} reps");
    Ok(())
}

/// Probe every device once without starting the rig.
pub fn self_check(cfg: &spotter_config::Config) -> eyre::Result<()> {
    let timeout = Duration::from_millis(cfg.timeouts.sensor_ms);

    #[cfg(feature = "hardware")]
    {
        let mut right = spotter_hardware::HardwareImu::new(1, cfg.pins.imu_right_addr)
            .wrap_err("open right IMU")?;
        let mut left = spotter_hardware::HardwareImu::new(1, cfg.pins.imu_left_addr)
            .wrap_err("open left IMU")?;
        let mut winch = spotter_hardware::HardwareWinch::new(
            cfg.pins.motor_in1,
            cfg.pins.motor_in2,
            cfg.pins.motor_pwm,
            cfg.winch.max_duty,
        )
        .wrap_err("open winch pins")?;
        probe(&mut right, &mut left, &mut winch, timeout)
    }
    #[cfg(not(feature = "hardware"))]
    {
        let mut right = spotter_hardware::SimulatedImu::at_rest(cfg.estimator.calib_right);
        let mut left = spotter_hardware::SimulatedImu::at_rest(cfg.estimator.calib_left);
        let mut winch = spotter_hardware::SimulatedWinch::new(cfg.winch.max_duty);
        probe(&mut right, &mut left, &mut winch, timeout)
    }
}

fn probe(
    right: &mut impl Accelerometer,
    left: &mut impl Accelerometer,
    winch: &mut impl Winch,
    timeout: Duration,
) -> eyre::Result<()> {
    let map = spotter_core::error::map_hw_error_dyn;
    let raw_r = right
        .read_z(timeout)
        .map_err(|e| eyre::Report::new(map(&*e)))
        .wrap_err("right IMU read")?;
    let raw_l = left
        .read_z(timeout)
        .map_err(|e| eyre::Report::new(map(&*e)))
        .wrap_err("left IMU read")?;
    winch
        .stop()
        .map_err(|e| eyre::Report::new(map(&*e)))
        .wrap_err("winch stop")?;
    tracing::info!(raw_r, raw_l, "self-check devices responded");
    Ok(())
}
