//! Hardware shims for the spotting rig.
//!
//! Simulated devices are always available and are what the CLI uses by
//! default; the real MPU-6050 pair and H-bridge winch live behind the
//! `hardware` feature (Linux/`rppal` only).
pub mod error;
#[cfg(feature = "hardware")]
pub mod mpu6050;

use spotter_traits::{Accelerometer, Winch};
use std::sync::Arc;
use std::sync::atomic::{AtomicI16, Ordering};

pub const GRAVITY_MPS2: f32 = 9.81;

/// Simulated vertical-axis accelerometer.
///
/// Produces raw counts for a scripted per-window acceleration profile
/// (m/s², gravity-relative); after the profile is exhausted the sensor
/// reads as at rest. Raw counts follow the real sensor's convention:
/// `raw = (az + g) * calib`.
pub struct SimulatedImu {
    calib: f32,
    profile_mps2: Vec<f32>,
    window_samples: u32,
    reads: u64,
}

impl SimulatedImu {
    /// A sensor lying still on the bar.
    pub fn at_rest(calib: f32) -> Self {
        Self::with_profile(Vec::new(), 1, calib)
    }

    /// One profile entry per estimation window; each entry is repeated for
    /// `window_samples` consecutive reads.
    pub fn with_profile(profile_mps2: Vec<f32>, window_samples: u32, calib: f32) -> Self {
        Self {
            calib,
            profile_mps2,
            window_samples: window_samples.max(1),
            reads: 0,
        }
    }
}

impl Accelerometer for SimulatedImu {
    fn read_z(
        &mut self,
        _timeout: std::time::Duration,
    ) -> Result<i16, Box<dyn std::error::Error + Send + Sync>> {
        let window = (self.reads / u64::from(self.window_samples)) as usize;
        self.reads += 1;
        let az = self.profile_mps2.get(window).copied().unwrap_or(0.0);
        let raw = ((az + GRAVITY_MPS2) * self.calib).clamp(i16::MIN as f32, i16::MAX as f32);
        Ok(raw as i16)
    }
}

/// Simulated winch driver. The commanded duty is published through a shared
/// atomic so a test or the CLI's encoder pump can observe it.
pub struct SimulatedWinch {
    duty: Arc<AtomicI16>,
    max_duty: i16,
}

impl SimulatedWinch {
    pub fn new(max_duty: i16) -> Self {
        Self {
            duty: Arc::new(AtomicI16::new(0)),
            max_duty: max_duty.clamp(1, 255),
        }
    }

    /// Handle observing the currently commanded duty (0 when stopped).
    pub fn duty_handle(&self) -> Arc<AtomicI16> {
        self.duty.clone()
    }
}

impl Winch for SimulatedWinch {
    fn set_duty(&mut self, duty: i16) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let clamped = duty.clamp(-self.max_duty, self.max_duty);
        self.duty.store(clamped, Ordering::Relaxed);
        tracing::debug!(duty = clamped, "winch duty (simulated)");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.duty.store(0, Ordering::Relaxed);
        tracing::debug!("winch stopped (simulated)");
        Ok(())
    }

    fn full_drive(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.duty.store(self.max_duty, Ordering::Relaxed);
        tracing::debug!("winch full drive (simulated)");
        Ok(())
    }
}

#[cfg(feature = "hardware")]
pub struct HardwareImu {
    mpu: mpu6050::Mpu6050,
}

#[cfg(feature = "hardware")]
impl HardwareImu {
    pub fn new(bus: u8, addr: u8) -> error::Result<Self> {
        let mpu = mpu6050::Mpu6050::new(bus, addr)?;
        Ok(Self { mpu })
    }
}

#[cfg(feature = "hardware")]
impl Accelerometer for HardwareImu {
    fn read_z(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<i16, Box<dyn std::error::Error + Send + Sync>> {
        let raw = self.mpu.read_accel_z(timeout)?;
        tracing::trace!(raw, "mpu6050 sample");
        Ok(raw)
    }
}

#[cfg(feature = "hardware")]
pub struct HardwareWinch {
    in1: rppal::gpio::OutputPin,
    in2: rppal::gpio::OutputPin,
    pwm: rppal::gpio::OutputPin,
    max_duty: i16,
}

#[cfg(feature = "hardware")]
impl HardwareWinch {
    const PWM_HZ: f64 = 1000.0;

    pub fn new(in1_pin: u8, in2_pin: u8, pwm_pin: u8, max_duty: i16) -> error::Result<Self> {
        let gpio = rppal::gpio::Gpio::new().map_err(|e| error::HwError::Gpio(e.to_string()))?;
        let get = |p: u8| -> error::Result<rppal::gpio::OutputPin> {
            Ok(gpio
                .get(p)
                .map_err(|e| error::HwError::Gpio(e.to_string()))?
                .into_output())
        };
        let mut in1 = get(in1_pin)?;
        let mut in2 = get(in2_pin)?;
        in1.set_high();
        in2.set_low();
        Ok(Self {
            in1,
            in2,
            pwm: get(pwm_pin)?,
            max_duty: max_duty.clamp(1, 255),
        })
    }

    fn apply(&mut self, duty: i16) -> error::Result<()> {
        let clamped = duty.clamp(-self.max_duty, self.max_duty);
        if clamped >= 0 {
            self.in1.set_high();
            self.in2.set_low();
        } else {
            self.in1.set_low();
            self.in2.set_high();
        }
        let level = f64::from(clamped.unsigned_abs()) / f64::from(self.max_duty);
        self.pwm
            .set_pwm_frequency(Self::PWM_HZ, level)
            .map_err(|e| error::HwError::Gpio(e.to_string()))?;
        Ok(())
    }
}

#[cfg(feature = "hardware")]
impl Winch for HardwareWinch {
    fn set_duty(&mut self, duty: i16) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.apply(duty)?;
        Ok(())
    }
    fn stop(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.apply(0)?;
        Ok(())
    }
    fn full_drive(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.apply(self.max_duty)?;
        Ok(())
    }
}

/// GPIO interrupt watch on the encoder's A channel.
///
/// Fires `on_edge(a, b)` from the interrupt context on every edge of channel
/// A, with channel B sampled at that instant. The watch unregisters when
/// dropped. The callback must be interrupt-safe: no blocking, no channels,
/// no logging.
#[cfg(feature = "hardware")]
pub struct EncoderWatch {
    _pin_a: rppal::gpio::InputPin,
}

#[cfg(feature = "hardware")]
impl EncoderWatch {
    pub fn new(
        pin_a: u8,
        pin_b: u8,
        on_edge: impl Fn(bool, bool) + Send + 'static,
    ) -> error::Result<Self> {
        use rppal::gpio::{Gpio, Level, Trigger};
        let gpio = Gpio::new().map_err(|e| error::HwError::Gpio(e.to_string()))?;
        let pin_b = gpio
            .get(pin_b)
            .map_err(|e| error::HwError::Gpio(e.to_string()))?
            .into_input();
        let mut pin_a = gpio
            .get(pin_a)
            .map_err(|e| error::HwError::Gpio(e.to_string()))?
            .into_input();
        pin_a
            .set_async_interrupt(Trigger::Both, move |level| {
                on_edge(level == Level::High, pin_b.is_high());
            })
            .map_err(|e| error::HwError::Gpio(e.to_string()))?;
        Ok(Self { _pin_a: pin_a })
    }
}
