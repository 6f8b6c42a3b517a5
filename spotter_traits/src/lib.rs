pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// One vertical-axis accelerometer channel.
///
/// Implementations return the raw signed 16-bit sample from the sensor's
/// z-axis register pair. Calibration to m/s² happens in the estimator, not
/// here, so simulated and real sensors share the same integer contract.
pub trait Accelerometer {
    fn read_z(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<i16, Box<dyn std::error::Error + Send + Sync>>;
}

/// The winch motor driver: signed duty selects direction and PWM level.
pub trait Winch {
    /// Command a signed duty. Positive and negative values select opposite
    /// rotation senses; magnitude is the PWM level, clamped by the driver.
    fn set_duty(&mut self, duty: i16) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    /// Zero the output.
    fn stop(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    /// Emergency drive at the driver's maximum duty.
    fn full_drive(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
