use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum SpotError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("timeout waiting for sensor")]
    Timeout,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    State(String),
}

/// Rejected at `Rig::spawn`; the devices themselves arrive by value, so the
/// only thing left to get wrong at build time is the configuration.
#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;

/// Map any boxed error to a typed SpotError, with special handling for
/// hardware errors when the `hardware-errors` feature is enabled.
pub fn map_hw_error_dyn(e: &(dyn std::error::Error + 'static)) -> SpotError {
    #[cfg(feature = "hardware-errors")]
    if let Some(hw) = e.downcast_ref::<spotter_hardware::error::HwError>() {
        use spotter_hardware::error::HwError;
        return match hw {
            HwError::Timeout => SpotError::Timeout,
            other => SpotError::HardwareFault(other.to_string()),
        };
    }
    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        SpotError::Timeout
    } else {
        SpotError::Hardware(s)
    }
}
