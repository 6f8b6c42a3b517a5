//! Human-readable error descriptions and structured JSON error formatting.

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use spotter_core::error::{BuildError, SpotError};

    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        let BuildError::InvalidConfig(msg) = be;
        return format!(
            "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See README for a sample."
        );
    }

    if let Some(se) = err.downcast_ref::<SpotError>() {
        if matches!(se, SpotError::Timeout) {
            return "What happened: A sensor read timed out.\nLikely causes: An MPU-6050 is not wired correctly, lost power, or the timeout is too low.\nHow to fix: Verify SDA/SCL and the AD0 strap, and consider raising timeouts.sensor_ms in the config.".to_string();
        }
        return format!(
            "What happened: {se}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
        );
    }

    // String-based heuristics for errors coming from init or config; use the
    // whole context chain so the root cause survives wrapping.
    let msg = err
        .chain()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("i2c") || lower.contains("gpio") {
        return "What happened: Failed to initialize hardware.\nLikely causes: Incorrect pin/address values or insufficient GPIO/I2C permissions.\nHow to fix: Fix the [pins] section in the config; ensure the process can access /dev/i2c-* and GPIO.".to_string();
    }

    if lower.contains("invalid configuration") || lower.contains("must be") {
        return format!(
            "What happened: Configuration is invalid or incomplete.\nDetail: {msg}\nHow to fix: Edit the TOML config and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: config/build problems return 2, everything else 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    use spotter_core::error::BuildError;
    if err.downcast_ref::<BuildError>().is_some() {
        return 2;
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;
    use spotter_core::error::{BuildError, SpotError};

    let reason = if let Some(BuildError::InvalidConfig(_)) = err.downcast_ref::<BuildError>() {
        "InvalidConfig"
    } else if let Some(se) = err.downcast_ref::<SpotError>() {
        match se {
            SpotError::Timeout => "Timeout",
            SpotError::Hardware(_) | SpotError::HardwareFault(_) => "Hardware",
            SpotError::Config(_) => "Config",
            SpotError::State(_) => "State",
        }
    } else {
        "Error"
    };
    json!({ "reason": reason, "message": humanize(err) }).to_string()
}
