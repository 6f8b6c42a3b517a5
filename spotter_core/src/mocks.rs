//! Test and helper mocks for spotter_core.

use spotter_traits::{Accelerometer, Winch};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Accelerometer that plays back a scripted raw sample sequence, then holds
/// a fallback value.
pub struct ScriptedImu {
    samples: VecDeque<i16>,
    fallback: i16,
}

impl ScriptedImu {
    pub fn new(samples: Vec<i16>, fallback: i16) -> Self {
        Self {
            samples: samples.into(),
            fallback,
        }
    }

    /// A sensor that always reads the same raw value.
    pub fn constant(raw: i16) -> Self {
        Self::new(Vec::new(), raw)
    }
}

impl Accelerometer for ScriptedImu {
    fn read_z(
        &mut self,
        _timeout: std::time::Duration,
    ) -> Result<i16, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.samples.pop_front().unwrap_or(self.fallback))
    }
}

/// Accelerometer whose reads always time out.
pub struct FailingImu;

impl Accelerometer for FailingImu {
    fn read_z(
        &mut self,
        _timeout: std::time::Duration,
    ) -> Result<i16, Box<dyn std::error::Error + Send + Sync>> {
        Err(Box::new(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "sensor timeout",
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WinchCmd {
    Duty(i16),
    Stop,
    FullDrive,
}

/// Winch that records every command it receives.
pub struct RecordingWinch {
    commands: Arc<Mutex<Vec<WinchCmd>>>,
}

impl RecordingWinch {
    pub fn new() -> Self {
        Self {
            commands: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn commands(&self) -> Arc<Mutex<Vec<WinchCmd>>> {
        self.commands.clone()
    }

    fn push(&self, cmd: WinchCmd) {
        if let Ok(mut log) = self.commands.lock() {
            log.push(cmd);
        }
    }
}

impl Default for RecordingWinch {
    fn default() -> Self {
        Self::new()
    }
}

impl Winch for RecordingWinch {
    fn set_duty(&mut self, duty: i16) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.push(WinchCmd::Duty(duty));
        Ok(())
    }
    fn stop(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.push(WinchCmd::Stop);
        Ok(())
    }
    fn full_drive(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.push(WinchCmd::FullDrive);
        Ok(())
    }
}

/// Winch that accepts every command and does nothing.
pub struct NoopWinch;

impl Winch for NoopWinch {
    fn set_duty(&mut self, _duty: i16) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
    fn stop(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
    fn full_drive(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}
