use std::time::{Duration, Instant};
use tracing::trace;

use crate::error::{HwError, Result};

/// MPU-6050 register map, the parts we touch.
const PWR_MGMT_1: u8 = 0x6B;
const ACCEL_ZOUT_H: u8 = 0x3F;

pub struct Mpu6050 {
    i2c: rppal::i2c::I2c,
    addr: u8,
}

impl Mpu6050 {
    /// Open the bus, select the slave and wake the device out of sleep.
    pub fn new(bus: u8, addr: u8) -> Result<Self> {
        let mut i2c =
            rppal::i2c::I2c::with_bus(bus).map_err(|e| HwError::I2c(e.to_string()))?;
        i2c.set_slave_address(u16::from(addr))
            .map_err(|e| HwError::I2c(e.to_string()))?;
        // Clear PWR_MGMT_1 to wake the sensor
        i2c.write(&[PWR_MGMT_1, 0x00])
            .map_err(|e| HwError::I2c(e.to_string()))?;
        Ok(Self { i2c, addr })
    }

    /// One z-axis acceleration sample: ACCEL_ZOUT_H/L combined big-endian.
    pub fn read_accel_z(&mut self, timeout: Duration) -> Result<i16> {
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; 2];
        loop {
            match self.i2c.write_read(&[ACCEL_ZOUT_H], &mut buf) {
                Ok(()) => break,
                Err(e) => {
                    if Instant::now() >= deadline {
                        trace!(addr = self.addr, error = %e, "mpu6050 read timed out");
                        return Err(HwError::Timeout);
                    }
                    std::thread::sleep(Duration::from_micros(200));
                }
            }
        }
        let raw = i16::from_be_bytes(buf);
        trace!(addr = self.addr, raw, "mpu6050 raw read");
        Ok(raw)
    }
}
