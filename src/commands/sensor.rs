//! Lights, cliff detection, infrared and gyroscope.
//!
//! All sensor commands wait for completion and use no group.

use super::{required_param, switch, OpCode, Submitter};
use crate::error::{GomerError, GomerResult};
use crate::validation::in_range;
use gomer_core::Dispatcher;
use std::ops::RangeInclusive;
use std::str::FromStr;

const LIGHT_DURATION_MS: RangeInclusive<i64> = 0..=30_000;
const LIGHT_PHASE_MS: RangeInclusive<i64> = 0..=10_000;
/// Sent for an "on" phase of 0, meaning stay on indefinitely.
const LIGHT_ON_FOREVER: i64 = 65_535;
/// Gyroscope quaternion components are fixed-point with 30 fractional bits.
const QUATERNION_SCALE: f64 = (1u64 << 30) as f64;

/// Light effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightMode {
    On = 0,
    Blink = 1,
    Breathe = 2,
}

impl FromStr for LightMode {
    type Err = GomerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "on" => Ok(LightMode::On),
            "blink" => Ok(LightMode::Blink),
            "breathe" => Ok(LightMode::Breathe),
            other => Err(GomerError::InvalidParameter(format!(
                "unknown light mode '{}'",
                other
            ))),
        }
    }
}

/// Which infrared sensor to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfraredSensor {
    Front = 1,
    End = 2,
}

/// Orientation as a unit quaternion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Orientation in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EulerAngles {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

impl Quaternion {
    pub fn to_euler(&self) -> EulerAngles {
        let Quaternion { w, x, y, z } = *self;
        let roll = (2.0 * (w * x + y * z)).atan2(1.0 - 2.0 * (x * x + y * y));
        // Clamp so rounding noise near the poles cannot produce NaN.
        let pitch = (2.0 * (w * y - z * x)).clamp(-1.0, 1.0).asin();
        let yaw = (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z));
        EulerAngles {
            yaw: yaw.to_degrees(),
            pitch: pitch.to_degrees(),
            roll: roll.to_degrees(),
        }
    }
}

/// Light and sensor commands.
#[derive(Debug, Clone)]
pub struct Sensors {
    submitter: Submitter,
}

impl Sensors {
    pub(crate) fn new(dispatcher: Dispatcher) -> Self {
        Self {
            submitter: Submitter::new(dispatcher, None),
        }
    }

    /// Set the light color. Channels are scaled from 0..=255 to 0..=100.
    pub async fn set_light_color(&self, red: u8, green: u8, blue: u8) -> GomerResult<()> {
        let descriptor = self
            .submitter
            .descriptor(OpCode::SetLightColor)
            .param(1, percent(red))
            .param(2, percent(blue))
            .param(3, percent(green));
        self.submitter.query(descriptor).await?;
        Ok(())
    }

    pub async fn light_on(&self) -> GomerResult<()> {
        self.light_switch(true).await
    }

    pub async fn light_off(&self) -> GomerResult<()> {
        self.light_switch(false).await
    }

    async fn light_switch(&self, on: bool) -> GomerResult<()> {
        let descriptor = self
            .submitter
            .descriptor(OpCode::LightSwitch)
            .param(1, switch(on));
        self.submitter.query(descriptor).await?;
        Ok(())
    }

    /// Configure a light effect.
    ///
    /// `on_ms` of 0 keeps the light on for the whole `duration_ms`.
    pub async fn set_light_mode(
        &self,
        mode: LightMode,
        duration_ms: i64,
        on_ms: i64,
        off_ms: i64,
    ) -> GomerResult<()> {
        let duration = in_range("duration_ms", duration_ms, LIGHT_DURATION_MS)?;
        let on = match in_range("on_ms", on_ms, LIGHT_PHASE_MS)? {
            0 => LIGHT_ON_FOREVER,
            on => on,
        };
        let off = in_range("off_ms", off_ms, LIGHT_PHASE_MS)?;

        let descriptor = self
            .submitter
            .descriptor(OpCode::SetLightMode)
            .param(1, mode as i64)
            .param(2, duration)
            .param(3, on)
            .param(4, off);
        self.submitter.query(descriptor).await?;
        Ok(())
    }

    /// Turn cliff detection on or off.
    pub async fn set_cliff_detection(&self, enabled: bool) -> GomerResult<()> {
        let descriptor = self
            .submitter
            .descriptor(OpCode::CliffDetect)
            .param(1, switch(enabled));
        self.submitter.query(descriptor).await?;
        Ok(())
    }

    /// Distance reading of one infrared sensor.
    pub async fn read_infrared(&self, sensor: InfraredSensor) -> GomerResult<i64> {
        let descriptor = self
            .submitter
            .descriptor(OpCode::Infrared)
            .param(1, sensor as i64);
        let fields = self.submitter.query(descriptor).await?;
        required_param(&fields, 2)
    }

    /// Current orientation from the gyroscope.
    pub async fn read_gyroscope(&self) -> GomerResult<Quaternion> {
        let descriptor = self.submitter.descriptor(OpCode::Gyroscope);
        let fields = self.submitter.query(descriptor).await?;
        let component = |slot| required_param(&fields, slot).map(|v| v as f64 / QUATERNION_SCALE);
        Ok(Quaternion {
            w: component(1)?,
            x: component(2)?,
            y: component(3)?,
            z: component(4)?,
        })
    }
}

fn percent(channel: u8) -> i64 {
    (f64::from(channel) / 2.55) as i64
}
