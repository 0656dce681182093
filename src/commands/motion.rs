//! Wheels and joints.
//!
//! Motion commands let the caller pick the block mode. Each body part is its
//! own group, so an AUTO move waits for the previous move of the same part
//! while other parts keep going.

use super::{OpCode, Submitter};
use crate::error::GomerResult;
use crate::validation::{in_range, non_zero};
use gomer_core::{BlockMode, Dispatcher};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Open-loop speed; the sign gives the direction.
const OPEN_LOOP_SPEED: RangeInclusive<i64> = -2..=2;
/// Closed-loop speed.
const CLOSED_LOOP_SPEED: RangeInclusive<i64> = 1..=3;
/// Motion timeout in milliseconds.
const MOTION_TIMEOUT_MS: RangeInclusive<i64> = 0..=10_000;

const WHEEL_DISTANCE: RangeInclusive<i64> = -1000..=1000;
const WHEEL_ANGLE: RangeInclusive<i64> = -360..=360;

/// Heading sent with an open-loop wheel move.
const FORWARD: i64 = 0;
const BACKWARD: i64 = 180;

// =============================================================================
// Wheel
// =============================================================================

/// The drive wheels.
#[derive(Debug, Clone)]
pub struct Wheel {
    submitter: Submitter,
}

impl Wheel {
    pub const GROUP: &'static str = "wheel";

    pub(crate) fn new(dispatcher: Dispatcher) -> Self {
        Self {
            submitter: Submitter::new(dispatcher, Some(Self::GROUP)),
        }
    }

    /// Drive at `speed` (-2..=2, not 0; negative reverses) for `timeout_ms`.
    pub async fn drive(&self, speed: i64, timeout_ms: i64, block: BlockMode) -> GomerResult<()> {
        let speed = non_zero("speed", in_range("speed", speed, OPEN_LOOP_SPEED)?)?;
        let timeout = in_range("timeout_ms", timeout_ms, MOTION_TIMEOUT_MS)?;
        let heading = if speed < 0 { BACKWARD } else { FORWARD };

        let descriptor = self
            .submitter
            .descriptor(OpCode::Move)
            .param(1, speed.abs())
            .param(2, heading)
            .param(3, timeout);
        self.submitter.send(descriptor, block).await?;
        Ok(())
    }

    /// Move straight by `distance` (-1000..=1000) at `speed` (1..=3).
    pub async fn move_straight(
        &self,
        speed: i64,
        distance: i64,
        timeout_ms: i64,
        block: BlockMode,
    ) -> GomerResult<()> {
        let descriptor = self
            .submitter
            .descriptor(OpCode::MoveDirectly)
            .param(1, in_range("speed", speed, CLOSED_LOOP_SPEED)?)
            .param(2, in_range("distance", distance, WHEEL_DISTANCE)?)
            .param(3, in_range("timeout_ms", timeout_ms, MOTION_TIMEOUT_MS)?);
        self.submitter.send(descriptor, block).await?;
        Ok(())
    }

    /// Turn in place by `angle` degrees (-360..=360) at `speed` (1..=3).
    pub async fn turn(
        &self,
        speed: i64,
        angle: i64,
        timeout_ms: i64,
        block: BlockMode,
    ) -> GomerResult<()> {
        let descriptor = self
            .submitter
            .descriptor(OpCode::Turn)
            .param(1, in_range("speed", speed, CLOSED_LOOP_SPEED)?)
            .param(2, in_range("angle", angle, WHEEL_ANGLE)?)
            .param(3, in_range("timeout_ms", timeout_ms, MOTION_TIMEOUT_MS)?);
        self.submitter.send(descriptor, block).await?;
        Ok(())
    }
}

// =============================================================================
// Joints
// =============================================================================

/// An articulated body part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointKind {
    Forearm,
    Arm,
    Head,
    Paw,
}

impl JointKind {
    /// Group name, which is also the joint's name.
    pub fn group(self) -> &'static str {
        match self {
            JointKind::Forearm => "forearm",
            JointKind::Arm => "arm",
            JointKind::Head => "head",
            JointKind::Paw => "paw",
        }
    }

    /// Target angles a closed-loop move accepts.
    pub fn angle_range(self) -> RangeInclusive<i64> {
        match self {
            JointKind::Forearm => 0..=210,
            JointKind::Arm => 0..=160,
            JointKind::Head => -15..=65,
            JointKind::Paw => 0..=100,
        }
    }

    fn open_loop(self) -> OpCode {
        match self {
            JointKind::Forearm => OpCode::ForearmOpen,
            JointKind::Arm => OpCode::ArmOpen,
            JointKind::Head => OpCode::HeadOpen,
            JointKind::Paw => OpCode::PawOpen,
        }
    }

    fn closed_loop(self) -> OpCode {
        match self {
            JointKind::Forearm => OpCode::ForearmClose,
            JointKind::Arm => OpCode::ArmClose,
            JointKind::Head => OpCode::HeadClose,
            JointKind::Paw => OpCode::PawClose,
        }
    }
}

impl fmt::Display for JointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.group())
    }
}

impl FromStr for JointKind {
    type Err = crate::error::GomerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "forearm" => Ok(JointKind::Forearm),
            "arm" => Ok(JointKind::Arm),
            "head" => Ok(JointKind::Head),
            "paw" => Ok(JointKind::Paw),
            other => Err(crate::error::GomerError::InvalidParameter(format!(
                "unknown joint '{}'",
                other
            ))),
        }
    }
}

/// One joint: forearm, arm, head or paw.
#[derive(Debug, Clone)]
pub struct Joint {
    kind: JointKind,
    submitter: Submitter,
}

impl Joint {
    pub(crate) fn new(kind: JointKind, dispatcher: Dispatcher) -> Self {
        Self {
            kind,
            submitter: Submitter::new(dispatcher, Some(kind.group())),
        }
    }

    pub fn kind(&self) -> JointKind {
        self.kind
    }

    /// Rotate at `speed` (-2..=2, not 0) until `timeout_ms` runs out.
    pub async fn open_loop_move(
        &self,
        speed: i64,
        timeout_ms: i64,
        block: BlockMode,
    ) -> GomerResult<()> {
        let speed = non_zero("speed", in_range("speed", speed, OPEN_LOOP_SPEED)?)?;
        let descriptor = self
            .submitter
            .descriptor(self.kind.open_loop())
            .param(1, speed)
            .param(3, in_range("timeout_ms", timeout_ms, MOTION_TIMEOUT_MS)?);
        self.submitter.send(descriptor, block).await?;
        Ok(())
    }

    /// Move to `angle` at `speed` (1..=3).
    pub async fn closed_loop_move(
        &self,
        speed: i64,
        angle: i64,
        timeout_ms: i64,
        block: BlockMode,
    ) -> GomerResult<()> {
        let descriptor = self
            .submitter
            .descriptor(self.kind.closed_loop())
            .param(1, in_range("speed", speed, CLOSED_LOOP_SPEED)?)
            .param(2, in_range("angle", angle, self.kind.angle_range())?)
            .param(3, in_range("timeout_ms", timeout_ms, MOTION_TIMEOUT_MS)?);
        self.submitter.send(descriptor, block).await?;
        Ok(())
    }
}
