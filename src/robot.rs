//! The robot facade.
//!
//! [`Robot`] owns the correlation engine for one device link and hands out
//! the domain command builders. Builders are cheap clones sharing the engine's
//! dispatcher, so they can be moved into separate tasks and used
//! concurrently.
//!
//! # Example
//! ```no_run
//! use gomer::{config::GomerConfig, Robot};
//! use gomer_core::BlockMode;
//!
//! # async fn run() -> Result<(), gomer::GomerError> {
//! let robot = Robot::connect(GomerConfig::load()?).await?;
//! robot.wheel().turn(2, 90, 3000, BlockMode::All).await?;
//! robot.player().tts("hello", "hello").await?;
//! robot.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use crate::commands::{
    Detection, Emotion, FaceDetection, Joint, JointKind, PatternDetection, Player, Screen,
    Sensors, Wheel,
};
use crate::config::GomerConfig;
use crate::error::GomerResult;
use gomer_core::{
    BlockMode, Dispatcher, Engine, FirmwareVersion, InboundReports, LinkStatus, TcpTransport,
    Transport,
};
use std::sync::Arc;

/// Width of the camera frame face positions are reported in.
const FRAME_WIDTH: f64 = 320.0;
/// A face this close to the frame centre counts as faced.
const CENTRE_TOLERANCE: f64 = 20.0;
/// Trial turn used to learn how far a face moves per degree.
const TRIAL_TURN: i64 = 10;
const ROUTINE_SPEED: i64 = 2;
const ROUTINE_TIMEOUT_MS: i64 = 3000;
const FACE_SIZES: (i64, i64) = (10, 300);

/// Outcome of [`Robot::turn_to_face`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceTurn {
    /// No face in view; the robot did not move.
    NotVisible,
    /// The first face was already centred.
    AlreadyFacing,
    /// The robot turned by this many degrees in total.
    Turned(i64),
}

/// A connected, version-checked robot.
pub struct Robot {
    engine: Engine,
    config: GomerConfig,
    firmware: FirmwareVersion,
}

impl std::fmt::Debug for Robot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Robot")
            .field("address", &self.config.link.address)
            .field("firmware", &self.firmware)
            .field("status", &self.engine.status())
            .finish()
    }
}

impl Robot {
    /// Connect over TCP to the address in `config` and verify the firmware.
    pub async fn connect(config: GomerConfig) -> GomerResult<Self> {
        config.validate()?;
        let (transport, inbound) = TcpTransport::new(config.link.address.clone());
        Self::with_transport(config, Arc::new(transport), inbound).await
    }

    /// Connect through any transport, e.g. a mock device in tests.
    pub async fn with_transport(
        config: GomerConfig,
        transport: Arc<dyn Transport>,
        inbound: InboundReports,
    ) -> GomerResult<Self> {
        let device = config
            .link
            .device_name
            .as_deref()
            .unwrap_or(&config.link.address);
        tracing::info!(device, "Connecting to robot");

        transport.connect().await?;
        let engine = Engine::start(config.engine.clone(), transport, inbound)?;

        let settle = config.link.settle_delay();
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }

        let firmware = match engine.handshake().await {
            Ok(version) => version,
            Err(e) => {
                tracing::error!(error = %e, "Firmware handshake failed");
                if let Err(close) = engine.shutdown().await {
                    tracing::warn!(error = %close, "Failed to close link after handshake");
                }
                return Err(e.into());
            }
        };
        tracing::info!(device, firmware = %firmware, "Robot ready");

        Ok(Self {
            engine,
            config,
            firmware,
        })
    }

    pub fn firmware(&self) -> FirmwareVersion {
        self.firmware
    }

    pub fn status(&self) -> LinkStatus {
        self.engine.status()
    }

    pub fn config(&self) -> &GomerConfig {
        &self.config
    }

    /// Raw access to the correlation engine's submission path.
    pub fn dispatcher(&self) -> Dispatcher {
        self.engine.dispatcher()
    }

    pub fn wheel(&self) -> Wheel {
        Wheel::new(self.dispatcher())
    }

    pub fn joint(&self, kind: JointKind) -> Joint {
        Joint::new(kind, self.dispatcher())
    }

    pub fn forearm(&self) -> Joint {
        self.joint(JointKind::Forearm)
    }

    pub fn arm(&self) -> Joint {
        self.joint(JointKind::Arm)
    }

    pub fn head(&self) -> Joint {
        self.joint(JointKind::Head)
    }

    pub fn paw(&self) -> Joint {
        self.joint(JointKind::Paw)
    }

    pub fn sensors(&self) -> Sensors {
        Sensors::new(self.dispatcher())
    }

    pub fn player(&self) -> Player {
        Player::new(self.dispatcher())
    }

    pub fn screen(&self) -> Screen {
        Screen::new(self.dispatcher())
    }

    pub fn emotion(&self) -> Emotion {
        Emotion::new(self.dispatcher())
    }

    /// Face recognition. Fetches the registered names from the robot.
    pub async fn faces(&self) -> GomerResult<FaceDetection> {
        FaceDetection::load(self.dispatcher()).await
    }

    pub fn patterns(&self) -> PatternDetection {
        PatternDetection::new(self.dispatcher())
    }

    /// Turn in place until the first detected face is roughly centred.
    ///
    /// Makes a trial turn towards the face, measures how far the face moved
    /// in the frame, then turns the remaining angle.
    pub async fn turn_to_face(&self) -> GomerResult<FaceTurn> {
        let mut faces = self.faces().await?;
        let Some(before) = first_face_offset(&faces.detect(FACE_SIZES.0, FACE_SIZES.1).await?)
        else {
            tracing::info!("No face in view");
            return Ok(FaceTurn::NotVisible);
        };
        if before.abs() <= CENTRE_TOLERANCE {
            return Ok(FaceTurn::AlreadyFacing);
        }

        let trial = if before < 0.0 { -TRIAL_TURN } else { TRIAL_TURN };
        self.turn_and_wait(trial).await?;

        let after = first_face_offset(&faces.detect(FACE_SIZES.0, FACE_SIZES.1).await?);
        let correction = match after {
            Some(after) if after.abs() > CENTRE_TOLERANCE => remaining_turn(trial, before, after),
            _ => 0,
        };
        if correction != 0 {
            self.turn_and_wait(correction).await?;
        }
        tracing::info!(offset = before, trial, correction, "Turned to face");
        Ok(FaceTurn::Turned(trial + correction))
    }

    /// Approach `pattern` until the robot stops `distance` away from it,
    /// asking for at most `attempts` correction steps.
    ///
    /// Returns whether the robot reported that no further step was needed.
    pub async fn move_to_pattern(
        &self,
        pattern: &str,
        distance: i64,
        attempts: usize,
    ) -> GomerResult<bool> {
        let patterns = self.patterns();
        let wheel = self.wheel();
        for attempt in 1..=attempts {
            let Some(step) = patterns.approach_step(pattern, distance).await? else {
                tracing::info!(pattern, attempt, "Pattern approach finished");
                return Ok(true);
            };
            tracing::debug!(pattern, attempt, ?step, "Applying approach step");
            if let Some(angle) = step.head {
                self.head()
                    .closed_loop_move(ROUTINE_SPEED, angle, ROUTINE_TIMEOUT_MS, BlockMode::All)
                    .await?;
            }
            if step.turn != 0 {
                self.turn_and_wait(step.turn).await?;
            }
            if step.advance != 0 {
                wheel
                    .move_straight(ROUTINE_SPEED, step.advance, ROUTINE_TIMEOUT_MS, BlockMode::All)
                    .await?;
            }
            if step.final_turn != 0 {
                self.turn_and_wait(step.final_turn).await?;
            }
        }
        tracing::warn!(pattern, attempts, "Pattern approach gave up");
        Ok(false)
    }

    async fn turn_and_wait(&self, angle: i64) -> GomerResult<()> {
        self.wheel()
            .turn(ROUTINE_SPEED, angle, ROUTINE_TIMEOUT_MS, BlockMode::All)
            .await
    }

    /// Close the link. Outstanding commands fail with a disconnect error.
    pub async fn shutdown(&self) -> GomerResult<()> {
        self.engine.shutdown().await?;
        Ok(())
    }
}

/// Horizontal distance of the first face's centre from the frame centre.
fn first_face_offset(faces: &[Detection]) -> Option<f64> {
    match faces.first()?.values.as_slice() {
        [x, _, w, ..] => Some(x + w / 2.0 - FRAME_WIDTH / 2.0),
        _ => None,
    }
}

/// Degrees still to turn, assuming the face moves linearly with heading.
fn remaining_turn(trial: i64, before: f64, after: f64) -> i64 {
    let moved = before - after;
    if moved.abs() < f64::EPSILON {
        return 0;
    }
    (trial as f64 * after / moved).round().clamp(-360.0, 360.0) as i64
}
