//! Domain command builders.
//!
//! Each builder validates its arguments, fills an operation descriptor with
//! the matching [`OpCode`] and parameters, and submits it through the shared
//! [`Dispatcher`]. Nothing is sent when validation fails.
//!
//! ```text
//!  Wheel / Joint ─┐
//!  Sensors ───────┤
//!  Player ────────┤                  ┌────────────┐
//!  Screen ────────┼── Submitter ────▶│ Dispatcher │──▶ device
//!  Emotion ───────┤  (group, block)  └────────────┘
//!  Faces/Patterns ┘
//! ```
//!
//! | Family   | Group     | Block mode            |
//! |----------|-----------|-----------------------|
//! | Motion   | per joint | chosen by the caller  |
//! | Sensors  | none      | ALL                   |
//! | Player   | `player`  | ALL, AUTO for files   |
//! | Screen   | none      | ALL, NEVER for images |
//! | Emotion  | `emotion` | AUTO, ALL for queries |
//! | Vision   | none      | ALL                   |

pub mod emotion;
pub mod motion;
pub mod player;
pub mod screen;
pub mod sensor;
pub mod vision;

pub use emotion::{Emotion, EMOTIONS};
pub use motion::{Joint, JointKind, Wheel};
pub use player::Player;
pub use screen::Screen;
pub use sensor::{EulerAngles, InfraredSensor, LightMode, Quaternion, Sensors};
pub use vision::{ApproachStep, Detection, FaceDetection, PatternDetection, PatternSet};

use crate::error::{GomerError, GomerResult};
use gomer_core::{BlockMode, Dispatcher, OperationDescriptor, ResultFields};
use std::fmt;

/// "On" value of a switch parameter.
pub const SWITCH_ON: i64 = 101;
/// "Off" value of a switch parameter.
pub const SWITCH_OFF: i64 = 100;

pub(crate) fn switch(on: bool) -> i64 {
    if on {
        SWITCH_ON
    } else {
        SWITCH_OFF
    }
}

// =============================================================================
// Opcode catalogue
// =============================================================================

/// Operation selector carried in the `item` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    // Lights and sensors
    SetLightColor = 1001,
    LightSwitch = 1002,
    SetLightMode = 1003,
    CliffDetect = 1011,
    Infrared = 1021,
    Gyroscope = 1031,
    // Motion: odd = open loop, even = closed loop, except wheel turn
    Move = 1101,
    MoveDirectly = 1102,
    Turn = 1103,
    ForearmOpen = 1111,
    ForearmClose = 1112,
    ArmOpen = 1121,
    ArmClose = 1122,
    HeadOpen = 1131,
    HeadClose = 1132,
    PawOpen = 1141,
    PawClose = 1142,
    // Audio
    Tts = 1201,
    PlayNotes = 1202,
    Volume = 1204,
    PlayStatus = 1205,
    PlayFile = 1206,
    StopPlay = 1207,
    // Screen
    ShowImage = 1301,
    GetShowStatus = 1302,
    ShowCamera = 1303,
    StopShowing = 1304,
    // Emotion
    PlayEmotion = 1401,
    EmotionStatus = 1402,
    PlayCustomEmotion = 1403,
    StopEmotion = 1404,
    // Face detection
    DetectFace = 3101,
    GetFaceFeature = 3102,
    RegisterFace = 3103,
    GetName = 3104,
    GetExpression = 3105,
    GetFeatureFile = 3106,
    GetSimilarity = 3107,
    RenameFace = 3108,
    GetFaceList = 3109,
    DeleteFace = 3110,
    // Pattern detection
    DetectPattern = 3201,
    AddPattern = 3202,
    DeletePattern = 3203,
    RenamePattern = 3204,
    GetPatternList = 3205,
    GetPatternLocation = 3206,
    MoveToPattern = 3211,
}

impl OpCode {
    pub const ALL: [OpCode; 48] = [
        OpCode::SetLightColor,
        OpCode::LightSwitch,
        OpCode::SetLightMode,
        OpCode::CliffDetect,
        OpCode::Infrared,
        OpCode::Gyroscope,
        OpCode::Move,
        OpCode::MoveDirectly,
        OpCode::Turn,
        OpCode::ForearmOpen,
        OpCode::ForearmClose,
        OpCode::ArmOpen,
        OpCode::ArmClose,
        OpCode::HeadOpen,
        OpCode::HeadClose,
        OpCode::PawOpen,
        OpCode::PawClose,
        OpCode::Tts,
        OpCode::PlayNotes,
        OpCode::Volume,
        OpCode::PlayStatus,
        OpCode::PlayFile,
        OpCode::StopPlay,
        OpCode::ShowImage,
        OpCode::GetShowStatus,
        OpCode::ShowCamera,
        OpCode::StopShowing,
        OpCode::PlayEmotion,
        OpCode::EmotionStatus,
        OpCode::PlayCustomEmotion,
        OpCode::StopEmotion,
        OpCode::DetectFace,
        OpCode::GetFaceFeature,
        OpCode::RegisterFace,
        OpCode::GetName,
        OpCode::GetExpression,
        OpCode::GetFeatureFile,
        OpCode::GetSimilarity,
        OpCode::RenameFace,
        OpCode::GetFaceList,
        OpCode::DeleteFace,
        OpCode::DetectPattern,
        OpCode::AddPattern,
        OpCode::DeletePattern,
        OpCode::RenamePattern,
        OpCode::GetPatternList,
        OpCode::GetPatternLocation,
        OpCode::MoveToPattern,
    ];

    /// Numeric `item` value.
    pub const fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.code() == code)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

// =============================================================================
// Submitter
// =============================================================================

/// A dispatcher bound to one command family's group.
#[derive(Debug, Clone)]
pub(crate) struct Submitter {
    dispatcher: Dispatcher,
    group: Option<&'static str>,
}

impl Submitter {
    pub(crate) fn new(dispatcher: Dispatcher, group: Option<&'static str>) -> Self {
        Self { dispatcher, group }
    }

    /// A fresh descriptor for `op`.
    pub(crate) fn descriptor(&self, op: OpCode) -> OperationDescriptor {
        self.dispatcher.descriptor(op.code())
    }

    /// Submit in the family's group.
    pub(crate) async fn send(
        &self,
        descriptor: OperationDescriptor,
        block: BlockMode,
    ) -> GomerResult<Option<ResultFields>> {
        Ok(self.dispatcher.submit(descriptor, self.group, block).await?)
    }

    /// Submit outside any group.
    pub(crate) async fn send_ungrouped(
        &self,
        descriptor: OperationDescriptor,
        block: BlockMode,
    ) -> GomerResult<Option<ResultFields>> {
        Ok(self.dispatcher.submit(descriptor, None, block).await?)
    }

    /// Submit in ALL mode outside any group and return the result fields.
    pub(crate) async fn query(&self, descriptor: OperationDescriptor) -> GomerResult<ResultFields> {
        let opcode = descriptor.opcode();
        self.send_ungrouped(descriptor, BlockMode::All)
            .await?
            .ok_or(GomerError::MissingResult {
                opcode,
                field: "completion",
            })
    }
}

/// Read a numeric result field, failing if the device left it out.
pub(crate) fn required_param(fields: &ResultFields, slot: usize) -> GomerResult<i64> {
    fields.get_param(slot).ok_or(GomerError::MissingResult {
        opcode: fields.opcode(),
        field: PARAM_NAMES[slot.saturating_sub(1).min(PARAM_NAMES.len() - 1)],
    })
}

const PARAM_NAMES: [&str; 5] = ["prm1", "prm2", "prm3", "prm4", "prm5"];

#[cfg(test)]
pub(crate) mod testing {
    use gomer_core::{Engine, EngineConfig};
    use gomer_driver_mock::{MockDevice, MockDeviceBuilder};
    use std::sync::Arc;

    /// An engine over a mock device, past the firmware handshake.
    pub(crate) async fn connected(builder: MockDeviceBuilder) -> (Engine, MockDevice) {
        let (device, inbound) = builder.build();
        let engine = Engine::start(EngineConfig::default(), Arc::new(device.clone()), inbound)
            .expect("engine starts");
        engine.handshake().await.expect("handshake");
        (engine, device)
    }
}
