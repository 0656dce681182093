//! Emotion animations.
//!
//! An emotion combines an expression on the screen, a voice clip and a body
//! motion; each part can be switched off independently.

use super::{required_param, switch, OpCode, Submitter, SWITCH_ON};
use crate::error::GomerResult;
use crate::validation::one_of;
use gomer_core::{BlockMode, Dispatcher};

/// Emotions built into the robot firmware.
pub const EMOTIONS: &[&str] = &[
    "a_apl", "agy_a", "b_blk", "c_cat", "cat_a", "dbt_a", "dizy", "dns_a", "dog_a", "hi_a",
    "hi_b", "hll_a", "hpy_a", "hpy_b", "hpy_sl", "hpy_swl", "hrt_a", "nap_a", "nap_b", "obt_a",
    "obt_b", "obt_c", "scr_a", "scr_b", "sd_a", "sd_e", "sgh_a", "shy_a", "slp_a", "snz_a",
    "sok_a", "sok_wt", "st_a", "td_a", "wgl_a", "ywn_a", "ywn_b", "hry", "ntsy", "song_a",
    "song_b", "song_c",
];

#[derive(Debug, Clone)]
pub struct Emotion {
    submitter: Submitter,
    expression: bool,
    voice: bool,
    motion: bool,
}

impl Emotion {
    pub const GROUP: &'static str = "emotion";

    pub(crate) fn new(dispatcher: Dispatcher) -> Self {
        Self {
            submitter: Submitter::new(dispatcher, Some(Self::GROUP)),
            expression: true,
            voice: true,
            motion: true,
        }
    }

    pub fn set_expression(&mut self, enabled: bool) -> &mut Self {
        self.expression = enabled;
        self
    }

    pub fn set_voice(&mut self, enabled: bool) -> &mut Self {
        self.voice = enabled;
        self
    }

    pub fn set_motion(&mut self, enabled: bool) -> &mut Self {
        self.motion = enabled;
        self
    }

    /// Play one of [`EMOTIONS`]. Waits for the previous emotion to finish.
    pub async fn play(&self, emotion: &str) -> GomerResult<()> {
        let descriptor = self
            .submitter
            .descriptor(OpCode::PlayEmotion)
            .param(1, switch(self.expression))
            .param(2, switch(self.voice))
            .param(3, switch(self.motion))
            .text(1, one_of("emotion", emotion, EMOTIONS)?);
        self.submitter.send(descriptor, BlockMode::Auto).await?;
        Ok(())
    }

    /// Whether an emotion is still playing.
    ///
    /// Emotions run on the face screen, so this reads the screen status.
    pub async fn is_playing(&self) -> GomerResult<bool> {
        let descriptor = self.submitter.descriptor(OpCode::GetShowStatus);
        let fields = self.submitter.query(descriptor).await?;
        Ok(required_param(&fields, 1)? == SWITCH_ON)
    }

    pub async fn stop(&self) -> GomerResult<()> {
        let descriptor = self.submitter.descriptor(OpCode::StopEmotion);
        self.submitter.query(descriptor).await?;
        Ok(())
    }
}
