//! Audio playback.

use super::{required_param, OpCode, Submitter, SWITCH_OFF};
use crate::error::GomerResult;
use crate::validation::{in_range, text_shorter_than};
use gomer_core::{BlockMode, Dispatcher};

const TTS_TEXT_LIMIT: usize = 100;
const FILENAME_LIMIT: usize = 10;
/// Volume sub-command: set.
const VOLUME_SET: i64 = 101;
/// Volume sub-command: query.
const VOLUME_GET: i64 = 102;

/// Speech, sound files and volume.
#[derive(Debug, Clone)]
pub struct Player {
    submitter: Submitter,
}

impl Player {
    pub const GROUP: &'static str = "player";

    pub(crate) fn new(dispatcher: Dispatcher) -> Self {
        Self {
            submitter: Submitter::new(dispatcher, Some(Self::GROUP)),
        }
    }

    /// Synthesize `text` into the sound file `filename` on the robot.
    pub async fn tts(&self, text: &str, filename: &str) -> GomerResult<()> {
        let descriptor = self
            .submitter
            .descriptor(OpCode::Tts)
            .text(1, text_shorter_than("text", text, TTS_TEXT_LIMIT)?)
            .text(2, text_shorter_than("filename", filename, FILENAME_LIMIT)?);
        self.submitter.query(descriptor).await?;
        Ok(())
    }

    /// Start playing a sound file. Waits for the previous file to finish.
    pub async fn play_file(&self, filename: &str) -> GomerResult<()> {
        let descriptor = self
            .submitter
            .descriptor(OpCode::PlayFile)
            .text(1, text_shorter_than("filename", filename, FILENAME_LIMIT)?);
        self.submitter.send(descriptor, BlockMode::Auto).await?;
        Ok(())
    }

    pub async fn stop(&self) -> GomerResult<()> {
        let descriptor = self.submitter.descriptor(OpCode::StopPlay);
        self.submitter.query(descriptor).await?;
        Ok(())
    }

    /// Whether a sound is playing right now.
    pub async fn is_playing(&self) -> GomerResult<bool> {
        let descriptor = self.submitter.descriptor(OpCode::PlayStatus);
        let fields = self.submitter.query(descriptor).await?;
        Ok(required_param(&fields, 1)? != SWITCH_OFF)
    }

    /// Set the volume (1..=5).
    pub async fn set_volume(&self, volume: i64) -> GomerResult<()> {
        let descriptor = self
            .submitter
            .descriptor(OpCode::Volume)
            .param(1, VOLUME_SET)
            .param(2, in_range("volume", volume, 1..=5)?);
        self.submitter.query(descriptor).await?;
        Ok(())
    }

    pub async fn volume(&self) -> GomerResult<i64> {
        let descriptor = self
            .submitter
            .descriptor(OpCode::Volume)
            .param(1, VOLUME_GET);
        let fields = self.submitter.query(descriptor).await?;
        required_param(&fields, 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::connected;
    use gomer_core::OperationDescriptor;
    use gomer_driver_mock::{MockDevice, Reply};

    #[tokio::test]
    async fn test_tts_limits() {
        let (engine, device) = connected(MockDevice::builder()).await;
        let player = Player::new(engine.dispatcher());

        player.tts("hello there", "greet").await.unwrap();
        let sent = device.last_request().unwrap();
        assert_eq!(sent.opcode(), 1201);
        assert_eq!(sent.get_text(1), Some("hello there"));
        assert_eq!(sent.get_text(2), Some("greet"));

        assert!(player.tts(&"a".repeat(100), "greet").await.is_err());
        assert!(player.tts("hi", "longfilename").await.is_err());
    }

    #[tokio::test]
    async fn test_volume_round_trip() {
        let (engine, device) = connected(
            MockDevice::builder().reply(
                1204,
                Reply::fields(OperationDescriptor::with_correlation(0, 0).param(2, 3)),
            ),
        )
        .await;
        let player = Player::new(engine.dispatcher());

        player.set_volume(3).await.unwrap();
        let sent = device.last_request().unwrap();
        assert_eq!(sent.get_param(1), Some(101));
        assert_eq!(sent.get_param(2), Some(3));

        assert_eq!(player.volume().await.unwrap(), 3);
        assert_eq!(device.last_request().unwrap().get_param(1), Some(102));

        assert!(player.set_volume(6).await.is_err());
    }

    #[tokio::test]
    async fn test_play_status() {
        let (engine, _device) = connected(
            MockDevice::builder().reply(
                1205,
                Reply::fields(OperationDescriptor::with_correlation(0, 0).param(1, 100)),
            ),
        )
        .await;
        let player = Player::new(engine.dispatcher());
        assert!(!player.is_playing().await.unwrap());
    }

    #[tokio::test]
    async fn test_play_file_reserves_group() {
        let (engine, device) = connected(MockDevice::builder().auto_complete(false)).await;
        let player = Player::new(engine.dispatcher());

        player.play_file("song").await.unwrap();
        assert!(engine.state().table().is_group_reserved(Player::GROUP));

        let seq = device.last_request().unwrap().correlation();
        device.complete(seq);
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while engine.state().table().is_group_reserved(Player::GROUP) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }
}
