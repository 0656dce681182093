//! Face screen.

use super::{required_param, OpCode, Submitter, SWITCH_ON};
use crate::error::GomerResult;
use crate::validation::text_shorter_than;
use gomer_core::{BlockMode, Dispatcher};

/// Display mode for a still image.
const SHOW_IMAGE_MODE: i64 = 1000;
const IMAGE_NAME_LIMIT: usize = 64;

#[derive(Debug, Clone)]
pub struct Screen {
    submitter: Submitter,
}

impl Screen {
    pub(crate) fn new(dispatcher: Dispatcher) -> Self {
        Self {
            submitter: Submitter::new(dispatcher, None),
        }
    }

    /// Show an image stored on the robot. Returns once the robot accepts it.
    pub async fn show_image(&self, image: &str) -> GomerResult<()> {
        let descriptor = self
            .submitter
            .descriptor(OpCode::ShowImage)
            .param(1, SHOW_IMAGE_MODE)
            .text(1, text_shorter_than("image", image, IMAGE_NAME_LIMIT)?);
        self.submitter.send(descriptor, BlockMode::Never).await?;
        Ok(())
    }

    /// Mirror the camera feed on the screen.
    pub async fn show_camera(&self) -> GomerResult<()> {
        let descriptor = self
            .submitter
            .descriptor(OpCode::ShowCamera)
            .param(1, SWITCH_ON);
        self.submitter.query(descriptor).await?;
        Ok(())
    }

    pub async fn stop_showing(&self) -> GomerResult<()> {
        let descriptor = self.submitter.descriptor(OpCode::StopShowing);
        self.submitter.query(descriptor).await?;
        Ok(())
    }

    pub async fn is_showing(&self) -> GomerResult<bool> {
        let descriptor = self.submitter.descriptor(OpCode::GetShowStatus);
        let fields = self.submitter.query(descriptor).await?;
        Ok(required_param(&fields, 1)? == SWITCH_ON)
    }
}
