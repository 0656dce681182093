//! Mock Gomer device for testing without a robot.
//!
//! [`MockDevice`] implements [`gomer_core::Transport`] and feeds replies into
//! the inbound channel the engine drains, so the whole correlation engine runs
//! in-process. All delays use `tokio::time::sleep`, never `std::thread::sleep`.
//!
//! # Capabilities
//!
//! - Answers the firmware version query with a configurable version
//! - Auto-acknowledges and auto-completes commands (each can be switched off)
//! - Per-opcode [`Reply`] scripts: result fields, rejection, failure, silence
//! - Manual drivers: `acknowledge`, `reject`, `complete`, `fail`, `inject`
//! - `hold_transmit` / `release_transmit` to force submission interleavings
//! - Records every frame for assertions
//!
//! # Example
//!
//! ```rust,ignore
//! use gomer_driver_mock::{MockDevice, Reply};
//!
//! let (device, inbound) = MockDevice::builder()
//!     .firmware("3.1.0")
//!     .reply(1021, Reply::Fail)
//!     .build();
//! let engine = Engine::start(EngineConfig::default(), Arc::new(device.clone()), inbound)?;
//! ```

mod device;
mod script;

pub use device::{MockDevice, MockDeviceBuilder, DEFAULT_FIRMWARE};
pub use script::{Reply, Timing};
