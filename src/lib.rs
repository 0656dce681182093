//! # Gomer SDK
//!
//! Client library for the Gomer robot. The robot is driven over a single
//! text-framed JSON link; every command is acknowledged and later completed
//! by the device, and [`gomer_core`] correlates those reports back to the
//! waiting caller.
//!
//! ## Crate Structure
//!
//! - **`commands`**: Domain command builders for wheels, joints, lights and
//!   sensors, audio, the screen, emotions, and face and pattern recognition.
//!   Each validates its arguments and submits one operation.
//! - **`robot`**: The [`Robot`] facade. Connects, verifies the firmware,
//!   hands out command builders and runs the face and pattern approach
//!   routines.
//! - **`config`**: Layered configuration (`config/gomer.toml` plus `GOMER_`
//!   environment overrides) loaded with `figment`.
//! - **`logging`**: `tracing-subscriber` setup driven by the configuration.
//! - **`error`**: The [`GomerError`] type.
//! - **`validation`**: Argument range and length checks shared by the
//!   command builders.
//!
//! The correlation engine itself lives in the `gomer-core` crate and a
//! scriptable in-memory robot in `gomer-driver-mock`.

pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod robot;
pub mod validation;

pub use commands::OpCode;
pub use config::GomerConfig;
pub use error::{GomerError, GomerResult};
pub use robot::{FaceTurn, Robot};

pub use gomer_core::{BlockMode, LinkError, LinkStatus};
