//! `gomer-core`
//!
//! Command/response correlation engine for the Gomer robot link.
//!
//! Every command sent to the device carries a correlation number. The device
//! answers first with an acknowledgment and later with a completion report,
//! asynchronously and possibly interleaved with other commands. This crate
//! joins those reports back to the caller that issued the command.
//!
//! ## Components
//!
//! - [`SequenceAllocator`]: monotonically increasing correlation numbers
//! - [`LiveOperationTable`]: in-flight operations plus reserved groups
//! - [`IngestionLoop`]: single task routing inbound reports into the table
//! - [`Dispatcher`]: the submission protocol used by every domain command
//! - [`Engine`]: wiring, firmware handshake and shutdown
//! - [`Transport`]: the seam to the physical link ([`TcpTransport`] or a mock)
//!
//! ## Block modes
//!
//! | Mode    | Returns after | Reserves group |
//! |---------|---------------|----------------|
//! | `Never` | acknowledgment | no            |
//! | `Auto`  | acknowledgment | until resolved |
//! | `All`   | completion (with result fields) | no |
//!
//! ## Example
//!
//! ```rust,ignore
//! use gomer_core::{BlockMode, Engine, EngineConfig, TcpTransport, Transport};
//! use std::sync::Arc;
//!
//! let (transport, inbound) = TcpTransport::new("192.168.1.20:9000");
//! let transport = Arc::new(transport);
//! transport.connect().await?;
//!
//! let engine = Engine::start(EngineConfig::default(), transport, inbound)?;
//! engine.handshake().await?;
//!
//! let dispatcher = engine.dispatcher();
//! let turn = dispatcher.descriptor(1103).param(1, 2).param(2, 90).param(3, 5000);
//! dispatcher.submit(turn, Some("wheel"), BlockMode::Auto).await?;
//! ```

pub mod config;
pub mod descriptor;
pub mod dispatch;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod ingest;
pub mod sequence;
pub mod state;
pub mod table;
pub mod transport;
pub mod version;

pub use config::EngineConfig;
pub use descriptor::{OperationDescriptor, ResultFields, PARAM_SLOTS};
pub use dispatch::Dispatcher;
pub use engine::Engine;
pub use envelope::{Category, Envelope, EnvelopeBody, MessageKind, Report, ResultCode};
pub use error::{LinkError, LinkResult, WaitStage};
pub use ingest::IngestionLoop;
pub use sequence::SequenceAllocator;
pub use state::{LinkState, LinkStatus};
pub use table::{BlockMode, LiveOperationTable, OperationHandle, OperationPhase, SubmittedOperation};
pub use transport::{InboundReports, ReportSender, TcpTransport, Transport};
pub use version::FirmwareVersion;
