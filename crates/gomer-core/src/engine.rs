//! Engine lifecycle: wiring, handshake and shutdown.
//!
//! The [`Engine`] owns the shared [`LinkState`], spawns the
//! [`IngestionLoop`] and hands out [`Dispatcher`] clones.
//!
//! ```text
//!  Transport ──inbound──▶ IngestionLoop ──▶ LinkState ◀── Dispatcher ◀── domain commands
//!      ▲                        │                              │
//!      └──── completion acks ───┘                              │
//!      └──────────────────────── requests ─────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let (transport, inbound) = TcpTransport::new("192.168.1.20:9000");
//! let transport = Arc::new(transport);
//! transport.connect().await?;
//!
//! let engine = Engine::start(EngineConfig::default(), transport, inbound)?;
//! let firmware = engine.handshake().await?;
//! ```

use crate::config::EngineConfig;
use crate::dispatch::{bounded, Dispatcher};
use crate::envelope::Envelope;
use crate::error::{LinkError, LinkResult, WaitStage};
use crate::ingest::IngestionLoop;
use crate::sequence::SequenceAllocator;
use crate::state::{LinkState, LinkStatus};
use crate::transport::{InboundReports, Transport};
use crate::version::FirmwareVersion;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A running correlation engine bound to one transport.
pub struct Engine {
    state: Arc<LinkState>,
    transport: Arc<dyn Transport>,
    dispatcher: Dispatcher,
    config: EngineConfig,
    ingest: parking_lot::Mutex<Option<JoinHandle<LinkResult<()>>>>,
}

impl Engine {
    /// Spawn the ingestion loop over `inbound` and return the running engine.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
        inbound: InboundReports,
    ) -> LinkResult<Self> {
        let minimum = config.minimum_firmware()?;
        let state = Arc::new(LinkState::new());
        let sequence = Arc::new(SequenceAllocator::new(config.sequence_base));
        let dispatcher = Dispatcher::new(
            state.clone(),
            transport.clone(),
            sequence,
            config.clone(),
        );

        let ingest = IngestionLoop::new(inbound, state.clone(), transport.clone(), minimum);
        let task = tokio::spawn(ingest.run());
        tracing::info!(minimum = %minimum, base = config.sequence_base, "Engine started");

        Ok(Self {
            state,
            transport,
            dispatcher,
            config,
            ingest: parking_lot::Mutex::new(Some(task)),
        })
    }

    /// A dispatcher sharing this engine's state.
    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    pub fn status(&self) -> LinkStatus {
        self.state.status()
    }

    pub fn state(&self) -> &Arc<LinkState> {
        &self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Query the firmware version and wait for the ingestion loop's verdict.
    pub async fn handshake(&self) -> LinkResult<FirmwareVersion> {
        let mut status = self.state.subscribe_status();
        if let LinkStatus::Ready(version) = *status.borrow() {
            return Ok(version);
        }

        let seq = self.dispatcher.sequence().next();
        let query = Envelope::version_query(seq).encode()?;
        self.dispatcher.send_raw(&query).await?;
        tracing::debug!(seq, "Sent firmware version query");

        let verdict = bounded(
            self.config.handshake_timeout(),
            status.wait_for(|status| *status != LinkStatus::Pending),
        )
        .await;
        let settled = match verdict {
            None => {
                return Err(LinkError::Timeout {
                    seq,
                    stage: WaitStage::Handshake,
                })
            }
            Some(Err(_)) => return Err(LinkError::Disconnected),
            Some(Ok(status)) => status.clone(),
        };
        match settled {
            LinkStatus::Ready(version) => Ok(version),
            other => Err(other.as_error().unwrap_or(LinkError::Disconnected)),
        }
    }

    /// Disconnect the transport and stop the ingestion loop. Pending
    /// submissions fail with [`LinkError::Disconnected`].
    pub async fn shutdown(&self) -> LinkResult<()> {
        let result = self.transport.disconnect().await;
        if let Some(task) = self.ingest.lock().take() {
            task.abort();
        }
        if !matches!(self.state.status(), LinkStatus::Incompatible { .. }) {
            self.state.abort(LinkStatus::Closed);
        }
        tracing::info!("Engine shut down");
        result
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(task) = self.ingest.lock().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    /// Answers the version query with a fixed firmware string.
    struct Firmware {
        version: &'static str,
        reports: mpsc::Sender<String>,
    }

    #[async_trait]
    impl Transport for Firmware {
        async fn connect(&self) -> LinkResult<()> {
            Ok(())
        }
        async fn disconnect(&self) -> LinkResult<()> {
            Ok(())
        }
        async fn transmit(&self, text: &str) -> LinkResult<()> {
            if text.contains("\"hard\"") {
                let reply = format!(
                    r#"{{"seq":1,"msgtype":2,"hard":{{"ver":"{}"}}}}"#,
                    self.version
                );
                let _ = self.reports.send(reply).await;
            }
            Ok(())
        }
    }

    fn engine(version: &'static str) -> Engine {
        let (tx, rx) = mpsc::channel(8);
        let transport = Arc::new(Firmware {
            version,
            reports: tx,
        });
        Engine::start(EngineConfig::default(), transport, rx).unwrap()
    }

    #[tokio::test]
    async fn test_handshake_ready() {
        let engine = engine("3.4.1");
        assert_eq!(
            engine.handshake().await.unwrap(),
            FirmwareVersion::new(3, 4, 1)
        );
        // Second call does not re-query
        assert_eq!(
            engine.handshake().await.unwrap(),
            FirmwareVersion::new(3, 4, 1)
        );
    }

    #[tokio::test]
    async fn test_handshake_incompatible() {
        let engine = engine("2.0.0");
        let err = engine.handshake().await.unwrap_err();
        assert!(matches!(err, LinkError::DeviceIncompatible { .. }));
        assert!(matches!(engine.status(), LinkStatus::Incompatible { .. }));
    }

    #[tokio::test]
    async fn test_shutdown_closes_link() {
        let engine = engine("3.0.0");
        engine.shutdown().await.unwrap();
        assert_eq!(engine.status(), LinkStatus::Closed);
    }

    #[test]
    fn test_bad_minimum_firmware_rejected() {
        let (_tx, rx) = mpsc::channel(1);
        let (tx2, _rx2) = mpsc::channel(1);
        let transport = Arc::new(Firmware {
            version: "3.0.0",
            reports: tx2,
        });
        let config = EngineConfig {
            minimum_firmware: "latest".into(),
            ..EngineConfig::default()
        };
        assert!(matches!(
            Engine::start(config, transport, rx),
            Err(LinkError::InvalidVersion(_))
        ));
    }
}
