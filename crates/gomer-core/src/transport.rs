//! Transport abstraction for the device link.
//!
//! The engine never touches sockets directly. It talks to a [`Transport`]
//! for outbound frames and drains an [`InboundReports`] channel for inbound
//! ones. The transport must deliver reports already split into discrete
//! frames; no framing logic lives in the engine.
//!
//! # Implementations
//!
//! - [`TcpTransport`]: newline-delimited JSON frames over TCP
//! - `gomer_driver_mock::MockDevice`: simulated device for tests
//!
//! # Example
//!
//! ```rust,ignore
//! use gomer_core::transport::{TcpTransport, Transport};
//!
//! let (transport, inbound) = TcpTransport::new("192.168.1.20:9000");
//! transport.connect().await?;
//! transport.transmit(r#"{"seq":1001,"msgtype":1,"hard":{"num":1001,"call":300}}"#).await?;
//! ```

use crate::error::{LinkError, LinkResult};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Largest frame the device accepts, in bytes.
pub const MAX_FRAME_LEN: usize = 1440;

/// Default capacity of the inbound report channel.
pub const DEFAULT_REPORT_CAPACITY: usize = 256;

/// Receiving end of raw inbound frames, consumed by the ingestion loop.
pub type InboundReports = mpsc::Receiver<String>;

/// Sending end of raw inbound frames, owned by a transport.
pub type ReportSender = mpsc::Sender<String>;

/// Create a report channel with the default capacity.
pub fn report_channel() -> (ReportSender, InboundReports) {
    mpsc::channel(DEFAULT_REPORT_CAPACITY)
}

/// Outbound half of a device link.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the link.
    async fn connect(&self) -> LinkResult<()>;

    /// Close the link. Closing also ends the inbound report stream.
    async fn disconnect(&self) -> LinkResult<()>;

    /// Send one frame.
    async fn transmit(&self, text: &str) -> LinkResult<()>;
}

/// Reject frames the device would truncate.
pub fn check_frame(text: &str) -> LinkResult<()> {
    if text.len() >= MAX_FRAME_LEN {
        return Err(LinkError::Transport(format!(
            "frame of {} bytes exceeds the {} byte limit",
            text.len(),
            MAX_FRAME_LEN
        )));
    }
    Ok(())
}

// =============================================================================
// TcpTransport
// =============================================================================

/// Newline-delimited JSON over TCP.
///
/// A reader task splits inbound bytes into lines and forwards each non-empty
/// line to the report channel. The reader owns the only sender, so the
/// channel closes when the peer hangs up; one transport serves one connection.
pub struct TcpTransport {
    address: String,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    reports: parking_lot::Mutex<Option<ReportSender>>,
    reader: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl TcpTransport {
    /// Create an unconnected transport and its inbound report channel.
    pub fn new(address: impl Into<String>) -> (Self, InboundReports) {
        let (tx, rx) = report_channel();
        let transport = Self {
            address: address.into(),
            writer: tokio::sync::Mutex::new(None),
            reports: parking_lot::Mutex::new(Some(tx)),
            reader: parking_lot::Mutex::new(None),
        };
        (transport, rx)
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

async fn read_frames(read_half: tokio::net::tcp::OwnedReadHalf, reports: ReportSender) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let frame = line.trim();
                if frame.is_empty() {
                    continue;
                }
                if reports.send(frame.to_string()).await.is_err() {
                    tracing::debug!("Report channel closed, stopping reader");
                    return;
                }
            }
            Ok(None) => {
                tracing::info!("Device closed the connection");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Read from device failed");
                return;
            }
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self) -> LinkResult<()> {
        let reports = self.reports.lock().take().ok_or_else(|| {
            LinkError::Transport("transport already used for a connection".to_string())
        })?;

        let stream = TcpStream::connect(&self.address).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        *self.writer.lock().await = Some(write_half);
        *self.reader.lock() = Some(tokio::spawn(read_frames(read_half, reports)));

        tracing::info!(address = %self.address, "Connected to device");
        Ok(())
    }

    async fn disconnect(&self) -> LinkResult<()> {
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                tracing::debug!(error = %e, "Shutdown of write half failed");
            }
        }
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        // Never connected: drop the unused sender so the inbound stream ends.
        self.reports.lock().take();
        tracing::info!(address = %self.address, "Disconnected from device");
        Ok(())
    }

    async fn transmit(&self, text: &str) -> LinkResult<()> {
        check_frame(text)?;
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(LinkError::Disconnected)?;
        writer.write_all(text.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        tracing::trace!(frame = %text, "Transmitted frame");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_frame_limit() {
        assert!(check_frame("{}").is_ok());
        assert!(check_frame(&"x".repeat(MAX_FRAME_LEN)).is_err());
    }

    #[tokio::test]
    async fn test_transmit_before_connect_fails() {
        let (transport, _inbound) = TcpTransport::new("127.0.0.1:1");
        assert!(matches!(
            transport.transmit("{}").await,
            Err(LinkError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_tcp_frames_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let device = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket
                .write_all(b"{\"seq\":1,\"msgtype\":0}\n\n{\"seq\":2,\"msgtype\":0}\n")
                .await
                .unwrap();
            let mut buf = vec![0u8; 64];
            let n = socket.read(&mut buf).await.unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });

        let (transport, mut inbound) = TcpTransport::new(address);
        transport.connect().await.unwrap();
        transport.transmit(r#"{"seq":9}"#).await.unwrap();

        assert_eq!(inbound.recv().await.unwrap(), r#"{"seq":1,"msgtype":0}"#);
        assert_eq!(inbound.recv().await.unwrap(), r#"{"seq":2,"msgtype":0}"#);
        assert_eq!(device.await.unwrap(), "{\"seq\":9}\n");

        // Peer hung up: the inbound stream ends
        assert!(inbound.recv().await.is_none());
        transport.disconnect().await.unwrap();
    }
}
