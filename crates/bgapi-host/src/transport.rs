//! Transport abstraction
//!
//! The module end of the link is any duplex byte channel: a serial port,
//! a USB CDC device, a TCP bridge. The transport knows nothing about
//! framing; it hands over raw chunks in arrival order and writes raw
//! bytes. The dispatcher owns the transport for its whole lifetime.

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Transport-level send failure.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport closed")]
    Closed,
}

/// A duplex byte channel to the radio module.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Write raw bytes toward the module.
    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Next chunk of raw bytes from the module, in arrival order.
    /// `None` means the channel closed and no more bytes will come.
    async fn recv(&mut self) -> Option<Vec<u8>>;
}

// ----------------------------------------------------------------------------
// In-Memory Channel Transport
// ----------------------------------------------------------------------------

/// Channel-backed [`Transport`], the host side of an in-memory link.
pub struct ChannelTransport {
    outbound: mpsc::Sender<Vec<u8>>,
    inbound: mpsc::Receiver<Vec<u8>>,
}

/// The module side of an in-memory link: inject bytes toward the host
/// and observe what the host sent.
pub struct TransportPeer {
    /// Chunks the host wrote.
    pub outbound: mpsc::Receiver<Vec<u8>>,
    /// Feed chunks toward the host; dropping this closes the transport.
    pub inbound: mpsc::Sender<Vec<u8>>,
}

/// Build a connected in-memory transport pair.
///
/// Used by the integration tests to script module behavior, and handy
/// for bridging any byte source that already speaks channels.
pub fn channel_transport(capacity: usize) -> (ChannelTransport, TransportPeer) {
    let (out_tx, out_rx) = mpsc::channel(capacity);
    let (in_tx, in_rx) = mpsc::channel(capacity);
    (
        ChannelTransport { outbound: out_tx, inbound: in_rx },
        TransportPeer { outbound: out_rx, inbound: in_tx },
    )
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.outbound
            .send(bytes.to_vec())
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Option<Vec<u8>> {
        self.inbound.recv().await
    }
}
