//! Per-connection state the engine collaborates with.
//!
//! Socket ownership and lifecycle live outside the engine; this type is the
//! boundary. It owns exactly one receive buffer and one send buffer, the
//! current protocol state, and a channel to the external socket writer that
//! stands in for "request an asynchronous flush". The engine reads and trims
//! the receive buffer, appends encoded frames to the send buffer, and asks
//! for flushes; everything else about the socket is someone else's problem.

use crate::core::buffer::ByteQueue;
use crate::error::{ProtocolError, Result};
use crate::outbound::OutboundQueue;
use crate::protocol::ProtocolState;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Capacity of the internally created flush channel.
const FLUSH_CHANNEL_CAPACITY: usize = 64;

/// One client connection as seen by the engine.
pub struct Connection {
    id: u64,
    state: Mutex<ProtocolState>,
    pub(crate) recv: Mutex<ByteQueue>,
    send: Mutex<Vec<u8>>,
    pub(crate) outbound: OutboundQueue,
    flush_tx: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
    disconnected: AtomicBool,
}

impl Connection {
    /// Create a connection with an internal flush channel, returning the
    /// receiver the socket writer should drain.
    pub fn new(id: u64) -> (std::sync::Arc<Self>, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(FLUSH_CHANNEL_CAPACITY);
        (Self::with_flush_sender(id, tx), rx)
    }

    /// Create a connection flushing into an externally owned channel.
    pub fn with_flush_sender(id: u64, flush_tx: mpsc::Sender<Bytes>) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            id,
            state: Mutex::new(ProtocolState::Handshake),
            recv: Mutex::new(ByteQueue::new()),
            send: Mutex::new(Vec::new()),
            outbound: OutboundQueue::new(),
            flush_tx,
            cancel: CancellationToken::new(),
            disconnected: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current protocol state.
    pub fn state(&self) -> ProtocolState {
        *self.state.lock().expect("connection state lock poisoned")
    }

    /// Transition the protocol state; driven by handler logic.
    pub fn set_state(&self, state: ProtocolState) {
        *self.state.lock().expect("connection state lock poisoned") = state;
    }

    /// Cancellation signal observed by this connection's receive loop.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }

    /// Whether the receive side should keep decoding buffered bytes.
    pub fn accepts_data(&self) -> bool {
        !self.is_disconnected()
            && !matches!(
                self.state(),
                ProtocolState::Closing | ProtocolState::Disconnected
            )
    }

    /// Append an encoded frame to the send buffer.
    ///
    /// The frame must be complete: the orchestrator relies on every append
    /// being a whole message so interleaved flushes never split one.
    pub(crate) fn append_send(&self, frame: &[u8]) {
        self.send
            .lock()
            .expect("connection send lock poisoned")
            .extend_from_slice(frame);
    }

    /// Number of bytes waiting in the send buffer.
    pub fn pending_send_bytes(&self) -> usize {
        self.send.lock().expect("connection send lock poisoned").len()
    }

    /// Number of packets waiting in the outbound queue.
    pub fn pending_outbound_packets(&self) -> usize {
        self.outbound.depth()
    }

    /// Number of unread bytes in the receive buffer.
    pub fn pending_recv_bytes(&self) -> usize {
        self.recv
            .lock()
            .expect("connection receive lock poisoned")
            .len()
    }

    /// Hand the accumulated send buffer to the socket writer.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::ConnectionClosed`] if the writer side is gone; the
    /// connection is marked disconnected.
    pub async fn request_flush(&self) -> Result<()> {
        let bytes = {
            let mut send = self.send.lock().expect("connection send lock poisoned");
            if send.is_empty() {
                return Ok(());
            }
            Bytes::from(std::mem::take(&mut *send))
        };

        if self.flush_tx.send(bytes).await.is_err() {
            debug!(connection = self.id, "flush channel closed; marking disconnected");
            self.close(true);
            return Err(ProtocolError::ConnectionClosed);
        }

        Ok(())
    }

    /// Disconnect a misbehaving client with a reason string.
    pub fn kick(&self, reason: &str) {
        warn!(connection = self.id, reason, "kicking connection");
        self.close(false);
    }

    /// Close the connection.
    ///
    /// `immediate` drops any undelivered writes; otherwise already-queued
    /// output may still be drained and flushed before the socket goes away.
    pub fn close(&self, immediate: bool) {
        if immediate {
            self.disconnected.store(true, Ordering::Release);
            self.set_state(ProtocolState::Disconnected);
        } else if !self.is_disconnected() {
            self.set_state(ProtocolState::Closing);
        }
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("disconnected", &self.is_disconnected())
            .finish_non_exhaustive()
    }
}
