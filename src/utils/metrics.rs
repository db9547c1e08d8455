//! Observability counters for the engine.
//!
//! Thread-safe atomic counters; cheap enough to update on every frame.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Engine-wide metrics collector.
#[derive(Debug)]
pub struct Metrics {
    /// Complete inbound messages dispatched
    pub messages_received: AtomicU64,
    /// Outbound packets written to send buffers
    pub messages_sent: AtomicU64,
    /// Raw bytes appended to receive buffers
    pub bytes_received: AtomicU64,
    /// Frame bytes written to send buffers
    pub bytes_sent: AtomicU64,
    /// Protocol violations observed
    pub protocol_errors: AtomicU64,
    /// Packets dropped in isolation (encode failure, dead connection, …)
    pub packets_dropped: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            packets_dropped: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_sent(&self, frame_bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(frame_bytes as u64, Ordering::Relaxed);
    }

    pub fn bytes_received(&self, n: usize) {
        self.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_dropped(&self) {
        self.packets_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Log a one-line summary of all counters.
    pub fn log_summary(&self) {
        info!(
            uptime_secs = self.start_time.elapsed().as_secs(),
            messages_received = self.messages_received.load(Ordering::Relaxed),
            messages_sent = self.messages_sent.load(Ordering::Relaxed),
            bytes_received = self.bytes_received.load(Ordering::Relaxed),
            bytes_sent = self.bytes_sent.load(Ordering::Relaxed),
            protocol_errors = self.protocol_errors.load(Ordering::Relaxed),
            packets_dropped = self.packets_dropped.load(Ordering::Relaxed),
            "engine metrics"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
