//! # Outbound Orchestrator
//!
//! Per-connection send queues drained by a fixed pool of worker tasks.
//!
//! Every connection owns one FIFO of pending packets plus an `engaged` flag.
//! The invariant the whole module exists to uphold: at most one worker drains
//! a given queue at any instant, so a connection's packets hit the wire in
//! exactly their enqueue order even with many concurrent producers and many
//! workers.
//!
//! ## Flow
//! - `enqueue` appends a holder; if the queue was idle it is flipped to
//!   engaged and published to the global ready list, waking a worker.
//! - A worker pops a ready queue, drains it fully with its private scratch
//!   buffer, then issues an asynchronous flush of the connection.
//! - After the flush, under the queue mutex: no new arrivals → back to idle;
//!   otherwise the queue is re-published, closing the race with producers
//!   that enqueued mid-drain.
//!
//! Queues are bounded: a connection that cannot keep up is kicked rather
//! than allowed to pin unbounded memory.

use crate::config::{CompressionConfig, OutboundConfig};
use crate::connection::Connection;
use crate::error::{ProtocolError, Result};
use crate::protocol::{encoder, DispatchTable, PacketKind, ProtocolState};
use crate::utils::metrics::Metrics;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// An outbound packet: its kind for encode-table lookup plus its own payload
/// writer. Chosen at enqueue time; the engine never inspects the payload.
pub trait OutboundPacket: Send {
    fn kind(&self) -> PacketKind;

    /// Serialize the payload (everything after the raw packet id).
    ///
    /// # Errors
    ///
    /// Implementations report serialization failures as
    /// [`ProtocolError::EncodeFailure`]; the failure is isolated to this
    /// packet.
    fn encode_payload(&self, buf: &mut Vec<u8>) -> Result<()>;
}

/// One enqueued outbound unit. Owned exclusively by the queue from enqueue
/// until its write attempt completes or is abandoned.
struct PacketHolder {
    packet: Box<dyn OutboundPacket>,
    /// Protocol state used for encode-table lookup, captured at enqueue.
    target_state: ProtocolState,
}

#[derive(Default)]
struct QueueInner {
    holders: VecDeque<PacketHolder>,
    /// True iff some worker currently owns this queue's drain (or has
    /// committed to pick it up from the ready list).
    engaged: bool,
}

/// Per-connection FIFO of pending outbound packets.
pub struct OutboundQueue {
    inner: Mutex<QueueInner>,
}

impl OutboundQueue {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
        }
    }

    /// Current number of pending holders.
    pub fn depth(&self) -> usize {
        self.inner.lock().expect("outbound queue lock poisoned").holders.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueInner> {
        self.inner.lock().expect("outbound queue lock poisoned")
    }
}

/// How the worker pool should wind down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Drain what is ready, then fail if any queue still holds packets.
    Graceful,
    /// Drain what is ready, then discard leftovers with a warning.
    Forced,
}

/// Coordinates the worker pool that drains outbound queues.
pub struct Orchestrator {
    encode_table: Arc<DispatchTable>,
    compression: CompressionConfig,
    config: OutboundConfig,
    metrics: Arc<Metrics>,
    ready: Mutex<VecDeque<Arc<Connection>>>,
    wake: Notify,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    pub(crate) fn new(
        encode_table: Arc<DispatchTable>,
        compression: CompressionConfig,
        config: OutboundConfig,
        metrics: Arc<Metrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            encode_table,
            compression,
            config,
            metrics,
            ready: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
            shutdown: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Spawn the fixed worker pool. Must run inside a tokio runtime.
    pub fn start(self: &Arc<Self>) {
        let mut workers = self.workers.lock().expect("worker list lock poisoned");
        assert!(workers.is_empty(), "orchestrator started twice");

        for worker_id in 0..self.config.workers {
            let this = Arc::clone(self);
            workers.push(tokio::spawn(this.worker_loop(worker_id)));
        }
        info!(workers = self.config.workers, "outbound worker pool started");
    }

    /// Append a packet to the connection's queue, waking a worker if the
    /// queue was idle.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::ConnectionClosed`] if the pool is shutting down or
    ///   the connection is already disconnected.
    /// - [`ProtocolError::QueueOverflow`] if the bounded queue is full; the
    ///   connection is kicked.
    pub fn enqueue(
        &self,
        connection: &Arc<Connection>,
        packet: Box<dyn OutboundPacket>,
        target_state: ProtocolState,
    ) -> Result<()> {
        if self.shutdown.is_cancelled() || connection.is_disconnected() {
            return Err(ProtocolError::ConnectionClosed);
        }

        let mut inner = connection.outbound.lock();

        if inner.holders.len() >= self.config.max_queue_depth {
            let depth = inner.holders.len();
            drop(inner);
            self.metrics.protocol_error();
            connection.kick("outbound queue overflow");
            return Err(ProtocolError::QueueOverflow { depth });
        }

        inner.holders.push_back(PacketHolder {
            packet,
            target_state,
        });

        if inner.engaged {
            // The owning worker will observe this entry before idling
            return Ok(());
        }

        // Publishing under the ready-list lock orders this entry against a
        // concurrent shutdown: either the final drain sees it, or the
        // cancellation is visible here and the enqueue is withdrawn. An idle
        // queue held nothing before this push, so popping removes exactly
        // the rejected packet.
        let mut ready = self.ready.lock().expect("ready list lock poisoned");
        if self.shutdown.is_cancelled() {
            drop(ready);
            inner.holders.pop_back();
            return Err(ProtocolError::ConnectionClosed);
        }
        inner.engaged = true;
        ready.push_back(Arc::clone(connection));
        drop(ready);
        drop(inner);
        self.wake.notify_one();
        Ok(())
    }

    fn publish(&self, connection: Arc<Connection>) {
        self.ready
            .lock()
            .expect("ready list lock poisoned")
            .push_back(connection);
        self.wake.notify_one();
    }

    fn pop_ready(&self) -> Option<Arc<Connection>> {
        self.ready
            .lock()
            .expect("ready list lock poisoned")
            .pop_front()
    }

    async fn worker_loop(self: Arc<Self>, worker_id: usize) {
        // Private scratch: encode state is never shared across workers
        let mut scratch = Vec::with_capacity(4096);

        loop {
            match self.pop_ready() {
                Some(connection) => self.drain(&connection, &mut scratch).await,
                None => {
                    if self.shutdown.is_cancelled() {
                        break;
                    }
                    // Bounded wait: recheck the ready list periodically even
                    // if a wake signal was missed
                    let _ = tokio::time::timeout(self.config.wake_interval, self.wake.notified())
                        .await;
                }
            }
        }

        trace!(worker = worker_id, "outbound worker stopped");
    }

    /// Drain one connection's queue fully. Caller owns the drain: the queue
    /// is engaged and no other worker will touch it.
    async fn drain(&self, connection: &Arc<Connection>, scratch: &mut Vec<u8>) {
        loop {
            let holder = connection.outbound.lock().holders.pop_front();
            let Some(holder) = holder else { break };

            if connection.is_disconnected() {
                // Still released, never leaked; just no write attempt
                self.metrics.packet_dropped();
                continue;
            }

            match encoder::write_packet(
                &self.encode_table,
                connection,
                holder.packet.as_ref(),
                holder.target_state,
                &self.compression,
                scratch,
            ) {
                Ok(summary) => self.metrics.message_sent(summary.total_written),
                // One bad packet must not abort the rest of the drain
                Err(e) => {
                    warn!(
                        connection = connection.id(),
                        error = %e,
                        "dropping outbound packet that failed to encode"
                    );
                    self.metrics.packet_dropped();
                }
            }
        }

        if let Err(e) = connection.request_flush().await {
            debug!(connection = connection.id(), error = %e, "flush failed during drain");
        }

        // Close the race with producers that enqueued after the drain began
        let republish = {
            let mut inner = connection.outbound.lock();
            if inner.holders.is_empty() {
                inner.engaged = false;
                false
            } else {
                true
            }
        };
        if republish {
            self.publish(Arc::clone(connection));
        }
    }

    /// Stop the worker pool. In-flight drains finish either way; what happens
    /// to queues that still hold packets afterwards depends on `mode`.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::ShutdownPending`] in graceful mode when packets
    /// remain queued.
    pub async fn shutdown(&self, mode: ShutdownMode) -> Result<()> {
        self.shutdown.cancel();
        self.wake.notify_waiters();

        let handles: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.workers.lock().expect("worker list lock poisoned"));
        for handle in handles {
            let _ = handle.await;
        }

        // Whatever is still published was never picked up; count it
        let leftovers: Vec<Arc<Connection>> = {
            let mut ready = self.ready.lock().expect("ready list lock poisoned");
            ready.drain(..).collect()
        };

        let mut pending_connections = 0usize;
        let mut pending_packets = 0usize;
        for connection in &leftovers {
            let depth = connection.outbound.depth();
            if depth > 0 {
                pending_connections += 1;
                pending_packets += depth;
            }
        }

        match mode {
            ShutdownMode::Graceful => {
                if pending_connections > 0 {
                    return Err(ProtocolError::ShutdownPending {
                        connections: pending_connections,
                    });
                }
                info!("outbound orchestrator stopped");
                Ok(())
            }
            ShutdownMode::Forced => {
                if pending_packets > 0 {
                    warn!(
                        connections = pending_connections,
                        packets = pending_packets,
                        "forced shutdown discarded queued packets"
                    );
                    for connection in &leftovers {
                        connection.outbound.lock().holders.clear();
                    }
                }
                info!("outbound orchestrator stopped");
                Ok(())
            }
        }
    }

    /// Whether the pool has begun shutting down.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
