// src/transport/outbound.rs
//! Outbound channel: bounded queue plus background send loop
//!
//! The simulation thread calls [`OutboundChannel::enqueue`], which waits at
//! most `enqueue_timeout` for a queue slot and otherwise drops the record.
//! A tokio task owns the writer endpoint and alternates between two phases:
//!
//! ```text
//!   ┌──────────── Connect ────────────┐        ┌──────────── Serve ─────────────┐
//!   │ bind fresh endpoint             │        │ dequeue (bounded poll)         │
//!   │ accept exactly one consumer     │ ─────▶ │ encode into pooled buffer      │
//!   │ unlink endpoint                 │        │ write + flush one line         │
//!   └─────────────────────────────────┘ ◀───── └── write error / consumer EOF ───┘
//! ```
//!
//! Shutdown order: cancel the loop, remove the endpoint, close the queue
//! (anything still queued is discarded, not flushed).

use crate::capture::session::Session;
use crate::capture::source::SessionSink;
use crate::observability::names;
use crate::transport::buffer_pool::BufferPool;
use crate::transport::codec::{self, WireSchema};
use crate::transport::endpoint::Endpoint;
use crate::transport::pause;
use crate::transport::session_queue::{QueueStats, SessionQueue};
use crate::utils::config::TransportConfig;
use crate::utils::errors::{Result, TrailError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outbound channel statistics
#[derive(Debug, Clone)]
pub struct OutboundStats {
    /// Whether a consumer is attached right now
    pub connected: bool,

    /// Queue counters
    pub queue: QueueStats,

    /// Records written and flushed
    pub sent: u64,

    /// Records lost to a failed write or a departed consumer
    pub send_failures: u64,

    /// Times the loop went back to the connect phase
    pub reconnects: u64,
}

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    send_failures: AtomicU64,
    reconnects: AtomicU64,
}

/// State shared between the channel handle and its send loop
struct Shared<T> {
    config: TransportConfig,
    endpoint: Endpoint,
    queue: SessionQueue<T>,
    buffers: BufferPool,
    connected: AtomicBool,
    counters: Counters,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<Result<()>>,
}

enum ServeExit {
    Cancelled,
    Disconnected,
}

/// Writer side of one schema's channel
pub struct OutboundChannel<T: WireSchema> {
    shared: Arc<Shared<T>>,
    running: Mutex<Option<Running>>,
}

impl<T: WireSchema> OutboundChannel<T> {
    /// Create a stopped channel; call [`start`](Self::start) to open the endpoint
    pub fn new(config: TransportConfig) -> Self {
        let endpoint = Endpoint::for_schema::<T>(&config);
        let shared = Shared {
            queue: SessionQueue::new(config.queue_capacity),
            buffers: BufferPool::new(config.buffer_pool_size),
            endpoint,
            config,
            connected: AtomicBool::new(false),
            counters: Counters::default(),
        };

        Self {
            shared: Arc::new(shared),
            running: Mutex::new(None),
        }
    }

    /// Spawn the background send loop on the current tokio runtime
    pub fn start(&self) -> Result<()> {
        let mut running = self.running.lock();
        if running.as_ref().map_or(false, |r| !r.handle.is_finished()) {
            return Err(TrailError::AlreadyRunning);
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TrailError::Runtime(e.to_string()))?;

        self.shared.queue.reopen();
        let cancel = CancellationToken::new();
        let handle = runtime.spawn(Self::run(Arc::clone(&self.shared), cancel.clone()));
        *running = Some(Running { cancel, handle });

        info!(
            "Outbound {} channel started at {:?}",
            T::SCHEMA,
            self.shared.endpoint.path()
        );
        Ok(())
    }

    /// Queue a record for sending, waiting at most the configured enqueue timeout.
    ///
    /// Returns false when the record was dropped.
    pub fn enqueue(&self, item: T) -> bool {
        let timeout = self.shared.config.enqueue_timeout();
        match self.shared.queue.push_timeout(item, timeout) {
            Ok(()) => {
                metrics::counter!(names::SESSIONS_ENQUEUED, "schema" => T::SCHEMA).increment(1);
                metrics::gauge!(names::QUEUE_DEPTH, "schema" => T::SCHEMA)
                    .set(self.shared.queue.len() as f64);
                true
            }
            Err(_) => {
                metrics::counter!(names::SESSIONS_DROPPED, "schema" => T::SCHEMA).increment(1);
                warn!(
                    "Outbound {} queue full for {:?} (capacity {}); dropping record",
                    T::SCHEMA,
                    timeout,
                    self.shared.queue.capacity()
                );
                false
            }
        }
    }

    /// Whether a consumer is attached
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Whether the send loop is alive
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .map_or(false, |r| !r.handle.is_finished())
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.shared.endpoint
    }

    /// Get channel statistics
    pub fn stats(&self) -> OutboundStats {
        let counters = &self.shared.counters;
        OutboundStats {
            connected: self.is_connected(),
            queue: self.shared.queue.stats(),
            sent: counters.sent.load(Ordering::Relaxed),
            send_failures: counters.send_failures.load(Ordering::Relaxed),
            reconnects: counters.reconnects.load(Ordering::Relaxed),
        }
    }

    /// Stop the send loop, remove the endpoint and discard queued records
    pub async fn shutdown(&self) -> Result<()> {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return Err(TrailError::NotRunning);
        };

        info!("Shutting down outbound {} channel", T::SCHEMA);
        running.cancel.cancel();
        let result = running
            .handle
            .await
            .map_err(|e| TrailError::Runtime(e.to_string()))
            .and_then(|r| r);

        self.shared.connected.store(false, Ordering::SeqCst);
        self.shared.endpoint.remove();

        let discarded = self.shared.queue.close();
        if discarded > 0 {
            info!("Discarded {} queued {} records", discarded, T::SCHEMA);
        }
        metrics::gauge!(names::QUEUE_DEPTH, "schema" => T::SCHEMA).set(0.0);

        result
    }

    async fn run(shared: Arc<Shared<T>>, cancel: CancellationToken) -> Result<()> {
        let result = Self::connect_and_serve(&shared, &cancel).await;
        if let Err(e) = &result {
            error!("Outbound {} loop stopped: {}", T::SCHEMA, e);
        }
        shared.connected.store(false, Ordering::SeqCst);
        shared.endpoint.remove();
        result
    }

    async fn connect_and_serve(shared: &Arc<Shared<T>>, cancel: &CancellationToken) -> Result<()> {
        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                accepted = Self::accept_one(&shared.endpoint) => accepted,
            };

            let stream = match accepted {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Failed to open {} endpoint: {}", T::SCHEMA, e);
                    if !pause(shared.config.reconnect_delay(), cancel).await {
                        return Ok(());
                    }
                    continue;
                }
            };

            shared.connected.store(true, Ordering::SeqCst);
            info!("Consumer attached to {} channel", T::SCHEMA);

            let exit = Self::serve(shared, stream, cancel).await;
            shared.connected.store(false, Ordering::SeqCst);

            match exit? {
                ServeExit::Cancelled => return Ok(()),
                ServeExit::Disconnected => {
                    shared.counters.reconnects.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!(names::OUTBOUND_RECONNECTS, "schema" => T::SCHEMA)
                        .increment(1);
                    info!("Consumer detached from {} channel; reopening endpoint", T::SCHEMA);
                }
            }
        }
    }

    /// Bind a fresh endpoint and hand back the first consumer
    async fn accept_one(endpoint: &Endpoint) -> Result<UnixStream> {
        let listener = endpoint.bind()?;
        let (stream, _) = listener.accept().await?;
        drop(listener);
        // Nobody else may attach while this consumer is served
        endpoint.remove();
        Ok(stream)
    }

    async fn serve(
        shared: &Arc<Shared<T>>,
        stream: UnixStream,
        cancel: &CancellationToken,
    ) -> Result<ServeExit> {
        let (reader, mut writer) = stream.into_split();
        let peer_gone = cancel.child_token();
        let watcher = tokio::spawn(Self::watch_peer(
            reader,
            Arc::clone(shared),
            peer_gone.clone(),
        ));

        let exit = Self::send_loop(shared, &mut writer, cancel, &peer_gone).await;

        peer_gone.cancel();
        watcher.abort();
        exit
    }

    async fn send_loop(
        shared: &Arc<Shared<T>>,
        writer: &mut OwnedWriteHalf,
        cancel: &CancellationToken,
        peer_gone: &CancellationToken,
    ) -> Result<ServeExit> {
        loop {
            if cancel.is_cancelled() {
                return Ok(ServeExit::Cancelled);
            }
            if peer_gone.is_cancelled() {
                return Ok(ServeExit::Disconnected);
            }

            let Some(item) = Self::next_item(shared).await else {
                continue;
            };
            metrics::gauge!(names::QUEUE_DEPTH, "schema" => T::SCHEMA)
                .set(shared.queue.len() as f64);

            if peer_gone.is_cancelled() {
                shared.counters.send_failures.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(names::SEND_FAILURES, "schema" => T::SCHEMA).increment(1);
                warn!("Consumer left before a {} record could be sent; dropping it", T::SCHEMA);
                continue;
            }

            let mut buf = shared.buffers.acquire();
            if let Err(e) = codec::encode_into(&item, &mut buf) {
                // The record is unusable, the connection is not
                shared.buffers.release(buf);
                shared.counters.send_failures.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(names::SEND_FAILURES, "schema" => T::SCHEMA).increment(1);
                error!("Dropping {} record: {}", T::SCHEMA, e);
                continue;
            }
            drop(item);

            let len = buf.len();
            let written = tokio::select! {
                _ = cancel.cancelled() => None,
                result = Self::write_record(writer, &buf) => Some(result),
            };
            shared.buffers.release(buf);

            match written {
                None => return Ok(ServeExit::Cancelled),
                Some(Ok(())) => {
                    shared.counters.sent.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!(names::SESSIONS_SENT, "schema" => T::SCHEMA).increment(1);
                    debug!("Sent {} record ({} bytes)", T::SCHEMA, len);
                }
                Some(Err(e)) => {
                    shared.counters.send_failures.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!(names::SEND_FAILURES, "schema" => T::SCHEMA).increment(1);
                    warn!("Write to {} consumer failed: {}", T::SCHEMA, e);
                    return Ok(ServeExit::Disconnected);
                }
            }
        }
    }

    /// Wait one poll period for the next record without ever losing it
    async fn next_item(shared: &Arc<Shared<T>>) -> Option<T> {
        let worker = Arc::clone(shared);
        let poll = shared.config.dequeue_poll();
        match tokio::task::spawn_blocking(move || worker.queue.pop_timeout(poll)).await {
            Ok(item) => item,
            Err(e) => {
                error!("Dequeue worker failed: {}", e);
                None
            }
        }
    }

    async fn write_record(writer: &mut OwnedWriteHalf, record: &[u8]) -> std::io::Result<()> {
        writer.write_all(record).await?;
        writer.flush().await
    }

    /// Flag the consumer as gone as soon as its side of the stream closes
    async fn watch_peer(mut reader: OwnedReadHalf, shared: Arc<Shared<T>>, peer_gone: CancellationToken) {
        let mut scratch = [0u8; 256];
        loop {
            tokio::select! {
                _ = peer_gone.cancelled() => return,
                read = reader.read(&mut scratch) => match read {
                    // Consumers never write; stray bytes are ignored
                    Ok(n) if n > 0 => continue,
                    Ok(_) | Err(_) => {
                        shared.connected.store(false, Ordering::SeqCst);
                        peer_gone.cancel();
                        return;
                    }
                },
            }
        }
    }
}

impl<T: WireSchema> Drop for OutboundChannel<T> {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.cancel.cancel();
        }
    }
}

impl SessionSink for OutboundChannel<Session> {
    fn is_connected(&self) -> bool {
        OutboundChannel::is_connected(self)
    }

    fn enqueue(&self, session: Session) -> bool {
        OutboundChannel::enqueue(self, session)
    }
}
