// src/transport/inbound.rs
//! Inbound channel: background receive loop
//!
//! Attaches to the schema's endpoint as the reader, splits the stream on
//! newlines and hands every decoded record to the registered callback.
//!
//! - End of stream or an I/O error: re-attach and keep going.
//! - Malformed record (including non-UTF-8 bytes), unknown appearance id,
//!   over-long line: the peer speaks an incompatible schema, so the loop
//!   exits with the error and stays down until [`InboundChannel::start`]
//!   is called again.

use crate::observability::names;
use crate::transport::codec::{self, WireSchema};
use crate::transport::endpoint::Endpoint;
use crate::transport::pause;
use crate::utils::config::TransportConfig;
use crate::utils::errors::{Result, TrailError};
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::UnixStream;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Consumer callback invoked once per decoded record
pub type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Inbound channel statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundStats {
    /// Whether the reader is attached right now
    pub connected: bool,

    /// Records decoded and delivered
    pub received: u64,

    /// Protocol faults that stopped the loop
    pub decode_faults: u64,

    /// Times the loop re-attached after losing the writer
    pub reconnects: u64,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    decode_faults: AtomicU64,
    reconnects: AtomicU64,
}

struct Shared<T> {
    config: TransportConfig,
    endpoint: Endpoint,
    callback: RwLock<Option<Callback<T>>>,
    connected: AtomicBool,
    counters: Counters,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<Result<()>>,
}

enum ReadExit {
    Cancelled,
    Lost,
}

/// Reader side of one schema's channel
pub struct InboundChannel<T: WireSchema> {
    shared: Arc<Shared<T>>,
    running: Mutex<Option<Running>>,
}

impl<T: WireSchema> InboundChannel<T> {
    /// Create a stopped channel
    pub fn new(config: TransportConfig) -> Self {
        let endpoint = Endpoint::for_schema::<T>(&config);
        Self {
            shared: Arc::new(Shared {
                config,
                endpoint,
                callback: RwLock::new(None),
                connected: AtomicBool::new(false),
                counters: Counters::default(),
            }),
            running: Mutex::new(None),
        }
    }

    /// Register the consumer callback, replacing any previous one
    pub fn on_receive<F>(&self, callback: F)
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        *self.shared.callback.write() = Some(Arc::new(callback));
    }

    /// Spawn the receive loop on the current tokio runtime.
    ///
    /// Also restarts a loop that stopped on a protocol fault.
    pub fn start(&self) -> Result<()> {
        let mut running = self.running.lock();
        if running.as_ref().map_or(false, |r| !r.handle.is_finished()) {
            return Err(TrailError::AlreadyRunning);
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TrailError::Runtime(e.to_string()))?;

        let cancel = CancellationToken::new();
        let handle = runtime.spawn(Self::run(Arc::clone(&self.shared), cancel.clone()));
        *running = Some(Running { cancel, handle });

        info!(
            "Inbound {} channel started for {:?}",
            T::SCHEMA,
            self.shared.endpoint.path()
        );
        Ok(())
    }

    /// Whether the reader is attached to a writer
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Whether the receive loop is alive
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
    pub fn stats(&self) -> InboundStats {
        let counters = &self.shared.counters;
        InboundStats {
            connected: self.is_connected(),
            received: counters.received.load(Ordering::Relaxed),
            decode_faults: counters.decode_faults.load(Ordering::Relaxed),
            reconnects: counters.reconnects.load(Ordering::Relaxed),
        }
    }

    /// Wait for the receive loop to end on its own and return why it ended
    pub async fn join(&self) -> Result<()> {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return Err(TrailError::NotRunning);
        };

        running
            .handle
            .await
            .map_err(|e| TrailError::Runtime(e.to_string()))?
    }

    /// Stop the receive loop and release the reader endpoint
    pub async fn shutdown(&self) -> Result<()> {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return Err(TrailError::NotRunning);
        };

        info!("Shutting down inbound {} channel", T::SCHEMA);
        running.cancel.cancel();
        let result = running
            .handle
            .await
            .map_err(|e| TrailError::Runtime(e.to_string()))
            .and_then(|r| r);
        self.shared.connected.store(false, Ordering::SeqCst);
        result
    }

    async fn run(shared: Arc<Shared<T>>, cancel: CancellationToken) -> Result<()> {
        let result = Self::attach_and_read(&shared, &cancel).await;
        shared.connected.store(false, Ordering::SeqCst);
        result
    }

    async fn attach_and_read(shared: &Shared<T>, cancel: &CancellationToken) -> Result<()> {
        loop {
            let Some(stream) = Self::attach(shared, cancel).await else {
                return Ok(());
            };

            shared.connected.store(true, Ordering::SeqCst);
            info!("Attached to {} channel", T::SCHEMA);

            let exit = Self::read_records(shared, stream, cancel).await;
            shared.connected.store(false, Ordering::SeqCst);

            match exit {
                Ok(ReadExit::Cancelled) => return Ok(()),
                Ok(ReadExit::Lost) => {
                    shared.counters.reconnects.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!(names::INBOUND_RECONNECTS, "schema" => T::SCHEMA)
                        .increment(1);
                    info!("Lost {} writer; re-attaching", T::SCHEMA);
                }
                Err(e) => {
                    shared.counters.decode_faults.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!(names::DECODE_FAULTS, "schema" => T::SCHEMA).increment(1);
                    error!("Protocol fault on {} channel, stopping reader: {}", T::SCHEMA, e);
                    return Err(e);
                }
            }
        }
    }

    /// Retry attaching until it works; None once cancelled
    async fn attach(shared: &Shared<T>, cancel: &CancellationToken) -> Option<UnixStream> {
        let mut attempts: u64 = 0;
        loop {
            let attached = tokio::select! {
                _ = cancel.cancelled() => return None,
                attached = shared.endpoint.connect() => attached,
            };

            match attached {
                Ok(stream) => return Some(stream),
                Err(e) => {
                    attempts += 1;
                    if attempts == 1 {
                        debug!("Waiting for {} writer: {}", T::SCHEMA, e);
                    }
                    if !pause(shared.config.reconnect_delay(), cancel).await {
                        return None;
                    }
                }
            }
        }
    }

    async fn read_records(
        shared: &Shared<T>,
        stream: UnixStream,
        cancel: &CancellationToken,
    ) -> Result<ReadExit> {
        let limit = shared.config.max_record_bytes;
        let mut lines = FramedRead::new(stream, LinesCodec::new_with_max_length(limit));

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Ok(ReadExit::Cancelled),
                next = lines.next() => next,
            };

            let line = match next {
                None => {
                    debug!("{} writer closed the stream", T::SCHEMA);
                    return Ok(ReadExit::Lost);
                }
                Some(Err(LinesCodecError::Io(e))) if e.kind() == ErrorKind::InvalidData => {
                    return Err(TrailError::Decode(format!(
                        "{} record is not UTF-8: {}",
                        T::SCHEMA,
                        e
                    )));
                }
                Some(Err(LinesCodecError::Io(e))) => {
                    warn!("Read from {} writer failed: {}", T::SCHEMA, e);
                    return Ok(ReadExit::Lost);
                }
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    return Err(TrailError::RecordTooLong { limit });
                }
                Some(Ok(line)) => line,
            };

            if line.is_empty() {
                continue;
            }

            let record = codec::decode::<T>(&line)?;
            shared.counters.received.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(names::SESSIONS_RECEIVED, "schema" => T::SCHEMA).increment(1);

            let callback = shared.callback.read().clone();
            match callback {
                Some(callback) => (*callback)(record),
                None => debug!("No {} consumer registered; record discarded", T::SCHEMA),
            }
        }
    }
}

impl<T: WireSchema> Drop for InboundChannel<T> {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.cancel.cancel();
        }
    }
}
