// src/transport/mod.rs
//! Host-local transport of closed sessions
//!
//! - **Codec**: one self-describing JSON record per line
//! - **Endpoint**: per-schema Unix socket naming
//! - **Session Queue**: bounded hand-off with timed push
//! - **Buffer Pool**: reusable encode buffers
//! - **Outbound**: writer role, bounded queue + send loop
//! - **Inbound**: reader role, receive loop + consumer callback
//!
//! # Architecture
//!
//! ```text
//! simulation thread          send loop (tokio)              receive loop (tokio)
//!  enqueue(≤330ms) ──▶ [queue, cap 10] ──▶ encode ─▶ write ═══ unix socket ═══▶ read line ─▶ decode ─▶ callback
//!                                          ▲                                      │
//!                               is_connected (capture gating)            EOF/IO: re-attach
//!                                                                         protocol fault: exit
//! ```

pub mod buffer_pool;
pub mod codec;
pub mod endpoint;
pub mod inbound;
pub mod outbound;
pub mod session_queue;

// Re-export commonly used types
pub use buffer_pool::BufferPool;
pub use codec::{decode, encode, encode_into, WireSchema};
pub use endpoint::Endpoint;
pub use inbound::{Callback, InboundChannel, InboundStats};
pub use outbound::{OutboundChannel, OutboundStats};
pub use session_queue::{QueueStats, SessionQueue};

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sleep for `delay` unless cancelled first; false means cancelled
pub(crate) async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
