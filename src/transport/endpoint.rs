// src/transport/endpoint.rs
//! Per-schema Unix socket endpoints
//!
//! Each [`WireSchema`] gets its own socket file named
//! `<socket_dir>/<channel_prefix>.<SCHEMA>.sock`, so writer and reader agree
//! on the rendezvous point without exchanging anything.

use crate::transport::codec::WireSchema;
use crate::utils::config::TransportConfig;
use crate::utils::errors::Result;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, warn};

/// Named rendezvous point of one schema's channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    schema: &'static str,
    path: PathBuf,
}

impl Endpoint {
    /// Endpoint carrying `T` under the configured directory and prefix
    pub fn for_schema<T: WireSchema>(config: &TransportConfig) -> Self {
        let file_name = format!("{}.{}.sock", config.channel_prefix, T::SCHEMA);
        Self {
            schema: T::SCHEMA,
            path: config.socket_dir.join(file_name),
        }
    }

    pub fn schema(&self) -> &'static str {
        self.schema
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create a fresh listening endpoint, replacing any stale socket file
    pub fn bind(&self) -> Result<UnixListener> {
        self.remove();
        let listener = UnixListener::bind(&self.path)?;
        debug!("Bound {} endpoint at {:?}", self.schema, self.path);
        Ok(listener)
    }

    /// Attach to the endpoint as a reader
    pub async fn connect(&self) -> Result<UnixStream> {
        Ok(UnixStream::connect(&self.path).await?)
    }

    /// Unlink the socket file; a missing file is fine
    pub fn remove(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed endpoint {:?}", self.path),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove endpoint {:?}: {}", self.path, e),
        }
    }
}
