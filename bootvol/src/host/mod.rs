//! Virtualization host storage interface.
//!
//! ## Architecture
//!
//! - **HostConnection**: entry point; looks up pools and volumes and opens
//!   upload streams
//! - **StoragePool**: one pool on the host (refresh, create volumes)
//! - **StorageVolume**: one volume inside a pool (key, name, owning pool)
//! - **UploadStream**: byte sink for writing into a volume
//!
//! Handles are reference counted and released when the last clone drops,
//! so every early return releases whatever it looked up.
//!
//! `dir::DirHost` implements these traits over a local directory.

pub mod dir;

use std::sync::Arc;

use async_trait::async_trait;

pub use dir::DirHost;

pub type PoolHandle = Arc<dyn StoragePool>;
pub type VolumeHandle = Arc<dyn StorageVolume>;
pub type HostResult<T> = Result<T, HostError>;

/// Errors reported by a host implementation.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The named object does not exist on the host.
    #[error("not found: {0}")]
    NotFound(String),

    /// The object already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Request was malformed or not supported by this host.
    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other host-side failure.
    #[error("{0}")]
    Failed(String),
}

impl HostError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, HostError::NotFound(_))
    }
}

/// Connection to a virtualization host.
#[async_trait]
pub trait HostConnection: Send + Sync {
    async fn lookup_pool_by_name(&self, name: &str) -> HostResult<PoolHandle>;

    async fn lookup_volume_by_key(&self, key: &str) -> HostResult<VolumeHandle>;

    /// Open a stream writing `length` bytes into `volume` starting at
    /// `offset`.
    async fn open_upload(
        &self,
        volume: &VolumeHandle,
        offset: u64,
        length: u64,
    ) -> HostResult<Box<dyn UploadStream>>;
}

#[async_trait]
pub trait StoragePool: Send + Sync {
    async fn name(&self) -> HostResult<String>;

    /// Re-read pool state from the backing storage. Idempotent.
    async fn refresh(&self) -> HostResult<()>;

    /// Create a volume from its XML definition.
    async fn create_volume(&self, xml: &str) -> HostResult<VolumeHandle>;
}

#[async_trait]
pub trait StorageVolume: Send + Sync {
    /// Stable host-assigned key.
    async fn key(&self) -> HostResult<String>;

    async fn name(&self) -> HostResult<String>;

    /// Pool that owns this volume.
    async fn pool(&self) -> HostResult<PoolHandle>;

    async fn delete(&self) -> HostResult<()>;
}

/// Byte sink into a volume. Must be ended with `finish` or `abort`.
#[async_trait]
pub trait UploadStream: Send {
    async fn send(&mut self, chunk: &[u8]) -> HostResult<()>;

    async fn finish(self: Box<Self>) -> HostResult<()>;

    async fn abort(self: Box<Self>) -> HostResult<()>;
}
