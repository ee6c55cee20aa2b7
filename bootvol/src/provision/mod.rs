//! Volume provisioning.
//!
//! `Provisioner::provision` turns a payload into a volume and returns an
//! [`ExternalId`] for it. The work runs as a pipeline while the target
//! pool's lock is held:
//!
//! ```text
//! refresh_pool → materialize_payload → probe_size → create_volume → upload_volume → fetch_key
//! ```
//!
//! Once `create_volume` succeeds nothing is rolled back. Later failures carry
//! the orphaned volume in the error (see [`BootvolError::orphaned_volume`]).

mod tasks;
mod types;

pub use types::ProvisioningRequest;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bootvol_shared::errors::{BootvolError, BootvolResult};
use bootvol_shared::id::ExternalId;
use tokio::sync::Mutex;

use crate::host::HostConnection;
use crate::image::{ImageInspector, LocalImageInspector};
use crate::lock::{PoolLockGuard, PoolLockRegistry};
use crate::options::BootvolOptions;
use crate::pipeline::{BoxedTask, Pipeline, PipelineExecutor};
use crate::resolve::{self, ResolvedVolume};
use crate::retry::RetryPolicy;
use crate::upload::{StreamUploader, VolumeUploader};
use tasks::{
    CreateVolumeTask, FetchKeyTask, MaterializeTask, ProbeSizeTask, ProvisionCtx,
    RefreshPoolTask, UploadVolumeTask,
};
use types::{ProvisionContext, ProvisionerInner};

/// Provisions, resolves and removes volumes on one host.
///
/// Cheap to clone; clones share the host connection and the lock registry.
#[derive(Clone)]
pub struct Provisioner {
    inner: Arc<ProvisionerInner>,
}

impl Provisioner {
    /// Provisioner with default collaborators and a private lock registry.
    pub fn new(host: Arc<dyn HostConnection>) -> Self {
        Self::builder(host).build()
    }

    pub fn builder(host: Arc<dyn HostConnection>) -> ProvisionerBuilder {
        ProvisionerBuilder::new(host)
    }

    /// Provisioner configured from `options`, sharing `locks` with any other
    /// provisioner targeting the same host.
    pub fn from_options(
        host: Arc<dyn HostConnection>,
        options: &BootvolOptions,
        locks: Arc<PoolLockRegistry>,
    ) -> Self {
        let mut builder = Self::builder(host)
            .locks(locks)
            .retry((&options.retry).into())
            .uploader(Arc::new(StreamUploader::new(options.upload_chunk_bytes)));
        if let Some(dir) = &options.temp_dir {
            builder = builder.temp_dir(dir.clone());
        }
        if let Some(timeout) = options.lock_timeout() {
            builder = builder.lock_timeout(timeout);
        }
        builder.build()
    }

    /// Lock registry used by this provisioner.
    pub fn locks(&self) -> &Arc<PoolLockRegistry> {
        &self.inner.locks
    }

    /// Create a volume holding `request.payload` and return its identifier.
    pub async fn provision(&self, request: &ProvisioningRequest) -> BootvolResult<ExternalId> {
        tracing::info!(
            volume = %request.name,
            pool = %request.pool,
            "Provisioning volume"
        );

        let pool = self
            .inner
            .host
            .lookup_pool_by_name(&request.pool)
            .await
            .map_err(|e| BootvolError::PoolNotFound {
                pool: request.pool.clone(),
                reason: e.to_string(),
            })?;

        // Declared before the context so the artifact and handles go first.
        let _guard = self.acquire_pool_lock(&request.pool).await?;

        let ctx: ProvisionCtx = Arc::new(Mutex::new(ProvisionContext::new(
            request.clone(),
            pool,
            Arc::clone(&self.inner),
        )));

        let tasks: Vec<BoxedTask<ProvisionCtx>> = vec![
            Box::new(RefreshPoolTask),
            Box::new(MaterializeTask),
            Box::new(ProbeSizeTask),
            Box::new(CreateVolumeTask),
            Box::new(UploadVolumeTask),
            Box::new(FetchKeyTask),
        ];
        let metrics = PipelineExecutor::execute(Pipeline::new(tasks), Arc::clone(&ctx)).await?;

        tracing::debug!(
            volume = %request.name,
            total_ms = metrics.total_duration_ms,
            steps = ?metrics.tasks,
            "Provisioning pipeline finished"
        );

        let id = ctx
            .lock()
            .await
            .id
            .take()
            .ok_or_else(|| BootvolError::Internal("fetch_key task stored no identifier".into()))?;

        tracing::info!(
            volume = %request.name,
            pool = %request.pool,
            id = %id,
            "Provisioned volume"
        );
        Ok(id)
    }

    /// Find the volume and pool names behind `id`.
    pub async fn resolve(&self, id: &str) -> BootvolResult<ResolvedVolume> {
        resolve::resolve(self.inner.host.as_ref(), id).await
    }

    /// Delete the volume behind `id` under its pool's lock.
    pub async fn remove(&self, id: &str) -> BootvolResult<ResolvedVolume> {
        let located = resolve::locate(self.inner.host.as_ref(), id).await?;
        let pool_name = &located.resolved.pool;

        let _guard = self.acquire_pool_lock(pool_name).await?;
        tasks::refresh_pool(&located.pool, pool_name, &self.inner.retry).await?;

        located
            .volume
            .delete()
            .await
            .map_err(|e| BootvolError::VolumeDeleteFailed {
                key: located.key.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            volume = %located.resolved.name,
            pool = %pool_name,
            key = %located.key,
            "Removed volume"
        );
        Ok(located.resolved)
    }

    async fn acquire_pool_lock(&self, pool: &str) -> BootvolResult<PoolLockGuard> {
        let lock = self.inner.locks.lock_for(pool);
        match self.inner.lock_timeout {
            Some(timeout) => lock.acquire_timeout(timeout).await,
            None => Ok(lock.acquire().await),
        }
    }
}

/// Builder for [`Provisioner`].
pub struct ProvisionerBuilder {
    host: Arc<dyn HostConnection>,
    locks: Option<Arc<PoolLockRegistry>>,
    inspector: Option<Arc<dyn ImageInspector>>,
    uploader: Option<Arc<dyn VolumeUploader>>,
    retry: RetryPolicy,
    temp_dir: Option<PathBuf>,
    lock_timeout: Option<Duration>,
}

impl ProvisionerBuilder {
    fn new(host: Arc<dyn HostConnection>) -> Self {
        Self {
            host,
            locks: None,
            inspector: None,
            uploader: None,
            retry: RetryPolicy::default(),
            temp_dir: None,
            lock_timeout: None,
        }
    }

    pub fn locks(mut self, locks: Arc<PoolLockRegistry>) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn inspector(mut self, inspector: Arc<dyn ImageInspector>) -> Self {
        self.inspector = Some(inspector);
        self
    }

    pub fn uploader(mut self, uploader: Arc<dyn VolumeUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Provisioner {
        Provisioner {
            inner: Arc::new(ProvisionerInner {
                host: self.host,
                locks: self.locks.unwrap_or_default(),
                inspector: self
                    .inspector
                    .unwrap_or_else(|| Arc::new(LocalImageInspector)),
                uploader: self
                    .uploader
                    .unwrap_or_else(|| Arc::new(StreamUploader::default())),
                retry: self.retry,
                temp_dir: self.temp_dir,
                lock_timeout: self.lock_timeout,
            }),
        }
    }
}
