//! Provisioning request and per-call pipeline state.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bootvol_shared::errors::OrphanedVolume;
use bootvol_shared::id::ExternalId;
use serde::{Deserialize, Serialize};

use crate::host::{HostConnection, PoolHandle, VolumeHandle};
use crate::image::ImageInspector;
use crate::lock::PoolLockRegistry;
use crate::payload::Artifact;
use crate::retry::RetryPolicy;
use crate::upload::VolumeUploader;
use crate::volume::VolumeDescriptor;

/// A request to turn `payload` into volume `name` in pool `pool`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningRequest {
    /// Logical name of the volume to create.
    pub name: String,
    /// Target storage pool.
    pub pool: String,
    /// Path to an existing file, or inline JSON object text.
    pub payload: String,
}

impl ProvisioningRequest {
    pub fn new(
        name: impl Into<String>,
        pool: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            pool: pool.into(),
            payload: payload.into(),
        }
    }
}

/// Collaborators shared by every call made through one provisioner.
pub(crate) struct ProvisionerInner {
    pub(crate) host: Arc<dyn HostConnection>,
    pub(crate) locks: Arc<PoolLockRegistry>,
    pub(crate) inspector: Arc<dyn ImageInspector>,
    pub(crate) uploader: Arc<dyn VolumeUploader>,
    pub(crate) retry: RetryPolicy,
    pub(crate) temp_dir: Option<PathBuf>,
    pub(crate) lock_timeout: Option<Duration>,
}

/// State threaded through the provisioning pipeline.
///
/// Dropping the context removes the artifact and releases host handles.
pub(crate) struct ProvisionContext {
    pub(crate) request: ProvisioningRequest,
    pub(crate) pool: PoolHandle,
    pub(crate) provisioner: Arc<ProvisionerInner>,

    pub(crate) artifact: Option<Artifact>,
    pub(crate) descriptor: Option<VolumeDescriptor>,
    pub(crate) volume: Option<VolumeHandle>,
    pub(crate) id: Option<ExternalId>,
}

impl ProvisionContext {
    pub(crate) fn new(
        request: ProvisioningRequest,
        pool: PoolHandle,
        provisioner: Arc<ProvisionerInner>,
    ) -> Self {
        Self {
            request,
            pool,
            provisioner,
            artifact: None,
            descriptor: None,
            volume: None,
            id: None,
        }
    }

    /// Metadata for a volume that exists on the host but was not fully
    /// provisioned.
    pub(crate) fn orphan(&self) -> OrphanedVolume {
        OrphanedVolume {
            name: self.request.name.clone(),
            pool: self.request.pool.clone(),
        }
    }
}
