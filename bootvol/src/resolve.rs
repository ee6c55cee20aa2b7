//! Mapping identifiers back to volumes.

use bootvol_shared::errors::{BootvolError, BootvolResult};
use bootvol_shared::id::ExternalId;
use serde::{Deserialize, Serialize};

use crate::host::{HostConnection, PoolHandle, VolumeHandle};

/// Names of a volume and the pool that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedVolume {
    pub name: String,
    pub pool: String,
}

/// Look up the volume behind `id`. Read-only.
pub async fn resolve(host: &dyn HostConnection, id: &str) -> BootvolResult<ResolvedVolume> {
    let located = locate(host, id).await?;
    tracing::debug!(
        key = %located.key,
        volume = %located.resolved.name,
        pool = %located.resolved.pool,
        "Resolved identifier"
    );
    Ok(located.resolved)
}

/// Volume behind an identifier, with the handles used to find it.
pub(crate) struct Located {
    pub(crate) key: String,
    pub(crate) volume: VolumeHandle,
    pub(crate) pool: PoolHandle,
    pub(crate) resolved: ResolvedVolume,
}

pub(crate) async fn locate(host: &dyn HostConnection, id: &str) -> BootvolResult<Located> {
    let key = ExternalId::decode(id)?;

    let volume = host
        .lookup_volume_by_key(&key)
        .await
        .map_err(|e| BootvolError::VolumeNotFound {
            key: key.clone(),
            reason: e.to_string(),
        })?;

    let name = volume
        .name()
        .await
        .map_err(|e| BootvolError::NameReadFailed {
            key: key.clone(),
            reason: e.to_string(),
        })?;

    let pool = volume
        .pool()
        .await
        .map_err(|e| BootvolError::PoolLookupFailed {
            key: key.clone(),
            reason: e.to_string(),
        })?;

    let pool_name = pool
        .name()
        .await
        .map_err(|e| BootvolError::PoolNameReadFailed {
            key: key.clone(),
            reason: e.to_string(),
        })?;

    Ok(Located {
        key,
        volume,
        pool,
        resolved: ResolvedVolume {
            name,
            pool: pool_name,
        },
    })
}
