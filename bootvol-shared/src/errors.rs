//! Error types shared across bootvol crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Result alias used by every bootvol operation.
pub type BootvolResult<T> = Result<T, BootvolError>;

/// A volume that was created on the host before a later step failed.
///
/// The volume is left in place; callers that receive an error carrying this
/// value must reconcile it themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanedVolume {
    pub name: String,
    pub pool: String,
}

impl fmt::Display for OrphanedVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "volume '{}' in pool '{}'", self.name, self.pool)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BootvolError {
    // ========================================================================
    // Provisioning
    // ========================================================================
    #[error("can't find storage pool '{pool}': {reason}")]
    PoolNotFound { pool: String, reason: String },

    #[error("failed to refresh storage pool '{pool}': {reason}")]
    PoolRefreshFailed { pool: String, reason: String },

    #[error("timed out after {waited_ms}ms waiting for lock on pool '{pool}'")]
    LockTimeout { pool: String, waited_ms: u64 },

    #[error("payload is neither a file nor a valid JSON object: {payload}")]
    InvalidPayloadFormat { payload: String },

    #[error("failed to probe size of {artifact}: {reason}")]
    SizeProbeFailed { artifact: String, reason: String },

    #[error("failed to create volume '{name}' in pool '{pool}': {reason}")]
    VolumeCreateFailed {
        name: String,
        pool: String,
        reason: String,
    },

    #[error("failed to upload {artifact} into {volume}: {reason}")]
    UploadFailed {
        artifact: String,
        volume: OrphanedVolume,
        reason: String,
    },

    #[error("failed to retrieve key of {volume}: {reason}")]
    KeyRetrievalFailed {
        volume: OrphanedVolume,
        reason: String,
    },

    // ========================================================================
    // Resolution
    // ========================================================================
    #[error("{id} is not a valid volume identifier")]
    InvalidIdentifier { id: String },

    #[error("volume key '{key}' contains the identifier delimiter")]
    UnencodableKey { key: String },

    #[error("can't retrieve volume with key '{key}': {reason}")]
    VolumeNotFound { key: String, reason: String },

    #[error("failed to read name of volume '{key}': {reason}")]
    NameReadFailed { key: String, reason: String },

    #[error("failed to look up pool of volume '{key}': {reason}")]
    PoolLookupFailed { key: String, reason: String },

    #[error("failed to read pool name of volume '{key}': {reason}")]
    PoolNameReadFailed { key: String, reason: String },

    #[error("failed to delete volume '{key}': {reason}")]
    VolumeDeleteFailed { key: String, reason: String },

    // ========================================================================
    // Ambient
    // ========================================================================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BootvolError {
    /// Wrap an I/O error with a description of what was being attempted.
    pub fn io(context: impl fmt::Display, err: std::io::Error) -> Self {
        BootvolError::Io(std::io::Error::new(
            err.kind(),
            format!("{}: {}", context, err),
        ))
    }

    /// The volume left behind on the host, if this error happened after
    /// the volume was created.
    pub fn orphaned_volume(&self) -> Option<&OrphanedVolume> {
        match self {
            BootvolError::UploadFailed { volume, .. }
            | BootvolError::KeyRetrievalFailed { volume, .. } => Some(volume),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orphaned_volume_only_after_create() {
        let orphan = OrphanedVolume {
            name: "node1".into(),
            pool: "default".into(),
        };
        let upload = BootvolError::UploadFailed {
            artifact: "/tmp/node1-x".into(),
            volume: orphan.clone(),
            reason: "stream closed".into(),
        };
        assert_eq!(upload.orphaned_volume(), Some(&orphan));

        let create = BootvolError::VolumeCreateFailed {
            name: "node1".into(),
            pool: "default".into(),
            reason: "exists".into(),
        };
        assert!(create.orphaned_volume().is_none());
    }

    #[test]
    fn test_messages_carry_context() {
        let err = BootvolError::VolumeNotFound {
            key: "abc123".into(),
            reason: "no such key".into(),
        };
        assert!(err.to_string().contains("abc123"));

        let err = BootvolError::io(
            "opening payload /nope",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(err.to_string().contains("/nope"));
        assert!(matches!(err, BootvolError::Io(ref e) if e.kind() == std::io::ErrorKind::NotFound));
    }
}
