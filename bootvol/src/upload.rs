//! Copying artifact bytes into host volumes.

use std::path::Path;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;

use crate::host::{HostConnection, HostError, HostResult, VolumeHandle};

pub const DEFAULT_CHUNK_BYTES: usize = 256 * 1024;

/// Writes a local artifact into a volume that was created with
/// `capacity` bytes.
#[async_trait]
pub trait VolumeUploader: Send + Sync {
    async fn upload(
        &self,
        host: &dyn HostConnection,
        volume: &VolumeHandle,
        capacity: u64,
        artifact: &Path,
    ) -> HostResult<()>;
}

/// Streams the artifact through [`HostConnection::open_upload`] in fixed
/// size chunks.
///
/// The stream is aborted if reading or sending fails midway.
#[derive(Debug, Clone, Copy)]
pub struct StreamUploader {
    chunk_bytes: usize,
}

impl StreamUploader {
    pub fn new(chunk_bytes: usize) -> Self {
        Self {
            chunk_bytes: chunk_bytes.max(1),
        }
    }
}

impl Default for StreamUploader {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_BYTES)
    }
}

#[async_trait]
impl VolumeUploader for StreamUploader {
    async fn upload(
        &self,
        host: &dyn HostConnection,
        volume: &VolumeHandle,
        capacity: u64,
        artifact: &Path,
    ) -> HostResult<()> {
        let mut file = tokio::fs::File::open(artifact).await?;
        let len = file.metadata().await?.len();
        if len > capacity {
            return Err(HostError::Invalid(format!(
                "{} is {} bytes, larger than volume capacity {}",
                artifact.display(),
                len,
                capacity
            )));
        }

        let mut stream = host.open_upload(volume, 0, len).await?;
        let mut buf = vec![0u8; self.chunk_bytes];
        let mut sent = 0u64;

        loop {
            let n = match file.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    abort_quietly(stream).await;
                    return Err(e.into());
                }
            };
            if let Err(e) = stream.send(&buf[..n]).await {
                abort_quietly(stream).await;
                return Err(e);
            }
            sent += n as u64;
        }

        if sent != len {
            abort_quietly(stream).await;
            return Err(HostError::Failed(format!(
                "{} changed during upload: expected {} bytes, read {}",
                artifact.display(),
                len,
                sent
            )));
        }

        stream.finish().await?;
        tracing::debug!(artifact = %artifact.display(), bytes = sent, "Uploaded artifact");
        Ok(())
    }
}

async fn abort_quietly(stream: Box<dyn crate::host::UploadStream>) {
    if let Err(e) = stream.abort().await {
        tracing::warn!(error = %e, "Failed to abort upload stream");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{DirHost, StoragePool};
    use crate::volume::VolumeDescriptor;
    use tempfile::TempDir;

    async fn setup(capacity: u64) -> (TempDir, DirHost, VolumeHandle) {
        let dir = TempDir::new().unwrap();
        let host = DirHost::open(dir.path().join("pools")).unwrap();
        host.define_pool("default").unwrap();
        let pool = host.lookup_pool_by_name("default").await.unwrap();
        let volume = pool
            .create_volume(&VolumeDescriptor::raw("node1", capacity).to_xml())
            .await
            .unwrap();
        (dir, host, volume)
    }

    #[tokio::test]
    async fn test_upload_in_small_chunks() {
        let payload: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let (dir, host, volume) = setup(payload.len() as u64).await;
        let artifact = dir.path().join("artifact");
        std::fs::write(&artifact, &payload).unwrap();

        StreamUploader::new(7)
            .upload(&host, &volume, payload.len() as u64, &artifact)
            .await
            .unwrap();

        let key = volume.key().await.unwrap();
        assert_eq!(std::fs::read(key).unwrap(), payload);
    }

    #[tokio::test]
    async fn test_artifact_larger_than_capacity() {
        let (dir, host, volume) = setup(4).await;
        let artifact = dir.path().join("artifact");
        std::fs::write(&artifact, b"too large").unwrap();

        let err = StreamUploader::default()
            .upload(&host, &volume, 4, &artifact)
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_missing_artifact() {
        let (dir, host, volume) = setup(4).await;
        let err = StreamUploader::default()
            .upload(&host, &volume, 4, &dir.path().join("gone"))
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::Io(_)));
    }
}
