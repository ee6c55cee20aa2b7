//! Artifact size inspection.

use std::path::Path;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;

use crate::host::{HostError, HostResult};

/// QCOW2 header layout (big-endian fields).
pub mod qcow2 {
    /// "QFI\xfb"
    pub const MAGIC: [u8; 4] = [b'Q', b'F', b'I', 0xfb];

    /// Offset of the 64-bit virtual disk size.
    pub const SIZE_OFFSET: usize = 24;

    /// Bytes needed to read magic through size.
    pub const HEADER_PREFIX_LEN: usize = SIZE_OFFSET + 8;
}

/// Reports the logical size of an artifact, i.e. the capacity a volume
/// needs to hold it.
#[async_trait]
pub trait ImageInspector: Send + Sync {
    async fn size(&self, path: &Path) -> HostResult<u64>;
}

/// Inspector for local files.
///
/// Raw files report their length; qcow2 images report the virtual size
/// from their header.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalImageInspector;

#[async_trait]
impl ImageInspector for LocalImageInspector {
    async fn size(&self, path: &Path) -> HostResult<u64> {
        let meta = tokio::fs::metadata(path).await?;
        if !meta.is_file() {
            return Err(HostError::Invalid(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        let mut header = [0u8; qcow2::HEADER_PREFIX_LEN];
        let mut file = tokio::fs::File::open(path).await?;
        let mut filled = 0;
        while filled < header.len() {
            let n = file.read(&mut header[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if let Some(virtual_size) = qcow2_virtual_size(&header[..filled]) {
            tracing::debug!(
                path = %path.display(),
                virtual_size,
                "Detected qcow2 image"
            );
            return Ok(virtual_size);
        }

        Ok(meta.len())
    }
}

fn qcow2_virtual_size(header: &[u8]) -> Option<u64> {
    if header.len() < qcow2::HEADER_PREFIX_LEN || header[..4] != qcow2::MAGIC {
        return None;
    }
    let mut size = [0u8; 8];
    size.copy_from_slice(&header[qcow2::SIZE_OFFSET..qcow2::SIZE_OFFSET + 8]);
    Some(u64::from_be_bytes(size))
}
