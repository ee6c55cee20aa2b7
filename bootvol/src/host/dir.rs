//! Directory-backed host.
//!
//! Mirrors a libvirt `dir` storage pool: every sub-directory of the root is
//! a pool, every regular file inside a pool is a raw volume, and a volume's
//! key is its absolute path.
//!
//! ```text
//! <root>/
//! ├── default/          pool "default"
//! │   └── node1         volume "node1", key "<root>/default/node1"
//! └── images/           pool "images"
//! ```

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bootvol_shared::id::DELIMITER;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use super::{
    HostConnection, HostError, HostResult, PoolHandle, StoragePool, StorageVolume, UploadStream,
    VolumeHandle,
};
use crate::volume::{FORMAT_RAW, VolumeDescriptor};

#[derive(Debug, Clone)]
pub struct DirHost {
    root: Arc<PathBuf>,
}

impl DirHost {
    /// Open a host rooted at `root`, creating the directory if needed.
    ///
    /// Volume keys are paths under the root, so the root must be valid
    /// UTF-8 and free of the identifier delimiter.
    pub fn open(root: impl Into<PathBuf>) -> HostResult<Self> {
        let root = root.into();
        check_root(&root)?;
        std::fs::create_dir_all(&root)?;
        let root = root.canonicalize()?;
        check_root(&root)?;
        Ok(Self {
            root: Arc::new(root),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create pool `name` if it does not exist yet.
    pub fn define_pool(&self, name: &str) -> HostResult<()> {
        validate_component("pool", name)?;
        std::fs::create_dir_all(self.root.join(name))?;
        tracing::debug!(pool = %name, root = %self.root.display(), "Defined pool");
        Ok(())
    }

    fn pool(&self, name: &str) -> DirPool {
        DirPool {
            root: Arc::clone(&self.root),
            name: name.to_string(),
        }
    }

    /// Map a volume key back to its pool name and file path.
    fn locate(&self, key: &str) -> HostResult<(String, PathBuf)> {
        let not_found = || HostError::NotFound(format!("volume with key '{}'", key));

        let path = Path::new(key);
        if !path.is_absolute() {
            return Err(not_found());
        }
        let path = path.canonicalize().map_err(|_| not_found())?;
        if !path.is_file() {
            return Err(not_found());
        }
        let parent = path.parent().ok_or_else(not_found)?;
        if parent.parent() != Some(self.root.as_path()) {
            return Err(not_found());
        }
        let pool = parent
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(not_found)?
            .to_string();
        Ok((pool, path))
    }
}

#[async_trait]
impl HostConnection for DirHost {
    async fn lookup_pool_by_name(&self, name: &str) -> HostResult<PoolHandle> {
        validate_component("pool", name)
            .map_err(|_| HostError::NotFound(format!("storage pool '{}'", name)))?;
        let pool = self.pool(name);
        match tokio::fs::metadata(pool.path()).await {
            Ok(meta) if meta.is_dir() => Ok(Arc::new(pool)),
            _ => Err(HostError::NotFound(format!("storage pool '{}'", name))),
        }
    }

    async fn lookup_volume_by_key(&self, key: &str) -> HostResult<VolumeHandle> {
        let (pool, path) = self.locate(key)?;
        Ok(Arc::new(DirVolume {
            pool: self.pool(&pool),
            path,
        }))
    }

    async fn open_upload(
        &self,
        volume: &VolumeHandle,
        offset: u64,
        length: u64,
    ) -> HostResult<Box<dyn UploadStream>> {
        let key = volume.key().await?;
        let (_, path) = self.locate(&key)?;

        let capacity = tokio::fs::metadata(&path).await?.len();
        let end = offset
            .checked_add(length)
            .ok_or_else(|| HostError::Invalid("upload range overflows".into()))?;
        if end > capacity {
            return Err(HostError::Invalid(format!(
                "upload range {}..{} exceeds volume capacity {}",
                offset, end, capacity
            )));
        }

        let mut file = tokio::fs::OpenOptions::new().write(true).open(&path).await?;
        file.seek(SeekFrom::Start(offset)).await?;

        Ok(Box::new(DirUpload {
            file,
            path,
            remaining: length,
        }))
    }
}

#[derive(Debug, Clone)]
struct DirPool {
    root: Arc<PathBuf>,
    name: String,
}

impl DirPool {
    fn path(&self) -> PathBuf {
        self.root.join(&self.name)
    }
}

#[async_trait]
impl StoragePool for DirPool {
    async fn name(&self) -> HostResult<String> {
        Ok(self.name.clone())
    }

    async fn refresh(&self) -> HostResult<()> {
        let mut entries = tokio::fs::read_dir(self.path()).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HostError::NotFound(format!("storage pool '{}'", self.name))
            } else {
                HostError::Io(e)
            }
        })?;
        let mut volumes = 0usize;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                volumes += 1;
            }
        }
        tracing::trace!(pool = %self.name, volumes, "Refreshed pool");
        Ok(())
    }

    async fn create_volume(&self, xml: &str) -> HostResult<VolumeHandle> {
        let desc = VolumeDescriptor::from_xml(xml).map_err(|e| HostError::Invalid(e.to_string()))?;
        if desc.format != FORMAT_RAW {
            return Err(HostError::Invalid(format!(
                "dir pools only hold raw volumes, got '{}'",
                desc.format
            )));
        }
        validate_component("volume", &desc.name)?;
        let capacity = desc
            .capacity_bytes()
            .map_err(|e| HostError::Invalid(e.to_string()))?;

        let path = self.path().join(&desc.name);
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => HostError::AlreadyExists(format!(
                    "volume '{}' in pool '{}'",
                    desc.name, self.name
                )),
                std::io::ErrorKind::NotFound => {
                    HostError::NotFound(format!("storage pool '{}'", self.name))
                }
                _ => HostError::Io(e),
            })?;
        file.set_len(capacity).await?;

        tracing::debug!(
            pool = %self.name,
            volume = %desc.name,
            capacity,
            "Created volume"
        );

        Ok(Arc::new(DirVolume {
            pool: self.clone(),
            path: path.canonicalize()?,
        }))
    }
}

#[derive(Debug)]
struct DirVolume {
    pool: DirPool,
    path: PathBuf,
}

#[async_trait]
impl StorageVolume for DirVolume {
    async fn key(&self) -> HostResult<String> {
        self.path
            .to_str()
            .map(str::to_string)
            .ok_or_else(|| HostError::Failed(format!("non UTF-8 path {}", self.path.display())))
    }

    async fn name(&self) -> HostResult<String> {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| HostError::Failed(format!("unnamed volume {}", self.path.display())))
    }

    async fn pool(&self) -> HostResult<PoolHandle> {
        Ok(Arc::new(self.pool.clone()))
    }

    async fn delete(&self) -> HostResult<()> {
        tokio::fs::remove_file(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HostError::NotFound(format!("volume {}", self.path.display()))
            } else {
                HostError::Io(e)
            }
        })
    }
}

struct DirUpload {
    file: tokio::fs::File,
    path: PathBuf,
    remaining: u64,
}

#[async_trait]
impl UploadStream for DirUpload {
    async fn send(&mut self, chunk: &[u8]) -> HostResult<()> {
        let len = chunk.len() as u64;
        if len > self.remaining {
            return Err(HostError::Invalid(format!(
                "{} more bytes sent than declared for {}",
                len - self.remaining,
                self.path.display()
            )));
        }
        self.file.write_all(chunk).await?;
        self.remaining -= len;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> HostResult<()> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok(())
    }

    async fn abort(self: Box<Self>) -> HostResult<()> {
        tracing::debug!(volume = %self.path.display(), "Upload aborted");
        Ok(())
    }
}

fn check_root(root: &Path) -> HostResult<()> {
    match root.to_str() {
        Some(path) if !path.contains(DELIMITER) => Ok(()),
        _ => Err(HostError::Invalid(format!(
            "host root {} must be UTF-8 without '{}'",
            root.display(),
            DELIMITER
        ))),
    }
}

fn validate_component(kind: &str, name: &str) -> HostResult<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
        || name.contains(DELIMITER);
    if bad {
        return Err(HostError::Invalid(format!("invalid {} name '{}'", kind, name)));
    }
    Ok(())
}
