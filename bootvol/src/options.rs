//! Configuration options for bootvol.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bootvol_shared::errors::{BootvolError, BootvolResult};
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

pub const HOME_ENV: &str = "BOOTVOL_HOME";

const DEFAULT_UPLOAD_CHUNK_BYTES: usize = 256 * 1024;

/// Options controlling provisioning and the default host.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BootvolOptions {
    /// Root directory for the directory-backed host and logs.
    pub home_dir: PathBuf,
    /// Where artifacts are materialized. Defaults to the system temp dir.
    pub temp_dir: Option<PathBuf>,
    pub retry: RetryOptions,
    pub upload_chunk_bytes: usize,
    /// Upper bound on waiting for a pool lock. Waits forever when unset.
    pub lock_timeout_ms: Option<u64>,
}

impl Default for BootvolOptions {
    fn default() -> Self {
        Self {
            home_dir: default_home_dir(),
            temp_dir: None,
            retry: RetryOptions::default(),
            upload_chunk_bytes: DEFAULT_UPLOAD_CHUNK_BYTES,
            lock_timeout_ms: None,
        }
    }
}

fn default_home_dir() -> PathBuf {
    if let Some(home) = std::env::var_os(HOME_ENV) {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .map(|home| home.join(".bootvol"))
        .unwrap_or_else(|| std::env::temp_dir().join("bootvol"))
}

impl BootvolOptions {
    /// Load options from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> BootvolResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| BootvolError::io(format!("reading config {}", path.display()), e))?;
        let options: Self = serde_json::from_str(&raw).map_err(|e| {
            BootvolError::Config(format!("invalid config {}: {}", path.display(), e))
        })?;
        options.sanitize()?;
        Ok(options)
    }

    pub fn sanitize(&self) -> BootvolResult<()> {
        if !self.home_dir.is_absolute() {
            return Err(BootvolError::Config(format!(
                "home_dir must be absolute path, got: {}",
                self.home_dir.display()
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(BootvolError::Config(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.upload_chunk_bytes == 0 {
            return Err(BootvolError::Config(
                "upload_chunk_bytes must be non-zero".into(),
            ));
        }
        Ok(())
    }

    pub fn pools_dir(&self) -> PathBuf {
        self.home_dir.join("pools")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.home_dir.join("logs")
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }
}

/// Serializable form of [`RetryPolicy`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryOptions {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
            multiplier: 2.0,
        }
    }
}

impl From<&RetryOptions> for RetryPolicy {
    fn from(opts: &RetryOptions) -> Self {
        RetryPolicy {
            max_attempts: opts.max_attempts,
            initial_backoff: Duration::from_millis(opts.initial_backoff_ms),
            max_backoff: Duration::from_millis(opts.max_backoff_ms),
            multiplier: opts.multiplier,
        }
    }
}
