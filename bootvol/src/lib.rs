//! bootvol turns boot configuration payloads into storage volumes on a
//! virtualization host and maps the returned identifiers back to them.
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use std::sync::Arc;
//! use bootvol::{DirHost, Provisioner, ProvisioningRequest};
//!
//! let host = DirHost::open("/var/lib/bootvol/pools")?;
//! let provisioner = Provisioner::new(Arc::new(host));
//!
//! let id = provisioner
//!     .provision(&ProvisioningRequest::new("node1", "default", "/tmp/ign.json"))
//!     .await?;
//! let volume = provisioner.resolve(id.as_str()).await?;
//! assert_eq!(volume.name, "node1");
//! # Ok(())
//! # }
//! ```

pub mod host;
pub mod image;
pub mod lock;
mod logging;
pub mod options;
pub mod payload;
pub mod pipeline;
pub mod provision;
pub mod resolve;
pub mod retry;
pub mod upload;
pub mod volume;

pub use bootvol_shared::errors::{BootvolError, BootvolResult, OrphanedVolume};
pub use bootvol_shared::id::ExternalId;
pub use host::{DirHost, HostConnection, HostError, HostResult};
pub use image::{ImageInspector, LocalImageInspector};
pub use lock::{PoolLock, PoolLockGuard, PoolLockRegistry};
pub use logging::init_logging;
pub use options::{BootvolOptions, RetryOptions};
pub use provision::{Provisioner, ProvisionerBuilder, ProvisioningRequest};
pub use resolve::{ResolvedVolume, resolve};
pub use retry::{RetryExhausted, RetryPolicy};
pub use upload::{StreamUploader, VolumeUploader};
pub use volume::VolumeDescriptor;
