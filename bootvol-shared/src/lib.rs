//! Types shared between the bootvol library and its front ends.

pub mod errors;
pub mod id;

pub use errors::{BootvolError, BootvolResult, OrphanedVolume};
pub use id::ExternalId;
