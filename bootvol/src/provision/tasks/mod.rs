//! Provisioning pipeline tasks.
//!
//! Each task reads what it needs from the shared context, releases the
//! context lock, does its work, then stores its output.

mod create_volume;
mod fetch_key;
mod materialize;
mod probe_size;
mod refresh_pool;
mod upload_volume;

pub(crate) use create_volume::CreateVolumeTask;
pub(crate) use fetch_key::FetchKeyTask;
pub(crate) use materialize::MaterializeTask;
pub(crate) use probe_size::ProbeSizeTask;
pub(crate) use refresh_pool::{RefreshPoolTask, refresh_pool};
pub(crate) use upload_volume::UploadVolumeTask;

use crate::provision::types::ProvisionContext;
use bootvol_shared::errors::BootvolError;
use std::sync::Arc;
use tokio::sync::Mutex;

pub(crate) type ProvisionCtx = Arc<Mutex<ProvisionContext>>;

/// Log task start and return the volume name for later log lines.
pub(crate) async fn task_start(ctx: &ProvisionCtx, task_name: &str) -> String {
    let ctx = ctx.lock().await;
    tracing::debug!(
        volume = %ctx.request.name,
        pool = %ctx.request.pool,
        task = task_name,
        "Starting provisioning task"
    );
    ctx.request.name.clone()
}

pub(crate) fn log_task_error(volume: &str, task_name: &str, err: &BootvolError) {
    tracing::error!(volume = %volume, task = task_name, error = %err, "Provisioning task failed");
}
