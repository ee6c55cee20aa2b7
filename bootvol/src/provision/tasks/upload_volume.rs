//! Task: Upload the artifact into the new volume.
//!
//! The volume already exists at this point; failures are reported with the
//! orphaned volume attached and nothing is rolled back.

use super::{ProvisionCtx, log_task_error, task_start};
use crate::pipeline::PipelineTask;
use async_trait::async_trait;
use bootvol_shared::errors::{BootvolError, BootvolResult};

pub(crate) struct UploadVolumeTask;

#[async_trait]
impl PipelineTask<ProvisionCtx> for UploadVolumeTask {
    async fn run(self: Box<Self>, ctx: ProvisionCtx) -> BootvolResult<()> {
        let task_name = self.name();
        let volume_name = task_start(&ctx, task_name).await;

        let (host, uploader, volume, capacity, artifact, orphan) = {
            let ctx = ctx.lock().await;
            let volume = ctx
                .volume
                .clone()
                .ok_or_else(|| BootvolError::Internal("create_volume task must run first".into()))?;
            let capacity = ctx
                .descriptor
                .as_ref()
                .ok_or_else(|| BootvolError::Internal("probe_size task must run first".into()))?
                .capacity_bytes()?;
            let artifact = ctx
                .artifact
                .as_ref()
                .ok_or_else(|| BootvolError::Internal("materialize task must run first".into()))?
                .path()
                .to_path_buf();
            (
                ctx.provisioner.host.clone(),
                ctx.provisioner.uploader.clone(),
                volume,
                capacity,
                artifact,
                ctx.orphan(),
            )
        };

        uploader
            .upload(host.as_ref(), &volume, capacity, &artifact)
            .await
            .map_err(|e| BootvolError::UploadFailed {
                artifact: artifact.display().to_string(),
                volume: orphan,
                reason: e.to_string(),
            })
            .inspect_err(|e| log_task_error(&volume_name, task_name, e))
    }

    fn name(&self) -> &str {
        "upload_volume"
    }
}
