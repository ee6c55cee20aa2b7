//! Task: Create the volume on the host.

use super::{ProvisionCtx, log_task_error, task_start};
use crate::pipeline::PipelineTask;
use async_trait::async_trait;
use bootvol_shared::errors::{BootvolError, BootvolResult};

pub(crate) struct CreateVolumeTask;

#[async_trait]
impl PipelineTask<ProvisionCtx> for CreateVolumeTask {
    async fn run(self: Box<Self>, ctx: ProvisionCtx) -> BootvolResult<()> {
        let task_name = self.name();
        let volume = task_start(&ctx, task_name).await;

        let (pool, pool_name, xml) = {
            let ctx = ctx.lock().await;
            let descriptor = ctx
                .descriptor
                .as_ref()
                .ok_or_else(|| BootvolError::Internal("probe_size task must run first".into()))?;
            (
                ctx.pool.clone(),
                ctx.request.pool.clone(),
                descriptor.to_xml(),
            )
        };

        let handle = pool
            .create_volume(&xml)
            .await
            .map_err(|e| BootvolError::VolumeCreateFailed {
                name: volume.clone(),
                pool: pool_name.clone(),
                reason: e.to_string(),
            })
            .inspect_err(|e| log_task_error(&volume, task_name, e))?;

        tracing::info!(volume = %volume, pool = %pool_name, "Created volume");

        ctx.lock().await.volume = Some(handle);
        Ok(())
    }

    fn name(&self) -> &str {
        "create_volume"
    }
}
