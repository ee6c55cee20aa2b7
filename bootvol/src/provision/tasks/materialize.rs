//! Task: Materialize the payload into a temporary artifact.

use super::{ProvisionCtx, log_task_error, task_start};
use crate::payload;
use crate::pipeline::PipelineTask;
use async_trait::async_trait;
use bootvol_shared::errors::{BootvolError, BootvolResult};

pub(crate) struct MaterializeTask;

#[async_trait]
impl PipelineTask<ProvisionCtx> for MaterializeTask {
    async fn run(self: Box<Self>, ctx: ProvisionCtx) -> BootvolResult<()> {
        let task_name = self.name();
        let volume = task_start(&ctx, task_name).await;

        let (payload, temp_dir) = {
            let ctx = ctx.lock().await;
            (
                ctx.request.payload.clone(),
                ctx.provisioner.temp_dir.clone(),
            )
        };

        // File copies block; keep them off the async workers.
        let hint = volume.clone();
        let artifact = tokio::task::spawn_blocking(move || {
            payload::materialize(&payload, &hint, temp_dir.as_deref())
        })
        .await
        .map_err(|e| BootvolError::Internal(format!("materialize task panicked: {}", e)))
        .and_then(|result| result)
        .inspect_err(|e| log_task_error(&volume, task_name, e))?;

        tracing::debug!(
            volume = %volume,
            artifact = %artifact.path().display(),
            source = ?artifact.source(),
            "Materialized payload"
        );

        ctx.lock().await.artifact = Some(artifact);
        Ok(())
    }

    fn name(&self) -> &str {
        "materialize_payload"
    }
}
