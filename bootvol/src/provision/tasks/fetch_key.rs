//! Task: Read the host-assigned key of the new volume and encode it.

use super::{ProvisionCtx, log_task_error, task_start};
use crate::pipeline::PipelineTask;
use async_trait::async_trait;
use bootvol_shared::errors::{BootvolError, BootvolResult};
use bootvol_shared::id::ExternalId;

pub(crate) struct FetchKeyTask;

#[async_trait]
impl PipelineTask<ProvisionCtx> for FetchKeyTask {
    async fn run(self: Box<Self>, ctx: ProvisionCtx) -> BootvolResult<()> {
        let task_name = self.name();
        let volume_name = task_start(&ctx, task_name).await;

        let (volume, orphan) = {
            let ctx = ctx.lock().await;
            let volume = ctx
                .volume
                .clone()
                .ok_or_else(|| BootvolError::Internal("create_volume task must run first".into()))?;
            (volume, ctx.orphan())
        };

        let id = volume
            .key()
            .await
            .map_err(|e| e.to_string())
            .and_then(|key| ExternalId::encode(&key).map_err(|e| e.to_string()))
            .map_err(|reason| BootvolError::KeyRetrievalFailed {
                volume: orphan,
                reason,
            })
            .inspect_err(|e| log_task_error(&volume_name, task_name, e))?;

        ctx.lock().await.id = Some(id);
        Ok(())
    }

    fn name(&self) -> &str {
        "fetch_key"
    }
}
