//! Task: Probe the artifact size and build the volume descriptor.

use super::{ProvisionCtx, log_task_error, task_start};
use crate::pipeline::PipelineTask;
use crate::volume::VolumeDescriptor;
use async_trait::async_trait;
use bootvol_shared::errors::{BootvolError, BootvolResult};

pub(crate) struct ProbeSizeTask;

#[async_trait]
impl PipelineTask<ProvisionCtx> for ProbeSizeTask {
    async fn run(self: Box<Self>, ctx: ProvisionCtx) -> BootvolResult<()> {
        let task_name = self.name();
        let volume = task_start(&ctx, task_name).await;

        let (artifact, inspector) = {
            let ctx = ctx.lock().await;
            let artifact = ctx
                .artifact
                .as_ref()
                .ok_or_else(|| BootvolError::Internal("materialize task must run first".into()))?
                .path()
                .to_path_buf();
            (artifact, ctx.provisioner.inspector.clone())
        };

        let size = inspector
            .size(&artifact)
            .await
            .map_err(|e| BootvolError::SizeProbeFailed {
                artifact: artifact.display().to_string(),
                reason: e.to_string(),
            })
            .inspect_err(|e| log_task_error(&volume, task_name, e))?;

        tracing::debug!(volume = %volume, size, "Probed artifact size");

        ctx.lock().await.descriptor = Some(VolumeDescriptor::raw(volume, size));
        Ok(())
    }

    fn name(&self) -> &str {
        "probe_size"
    }
}
