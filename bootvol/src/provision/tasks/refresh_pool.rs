//! Task: Pool refresh.
//!
//! Re-reads pool state so the host sees volumes released by earlier
//! operations. Retried, since refresh is idempotent.

use super::{ProvisionCtx, log_task_error, task_start};
use crate::host::PoolHandle;
use crate::pipeline::PipelineTask;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use bootvol_shared::errors::{BootvolError, BootvolResult};

pub(crate) struct RefreshPoolTask;

#[async_trait]
impl PipelineTask<ProvisionCtx> for RefreshPoolTask {
    async fn run(self: Box<Self>, ctx: ProvisionCtx) -> BootvolResult<()> {
        let task_name = self.name();
        let volume = task_start(&ctx, task_name).await;

        let (pool, pool_name, retry) = {
            let ctx = ctx.lock().await;
            (
                ctx.pool.clone(),
                ctx.request.pool.clone(),
                ctx.provisioner.retry.clone(),
            )
        };

        refresh_pool(&pool, &pool_name, &retry)
            .await
            .inspect_err(|e| log_task_error(&volume, task_name, e))
    }

    fn name(&self) -> &str {
        "refresh_pool"
    }
}

/// Refresh `pool`, retrying transient failures.
pub(crate) async fn refresh_pool(
    pool: &PoolHandle,
    pool_name: &str,
    retry: &RetryPolicy,
) -> BootvolResult<()> {
    let description = format!("refreshing pool '{}'", pool_name);
    let pool = pool.as_ref();
    retry
        .run(&description, move || pool.refresh())
        .await
        .map_err(|e| BootvolError::PoolRefreshFailed {
            pool: pool_name.to_string(),
            reason: format!("gave up after {} attempts: {}", e.attempts, e.last_error),
        })
}
