//! Task trait for pipeline execution.

use async_trait::async_trait;
use bootvol_shared::errors::BootvolResult;

/// One step of a pipeline.
///
/// Tasks run with a shared context, which is cloned per task.
#[async_trait]
pub trait PipelineTask<Ctx>: Send + Sync {
    async fn run(self: Box<Self>, ctx: Ctx) -> BootvolResult<()>;

    /// Human-readable task name for logging and metrics.
    fn name(&self) -> &str;
}

pub type BoxedTask<Ctx> = Box<dyn PipelineTask<Ctx>>;
