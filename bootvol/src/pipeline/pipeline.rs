//! Pipeline executor.

use super::metrics::{PipelineMetrics, TaskMetrics};
use super::task::BoxedTask;
use bootvol_shared::errors::BootvolResult;
use std::time::Instant;

pub struct Pipeline<Ctx> {
    tasks: Vec<BoxedTask<Ctx>>,
}

impl<Ctx> Pipeline<Ctx> {
    pub fn new(tasks: Vec<BoxedTask<Ctx>>) -> Self {
        Self { tasks }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Runs pipelines.
pub struct PipelineExecutor;

impl PipelineExecutor {
    /// Execute every task in order against `ctx`.
    ///
    /// Returns the first task error unchanged; later tasks are not run.
    ///
    /// Generic over:
    /// - `Ctx`: Shared pipeline context (use interior mutability for writes)
    pub async fn execute<Ctx>(pipeline: Pipeline<Ctx>, ctx: Ctx) -> BootvolResult<PipelineMetrics>
    where
        Ctx: Clone,
    {
        let total_start = Instant::now();
        let mut task_metrics = Vec::with_capacity(pipeline.tasks.len());

        for task in pipeline.tasks {
            let name = task.name().to_string();
            let task_start = Instant::now();
            task.run(ctx.clone()).await?;
            task_metrics.push(TaskMetrics {
                name,
                duration_ms: task_start.elapsed().as_millis(),
            });
        }

        Ok(PipelineMetrics {
            total_duration_ms: total_start.elapsed().as_millis(),
            tasks: task_metrics,
        })
    }
}
