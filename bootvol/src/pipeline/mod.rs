//! Sequential task pipeline.
//!
//! Multi-step operations are expressed as an ordered list of tasks sharing
//! one context. The executor stops at the first failing task and records
//! how long each completed task took.
//!
//! ```text
//! Pipeline → Tasks (run in order, fail fast)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use pipeline::{Pipeline, PipelineExecutor};
//! use std::sync::Arc;
//! use tokio::sync::Mutex;
//!
//! let pipeline = Pipeline::new(vec![Box::new(TaskA), Box::new(TaskB)]);
//! let ctx = Arc::new(Mutex::new(Context::default()));
//! let metrics = PipelineExecutor::execute(pipeline, ctx).await?;
//! println!("pipeline took {}ms", metrics.total_duration_ms);
//! ```

mod metrics;
#[allow(clippy::module_inception)]
mod pipeline;
mod task;

pub use metrics::{PipelineMetrics, TaskMetrics};
pub use pipeline::{Pipeline, PipelineExecutor};
pub use task::{BoxedTask, PipelineTask};
