//! Spawning resolved pipelines and tracking them afterwards.

pub mod handle;
pub mod plan;

pub use handle::{Handle, Output, PipelineStatus, ProcessExit};
pub use plan::{ExecutionPlan, Mode, ProcessDescriptor, StdinSource, StdoutSink};
