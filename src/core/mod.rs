//! Mock federation core: algorithm interface, task records, orchestration and metrics

pub mod algorithm;
pub mod metrics;
pub mod orchestrator;
pub mod task;

pub use algorithm::{Algorithm, AlgorithmError, SubtaskDispatcher, TaskContext, TaskInput};
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorError};
pub use task::{RunRecord, RunStatus, TaskRecord, TaskRequest, TaskStatus};
