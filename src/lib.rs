//! matrixci - a CI pipeline orchestrator that runs a step template across a build matrix

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod runner;

// Re-export commonly used types
pub use crate::core::config::PipelineConfig;
pub use crate::core::{
    ExecutionStatus, Job, JobResult, JobStatus, Matrix, MatrixCell, Pipeline, PipelineResult,
    SecretStore, Step, StepResult, StepStatus, Trigger,
};
pub use crate::execution::{ExecutionEngine, ExecutionEvent, SchedulingStrategy};
pub use crate::runner::{RunnerConfig, RunnerError, ShellRunner, StepInvocation, StepOutput, StepRunner};
