//! Step runners - the boundary to external tools

pub mod client;
pub mod response;
pub mod subprocess_client;

use async_trait::async_trait;
pub use client::RunnerConfig;
pub use response::{RunnerError, StepInvocation, StepOutput};
pub use subprocess_client::ShellRunner;

/// Trait for step execution - allows for different implementations
///
/// A runner only reports how the tool exited; it never interprets output.
/// A non-zero exit is an `Ok` output, `Err` is reserved for failing to run
/// the tool at all.
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Invoke the tool described by `invocation` and wait for it to exit
    async fn run(&self, invocation: &StepInvocation) -> Result<StepOutput, RunnerError>;
}
