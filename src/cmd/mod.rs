pub mod cancel;
pub mod command;
pub mod delegate;
pub mod execute;
pub mod pipeline;

pub use self::{
    cancel::{CancelHandle, CancelReason, Cancellation},
    command::{Command, CommandOption},
    execute::{ExecError, RunOutput},
    pipeline::{run_pipeline, Pipeline, PipelineError, PipelineOutput, StageFailure},
};

/// Tokenizes `cmd` and applies `options`. Fails without starting anything
/// if the line is malformed or empty.
pub fn build_command(cmd: &str, options: &[CommandOption]) -> Result<Command, ExecError> {
    Ok(Command::new(cmd, options)?)
}

pub async fn run(command: &Command) -> Result<RunOutput, ExecError> {
    command.run().await
}
