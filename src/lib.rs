#[macro_use]
extern crate tracing;

pub mod cmd;
pub mod config;
pub mod parse;
pub mod prelude;
pub mod process;

pub use crate::{
    cmd::{
        build_command, run, run_pipeline, CancelHandle, Cancellation, Command, CommandOption,
        ExecError, Pipeline, PipelineError, PipelineOutput, RunOutput,
    },
    config::ExecConfig,
    parse::{split_command, CommandParseError},
};
