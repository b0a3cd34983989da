use std::{borrow::Cow, io, process::Stdio, time::Duration};

use thiserror::Error;
use tokio::select;

use super::{
    cancel::Cancellation,
    command::Command,
    delegate::{Interrupt, OutputDelegate},
};
use crate::{
    parse::CommandParseError,
    prelude::*,
    process::{read::DrainSet, status::ProcessStatus, Process, StreamKind},
};

#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Parse(#[from] CommandParseError),
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to read {stream} of `{command}`: {source}")]
    Stream {
        command: String,
        stream: StreamKind,
        #[source]
        source: io::Error,
    },
    #[error("failed to wait for `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("{command} failed with status [{code}], output: {}", String::from_utf8_lossy(.output))]
    Exit {
        command: String,
        code: i32,
        output: Vec<u8>,
    },
    #[error("`{command}` was cancelled")]
    Cancelled { command: String },
    #[error("`{command}` timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },
}

impl ExecError {
    /// The command text, for every variant that concerns a single command.
    pub fn command(&self) -> Option<&str> {
        match self {
            Self::Parse(_) => None,
            Self::Spawn { command, .. }
            | Self::Stream { command, .. }
            | Self::Wait { command, .. }
            | Self::Exit { command, .. }
            | Self::Cancelled { command }
            | Self::TimedOut { command, .. } => Some(command),
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Exit { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Output captured before a non-zero exit.
    pub fn output(&self) -> Option<&[u8]> {
        match self {
            Self::Exit { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// A successful run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub status: ProcessStatus,
    /// Interleaved stdout and stderr lines. Empty when the command streamed
    /// its output live.
    pub output: Vec<u8>,
}

impl RunOutput {
    pub fn code(&self) -> i32 {
        self.status.code()
    }

    pub fn output_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.output)
    }
}

impl Command {
    pub async fn run(&self) -> Result<RunOutput, ExecError> {
        self.run_with(&Cancellation::none()).await
    }

    /// Runs the command to completion, draining stdout and stderr line by
    /// line while it runs. A non-zero exit becomes [`ExecError::Exit`]
    /// carrying everything the command printed.
    pub async fn run_with(&self, cancel: &Cancellation) -> Result<RunOutput, ExecError> {
        let command = self.command_line();

        let Process {
            mut child,
            stdout,
            stderr,
        } = Process::spawn(self, Stdio::null())?;

        let (tx, rx) = unbounded_channel();
        let mut drains = DrainSet::default();
        drains.spawn(0, StreamKind::Stdout, stdout, tx.clone());
        drains.spawn(0, StreamKind::Stderr, stderr, tx);

        // both streams must reach EOF before we wait, or a child blocked on a
        // full pipe would never exit
        let mut delegate = OutputDelegate::new(rx, vec![self.streams_output()], false);
        if let Err(interrupt) = delegate.collect(cancel).await {
            drains.abort().await;
            if let Err(err) = child.terminate(cancel.grace()).await {
                warn!(%command, "failed to reap interrupted command: {err}");
            }
            return Err(interrupt.into_error(command));
        }
        drains.join().await;

        let status = select! {
            status = child.wait() => status.map_err(|source| ExecError::Wait {
                command: command.clone(),
                source,
            })?,
            reason = cancel.cancelled() => {
                warn!(%command, ?reason, "stopping command");
                if let Err(err) = child.terminate(cancel.grace()).await {
                    warn!(%command, "failed to reap interrupted command: {err}");
                }
                return Err(reason.into_error(command));
            }
        };

        let output = delegate.finish().take_stage(0);

        if !status.success() {
            debug!(%command, %status, "command failed");
            return Err(ExecError::Exit {
                command,
                code: status.code(),
                output,
            });
        }

        debug!(%command, "command succeeded");

        Ok(RunOutput {
            status,
            output: if self.streams_output() {
                Vec::new()
            } else {
                output
            },
        })
    }
}

impl Interrupt {
    pub fn into_error(self, command: String) -> ExecError {
        match self {
            Self::Stream { stream, source, .. } => ExecError::Stream {
                command,
                stream,
                source,
            },
            Self::Cancel(reason) => reason.into_error(command),
        }
    }
}
