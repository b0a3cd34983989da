use std::{io, process::Stdio};

use strum::Display;
use tokio::process::{ChildStderr, ChildStdout};

use crate::cmd::{Command, ExecError};

use self::child::ProcessChild;

pub mod child;
pub mod read;
pub mod status;
pub mod write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// A freshly started child with both output streams captured.
pub struct Process {
    pub child: ProcessChild,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

impl Process {
    /// Starts `command` reading from `stdin`. The child is killed if its
    /// handle is dropped before being reaped.
    pub fn spawn(command: &Command, stdin: Stdio) -> Result<Self, ExecError> {
        let mut cmd = tokio::process::Command::new(command.program());
        cmd.args(command.args());

        cmd.stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        trace!("spawning command: {:?}", cmd);

        let spawn_error = |source| ExecError::Spawn {
            command: command.command_line(),
            source,
        };

        let mut child = cmd.spawn().map_err(spawn_error)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error(not_captured(StreamKind::Stdout)))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| spawn_error(not_captured(StreamKind::Stderr)))?;

        Ok(Self {
            child: child.into(),
            stdout,
            stderr,
        })
    }
}

fn not_captured(stream: StreamKind) -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, format!("{stream} was not captured"))
}
