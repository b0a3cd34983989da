use std::{fmt, os::unix::process::ExitStatusExt, process::ExitStatus};

use nix::sys::signal::Signal;

/// How a child process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessStatus(ExitStatus);

impl From<ExitStatus> for ProcessStatus {
    fn from(value: ExitStatus) -> Self {
        Self(value)
    }
}

impl ProcessStatus {
    pub fn success(&self) -> bool {
        self.0.success()
    }

    /// The numeric exit code. A process killed by a signal reports
    /// `128 + signo`, as shells do.
    pub fn code(&self) -> i32 {
        match (self.0.code(), self.0.signal()) {
            (Some(code), _) => code,
            (None, Some(signo)) => 128 + signo,
            (None, None) => -1,
        }
    }

    pub fn signal(&self) -> Option<Signal> {
        self.0.signal().and_then(|signo| Signal::try_from(signo).ok())
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.signal() {
            Some(signal) => write!(f, "killed by {signal}"),
            None => write!(f, "exit code {}", self.code()),
        }
    }
}
