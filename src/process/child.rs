use std::{io, time::Duration};

use nix::{
    sys::signal::{kill, Signal},
    unistd::Pid,
};
use tokio::process::Child;

use super::status::ProcessStatus;

/// A started child process. Whoever holds it is responsible for reaping it.
pub struct ProcessChild {
    inner: Child,
}

impl From<Child> for ProcessChild {
    fn from(value: Child) -> Self {
        Self { inner: value }
    }
}

impl ProcessChild {
    pub fn id(&self) -> Option<u32> {
        self.inner.id()
    }

    pub async fn wait(&mut self) -> io::Result<ProcessStatus> {
        self.inner.wait().await.map(Into::into)
    }

    /// Reaps the child if it has already exited.
    pub fn try_wait(&mut self) -> io::Result<Option<ProcessStatus>> {
        self.inner.try_wait().map(|status| status.map(Into::into))
    }

    pub fn signal(&self, signal: Signal) -> io::Result<()> {
        let id = self.inner.id().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "Child exited unexpectedly")
        })? as i32;

        kill(Pid::from_raw(id), signal)?;

        Ok(())
    }

    /// Asks the child to stop with SIGTERM, then kills it if it is still
    /// alive once `grace` has passed. Returns the reaped status.
    pub async fn terminate(&mut self, grace: Duration) -> io::Result<ProcessStatus> {
        if let Some(status) = self.inner.try_wait()? {
            return Ok(status.into());
        }

        if let Err(err) = self.signal(Signal::SIGTERM) {
            debug!("failed to send SIGTERM: {err}");
        }

        match tokio::time::timeout(grace, self.inner.wait()).await {
            Ok(status) => status.map(Into::into),
            Err(_) => {
                trace!(pid = ?self.id(), "child ignored SIGTERM, killing");
                self.inner.kill().await?;
                self.wait().await
            }
        }
    }
}
