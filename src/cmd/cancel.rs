use std::{future::pending, time::Duration};

use tokio::{
    select,
    sync::watch,
    time::{sleep_until, Instant},
};

use super::execute::ExecError;

pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

/// Bounds how long a run may take. A run stops early when its
/// [`CancelHandle`] fires or its deadline passes; running children get
/// SIGTERM, then SIGKILL after the grace period.
#[derive(Debug, Clone)]
pub struct Cancellation {
    signal: Option<watch::Receiver<bool>>,
    deadline: Option<(Instant, Duration)>,
    grace: Duration,
}

#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Cancelled,
    TimedOut(Duration),
}

impl CancelReason {
    pub fn into_error(self, command: String) -> ExecError {
        match self {
            Self::Cancelled => ExecError::Cancelled { command },
            Self::TimedOut(timeout) => ExecError::TimedOut { command, timeout },
        }
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::none()
    }
}

impl Cancellation {
    /// Never cancels.
    pub fn none() -> Self {
        Self {
            signal: None,
            deadline: None,
            grace: DEFAULT_KILL_GRACE,
        }
    }

    pub fn new() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);

        let cancel = Self {
            signal: Some(rx),
            ..Self::none()
        };

        (cancel, CancelHandle(tx))
    }

    /// Cancels once `timeout` has elapsed from now.
    pub fn timeout(timeout: Duration) -> Self {
        Self::none().with_timeout(timeout)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some((Instant::now() + timeout, timeout));
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Resolves when the run should stop. Pending forever for
    /// [`Cancellation::none`].
    pub async fn cancelled(&self) -> CancelReason {
        let signalled = async {
            if let Some(rx) = &self.signal {
                let mut rx = rx.clone();
                loop {
                    if *rx.borrow_and_update() {
                        return;
                    }
                    if rx.changed().await.is_err() {
                        break;
                    }
                }
            }
            // handle dropped without cancelling
            pending::<()>().await
        };

        let expired = async {
            match self.deadline {
                Some((at, timeout)) => {
                    sleep_until(at).await;
                    timeout
                }
                None => pending().await,
            }
        };

        select! {
            _ = signalled => CancelReason::Cancelled,
            timeout = expired => CancelReason::TimedOut(timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handle_cancels() {
        let (cancel, handle) = Cancellation::new();
        handle.cancel();
        assert_eq!(cancel.cancelled().await, CancelReason::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expires() {
        let cancel = Cancellation::timeout(Duration::from_secs(5));
        assert_eq!(
            cancel.cancelled().await,
            CancelReason::TimedOut(Duration::from_secs(5))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn none_never_fires() {
        let cancel = Cancellation::none();
        let res = tokio::time::timeout(Duration::from_secs(60), cancel.cancelled()).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn dropped_handle_does_not_cancel() {
        let (cancel, handle) = Cancellation::new();
        drop(handle);
        let res = tokio::time::timeout(Duration::from_millis(50), cancel.cancelled()).await;
        assert!(res.is_err());
    }
}
