use std::{io, pin::Pin, task};

use tokio::io::{AsyncWrite, Stderr, Stdout};

use super::StreamKind;

/// Where live-streamed child output goes: our own stdout or stderr.
pub enum LiveWrite {
    Stdout(Stdout),
    Stderr(Stderr),
}

impl From<StreamKind> for LiveWrite {
    fn from(value: StreamKind) -> Self {
        match value {
            StreamKind::Stdout => Self::Stdout(tokio::io::stdout()),
            StreamKind::Stderr => Self::Stderr(tokio::io::stderr()),
        }
    }
}

impl AsyncWrite for LiveWrite {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
        buf: &[u8],
    ) -> task::Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Stdout(stdout) => Pin::new(stdout).poll_write(cx, buf),
            Self::Stderr(stderr) => Pin::new(stderr).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> task::Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Stdout(stdout) => Pin::new(stdout).poll_flush(cx),
            Self::Stderr(stderr) => Pin::new(stderr).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Stdout(stdout) => Pin::new(stdout).poll_shutdown(cx),
            Self::Stderr(stderr) => Pin::new(stderr).poll_shutdown(cx),
        }
    }
}
