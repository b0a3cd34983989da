use std::io;

use tokio::{io::AsyncWriteExt, select};

use super::cancel::{CancelReason, Cancellation};
use crate::{
    prelude::*,
    process::{read::ReadMessage, write::LiveWrite, StreamKind},
};

/// Why collection stopped before every stream reached EOF.
#[derive(Debug)]
pub enum Interrupt {
    Stream {
        stage: usize,
        stream: StreamKind,
        source: io::Error,
    },
    Cancel(CancelReason),
}

/// Everything read from the child streams of one run.
#[derive(Debug, Default)]
pub struct Transcript {
    /// Stdout lines of every stage that is not streamed, when collected split.
    pub stdout: Vec<u8>,
    /// Stderr lines of every stage that is not streamed, when collected split.
    pub stderr: Vec<u8>,
    /// Each stage's lines from both streams, in arrival order.
    pub stages: Vec<Vec<u8>>,
}

impl Transcript {
    pub fn take_stage(&mut self, stage: usize) -> Vec<u8> {
        self.stages
            .get_mut(stage)
            .map(std::mem::take)
            .unwrap_or_default()
    }
}

/// The single writer of a run's output buffers. Reader tasks send it lines;
/// it records them and echoes them live for stages that stream output.
pub struct OutputDelegate {
    rx: Receiver<ReadMessage>,
    live: Vec<bool>,
    split: bool,
    transcript: Transcript,
    stdout: LiveWrite,
    stderr: LiveWrite,
}

impl OutputDelegate {
    /// `live` holds one entry per stage. With `split` set, lines of stages
    /// that are not live are also sorted into the transcript's stdout and
    /// stderr buffers.
    pub fn new(rx: Receiver<ReadMessage>, live: Vec<bool>, split: bool) -> Self {
        let transcript = Transcript {
            stages: vec![Vec::new(); live.len()],
            ..Default::default()
        };

        Self {
            rx,
            live,
            split,
            transcript,
            stdout: LiveWrite::from(StreamKind::Stdout),
            stderr: LiveWrite::from(StreamKind::Stderr),
        }
    }

    /// Receives lines until every reader has hung up. Stops at the first
    /// read failure or when `cancel` fires.
    pub async fn collect(&mut self, cancel: &Cancellation) -> Result<(), Interrupt> {
        loop {
            select! {
                msg = self.rx.recv() => match msg {
                    Some(ReadMessage::Line { stage, stream, data }) => {
                        self.accept(stage, stream, data).await;
                    }
                    Some(ReadMessage::Failed { stage, stream, error }) => {
                        return Err(Interrupt::Stream { stage, stream, source: error });
                    }
                    None => return Ok(()),
                },
                reason = cancel.cancelled() => return Err(Interrupt::Cancel(reason)),
            }
        }
    }

    async fn accept(&mut self, stage: usize, stream: StreamKind, data: Vec<u8>) {
        let live = self.live.get(stage).copied().unwrap_or(false);

        if live {
            let sink = match stream {
                StreamKind::Stdout => &mut self.stdout,
                StreamKind::Stderr => &mut self.stderr,
            };

            let res = match sink.write_all(&data).await {
                Ok(()) => sink.flush().await,
                Err(err) => Err(err),
            };

            if let Err(err) = res {
                warn!(stage, %stream, "failed to stream output: {err}");
            }
        }

        // live lines are already out and must not be printed twice
        if self.split && !live {
            match stream {
                StreamKind::Stdout => self.transcript.stdout.extend_from_slice(&data),
                StreamKind::Stderr => self.transcript.stderr.extend_from_slice(&data),
            }
        }

        if let Some(buf) = self.transcript.stages.get_mut(stage) {
            buf.extend_from_slice(&data);
        }
    }

    pub fn finish(self) -> Transcript {
        self.transcript
    }
}
