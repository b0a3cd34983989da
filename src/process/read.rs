use std::io;

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    task::JoinHandle,
};

use super::StreamKind;
use crate::prelude::*;

#[derive(Debug)]
pub enum ReadMessage {
    /// One line, including its trailing newline if it had one.
    Line {
        stage: usize,
        stream: StreamKind,
        data: Vec<u8>,
    },
    Failed {
        stage: usize,
        stream: StreamKind,
        error: io::Error,
    },
}

/// The reader tasks draining child output streams. They must all be joined
/// (or aborted) before the run that spawned them returns.
#[derive(Default)]
pub struct DrainSet {
    handles: Vec<JoinHandle<()>>,
}

impl DrainSet {
    pub fn spawn<R>(&mut self, stage: usize, stream: StreamKind, reader: R, tx: Sender<ReadMessage>)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        self.handles
            .push(tokio::task::spawn(drain(stage, stream, reader, tx)));
    }

    pub async fn join(self) {
        for handle in self.handles {
            if let Err(err) = handle.await {
                warn!("stream reader task failed: {err}");
            }
        }
    }

    pub async fn abort(self) {
        for handle in &self.handles {
            handle.abort();
        }

        for handle in self.handles {
            match handle.await {
                Err(err) if !err.is_cancelled() => warn!("stream reader task failed: {err}"),
                _ => {}
            }
        }
    }
}

async fn drain<R>(stage: usize, stream: StreamKind, reader: R, tx: Sender<ReadMessage>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);

    loop {
        let mut data = Vec::new();

        let msg = match reader.read_until(b'\n', &mut data).await {
            Ok(0) => break,
            Ok(_) => ReadMessage::Line {
                stage,
                stream,
                data,
            },
            Err(error) => {
                // the coordinator aborts the run on the first failure
                let _ = tx.send(ReadMessage::Failed {
                    stage,
                    stream,
                    error,
                });
                break;
            }
        };

        if tx.send(msg).is_err() {
            break;
        }
    }

    trace!(stage, %stream, "stream drained");
}
