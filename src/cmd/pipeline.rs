use std::{borrow::Cow, io, process::Stdio, time::Duration};

use thiserror::Error;
use tokio::select;

use super::{
    cancel::Cancellation,
    command::{Command, CommandOption},
    delegate::{Interrupt, OutputDelegate},
    execute::ExecError,
};
use crate::{
    parse::CommandParseError,
    prelude::*,
    process::{child::ProcessChild, read::DrainSet, status::ProcessStatus, Process, StreamKind},
};

/// What a pipeline printed: the last stage's stdout, and the stderr of
/// every stage merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl PipelineOutput {
    pub fn stdout_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}

#[derive(Debug, Error)]
#[error("stage {stage} failed")]
pub struct StageFailure {
    pub stage: usize,
    pub command: String,
    #[source]
    pub error: ExecError,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("a pipeline needs at least one command")]
    Empty,
    #[error("invalid command for stage {stage}")]
    Parse {
        stage: usize,
        #[source]
        source: CommandParseError,
    },
    #[error("pipeline failed")]
    Failed {
        /// The earliest stage that failed.
        #[source]
        first: StageFailure,
        rest: Vec<StageFailure>,
        output: PipelineOutput,
    },
}

impl PipelineError {
    pub fn failures(&self) -> impl Iterator<Item = &StageFailure> {
        let (first, rest) = match self {
            Self::Failed { first, rest, .. } => (Some(first), rest.as_slice()),
            _ => (None, &[][..]),
        };

        first.into_iter().chain(rest)
    }

    pub fn output(&self) -> Option<&PipelineOutput> {
        match self {
            Self::Failed { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// Commands chained stdout-to-stdin, like `a | b | c` in a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<Command>,
}

/// Per-stage bookkeeping while a pipeline runs.
struct Stage<'a> {
    index: usize,
    command: &'a Command,
    text: String,
    /// Read end of the pipe from the previous stage, until handed to the child.
    stdin: Option<Stdio>,
    child: Option<ProcessChild>,
    status: Option<ProcessStatus>,
    /// Set when the child was still running when the run was stopped.
    terminated: bool,
    failure: Option<ExecError>,
}

impl<'a> Stage<'a> {
    fn new(index: usize, command: &'a Command) -> Self {
        Self {
            index,
            command,
            text: command.command_line(),
            stdin: None,
            child: None,
            status: None,
            terminated: false,
            failure: None,
        }
    }

    fn fail(&mut self, error: ExecError) {
        self.failure.get_or_insert(error);
    }

    fn close_input(&mut self) {
        if self.stdin.take().is_some() {
            trace!(stage = self.index, "closed input of unstarted stage");
        }
    }
}

impl Pipeline {
    pub fn new(stages: Vec<Command>) -> Result<Self, PipelineError> {
        if stages.is_empty() {
            return Err(PipelineError::Empty);
        }

        Ok(Self { stages })
    }

    /// Builds one stage per command line, applying `options` to each.
    pub fn parse<S: AsRef<str>>(
        lines: &[S],
        options: &[CommandOption],
    ) -> Result<Self, PipelineError> {
        let stages = lines
            .iter()
            .enumerate()
            .map(|(stage, line)| {
                Command::new(line.as_ref(), options)
                    .map_err(|source| PipelineError::Parse { stage, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(stages)
    }

    pub fn stages(&self) -> &[Command] {
        &self.stages
    }

    pub async fn run(&self) -> Result<PipelineOutput, PipelineError> {
        self.run_with(&Cancellation::none()).await
    }

    /// Starts every stage, wiring each one's stdout into the next one's
    /// stdin, then waits for them in order.
    ///
    /// If a stage cannot be started, no later stage is started; stages
    /// already running are left to finish and are reaped. Every failure is
    /// reported, the earliest stage first.
    pub async fn run_with(&self, cancel: &Cancellation) -> Result<PipelineOutput, PipelineError> {
        let last = self.stages.len() - 1;
        let mut stages = self
            .stages
            .iter()
            .enumerate()
            .map(|(index, command)| Stage::new(index, command))
            .collect::<Vec<_>>();

        let (tx, rx) = unbounded_channel();
        let mut drains = DrainSet::default();

        for index in 0..stages.len() {
            let stage = &mut stages[index];
            let stdin = stage.stdin.take().unwrap_or_else(Stdio::null);

            trace!(stage = index, command = %stage.text, "starting pipeline stage");

            let Process {
                child,
                stdout,
                stderr,
            } = match Process::spawn(stage.command, stdin) {
                Ok(process) => process,
                Err(err) => {
                    stage.fail(err);
                    break;
                }
            };

            stage.child = Some(child);
            drains.spawn(index, StreamKind::Stderr, stderr, tx.clone());

            if index == last {
                drains.spawn(index, StreamKind::Stdout, stdout, tx.clone());
                continue;
            }

            // the child now holds the only write end, so its exit is what
            // closes the next stage's input
            match stdout.try_into() {
                Ok(pipe) => stages[index + 1].stdin = Some(pipe),
                Err(source) => {
                    stage.fail(ExecError::Spawn {
                        command: stage.text.clone(),
                        source,
                    });
                    break;
                }
            }
        }

        for stage in stages.iter_mut().filter(|stage| stage.child.is_none()) {
            stage.close_input();
        }
        drop(tx);

        let live = self.stages.iter().map(Command::streams_output).collect();
        let mut delegate = OutputDelegate::new(rx, live, true);

        let mut cancelled = None;
        let mut interrupted = match delegate.collect(cancel).await {
            Ok(()) => {
                drains.join().await;
                false
            }
            Err(interrupt) => {
                drains.abort().await;
                match interrupt {
                    Interrupt::Stream {
                        stage,
                        stream,
                        source,
                    } => {
                        let text = stages[stage].text.clone();
                        stages[stage].fail(ExecError::Stream {
                            command: text,
                            stream,
                            source,
                        });
                    }
                    Interrupt::Cancel(reason) => cancelled = Some(reason),
                }
                true
            }
        };

        // every started stage is reaped exactly once, in order
        let grace = cancel.grace();
        for stage in stages.iter_mut() {
            let Some(child) = stage.child.as_mut() else {
                continue;
            };

            let status = if interrupted {
                stop(child, grace, &mut stage.terminated).await
            } else {
                select! {
                    status = child.wait() => status,
                    reason = cancel.cancelled() => {
                        warn!(?reason, "stopping pipeline");
                        cancelled = Some(reason);
                        interrupted = true;
                        stop(child, grace, &mut stage.terminated).await
                    }
                }
            };

            match status {
                Ok(status) => {
                    debug!(stage = stage.index, command = %stage.text, %status, "pipeline stage exited");
                    stage.status = Some(status);
                }
                Err(source) => {
                    let command = stage.text.clone();
                    stage.fail(ExecError::Wait { command, source });
                }
            }
        }

        let mut transcript = delegate.finish();
        let mut failures = Vec::new();

        for mut stage in stages {
            let output = transcript.take_stage(stage.index);

            if let Some(status) = stage.status.filter(|status| !status.success()) {
                // a stage that exited on its own keeps its real status
                let error = match cancelled.filter(|_| stage.terminated) {
                    Some(reason) => reason.into_error(stage.text.clone()),
                    None => ExecError::Exit {
                        command: stage.text.clone(),
                        code: status.code(),
                        output,
                    },
                };
                stage.fail(error);
            }

            if let Some(error) = stage.failure {
                failures.push(StageFailure {
                    stage: stage.index,
                    command: stage.text,
                    error,
                });
            }
        }

        let output = PipelineOutput {
            stdout: transcript.stdout,
            stderr: transcript.stderr,
        };

        let mut failures = failures.into_iter();
        match failures.next() {
            None => Ok(output),
            Some(first) => Err(PipelineError::Failed {
                first,
                rest: failures.collect(),
                output,
            }),
        }
    }
}

/// Reaps a child that already exited, or terminates one still running.
async fn stop(
    child: &mut ProcessChild,
    grace: Duration,
    terminated: &mut bool,
) -> io::Result<ProcessStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }

    *terminated = true;
    child.terminate(grace).await
}

pub async fn run_pipeline(commands: Vec<Command>) -> Result<PipelineOutput, PipelineError> {
    Pipeline::new(commands)?.run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pipeline_is_rejected() {
        assert!(matches!(Pipeline::new(Vec::new()), Err(PipelineError::Empty)));
    }

    #[test]
    fn parse_reports_bad_stage() {
        let err = Pipeline::parse(&["echo a", "grep 'b"], &[]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Parse {
                stage: 1,
                source: CommandParseError::UnterminatedSingleQuote
            }
        ));
    }

    #[test]
    fn parse_applies_options_to_every_stage() {
        let pipeline = Pipeline::parse(&["echo a", "cat"], &[CommandOption::StreamOutput]).unwrap();
        assert_eq!(pipeline.stages().len(), 2);
        assert!(pipeline.stages().iter().all(Command::streams_output));
    }
}
