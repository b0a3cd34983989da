use std::{io, path::PathBuf, process::ExitCode};

use argh::FromArgs;
use color_eyre::{eyre::bail, Result};
use pipekit::{Cancellation, Command, ExecConfig, ExecError, Pipeline, PipelineError};
use tokio::io::{stderr, stdout, AsyncWriteExt};
use tracing_subscriber::prelude::*;

#[macro_use]
extern crate tracing;

#[derive(FromArgs)]
/// Run external programs. Several commands are chained like a shell pipeline.
struct Args {
    #[argh(switch)]
    /// print each command line before running it
    echo: bool,

    #[argh(switch)]
    /// write command output as it arrives instead of buffering it
    stream: bool,

    #[argh(option)]
    /// stop the commands after this many seconds
    timeout: Option<u64>,

    #[argh(option)]
    /// path to a TOML configuration file
    config: Option<PathBuf>,

    #[argh(positional, greedy)]
    /// command lines; each one becomes a pipeline stage
    commands: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();

    let args: Args = argh::from_env();

    let mut config = ExecConfig::load(args.config.as_deref())?.apply_env()?;
    config.echo_commands |= args.echo;
    config.stream_output |= args.stream;
    if args.timeout.is_some() {
        config.timeout_secs = args.timeout;
    }

    let (writer, _guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(
        &config.log_dir,
        "pipekit.log",
    ));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(writer))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_error::ErrorLayer::default())
        .init();

    color_eyre::install()?;

    if args.commands.is_empty() {
        bail!("no command given");
    }

    let (cancel, handle) = Cancellation::new();
    let cancel = config.bound(cancel);

    tokio::task::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            handle.cancel();
        }
    });

    let options = config.options();

    if let [line] = args.commands.as_slice() {
        let command = Command::new(line, &options)?;

        trace!(
            %command,
            echo = command.echoes_command(),
            stream = command.streams_output(),
            "running command"
        );

        return match command.run_with(&cancel).await {
            Ok(output) => {
                emit(&output.output, &[]).await?;
                Ok(ExitCode::SUCCESS)
            }
            Err(ExecError::Exit { code, output, .. }) => {
                error!(%command, code, "command failed");
                // streamed output has been written already
                if !command.streams_output() {
                    emit(&[], &output).await?;
                }
                Ok(exit_code(code))
            }
            Err(err) => Err(err.into()),
        };
    }

    let pipeline = Pipeline::parse(&args.commands, &options)?;

    trace!(stages = pipeline.stages().len(), "running pipeline");

    match pipeline.run_with(&cancel).await {
        Ok(output) => {
            emit(&output.stdout, &output.stderr).await?;
            Ok(ExitCode::SUCCESS)
        }
        Err(PipelineError::Failed { first, rest, output }) => {
            emit(&output.stdout, &output.stderr).await?;

            for failure in std::iter::once(&first).chain(&rest) {
                error!(stage = failure.stage, command = %failure.command, "{}", failure.error);
            }

            match first.error.exit_code() {
                Some(code) => Ok(exit_code(code)),
                None => Err(first.into()),
            }
        }
        Err(err) => Err(err.into()),
    }
}

async fn emit(out: &[u8], err: &[u8]) -> io::Result<()> {
    let mut out_sink = stdout();
    out_sink.write_all(out).await?;
    out_sink.flush().await?;

    let mut err_sink = stderr();
    err_sink.write_all(err).await?;
    err_sink.flush().await
}

fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map(ExitCode::from).unwrap_or(ExitCode::FAILURE)
}
