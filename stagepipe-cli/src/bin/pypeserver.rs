//! pypeserver - run pipelines through a long-running execution server.
//!
//! The launcher starts a copy of itself in `--serve-stdin` mode, hands it
//! the pipeline over stdin and waits. Interrupting the launcher kills the
//! server child. In `--serve-stdin` mode every stdin line is one queued
//! pipeline command.

use std::path::PathBuf;
use std::process::{ExitCode, Stdio};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use stagepipe::context::{StderrSink, StdoutSink};
use stagepipe::events::LoggingEventSink;
use stagepipe::pipeline::join_command;
use stagepipe::server::{work_queue, ExecutionServer, ServerConfig};
use stagepipe_cli::{default_registry, init_tracing};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{info, warn};

/// Run a pipeline in a separate execution server process
#[derive(Parser, Debug)]
#[command(name = "pypeserver", version, about)]
struct Cli {
    /// Serve pipelines read line by line from stdin
    #[arg(long, hide = true)]
    serve_stdin: bool,

    /// Server configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose tracing
    #[arg(short, long)]
    verbose: bool,

    /// Stages and their arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pipeline: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let outcome = if cli.serve_stdin {
        serve_stdin(&cli).await
    } else {
        launch(&cli).await
    };
    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<ServerConfig> {
    let Some(path) = path else {
        return Ok(ServerConfig::new().with_return_if_empty(true));
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
}

async fn launch(cli: &Cli) -> Result<ExitCode> {
    if cli.pipeline.is_empty() {
        bail!("no pipeline given");
    }

    let exe = std::env::current_exe().context("cannot locate pypeserver executable")?;
    let mut command = Command::new(exe);
    command.arg("--serve-stdin");
    if let Some(ref config) = cli.config {
        command.arg("--config").arg(config);
    }
    if cli.verbose {
        command.arg("--verbose");
    }
    let mut child = command
        .stdin(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .context("cannot start execution server")?;
    info!(pid = ?child.id(), "Execution server started");

    let mut stdin = child.stdin.take().context("server stdin unavailable")?;
    let line = format!("{}\n", join_command(&cli.pipeline));
    stdin.write_all(line.as_bytes()).await?;
    drop(stdin);

    tokio::select! {
        status = child.wait() => {
            let status = status?;
            Ok(if status.success() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping execution server");
            child.kill().await?;
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn serve_stdin(cli: &Cli) -> Result<ExitCode> {
    let config = load_config(cli.config.as_ref())?;
    let return_if_empty = config.return_if_empty;
    let server = ExecutionServer::new(default_registry())
        .with_config(config)
        .with_event_sink(Arc::new(LoggingEventSink::debug()));
    let (queue, mut receiver) = work_queue();

    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            queue.enqueue(line)?;
        }
        anyhow::Ok(())
    });

    let summary = server
        .serve(
            &mut receiver,
            Arc::new(StdoutSink),
            Arc::new(StderrSink),
            return_if_empty,
        )
        .await;
    reader.abort();

    info!(?summary, "Execution server done");
    Ok(if summary.failed + summary.panicked == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
