//! pype - run a chain of stages.
//!
//! ```text
//! pype [--nolog] [--noauto] [--query] stage args [--pipe stage args]...
//! pype --command "stage args --pipe stage args"
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use stagepipe::context::{ExecutionContext, RunnerOptions, StdoutSink};
use stagepipe::events::LoggingEventSink;
use stagepipe::pipeline::{split_command, ChainRunner, PipeOptions};
use stagepipe_cli::{default_registry, init_tracing};
use tracing::debug;

/// Run a pipeline of stages separated by --pipe
#[derive(Parser, Debug)]
#[command(name = "pype", version, about)]
struct Cli {
    /// Do not write the run log
    #[arg(long)]
    nolog: bool,

    /// Disable implicit piping between stages
    #[arg(long)]
    noauto: bool,

    /// List the available stages and exit
    #[arg(long)]
    query: bool,

    /// Pipeline given as a single string
    #[arg(short, long, conflicts_with = "pipeline")]
    command: Option<String>,

    /// Enable verbose tracing
    #[arg(short, long)]
    verbose: bool,

    /// Stages and their arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pipeline: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let tokens = match cli.command {
        Some(ref command) => split_command(command).context("cannot split --command")?,
        None => cli.pipeline.clone(),
    };
    let (pipe_options, tokens) = PipeOptions::extract(&tokens);
    let registry = default_registry();

    if cli.query || pipe_options.query {
        for name in registry.names() {
            println!("{name}");
        }
        return Ok(ExitCode::SUCCESS);
    }
    if pipe_options.help || tokens.is_empty() {
        Cli::command().print_help()?;
        println!();
        return Ok(ExitCode::SUCCESS);
    }

    let options = RunnerOptions::new()
        .with_log(pipe_options.log_on && !cli.nolog)
        .with_auto_pipe(pipe_options.auto_pipe && !cli.noauto);
    debug!(?options, stages = ?tokens, "Starting pype");

    let ctx = ExecutionContext::new()
        .with_options(options)
        .with_output(Arc::new(StdoutSink))
        .with_input(Box::new(std::io::BufReader::new(std::io::stdin())))
        .with_last_visited_path(std::env::current_dir()?)
        .with_event_sink(Arc::new(LoggingEventSink::debug()));
    let runner = ChainRunner::new(registry, ctx);
    runner.run_tokens(&tokens)?;
    Ok(ExitCode::SUCCESS)
}
