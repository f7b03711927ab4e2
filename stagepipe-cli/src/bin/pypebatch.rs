//! pypebatch - run one stage over every entry of a directory.
//!
//! Arguments written `[]` are replaced by `directory/<entry>`; `[stem]`,
//! `[extension]`, `[upper]`, `[lower]` and `[name]` use that attribute of
//! the entry instead.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use stagepipe::batch::BatchRunner;
use stagepipe::context::{ExecutionContext, StdoutSink};
use stagepipe_cli::{default_registry, init_tracing};

/// Run a stage once per directory entry
#[derive(Parser, Debug)]
#[command(
    name = "pypebatch",
    version,
    about,
    override_usage = "pypebatch -d directory stageName stageArguments [\"[attribute]\"]"
)]
struct Cli {
    /// Directory whose entries are processed
    #[arg(short, long, default_value = ".")]
    directory: PathBuf,

    /// Do not write the run log
    #[arg(long)]
    nolog: bool,

    /// Enable verbose tracing
    #[arg(short, long)]
    verbose: bool,

    /// Stage to run
    stage: String,

    /// Stage arguments, with `[]` placeholders
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    arguments: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let ctx = ExecutionContext::new()
        .with_log(!cli.nolog)
        .with_output(Arc::new(StdoutSink));
    let batch = BatchRunner::new(default_registry(), ctx);

    let summary = batch
        .run_over_directory(&cli.stage, &cli.arguments, &cli.directory)
        .with_context(|| format!("batch over {} failed", cli.directory.display()))?;

    println!(
        "{} of {} entries processed successfully",
        summary.succeeded(),
        summary.invocations.len()
    );
    Ok(if summary.failed() == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
