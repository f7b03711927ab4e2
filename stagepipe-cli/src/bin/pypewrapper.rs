//! pypewrapper - generate a descriptor and a shell stub for a chain.
//!
//! ```text
//! pypewrapper [--mode m] [--title t] [--description d] [--contributor c]
//!             [--modulefile path] --pype stage -opt Name@channel [--pipe ...]
//! ```
//!
//! Everything after `--pype` is the chain body. A body argument written
//! `Name@channel` exposes the preceding option as `--Name` on the stub.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use stagepipe::wrapper::{WrapperGenerator, WrapperOptions, DEFAULT_MODE};
use stagepipe_cli::{command_line, default_registry, init_tracing};

const PYPE_FLAG: &str = "--pype";

/// Generate a parameter descriptor and command-line stub for a pipeline
#[derive(Parser, Debug)]
#[command(
    name = "pypewrapper",
    version,
    about,
    after_help = "Everything after --pype is the pipeline; annotate exposed values as Name@channel."
)]
struct Cli {
    /// Descriptor dialect
    #[arg(long, default_value = DEFAULT_MODE)]
    mode: String,

    /// Module title
    #[arg(long, default_value = "")]
    title: String,

    /// Module description
    #[arg(long, default_value = "")]
    description: String,

    /// Module contributor
    #[arg(long, default_value = "")]
    contributor: String,

    /// File receiving the generated stub (stdout when omitted)
    #[arg(long)]
    modulefile: Option<PathBuf>,

    /// Enable verbose tracing
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (head, body) = match args.iter().position(|a| a == PYPE_FLAG) {
        Some(index) => (&args[..index], Some(&args[index + 1..])),
        None => (&args[..], None),
    };

    let cli = Cli::parse_from(std::iter::once("pypewrapper".to_string()).chain(head.iter().cloned()));
    init_tracing(cli.verbose);

    let Some(body) = body else {
        let _ = Cli::command().print_help();
        println!("\nNothing to generate: give the pipeline after {PYPE_FLAG}.");
        return ExitCode::SUCCESS;
    };

    match run(&cli, body, &command_line("pypewrapper", &args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, body: &[String], invocation: &str) -> Result<()> {
    let options = WrapperOptions::new()
        .with_mode(cli.mode.as_str())
        .with_title(cli.title.as_str())
        .with_description(cli.description.as_str())
        .with_contributor(cli.contributor.as_str());
    let generator = WrapperGenerator::new(default_registry(), options);
    let wrapper = generator
        .generate(body, invocation)
        .context("cannot generate wrapper")?;

    match cli.modulefile {
        Some(ref path) => wrapper
            .write_module(path)
            .with_context(|| format!("cannot write {}", path.display()))?,
        None => print!("{}", wrapper.source),
    }
    Ok(())
}
