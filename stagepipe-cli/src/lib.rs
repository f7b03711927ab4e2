//! Shared setup for the stagepipe command-line front ends.

use std::sync::Arc;

use stagepipe::stages::StageRegistry;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `verbose` selects `debug` over `warn`.
/// Diagnostics go to stderr so stdout carries only the run log.
pub fn init_tracing(verbose: bool) {
    let fallback = if verbose { "stagepipe=debug,info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

/// The registry every front end resolves stages from.
#[must_use]
pub fn default_registry() -> Arc<StageRegistry> {
    Arc::new(StageRegistry::with_builtins())
}

/// Reassembles argv into a command line for display.
#[must_use]
pub fn command_line<S: AsRef<str>>(program: &str, args: &[S]) -> String {
    let mut tokens = vec![program.to_string()];
    tokens.extend(args.iter().map(|a| a.as_ref().to_string()));
    stagepipe::pipeline::join_command(&tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_has_builtins() {
        assert!(default_registry().contains("textreader"));
    }

    #[test]
    fn test_command_line_quotes_spaces() {
        let line = command_line("pypewrapper", &["--title", "My Module"]);
        assert_eq!(line, "pypewrapper --title \"My Module\"");
    }
}
