//! Batch fan-out: run one stage once per directory entry.
//!
//! Arguments of the form `[]` or `[attr]` are placeholders replaced per
//! entry with `directory/<entry>` or `directory/<attr of entry>`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::context::ExecutionContext;
use crate::errors::{PypeError, TokenizeError};
use crate::pipeline::ChainRunner;
use crate::stages::StageRegistry;

/// Entry attribute a placeholder expands to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryAttribute {
    /// The full entry name (`[]` or `[name]`).
    Name,
    /// File name without its extension.
    Stem,
    /// Extension without the dot.
    Extension,
    /// Entry name in upper case.
    Upper,
    /// Entry name in lower case.
    Lower,
}

impl EntryAttribute {
    /// Parses the text between the brackets.
    pub fn parse(pattern: &str) -> Result<Self, TokenizeError> {
        match pattern {
            "" | "name" => Ok(Self::Name),
            "stem" => Ok(Self::Stem),
            "extension" => Ok(Self::Extension),
            "upper" => Ok(Self::Upper),
            "lower" => Ok(Self::Lower),
            other => Err(TokenizeError::new(format!(
                "unknown placeholder attribute '[{other}]'"
            ))),
        }
    }

    /// Applies the attribute to an entry name.
    #[must_use]
    pub fn apply(self, entry: &str) -> String {
        let path = Path::new(entry);
        match self {
            Self::Name => entry.to_string(),
            Self::Stem => path
                .file_stem()
                .map_or_else(|| entry.to_string(), |s| s.to_string_lossy().into_owned()),
            Self::Extension => path
                .extension()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Self::Upper => entry.to_uppercase(),
            Self::Lower => entry.to_lowercase(),
        }
    }
}

fn placeholder(token: &str) -> Option<&str> {
    token
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
}

/// Replaces every placeholder in `arguments` for one directory entry.
pub fn substitute_placeholders(
    arguments: &[String],
    directory: &Path,
    entry: &str,
) -> Result<Vec<String>, TokenizeError> {
    arguments
        .iter()
        .map(|arg| match placeholder(arg) {
            None => Ok(arg.clone()),
            Some(pattern) => {
                let value = EntryAttribute::parse(pattern)?.apply(entry);
                Ok(directory.join(value).to_string_lossy().into_owned())
            }
        })
        .collect()
}

/// Outcome of one stage invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchInvocation {
    /// The directory entry name.
    pub entry: String,
    /// Arguments after substitution.
    pub arguments: Vec<String>,
    /// Error text if the invocation failed.
    pub error: Option<String>,
}

impl BatchInvocation {
    /// Returns true if the invocation completed.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of a whole batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// One record per directory entry, in processing order.
    pub invocations: Vec<BatchInvocation>,
}

impl BatchSummary {
    /// Number of successful invocations.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.invocations.iter().filter(|i| i.succeeded()).count()
    }

    /// Number of failed invocations.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.invocations.len() - self.succeeded()
    }
}

/// Runs one stage over every entry of a directory.
///
/// A failing entry is logged and recorded; the batch moves on to the next.
#[derive(Debug)]
pub struct BatchRunner {
    runner: ChainRunner,
}

impl BatchRunner {
    /// Creates a batch runner.
    #[must_use]
    pub fn new(registry: Arc<StageRegistry>, ctx: ExecutionContext) -> Self {
        Self {
            runner: ChainRunner::new(registry, ctx),
        }
    }

    /// Invokes `stage` with `base_args` once per entry of `directory`.
    ///
    /// Unknown or ambiguous stage names and malformed placeholders are
    /// reported before any entry runs.
    pub fn run_over_directory(
        &self,
        stage: &str,
        base_args: &[String],
        directory: &Path,
    ) -> Result<BatchSummary, PypeError> {
        self.runner.registry().resolve(stage)?;
        for arg in base_args {
            if let Some(pattern) = placeholder(arg) {
                EntryAttribute::parse(pattern)?;
            }
        }

        let entries = list_entries(directory)?;
        info!(stage, directory = %directory.display(), entries = entries.len(), "Running batch");
        let ctx = self.runner.context();
        ctx.log("", 0);

        let mut summary = BatchSummary::default();
        for entry in entries {
            ctx.log(&format!("Creating {stage} instance."), 0);
            ctx.log(&format!("Replacing FileNames in {stage} arguments"), 0);
            let arguments = substitute_placeholders(base_args, directory, &entry)?;
            ctx.log(&format!("Executing {stage} {}", arguments.join(" ")), 0);

            let mut tokens = Vec::with_capacity(arguments.len() + 1);
            tokens.push(stage.to_string());
            tokens.extend(arguments.iter().cloned());

            let error = match self.runner.run_tokens(&tokens) {
                Ok(result) if result.success() => None,
                Ok(result) => Some(
                    result
                        .failures
                        .iter()
                        .map(|f| f.error.clone())
                        .collect::<Vec<_>>()
                        .join("; "),
                ),
                Err(err) => {
                    ctx.write_text(&format!("Error: {err}\n"));
                    Some(err.to_string())
                }
            };
            if let Some(ref message) = error {
                warn!(stage, entry = %entry, error = %message, "Batch entry failed");
            }

            summary.invocations.push(BatchInvocation {
                entry,
                arguments,
                error,
            });
        }

        info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            "Batch finished"
        );
        Ok(summary)
    }
}

fn list_entries(directory: &Path) -> Result<Vec<String>, PypeError> {
    let mut entries = std::fs::read_dir(directory)?
        .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BufferSink;
    use crate::members::{MemberDescriptor, TypeTag};
    use crate::testing::{register_failing_stage, CallLog};
    use pretty_assertions::assert_eq;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    fn populated_dir(names: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            std::fs::write(dir.path().join(name), name).unwrap();
        }
        dir
    }

    fn recording_registry(log: &CallLog) -> StageRegistry {
        let registry = StageRegistry::new();
        let log = log.clone();
        registry.register_fn(
            "convert",
            vec![
                MemberDescriptor::new("Input", "ifile", TypeTag::Str),
                MemberDescriptor::new("Output", "ofile", TypeTag::Str).with_default(""),
            ],
            vec![],
            move |ctx| {
                let input = ctx.require_str("Input")?.to_string();
                let output = ctx.inputs().get_str("Output").unwrap_or_default().to_string();
                log.push(format!("{input}|{output}"));
                Ok(())
            },
        );
        registry
    }

    fn batch(registry: StageRegistry, output: &BufferSink) -> BatchRunner {
        let ctx = ExecutionContext::new().with_output(Arc::new(output.clone()));
        BatchRunner::new(Arc::new(registry), ctx)
    }

    #[test]
    fn test_substitute_placeholders() {
        let dir = Path::new("/data");
        let out = substitute_placeholders(
            &args(&["-ifile", "[]", "-ofile", "[stem]", "-tag", "[upper]"]),
            dir,
            "scan.vtp",
        )
        .unwrap();

        assert_eq!(
            out,
            args(&["-ifile", "/data/scan.vtp", "-ofile", "/data/scan", "-tag", "/data/SCAN.VTP"])
        );
    }

    #[test]
    fn test_unknown_placeholder_attribute() {
        let err = EntryAttribute::parse("capitalize").unwrap_err();
        assert!(err.message.contains("capitalize"));
    }

    #[test]
    fn test_one_invocation_per_entry() {
        let dir = populated_dir(&["b.txt", "a.txt", "c.txt"]);
        let log = CallLog::new();
        let output = BufferSink::new();
        let runner = batch(recording_registry(&log), &output);

        let summary = runner
            .run_over_directory("convert", &args(&["-ifile", "[]"]), dir.path())
            .unwrap();

        assert_eq!(summary.invocations.len(), 3);
        assert_eq!(summary.failed(), 0);
        let expected: Vec<String> = ["a.txt", "b.txt", "c.txt"]
            .iter()
            .map(|name| format!("{}|", dir.path().join(name).display()))
            .collect();
        assert_eq!(log.entries(), expected);
        assert!(output.contents().contains("Replacing FileNames in convert arguments"));
    }

    #[test]
    fn test_failing_entry_does_not_stop_batch() {
        let dir = populated_dir(&["a.txt", "b.txt"]);
        let registry = StageRegistry::new();
        register_failing_stage(&registry, "broken", "cannot convert");
        let output = BufferSink::new();
        let runner = batch(registry, &output);

        let summary = runner
            .run_over_directory("broken", &args(&[]), dir.path())
            .unwrap();

        assert_eq!(summary.invocations.len(), 2);
        assert_eq!(summary.failed(), 2);
        assert!(summary.invocations[0]
            .error
            .as_deref()
            .unwrap()
            .contains("cannot convert"));
    }

    #[test]
    fn test_unknown_stage_is_fatal_up_front() {
        let dir = populated_dir(&["a.txt"]);
        let output = BufferSink::new();
        let runner = batch(StageRegistry::new(), &output);

        let err = runner
            .run_over_directory("nosuchstage", &args(&["[]"]), dir.path())
            .unwrap_err();

        assert!(matches!(err, PypeError::UnknownStage(_)));
        assert!(output.contents().is_empty());
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let log = CallLog::new();
        let output = BufferSink::new();
        let runner = batch(recording_registry(&log), &output);

        let err = runner
            .run_over_directory("convert", &args(&["-ifile", "[]"]), Path::new("/no/such/dir"))
            .unwrap_err();

        assert!(matches!(err, PypeError::Io(_)));
        assert!(log.is_empty());
    }

    #[test]
    fn test_empty_directory_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let log = CallLog::new();
        let output = BufferSink::new();
        let runner = batch(recording_registry(&log), &output);

        let summary = runner
            .run_over_directory("convert", &args(&["-ifile", "[]"]), dir.path())
            .unwrap();

        assert!(summary.invocations.is_empty());
    }
}
