//! Pipeline and stage descriptors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// The token separating stages in a flat command.
pub const PIPE_SEPARATOR: &str = "--pipe";

/// Argument standing for a file path to be chosen when the run starts.
pub const FILE_PLACEHOLDER: &str = "FILE";

/// Filename option of a synthesized reader stage.
pub const READER_FILE_OPTION: &str = "ifile";

/// Filename option of a synthesized writer stage.
pub const WRITER_FILE_OPTION: &str = "ofile";

/// Why the binder created a descriptor that was not on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum SyntheticLink {
    /// A reader whose object output fills `member` of the following stage.
    Feeds {
        /// Input member of the consuming stage.
        member: String,
    },
    /// A writer fed from output `member` of the preceding stage.
    Drains {
        /// Output member of the producing stage.
        member: String,
    },
}

/// One stage invocation: a name and its raw arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDescriptor {
    /// Registry key.
    pub name: String,
    /// The first token as written, possibly a path.
    pub invocation: String,
    /// Raw argument tokens.
    pub arguments: Vec<String>,
    /// Set for readers and writers created by the binder.
    pub synthetic: Option<SyntheticLink>,
}

impl StageDescriptor {
    /// Creates a descriptor; the name is the invocation without directory
    /// and extension.
    #[must_use]
    pub fn new(invocation: impl Into<String>, arguments: Vec<String>) -> Self {
        let invocation = invocation.into();
        Self {
            name: stage_name(&invocation),
            invocation,
            arguments,
            synthetic: None,
        }
    }

    /// A reader stage loading `path` for input `member` of the next stage.
    #[must_use]
    pub fn reader(producer: &str, path: &str, member: &str) -> Self {
        let mut descriptor = Self::new(
            producer,
            vec![format!("-{READER_FILE_OPTION}"), path.to_string()],
        );
        descriptor.synthetic = Some(SyntheticLink::Feeds {
            member: member.to_string(),
        });
        descriptor
    }

    /// A writer stage saving output `member` of the previous stage to `path`.
    #[must_use]
    pub fn writer(consumer: &str, path: &str, member: &str) -> Self {
        let mut descriptor = Self::new(
            consumer,
            vec![format!("-{WRITER_FILE_OPTION}"), path.to_string()],
        );
        descriptor.synthetic = Some(SyntheticLink::Drains {
            member: member.to_string(),
        });
        descriptor
    }

    /// Returns true for binder-created descriptors.
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.synthetic.is_some()
    }

    /// The invocation followed by its arguments.
    #[must_use]
    pub fn tokens(&self) -> Vec<String> {
        std::iter::once(self.invocation.clone())
            .chain(self.arguments.iter().cloned())
            .collect()
    }
}

impl fmt::Display for StageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tokens().join(" "))
    }
}

/// Strips directory and extension from a stage invocation.
#[must_use]
pub fn stage_name(invocation: &str) -> String {
    Path::new(invocation)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map_or_else(|| invocation.to_string(), str::to_string)
}

/// An ordered chain of stage descriptors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSpec {
    stages: Vec<StageDescriptor>,
}

impl PipelineSpec {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pipeline from descriptors.
    #[must_use]
    pub fn from_stages(stages: Vec<StageDescriptor>) -> Self {
        Self { stages }
    }

    /// Appends a stage.
    pub fn push(&mut self, stage: StageDescriptor) {
        self.stages.push(stage);
    }

    /// The stages in order.
    #[must_use]
    pub fn stages(&self) -> &[StageDescriptor] {
        &self.stages
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true for an empty pipeline.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Iterates over the stages.
    pub fn iter(&self) -> std::slice::Iter<'_, StageDescriptor> {
        self.stages.iter()
    }

    /// Rejoins the stages with the pipe separator.
    #[must_use]
    pub fn to_tokens(&self) -> Vec<String> {
        let mut tokens = Vec::new();
        for (index, stage) in self.stages.iter().enumerate() {
            if index > 0 {
                tokens.push(PIPE_SEPARATOR.to_string());
            }
            tokens.extend(stage.tokens());
        }
        tokens
    }
}

impl fmt::Display for PipelineSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_tokens().join(" "))
    }
}

impl<'a> IntoIterator for &'a PipelineSpec {
    type Item = &'a StageDescriptor;
    type IntoIter = std::slice::Iter<'a, StageDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.stages.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_name_strips_path_and_extension() {
        assert_eq!(stage_name("/usr/bin/textstats.py"), "textstats");
        assert_eq!(stage_name("echo"), "echo");
        assert_eq!(stage_name("tools/echo"), "echo");
    }

    #[test]
    fn test_reader_descriptor() {
        let reader = StageDescriptor::reader("textreader", "a.txt", "Text");
        assert_eq!(reader.arguments, vec!["-ifile", "a.txt"]);
        assert_eq!(
            reader.synthetic,
            Some(SyntheticLink::Feeds {
                member: "Text".into()
            })
        );
    }

    #[test]
    fn test_to_tokens_inserts_separators() {
        let pipeline = PipelineSpec::from_stages(vec![
            StageDescriptor::new("a", vec!["-x".into(), "1".into()]),
            StageDescriptor::new("b", vec![]),
        ]);

        assert_eq!(pipeline.to_tokens(), vec!["a", "-x", "1", "--pipe", "b"]);
        assert_eq!(pipeline.to_string(), "a -x 1 --pipe b");
    }
}
