//! Error types for the stagepipe engine.
//!
//! Each failure class of the pipeline engine has its own error struct so that
//! callers can react to it precisely; [`PypeError`] wraps all of them for
//! propagation with `?`.

use serde_json::json;
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for stagepipe operations.
#[derive(Debug, Error)]
pub enum PypeError {
    /// A stage name was not found in the registry.
    #[error("{0}")]
    UnknownStage(#[from] UnknownStageError),

    /// The pipeline command could not be split into stages.
    #[error("{0}")]
    Tokenize(#[from] TokenizeError),

    /// A raw token could not be bound to a stage member.
    #[error("{0}")]
    MemberBinding(#[from] MemberBindingError),

    /// A stage's own `execute` failed.
    #[error("{0}")]
    Execution(#[from] ExecutionError),

    /// A stage name resolved to more than one implementation.
    #[error("{0}")]
    Multiplicity(#[from] MultiplicityError),

    /// The work queue was closed before the item could be enqueued.
    #[error("Work queue is closed")]
    QueueClosed,

    /// A blocking pipeline task could not be joined.
    #[error("Task join error: {0}")]
    Join(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PypeError {
    /// Returns a short, stable name for the error class.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::UnknownStage(_) => "UnknownStageError",
            Self::Tokenize(_) => "TokenizeError",
            Self::MemberBinding(_) => "MemberBindingError",
            Self::Execution(_) => "ExecutionError",
            Self::Multiplicity(_) => "MultiplicityError",
            Self::QueueClosed => "QueueClosedError",
            Self::Join(_) => "JoinError",
            Self::Io(_) => "IOError",
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), json!(self.error_type()));
        map.insert("message".to_string(), json!(self.to_string()));

        match self {
            Self::UnknownStage(err) => {
                map.insert("stage".to_string(), json!(err.name));
            }
            Self::MemberBinding(err) => {
                map.insert("stage".to_string(), json!(err.stage));
                map.insert("member".to_string(), json!(err.member));
                if let Some(ref value) = err.value {
                    map.insert("value".to_string(), json!(value));
                }
            }
            Self::Execution(err) => {
                map.insert("stage".to_string(), json!(err.stage));
            }
            Self::Multiplicity(err) => {
                map.insert("stage".to_string(), json!(err.name));
                map.insert("candidates".to_string(), json!(err.candidates));
            }
            Self::Tokenize(err) => {
                if let Some(position) = err.position {
                    map.insert("position".to_string(), json!(position));
                }
            }
            Self::QueueClosed | Self::Join(_) | Self::Io(_) => {}
        }

        map
    }
}

/// Error raised when a stage name is not registered.
#[derive(Debug, Clone, Error)]
#[error("Unknown stage: '{name}'")]
pub struct UnknownStageError {
    /// The requested stage name.
    pub name: String,
}

impl UnknownStageError {
    /// Creates a new unknown stage error.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Error raised when the separator placement or quoting of a command is malformed.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TokenizeError {
    /// The error message.
    pub message: String,
    /// Token index at which the problem was found, if known.
    pub position: Option<usize>,
}

impl TokenizeError {
    /// Creates a new tokenize error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
        }
    }

    /// An empty stage group (leading, doubled or trailing separator).
    #[must_use]
    pub fn empty_stage(position: usize) -> Self {
        Self {
            message: format!("Empty stage name at token {position}: misplaced pipe separator"),
            position: Some(position),
        }
    }

    /// A double quote without its closing partner.
    #[must_use]
    pub fn unmatched_quote() -> Self {
        Self::new("Error: non-matching quote found")
    }
}

/// Error raised when a token cannot be bound to a stage member.
///
/// Identifies the stage, the member (by option flag or name) and the
/// offending raw value when there is one.
#[derive(Debug, Clone, Error)]
#[error("{stage} error for option -{member}: {message}")]
pub struct MemberBindingError {
    /// The stage being bound.
    pub stage: String,
    /// The member option or name involved.
    pub member: String,
    /// The offending raw value.
    pub value: Option<String>,
    /// What went wrong.
    pub message: String,
}

impl MemberBindingError {
    /// Creates a new binding error.
    #[must_use]
    pub fn new(
        stage: impl Into<String>,
        member: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            member: member.into(),
            value: None,
            message: message.into(),
        }
    }

    /// Attaches the offending value.
    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// The option is not declared by the stage.
    #[must_use]
    pub fn unknown_option(stage: impl Into<String>, option: impl Into<String>) -> Self {
        let option = option.into();
        Self::new(stage, option.trim_start_matches('-'), "unknown option")
            .with_value(option)
    }

    /// The number of values does not match the member arity.
    #[must_use]
    pub fn wrong_count(
        stage: impl Into<String>,
        member: impl Into<String>,
        given: usize,
        expected: &str,
    ) -> Self {
        Self::new(
            stage,
            member,
            format!("{given} entries given, {expected} expected"),
        )
    }

    /// A value could not be coerced to the member type.
    #[must_use]
    pub fn bad_value(
        stage: impl Into<String>,
        member: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(stage, member, reason).with_value(value)
    }

    /// A value violates the member's range or enumeration.
    #[must_use]
    pub fn out_of_range(
        stage: impl Into<String>,
        member: impl Into<String>,
        value: impl Into<String>,
        representation: &str,
    ) -> Self {
        let value = value.into();
        Self::new(
            stage,
            member,
            format!("value {value} should be {representation}"),
        )
        .with_value(value)
    }

    /// An explicit `@stage.option` pipe could not be parsed or resolved.
    #[must_use]
    pub fn invalid_pipe(
        stage: impl Into<String>,
        member: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let value = value.into();
        Self::new(stage, member, format!("invalid option piping: {value}")).with_value(value)
    }
}

/// Error raised by a stage's own `execute`.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}' failed: {message}")]
pub struct ExecutionError {
    /// The failing stage.
    pub stage: String,
    /// The error message.
    pub message: String,
}

impl ExecutionError {
    /// Creates a new execution error.
    #[must_use]
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// Error raised when a stage name does not resolve to exactly one implementation.
#[derive(Debug, Clone, Error)]
#[error("Stage '{name}' resolves to {candidates} implementations, expected exactly one")]
pub struct MultiplicityError {
    /// The stage name.
    pub name: String,
    /// How many candidates were found.
    pub candidates: usize,
}

impl MultiplicityError {
    /// Creates a new multiplicity error.
    #[must_use]
    pub fn new(name: impl Into<String>, candidates: usize) -> Self {
        Self {
            name: name.into(),
            candidates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_error_names_member_and_value() {
        let err = MemberBindingError::out_of_range("stageA", "x", "42", ">= 0 and <= 10");

        assert_eq!(err.member, "x");
        assert_eq!(err.value.as_deref(), Some("42"));
        assert!(err.to_string().contains("-x"));
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn test_unknown_option_strips_dashes() {
        let err = MemberBindingError::unknown_option("stageA", "--bogus");
        assert_eq!(err.member, "bogus");
        assert_eq!(err.value.as_deref(), Some("--bogus"));
    }

    #[test]
    fn test_error_to_dict() {
        let err: PypeError = UnknownStageError::new("nosuchstage").into();
        let dict = err.to_dict();

        assert_eq!(dict.get("type").unwrap(), "UnknownStageError");
        assert_eq!(dict.get("stage").unwrap(), "nosuchstage");
    }

    #[test]
    fn test_multiplicity_error_message() {
        let err = MultiplicityError::new("reader", 2);
        assert!(err.to_string().contains("2 implementations"));

        let err: PypeError = err.into();
        assert_eq!(err.error_type(), "MultiplicityError");
    }

    #[test]
    fn test_tokenize_error_position() {
        let err = TokenizeError::empty_stage(3);
        assert_eq!(err.position, Some(3));

        let err: PypeError = err.into();
        assert_eq!(err.to_dict().get("position").unwrap(), 3);
    }
}
