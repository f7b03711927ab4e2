//! Splitting flat commands into per-stage token groups.

use regex::Regex;
use std::sync::LazyLock;

use super::spec::{PipelineSpec, StageDescriptor, PIPE_SEPARATOR};
use crate::errors::TokenizeError;

/// Splits a flat token sequence into stages at each `--pipe`.
///
/// An empty sequence gives an empty pipeline. A leading, doubled or
/// trailing separator is an error.
pub fn tokenize<S: AsRef<str>>(tokens: &[S]) -> Result<PipelineSpec, TokenizeError> {
    let mut pipeline = PipelineSpec::new();
    let mut group: Vec<String> = Vec::new();

    for (index, token) in tokens.iter().enumerate() {
        let token = token.as_ref();
        if token == PIPE_SEPARATOR {
            push_group(&mut pipeline, &mut group, index)?;
        } else {
            group.push(token.to_string());
        }
    }

    if !tokens.is_empty() {
        push_group(&mut pipeline, &mut group, tokens.len())?;
    }
    Ok(pipeline)
}

fn push_group(
    pipeline: &mut PipelineSpec,
    group: &mut Vec<String>,
    position: usize,
) -> Result<(), TokenizeError> {
    if group.is_empty() {
        return Err(TokenizeError::empty_stage(position));
    }
    let mut tokens = std::mem::take(group).into_iter();
    if let Some(invocation) = tokens.next() {
        pipeline.push(StageDescriptor::new(invocation, tokens.collect()));
    }
    Ok(())
}

#[allow(clippy::expect_used)]
static QUOTED_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""[^"]*""#).expect("quoted segment pattern is valid"));

/// Splits a command string on whitespace, keeping double-quoted segments
/// together as single tokens (without the quotes).
pub fn split_command(command: &str) -> Result<Vec<String>, TokenizeError> {
    let mut tokens = Vec::new();
    let mut last = 0;

    for quoted in QUOTED_SEGMENT.find_iter(command) {
        split_unquoted(&command[last..quoted.start()], &mut tokens)?;
        tokens.push(quoted.as_str().trim_matches('"').to_string());
        last = quoted.end();
    }
    split_unquoted(&command[last..], &mut tokens)?;

    Ok(tokens)
}

fn split_unquoted(segment: &str, tokens: &mut Vec<String>) -> Result<(), TokenizeError> {
    if segment.contains('"') {
        return Err(TokenizeError::unmatched_quote());
    }
    tokens.extend(segment.split_whitespace().map(str::to_string));
    Ok(())
}

/// Joins tokens into a command string that [`split_command`] splits back.
#[must_use]
pub fn join_command<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .map(|token| {
            let token = token.as_ref();
            if token.is_empty() || token.chars().any(char::is_whitespace) {
                format!("\"{token}\"")
            } else {
                token.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Pipe-level switches given before the first stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeOptions {
    /// Write the run log (`--nolog` turns it off).
    pub log_on: bool,
    /// Implicit piping (`--noauto` turns it off).
    pub auto_pipe: bool,
    /// Print usage and exit (`--help`).
    pub help: bool,
    /// List available stages and exit (`--query`).
    pub query: bool,
}

impl Default for PipeOptions {
    fn default() -> Self {
        Self {
            log_on: true,
            auto_pipe: true,
            help: false,
            query: false,
        }
    }
}

impl PipeOptions {
    /// Consumes the known leading pipe options, returning them and the rest.
    #[must_use]
    pub fn extract<S: AsRef<str>>(tokens: &[S]) -> (Self, Vec<String>) {
        let mut options = Self::default();
        let mut consumed = 0;

        for token in tokens {
            match token.as_ref() {
                "--nolog" => options.log_on = false,
                "--noauto" => options.auto_pipe = false,
                "--help" => options.help = true,
                "--query" => options.query = true,
                _ => break,
            }
            consumed += 1;
        }

        let rest = tokens[consumed..]
            .iter()
            .map(|t| t.as_ref().to_string())
            .collect();
        (options, rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn words(text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_tokenize_two_stages() {
        let pipeline = tokenize(&words("stageA -x 1 --pipe stageB -y 2")).unwrap();

        assert_eq!(pipeline.len(), 2);
        assert_eq!(pipeline.stages()[0].name, "stageA");
        assert_eq!(pipeline.stages()[0].arguments, vec!["-x", "1"]);
        assert_eq!(pipeline.stages()[1].name, "stageB");
        assert_eq!(pipeline.stages()[1].arguments, vec!["-y", "2"]);
    }

    #[test]
    fn test_tokenize_trailing_separator_fails() {
        let err = tokenize(&words("stageA --pipe")).unwrap_err();
        assert_eq!(err.position, Some(2));
    }

    #[test]
    fn test_tokenize_leading_and_double_separator_fail() {
        assert!(tokenize(&words("--pipe stageA")).is_err());
        assert!(tokenize(&words("stageA --pipe --pipe stageB")).is_err());
    }

    #[test]
    fn test_tokenize_empty_stream() {
        let empty: Vec<String> = Vec::new();
        assert!(tokenize(&empty).unwrap().is_empty());
    }

    #[test]
    fn test_separator_count_matches_stage_count() {
        for command in ["a", "a --pipe b", "a -x 1 --pipe b --pipe c -y"] {
            let tokens = words(command);
            let separators = tokens.iter().filter(|t| *t == PIPE_SEPARATOR).count();
            let pipeline = tokenize(&tokens).unwrap();
            assert_eq!(pipeline.len(), separators + 1);
        }
    }

    #[test]
    fn test_rejoin_reproduces_input() {
        let tokens = words("a -x 1 2 --pipe b --pipe c -flag");
        assert_eq!(tokenize(&tokens).unwrap().to_tokens(), tokens);
    }

    #[test]
    fn test_split_command_quotes() {
        let tokens = split_command(r#"echo -message "hello world" --pipe echo"#).unwrap();
        assert_eq!(tokens, vec!["echo", "-message", "hello world", "--pipe", "echo"]);
    }

    #[test]
    fn test_split_command_unmatched_quote() {
        let err = split_command(r#"echo -message "hello"#).unwrap_err();
        assert!(err.message.contains("non-matching quote"));
    }

    #[test]
    fn test_join_command_round_trips_spaces() {
        let tokens = vec!["echo", "-message", "hello world", ""];
        let joined = join_command(&tokens);
        assert_eq!(joined, r#"echo -message "hello world" """#);
        assert_eq!(split_command(&joined).unwrap(), tokens);
    }

    #[test]
    fn test_pipe_options_extract() {
        let (options, rest) = PipeOptions::extract(&words("--nolog --noauto echo --help"));
        assert!(!options.log_on);
        assert!(!options.auto_pipe);
        assert!(!options.help);
        assert_eq!(rest, vec!["echo", "--help"]);
    }
}
