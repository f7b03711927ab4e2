//! Built-in stages.
//!
//! `textreader` and `textwriter` are the auto producer and consumer of the
//! `text` object kind; `textstats` and `echo` are small processing stages
//! that make chains runnable without any domain library.

use serde_json::json;
use std::path::{Path, PathBuf};

use super::{Stage, StageRegistry};
use crate::context::StageContext;
use crate::errors::ExecutionError;
use crate::members::{Arity, Constraint, DomainObject, MemberDescriptor, TypeTag, Value};

/// Object kind produced by `textreader`.
pub const TEXT_KIND: &str = "text";

/// File name value that makes a reader or writer ask for its path on the
/// run's input stream.
pub const BROWSE_PLACEHOLDER: &str = "BROWSER";

fn text_type() -> TypeTag {
    TypeTag::from(TEXT_KIND)
}

/// Resolves the file name held by `member`, prompting for it when it is
/// [`BROWSE_PLACEHOLDER`]. Relative answers are taken from the last visited
/// directory.
fn file_path(ctx: &StageContext<'_>, member: &str, title: &str) -> Result<PathBuf, ExecutionError> {
    let file_name = ctx.require_str(member)?;
    if file_name != BROWSE_PLACEHOLDER {
        return Ok(PathBuf::from(file_name));
    }

    let start = ctx.last_visited_path();
    let answer = ctx
        .prompt(&format!("{title} [{}]: ", start.display()))
        .filter(|answer| !answer.trim().is_empty())
        .ok_or_else(|| ctx.fail(format!("no {member}")))?;
    let path = Path::new(answer.trim());
    Ok(if path.is_relative() {
        start.join(path)
    } else {
        path.to_path_buf()
    })
}

/// Registers every built-in stage.
pub fn register_builtins(registry: &StageRegistry) {
    registry.register("textreader", || Box::new(TextReader));
    registry.register("textwriter", || Box::new(TextWriter));
    registry.register("textstats", || Box::new(TextStats));
    registry.register("echo", || Box::new(Echo));
}

/// Reads a UTF-8 file into a `text` object.
#[derive(Debug, Default)]
pub struct TextReader;

impl Stage for TextReader {
    fn name(&self) -> &str {
        "textreader"
    }

    fn doc(&self) -> &str {
        "read a text file into memory"
    }

    fn input_members(&self) -> Vec<MemberDescriptor> {
        vec![MemberDescriptor::new("InputFileName", "ifile", TypeTag::Str)
            .with_doc("input file name")]
    }

    fn output_members(&self) -> Vec<MemberDescriptor> {
        vec![MemberDescriptor::new("Text", "o", text_type())
            .with_doc("the output text")
            .with_auto_consumer("textwriter")]
    }

    fn execute(&mut self, ctx: &mut StageContext<'_>) -> Result<(), ExecutionError> {
        let path = file_path(ctx, "InputFileName", "Input text file")?;

        ctx.log("Reading text file.");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ctx.fail(format!("cannot read {}: {e}", path.display())))?;
        ctx.visit(&path);

        let text = DomainObject::new(TEXT_KIND, json!(content)).with_source(&path);
        ctx.set_output("Text", text);
        Ok(())
    }
}

/// Writes a `text` object to a file.
#[derive(Debug, Default)]
pub struct TextWriter;

impl Stage for TextWriter {
    fn name(&self) -> &str {
        "textwriter"
    }

    fn doc(&self) -> &str {
        "write a text object to disk"
    }

    fn input_members(&self) -> Vec<MemberDescriptor> {
        vec![
            MemberDescriptor::new("Text", "i", text_type())
                .with_doc("the input text")
                .with_auto_producer("textreader"),
            MemberDescriptor::new("OutputFileName", "ofile", TypeTag::Str)
                .with_doc("output file name"),
        ]
    }

    fn output_members(&self) -> Vec<MemberDescriptor> {
        Vec::new()
    }

    fn execute(&mut self, ctx: &mut StageContext<'_>) -> Result<(), ExecutionError> {
        let path = file_path(ctx, "OutputFileName", "Output text file")?;
        let content = ctx
            .require_object("Text")?
            .payload
            .as_str()
            .ok_or_else(|| ctx.fail("text payload is not a string"))?
            .to_string();

        ctx.log("Writing text file.");
        std::fs::write(&path, content)
            .map_err(|e| ctx.fail(format!("cannot write {}: {e}", path.display())))?;
        ctx.visit(&path);
        Ok(())
    }
}

/// Counts lines, words and characters of a `text` object.
#[derive(Debug, Default)]
pub struct TextStats;

impl Stage for TextStats {
    fn name(&self) -> &str {
        "textstats"
    }

    fn doc(&self) -> &str {
        "compute line, word and character counts"
    }

    fn input_members(&self) -> Vec<MemberDescriptor> {
        vec![MemberDescriptor::new("Text", "i", text_type())
            .with_doc("the input text")
            .with_auto_producer("textreader")]
    }

    fn output_members(&self) -> Vec<MemberDescriptor> {
        vec![
            MemberDescriptor::new("Lines", "lines", TypeTag::Int).with_doc("number of lines"),
            MemberDescriptor::new("Words", "words", TypeTag::Int).with_doc("number of words"),
            MemberDescriptor::new("Characters", "chars", TypeTag::Int)
                .with_doc("number of characters"),
        ]
    }

    #[allow(clippy::cast_possible_wrap)]
    fn execute(&mut self, ctx: &mut StageContext<'_>) -> Result<(), ExecutionError> {
        let content = ctx
            .require_object("Text")?
            .payload
            .as_str()
            .unwrap_or_default()
            .to_string();

        if content.is_empty() {
            ctx.warn("empty document");
        }

        ctx.set_output("Lines", content.lines().count() as i64);
        ctx.set_output("Words", content.split_whitespace().count() as i64);
        ctx.set_output("Characters", content.chars().count() as i64);
        Ok(())
    }
}

/// Prints its message, optionally several times.
#[derive(Debug, Default)]
pub struct Echo;

impl Stage for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn doc(&self) -> &str {
        "print a message to the output"
    }

    fn input_members(&self) -> Vec<MemberDescriptor> {
        vec![
            MemberDescriptor::new("Message", "message", TypeTag::Str)
                .with_arity(Arity::Variadic)
                .with_doc("words to print"),
            MemberDescriptor::new("Repeat", "repeat", TypeTag::Int)
                .with_default(1)
                .with_constraint(Constraint::range(1.0, 100.0))
                .with_doc("how many times to print"),
            MemberDescriptor::switch("Upper", "upper").with_doc("print in upper case"),
        ]
    }

    fn output_members(&self) -> Vec<MemberDescriptor> {
        vec![MemberDescriptor::new("Message", "message", TypeTag::Str)
            .with_doc("the printed message")]
    }

    fn execute(&mut self, ctx: &mut StageContext<'_>) -> Result<(), ExecutionError> {
        let mut message = match ctx.input("Message") {
            Some(Value::List(words)) => words
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" "),
            Some(value) => value.to_string(),
            None => String::new(),
        };
        if ctx.inputs().get_bool("Upper").unwrap_or(false) {
            message = message.to_uppercase();
        }

        let repeat = ctx.inputs().get_int("Repeat").unwrap_or(1);
        for _ in 0..repeat {
            ctx.print(&message);
        }

        ctx.set_output("Message", message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{BufferSink, DiagnosticChannel, ExecutionContext, SinkListener};
    use crate::members::MemberValues;
    use std::sync::Arc;

    #[test]
    fn test_text_reader_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "one two\nthree\n").unwrap();

        let run = ExecutionContext::new().with_log(false);
        let mut inputs = MemberValues::new();
        inputs.set("InputFileName", path.to_string_lossy().to_string());
        let mut ctx = StageContext::new("textreader", &inputs, &run);
        TextReader.execute(&mut ctx).unwrap();
        let outputs = ctx.into_outputs();

        let text = outputs.get_object("Text").unwrap();
        assert_eq!(text.kind, TEXT_KIND);
        assert_eq!(run.last_visited_path(), dir.path());

        let mut stats_inputs = MemberValues::new();
        stats_inputs.set("Text", text.clone());
        let mut ctx = StageContext::new("textstats", &stats_inputs, &run);
        TextStats.execute(&mut ctx).unwrap();

        assert_eq!(ctx.outputs().get_int("Lines"), Some(2));
        assert_eq!(ctx.outputs().get_int("Words"), Some(3));
        assert_eq!(ctx.outputs().get_int("Characters"), Some(14));
    }

    #[test]
    fn test_text_reader_missing_file() {
        let run = ExecutionContext::new().with_log(false);
        let mut inputs = MemberValues::new();
        inputs.set("InputFileName", "/definitely/not/here.txt");
        let mut ctx = StageContext::new("textreader", &inputs, &run);

        let err = TextReader.execute(&mut ctx).unwrap_err();
        assert_eq!(err.stage, "textreader");
    }

    #[test]
    fn test_text_reader_prompts_for_browsed_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "a b c").unwrap();

        let out = BufferSink::new();
        let run = ExecutionContext::new()
            .with_log(false)
            .with_output(Arc::new(out.clone()))
            .with_input(Box::new(std::io::Cursor::new("notes.txt\n")))
            .with_last_visited_path(dir.path());
        let mut inputs = MemberValues::new();
        inputs.set("InputFileName", BROWSE_PLACEHOLDER);
        let mut ctx = StageContext::new("textreader", &inputs, &run);

        TextReader.execute(&mut ctx).unwrap();

        let text = ctx.outputs().get_object("Text").unwrap();
        assert_eq!(text.payload, json!("a b c"));
        assert!(out.contents().starts_with("Input text file ["));
    }

    #[test]
    fn test_text_writer_browse_without_input_fails() {
        let run = ExecutionContext::new().with_log(false);
        let mut inputs = MemberValues::new();
        inputs.set("Text", DomainObject::new(TEXT_KIND, json!("hello")));
        inputs.set("OutputFileName", BROWSE_PLACEHOLDER);
        let mut ctx = StageContext::new("textwriter", &inputs, &run);

        let err = TextWriter.execute(&mut ctx).unwrap_err();
        assert_eq!(err.message, "no OutputFileName");
    }

    #[test]
    fn test_text_writer_writes_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");

        let run = ExecutionContext::new().with_log(false);
        let mut inputs = MemberValues::new();
        inputs.set("Text", DomainObject::new(TEXT_KIND, json!("hello")));
        inputs.set("OutputFileName", path.to_string_lossy().to_string());
        let mut ctx = StageContext::new("textwriter", &inputs, &run);

        TextWriter.execute(&mut ctx).unwrap();

        assert_eq!(std::fs::read_to_string(path).unwrap(), "hello");
    }

    #[test]
    fn test_stats_warns_on_empty_document() {
        let errors = BufferSink::new();
        let diagnostics = DiagnosticChannel::new();
        let _guard =
            diagnostics.add_listener(Arc::new(SinkListener::new(Arc::new(errors.clone()))));
        let run = ExecutionContext::new().with_diagnostics(diagnostics);

        let mut inputs = MemberValues::new();
        inputs.set("Text", DomainObject::new(TEXT_KIND, json!("")));
        let mut ctx = StageContext::new("textstats", &inputs, &run);
        TextStats.execute(&mut ctx).unwrap();

        assert_eq!(errors.lines(), vec!["Warning: [textstats] empty document"]);
    }

    #[test]
    fn test_echo_repeats_message() {
        let out = BufferSink::new();
        let run = ExecutionContext::new().with_output(Arc::new(out.clone()));
        let mut inputs = MemberValues::new();
        inputs.set("Message", vec!["hello", "world"]);
        inputs.set("Repeat", 2);
        inputs.set("Upper", true);
        let mut ctx = StageContext::new("echo", &inputs, &run);

        Echo.execute(&mut ctx).unwrap();

        assert_eq!(out.lines(), vec!["HELLO WORLD", "HELLO WORLD"]);
        assert_eq!(ctx.outputs().get_str("Message"), Some("HELLO WORLD"));
    }
}
