//! Usage text for a stage's member table, in four flavours.

use std::fmt::Write as _;

use super::Stage;
use crate::members::{builtin_inputs, MemberDescriptor};

/// Output flavour of the usage text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageFormat {
    /// Plain text (`--help`, `--doc`).
    Plain,
    /// HTML (`--html`).
    Html,
    /// DokuWiki markup (`--dokuwiki`).
    DokuWiki,
    /// PmWiki markup (`--pmwiki`).
    PmWiki,
}

impl UsageFormat {
    /// Maps a stage-level flag to its format.
    #[must_use]
    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag {
            "--help" | "--doc" => Some(Self::Plain),
            "--html" => Some(Self::Html),
            "--dokuwiki" => Some(Self::DokuWiki),
            "--pmwiki" => Some(Self::PmWiki),
            _ => None,
        }
    }
}

struct Row {
    option: String,
    name: String,
    type_name: String,
    length: String,
    default: String,
    constraint: String,
    doc: String,
    producer: Option<String>,
}

impl Row {
    fn from_member(member: &MemberDescriptor) -> Self {
        let producer = member
            .auto_producer
            .as_ref()
            .or(member.auto_consumer.as_ref())
            .map(|stage| format!("{stage}, -{}", member.file_option()));
        Self {
            option: member.flag(),
            name: member.name.clone(),
            type_name: member.type_tag.to_string(),
            length: member.arity.length().to_string(),
            default: member
                .default
                .as_ref()
                .filter(|v| !v.is_empty())
                .map(ToString::to_string)
                .unwrap_or_default(),
            constraint: member.constraint.representation(),
            doc: member.doc.clone(),
            producer,
        }
    }
}

fn rows(members: &[MemberDescriptor]) -> Vec<Row> {
    members.iter().map(Row::from_member).collect()
}

/// Renders usage for `stage` in the requested format.
#[must_use]
pub fn render_usage(stage: &dyn Stage, format: UsageFormat) -> String {
    let mut inputs = builtin_inputs();
    inputs.extend(stage.input_members());
    let inputs = rows(&inputs);
    let outputs = rows(&stage.output_members());

    match format {
        UsageFormat::Plain => plain(stage, &inputs, &outputs),
        UsageFormat::Html => html(stage, &inputs, &outputs),
        UsageFormat::DokuWiki => dokuwiki(stage, &inputs, &outputs),
        UsageFormat::PmWiki => pmwiki(stage, &inputs, &outputs),
    }
}

fn plain(stage: &dyn Stage, inputs: &[Row], outputs: &[Row]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Usage: {} [options]", stage.name());
    if !stage.doc().is_empty() {
        let _ = writeln!(out, "\n  {} : {}", stage.name(), stage.doc());
    }

    for (title, table) in [("Input arguments", inputs), ("Output arguments", outputs)] {
        if table.is_empty() {
            continue;
        }
        let _ = writeln!(out, "\n  {title}:");
        for row in table {
            let mut details = format!("{}, {}", row.type_name, row.length);
            if !row.default.is_empty() {
                let _ = write!(details, "; default: {}", row.default);
            }
            if !row.constraint.is_empty() {
                let _ = write!(details, "; {}", row.constraint);
            }
            let _ = writeln!(out, "   {} {} ({}): {}", row.option, row.name, details, row.doc);
            if let Some(ref producer) = row.producer {
                let _ = writeln!(out, "       (file companion: {producer})");
            }
        }
    }
    out
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

const COLUMNS: [&str; 7] = [
    "Option",
    "Name",
    "Type",
    "Length",
    "Default",
    "Constraint",
    "Description",
];

fn cells(row: &Row) -> [&str; 7] {
    [
        &row.option,
        &row.name,
        &row.type_name,
        &row.length,
        &row.default,
        &row.constraint,
        &row.doc,
    ]
}

fn html(stage: &dyn Stage, inputs: &[Row], outputs: &[Row]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "<h2>{}</h2>", escape_html(stage.name()));
    if !stage.doc().is_empty() {
        let _ = writeln!(out, "<p>{}</p>", escape_html(stage.doc()));
    }
    for (title, table) in [("Input arguments", inputs), ("Output arguments", outputs)] {
        if table.is_empty() {
            continue;
        }
        let _ = writeln!(out, "<h3>{title}</h3>");
        out.push_str("<table>\n<tr>");
        for column in COLUMNS {
            let _ = write!(out, "<th>{column}</th>");
        }
        out.push_str("</tr>\n");
        for row in table {
            out.push_str("<tr>");
            for cell in cells(row) {
                let _ = write!(out, "<td>{}</td>", escape_html(cell));
            }
            out.push_str("</tr>\n");
        }
        out.push_str("</table>\n");
    }
    out
}

fn dokuwiki(stage: &dyn Stage, inputs: &[Row], outputs: &[Row]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "====== {} ======", stage.name());
    if !stage.doc().is_empty() {
        let _ = writeln!(out, "{}", stage.doc());
    }
    for (title, table) in [("Input arguments", inputs), ("Output arguments", outputs)] {
        if table.is_empty() {
            continue;
        }
        let _ = writeln!(out, "===== {title} =====");
        let _ = writeln!(out, "^ {} ^", COLUMNS.join(" ^ "));
        for row in table {
            let _ = writeln!(out, "| {} |", cells(row).join(" | "));
        }
    }
    out
}

fn pmwiki(stage: &dyn Stage, inputs: &[Row], outputs: &[Row]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "!! {}", stage.name());
    if !stage.doc().is_empty() {
        let _ = writeln!(out, "{}", stage.doc());
    }
    for (title, table) in [("Input arguments", inputs), ("Output arguments", outputs)] {
        if table.is_empty() {
            continue;
        }
        let _ = writeln!(out, "!!! {title}");
        out.push_str("|| border=1\n");
        let header: Vec<String> = COLUMNS.iter().map(|c| format!("!{c}")).collect();
        let _ = writeln!(out, "||{} ||", header.join(" ||"));
        for row in table {
            let _ = writeln!(out, "||{} ||", cells(row).join(" ||"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::builtin::{Echo, TextStats};

    #[test]
    fn test_format_from_flag() {
        assert_eq!(UsageFormat::from_flag("--help"), Some(UsageFormat::Plain));
        assert_eq!(UsageFormat::from_flag("--doc"), Some(UsageFormat::Plain));
        assert_eq!(UsageFormat::from_flag("--html"), Some(UsageFormat::Html));
        assert_eq!(UsageFormat::from_flag("--pipe"), None);
    }

    #[test]
    fn test_plain_usage_lists_builtins_and_constraints() {
        let text = render_usage(&Echo, UsageFormat::Plain);

        assert!(text.starts_with("Usage: echo"));
        assert!(text.contains("-id Id (str, 1; default: 0)"));
        assert!(text.contains("-repeat Repeat (int, 1; default: 1; >= 1 and <= 100)"));
        assert!(text.contains("Output arguments"));
    }

    #[test]
    fn test_plain_usage_mentions_file_companion() {
        let text = render_usage(&TextStats, UsageFormat::Plain);
        assert!(text.contains("(file companion: textreader, -ifile)"));
    }

    #[test]
    fn test_html_usage_escapes() {
        let text = render_usage(&Echo, UsageFormat::Html);
        assert!(text.contains("<h2>echo</h2>"));
        assert!(text.contains("&gt;= 1 and &lt;= 100"));
    }

    #[test]
    fn test_wiki_tables() {
        let doku = render_usage(&TextStats, UsageFormat::DokuWiki);
        assert!(doku.contains("^ Option ^ Name ^"));
        assert!(doku.contains("| -lines | Lines | int | 1 |"));

        let pm = render_usage(&TextStats, UsageFormat::PmWiki);
        assert!(pm.contains("||!Option ||!Name"));
        assert!(pm.contains("||-i ||Text ||text"));
    }
}
