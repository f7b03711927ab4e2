//! XML parameter descriptor rendering.

use std::fmt::Write;

use super::{Channel, ExposedMember, StageParameters, WrapperOptions};
use crate::members::{format_float, Arity, TypeTag};

const INDENT: &str = "  ";

/// Escapes the five XML special characters.
#[must_use]
pub fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn field_kind(exposed: &ExposedMember) -> (String, Option<&'static str>) {
    let member = &exposed.member;
    let mut tag = match member.type_tag {
        TypeTag::Int => "integer".to_string(),
        TypeTag::Float => "float".to_string(),
        TypeTag::Str if !member.constraint.enumeration_values().is_empty() => {
            "string-enumeration".to_string()
        }
        TypeTag::Str => "string".to_string(),
        TypeTag::Bool => "boolean".to_string(),
        TypeTag::Object(_) => String::new(),
    };
    if !member.arity.is_scalar() {
        tag.push_str("-vector");
    }
    if let TypeTag::Object(ref kind) = member.type_tag {
        tag = if kind == "image" { "image" } else { "geometry" }.to_string();
    }
    if exposed.channel == Channel::Point {
        let options = (member.arity == Arity::Variadic).then_some("multiple=\"true\"");
        return ("point".to_string(), options);
    }
    (tag, None)
}

fn element(out: &mut String, depth: usize, tag: &str, text: &str) {
    let _ = writeln!(
        out,
        "{}<{tag}>{}</{tag}>",
        INDENT.repeat(depth),
        xml_escape(text)
    );
}

fn render_member(out: &mut String, exposed: &ExposedMember) {
    let member = &exposed.member;
    let (tag, options) = field_kind(exposed);
    let pad = INDENT.repeat(2);
    match options {
        Some(options) => {
            let _ = writeln!(out, "{pad}<{tag} {options}>");
        }
        None => {
            let _ = writeln!(out, "{pad}<{tag}>");
        }
    }

    element(out, 3, "name", &exposed.name);
    element(out, 3, "longflag", &exposed.name);
    element(out, 3, "label", &exposed.name);
    if !member.doc.is_empty() {
        element(out, 3, "description", &member.doc);
    }
    if let Some(ref default) = member.default {
        if !default.is_empty() {
            element(out, 3, "default", &default.descriptor_text());
        }
    }
    for value in member.constraint.enumeration_values() {
        element(out, 3, "element", &value.to_string());
    }
    if let Some((min, max, step)) = member.constraint.range_values() {
        let _ = writeln!(out, "{}<constraints>", INDENT.repeat(3));
        for (name, bound) in [("minimum", min), ("maximum", max), ("step", step)] {
            if let Some(bound) = bound {
                element(out, 4, name, &format_float(bound));
            }
        }
        let _ = writeln!(out, "{}</constraints>", INDENT.repeat(3));
    }
    if exposed.channel.is_file() {
        element(out, 3, "channel", exposed.channel.as_str());
    }
    let _ = writeln!(out, "{pad}</{tag}>");
}

/// Renders the descriptor: a fixed preamble and one `<parameters>` block per stage.
#[must_use]
pub fn render_descriptor(options: &WrapperOptions, stages: &[StageParameters]) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<executable>\n");
    element(&mut out, 1, "category", &options.category);
    element(&mut out, 1, "title", &options.title);
    element(&mut out, 1, "description", &options.description);
    element(&mut out, 1, "contributor", &options.contributor);

    for stage in stages {
        let _ = writeln!(out, "{INDENT}<parameters>");
        element(&mut out, 2, "label", &format!("{} Parameters", stage.stage));
        for exposed in &stage.exposed {
            render_member(&mut out, exposed);
        }
        let _ = writeln!(out, "{INDENT}</parameters>");
    }

    out.push_str("</executable>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::members::MemberDescriptor;

    fn exposed(member: MemberDescriptor, channel: Channel) -> ExposedMember {
        ExposedMember {
            stage: "stage".to_string(),
            name: "Exposed".to_string(),
            channel,
            member,
            position: 2,
        }
    }

    #[test]
    fn test_xml_escape() {
        assert_eq!(xml_escape(r#"a<b>&"c'"#), "a&lt;b&gt;&amp;&quot;c&apos;");
    }

    #[test]
    fn test_field_kinds() {
        let cases = [
            (MemberDescriptor::new("A", "a", TypeTag::Int), "integer"),
            (
                MemberDescriptor::new("A", "a", TypeTag::Float).with_arity(Arity::Exactly(3)),
                "float-vector",
            ),
            (MemberDescriptor::switch("A", "a"), "boolean"),
            (MemberDescriptor::new("A", "a", "image"), "image"),
            (MemberDescriptor::new("A", "a", "surface"), "geometry"),
        ];
        for (member, expected) in cases {
            assert_eq!(field_kind(&exposed(member, Channel::Unspecified)).0, expected);
        }
    }

    #[test]
    fn test_point_channel() {
        let member = MemberDescriptor::new("Seed", "seed", TypeTag::Float).with_arity(Arity::Exactly(3));
        assert_eq!(field_kind(&exposed(member, Channel::Point)), ("point".to_string(), None));
    }

    #[test]
    fn test_empty_default_is_omitted() {
        let member = MemberDescriptor::new("Name", "name", TypeTag::Str).with_default("");
        let mut out = String::new();
        render_member(&mut out, &exposed(member, Channel::Output));

        assert!(!out.contains("<default>"));
        assert!(out.contains("<channel>output</channel>"));
    }
}
