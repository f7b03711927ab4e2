//! POSIX shell stub rendering.

use std::fmt::Write;

use super::{ExposedMember, ReconstructedCall, WrapperOptions};

/// Quotes `text` for a POSIX shell.
fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

fn variable(exposed: &ExposedMember) -> String {
    let name: String = exposed
        .name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("PYPE_{name}")
}

fn write_flag_case(out: &mut String, exposed: &ExposedMember) {
    let var = variable(exposed);
    let flag = &exposed.name;
    if exposed.is_flag() {
        let on = if exposed.is_switch() {
            exposed.member.flag()
        } else {
            "1".to_string()
        };
        let _ = writeln!(out, "    --{flag}) {var}={}; shift ;;", shell_quote(&on));
        return;
    }
    let _ = writeln!(out, "    --{flag})");
    let _ = writeln!(out, "      if [ $# -gt 1 ]; then");
    let _ = writeln!(out, "        case \"$2\" in");
    let _ = writeln!(out, "          --*) ;;");
    let _ = writeln!(out, "          *) {var}=\"${{{var}:+${var},}}$2\"; shift ;;");
    let _ = writeln!(out, "        esac");
    let _ = writeln!(out, "      fi");
    let _ = writeln!(out, "      shift ;;");
}

/// Renders the stub source.
///
/// The stub answers `--xml`, `--logo` and `--pypewrapper`, collects one
/// `--<Name>` flag per exposed member and runs the reconstructed chain.
#[must_use]
pub fn render_stub(
    options: &WrapperOptions,
    descriptor: &str,
    command_line: &str,
    exposed: &[ExposedMember],
    call: &ReconstructedCall,
) -> String {
    let mut out = String::from("#!/bin/sh\n# Generated by pypewrapper.\n\n");
    let _ = writeln!(out, "XML_DESCRIPTION={}", shell_quote(descriptor.trim_end()));
    let _ = writeln!(out, "PYPEWRAPPER_COMMAND={}", shell_quote(command_line));
    out.push('\n');

    out.push_str("for arg in \"$@\"; do\n");
    out.push_str("  case \"$arg\" in\n");
    out.push_str("    --xml) printf '%s\\n' \"$XML_DESCRIPTION\"; exit 0 ;;\n");
    out.push_str("    --logo) exit 0 ;;\n");
    out.push_str("    --pypewrapper) printf '%s\\n' \"$PYPEWRAPPER_COMMAND\"; exit 0 ;;\n");
    out.push_str("  esac\n");
    out.push_str("done\n\n");

    for member in exposed {
        let initial = if member.is_flag() && !member.is_switch() {
            "0"
        } else {
            ""
        };
        let _ = writeln!(out, "{}={}", variable(member), shell_quote(initial));
    }
    out.push('\n');

    out.push_str("while [ $# -gt 0 ]; do\n");
    out.push_str("  case \"$1\" in\n");
    for member in exposed {
        write_flag_case(&mut out, member);
    }
    out.push_str("    *) shift ;;\n");
    out.push_str("  esac\n");
    out.push_str("done\n\n");

    for member in exposed.iter().filter(|m| !m.is_flag()) {
        let var = variable(member);
        let _ = writeln!(out, "{var}=$(printf '%s' \"${var}\" | tr ',' ' ')");
    }

    let arguments: Vec<String> = call
        .ordered_names()
        .into_iter()
        .filter_map(|name| exposed.iter().find(|m| m.name == name))
        .map(|member| format!("\"${}\"", variable(member)))
        .collect();
    let _ = writeln!(
        out,
        "PIPE=$(printf {} {})",
        shell_quote(&call.format_string()),
        arguments.join(" ")
    );
    let _ = writeln!(
        out,
        "exec {} --command \"$PIPE\"",
        shell_quote(&options.pype_program)
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::members::{MemberDescriptor, TypeTag};
    use crate::wrapper::{CallToken, Channel};

    fn exposed(name: &str, member: MemberDescriptor, position: usize) -> ExposedMember {
        ExposedMember {
            stage: "stage".to_string(),
            name: name.to_string(),
            channel: Channel::Unspecified,
            member,
            position,
        }
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_stub_passes_values_in_call_order() {
        let members = vec![
            exposed("A", MemberDescriptor::new("A", "a", TypeTag::Int), 4),
            exposed("B", MemberDescriptor::new("B", "b", TypeTag::Int), 2),
        ];
        let call = ReconstructedCall {
            tokens: vec![
                CallToken::Literal("stage".to_string()),
                CallToken::Literal("-b".to_string()),
                CallToken::Slot("B".to_string()),
                CallToken::Literal("-a".to_string()),
                CallToken::Slot("A".to_string()),
            ],
        };

        let source = render_stub(&WrapperOptions::new(), "<executable/>", "gen", &members, &call);

        assert!(source.starts_with("#!/bin/sh\n"));
        assert!(source.contains("PIPE=$(printf 'stage -b %s -a %s' \"$PYPE_B\" \"$PYPE_A\")"));
        assert!(source.contains("exec 'pype' --command \"$PIPE\""));
        assert!(source.contains("--xml) printf"));
    }

    #[test]
    fn test_literal_escapes_reach_printf_unchanged() {
        let members = vec![exposed("A", MemberDescriptor::new("A", "a", TypeTag::Str), 2)];
        let call = ReconstructedCall {
            tokens: vec![
                CallToken::Literal("echo".to_string()),
                CallToken::Literal(r"-message=C:\new\100%".to_string()),
                CallToken::Slot("A".to_string()),
            ],
        };

        assert_eq!(call.format_string(), r"echo -message=C:\\new\\100%% %s");
        let source = render_stub(&WrapperOptions::new(), "", "", &members, &call);
        assert!(source.contains(r#"PIPE=$(printf 'echo -message=C:\\new\\100%% %s' "$PYPE_A")"#));
    }

    #[test]
    fn test_bool_members_toggle() {
        let members = vec![
            exposed("Verbose", MemberDescriptor::switch("Verbose", "verbose"), 2),
            exposed("Flag", MemberDescriptor::new("Flag", "flag", TypeTag::Bool), 4),
        ];
        let source = render_stub(
            &WrapperOptions::new(),
            "",
            "",
            &members,
            &ReconstructedCall::default(),
        );

        assert!(source.contains("--Verbose) PYPE_Verbose='-verbose'; shift ;;"));
        assert!(source.contains("PYPE_Flag='0'"));
        assert!(source.contains("--Flag) PYPE_Flag='1'; shift ;;"));
    }
}
