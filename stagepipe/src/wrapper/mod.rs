//! Wrapper generation: turn an annotated chain into a parameter descriptor
//! and a stand-alone command-line stub.
//!
//! A chain argument written `Name@channel` right after an option flag
//! exposes that option's member under `Name`. The descriptor lists every
//! exposed member; the stub maps `--Name` flags back onto the chain and
//! runs it.

mod descriptor;
mod stub;

pub use descriptor::{render_descriptor, xml_escape};
pub use stub::render_stub;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::errors::{MemberBindingError, PypeError};
use crate::members::{builtin_inputs, Arity, MemberDescriptor, TypeTag};
use crate::pipeline::tokenize;
use crate::stages::StageRegistry;

/// The only wrapper mode with a defined output format.
pub const DEFAULT_MODE: &str = "slicer3";

fn default_mode() -> String {
    DEFAULT_MODE.to_string()
}

fn default_category() -> String {
    "stagepipe".to_string()
}

fn default_pype_program() -> String {
    "pype".to_string()
}

/// Descriptor preamble and stub settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrapperOptions {
    /// Target descriptor dialect.
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Descriptor category.
    #[serde(default = "default_category")]
    pub category: String,
    /// Module title.
    #[serde(default)]
    pub title: String,
    /// Module description.
    #[serde(default)]
    pub description: String,
    /// Module contributor.
    #[serde(default)]
    pub contributor: String,
    /// Program the stub executes.
    #[serde(default = "default_pype_program")]
    pub pype_program: String,
}

impl Default for WrapperOptions {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            category: default_category(),
            title: String::new(),
            description: String::new(),
            contributor: String::new(),
            pype_program: default_pype_program(),
        }
    }
}

impl WrapperOptions {
    /// Creates the default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the mode.
    #[must_use]
    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = mode.into();
        self
    }

    /// Sets the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the contributor.
    #[must_use]
    pub fn with_contributor(mut self, contributor: impl Into<String>) -> Self {
        self.contributor = contributor.into();
        self
    }

    /// Sets the program the stub runs.
    #[must_use]
    pub fn with_pype_program(mut self, program: impl Into<String>) -> Self {
        self.pype_program = program.into();
        self
    }
}

/// Role of an exposed member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// A file the module reads.
    Input,
    /// A file the module writes.
    Output,
    /// Point coordinates picked by the host.
    Point,
    /// No channel given.
    Unspecified,
    /// Any other annotation, carried through untouched.
    Other(String),
}

impl Channel {
    /// Parses the text after `@`.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        match text {
            "input" => Self::Input,
            "output" => Self::Output,
            "point" => Self::Point,
            "" => Self::Unspecified,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns true for `input` and `output`.
    #[must_use]
    pub fn is_file(&self) -> bool {
        matches!(self, Self::Input | Self::Output)
    }

    /// Name written into the descriptor.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Point => "point",
            Self::Unspecified => "",
            Self::Other(other) => other,
        }
    }
}

/// A member exposed under an external name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposedMember {
    /// Stage the member belongs to.
    pub stage: String,
    /// External name, used as flag and label.
    pub name: String,
    /// Channel annotation.
    pub channel: Channel,
    /// The underlying member.
    pub member: MemberDescriptor,
    /// Index of the `Name@channel` token in the chain body.
    pub position: usize,
}

impl ExposedMember {
    /// Returns true if the stub treats this member as an on/off flag.
    #[must_use]
    pub fn is_flag(&self) -> bool {
        self.member.type_tag == TypeTag::Bool
    }

    /// Returns true for switch members, whose flag token itself is substituted.
    #[must_use]
    pub fn is_switch(&self) -> bool {
        self.member.arity == Arity::Switch
    }
}

/// One token of the reconstructed chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallToken {
    /// Copied as is.
    Literal(String),
    /// Filled with the value of the named exposed member.
    Slot(String),
}

/// The chain with exposed members replaced by slots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconstructedCall {
    /// Tokens in chain order.
    pub tokens: Vec<CallToken>,
}

impl ReconstructedCall {
    /// Names of the slots, in the order they appear in the chain.
    #[must_use]
    pub fn ordered_names(&self) -> Vec<&str> {
        self.tokens
            .iter()
            .filter_map(|token| match token {
                CallToken::Slot(name) => Some(name.as_str()),
                CallToken::Literal(_) => None,
            })
            .collect()
    }

    /// A printf-style format string: slots become `%s`, literal `%` and `\`
    /// are escaped so printf copies them unchanged.
    #[must_use]
    pub fn format_string(&self) -> String {
        self.tokens
            .iter()
            .map(|token| match token {
                CallToken::Literal(text) => text.replace('\\', "\\\\").replace('%', "%%"),
                CallToken::Slot(_) => "%s".to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Fills every slot from `values`; missing values become empty strings.
    #[must_use]
    pub fn render(&self, values: &HashMap<String, String>) -> String {
        self.tokens
            .iter()
            .map(|token| match token {
                CallToken::Literal(text) => text.clone(),
                CallToken::Slot(name) => values.get(name).cloned().unwrap_or_default(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Everything a wrapper generation produces.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedWrapper {
    /// The XML parameter descriptor.
    pub descriptor: String,
    /// Source of the shell stub.
    pub source: String,
    /// Exposed members, per stage in declaration order.
    pub exposed: Vec<ExposedMember>,
    /// The chain the stub runs.
    pub call: ReconstructedCall,
}

impl GeneratedWrapper {
    /// Writes the stub to `path` and marks it executable where supported.
    pub fn write_module(&self, path: &Path) -> Result<(), PypeError> {
        std::fs::write(path, &self.source)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut permissions = std::fs::metadata(path)?.permissions();
            permissions.set_mode(0o755);
            std::fs::set_permissions(path, permissions)?;
        }
        info!(path = %path.display(), "Wrote wrapper module");
        Ok(())
    }
}

/// Members of one stage, grouped for the descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct StageParameters {
    /// Stage name.
    pub stage: String,
    /// Exposed members of the stage.
    pub exposed: Vec<ExposedMember>,
}

fn exposure(token: &str) -> Option<(&str, &str)> {
    match token.find('@') {
        Some(index) if index > 0 => {
            let name = &token[..index];
            let rest = &token[index + 1..];
            let channel = rest.split('@').next().unwrap_or_default();
            Some((name, channel))
        }
        _ => None,
    }
}

/// Builds descriptors and stubs from annotated chains.
#[derive(Debug)]
pub struct WrapperGenerator {
    registry: Arc<StageRegistry>,
    options: WrapperOptions,
}

impl WrapperGenerator {
    /// Creates a generator.
    #[must_use]
    pub fn new(registry: Arc<StageRegistry>, options: WrapperOptions) -> Self {
        Self { registry, options }
    }

    /// Returns the options.
    #[must_use]
    pub fn options(&self) -> &WrapperOptions {
        &self.options
    }

    /// Generates the descriptor and stub for a chain body.
    ///
    /// `command_line` is the generating command, echoed by the stub's
    /// `--pypewrapper` flag.
    pub fn generate<S: AsRef<str>>(
        &self,
        body: &[S],
        command_line: &str,
    ) -> Result<GeneratedWrapper, PypeError> {
        if self.options.mode != DEFAULT_MODE {
            warn!(mode = %self.options.mode, "Unknown wrapper mode, using {DEFAULT_MODE} format");
        }

        let pipeline = tokenize(body)?;
        let mut stages = Vec::with_capacity(pipeline.len());
        let mut offset = 0;
        for descriptor in &pipeline {
            let first_argument = offset + 1;
            stages.push(self.expose_stage(
                &descriptor.name,
                &descriptor.arguments,
                first_argument,
            )?);
            offset = first_argument + descriptor.arguments.len() + 1;
        }

        let exposed: Vec<ExposedMember> = stages
            .iter()
            .flat_map(|stage| stage.exposed.iter().cloned())
            .collect();
        let call = reconstruct_call(body, &exposed);
        let descriptor = render_descriptor(&self.options, &stages);
        let source = render_stub(&self.options, &descriptor, command_line, &exposed, &call);

        info!(
            stages = stages.len(),
            exposed = exposed.len(),
            "Generated wrapper"
        );
        Ok(GeneratedWrapper {
            descriptor,
            source,
            exposed,
            call,
        })
    }

    fn expose_stage(
        &self,
        stage_name: &str,
        arguments: &[String],
        first_argument: usize,
    ) -> Result<StageParameters, PypeError> {
        let stage = self.registry.resolve(stage_name)?;
        let mut members = builtin_inputs();
        members.extend(stage.input_members());
        members.extend(stage.output_members());

        let mut by_option: HashMap<&str, (&str, Channel, usize)> = HashMap::new();
        for (index, token) in arguments.iter().enumerate() {
            let Some((name, channel)) = exposure(token) else {
                continue;
            };
            let Some(option) = index
                .checked_sub(1)
                .and_then(|previous| arguments[previous].strip_prefix('-'))
            else {
                return Err(MemberBindingError::new(
                    stage_name,
                    name,
                    "exposed value must follow an option flag",
                )
                .with_value(token.as_str())
                .into());
            };
            if !members.iter().any(|m| m.option == option) {
                return Err(MemberBindingError::unknown_option(stage_name, option).into());
            }
            by_option.insert(option, (name, Channel::parse(channel), first_argument + index));
        }

        let mut exposed = Vec::new();
        for member in members {
            if let Some((name, channel, position)) = by_option.remove(member.option.as_str()) {
                debug!(stage = stage_name, member = %member.name, exposed = name, "Exposing member");
                exposed.push(ExposedMember {
                    stage: stage_name.to_string(),
                    name: name.to_string(),
                    channel,
                    member,
                    position,
                });
            }
        }

        Ok(StageParameters {
            stage: stage_name.to_string(),
            exposed,
        })
    }
}

/// Replaces exposed tokens with slots, keeping every slot at its original
/// token position.
fn reconstruct_call<S: AsRef<str>>(body: &[S], exposed: &[ExposedMember]) -> ReconstructedCall {
    let mut tokens: Vec<Option<CallToken>> = body
        .iter()
        .map(|token| Some(CallToken::Literal(token.as_ref().to_string())))
        .collect();

    for member in exposed {
        let position = member.position;
        let flag = position - 1;
        if member.is_switch() {
            tokens[flag] = Some(CallToken::Slot(member.name.clone()));
            tokens[position] = None;
            continue;
        }
        if member.channel.is_file() && member.member.type_tag.is_object() {
            if let Some(CallToken::Literal(text)) = &mut tokens[flag] {
                text.push_str("file");
            }
        }
        tokens[position] = Some(CallToken::Slot(member.name.clone()));
    }

    ReconstructedCall {
        tokens: tokens.into_iter().flatten().collect(),
    }
}
