//! Binding one stage's raw tokens to its declared members.

use std::collections::HashSet;
use std::fmt;

use super::spec::{StageDescriptor, SyntheticLink};
use crate::errors::MemberBindingError;
use crate::members::{
    builtin_inputs, find_duplicate_name, Arity, MemberDescriptor, MemberValues, Value,
    DISABLED_MEMBER, ID_MEMBER,
};
use crate::stages::usage::UsageFormat;

/// An upstream member named by an explicit `@stage-id.option` pipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeRef {
    /// Upstream stage name; `None` means the immediately preceding stage.
    pub stage: Option<String>,
    /// Upstream stage id, when given.
    pub id: Option<String>,
    /// Option of the upstream member.
    pub option: String,
}

impl fmt::Display for PipeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("@")?;
        if let Some(ref stage) = self.stage {
            f.write_str(stage)?;
        }
        if let Some(ref id) = self.id {
            write!(f, "-{id}")?;
        }
        write!(f, ".{}", self.option)
    }
}

/// The value of an explicit pipe argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExplicitPipe {
    /// A bare `@`: leave the member unset.
    Clear,
    /// Take the value from an upstream member.
    From(PipeRef),
}

impl ExplicitPipe {
    /// Parses `@`, `@.option`, `@stage.option` or `@stage-id.option`.
    ///
    /// Returns `None` for text that is not a well-formed pipe.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let body = raw.strip_prefix('@')?;
        if body.is_empty() {
            return Some(Self::Clear);
        }

        let (module, option) = body.split_once('.')?;
        if option.is_empty() || option.contains('.') {
            return None;
        }

        let (stage, id) = if module.is_empty() {
            (None, None)
        } else if let Some((name, id)) = module.rsplit_once('-') {
            (Some(name.to_string()), Some(id.to_string()))
        } else {
            (Some(module.to_string()), None)
        };

        Some(Self::From(PipeRef {
            stage,
            id,
            option: option.to_string(),
        }))
    }
}

/// The result of binding a stage's arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStage {
    /// Stage name.
    pub stage: String,
    /// Value of the built-in `Id` member.
    pub id: String,
    /// Value of the built-in `Disabled` member.
    pub disabled: bool,
    /// Literal values, keyed by member name.
    pub values: MemberValues,
    /// Explicit pipes, as `(member name, upstream reference)`.
    pub pipes: Vec<(String, PipeRef)>,
    /// Members explicitly cleared with a bare `@`.
    pub cleared: Vec<String>,
    /// Inputs written `-option@`, whose final value later stages may pipe.
    pub pushed: Vec<String>,
    /// Reader stages to run before this one.
    pub readers: Vec<StageDescriptor>,
    /// Writer stages to run after this one.
    pub writers: Vec<StageDescriptor>,
    /// Set when the arguments asked for usage text instead of a run.
    pub usage: Option<UsageFormat>,
}

impl BoundStage {
    fn new(stage: &str) -> Self {
        Self {
            stage: stage.to_string(),
            id: "0".to_string(),
            disabled: false,
            values: MemberValues::new(),
            pipes: Vec::new(),
            cleared: Vec::new(),
            pushed: Vec::new(),
            readers: Vec::new(),
            writers: Vec::new(),
            usage: None,
        }
    }

    /// Returns true once anything (value, pipe, clear or reader) claims `member`.
    #[must_use]
    pub fn is_claimed(&self, member: &str) -> bool {
        self.values.contains(member)
            || self.pipes.iter().any(|(name, _)| name == member)
            || self.cleared.iter().any(|name| name == member)
            || self.readers.iter().any(|reader| {
                matches!(&reader.synthetic, Some(SyntheticLink::Feeds { member: m }) if m == member)
            })
    }
}

/// Returns true for a token that starts a new option: a dash followed by a
/// letter or another dash. Negative numbers are values. A trailing `@`
/// marks an input pushed downstream.
#[must_use]
pub fn is_flag(token: &str) -> bool {
    let mut chars = token.chars();
    chars.next() == Some('-') && chars.next().is_some_and(|c| c.is_alphabetic() || c == '-')
}

/// Binds `arguments` to the stage's members.
///
/// `inputs` excludes the built-in `Id` and `Disabled` members, which are
/// added here. Binding has no side effects.
pub fn bind(
    stage: &str,
    inputs: &[MemberDescriptor],
    outputs: &[MemberDescriptor],
    arguments: &[String],
) -> Result<BoundStage, MemberBindingError> {
    let mut members = builtin_inputs();
    members.extend(inputs.iter().cloned());

    if let Some(name) = find_duplicate_name(&members).or_else(|| find_duplicate_name(outputs)) {
        return Err(MemberBindingError::new(stage, name, "member declared twice"));
    }

    let mut bound = BoundStage::new(stage);

    if let Some(format) = arguments.iter().find_map(|a| UsageFormat::from_flag(a)) {
        bound.usage = Some(format);
        return Ok(bound);
    }

    if let Some(dash) = arguments.iter().find(|a| a.as_str() == "-") {
        return Err(MemberBindingError::unknown_option(stage, dash.as_str()));
    }

    let first_flag = arguments
        .iter()
        .position(|a| is_flag(a))
        .unwrap_or(arguments.len());

    for token in &arguments[..first_flag] {
        bind_positional(stage, &members, token, &mut bound)?;
    }

    let mut seen = HashSet::new();
    let mut index = first_flag;
    while index < arguments.len() {
        let raw = arguments[index].as_str();
        let end = arguments[index + 1..]
            .iter()
            .position(|a| is_flag(a))
            .map_or(arguments.len(), |offset| index + 1 + offset);
        let (flag, pushed) = raw.strip_suffix('@').map_or((raw, false), |f| (f, true));
        let option = flag.trim_start_matches('-');

        if !seen.insert(option) {
            return Err(MemberBindingError::new(stage, option, "specified more than once"));
        }
        if pushed {
            let member = members
                .iter()
                .find(|m| m.option == option && !m.is_builtin())
                .ok_or_else(|| MemberBindingError::unknown_option(stage, raw))?;
            bound.pushed.push(member.name.clone());
        }
        bind_option(stage, &members, outputs, flag, &arguments[index + 1..end], &mut bound)?;
        index = end;
    }

    Ok(bound)
}

fn bind_option(
    stage: &str,
    members: &[MemberDescriptor],
    outputs: &[MemberDescriptor],
    flag: &str,
    values: &[String],
    bound: &mut BoundStage,
) -> Result<(), MemberBindingError> {
    let option = flag.trim_start_matches('-');

    if let Some(member) = members.iter().find(|m| m.option == option) {
        return assign(stage, member, values, bound);
    }

    if let Some(member) = members
        .iter()
        .find(|m| m.auto_producer.is_some() && m.file_option() == option)
    {
        let path = single_value(stage, option, values)?;
        if let Some(ref producer) = member.auto_producer {
            bound
                .readers
                .push(StageDescriptor::reader(producer, path, &member.name));
        }
        return Ok(());
    }

    if let Some(member) = outputs
        .iter()
        .find(|m| m.auto_consumer.is_some() && m.file_option() == option)
    {
        let path = single_value(stage, option, values)?;
        if let Some(ref consumer) = member.auto_consumer {
            bound
                .writers
                .push(StageDescriptor::writer(consumer, path, &member.name));
        }
        return Ok(());
    }

    Err(MemberBindingError::unknown_option(stage, flag))
}

fn single_value<'a>(
    stage: &str,
    option: &str,
    values: &'a [String],
) -> Result<&'a str, MemberBindingError> {
    match values {
        [value] => Ok(value),
        _ => Err(MemberBindingError::wrong_count(stage, option, values.len(), "1")),
    }
}

fn assign(
    stage: &str,
    member: &MemberDescriptor,
    values: &[String],
    bound: &mut BoundStage,
) -> Result<(), MemberBindingError> {
    let option = member.option.as_str();

    if let Some(first) = values.first().filter(|v| v.starts_with('@')) {
        if values.len() != 1 {
            return Err(MemberBindingError::invalid_pipe(stage, option, first.as_str()));
        }
        match ExplicitPipe::parse(first) {
            Some(ExplicitPipe::Clear) => bound.cleared.push(member.name.clone()),
            Some(ExplicitPipe::From(pipe)) => bound.pipes.push((member.name.clone(), pipe)),
            None => return Err(MemberBindingError::invalid_pipe(stage, option, first.as_str())),
        }
        return Ok(());
    }

    match member.arity {
        Arity::Switch => {
            if !values.is_empty() {
                return Err(MemberBindingError::wrong_count(stage, option, values.len(), "0"));
            }
            return set_value(member, Value::Bool(true), bound);
        }
        Arity::Exactly(n) if values.len() != n => {
            return Err(MemberBindingError::wrong_count(
                stage,
                option,
                values.len(),
                &n.to_string(),
            ));
        }
        Arity::Variadic if values.is_empty() => {
            return Err(MemberBindingError::wrong_count(stage, option, 0, "1 or more"));
        }
        _ => {}
    }

    if member.type_tag.is_object() {
        return match (&member.auto_producer, member.arity) {
            (Some(producer), Arity::Exactly(1)) => {
                bound
                    .readers
                    .push(StageDescriptor::reader(producer, &values[0], &member.name));
                Ok(())
            }
            _ => {
                let reason = member
                    .type_tag
                    .coerce(&values[0])
                    .err()
                    .unwrap_or_default();
                Err(MemberBindingError::bad_value(stage, option, values[0].as_str(), reason))
            }
        };
    }

    let coerced = values
        .iter()
        .map(|token| coerce_checked(stage, member, token))
        .collect::<Result<Vec<_>, _>>()?;

    let value = if member.arity == Arity::Exactly(1) {
        coerced.into_iter().next().unwrap_or(Value::List(Vec::new()))
    } else {
        Value::List(coerced)
    };
    set_value(member, value, bound)
}

fn coerce_checked(
    stage: &str,
    member: &MemberDescriptor,
    token: &str,
) -> Result<Value, MemberBindingError> {
    let value = member
        .type_tag
        .coerce(token)
        .map_err(|reason| MemberBindingError::bad_value(stage, &member.option, token, reason))?;

    if !member.constraint.is_in_range(&value) {
        return Err(MemberBindingError::out_of_range(
            stage,
            &member.option,
            token,
            &member.constraint.representation(),
        ));
    }
    Ok(value)
}

fn set_value(
    member: &MemberDescriptor,
    value: Value,
    bound: &mut BoundStage,
) -> Result<(), MemberBindingError> {
    if member.name == ID_MEMBER {
        bound.id = value.to_string();
    } else if member.name == DISABLED_MEMBER {
        bound.disabled = value.as_bool().unwrap_or(false);
    }
    bound.values.set(member.name.clone(), value);
    Ok(())
}

fn accepts_positional(member: &MemberDescriptor, token: &str) -> bool {
    if member.type_tag.is_object() {
        return member.auto_producer.is_some();
    }
    member
        .type_tag
        .coerce(token)
        .is_ok_and(|value| member.constraint.is_in_range(&value))
}

fn bind_positional(
    stage: &str,
    members: &[MemberDescriptor],
    token: &str,
    bound: &mut BoundStage,
) -> Result<(), MemberBindingError> {
    let target = members
        .iter()
        .filter(|m| !m.is_builtin())
        .filter(|m| matches!(m.arity, Arity::Exactly(1) | Arity::Variadic))
        .filter(|m| !bound.is_claimed(&m.name))
        .find(|m| accepts_positional(m, token));

    if let Some(member) = target {
        return assign(stage, member, &[token.to_string()], bound);
    }

    // A member whose type fits but whose range does not explains the miss.
    let out_of_range = members
        .iter()
        .filter(|m| !m.is_builtin() && !m.type_tag.is_object())
        .filter(|m| matches!(m.arity, Arity::Exactly(1) | Arity::Variadic))
        .filter(|m| !bound.is_claimed(&m.name))
        .find(|m| m.type_tag.coerce(token).is_ok());
    Err(match out_of_range {
        Some(member) => MemberBindingError::out_of_range(
            stage,
            &member.option,
            token,
            &member.constraint.representation(),
        ),
        None => MemberBindingError::new(stage, token, "unexpected positional argument")
            .with_value(token),
    })
}
