//! Member descriptors: the typed parameter interface of a stage.
//!
//! Every stage declares its inputs and outputs as a list of
//! [`MemberDescriptor`]s. The binder uses them to turn raw command-line
//! tokens into [`Value`]s and the runner uses them to pipe outputs of one
//! stage into the inputs of the next.

mod constraint;
mod value;

pub use constraint::Constraint;
pub use value::{DomainObject, MemberValues, Value};

pub(crate) use value::format_float;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Name of the built-in identifier member.
pub const ID_MEMBER: &str = "Id";

/// Name of the built-in bypass member.
pub const DISABLED_MEMBER: &str = "Disabled";

/// The declared type of a member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeTag {
    /// 64-bit signed integer.
    Int,
    /// 64-bit float.
    Float,
    /// String.
    Str,
    /// Boolean, written `0`/`1` on the command line.
    Bool,
    /// Opaque domain object identified by its kind (`image`, `surface`, `text`...).
    Object(String),
}

impl TypeTag {
    /// Returns the type name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::Bool => "bool",
            Self::Object(kind) => kind,
        }
    }

    /// Returns true for domain object types.
    #[must_use]
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    /// Converts one raw token to a value of this type.
    ///
    /// Domain objects cannot be written literally and always fail here.
    pub fn coerce(&self, token: &str) -> Result<Value, String> {
        match self {
            Self::Int => token
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| format!("'{token}' is not a valid int")),
            Self::Float => token
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| format!("'{token}' is not a valid float")),
            Self::Str => Ok(Value::Str(token.to_string())),
            Self::Bool => match token {
                "1" | "true" => Ok(Value::Bool(true)),
                "0" | "false" => Ok(Value::Bool(false)),
                _ => Err(format!("'{token}' should be either 0 or 1")),
            },
            Self::Object(kind) => Err(format!(
                "expects a {kind} object, which cannot be given as a literal"
            )),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown type names are treated as domain object kinds.
impl From<&str> for TypeTag {
    fn from(name: &str) -> Self {
        match name {
            "int" | "integer" => Self::Int,
            "float" | "double" => Self::Float,
            "str" | "string" => Self::Str,
            "bool" | "boolean" => Self::Bool,
            other => Self::Object(other.to_string()),
        }
    }
}

/// How many values a member takes on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arity {
    /// Presence flag, no values.
    Switch,
    /// Exactly this many values.
    Exactly(usize),
    /// One or more values.
    Variadic,
}

impl Arity {
    /// The conventional length number (`-1` for variadic).
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn length(&self) -> i64 {
        match self {
            Self::Switch => 0,
            Self::Exactly(n) => *n as i64,
            Self::Variadic => -1,
        }
    }

    /// Returns true if the member holds a single scalar.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Switch | Self::Exactly(1))
    }
}

/// One declared parameter of a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberDescriptor {
    /// Member name, unique within its input or output set.
    pub name: String,
    /// Command-line flag without the leading dash.
    pub option: String,
    /// Declared type.
    pub type_tag: TypeTag,
    /// Number of values taken.
    pub arity: Arity,
    /// Value used when nothing else fills the member.
    pub default: Option<Value>,
    /// Range or enumeration constraint.
    pub constraint: Constraint,
    /// Help text.
    pub doc: String,
    /// Reader stage synthesized when a filename is given for an object input.
    pub auto_producer: Option<String>,
    /// Writer stage synthesized when a filename is given for an object output.
    pub auto_consumer: Option<String>,
    /// Whether implicit piping may fill this member.
    pub auto_pipe: bool,
}

impl MemberDescriptor {
    /// Creates a member taking one value and no constraint.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        option: impl Into<String>,
        type_tag: impl Into<TypeTag>,
    ) -> Self {
        Self {
            name: name.into(),
            option: option.into(),
            type_tag: type_tag.into(),
            arity: Arity::Exactly(1),
            default: None,
            constraint: Constraint::None,
            doc: String::new(),
            auto_producer: None,
            auto_consumer: None,
            auto_pipe: true,
        }
    }

    /// Creates a boolean presence flag defaulting to false.
    #[must_use]
    pub fn switch(name: impl Into<String>, option: impl Into<String>) -> Self {
        Self::new(name, option, TypeTag::Bool)
            .with_arity(Arity::Switch)
            .with_default(false)
    }

    /// Sets the arity.
    #[must_use]
    pub fn with_arity(mut self, arity: Arity) -> Self {
        self.arity = arity;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Sets the constraint.
    #[must_use]
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = constraint;
        self
    }

    /// Sets the help text.
    #[must_use]
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    /// Sets the reader stage for object inputs.
    #[must_use]
    pub fn with_auto_producer(mut self, stage: impl Into<String>) -> Self {
        self.auto_producer = Some(stage.into());
        self
    }

    /// Sets the writer stage for object outputs.
    #[must_use]
    pub fn with_auto_consumer(mut self, stage: impl Into<String>) -> Self {
        self.auto_consumer = Some(stage.into());
        self
    }

    /// Excludes the member from implicit piping.
    #[must_use]
    pub fn without_auto_pipe(mut self) -> Self {
        self.auto_pipe = false;
        self
    }

    /// The command-line flag, e.g. `-ifile`.
    #[must_use]
    pub fn flag(&self) -> String {
        format!("-{}", self.option)
    }

    /// The companion filename option of an object member, e.g. `ifile` for `i`.
    #[must_use]
    pub fn file_option(&self) -> String {
        format!("{}file", self.option)
    }

    /// Returns true for the engine's built-in members.
    #[must_use]
    pub fn is_builtin(&self) -> bool {
        self.name == ID_MEMBER || self.name == DISABLED_MEMBER
    }

    /// Checks type and constraint of a bound value.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        if !value.matches(&self.type_tag) {
            return Err(format!("expected {} value", self.type_tag));
        }
        let items: Vec<&Value> = match value {
            Value::List(items) => items.iter().collect(),
            single => vec![single],
        };
        for item in items {
            if !self.constraint.is_in_range(item) {
                return Err(format!(
                    "value {item} should be {}",
                    self.constraint.representation()
                ));
            }
        }
        Ok(())
    }
}

/// The two members every stage carries in addition to its own inputs.
#[must_use]
pub fn builtin_inputs() -> Vec<MemberDescriptor> {
    vec![
        MemberDescriptor::new(ID_MEMBER, "id", TypeTag::Str)
            .with_default("0")
            .with_doc("script id")
            .without_auto_pipe(),
        MemberDescriptor::switch(DISABLED_MEMBER, "disabled")
            .with_doc("disable execution and piping")
            .without_auto_pipe(),
    ]
}

/// Returns the first duplicated member name, if any.
#[must_use]
pub fn find_duplicate_name(members: &[MemberDescriptor]) -> Option<&str> {
    let mut seen = HashSet::new();
    members
        .iter()
        .find(|member| !seen.insert(member.name.as_str()))
        .map(|member| member.name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tag_from_name() {
        assert_eq!(TypeTag::from("int"), TypeTag::Int);
        assert_eq!(TypeTag::from("double"), TypeTag::Float);
        assert_eq!(TypeTag::from("surface"), TypeTag::Object("surface".into()));
        assert_eq!(TypeTag::Object("image".into()).to_string(), "image");
    }

    #[test]
    fn test_coerce_strict_numbers() {
        assert_eq!(TypeTag::Int.coerce("-3"), Ok(Value::Int(-3)));
        assert!(TypeTag::Int.coerce("1.5").is_err());
        assert_eq!(TypeTag::Float.coerce("1e3"), Ok(Value::Float(1000.0)));
        assert!(TypeTag::Float.coerce("abc").is_err());
    }

    #[test]
    fn test_coerce_bool() {
        assert_eq!(TypeTag::Bool.coerce("1"), Ok(Value::Bool(true)));
        assert_eq!(TypeTag::Bool.coerce("false"), Ok(Value::Bool(false)));
        assert!(TypeTag::Bool.coerce("2").is_err());
    }

    #[test]
    fn test_arity_length() {
        assert_eq!(Arity::Switch.length(), 0);
        assert_eq!(Arity::Exactly(3).length(), 3);
        assert_eq!(Arity::Variadic.length(), -1);
    }

    #[test]
    fn test_validate_constraint_on_list_items() {
        let member = MemberDescriptor::new("Origin", "origin", TypeTag::Float)
            .with_arity(Arity::Exactly(3))
            .with_constraint(Constraint::range(0.0, 1.0));

        assert!(member.validate(&Value::from(vec![0.0, 0.5, 1.0])).is_ok());
        assert!(member.validate(&Value::from(vec![0.0, 2.0, 1.0])).is_err());
        assert!(member.validate(&Value::Int(0)).is_err());
    }

    #[test]
    fn test_builtin_members_are_not_auto_piped() {
        let builtins = builtin_inputs();
        assert_eq!(builtins.len(), 2);
        assert!(builtins.iter().all(|m| !m.auto_pipe && m.is_builtin()));
        assert_eq!(builtins[0].default, Some(Value::from("0")));
    }

    #[test]
    fn test_find_duplicate_name() {
        let members = vec![
            MemberDescriptor::new("A", "a", TypeTag::Int),
            MemberDescriptor::new("B", "b", TypeTag::Int),
            MemberDescriptor::new("A", "c", TypeTag::Int),
        ];
        assert_eq!(find_duplicate_name(&members), Some("A"));
        assert_eq!(find_duplicate_name(&members[..2]), None);
    }

    #[test]
    fn test_file_option() {
        let member = MemberDescriptor::new("Text", "i", "text");
        assert_eq!(member.file_option(), "ifile");
        assert_eq!(member.flag(), "-i");
    }
}
