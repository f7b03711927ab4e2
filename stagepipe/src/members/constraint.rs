//! Range and enumeration constraints on member values.

use serde::{Deserialize, Serialize};

use super::value::Value;

/// A constraint on the values a member accepts.
///
/// A range may leave either bound open.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    /// Any value is accepted.
    #[default]
    None,
    /// Numeric range, both bounds inclusive.
    Range {
        /// Lower bound.
        min: Option<f64>,
        /// Upper bound.
        max: Option<f64>,
        /// Suggested step, used only for descriptors.
        step: Option<f64>,
    },
    /// One of a fixed set of values.
    Enumeration {
        /// The accepted values.
        values: Vec<Value>,
    },
}

impl Constraint {
    /// A closed numeric range.
    #[must_use]
    pub fn range(min: f64, max: f64) -> Self {
        Self::Range {
            min: Some(min),
            max: Some(max),
            step: None,
        }
    }

    /// A lower-bounded range.
    #[must_use]
    pub fn at_least(min: f64) -> Self {
        Self::Range {
            min: Some(min),
            max: None,
            step: None,
        }
    }

    /// An enumeration.
    #[must_use]
    pub fn enumeration<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Enumeration {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Adds a step to a range; no effect on other constraints.
    #[must_use]
    pub fn with_step(self, step: f64) -> Self {
        match self {
            Self::Range { min, max, .. } => Self::Range {
                min,
                max,
                step: Some(step),
            },
            other => other,
        }
    }

    /// Returns true when there is no constraint.
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Checks a single (non-list) value.
    #[must_use]
    pub fn is_in_range(&self, value: &Value) -> bool {
        match self {
            Self::None => true,
            Self::Range { min, max, .. } => {
                let Some(number) = value.as_float() else {
                    return false;
                };
                min.map_or(true, |m| number >= m) && max.map_or(true, |m| number <= m)
            }
            Self::Enumeration { values } => values.iter().any(|v| v.loosely_equals(value)),
        }
    }

    /// Returns the enumeration values, empty for other constraints.
    #[must_use]
    pub fn enumeration_values(&self) -> &[Value] {
        match self {
            Self::Enumeration { values } => values,
            _ => &[],
        }
    }

    /// Returns `(min, max, step)` for a range.
    #[must_use]
    pub fn range_values(&self) -> Option<(Option<f64>, Option<f64>, Option<f64>)> {
        match self {
            Self::Range { min, max, step } => Some((*min, *max, *step)),
            _ => None,
        }
    }

    /// Human readable form used in error messages and usage text.
    #[must_use]
    pub fn representation(&self) -> String {
        match self {
            Self::None => String::new(),
            Self::Enumeration { values } => {
                let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
                format!("in [{}]", parts.join(", "))
            }
            Self::Range { min, max, .. } => {
                let mut parts = Vec::new();
                if let Some(min) = min {
                    parts.push(format!(">= {min}"));
                }
                if let Some(max) = max {
                    parts.push(format!("<= {max}"));
                }
                parts.join(" and ")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_range_with_open_bound() {
        let constraint = Constraint::at_least(0.0);
        assert_eq!(constraint.range_values(), Some((Some(0.0), None, None)));
        assert!(constraint.is_in_range(&Value::Int(1_000_000)));
        assert!(!constraint.is_in_range(&Value::Float(-0.5)));
    }

    #[test]
    fn test_range_with_step() {
        let constraint = Constraint::range(0.0, 1.0).with_step(0.1);
        assert_eq!(
            constraint.range_values(),
            Some((Some(0.0), Some(1.0), Some(0.1)))
        );
        assert_eq!(
            Constraint::enumeration(["a"]).with_step(0.1),
            Constraint::enumeration(["a"])
        );
    }

    #[test]
    fn test_enumeration() {
        let constraint = Constraint::enumeration(["upper", "lower"]);
        assert_eq!(
            constraint.enumeration_values(),
            &[Value::from("upper"), Value::from("lower")]
        );
        assert!(constraint.is_in_range(&Value::from("lower")));
        assert!(!constraint.is_in_range(&Value::from("title")));
        assert_eq!(constraint.range_values(), None);
    }

    #[test]
    fn test_numeric_enumeration_accepts_int_for_float() {
        let constraint = Constraint::enumeration([1.0, 2.0]);
        assert!(constraint.is_in_range(&Value::Int(2)));
    }

    #[test]
    fn test_no_constraint_accepts_anything() {
        assert!(Constraint::default().is_none());
        assert!(Constraint::None.is_in_range(&Value::from("x")));
        assert_eq!(Constraint::None.representation(), "");
    }

    #[test]
    fn test_representation() {
        assert_eq!(Constraint::range(0.0, 10.0).representation(), ">= 0 and <= 10");
        assert_eq!(Constraint::at_least(0.5).representation(), ">= 0.5");
        assert_eq!(
            Constraint::enumeration(["a", "b"]).representation(),
            "in [a, b]"
        );
    }

    #[test]
    fn test_range_rejects_non_numeric() {
        assert!(!Constraint::range(0.0, 1.0).is_in_range(&Value::from("x")));
    }
}
