//! Per-stage records and the result of a chain run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::PypeError;
use crate::members::{MemberDescriptor, MemberValues, Value};

/// The lifecycle state of one stage in a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Created, arguments not yet bound.
    #[default]
    Pending,
    /// Arguments bound.
    Bound,
    /// Currently executing.
    Executing,
    /// Executed successfully.
    Completed,
    /// Binding or execution failed.
    Failed,
    /// Bypassed with `-disabled`.
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Bound => write!(f, "bound"),
            Self::Executing => write!(f, "executing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

/// What happened to one stage of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage name.
    pub name: String,
    /// Value of the `Id` member.
    pub id: String,
    /// Final status.
    pub status: StageStatus,
    /// True for readers and writers created by the binder.
    pub synthetic: bool,
    /// Input values the stage executed with.
    pub inputs: MemberValues,
    /// Output values the stage produced.
    pub outputs: MemberValues,
    /// Declared inputs, including the built-ins.
    #[serde(skip)]
    pub input_members: Vec<MemberDescriptor>,
    /// Declared outputs.
    #[serde(skip)]
    pub output_members: Vec<MemberDescriptor>,
    /// Inputs pushed downstream with `-option@`, offered to implicit piping
    /// like outputs.
    #[serde(default)]
    pub pushed: Vec<String>,
    /// Error text when the stage failed.
    pub error: Option<String>,
    /// Wall time spent in binding and execution.
    pub duration_ms: u64,
}

impl StageRecord {
    /// Creates a pending record.
    #[must_use]
    pub fn pending(name: impl Into<String>, synthetic: bool) -> Self {
        Self {
            name: name.into(),
            id: "0".to_string(),
            status: StageStatus::Pending,
            synthetic,
            inputs: MemberValues::new(),
            outputs: MemberValues::new(),
            input_members: Vec::new(),
            output_members: Vec::new(),
            pushed: Vec::new(),
            error: None,
            duration_ms: 0,
        }
    }

    /// Looks up a member value by option, outputs first.
    #[must_use]
    pub fn value_for_option(&self, option: &str) -> Option<&Value> {
        if let Some(member) = self.output_members.iter().find(|m| m.option == option) {
            return self.outputs.get(&member.name);
        }
        self.input_members
            .iter()
            .find(|m| m.option == option)
            .and_then(|member| self.inputs.get(&member.name))
    }

    /// Finds the member this stage offers to implicit piping for `member`:
    /// same name and type, pushed inputs before outputs.
    ///
    /// Returns the offering member's name and its value, if it has one.
    #[must_use]
    pub fn piped_member(&self, member: &MemberDescriptor) -> Option<(&str, Option<&Value>)> {
        let compatible = |candidate: &&MemberDescriptor| {
            candidate.auto_pipe
                && candidate.name == member.name
                && candidate.type_tag == member.type_tag
        };

        if let Some(pushed) = self
            .input_members
            .iter()
            .filter(|m| self.pushed.contains(&m.name))
            .find(compatible)
        {
            return Some((pushed.name.as_str(), self.inputs.get(&pushed.name)));
        }
        self.output_members
            .iter()
            .find(compatible)
            .map(|output| (output.name.as_str(), self.outputs.get(&output.name)))
    }

    /// Returns true if the stage declares a member with this option.
    #[must_use]
    pub fn declares_option(&self, option: &str) -> bool {
        self.output_members
            .iter()
            .chain(self.input_members.iter())
            .any(|m| m.option == option)
    }
}

/// Record of a stage failure that did not abort the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Stage name.
    pub stage: String,
    /// Error message.
    pub error: String,
    /// Error type name.
    pub error_type: String,
    /// When it failed.
    pub timestamp: DateTime<Utc>,
}

impl FailureRecord {
    /// Creates a failure record from an error.
    #[must_use]
    pub fn from_error(stage: impl Into<String>, error: &PypeError) -> Self {
        Self {
            stage: stage.into(),
            error: error.to_string(),
            error_type: error.error_type().to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// The outcome of a chain run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunResult {
    /// One record per stage, synthesized readers and writers included, in
    /// execution order.
    pub records: Vec<StageRecord>,
    /// Failures tolerated because `abort_on_error` was off.
    pub failures: Vec<FailureRecord>,
    /// True if a stage printed usage text and stopped the chain.
    pub halted: bool,
    /// Total wall time.
    pub duration_ms: u64,
}

impl RunResult {
    /// Returns true if no stage failed.
    #[must_use]
    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of completed stages.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status == StageStatus::Completed)
            .count()
    }

    /// The last record of a stage with this name.
    #[must_use]
    pub fn record(&self, name: &str) -> Option<&StageRecord> {
        self.records.iter().rev().find(|r| r.name == name)
    }

    /// Outputs of the last run of `name`.
    #[must_use]
    pub fn outputs_of(&self, name: &str) -> Option<&MemberValues> {
        self.record(name).map(|r| &r.outputs)
    }

    /// The most recent value of output `member` across all stages.
    #[must_use]
    pub fn last_output(&self, member: &str) -> Option<&Value> {
        self.records
            .iter()
            .rev()
            .find_map(|r| r.outputs.get(member))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ExecutionError;
    use crate::members::TypeTag;

    #[test]
    fn test_status_display_and_terminal() {
        assert_eq!(StageStatus::Completed.to_string(), "completed");
        assert!(StageStatus::Skipped.is_terminal());
        assert!(!StageStatus::Executing.is_terminal());
    }

    #[test]
    fn test_status_serialize() {
        let json = serde_json::to_string(&StageStatus::Failed).unwrap();
        assert_eq!(json, r#""failed""#);
    }

    #[test]
    fn test_value_for_option_prefers_outputs() {
        let mut record = StageRecord::pending("stageB", false);
        record.input_members = vec![MemberDescriptor::new("Y", "y", TypeTag::Int)];
        record.output_members = vec![MemberDescriptor::new("YOut", "y", TypeTag::Int)];
        record.inputs.set("Y", 1);
        record.outputs.set("YOut", 2);

        assert_eq!(record.value_for_option("y"), Some(&Value::Int(2)));
        assert!(record.declares_option("y"));
        assert!(!record.declares_option("z"));
    }

    #[test]
    fn test_piped_member_prefers_pushed_input() {
        let mut record = StageRecord::pending("smooth", false);
        record.input_members = vec![MemberDescriptor::new("Radius", "radius", TypeTag::Float)];
        record.output_members = vec![MemberDescriptor::new("Radius", "radius", TypeTag::Float)];
        record.inputs.set("Radius", 1.5);
        record.outputs.set("Radius", 3.0);

        let wanted = MemberDescriptor::new("Radius", "r", TypeTag::Float);
        assert_eq!(
            record.piped_member(&wanted),
            Some(("Radius", Some(&Value::Float(3.0))))
        );

        record.pushed.push("Radius".to_string());
        assert_eq!(
            record.piped_member(&wanted),
            Some(("Radius", Some(&Value::Float(1.5))))
        );

        let other_type = MemberDescriptor::new("Radius", "r", TypeTag::Int);
        assert_eq!(record.piped_member(&other_type), None);
    }

    #[test]
    fn test_failure_record_from_error() {
        let err: PypeError = ExecutionError::new("stageA", "boom").into();
        let record = FailureRecord::from_error("stageA", &err);
        assert_eq!(record.error_type, "ExecutionError");
        assert!(record.error.contains("boom"));
    }

    #[test]
    fn test_last_output_searches_backwards() {
        let mut first = StageRecord::pending("a", false);
        first.outputs.set("Count", 1);
        let mut second = StageRecord::pending("b", false);
        second.outputs.set("Count", 2);

        let result = RunResult {
            records: vec![first, second],
            ..RunResult::default()
        };
        assert_eq!(result.last_output("Count"), Some(&Value::Int(2)));
        assert!(result.success());
    }
}
