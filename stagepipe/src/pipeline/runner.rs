//! Sequential chain execution with implicit and explicit piping.

use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::binder::{bind, BoundStage};
use super::result::{FailureRecord, RunResult, StageRecord, StageStatus};
use super::spec::{PipelineSpec, StageDescriptor, SyntheticLink, FILE_PLACEHOLDER};
use super::tokenizer::{split_command, tokenize};
use crate::context::{ExecutionContext, StageContext};
use crate::errors::{ExecutionError, MemberBindingError, PypeError};
use crate::members::{builtin_inputs, MemberDescriptor, MemberValues, Value};
use crate::stages::builtin::BROWSE_PLACEHOLDER;
use crate::stages::usage::render_usage;
use crate::stages::StageRegistry;

enum StageFlow {
    Continue,
    Halt,
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn describe(value: Option<&Value>) -> String {
    match value {
        None => "None".to_string(),
        Some(Value::Object(object)) => object.kind.clone(),
        Some(other) => other.to_string(),
    }
}

/// Runs pipelines stage by stage against a registry.
///
/// For each stage the runner resolves it, binds its arguments, runs any
/// synthesized readers, fills unset inputs by explicit then implicit
/// piping, applies defaults, executes, and finally runs synthesized writers.
pub struct ChainRunner {
    registry: Arc<StageRegistry>,
    ctx: ExecutionContext,
}

impl ChainRunner {
    /// Creates a runner.
    #[must_use]
    pub fn new(registry: Arc<StageRegistry>, ctx: ExecutionContext) -> Self {
        Self { registry, ctx }
    }

    /// Returns the execution context.
    #[must_use]
    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    /// Returns the stage registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<StageRegistry> {
        &self.registry
    }

    /// Splits, tokenizes and runs a command string.
    pub fn run_command(&self, command: &str) -> Result<RunResult, PypeError> {
        let tokens = split_command(command)?;
        self.run_tokens(&tokens)
    }

    /// Tokenizes and runs a flat token sequence.
    ///
    /// `FILE` placeholders are confirmed on the input stream first; declining
    /// (or having no input) returns a halted, empty result.
    pub fn run_tokens<S: AsRef<str>>(&self, tokens: &[S]) -> Result<RunResult, PypeError> {
        let mut tokens: Vec<String> = tokens.iter().map(|t| t.as_ref().to_string()).collect();
        if tokens.iter().any(|t| t == FILE_PLACEHOLDER) && !self.confirm_placeholders(&mut tokens)
        {
            info!("Run cancelled at the file placeholder prompt");
            return Ok(RunResult {
                halted: true,
                ..RunResult::default()
            });
        }
        let pipeline = tokenize(&tokens)?;
        self.run(&pipeline)
    }

    fn confirm_placeholders(&self, tokens: &mut [String]) -> bool {
        self.ctx.write_text(
            "\nThe pipeline contains file name placeholders written FILE.\n\
             Every FILE stands for a file path.\n\n\
             Enter 'c' to continue and be prompted for each path.\n\
             Enter 'e' to exit. You can still edit the pipeline and run it again.\n\n",
        );
        loop {
            match self.ctx.read_line("> ").as_deref() {
                Some("c") => break,
                Some("e") | None => return false,
                Some(_) => {}
            }
        }
        for token in tokens.iter_mut().filter(|t| t.as_str() == FILE_PLACEHOLDER) {
            *token = BROWSE_PLACEHOLDER.to_string();
        }
        true
    }

    /// Runs a pipeline.
    ///
    /// With `abort_on_error` the first failure is returned as an error.
    /// Otherwise failures are logged, recorded in the result, and the chain
    /// continues with the next stage.
    pub fn run(&self, pipeline: &PipelineSpec) -> Result<RunResult, PypeError> {
        let started = Instant::now();
        let mut result = RunResult::default();
        info!(stages = pipeline.len(), "Running pipeline");

        for descriptor in pipeline {
            match self.run_stage(descriptor, None, &mut result) {
                Ok(StageFlow::Continue) => {}
                Ok(StageFlow::Halt) => {
                    result.halted = true;
                    break;
                }
                Err(err) => {
                    if self.ctx.abort_on_error() {
                        self.finish(&mut result, started);
                        return Err(err);
                    }
                    self.tolerate(&descriptor.name, &err, &mut result);
                }
            }
        }

        self.finish(&mut result, started);
        Ok(result)
    }

    fn tolerate(&self, stage: &str, err: &PypeError, result: &mut RunResult) {
        warn!(stage = %stage, error = %err, "Stage failed, continuing");
        self.ctx.write_text(&format!("Error: {err}\n"));
        result.failures.push(FailureRecord::from_error(stage, err));
    }

    fn finish(&self, result: &mut RunResult, started: Instant) {
        result.duration_ms = elapsed_ms(started);
        self.ctx.event_sink().try_emit(
            "pipeline.completed",
            Some(json!({
                "stages": result.records.len(),
                "failures": result.failures.len(),
                "duration_ms": result.duration_ms,
            })),
        );
    }

    fn run_stage(
        &self,
        descriptor: &StageDescriptor,
        injected: Option<&Value>,
        result: &mut RunResult,
    ) -> Result<StageFlow, PypeError> {
        let index = result.records.len();
        result.records.push(StageRecord::pending(
            &descriptor.name,
            descriptor.is_synthetic(),
        ));

        let started = Instant::now();
        let outcome = self.drive_stage(descriptor, injected, index, result);

        let record = &mut result.records[index];
        record.duration_ms = elapsed_ms(started);
        // A completed stage only sees errors from its own writers, which
        // carry their own record.
        if let Err(ref err) = outcome {
            if record.status != StageStatus::Completed {
                record.status = StageStatus::Failed;
                record.error = Some(err.to_string());

                let mut data = err.to_dict();
                data.insert("stage".to_string(), json!(descriptor.name));
                data.insert("id".to_string(), json!(record.id));
                self.ctx
                    .event_sink()
                    .try_emit("stage.failed", Some(json!(data)));
            }
        }
        outcome
    }

    fn drive_stage(
        &self,
        descriptor: &StageDescriptor,
        injected: Option<&Value>,
        index: usize,
        result: &mut RunResult,
    ) -> Result<StageFlow, PypeError> {
        let name = descriptor.name.as_str();

        self.ctx.log(&format!("Creating {name} instance."), 0);
        let mut stage = self.registry.resolve(name)?;

        let declared = stage.input_members();
        let outputs = stage.output_members();
        let mut inputs = builtin_inputs();
        inputs.extend(declared.iter().cloned());
        result.records[index].input_members.clone_from(&inputs);
        result.records[index].output_members.clone_from(&outputs);

        self.ctx.log(&format!("Parsing options {name}"), 0);
        let bound = bind(name, &declared, &outputs, &descriptor.arguments)?;
        result.records[index].id.clone_from(&bound.id);
        result.records[index].status = StageStatus::Bound;

        if let Some(format) = bound.usage {
            self.ctx.write_text(&render_usage(stage.as_ref(), format));
            return Ok(StageFlow::Halt);
        }

        if bound.disabled {
            self.ctx.log(&format!("{name} is disabled. Bypassing it."), 0);
            result.records[index].status = StageStatus::Skipped;
            self.ctx.event_sink().try_emit(
                "stage.skipped",
                Some(json!({"stage": name, "id": bound.id})),
            );
            return Ok(StageFlow::Continue);
        }

        result.records[index].pushed.clone_from(&bound.pushed);
        let mut values = bound.values.clone();
        self.run_readers(&bound, &inputs, &mut values, result)?;

        if let Some(value) = injected {
            if let Some(member) = declared
                .iter()
                .find(|m| value.matches(&m.type_tag) && !values.contains(&m.name))
            {
                values.set(member.name.clone(), value.clone());
            }
        }

        self.apply_explicit_pipes(&bound, &inputs, &mut values, &result.records[..index])?;
        if self.ctx.auto_pipe() {
            self.apply_implicit_pipes(&bound, &inputs, &mut values, &result.records[..index]);
        }

        for member in &inputs {
            if values.contains(&member.name) || bound.cleared.contains(&member.name) {
                continue;
            }
            if let Some(ref default) = member.default {
                values.set(member.name.clone(), default.clone());
            }
        }

        self.log_members("Input", name, &inputs, &values);
        self.ctx.log(&format!("Executing {name} ..."), 0);
        result.records[index].status = StageStatus::Executing;
        self.ctx.event_sink().try_emit(
            "stage.started",
            Some(json!({"stage": name, "id": bound.id})),
        );
        debug!(stage = %name, id = %bound.id, "Executing stage");

        let produced = {
            let mut stage_ctx = StageContext::new(name, &values, &self.ctx);
            stage.execute(&mut stage_ctx)?;
            stage_ctx.into_outputs()
        };

        self.ctx.log(&format!("Done executing {name}."), 0);
        self.log_members("Output", name, &outputs, &produced);

        let record = &mut result.records[index];
        record.inputs = values;
        record.outputs = produced;
        record.status = StageStatus::Completed;
        self.ctx.event_sink().try_emit(
            "stage.completed",
            Some(json!({"stage": name, "id": bound.id})),
        );

        for writer in &bound.writers {
            if let Err(err) = self.run_writer(name, index, writer, result) {
                if self.ctx.abort_on_error() {
                    return Err(err);
                }
                self.tolerate(&writer.name, &err, result);
            }
        }

        Ok(StageFlow::Continue)
    }

    fn run_writer(
        &self,
        producer: &str,
        index: usize,
        writer: &StageDescriptor,
        result: &mut RunResult,
    ) -> Result<(), PypeError> {
        let Some(SyntheticLink::Drains { member }) = &writer.synthetic else {
            return Ok(());
        };
        let value = result.records[index]
            .outputs
            .get(member)
            .cloned()
            .ok_or_else(|| ExecutionError::new(producer, format!("no {member} output to write")))?;
        self.run_stage(writer, Some(&value), result)?;
        Ok(())
    }

    fn run_readers(
        &self,
        bound: &BoundStage,
        inputs: &[MemberDescriptor],
        values: &mut MemberValues,
        result: &mut RunResult,
    ) -> Result<(), PypeError> {
        for reader in &bound.readers {
            let Some(SyntheticLink::Feeds { member }) = &reader.synthetic else {
                continue;
            };
            let Some(target) = inputs.iter().find(|m| &m.name == member) else {
                continue;
            };

            let reader_index = result.records.len();
            self.run_stage(reader, None, result)?;

            let record = &result.records[reader_index];
            let value = record
                .output_members
                .iter()
                .filter(|o| o.type_tag == target.type_tag)
                .find_map(|o| record.outputs.get(&o.name))
                .cloned()
                .ok_or_else(|| {
                    ExecutionError::new(
                        &reader.name,
                        format!("produced no {} output", target.type_tag),
                    )
                })?;
            values.set(member.clone(), value);
        }
        Ok(())
    }

    fn apply_explicit_pipes(
        &self,
        bound: &BoundStage,
        inputs: &[MemberDescriptor],
        values: &mut MemberValues,
        previous: &[StageRecord],
    ) -> Result<(), PypeError> {
        for (member_name, pipe) in &bound.pipes {
            let Some(member) = inputs.iter().find(|m| &m.name == member_name) else {
                continue;
            };
            let invalid =
                || MemberBindingError::invalid_pipe(&bound.stage, &member.option, pipe.to_string());

            let mut candidates = previous
                .iter()
                .filter(|r| !r.synthetic && r.status == StageStatus::Completed);
            let upstream = match pipe.stage {
                None => candidates.next_back(),
                Some(ref stage) => candidates
                    .filter(|r| &r.name == stage)
                    .filter(|r| pipe.id.as_ref().map_or(true, |id| &r.id == id))
                    .next_back(),
            };
            let Some(upstream) = upstream else {
                return Err(invalid().into());
            };
            if !upstream.declares_option(&pipe.option) {
                return Err(invalid().into());
            }

            match upstream.value_for_option(&pipe.option) {
                Some(value) => {
                    member.validate(value).map_err(|message| {
                        MemberBindingError::new(&bound.stage, &member.option, message)
                            .with_value(pipe.to_string())
                    })?;
                    self.ctx.log(
                        &format!(
                            "{} = {}-{}.{}",
                            member.name, upstream.name, upstream.id, pipe.option
                        ),
                        1,
                    );
                    values.set(member.name.clone(), value.clone());
                }
                None => {
                    self.ctx.log(
                        &format!("{} = None ({} has no value)", member.name, pipe),
                        1,
                    );
                }
            }
        }
        Ok(())
    }

    fn apply_implicit_pipes(
        &self,
        bound: &BoundStage,
        inputs: &[MemberDescriptor],
        values: &mut MemberValues,
        previous: &[StageRecord],
    ) {
        let candidates: Vec<&MemberDescriptor> = inputs
            .iter()
            .filter(|m| m.auto_pipe && !m.is_builtin())
            .filter(|m| !values.contains(&m.name) && !bound.is_claimed(&m.name))
            .collect();

        for member in candidates {
            let source = previous
                .iter()
                .rev()
                .filter(|r| r.status == StageStatus::Completed)
                .find_map(|r| r.piped_member(member).map(|piped| (r, piped)));
            let Some((source, (piped, Some(value)))) = source else {
                continue;
            };
            self.ctx.log(
                &format!("{} = {}-{}.{}", member.name, source.name, source.id, piped),
                1,
            );
            values.set(member.name.clone(), value.clone());
        }
    }

    fn log_members(
        &self,
        kind: &str,
        stage: &str,
        members: &[MemberDescriptor],
        values: &MemberValues,
    ) {
        if !self.ctx.log_on() || members.is_empty() {
            return;
        }
        self.ctx.log(&format!("{kind} {stage} members:"), 0);
        for member in members {
            self.ctx.log(
                &format!("{} = {}", member.name, describe(values.get(&member.name))),
                1,
            );
        }
    }
}

impl std::fmt::Debug for ChainRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainRunner")
            .field("registry", &self.registry)
            .field("ctx", &self.ctx)
            .finish()
    }
}
