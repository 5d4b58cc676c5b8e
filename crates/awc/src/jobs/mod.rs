//! Synthesized jobs and the structured-step builders they share with
//! the engine layer.
//!
//! Steps are built as structured maps and serialized at emission time;
//! raw string assembly is confined to shell snippets inside `run:`
//! values.

pub mod builtin;
pub mod cache_memory;
pub mod graph;

use indexmap::IndexMap;
use yamlemit::{Mapping, Value};

use crate::permissions::PermissionSet;

/// Built-in job names.
pub const PRE_ACTIVATION_JOB: &str = "pre_activation";
pub const ACTIVATION_JOB: &str = "activation";
pub const AGENT_JOB: &str = "agent";
pub const DETECTION_JOB: &str = "detection";
pub const SAFE_OUTPUTS_JOB: &str = "safe_outputs";
pub const UPDATE_CACHE_MEMORY_JOB: &str = "update_cache_memory";

/// Runner filesystem layout used by generated jobs.
pub const TMP_DIR: &str = "/tmp/gh-aw";
pub const PROMPT_PATH: &str = "/tmp/gh-aw/prompts/prompt.txt";
pub const SAFE_OUTPUTS_DIR: &str = "/tmp/gh-aw/safeoutputs";
pub const SAFE_OUTPUTS_PATH: &str = "/tmp/gh-aw/safeoutputs/outputs.jsonl";
pub const MCP_CONFIG_PATH: &str = "/tmp/gh-aw/mcp-config.json";
pub const CACHE_MEMORY_DIR: &str = "/tmp/gh-aw/cache-memory";
pub const AGENT_STDIO_LOG: &str = "/tmp/gh-aw/agent-stdio.log";

/// The default runner for synthesized jobs.
pub const DEFAULT_RUNNER: &str = "ubuntu-latest";

/// Default timeout for the agent job, in minutes.
pub const DEFAULT_AGENT_TIMEOUT_MINUTES: u64 = 20;

/// A synthesized (built-in or safe-output) job.
#[derive(Clone, Debug, Default)]
pub struct Job {
    pub name: String,
    pub runs_on: Option<Value>,
    pub needs: Vec<String>,
    pub if_condition: Option<String>,
    pub permissions: Option<PermissionSet>,
    pub env: Mapping,
    pub outputs: IndexMap<String, String>,
    pub steps: Vec<Value>,
    pub timeout_minutes: Option<u64>,
}

impl Job {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Renders the job body as an emission value. Key order follows
    /// GitHub convention: `needs`, `if`, `runs-on`, `permissions`,
    /// `timeout-minutes`, `outputs`, `env`, `steps`.
    pub fn to_value(&self) -> Value {
        let mut map = Mapping::new();

        if !self.needs.is_empty() {
            if self.needs.len() == 1 {
                map.insert("needs".into(), Value::str(&self.needs[0]));
            } else {
                map.insert(
                    "needs".into(),
                    Value::Seq(self.needs.iter().map(Value::str).collect()),
                );
            }
        }
        if let Some(condition) = &self.if_condition {
            map.insert("if".into(), Value::str(condition));
        }
        map.insert(
            "runs-on".into(),
            self.runs_on
                .clone()
                .unwrap_or_else(|| Value::str(DEFAULT_RUNNER)),
        );
        if let Some(permissions) = &self.permissions {
            if !permissions.is_empty() {
                map.insert("permissions".into(), permissions.to_value());
            }
        }
        if let Some(timeout) = self.timeout_minutes {
            map.insert("timeout-minutes".into(), Value::Int(timeout as i64));
        }
        if !self.outputs.is_empty() {
            let outputs: Mapping = self
                .outputs
                .iter()
                .map(|(name, expr)| (name.clone(), Value::str(expr)))
                .collect();
            map.insert("outputs".into(), Value::Map(outputs));
        }
        if !self.env.is_empty() {
            map.insert("env".into(), Value::Map(self.env.clone()));
        }
        map.insert("steps".into(), Value::Seq(self.steps.clone()));

        Value::Map(map)
    }
}

/// Builder for a structured workflow step.
///
/// Field order in the emitted map is fixed (`name`, `id`, `if`, `uses`,
/// `run`, `env`, `with`), and `with:` keys are sorted alphabetically.
#[derive(Clone, Debug, Default)]
pub struct StepBuilder {
    name: Option<String>,
    id: Option<String>,
    if_condition: Option<String>,
    uses: Option<String>,
    run: Option<String>,
    env: Mapping,
    with: Vec<(String, Value)>,
}

impl StepBuilder {
    pub fn run(name: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            run: Some(script.into()),
            ..Self::default()
        }
    }

    pub fn uses(name: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            uses: Some(reference.into()),
            ..Self::default()
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn if_condition(mut self, condition: impl Into<String>) -> Self {
        self.if_condition = Some(condition.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with.push((key.into(), value.into()));
        self
    }

    pub fn build(self) -> Value {
        let mut map = Mapping::new();

        if let Some(name) = self.name {
            map.insert("name".into(), Value::str(name));
        }
        if let Some(id) = self.id {
            map.insert("id".into(), Value::str(id));
        }
        if let Some(condition) = self.if_condition {
            map.insert("if".into(), Value::str(condition));
        }
        if let Some(uses) = self.uses {
            map.insert("uses".into(), Value::str(uses));
        }
        if let Some(run) = self.run {
            map.insert("run".into(), Value::str(run));
        }
        if !self.env.is_empty() {
            map.insert("env".into(), Value::Map(self.env));
        }
        if !self.with.is_empty() {
            let mut with = self.with;
            with.sort_by(|(a, _), (b, _)| a.cmp(b));
            map.insert("with".into(), Value::Map(with.into_iter().collect()));
        }

        Value::Map(map)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_step_with_keys_sorted() {
        let step = StepBuilder::uses("Cache", "actions/cache@sha")
            .with("restore-keys", Value::str("memory-"))
            .with("path", Value::str("/tmp/gh-aw/cache-memory"))
            .with("key", Value::str("memory-x"))
            .build();

        let with = step.as_map().unwrap().get("with").unwrap().as_map().unwrap();
        let keys: Vec<_> = with.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["key", "path", "restore-keys"]);
    }

    #[test]
    fn test_step_field_order() {
        let step = StepBuilder::run("Check stop time", "echo ok")
            .id("check_stop_time")
            .if_condition("always()")
            .env("STOP_TIME", "2026-01-01 00:00:00")
            .build();

        let keys: Vec<_> = step
            .as_map()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, vec!["name", "id", "if", "run", "env"]);
    }

    #[test]
    fn test_job_single_needs_is_scalar() {
        let mut job = Job::new("activation");
        job.needs = vec![PRE_ACTIVATION_JOB.to_string()];
        job.steps.push(StepBuilder::run("x", "echo").build());

        let rendered = yamlemit::render_value(&job.to_value());
        assert!(rendered.contains("needs: pre_activation\n"), "{rendered}");
    }

    #[test]
    fn test_job_multiple_needs_is_list() {
        let mut job = Job::new(UPDATE_CACHE_MEMORY_JOB);
        job.needs = vec![AGENT_JOB.to_string(), DETECTION_JOB.to_string()];
        job.steps.push(StepBuilder::run("x", "echo").build());

        let rendered = yamlemit::render_value(&job.to_value());
        assert!(rendered.contains("- agent"), "{rendered}");
        assert!(rendered.contains("- detection"), "{rendered}");
    }
}
