//! Lock-file emission.
//!
//! The emitted document is fully deterministic: fixed top-level key
//! order (`name`, `on`, `permissions`, `concurrency`, `env`, `jobs`),
//! jobs in alphabetical order, step `with:` keys pre-sorted by the
//! step builders, and a two-line identifying comment header.

use std::collections::BTreeMap;

use itertools::Itertools as _;
use yamlemit::{Document, Mapping, Value};

use crate::jobs::graph::{GraphJob, JobGraph};
use crate::permissions::PermissionSet;
use crate::utils::yaml_value_to_emit;
use crate::workflow::WorkflowData;

pub struct Emitter<'a> {
    pub data: &'a WorkflowData,
    pub graph: &'a JobGraph,
    pub compiler_version: &'a str,
}

impl Emitter<'_> {
    pub fn emit(&self) -> String {
        let data = self.data;

        let mut root = Mapping::new();
        root.insert("name".into(), Value::str(&data.name));
        root.insert("on".into(), self.on_value());
        root.insert("permissions".into(), self.workflow_permissions().to_value());
        root.insert("concurrency".into(), self.concurrency_value());
        root.insert("env".into(), self.env_value());
        root.insert("jobs".into(), self.jobs_value());

        let mut doc = Document::new(root);
        doc.push_comment(format!(
            "This file was generated by awc {version}. Do not edit directly.",
            version = self.compiler_version
        ));
        doc.push_comment(self.metadata_blob());

        doc.render()
    }

    /// The identifying metadata blob: compact JSON, alphabetical keys.
    fn metadata_blob(&self) -> String {
        let data = self.data;
        let mut blob = BTreeMap::new();

        blob.insert("engine", data.engine.id.as_str().to_string());
        if let Some(source) = &data.source {
            blob.insert("source", source.clone());
        }
        blob.insert("tracker-id", data.tracker_id.clone());

        serde_json::to_string(&blob).unwrap_or_else(|_| "{}".into())
    }

    fn on_value(&self) -> Value {
        let data = self.data;
        let mut on = Mapping::new();

        for (event, options) in &data.on.events {
            on.insert(event.clone(), yaml_value_to_emit(options));
        }

        // Slash commands ride on comment events.
        if !data.command.is_empty() && !data.on.has("issue_comment") {
            let mut options = Mapping::new();
            options.insert(
                "types".into(),
                Value::Seq(vec![Value::str("created"), Value::str("edited")]),
            );
            on.insert("issue_comment".into(), Value::Map(options));
        }

        Value::Map(on)
    }

    /// The workflow-level permission block: the union of every enabled
    /// safe output's requirements, merged with user-declared
    /// permissions by max level. Empty means deny-all.
    fn workflow_permissions(&self) -> PermissionSet {
        let mut permissions = self
            .data
            .safe_outputs
            .as_ref()
            .map(|outputs| outputs.permissions())
            .unwrap_or_default();

        if let Some(user) = &self.data.permissions {
            permissions.union(user);
        }

        permissions
    }

    fn concurrency_value(&self) -> Value {
        if let Some(user) = &self.data.concurrency {
            return yaml_value_to_emit(user);
        }

        let mut group = String::from("gh-aw-${{ github.workflow }}");
        let mut concurrency = Mapping::new();

        if self.data.on.has_content_context() {
            group.push_str(
                "-${{ github.event.issue.number || github.event.pull_request.number || github.run_id }}",
            );
            concurrency.insert("group".into(), Value::str(group));
            concurrency.insert("cancel-in-progress".into(), Value::Bool(true));
        } else {
            concurrency.insert("group".into(), Value::str(group));
        }

        Value::Map(concurrency)
    }

    fn env_value(&self) -> Value {
        let mut env = Mapping::new();
        env.insert(
            "GH_AW_WORKFLOW_ID_SANITIZED".into(),
            Value::str(&self.data.workflow_id),
        );
        for (name, value) in &self.data.env {
            env.insert(name.clone(), Value::str(value));
        }
        Value::Map(env)
    }

    fn jobs_value(&self) -> Value {
        let jobs: Mapping = self
            .graph
            .jobs
            .iter()
            .sorted_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(name, job)| (name.clone(), self.job_value(job)))
            .collect();

        Value::Map(jobs)
    }

    fn job_value(&self, job: &GraphJob) -> Value {
        match job {
            GraphJob::Builtin(job) => job.to_value(),
            GraphJob::User(job) => {
                let mut map = Mapping::new();

                // Normalized needs first, then the body as written.
                let needs = if job.needs.len() == 1 {
                    Value::str(&job.needs[0])
                } else {
                    Value::Seq(job.needs.iter().map(Value::str).collect())
                };
                map.insert("needs".into(), needs);

                for (key, value) in &job.raw {
                    let Some(key) = key.as_str() else {
                        continue;
                    };
                    if key == "needs" {
                        continue;
                    }
                    map.insert(key.to_string(), yaml_value_to_emit(value));
                }

                Value::Map(map)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_yaml::Mapping as YamlMapping;

    use crate::actions::{ActionMode, ActionResolver};
    use crate::jobs::builtin::Synthesizer;

    use super::*;

    fn emit(yaml: &str, prompt: &str) -> String {
        let mapping: YamlMapping = serde_yaml::from_str(yaml).unwrap();
        let data = WorkflowData::parse("test-workflow", &mapping, chrono::Utc::now()).unwrap();
        let actions = ActionResolver::new(ActionMode::Release, None, None, "1.0.0");
        let graph = Synthesizer {
            data: &data,
            actions: &actions,
            prompt,
            staged: false,
        }
        .synthesize()
        .unwrap();

        Emitter {
            data: &data,
            graph: &graph,
            compiler_version: "1.0.0",
        }
        .emit()
    }

    #[test]
    fn test_top_level_key_order() {
        let lock = emit("on: issues\nname: Triage", "Do the thing.\n");

        let name = lock.find("\nname:").unwrap();
        let on = lock.find("\n\"on\":").unwrap();
        let permissions = lock.find("\npermissions:").unwrap();
        let concurrency = lock.find("\nconcurrency:").unwrap();
        let env = lock.find("\nenv:").unwrap();
        let jobs = lock.find("\njobs:").unwrap();

        assert!(name < on && on < permissions && permissions < concurrency);
        assert!(concurrency < env && env < jobs);
    }

    #[test]
    fn test_header_comments() {
        let lock = emit("on: issues", "x\n");
        let mut lines = lock.lines();

        let first = lines.next().unwrap();
        assert!(first.starts_with("# This file was generated by awc 1.0.0"));

        let second = lines.next().unwrap();
        assert!(second.starts_with("# {\""), "got: {second}");
        assert!(second.contains("\"engine\":\"claude\""), "got: {second}");
    }

    #[test]
    fn test_jobs_alphabetical() {
        let lock = emit(
            "on: issues\njobs:\n  zeta:\n    runs-on: ubuntu-latest\n    steps:\n      - run: echo z\n  alpha:\n    runs-on: ubuntu-latest\n    steps:\n      - run: echo a",
            "x\n",
        );

        let jobs_at = lock.find("\njobs:").unwrap();
        let body = &lock[jobs_at..];
        let activation = body.find("  activation:").unwrap();
        let agent = body.find("  agent:").unwrap();
        let alpha = body.find("  alpha:").unwrap();
        let pre = body.find("  pre_activation:").unwrap();
        let zeta = body.find("  zeta:").unwrap();

        assert!(activation < agent && agent < alpha && alpha < pre && pre < zeta);
    }

    #[test]
    fn test_output_parses_and_is_deterministic() {
        let source = "on: issues\nsafe-outputs:\n  create-issue:\n  add-comment:";
        let lock = emit(source, "Summarize the issue.\n");

        let parsed: serde_yaml::Value = serde_yaml::from_str(&lock).unwrap();
        assert!(parsed.get("jobs").is_some());

        assert_eq!(lock, emit(source, "Summarize the issue.\n"));
    }

    #[test]
    fn test_permissions_invariant() {
        // Safe-output union merged with user permissions by max level.
        let lock = emit(
            "on: issues\npermissions:\n  contents: write\nsafe-outputs:\n  create-issue:",
            "x\n",
        );

        let parsed: serde_yaml::Value = serde_yaml::from_str(&lock).unwrap();
        let permissions = &parsed["permissions"];
        assert_eq!(permissions["contents"], "write");
        assert_eq!(permissions["issues"], "write");
    }

    #[test]
    fn test_empty_permissions_is_deny_all() {
        let lock = emit("on: push\nroles: all", "x\n");
        assert!(lock.contains("permissions: {}"), "{lock}");
    }

    #[test]
    fn test_command_adds_issue_comment_trigger() {
        let lock = emit("on: issues\ncommand: triage", "x\n");
        let parsed: serde_yaml::Value = serde_yaml::from_str(&lock).unwrap();
        assert!(parsed["on"]["issue_comment"].is_mapping());
    }

    #[test]
    fn test_user_jobs_pass_through_with_normalized_needs() {
        let lock = emit(
            "on: issues\njobs:\n  deploy:\n    runs-on: ubuntu-latest\n    permissions:\n      deployments: write\n    steps:\n      - run: ./deploy.sh",
            "x\n",
        );

        let parsed: serde_yaml::Value = serde_yaml::from_str(&lock).unwrap();
        let deploy = &parsed["jobs"]["deploy"];
        assert_eq!(deploy["needs"], "activation");
        assert_eq!(deploy["permissions"]["deployments"], "write");
    }

    #[test]
    fn test_workflow_env_carries_sanitized_id() {
        let lock = emit("on: issues", "x\n");
        let parsed: serde_yaml::Value = serde_yaml::from_str(&lock).unwrap();
        assert_eq!(
            parsed["env"]["GH_AW_WORKFLOW_ID_SANITIZED"],
            "test-workflow"
        );
    }
}
