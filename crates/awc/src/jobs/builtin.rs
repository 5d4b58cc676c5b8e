//! Construction of the built-in job pipeline: pre-activation gates,
//! prompt materialization, the agent run, threat detection, safe-output
//! execution, and cache persistence.

use yamlemit::Value;

use crate::actions::{ActionResolver, pinned};
use crate::engine::{CodingAgentEngine, engine_for, write_mcp_config_step};
use crate::error::CompileError;
use crate::permissions::{Level, PermissionSet};
use crate::safe_outputs::{SafeOutputKind, SafeOutputs};
use crate::substitute::{ExpressionMapping, known_needs_mappings, rewrite_prompt};
use crate::utils::yaml_value_to_emit;
use crate::workflow::{Roles, WorkflowData};

use super::graph::{JobGraph, UserJob};
use super::{
    ACTIVATION_JOB, AGENT_JOB, AGENT_STDIO_LOG, DEFAULT_AGENT_TIMEOUT_MINUTES, DETECTION_JOB,
    Job, PRE_ACTIVATION_JOB, PROMPT_PATH, SAFE_OUTPUTS_DIR, SAFE_OUTPUTS_JOB,
    SAFE_OUTPUTS_PATH, StepBuilder, UPDATE_CACHE_MEMORY_JOB, cache_memory,
};

/// Token chain used by safe-output execution jobs.
const SAFE_OUTPUT_TOKEN_CHAIN: &str =
    "${{ secrets.GH_AW_GITHUB_TOKEN || secrets.GITHUB_TOKEN }}";

/// Job names reserved for the built-in pipeline.
fn reserved_job_names() -> Vec<String> {
    let mut names = vec![
        PRE_ACTIVATION_JOB.to_string(),
        ACTIVATION_JOB.to_string(),
        AGENT_JOB.to_string(),
        DETECTION_JOB.to_string(),
        SAFE_OUTPUTS_JOB.to_string(),
        UPDATE_CACHE_MEMORY_JOB.to_string(),
    ];
    names.extend(SafeOutputKind::ALL.iter().map(|kind| kind.job_name()));
    names
}

/// Synthesizes the job graph for one workflow.
pub struct Synthesizer<'a> {
    pub data: &'a WorkflowData,
    pub actions: &'a ActionResolver,
    /// The Markdown body, which becomes the prompt.
    pub prompt: &'a str,
    /// Trial mode: force safe outputs into staged collection.
    pub staged: bool,
}

impl Synthesizer<'_> {
    pub fn synthesize(&self) -> Result<JobGraph, CompileError> {
        let data = self.data;
        let engine = engine_for(data.engine.id);

        if data.engine.max_turns.is_some() && !engine.supports_max_turns() {
            tracing::warn!(
                "engine {id} does not support max-turns; the setting is ignored",
                id = data.engine.id.as_str()
            );
        }

        if let Some(cache) = &data.tools.cache_memory {
            cache_memory::validate(cache)?;
        }

        // User jobs first: their shapes decide activation's dependencies.
        let reserved = reserved_job_names();
        let mut user_jobs = vec![];
        for (name, raw) in &data.jobs {
            if reserved.contains(name) {
                return Err(CompileError::validation(format!(
                    "job name `{name}` is reserved for the built-in pipeline"
                )));
            }
            user_jobs.push(UserJob::new(name, raw)?);
        }

        let has_pre_activation = data.needs_pre_activation();

        // Custom jobs that explicitly hook before activation run before
        // it and become substitutable in the prompt.
        let before_users: Vec<String> = user_jobs
            .iter()
            .filter(|job| {
                has_pre_activation
                    && job.needs.iter().any(|need| need == PRE_ACTIVATION_JOB)
                    && !job.needs.iter().any(|need| {
                        reserved.contains(need) && need != PRE_ACTIVATION_JOB
                    })
            })
            .map(|job| job.name.clone())
            .collect();

        let mut before_set: Vec<String> = vec![];
        if has_pre_activation {
            before_set.push(PRE_ACTIVATION_JOB.to_string());
        }
        before_set.extend(before_users.iter().cloned());

        let mappings = known_needs_mappings(self.prompt, &before_set);

        let detection_enabled = data.threat_detection();

        let mut graph = JobGraph::new();

        if has_pre_activation {
            graph.insert_builtin(self.pre_activation_job());
        }
        graph.insert_builtin(self.activation_job(has_pre_activation, &before_users, &mappings));
        graph.insert_builtin(self.agent_job(engine.as_ref(), detection_enabled)?);

        if detection_enabled {
            graph.insert_builtin(self.detection_job(engine.as_ref()));
        }

        if let Some(outputs) = &data.safe_outputs {
            for job in self.safe_output_jobs(outputs, detection_enabled) {
                graph.insert_builtin(job);
            }
        }

        if let Some(cache) = &data.tools.cache_memory {
            if detection_enabled {
                graph.insert_builtin(cache_memory::update_job(cache));
            }
        }

        for job in user_jobs {
            graph.insert_user(job);
        }

        graph.validate_needs_exist()?;
        graph.check_acyclic()?;

        Ok(graph)
    }

    fn pre_activation_job(&self) -> Job {
        let data = self.data;
        let mut job = Job::new(PRE_ACTIVATION_JOB);
        job.permissions = Some(PermissionSet::of(&[("contents", Level::Read)]));
        job.timeout_minutes = Some(5);

        let mut conjuncts = vec![];

        if self.actions.uses_local_actions() {
            job.steps
                .push(StepBuilder::uses("Checkout actions", pinned::CHECKOUT).build());
        }

        if data.roles.requires_check() {
            let roles = match &data.roles {
                Roles::Default => "admin,maintainer,write".to_string(),
                Roles::List(roles) => roles.join(","),
                Roles::All => unreachable!("requires_check is false for Roles::All"),
            };
            job.steps.push(
                StepBuilder::uses("Check team membership", self.actions.resolve("check-membership"))
                    .id("check_membership")
                    .with("roles", Value::str(roles))
                    .build(),
            );
            conjuncts
                .push("(steps.check_membership.outputs.is_team_member == 'true')".to_string());
        }

        if let Some(stop_time) = &data.stop_after {
            job.steps.push(
                StepBuilder::run(
                    "Check stop time",
                    "if [ \"$(date -u '+%Y-%m-%d %H:%M:%S')\" \\< \"$GH_AW_STOP_TIME\" ]; then\n  echo \"stop_time_ok=true\" >> \"$GITHUB_OUTPUT\"\nelse\n  echo \"stop_time_ok=false\" >> \"$GITHUB_OUTPUT\"\nfi",
                )
                .id("check_stop_time")
                .env("GH_AW_STOP_TIME", Value::str(stop_time))
                .build(),
            );
            conjuncts.push("(steps.check_stop_time.outputs.stop_time_ok == 'true')".to_string());
        }

        if !data.command.is_empty() {
            job.steps.push(
                StepBuilder::uses("Check slash command", self.actions.resolve("check-command"))
                    .id("check_command")
                    .with("commands", Value::str(data.command.join(",")))
                    .build(),
            );
            conjuncts.push("(steps.check_command.outputs.matched_command != '')".to_string());
            job.outputs.insert(
                "matched_command".into(),
                "${{ steps.check_command.outputs.matched_command }}".into(),
            );
        }

        job.outputs.insert(
            "activated".into(),
            format!("${{{{ {} }}}}", conjuncts.join(" && ")),
        );

        job
    }

    fn activation_job(
        &self,
        has_pre_activation: bool,
        before_users: &[String],
        mappings: &[ExpressionMapping],
    ) -> Job {
        let mut job = Job::new(ACTIVATION_JOB);
        job.timeout_minutes = Some(10);

        if has_pre_activation {
            job.needs.push(PRE_ACTIVATION_JOB.to_string());
            job.if_condition = Some(format!(
                "needs.{PRE_ACTIVATION_JOB}.outputs.activated == 'true'"
            ));
        }
        job.needs.extend(before_users.iter().cloned());

        if self.actions.uses_local_actions() {
            job.permissions = Some(PermissionSet::of(&[("contents", Level::Read)]));
            job.steps
                .push(StepBuilder::uses("Checkout actions", pinned::CHECKOUT).build());
        }

        let rewritten = rewrite_prompt(self.prompt, mappings);
        job.steps.push(
            StepBuilder::run(
                "Create prompt",
                format!(
                    "mkdir -p \"$(dirname \"$GH_AW_PROMPT\")\"\ncat > \"$GH_AW_PROMPT\" << 'GH_AW_PROMPT_EOF'\n{prompt}\nGH_AW_PROMPT_EOF",
                    prompt = rewritten.trim_end()
                ),
            )
            .env("GH_AW_PROMPT", PROMPT_PATH)
            .build(),
        );

        if !mappings.is_empty() {
            let mut step = StepBuilder::uses(
                "Substitute placeholders",
                self.actions.resolve("substitute-placeholders"),
            )
            .env("GH_AW_PROMPT", PROMPT_PATH);

            for mapping in mappings {
                step = step.env(mapping.env_var.clone(), Value::str(&mapping.original));
            }

            job.steps.push(step.build());
        }

        job
    }

    fn agent_job(
        &self,
        engine: &dyn CodingAgentEngine,
        detection_enabled: bool,
    ) -> Result<Job, CompileError> {
        let data = self.data;
        let mut job = Job::new(AGENT_JOB);
        job.needs.push(ACTIVATION_JOB.to_string());
        job.runs_on = data.runs_on.as_ref().map(yaml_value_to_emit);
        job.permissions = Some(PermissionSet::of(&[("contents", Level::Read)]));
        job.timeout_minutes = Some(
            data.timeout_minutes
                .unwrap_or(DEFAULT_AGENT_TIMEOUT_MINUTES),
        );

        job.env
            .insert("GH_AW_WORKFLOW_NAME".into(), Value::str(&data.name));
        if let Some(source) = &data.source {
            job.env
                .insert("GH_AW_WORKFLOW_SOURCE".into(), Value::str(source));
        }
        job.env
            .insert("GH_AW_TRACKER_ID".into(), Value::str(&data.tracker_id));
        job.env.insert(
            "GH_AW_ENGINE_ID".into(),
            Value::str(data.engine.id.as_str()),
        );
        if let Some(version) = &data.engine.version {
            job.env
                .insert("GH_AW_ENGINE_VERSION".into(), Value::str(version));
        }
        if let Some(model) = &data.engine.model {
            job.env
                .insert("GH_AW_ENGINE_MODEL".into(), Value::str(model));
        }

        if !data.plugins.is_empty() {
            if engine.supports_plugins() {
                job.env
                    .insert("GH_AW_PLUGINS".into(), Value::str(data.plugins.join(",")));
            } else {
                tracing::warn!(
                    "engine {id} does not support plugins; the `plugins:` list is ignored",
                    id = data.engine.id.as_str()
                );
            }
        }

        let staged = self.staged
            || data
                .safe_outputs
                .as_ref()
                .is_some_and(|outputs| outputs.staged);
        if data.safe_outputs.is_some() {
            job.env
                .insert("GH_AW_SAFE_OUTPUTS".into(), Value::str(SAFE_OUTPUTS_PATH));
            if staged {
                job.env
                    .insert("GH_AW_SAFE_OUTPUTS_STAGED".into(), Value::str("true"));
            }
        }

        let mcp_config = engine.render_mcp_config(data);

        if data.safe_outputs.is_some() {
            let has_safeoutputs_server = mcp_config
                .as_ref()
                .and_then(|config| config.get("mcpServers"))
                .and_then(|servers| servers.get("safeoutputs"))
                .is_some();
            if !has_safeoutputs_server {
                return Err(CompileError::Internal(
                    "safe outputs are enabled but the generated MCP configuration has no `safeoutputs` server".into(),
                ));
            }
        }

        job.steps
            .push(StepBuilder::uses("Checkout repository", pinned::CHECKOUT).build());

        for step in &data.steps {
            job.steps.push(yaml_value_to_emit(step));
        }

        if let Some(cache) = &data.tools.cache_memory {
            job.steps
                .push(cache_memory::restore_step(cache, detection_enabled));
        }

        job.steps
            .extend(engine.installation_steps(data, self.actions));

        if let Some(config) = &mcp_config {
            job.env
                .insert("GH_AW_MCP_CONFIG".into(), Value::str(super::MCP_CONFIG_PATH));
            job.steps.push(write_mcp_config_step(config));
        }

        if data.safe_outputs.is_some() {
            job.steps.push(
                StepBuilder::run(
                    "Prepare safe outputs directory",
                    format!("mkdir -p {SAFE_OUTPUTS_DIR}"),
                )
                .build(),
            );
        }

        job.steps.extend(engine.execution_steps(data));

        if data.safe_outputs.is_some() {
            job.steps.push(
                StepBuilder::uses("Upload agent output", pinned::UPLOAD_ARTIFACT)
                    .if_condition("always()")
                    .with("name", Value::str("agent-output"))
                    .with("path", Value::str(SAFE_OUTPUTS_DIR))
                    .build(),
            );
        }

        if data.tools.cache_memory.is_some() && detection_enabled {
            job.steps.push(cache_memory::upload_artifact_step());
        }

        job.steps.push(
            StepBuilder::uses("Upload agent logs", pinned::UPLOAD_ARTIFACT)
                .if_condition("always()")
                .with("name", Value::str("agent-logs"))
                .with("path", Value::str(AGENT_STDIO_LOG))
                .build(),
        );

        Ok(job)
    }

    fn detection_job(&self, engine: &dyn CodingAgentEngine) -> Job {
        let data = self.data;
        let mut job = Job::new(DETECTION_JOB);
        job.needs.push(AGENT_JOB.to_string());
        job.if_condition = Some("always()".to_string());
        job.permissions = Some(PermissionSet::of(&[("contents", Level::Read)]));
        job.timeout_minutes = Some(10);

        if data.safe_outputs.is_some() {
            job.steps.push(
                StepBuilder::uses("Download agent output", pinned::DOWNLOAD_ARTIFACT)
                    .with("name", Value::str("agent-output"))
                    .with("path", Value::str(SAFE_OUTPUTS_DIR))
                    .build(),
            );
        }

        let mut step = StepBuilder::uses(
            "Scan agent output for threats",
            self.actions.resolve("threat-detection"),
        )
        .id("detection")
        .env("GH_AW_AGENT_OUTPUT", SAFE_OUTPUTS_PATH);

        let model = engine.default_detection_model();
        if !model.is_empty() {
            step = step.env("GH_AW_DETECTION_MODEL", model);
        }

        let config = data
            .safe_outputs
            .as_ref()
            .map(|outputs| &outputs.threat_detection);
        if let Some(prompt) = config.and_then(|c| c.prompt.as_deref()) {
            step = step.env("GH_AW_DETECTION_PROMPT", prompt);
        }

        job.steps.push(step.build());

        if let Some(extra) = config.map(|c| &c.steps) {
            for step in extra {
                job.steps.push(yaml_value_to_emit(step));
            }
        }

        job.outputs.insert(
            "success".into(),
            "${{ steps.detection.outputs.success }}".into(),
        );

        job
    }

    fn safe_output_condition(&self, detection_enabled: bool) -> String {
        let mut condition = format!("always() && needs.{AGENT_JOB}.result != 'cancelled'");
        if detection_enabled {
            condition.push_str(&format!(
                " && needs.{DETECTION_JOB}.outputs.success == 'true'"
            ));
        }
        condition
    }

    fn safe_output_job_base(
        &self,
        name: &str,
        permissions: PermissionSet,
        outputs: &SafeOutputs,
        detection_enabled: bool,
    ) -> Job {
        let mut job = Job::new(name);
        job.needs.push(AGENT_JOB.to_string());
        if detection_enabled {
            job.needs.push(DETECTION_JOB.to_string());
        }
        job.if_condition = Some(self.safe_output_condition(detection_enabled));
        job.permissions = Some(permissions);
        job.timeout_minutes = Some(10);

        job.env
            .insert("GH_AW_WORKFLOW_NAME".into(), Value::str(&self.data.name));
        job.env
            .insert("GH_AW_AGENT_OUTPUT".into(), Value::str(SAFE_OUTPUTS_PATH));

        if self.staged || outputs.staged {
            job.env
                .insert("GH_AW_SAFE_OUTPUTS_STAGED".into(), Value::str("true"));
        }
        if let Some(messages) = &outputs.messages {
            let json = crate::utils::yaml_to_json(&serde_yaml::Value::Mapping(messages.clone()));
            job.env.insert(
                "GH_AW_SAFE_OUTPUT_MESSAGES".into(),
                Value::str(json.to_string()),
            );
        }

        if self.actions.uses_local_actions() {
            job.steps
                .push(StepBuilder::uses("Checkout actions", pinned::CHECKOUT).build());
        }

        job.steps.push(
            StepBuilder::uses("Download agent output", pinned::DOWNLOAD_ARTIFACT)
                .with("name", Value::str("agent-output"))
                .with("path", Value::str(SAFE_OUTPUTS_DIR))
                .build(),
        );

        job
    }

    fn safe_output_jobs(&self, outputs: &SafeOutputs, detection_enabled: bool) -> Vec<Job> {
        let kinds = outputs.job_kinds();

        match kinds.as_slice() {
            [] => vec![],
            [kind] => vec![self.single_safe_output_job(*kind, outputs, detection_enabled)],
            _ => vec![self.consolidated_safe_outputs_job(outputs, &kinds, detection_enabled)],
        }
    }

    fn single_safe_output_job(
        &self,
        kind: SafeOutputKind,
        outputs: &SafeOutputs,
        detection_enabled: bool,
    ) -> Job {
        let mut permissions = kind.permissions();
        if kind == SafeOutputKind::CreatePullRequest {
            let fallback = outputs
                .create_pull_request
                .as_ref()
                .is_some_and(|pr| pr.fallback_as_issue);
            if fallback {
                permissions.grant("issues", Level::Write);
            }
        }

        let mut job =
            self.safe_output_job_base(&kind.job_name(), permissions, outputs, detection_enabled);

        let token = outputs
            .github_token
            .clone()
            .unwrap_or_else(|| SAFE_OUTPUT_TOKEN_CHAIN.to_string());
        job.env
            .insert("GH_AW_GITHUB_TOKEN".into(), Value::str(token));

        job.steps.push(
            StepBuilder::uses(
                format!("Handle {key}", key = kind.key()),
                self.actions.resolve(kind.key()),
            )
            .with("max", Value::Int(outputs.max_for(kind) as i64))
            .build(),
        );

        job.steps.push(self.noop_notify_step());
        job
    }

    fn consolidated_safe_outputs_job(
        &self,
        outputs: &SafeOutputs,
        kinds: &[SafeOutputKind],
        detection_enabled: bool,
    ) -> Job {
        let mut job = self.safe_output_job_base(
            SAFE_OUTPUTS_JOB,
            outputs.permissions(),
            outputs,
            detection_enabled,
        );

        let token = outputs
            .github_token
            .clone()
            .unwrap_or_else(|| SAFE_OUTPUT_TOKEN_CHAIN.to_string());
        job.env
            .insert("GH_AW_GITHUB_TOKEN".into(), Value::str(token));
        job.env.insert(
            "GH_AW_SAFE_OUTPUTS_HANDLER_CONFIG".into(),
            Value::str(outputs.handler_config_json().to_string()),
        );

        tracing::debug!(
            "consolidating {count} safe-output types into one job",
            count = kinds.len()
        );

        job.steps.push(
            StepBuilder::uses(
                "Execute safe outputs",
                self.actions.resolve("safe-outputs-handler"),
            )
            .build(),
        );

        job.steps.push(self.noop_notify_step());
        job
    }

    /// Noop messages are surfaced by a dedicated step, never routed
    /// through the consolidated handler.
    fn noop_notify_step(&self) -> Value {
        StepBuilder::uses("Notify noop messages", self.actions.resolve("noop-notify"))
            .if_condition("always()")
            .build()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_yaml::Mapping;

    use crate::actions::ActionMode;

    use super::*;

    fn synthesize(yaml: &str) -> JobGraph {
        synthesize_with(yaml, "Do the task.\n")
    }

    fn synthesize_with(yaml: &str, prompt: &str) -> JobGraph {
        let mapping: Mapping = serde_yaml::from_str(yaml).unwrap();
        let data = WorkflowData::parse("test-workflow", &mapping, chrono::Utc::now()).unwrap();
        let actions = ActionResolver::new(ActionMode::Release, None, None, "1.0.0");

        Synthesizer {
            data: &data,
            actions: &actions,
            prompt,
            staged: false,
        }
        .synthesize()
        .unwrap()
    }

    fn builtin<'g>(graph: &'g JobGraph, name: &str) -> &'g Job {
        match graph.jobs.get(name) {
            Some(crate::jobs::graph::GraphJob::Builtin(job)) => job,
            other => panic!("expected builtin job `{name}`, got {other:?}"),
        }
    }

    #[test]
    fn test_minimal_graph_scenario() {
        // `on: issues`, default engine: pre_activation exists for the
        // membership check, no command output, activation gates on it.
        let graph = synthesize("on: issues\nengine: claude");

        let pre = builtin(&graph, PRE_ACTIVATION_JOB);
        let activated = pre.outputs.get("activated").unwrap();
        assert!(
            activated.contains("check_membership.outputs.is_team_member == 'true'"),
            "got: {activated}"
        );
        assert!(!pre.outputs.contains_key("matched_command"));

        let activation = builtin(&graph, ACTIVATION_JOB);
        assert_eq!(activation.needs, vec![PRE_ACTIVATION_JOB]);
        assert_eq!(
            activation.if_condition.as_deref(),
            Some("needs.pre_activation.outputs.activated == 'true'")
        );

        let agent = builtin(&graph, AGENT_JOB);
        assert_eq!(agent.needs, vec![ACTIVATION_JOB]);
    }

    #[test]
    fn test_roles_all_drops_pre_activation() {
        let graph = synthesize("on: push\nroles: all");
        assert!(!graph.contains(PRE_ACTIVATION_JOB));

        let activation = builtin(&graph, ACTIVATION_JOB);
        assert!(activation.needs.is_empty());
        assert!(activation.if_condition.is_none());
    }

    #[test]
    fn test_command_exposes_matched_command() {
        let graph = synthesize("on: issues\ncommand: triage");
        let pre = builtin(&graph, PRE_ACTIVATION_JOB);

        assert!(pre.outputs.contains_key("matched_command"));
        let activated = pre.outputs.get("activated").unwrap();
        assert!(activated.contains("matched_command != ''"), "got: {activated}");
    }

    #[test]
    fn test_stop_after_check() {
        let graph = synthesize("on: issues\nstop-after: +25h");
        let pre = builtin(&graph, PRE_ACTIVATION_JOB);
        let activated = pre.outputs.get("activated").unwrap();
        assert!(
            activated.contains("check_stop_time.outputs.stop_time_ok == 'true'"),
            "got: {activated}"
        );
    }

    #[test]
    fn test_cache_memory_with_detection_scenario() {
        let graph = synthesize(
            "on: issues\ntools:\n  cache-memory: true\nsafe-outputs:\n  threat-detection: true\n  create-issue:",
        );

        // Agent restores (not the inline cache action) and uploads the
        // artifact.
        let agent = builtin(&graph, AGENT_JOB);
        let steps = yamlemit::render_value(&Value::Seq(agent.steps.clone()));
        assert!(steps.contains("actions/cache/restore@"), "{steps}");
        assert!(!steps.contains("uses: actions/cache@"), "{steps}");
        assert!(steps.contains("cache-memory"), "{steps}");

        // A gated update job persists the cache.
        let update = builtin(&graph, UPDATE_CACHE_MEMORY_JOB);
        assert_eq!(update.needs, vec![AGENT_JOB, DETECTION_JOB]);
        assert_eq!(
            update.if_condition.as_deref(),
            Some("always() && needs.detection.outputs.success == 'true'")
        );
        let update_steps = yamlemit::render_value(&Value::Seq(update.steps.clone()));
        assert!(update_steps.contains("actions/cache/save@"), "{update_steps}");
    }

    #[test]
    fn test_cache_memory_without_detection_inline() {
        let graph = synthesize("on: issues\ntools:\n  cache-memory: true");
        assert!(!graph.contains(UPDATE_CACHE_MEMORY_JOB));

        let agent = builtin(&graph, AGENT_JOB);
        let steps = yamlemit::render_value(&Value::Seq(agent.steps.clone()));
        assert!(steps.contains("uses: actions/cache@"), "{steps}");
    }

    #[test]
    fn test_single_safe_output_job() {
        let graph = synthesize("on: issues\nsafe-outputs:\n  create-issue:");

        assert!(graph.contains("create_issue"));
        assert!(!graph.contains(SAFE_OUTPUTS_JOB));

        let job = builtin(&graph, "create_issue");
        assert_eq!(job.needs, vec![AGENT_JOB]);
        assert_eq!(job.permissions.as_ref().unwrap().get("issues"), Some(Level::Write));
    }

    #[test]
    fn test_consolidated_safe_outputs_job() {
        let graph = synthesize("on: issues\nsafe-outputs:\n  create-issue:\n  add-comment:");

        assert!(graph.contains(SAFE_OUTPUTS_JOB));
        assert!(!graph.contains("create_issue"));
        assert!(!graph.contains("add_comment"));

        let job = builtin(&graph, SAFE_OUTPUTS_JOB);
        assert!(job.env.contains_key("GH_AW_SAFE_OUTPUTS_HANDLER_CONFIG"));
        let permissions = job.permissions.as_ref().unwrap();
        assert_eq!(permissions.get("issues"), Some(Level::Write));
        assert_eq!(permissions.get("pull-requests"), Some(Level::Write));
    }

    #[test]
    fn test_detection_gates_safe_outputs() {
        let graph = synthesize(
            "on: issues\nsafe-outputs:\n  threat-detection: true\n  create-issue:",
        );

        let job = builtin(&graph, "create_issue");
        assert_eq!(job.needs, vec![AGENT_JOB, DETECTION_JOB]);
        assert!(
            job.if_condition
                .as_deref()
                .unwrap()
                .contains("needs.detection.outputs.success == 'true'")
        );

        let detection = builtin(&graph, DETECTION_JOB);
        assert_eq!(
            detection.outputs.get("success").map(String::as_str),
            Some("${{ steps.detection.outputs.success }}")
        );
    }

    #[test]
    fn test_known_needs_substitution_scenario() {
        // A custom job hooked before activation becomes substitutable;
        // one depending on activation does not.
        let graph = synthesize_with(
            "on: issues\njobs:\n  precompute:\n    needs: pre_activation\n    runs-on: ubuntu-latest\n    outputs:\n      action: ${{ steps.pick.outputs.action }}\n    steps:\n      - id: pick\n        run: echo \"action=triage\" >> \"$GITHUB_OUTPUT\"\n  config:\n    needs: [pre_activation, activation]\n    runs-on: ubuntu-latest\n    steps:\n      - run: echo config",
            "Act on ${{ needs.precompute.outputs.action }} and ${{ needs.config.outputs.value }}.\n",
        );

        let activation = builtin(&graph, ACTIVATION_JOB);
        assert_eq!(activation.needs, vec![PRE_ACTIVATION_JOB, "precompute"]);

        let rendered = yamlemit::render_value(&Value::Seq(activation.steps.clone()));
        assert!(
            rendered.contains("GH_AW_NEEDS_PRECOMPUTE_OUTPUTS_ACTION"),
            "{rendered}"
        );
        assert!(
            !rendered.contains("GH_AW_NEEDS_CONFIG_OUTPUTS_VALUE"),
            "{rendered}"
        );
    }

    #[test]
    fn test_user_job_cycle_rejected() {
        let mapping: Mapping = serde_yaml::from_str(
            "on: issues\njobs:\n  a:\n    needs: b\n    runs-on: ubuntu-latest\n  b:\n    needs: a\n    runs-on: ubuntu-latest",
        )
        .unwrap();
        let data = WorkflowData::parse("w", &mapping, chrono::Utc::now()).unwrap();
        let actions = ActionResolver::new(ActionMode::Release, None, None, "1.0.0");

        let err = Synthesizer {
            data: &data,
            actions: &actions,
            prompt: "x",
            staged: false,
        }
        .synthesize()
        .unwrap_err()
        .to_string();
        assert!(err.contains("cycle"), "got: {err}");
    }

    #[test]
    fn test_reserved_job_name_rejected() {
        let mapping: Mapping =
            serde_yaml::from_str("on: issues\njobs:\n  agent:\n    runs-on: ubuntu-latest")
                .unwrap();
        let data = WorkflowData::parse("w", &mapping, chrono::Utc::now()).unwrap();
        let actions = ActionResolver::new(ActionMode::Release, None, None, "1.0.0");

        let err = Synthesizer {
            data: &data,
            actions: &actions,
            prompt: "x",
            staged: false,
        }
        .synthesize()
        .unwrap_err()
        .to_string();
        assert!(err.contains("reserved"), "got: {err}");
    }

    #[test]
    fn test_agent_env() {
        let graph = synthesize("on: issues\nname: Triage\nsafe-outputs:\n  create-issue:");
        let agent = builtin(&graph, AGENT_JOB);

        assert_eq!(
            agent.env.get("GH_AW_WORKFLOW_NAME").and_then(Value::as_str),
            Some("Triage")
        );
        assert_eq!(
            agent.env.get("GH_AW_SAFE_OUTPUTS").and_then(Value::as_str),
            Some(SAFE_OUTPUTS_PATH)
        );
        assert_eq!(
            agent.env.get("GH_AW_ENGINE_ID").and_then(Value::as_str),
            Some("claude")
        );
    }
}
