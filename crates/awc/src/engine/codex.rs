//! The OpenAI Codex engine.

use std::collections::HashMap;

use yamlemit::Value;

use crate::actions::ActionResolver;
use crate::jobs::{AGENT_STDIO_LOG, PROMPT_PATH, StepBuilder};
use crate::workflow::{EngineId, WorkflowData};

use super::firewall::{firewall_enabled, wrap_engine_command};
use super::metrics::{LogMetrics, json_size, json_values};
use super::{CodingAgentEngine, npm_install_steps};

const DEFAULT_VERSION: &str = "0.46.0";

pub struct CodexEngine;

impl CodexEngine {
    fn command_line(data: &WorkflowData) -> String {
        let mut command = String::from("codex exec --full-auto --json");

        if let Some(model) = &data.engine.model {
            command.push_str(&format!(" --model {model}"));
        }
        for arg in &data.engine.args {
            command.push(' ');
            command.push_str(arg);
        }

        command.push_str(&format!(
            " \"$(cat \"$GH_AW_PROMPT\")\" 2>&1 | tee {AGENT_STDIO_LOG}"
        ));
        command
    }
}

impl CodingAgentEngine for CodexEngine {
    fn id(&self) -> EngineId {
        EngineId::Codex
    }

    fn display_name(&self) -> &'static str {
        "OpenAI Codex"
    }

    fn is_experimental(&self) -> bool {
        true
    }

    fn default_detection_model(&self) -> &'static str {
        "gpt-4o-mini"
    }

    fn required_secret_names(&self) -> &'static [&'static str] {
        &["OPENAI_API_KEY"]
    }

    fn installation_steps(&self, data: &WorkflowData, _actions: &ActionResolver) -> Vec<Value> {
        let version = data.engine.version.as_deref().unwrap_or(DEFAULT_VERSION);
        npm_install_steps("@openai/codex", version)
    }

    fn execution_steps(&self, data: &WorkflowData) -> Vec<Value> {
        let inner = data
            .engine
            .command
            .clone()
            .unwrap_or_else(|| Self::command_line(data));

        let command = if firewall_enabled(data) {
            wrap_engine_command(
                data,
                &inner,
                false,
                &[format!("{dir}:{dir}:rw", dir = crate::jobs::TMP_DIR)],
            )
        } else {
            inner
        };

        let mut step = StepBuilder::run("Run Codex", command)
            .id("agent")
            .env("GH_AW_PROMPT", PROMPT_PATH)
            .env("OPENAI_API_KEY", "${{ secrets.OPENAI_API_KEY }}");

        for (name, value) in &data.engine.env {
            step = step.env(name.clone(), Value::str(value));
        }

        vec![step.build()]
    }

    fn parse_log_metrics(&self, log: &str) -> LogMetrics {
        let mut metrics = LogMetrics::default();
        let mut pending: HashMap<String, String> = HashMap::new();

        for value in json_values(log) {
            match value["type"].as_str() {
                // Codex token counts are cumulative; keep the maximum.
                Some("token_count") => {
                    let total = value["info"]["total_token_usage"]["total_tokens"]
                        .as_u64()
                        .unwrap_or(0);
                    metrics.token_usage = metrics.token_usage.max(total);
                }
                Some("function_call") => {
                    let name = value["name"].as_str().unwrap_or("unknown");
                    metrics.record_tool_call(name, json_size(&value["arguments"]));
                    if let Some(id) = value["call_id"].as_str() {
                        pending.insert(id.to_string(), name.to_string());
                    }
                }
                Some("function_call_output") => {
                    let Some(id) = value["call_id"].as_str() else {
                        continue;
                    };
                    if let Some(name) = pending.get(id).cloned() {
                        metrics.record_tool_output(&name, json_size(&value["output"]));
                    }
                }
                _ => {}
            }
        }

        metrics
    }

    fn log_parser_script_id(&self) -> &'static str {
        "parse_codex_log"
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_yaml::Mapping;

    use super::*;

    fn data(yaml: &str) -> WorkflowData {
        let mapping: Mapping = serde_yaml::from_str(yaml).unwrap();
        WorkflowData::parse("test", &mapping, chrono::Utc::now()).unwrap()
    }

    #[test]
    fn test_command_line() {
        let command = CodexEngine::command_line(&data("engine:\n  id: codex\n  model: o4-mini"));
        assert!(command.starts_with("codex exec --full-auto --json"));
        assert!(command.contains("--model o4-mini"));
    }

    #[test]
    fn test_metrics_cumulative_tokens() {
        let log = r#"{"type":"token_count","info":{"total_token_usage":{"total_tokens":120}}}
{"type":"function_call","call_id":"c1","name":"shell","arguments":"{\"command\":[\"ls\"]}"}
{"type":"function_call_output","call_id":"c1","output":"README.md"}
{"type":"token_count","info":{"total_token_usage":{"total_tokens":450}}}
"#;
        let metrics = CodexEngine.parse_log_metrics(log);

        assert_eq!(metrics.token_usage, 450);
        let shell = metrics.tool("shell").unwrap();
        assert_eq!(shell.call_count, 1);
        assert_eq!(shell.max_output_size, "README.md".len() as u64);
    }
}
