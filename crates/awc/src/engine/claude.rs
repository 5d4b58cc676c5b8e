//! The Claude engine.

use std::collections::HashMap;

use yamlemit::Value;

use crate::actions::ActionResolver;
use crate::jobs::{AGENT_STDIO_LOG, MCP_CONFIG_PATH, PROMPT_PATH, StepBuilder};
use crate::workflow::{BashTool, EngineId, WorkflowData};

use super::firewall::{firewall_enabled, wrap_engine_command};
use super::metrics::{LogMetrics, json_size, json_values};
use super::{CodingAgentEngine, npm_install_steps};

const DEFAULT_VERSION: &str = "2.0.14";

pub struct ClaudeEngine;

impl ClaudeEngine {
    /// Builds the `--allowedTools` value from the normalized tools map.
    fn allowed_tools(data: &WorkflowData) -> Vec<String> {
        let mut tools = vec![];

        match &data.tools.bash {
            Some(bash) if bash.allows_everything() => tools.push("Bash".to_string()),
            Some(BashTool::Commands(commands)) => {
                for command in commands {
                    tools.push(format!("Bash({command})"));
                }
            }
            _ => {}
        }

        if data.tools.edit {
            tools.push("Edit".to_string());
            tools.push("Write".to_string());
        }
        if data.tools.web_fetch {
            tools.push("WebFetch".to_string());
        }
        if data.tools.web_search {
            tools.push("WebSearch".to_string());
        }

        tools.sort();
        tools
    }

    fn command_line(data: &WorkflowData) -> String {
        let mut command = String::from("claude --print --output-format stream-json --verbose");

        if let Some(model) = &data.engine.model {
            command.push_str(&format!(" --model {model}"));
        }
        if let Some(max_turns) = data.engine.max_turns {
            command.push_str(&format!(" --max-turns {max_turns}"));
        }

        let allowed = Self::allowed_tools(data);
        if !allowed.is_empty() {
            command.push_str(&format!(" --allowedTools \"{}\"", allowed.join(",")));
        }

        if super::default_mcp_config(data).is_some() {
            command.push_str(&format!(" --mcp-config {MCP_CONFIG_PATH}"));
        }

        for arg in &data.engine.args {
            command.push_str(&format!(" {arg}"));
        }

        command.push_str(&format!(
            " \"$(cat \"$GH_AW_PROMPT\")\" 2>&1 | tee {AGENT_STDIO_LOG}"
        ));
        command
    }
}

impl CodingAgentEngine for ClaudeEngine {
    fn id(&self) -> EngineId {
        EngineId::Claude
    }

    fn display_name(&self) -> &'static str {
        "Claude Code"
    }

    fn supports_tools_allowlist(&self) -> bool {
        true
    }

    fn supports_http_transport(&self) -> bool {
        true
    }

    fn supports_max_turns(&self) -> bool {
        true
    }

    fn supports_web_fetch(&self) -> bool {
        true
    }

    fn supports_plugins(&self) -> bool {
        true
    }

    fn default_detection_model(&self) -> &'static str {
        "claude-3-5-haiku-latest"
    }

    fn required_secret_names(&self) -> &'static [&'static str] {
        &["ANTHROPIC_API_KEY"]
    }

    fn declared_output_files(&self) -> Vec<String> {
        vec![AGENT_STDIO_LOG.to_string()]
    }

    fn installation_steps(&self, data: &WorkflowData, _actions: &ActionResolver) -> Vec<Value> {
        let version = data.engine.version.as_deref().unwrap_or(DEFAULT_VERSION);
        npm_install_steps("@anthropic-ai/claude-code", version)
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

        let mut step = StepBuilder::run("Run Claude Code", command)
            .id("agent")
            .env("GH_AW_PROMPT", PROMPT_PATH)
            .env(
                "ANTHROPIC_API_KEY",
                "${{ secrets.ANTHROPIC_API_KEY }}",
            );

        for (name, value) in &data.engine.env {
            step = step.env(name.clone(), Value::str(value));
        }

        vec![step.build()]
    }

    fn parse_log_metrics(&self, log: &str) -> LogMetrics {
        let mut metrics = LogMetrics::default();
        // tool_use id → tool name, for attributing tool_result sizes.
        let mut pending: HashMap<String, String> = HashMap::new();

        for value in json_values(log) {
            let message = if value.get("message").is_some() {
                &value["message"]
            } else {
                &value
            };

            if let Some(usage) = message.get("usage") {
                metrics.token_usage += usage["input_tokens"].as_u64().unwrap_or(0)
                    + usage["output_tokens"].as_u64().unwrap_or(0);
            }

            let Some(content) = message.get("content").and_then(|c| c.as_array()) else {
                continue;
            };

            for block in content {
                match block["type"].as_str() {
                    Some("tool_use") => {
                        let name = block["name"].as_str().unwrap_or("unknown");
                        metrics.record_tool_call(name, json_size(&block["input"]));
                        if let Some(id) = block["id"].as_str() {
                            pending.insert(id.to_string(), name.to_string());
                        }
                    }
                    Some("tool_result") => {
                        let Some(id) = block["tool_use_id"].as_str() else {
                            continue;
                        };
                        if let Some(name) = pending.get(id).cloned() {
                            metrics.record_tool_output(&name, json_size(&block["content"]));
                        }
                    }
                    _ => {}
                }
            }
        }

        metrics
    }

    fn log_parser_script_id(&self) -> &'static str {
        "parse_claude_log"
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
    fn test_allowed_tools_sorted() {
        let data = data("tools:\n  edit:\n  bash: [\"git status\", \"echo\"]\n  web-fetch:");
        assert_eq!(
            ClaudeEngine::allowed_tools(&data),
            vec!["Bash(echo)", "Bash(git status)", "Edit", "WebFetch", "Write"]
        );
    }

    #[test]
    fn test_bash_wildcard_collapses() {
        let data = data("tools:\n  bash:");
        assert_eq!(ClaudeEngine::allowed_tools(&data), vec!["Bash"]);
    }

    #[test]
    fn test_command_line() {
        let data = data("engine:\n  id: claude\n  model: claude-sonnet-4\n  max-turns: 5");
        let command = ClaudeEngine::command_line(&data);
        assert!(command.contains("--model claude-sonnet-4"));
        assert!(command.contains("--max-turns 5"));
        assert!(command.contains("tee /tmp/gh-aw/agent-stdio.log"));
    }

    #[test]
    fn test_execution_wrapped_when_firewalled() {
        let plain = ClaudeEngine.execution_steps(&data("engine: claude"));
        let run = plain[0].as_map().unwrap()["run"].as_str().unwrap();
        assert!(!run.starts_with("awf"));

        let firewalled = ClaudeEngine.execution_steps(&data("engine: claude\nsandbox: awf"));
        let run = firewalled[0].as_map().unwrap()["run"].as_str().unwrap();
        assert!(run.starts_with("awf "));
        assert!(run.contains("--mount /tmp/gh-aw:/tmp/gh-aw:rw"));
    }

    #[test]
    fn test_parse_log_metrics() {
        let log = r#"{"type":"assistant","message":{"usage":{"input_tokens":100,"output_tokens":50},"content":[{"type":"tool_use","id":"t1","name":"Bash","input":{"command":"echo hello"}}]}}
{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t1","content":"hello"}]}}
{"type":"assistant","message":{"usage":{"input_tokens":20,"output_tokens":10},"content":[{"type":"tool_use","id":"t2","name":"Bash","input":{"command":"x"}}]}}
not json at all
"#;
        let metrics = ClaudeEngine.parse_log_metrics(log);

        assert_eq!(metrics.token_usage, 180);
        let bash = metrics.tool("Bash").unwrap();
        assert_eq!(bash.call_count, 2);
        assert!(bash.max_input_size >= bash.max_output_size);
    }
}
