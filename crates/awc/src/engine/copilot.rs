//! The GitHub Copilot engines: the interactive CLI and the headless
//! SDK variant.

use yamlemit::Value;

use crate::actions::ActionResolver;
use crate::jobs::{AGENT_STDIO_LOG, PROMPT_PATH, StepBuilder};
use crate::utils::sh_quote;
use crate::workflow::{BashTool, EngineId, WorkflowData};

use super::firewall::{firewall_enabled, wrap_engine_command};
use super::metrics::{LogMetrics, json_size, json_values};
use super::{CodingAgentEngine, npm_install_steps};

const DEFAULT_VERSION: &str = "0.0.355";

/// The port the headless SDK server listens on.
const SDK_PORT: u16 = 10002;

/// Builds the stable-sorted `--allow-tool` argument list from the
/// normalized tools map. Arguments containing shell-special characters
/// (`( ) * : [ ]` or spaces) are single-quoted; the prompt variable is
/// left double-quoted elsewhere so it still expands.
pub(crate) fn copilot_tool_args(data: &WorkflowData) -> Vec<String> {
    let mut specifiers: Vec<String> = vec![];
    let mut allow_all_tools = false;
    let mut allow_all_paths = false;

    match &data.tools.bash {
        Some(bash) if bash.allows_everything() => allow_all_tools = true,
        Some(BashTool::Commands(commands)) => {
            for command in commands {
                specifiers.push(format!("shell({command})"));
            }
        }
        _ => {}
    }

    if data.tools.edit {
        specifiers.push("write".to_string());
        allow_all_paths = true;
    }

    if let Some(github) = &data.tools.github {
        for tool in &github.allowed {
            specifiers.push(format!("github({tool})"));
        }
    }

    if data.safe_outputs.is_some() {
        specifiers.push("safeoutputs".to_string());
    }

    specifiers.sort();

    let mut args = vec![];
    if allow_all_tools {
        args.push("--allow-all-tools".to_string());
    }
    for specifier in specifiers {
        args.push("--allow-tool".to_string());
        args.push(quote_if_special(&specifier));
    }
    if allow_all_paths {
        args.push("--allow-all-paths".to_string());
    }

    args
}

fn quote_if_special(arg: &str) -> String {
    if arg.chars().any(|c| "()*:[] ".contains(c)) {
        sh_quote(arg)
    } else {
        arg.to_string()
    }
}

fn copilot_command(data: &WorkflowData, headless_port: Option<u16>) -> String {
    let mut command = String::from("copilot --log-level all --add-dir /tmp/gh-aw");

    if let Some(port) = headless_port {
        command.push_str(&format!(" --headless --port {port}"));
    }

    if let Some(model) = &data.engine.model {
        command.push_str(&format!(" --model {model}"));
    }

    for arg in copilot_tool_args(data) {
        command.push(' ');
        command.push_str(&arg);
    }

    for arg in &data.engine.args {
        command.push(' ');
        command.push_str(arg);
    }

    // The prompt stays double-quoted so the variable expands.
    command.push_str(&format!(
        " --prompt \"$(cat \"$GH_AW_PROMPT\")\" 2>&1 | tee {AGENT_STDIO_LOG}"
    ));
    command
}

fn copilot_execution(data: &WorkflowData, headless_port: Option<u16>, step_name: &str) -> Vec<Value> {
    let inner = data
        .engine
        .command
        .clone()
        .unwrap_or_else(|| copilot_command(data, headless_port));

    let command = if firewall_enabled(data) {
        wrap_engine_command(
            data,
            &inner,
            true,
            &[format!("{dir}:{dir}:rw", dir = crate::jobs::TMP_DIR)],
        )
    } else {
        inner
    };

    let mut step = StepBuilder::run(step_name, command)
        .id("agent")
        .env("GH_AW_PROMPT", PROMPT_PATH)
        .env(
            "COPILOT_GITHUB_TOKEN",
            "${{ secrets.COPILOT_GITHUB_TOKEN || secrets.GH_TOKEN }}",
        );

    for (name, value) in &data.engine.env {
        step = step.env(name.clone(), Value::str(value));
    }

    vec![step.build()]
}

fn copilot_metrics(log: &str) -> LogMetrics {
    let mut metrics = LogMetrics::default();

    for value in json_values(log) {
        if let Some(usage) = value.get("usage") {
            let total = usage["total_tokens"].as_u64().unwrap_or_else(|| {
                usage["prompt_tokens"].as_u64().unwrap_or(0)
                    + usage["completion_tokens"].as_u64().unwrap_or(0)
            });
            metrics.token_usage += total;
        }

        if let Some(calls) = value.get("tool_calls").and_then(|c| c.as_array()) {
            for call in calls {
                let name = call["function"]["name"].as_str().unwrap_or("unknown");
                metrics.record_tool_call(name, json_size(&call["function"]["arguments"]));
            }
        }

        if value["type"] == "tool_result" {
            if let Some(name) = value["tool"].as_str() {
                metrics.record_tool_output(name, json_size(&value["output"]));
            }
        }
    }

    metrics
}

pub struct CopilotEngine;

impl CodingAgentEngine for CopilotEngine {
    fn id(&self) -> EngineId {
        EngineId::Copilot
    }

    fn display_name(&self) -> &'static str {
        "GitHub Copilot CLI"
    }

    fn supports_tools_allowlist(&self) -> bool {
        true
    }

    fn default_detection_model(&self) -> &'static str {
        "gpt-4o-mini"
    }

    fn required_secret_names(&self) -> &'static [&'static str] {
        &["COPILOT_GITHUB_TOKEN"]
    }

    fn installation_steps(&self, data: &WorkflowData, _actions: &ActionResolver) -> Vec<Value> {
        let version = data.engine.version.as_deref().unwrap_or(DEFAULT_VERSION);
        npm_install_steps("@github/copilot", version)
    }

    fn execution_steps(&self, data: &WorkflowData) -> Vec<Value> {
        copilot_execution(data, None, "Run GitHub Copilot CLI")
    }

    fn parse_log_metrics(&self, log: &str) -> LogMetrics {
        copilot_metrics(log)
    }

    fn log_parser_script_id(&self) -> &'static str {
        "parse_copilot_log"
    }
}

/// The headless Copilot SDK variant: an HTTP server on a fixed port,
/// reachable from the firewall container via the Docker internal host.
pub struct CopilotSdkEngine;

impl CodingAgentEngine for CopilotSdkEngine {
    fn id(&self) -> EngineId {
        EngineId::CopilotSdk
    }

    fn display_name(&self) -> &'static str {
        "GitHub Copilot SDK"
    }

    fn is_experimental(&self) -> bool {
        true
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

    fn llm_gateway_port(&self) -> u16 {
        SDK_PORT
    }

    fn default_detection_model(&self) -> &'static str {
        "gpt-4o-mini"
    }

    fn required_secret_names(&self) -> &'static [&'static str] {
        &["COPILOT_GITHUB_TOKEN"]
    }

    fn installation_steps(&self, data: &WorkflowData, _actions: &ActionResolver) -> Vec<Value> {
        let version = data.engine.version.as_deref().unwrap_or(DEFAULT_VERSION);
        npm_install_steps("@github/copilot", version)
    }

    fn execution_steps(&self, data: &WorkflowData) -> Vec<Value> {
        copilot_execution(data, Some(SDK_PORT), "Run GitHub Copilot SDK")
    }

    fn render_mcp_config(&self, data: &WorkflowData) -> Option<serde_json::Value> {
        let mut config = super::default_mcp_config(data)?;

        // Inside the firewall container, host-local MCP endpoints are
        // reached through the Docker internal hostname.
        if firewall_enabled(data) {
            rewrite_localhost(&mut config);
        }

        Some(config)
    }

    fn parse_log_metrics(&self, log: &str) -> LogMetrics {
        copilot_metrics(log)
    }

    fn log_parser_script_id(&self) -> &'static str {
        "parse_copilot_log"
    }
}

fn rewrite_localhost(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::String(s) => {
            if s.contains("://localhost") || s.contains("://127.0.0.1") {
                *s = s
                    .replace("://localhost", "://host.docker.internal")
                    .replace("://127.0.0.1", "://host.docker.internal");
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(rewrite_localhost),
        serde_json::Value::Object(map) => map.values_mut().for_each(rewrite_localhost),
        _ => {}
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
    fn test_tool_args_sorted_and_quoted() {
        let data = data(
            "tools:\n  bash: [\"echo\", \"git status\"]\n  edit:\n  github:\n    allowed: [get_issue]\nsafe-outputs:\n  create-issue:",
        );
        let args = copilot_tool_args(&data);

        // Specifiers appear in sorted order; those with special
        // characters are single-quoted.
        assert_eq!(
            args,
            vec![
                "--allow-tool",
                "'github(get_issue)'",
                "--allow-tool",
                "safeoutputs",
                "--allow-tool",
                "'shell(echo)'",
                "--allow-tool",
                "'shell(git status)'",
                "--allow-tool",
                "write",
                "--allow-all-paths",
            ]
        );
    }

    #[test]
    fn test_wildcard_bash_allows_all_tools() {
        let data = data("tools:\n  bash: [\"*\"]");
        assert_eq!(copilot_tool_args(&data), vec!["--allow-all-tools"]);
    }

    #[test]
    fn test_special_characters_quoted() {
        for (specifier, quoted) in [
            ("shell(npm:*)", true),
            ("write", false),
            ("safeoutputs", false),
        ] {
            let result = quote_if_special(specifier);
            assert_eq!(result.starts_with('\''), quoted, "case: {specifier}");
        }
    }

    #[test]
    fn test_prompt_stays_double_quoted() {
        let data = data("engine: copilot");
        let command = copilot_command(&data, None);
        assert!(command.contains("--prompt \"$(cat \"$GH_AW_PROMPT\")\""));
    }

    #[test]
    fn test_sdk_rewrites_localhost_when_firewalled() {
        let data = data(
            "engine: copilot-sdk\nsandbox: awf\nmcp-servers:\n  local-tool:\n    url: http://localhost:8080/mcp",
        );
        let config = CopilotSdkEngine.render_mcp_config(&data).unwrap();
        assert_eq!(
            config["mcpServers"]["local-tool"]["url"],
            "http://host.docker.internal:8080/mcp"
        );

        let unfirewalled = data_clone_without_sandbox();
        let config = CopilotSdkEngine.render_mcp_config(&unfirewalled).unwrap();
        assert_eq!(
            config["mcpServers"]["local-tool"]["url"],
            "http://localhost:8080/mcp"
        );
    }

    fn data_clone_without_sandbox() -> WorkflowData {
        data("engine: copilot-sdk\nmcp-servers:\n  local-tool:\n    url: http://localhost:8080/mcp")
    }

    #[test]
    fn test_copilot_metrics() {
        let log = "[DEBUG] response: {\"usage\":{\"prompt_tokens\":100,\"completion_tokens\":40}}\n\
                   [DEBUG] calling: {\"tool_calls\":[{\"function\":{\"name\":\"bash\",\"arguments\":\"{\\\"cmd\\\":\\\"ls\\\"}\"}}]}\n\
                   [DEBUG] done: {\"type\":\"tool_result\",\"tool\":\"bash\",\"output\":\"file listing\"}\n";
        let metrics = copilot_metrics(log);

        assert_eq!(metrics.token_usage, 140);
        let bash = metrics.tool("bash").unwrap();
        assert_eq!(bash.call_count, 1);
        assert!(bash.max_output_size > 0);
    }
}
