//! The coding-agent engine abstraction.
//!
//! Each supported engine implements [`CodingAgentEngine`]: how it is
//! installed, how its CLI is invoked (possibly under the firewall
//! wrapper), how its MCP configuration is rendered, and how its logs
//! are mined for metrics.

pub mod claude;
pub mod codex;
pub mod copilot;
pub mod custom;
pub mod firewall;
pub mod gemini;
pub mod metrics;

use serde_json::json;
use yamlemit::Value;

use crate::actions::{ActionResolver, pinned};
use crate::jobs::{MCP_CONFIG_PATH, SAFE_OUTPUTS_DIR, StepBuilder};
use crate::utils::yaml_to_json;
use crate::workflow::{EngineId, WorkflowData};

use metrics::LogMetrics;

/// Token resolution chain for the GitHub MCP server.
pub const GITHUB_MCP_TOKEN_CHAIN: &str =
    "${{ secrets.GH_AW_GITHUB_MCP_SERVER_TOKEN || secrets.GH_AW_GITHUB_TOKEN || secrets.GITHUB_TOKEN }}";

/// Node version installed for npm-distributed engine CLIs.
const NODE_VERSION: &str = "24";

/// A coding agent engine: polymorphic over installation, execution,
/// MCP configuration, and log parsing.
pub trait CodingAgentEngine {
    fn id(&self) -> EngineId;
    fn display_name(&self) -> &'static str;

    fn is_experimental(&self) -> bool {
        false
    }
    fn supports_tools_allowlist(&self) -> bool {
        false
    }
    fn supports_http_transport(&self) -> bool {
        false
    }
    fn supports_max_turns(&self) -> bool {
        false
    }
    fn supports_web_fetch(&self) -> bool {
        false
    }
    fn supports_firewall(&self) -> bool {
        true
    }
    fn supports_plugins(&self) -> bool {
        false
    }

    /// The local LLM gateway port, or 0 when the engine has none.
    fn llm_gateway_port(&self) -> u16 {
        0
    }

    /// The fast model used by the threat-detection job.
    fn default_detection_model(&self) -> &'static str;

    /// Secrets the agent job must surface as env vars.
    fn required_secret_names(&self) -> &'static [&'static str];

    /// Log or output files the engine produces beyond the shared stdio
    /// log.
    fn declared_output_files(&self) -> Vec<String> {
        vec![]
    }

    fn installation_steps(&self, data: &WorkflowData, actions: &ActionResolver) -> Vec<Value>;

    fn execution_steps(&self, data: &WorkflowData) -> Vec<Value>;

    /// The MCP server configuration the engine consumes, or `None` when
    /// no MCP servers apply.
    fn render_mcp_config(&self, data: &WorkflowData) -> Option<serde_json::Value> {
        default_mcp_config(data)
    }

    fn parse_log_metrics(&self, log: &str) -> LogMetrics;

    /// The runtime log-parser handler this engine's logs route to.
    fn log_parser_script_id(&self) -> &'static str;

    /// The file handed to the log parser.
    fn log_file_for_parsing(&self) -> &'static str {
        crate::jobs::AGENT_STDIO_LOG
    }
}

/// Returns the engine implementation for an id.
pub fn engine_for(id: EngineId) -> Box<dyn CodingAgentEngine> {
    match id {
        EngineId::Claude => Box::new(claude::ClaudeEngine),
        EngineId::Copilot => Box::new(copilot::CopilotEngine),
        EngineId::CopilotSdk => Box::new(copilot::CopilotSdkEngine),
        EngineId::Codex => Box::new(codex::CodexEngine),
        EngineId::Gemini => Box::new(gemini::GeminiEngine),
        EngineId::Custom => Box::new(custom::CustomEngine),
    }
}

/// Shared install recipe for npm-distributed engine CLIs: pinned
/// setup-node, then a global install of the pinned package version.
pub(crate) fn npm_install_steps(package: &str, version: &str) -> Vec<Value> {
    vec![
        StepBuilder::uses("Setup Node.js", pinned::SETUP_NODE)
            .with("node-version", Value::str(NODE_VERSION))
            .build(),
        StepBuilder::run(
            format!("Install {package}"),
            format!("npm install -g {package}@{version}"),
        )
        .build(),
    ]
}

/// The default MCP configuration shared by engines that consume a
/// standard `mcpServers` JSON document.
pub(crate) fn default_mcp_config(data: &WorkflowData) -> Option<serde_json::Value> {
    let mut servers = serde_json::Map::new();

    if data.safe_outputs.is_some() {
        servers.insert(
            "safeoutputs".into(),
            json!({
                "command": "node",
                "args": [format!("{SAFE_OUTPUTS_DIR}/mcp-server.cjs")],
                "env": {
                    "GH_AW_SAFE_OUTPUTS": crate::jobs::SAFE_OUTPUTS_PATH,
                },
            }),
        );
    }

    if let Some(github) = &data.tools.github {
        let mut server = json!({
            "command": "docker",
            "args": [
                "run", "--rm", "-i",
                "-e", "GITHUB_PERSONAL_ACCESS_TOKEN",
                "ghcr.io/github/github-mcp-server",
            ],
            "env": {
                "GITHUB_PERSONAL_ACCESS_TOKEN": data
                    .github_token
                    .as_deref()
                    .unwrap_or(GITHUB_MCP_TOKEN_CHAIN),
            },
        });
        if !github.allowed.is_empty() {
            server["tools"] = json!(github.allowed);
        }
        servers.insert("github".into(), server);
    }

    for (name, config) in data.tools.mcp.iter().chain(data.mcp_servers.iter()) {
        servers.insert(name.clone(), yaml_to_json(config));
    }

    if servers.is_empty() {
        return None;
    }

    Some(json!({ "mcpServers": servers }))
}

/// The step that materializes the MCP configuration file on the runner.
pub(crate) fn write_mcp_config_step(config: &serde_json::Value) -> Value {
    let rendered = serde_json::to_string_pretty(config).unwrap_or_else(|_| "{}".into());

    StepBuilder::run(
        "Write MCP configuration",
        format!("mkdir -p {dir}\ncat > {MCP_CONFIG_PATH} << 'GH_AW_EOF'\n{rendered}\nGH_AW_EOF", dir = crate::jobs::TMP_DIR),
    )
    .env("GH_AW_MCP_CONFIG", MCP_CONFIG_PATH)
    .build()
}

#[cfg(test)]
mod tests {
    use serde_yaml::Mapping;

    use super::*;

    fn data(yaml: &str) -> WorkflowData {
        let mapping: Mapping = serde_yaml::from_str(yaml).unwrap();
        WorkflowData::parse("test", &mapping, chrono::Utc::now()).unwrap()
    }

    #[test]
    fn test_engine_capability_matrix() {
        let claude = engine_for(EngineId::Claude);
        assert!(!claude.is_experimental());
        assert!(claude.supports_tools_allowlist());
        assert!(claude.supports_max_turns());
        assert!(claude.supports_plugins());
        assert_eq!(claude.llm_gateway_port(), 0);

        let copilot = engine_for(EngineId::Copilot);
        assert!(copilot.supports_tools_allowlist());
        assert!(!copilot.supports_max_turns());

        let copilot_sdk = engine_for(EngineId::CopilotSdk);
        assert!(copilot_sdk.is_experimental());
        assert_eq!(copilot_sdk.llm_gateway_port(), 10002);

        let codex = engine_for(EngineId::Codex);
        assert!(codex.is_experimental());
        assert!(!codex.supports_tools_allowlist());

        let custom = engine_for(EngineId::Custom);
        assert!(!custom.supports_firewall());
    }

    #[test]
    fn test_required_secrets() {
        assert_eq!(
            *engine_for(EngineId::Claude).required_secret_names(),
            ["ANTHROPIC_API_KEY"]
        );
        assert_eq!(
            *engine_for(EngineId::Codex).required_secret_names(),
            ["OPENAI_API_KEY"]
        );
        assert!(engine_for(EngineId::Custom).required_secret_names().is_empty());
    }

    #[test]
    fn test_default_mcp_config_composition() {
        let data = data(
            "tools:\n  github:\n    allowed: [get_issue]\nsafe-outputs:\n  create-issue:\nmcp-servers:\n  tavily:\n    url: https://mcp.tavily.com/mcp",
        );
        let config = default_mcp_config(&data).unwrap();
        let servers = config["mcpServers"].as_object().unwrap();

        assert!(servers.contains_key("safeoutputs"));
        assert!(servers.contains_key("github"));
        assert!(servers.contains_key("tavily"));
        assert_eq!(servers["github"]["tools"][0], "get_issue");
        assert_eq!(
            servers["github"]["env"]["GITHUB_PERSONAL_ACCESS_TOKEN"],
            GITHUB_MCP_TOKEN_CHAIN
        );
    }

    #[test]
    fn test_no_mcp_config_when_no_servers() {
        assert!(default_mcp_config(&data("name: t")).is_none());
    }
}
