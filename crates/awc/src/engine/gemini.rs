//! The Google Gemini engine.

use yamlemit::Value;

use crate::actions::ActionResolver;
use crate::jobs::{AGENT_STDIO_LOG, PROMPT_PATH, StepBuilder};
use crate::workflow::{EngineId, WorkflowData};

use super::firewall::{firewall_enabled, wrap_engine_command};
use super::metrics::{LogMetrics, json_size, json_values};
use super::{CodingAgentEngine, npm_install_steps};

const DEFAULT_VERSION: &str = "0.6.1";

pub struct GeminiEngine;

impl GeminiEngine {
    fn command_line(data: &WorkflowData) -> String {
        let mut command = String::from("gemini --yolo");

        if let Some(model) = &data.engine.model {
            command.push_str(&format!(" --model {model}"));
        }
        for arg in &data.engine.args {
            command.push(' ');
            command.push_str(arg);
        }

        command.push_str(&format!(
            " --prompt \"$(cat \"$GH_AW_PROMPT\")\" 2>&1 | tee {AGENT_STDIO_LOG}"
        ));
        command
    }
}

impl CodingAgentEngine for GeminiEngine {
    fn id(&self) -> EngineId {
        EngineId::Gemini
    }

    fn display_name(&self) -> &'static str {
        "Google Gemini CLI"
    }

    fn is_experimental(&self) -> bool {
        true
    }

    fn default_detection_model(&self) -> &'static str {
        "gemini-2.0-flash"
    }

    fn required_secret_names(&self) -> &'static [&'static str] {
        &["GEMINI_API_KEY"]
    }

    fn installation_steps(&self, data: &WorkflowData, _actions: &ActionResolver) -> Vec<Value> {
        let version = data.engine.version.as_deref().unwrap_or(DEFAULT_VERSION);
        npm_install_steps("@google/gemini-cli", version)
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

        let mut step = StepBuilder::run("Run Gemini", command)
            .id("agent")
            .env("GH_AW_PROMPT", PROMPT_PATH)
            .env("GEMINI_API_KEY", "${{ secrets.GEMINI_API_KEY }}");

        for (name, value) in &data.engine.env {
            step = step.env(name.clone(), Value::str(value));
        }

        vec![step.build()]
    }

    fn parse_log_metrics(&self, log: &str) -> LogMetrics {
        let mut metrics = LogMetrics::default();

        for value in json_values(log) {
            if let Some(total) = value["usageMetadata"]["totalTokenCount"].as_u64() {
                metrics.token_usage += total;
            }

            if let Some(call) = value.get("functionCall") {
                let name = call["name"].as_str().unwrap_or("unknown");
                metrics.record_tool_call(name, json_size(&call["args"]));
            }

            if let Some(response) = value.get("functionResponse") {
                let name = response["name"].as_str().unwrap_or("unknown");
                metrics.record_tool_output(name, json_size(&response["response"]));
            }
        }

        metrics
    }

    fn log_parser_script_id(&self) -> &'static str {
        "parse_gemini_log"
    }
}
