//! The custom engine: the user supplies the command line; the compiler
//! provides the scaffolding around it.

use yamlemit::Value;

use crate::actions::ActionResolver;
use crate::jobs::{AGENT_STDIO_LOG, PROMPT_PATH, StepBuilder};
use crate::workflow::{EngineId, WorkflowData};

use super::metrics::{LogMetrics, json_values};
use super::CodingAgentEngine;

pub struct CustomEngine;

impl CodingAgentEngine for CustomEngine {
    fn id(&self) -> EngineId {
        EngineId::Custom
    }

    fn display_name(&self) -> &'static str {
        "Custom"
    }

    fn supports_firewall(&self) -> bool {
        false
    }

    fn default_detection_model(&self) -> &'static str {
        ""
    }

    fn required_secret_names(&self) -> &'static [&'static str] {
        &[]
    }

    fn installation_steps(&self, _data: &WorkflowData, _actions: &ActionResolver) -> Vec<Value> {
        vec![]
    }

    fn execution_steps(&self, data: &WorkflowData) -> Vec<Value> {
        let mut command = data.engine.command.clone().unwrap_or_default();

        for arg in &data.engine.args {
            command.push(' ');
            command.push_str(arg);
        }
        command.push_str(&format!(" 2>&1 | tee {AGENT_STDIO_LOG}"));

        let mut step = StepBuilder::run("Run agent", command)
            .id("agent")
            .env("GH_AW_PROMPT", PROMPT_PATH);

        for (name, value) in &data.engine.env {
            step = step.env(name.clone(), Value::str(value));
        }

        vec![step.build()]
    }

    fn parse_log_metrics(&self, log: &str) -> LogMetrics {
        let mut metrics = LogMetrics::default();

        // Best effort over whatever the command logged: any JSON value
        // carrying a recognizable usage object contributes.
        for value in json_values(log) {
            if let Some(usage) = value.get("usage") {
                let total = usage["total_tokens"].as_u64().unwrap_or_else(|| {
                    usage["input_tokens"].as_u64().unwrap_or(0)
                        + usage["output_tokens"].as_u64().unwrap_or(0)
                });
                metrics.token_usage += total;
            }
        }

        metrics
    }

    fn log_parser_script_id(&self) -> &'static str {
        "parse_custom_log"
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_yaml::Mapping;

    use super::*;

    #[test]
    fn test_execution_uses_declared_command() {
        let mapping: Mapping = serde_yaml::from_str(
            "engine:\n  id: custom\n  command: ./scripts/agent.sh\n  args: [--fast]",
        )
        .unwrap();
        let data = WorkflowData::parse("test", &mapping, chrono::Utc::now()).unwrap();

        let steps = CustomEngine.execution_steps(&data);
        let run = steps[0].as_map().unwrap()["run"].as_str().unwrap();
        assert!(run.starts_with("./scripts/agent.sh --fast"));
    }

    #[test]
    fn test_metrics_best_effort() {
        let log = "{\"usage\":{\"total_tokens\":77}}\n";
        assert_eq!(CustomEngine.parse_log_metrics(log).token_usage, 77);
    }
}
