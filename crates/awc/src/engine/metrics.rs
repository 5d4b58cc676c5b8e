//! Log-metrics extraction shared across engines.
//!
//! Engine logs arrive in two shapes: concatenated (possibly
//! pretty-printed) JSON values, or line-oriented text with JSON
//! embedded after a debug prefix. [`json_values`] tolerates both and
//! silently skips anything that does not parse.

use indexmap::IndexMap;
use serde::Serialize;

/// Usage metrics for a single tool, maximums across repeated calls.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ToolMetric {
    pub name: String,
    pub call_count: u64,
    pub max_input_size: u64,
    pub max_output_size: u64,
}

/// Metrics extracted from an engine run's log. Serializes into the run
/// summary emitted by the log-parsing steps.
#[derive(Clone, Debug, Default, Serialize)]
pub struct LogMetrics {
    /// Total token usage, summed across all model entries.
    pub token_usage: u64,
    tools: IndexMap<String, ToolMetric>,
}

impl LogMetrics {
    pub fn record_tool_call(&mut self, name: &str, input_size: u64) {
        let metric = self
            .tools
            .entry(name.to_string())
            .or_insert_with(|| ToolMetric {
                name: name.to_string(),
                ..ToolMetric::default()
            });
        metric.call_count += 1;
        metric.max_input_size = metric.max_input_size.max(input_size);
    }

    pub fn record_tool_output(&mut self, name: &str, output_size: u64) {
        let metric = self
            .tools
            .entry(name.to_string())
            .or_insert_with(|| ToolMetric {
                name: name.to_string(),
                ..ToolMetric::default()
            });
        metric.max_output_size = metric.max_output_size.max(output_size);
    }

    pub fn tools(&self) -> impl Iterator<Item = &ToolMetric> {
        self.tools.values()
    }

    pub fn tool(&self, name: &str) -> Option<&ToolMetric> {
        self.tools.get(name)
    }
}

/// Extracts every JSON value from a log, skipping unparseable content.
pub fn json_values(log: &str) -> Vec<serde_json::Value> {
    let trimmed = log.trim_start();

    // Concatenated JSON values (single- or multi-line).
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        let values: Vec<serde_json::Value> = serde_json::Deserializer::from_str(log)
            .into_iter()
            .map_while(Result::ok)
            .collect();
        if !values.is_empty() {
            return values;
        }
    }

    // Line-oriented: a JSON object may sit after a debug prefix.
    let mut values = vec![];
    for line in log.lines() {
        let Some(start) = line.find(['{', '[']) else {
            continue;
        };
        if let Ok(value) = serde_json::from_str(&line[start..]) {
            values.push(value);
        }
    }

    values
}

/// The serialized size of a JSON fragment, as a proxy for payload size.
pub fn json_size(value: &serde_json::Value) -> u64 {
    match value {
        serde_json::Value::String(s) => s.len() as u64,
        other => serde_json::to_string(other)
            .map(|s| s.len() as u64)
            .unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_json_values_multiline() {
        let log = "{\n  \"a\": 1\n}\n{\n  \"b\": 2\n}\n";
        let values = json_values(log);
        assert_eq!(values.len(), 2);
        assert_eq!(values[0]["a"], 1);
        assert_eq!(values[1]["b"], 2);
    }

    #[test]
    fn test_json_values_debug_lines() {
        let log = "[DEBUG] starting\n[DEBUG] event: {\"a\": 1}\nplain text\n[INFO] {\"b\": 2}\n";
        let values = json_values(log);
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_invalid_json_skipped() {
        let log = "[DEBUG] event: {not json}\n{\"ok\": true}\n";
        let values = json_values(log);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["ok"], true);
    }

    #[test]
    fn test_tool_metric_maximums() {
        let mut metrics = LogMetrics::default();
        metrics.record_tool_call("bash", 10);
        metrics.record_tool_call("bash", 50);
        metrics.record_tool_call("bash", 30);
        metrics.record_tool_output("bash", 100);
        metrics.record_tool_output("bash", 20);

        let tool = metrics.tool("bash").unwrap();
        assert_eq!(tool.call_count, 3);
        assert_eq!(tool.max_input_size, 50);
        assert_eq!(tool.max_output_size, 100);
    }
}
