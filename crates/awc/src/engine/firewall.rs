//! Agentic Workflow Firewall (AWF) command construction.
//!
//! When a firewall or sandbox is requested, the engine invocation is
//! wrapped in the AWF binary, which constrains network egress and
//! mount points for the containerized engine process.

use crate::utils::sh_quote;
use crate::workflow::WorkflowData;

/// The pinned AWF container image tag.
const AWF_IMAGE_TAG: &str = "v0.8.1";

/// Default proxy log directory inside the runner.
const PROXY_LOGS_DIR: &str = "/tmp/gh-aw/awf-logs";

/// Whether the workflow requests firewalling for the agent process.
pub fn firewall_enabled(data: &WorkflowData) -> bool {
    matches!(
        data.sandbox.agent,
        crate::workflow::AgentSandbox::Awf
    ) || data
        .network
        .firewall
        .as_ref()
        .is_some_and(|firewall| firewall.enabled)
}

/// Wraps an engine command line in the AWF invocation.
///
/// The engine command runs under `/bin/bash -c '…'`; interior single
/// quotes are escaped as `'\''`.
pub fn wrap_engine_command(
    data: &WorkflowData,
    engine_command: &str,
    needs_tty: bool,
    mounts: &[String],
) -> String {
    let mut awf = String::from("awf");

    if needs_tty {
        awf.push_str(" --tty");
    }

    awf.push_str(" --env-all");
    awf.push_str(" --container-workdir \"${GITHUB_WORKSPACE}\"");

    for mount in mounts {
        awf.push_str(&format!(" --mount {mount}"));
    }

    if !data.network.allowed.is_empty() {
        awf.push_str(&format!(
            " --allow-domains {}",
            data.network.allowed.join(",")
        ));
    }
    if !data.network.blocked.is_empty() {
        awf.push_str(&format!(
            " --block-domains {}",
            data.network.blocked.join(",")
        ));
    }

    let firewall = data.network.firewall.as_ref();

    let log_level = firewall
        .and_then(|f| f.log_level.as_deref())
        .unwrap_or("info");
    awf.push_str(&format!(" --log-level {log_level}"));
    awf.push_str(&format!(" --proxy-logs-dir {PROXY_LOGS_DIR}"));

    // MCP servers run on the host; the container must be able to reach
    // back to them.
    if has_mcp_servers(data) {
        awf.push_str(" --enable-host-access");
    }

    let image_tag = firewall
        .and_then(|f| f.image_tag.as_deref())
        .unwrap_or(AWF_IMAGE_TAG);
    awf.push_str(&format!(" --image-tag {image_tag}"));
    awf.push_str(" --skip-pull");

    if firewall.is_some_and(|f| f.api_proxy) {
        awf.push_str(" --enable-api-proxy");
    }
    if firewall.is_some_and(|f| f.ssl_bump) {
        awf.push_str(" --ssl-bump --ssl-bump-ca-dir /tmp/gh-aw/awf-ca");
    }

    format!(
        "{awf} -- /bin/bash -c {command}",
        command = sh_quote(engine_command)
    )
}

pub fn has_mcp_servers(data: &WorkflowData) -> bool {
    !data.mcp_servers.is_empty()
        || !data.tools.mcp.is_empty()
        || data.tools.github.is_some()
        || data.safe_outputs.is_some()
}

#[cfg(test)]
mod tests {
    use serde_yaml::Mapping;

    use crate::workflow::WorkflowData;

    use super::*;

    fn data(yaml: &str) -> WorkflowData {
        let mapping: Mapping = serde_yaml::from_str(yaml).unwrap();
        WorkflowData::parse("test", &mapping, chrono::Utc::now()).unwrap()
    }

    #[test]
    fn test_wrap_basic() {
        let data = data("network:\n  allowed: [example.com, api.example.com]");
        let wrapped = wrap_engine_command(&data, "claude --print", false, &[]);

        assert!(wrapped.starts_with("awf "));
        assert!(wrapped.contains("--env-all"));
        assert!(wrapped.contains("--container-workdir \"${GITHUB_WORKSPACE}\""));
        assert!(wrapped.contains("--allow-domains example.com,api.example.com"));
        assert!(!wrapped.contains("--block-domains"));
        assert!(wrapped.contains("--image-tag v0.8.1"));
        assert!(wrapped.contains("--skip-pull"));
        assert!(wrapped.ends_with("-- /bin/bash -c 'claude --print'"));
    }

    #[test]
    fn test_wrap_quotes_inner_single_quotes() {
        let data = data("name: t");
        let wrapped = wrap_engine_command(&data, "echo 'hello world'", false, &[]);
        assert!(wrapped.contains(r"/bin/bash -c 'echo '\''hello world'\'''"));
    }

    #[test]
    fn test_wrap_tty_and_mounts() {
        let data = data("name: t");
        let wrapped = wrap_engine_command(
            &data,
            "copilot",
            true,
            &["/tmp/gh-aw:/tmp/gh-aw:rw".to_string()],
        );
        assert!(wrapped.contains("--tty"));
        assert!(wrapped.contains("--mount /tmp/gh-aw:/tmp/gh-aw:rw"));
    }

    #[test]
    fn test_host_access_for_mcp() {
        let with_mcp = data("tools:\n  github:\n    allowed: [get_issue]");
        assert!(wrap_engine_command(&with_mcp, "x", false, &[]).contains("--enable-host-access"));

        let without = data("name: t");
        assert!(!wrap_engine_command(&without, "x", false, &[]).contains("--enable-host-access"));
    }

    #[test]
    fn test_firewall_options() {
        let data = data(
            "network:\n  firewall:\n    log-level: debug\n    image-tag: v9.9.9\n    api-proxy: true\n    ssl-bump: true",
        );
        let wrapped = wrap_engine_command(&data, "x", false, &[]);
        assert!(wrapped.contains("--log-level debug"));
        assert!(wrapped.contains("--image-tag v9.9.9"));
        assert!(wrapped.contains("--enable-api-proxy"));
        assert!(wrapped.contains("--ssl-bump"));
    }

    #[test]
    fn test_firewall_enabled_forms() {
        assert!(firewall_enabled(&data("sandbox: awf")));
        assert!(firewall_enabled(&data("network:\n  firewall: true")));
        assert!(!firewall_enabled(&data("network:\n  firewall: false")));
        assert!(!firewall_enabled(&data("name: t")));
    }
}
