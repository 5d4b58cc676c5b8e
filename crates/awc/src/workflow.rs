//! The parsed, normalized workflow model.
//!
//! [`WorkflowData`] is constructed during parsing, mutated only by the
//! job graph synthesizer, and read-only during emission.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};

use crate::error::CompileError;
use crate::permissions::PermissionSet;
use crate::safe_outputs::SafeOutputs;
use crate::utils::{closest_match, sanitize_workflow_id, scalar_to_string};

/// Events whose payloads give the workflow "content context": a body of
/// user-authored text (issue, PR, comment, discussion) the agent reads.
const CONTENT_CONTEXT_EVENTS: &[&str] = &[
    "issues",
    "pull_request",
    "pull_request_target",
    "issue_comment",
    "pull_request_review_comment",
    "pull_request_review",
    "discussion",
    "discussion_comment",
    "slash_command",
];

/// The normalized trigger block.
#[derive(Clone, Debug, Default)]
pub struct Triggers {
    /// Event name → event options (opaque, pass-through).
    pub events: IndexMap<String, Value>,
}

impl Triggers {
    fn parse(value: &Value) -> Result<Self, CompileError> {
        let mut events = IndexMap::new();

        match value {
            Value::String(event) => {
                events.insert(event.clone(), Value::Null);
            }
            Value::Sequence(seq) => {
                for item in seq {
                    let event = item.as_str().ok_or_else(|| {
                        CompileError::validation("`on:` list entries must be event names")
                    })?;
                    events.insert(event.to_string(), Value::Null);
                }
            }
            Value::Mapping(map) => {
                for (key, options) in map {
                    let event = key.as_str().ok_or_else(|| {
                        CompileError::validation("`on:` keys must be event names")
                    })?;
                    events.insert(event.to_string(), options.clone());
                }
            }
            _ => {
                return Err(CompileError::validation(
                    "`on:` must be an event name, a list of events, or a mapping",
                ));
            }
        }

        Ok(Self { events })
    }

    /// Whether any trigger carries user-authored content the agent will
    /// read (issues, PRs, comments, discussions, slash commands).
    pub fn has_content_context(&self) -> bool {
        self.events
            .keys()
            .any(|event| CONTENT_CONTEXT_EVENTS.contains(&event.as_str()))
    }

    pub fn has(&self, event: &str) -> bool {
        self.events.contains_key(event)
    }
}

/// The supported coding agent engines.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum EngineId {
    #[default]
    Claude,
    Copilot,
    CopilotSdk,
    Codex,
    Gemini,
    Custom,
}

impl EngineId {
    pub const ALL: &[&str] = &["claude", "codex", "copilot", "copilot-sdk", "custom", "gemini"];

    pub fn as_str(self) -> &'static str {
        match self {
            EngineId::Claude => "claude",
            EngineId::Copilot => "copilot",
            EngineId::CopilotSdk => "copilot-sdk",
            EngineId::Codex => "codex",
            EngineId::Gemini => "gemini",
            EngineId::Custom => "custom",
        }
    }

    pub fn parse(id: &str) -> Result<Self, CompileError> {
        match id {
            "claude" => Ok(EngineId::Claude),
            "copilot" => Ok(EngineId::Copilot),
            "copilot-sdk" => Ok(EngineId::CopilotSdk),
            "codex" => Ok(EngineId::Codex),
            "gemini" => Ok(EngineId::Gemini),
            "custom" => Ok(EngineId::Custom),
            other => {
                let mut message = format!("unknown engine `{other}`");
                if let Some(suggestion) = closest_match(other, Self::ALL.iter().copied(), 2) {
                    message.push_str(&format!(", did you mean: {suggestion}"));
                }
                Err(CompileError::Validation(message))
            }
        }
    }
}

/// The `engine:` block: either a bare id string or an object.
#[derive(Clone, Debug, Default)]
pub struct EngineConfig {
    pub id: EngineId,
    pub version: Option<String>,
    pub model: Option<String>,
    pub max_turns: Option<u64>,
    /// Replacement command for the `custom` engine (and overrides for
    /// the built-in ones).
    pub command: Option<String>,
    pub args: Vec<String>,
    pub env: IndexMap<String, String>,
}

impl EngineConfig {
    fn parse(value: &Value) -> Result<Self, CompileError> {
        match value {
            Value::String(id) => Ok(Self {
                id: EngineId::parse(id)?,
                ..Self::default()
            }),
            Value::Mapping(map) => {
                let mut config = Self::default();

                for (key, value) in map {
                    let key = key.as_str().unwrap_or_default();
                    match key {
                        "id" => {
                            let id = value.as_str().ok_or_else(|| {
                                CompileError::validation("engine `id` must be a string")
                            })?;
                            config.id = EngineId::parse(id)?;
                        }
                        "version" => config.version = scalar_to_string(value),
                        "model" => config.model = value.as_str().map(str::to_string),
                        "max-turns" => {
                            config.max_turns = value.as_u64().or_else(|| {
                                value.as_str().and_then(|s| s.parse().ok())
                            });
                            if config.max_turns.is_none() {
                                return Err(CompileError::validation(
                                    "engine `max-turns` must be a positive integer",
                                ));
                            }
                        }
                        "command" => config.command = value.as_str().map(str::to_string),
                        "args" => {
                            let Value::Sequence(seq) = value else {
                                return Err(CompileError::validation(
                                    "engine `args` must be a list of strings",
                                ));
                            };
                            config.args = seq
                                .iter()
                                .filter_map(|v| scalar_to_string(v))
                                .collect();
                        }
                        "env" => {
                            let Value::Mapping(env) = value else {
                                return Err(CompileError::validation(
                                    "engine `env` must be a mapping",
                                ));
                            };
                            for (name, value) in env {
                                let (Some(name), Some(value)) =
                                    (name.as_str(), scalar_to_string(value))
                                else {
                                    return Err(CompileError::validation(
                                        "engine `env` entries must be string-valued",
                                    ));
                                };
                                config.env.insert(name.to_string(), value);
                            }
                        }
                        other => {
                            return Err(CompileError::validation(format!(
                                "unknown engine field `{other}`"
                            )));
                        }
                    }
                }

                Ok(config)
            }
            _ => Err(CompileError::validation(
                "`engine:` must be an engine id or a mapping",
            )),
        }
    }
}

/// The shell tool: every command, or an allow-list (entries may use
/// trailing `:*` wildcards; a bare `*` entry allows everything).
#[derive(Clone, Debug, PartialEq)]
pub enum BashTool {
    All,
    Commands(Vec<String>),
}

impl BashTool {
    pub fn allows_everything(&self) -> bool {
        match self {
            BashTool::All => true,
            BashTool::Commands(commands) => commands.iter().any(|c| c == "*"),
        }
    }
}

/// The `github` tool configuration: an allow-list of MCP sub-tools.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GithubTool {
    pub allowed: Vec<String>,
}

/// Cache scope for `cache-memory`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum CacheScope {
    #[default]
    Workflow,
    Repo,
}

/// The `cache-memory` tool: a persistent directory restored before and
/// saved after the agent run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CacheMemoryConfig {
    pub key: Option<String>,
    pub scope: CacheScope,
}

impl CacheMemoryConfig {
    fn parse(value: &Value) -> Result<Option<Self>, CompileError> {
        match value {
            Value::Bool(true) | Value::Null => Ok(Some(Self::default())),
            Value::Bool(false) => Ok(None),
            Value::Mapping(map) => {
                let mut config = Self::default();
                for (key, value) in map {
                    match key.as_str().unwrap_or_default() {
                        "key" => config.key = value.as_str().map(str::to_string),
                        "scope" => {
                            config.scope = match value.as_str() {
                                Some("workflow") => CacheScope::Workflow,
                                Some("repo") => CacheScope::Repo,
                                _ => {
                                    return Err(CompileError::validation(
                                        "cache-memory `scope` must be `workflow` or `repo`",
                                    ));
                                }
                            }
                        }
                        other => {
                            return Err(CompileError::validation(format!(
                                "unknown cache-memory field `{other}`"
                            )));
                        }
                    }
                }
                Ok(Some(config))
            }
            _ => Err(CompileError::validation(
                "`cache-memory` must be a boolean or a mapping",
            )),
        }
    }
}

/// The normalized view of the `tools:` block.
#[derive(Clone, Debug, Default)]
pub struct Tools {
    pub bash: Option<BashTool>,
    pub edit: bool,
    pub github: Option<GithubTool>,
    pub web_fetch: bool,
    pub web_search: bool,
    pub cache_memory: Option<CacheMemoryConfig>,
    /// Arbitrary MCP servers declared inline under `tools:`.
    pub mcp: IndexMap<String, Value>,
}

impl Tools {
    fn parse(value: &Value) -> Result<Self, CompileError> {
        let Value::Mapping(map) = value else {
            return Err(CompileError::validation("`tools:` must be a mapping"));
        };

        let mut tools = Self::default();

        for (key, value) in map {
            let key = key.as_str().unwrap_or_default();
            match key {
                "bash" => {
                    tools.bash = match value {
                        Value::Null | Value::Bool(true) => Some(BashTool::All),
                        Value::Bool(false) => None,
                        Value::Sequence(seq) => {
                            let commands = seq
                                .iter()
                                .map(|v| {
                                    v.as_str().map(str::to_string).ok_or_else(|| {
                                        CompileError::validation(
                                            "bash allow-list entries must be strings",
                                        )
                                    })
                                })
                                .collect::<Result<Vec<_>, _>>()?;
                            Some(BashTool::Commands(commands))
                        }
                        _ => {
                            return Err(CompileError::validation(
                                "`bash` must be a boolean, null, or a command list",
                            ));
                        }
                    };
                }
                "edit" => tools.edit = !matches!(value, Value::Bool(false)),
                "github" => {
                    let mut github = GithubTool::default();
                    if let Value::Mapping(map) = value {
                        if let Some(allowed) = map.get("allowed") {
                            let Value::Sequence(seq) = allowed else {
                                return Err(CompileError::validation(
                                    "`github.allowed` must be a list",
                                ));
                            };
                            github.allowed = seq
                                .iter()
                                .filter_map(|v| v.as_str().map(str::to_string))
                                .collect();
                        }
                    }
                    tools.github = Some(github);
                }
                "web-fetch" => tools.web_fetch = !matches!(value, Value::Bool(false)),
                "web-search" => tools.web_search = !matches!(value, Value::Bool(false)),
                "cache-memory" => tools.cache_memory = CacheMemoryConfig::parse(value)?,
                _ => {
                    // Anything else is an MCP server definition.
                    tools.mcp.insert(key.to_string(), value.clone());
                }
            }
        }

        Ok(tools)
    }
}

/// Firewall configuration nested under `network:`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FirewallConfig {
    pub enabled: bool,
    pub log_level: Option<String>,
    pub image_tag: Option<String>,
    pub api_proxy: bool,
    pub ssl_bump: bool,
}

/// The `network:` block: egress allow/block lists and the firewall.
#[derive(Clone, Debug, Default)]
pub struct NetworkPermissions {
    pub allowed: Vec<String>,
    pub blocked: Vec<String>,
    pub firewall: Option<FirewallConfig>,
}

impl NetworkPermissions {
    fn parse(value: &Value) -> Result<Self, CompileError> {
        let Value::Mapping(map) = value else {
            return Err(CompileError::validation("`network:` must be a mapping"));
        };

        let mut network = Self::default();

        for (key, value) in map {
            match key.as_str().unwrap_or_default() {
                "allowed" => network.allowed = string_list(value, "network.allowed")?,
                "blocked" => network.blocked = string_list(value, "network.blocked")?,
                "firewall" => {
                    let mut firewall = FirewallConfig::default();
                    match value {
                        Value::Bool(enabled) => firewall.enabled = *enabled,
                        Value::Mapping(map) => {
                            firewall.enabled = true;
                            for (key, value) in map {
                                match key.as_str().unwrap_or_default() {
                                    "enabled" => {
                                        firewall.enabled = value.as_bool().unwrap_or(true)
                                    }
                                    "log-level" => {
                                        firewall.log_level = value.as_str().map(str::to_string)
                                    }
                                    "image-tag" => {
                                        firewall.image_tag = value.as_str().map(str::to_string)
                                    }
                                    "api-proxy" => {
                                        firewall.api_proxy = value.as_bool().unwrap_or(false)
                                    }
                                    "ssl-bump" => {
                                        firewall.ssl_bump = value.as_bool().unwrap_or(false)
                                    }
                                    other => {
                                        return Err(CompileError::validation(format!(
                                            "unknown firewall field `{other}`"
                                        )));
                                    }
                                }
                            }
                        }
                        _ => {
                            return Err(CompileError::validation(
                                "`network.firewall` must be a boolean or a mapping",
                            ));
                        }
                    }
                    network.firewall = Some(firewall);
                }
                other => {
                    return Err(CompileError::validation(format!(
                        "unknown network field `{other}`"
                    )));
                }
            }
        }

        Ok(network)
    }
}

/// The agent sandbox runtime selection.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum AgentSandbox {
    #[default]
    None,
    /// The agentic workflow firewall wrapper.
    Awf,
    /// A host-level sandbox runtime.
    SandboxRuntime,
}

/// The `sandbox:` block.
#[derive(Clone, Debug, Default)]
pub struct SandboxConfig {
    pub agent: AgentSandbox,
}

impl SandboxConfig {
    fn parse(value: &Value) -> Result<Self, CompileError> {
        let agent = match value {
            Value::String(kind) => kind.as_str(),
            Value::Mapping(map) => map
                .get("agent")
                .and_then(Value::as_str)
                .unwrap_or_default(),
            _ => {
                return Err(CompileError::validation(
                    "`sandbox:` must be a string or a mapping",
                ));
            }
        };

        let agent = match agent {
            "" => AgentSandbox::None,
            "awf" => AgentSandbox::Awf,
            "sandbox-runtime" => AgentSandbox::SandboxRuntime,
            other => {
                return Err(CompileError::validation(format!(
                    "unknown sandbox runtime `{other}` (expected `awf` or `sandbox-runtime`)"
                )));
            }
        };

        Ok(Self { agent })
    }
}

/// Who may trigger the workflow.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Roles {
    /// Admin, maintainer, and write-access members (the default check).
    #[default]
    Default,
    /// Anyone; disables the membership check.
    All,
    /// An explicit role list.
    List(Vec<String>),
}

impl Roles {
    fn parse(value: &Value) -> Result<Self, CompileError> {
        match value {
            Value::String(s) if s == "all" => Ok(Roles::All),
            Value::String(s) => Ok(Roles::List(vec![s.clone()])),
            Value::Sequence(_) => Ok(Roles::List(string_list(value, "roles")?)),
            _ => Err(CompileError::validation(
                "`roles:` must be `all`, a role name, or a list of roles",
            )),
        }
    }

    pub fn requires_check(&self) -> bool {
        !matches!(self, Roles::All)
    }
}

/// Frontmatter feature flags the compiler recognizes.
const KNOWN_FEATURES: &[&str] = &["action-tag", "dangerous-permissions-write"];

/// The fully-parsed, normalized workflow model.
#[derive(Clone, Debug, Default)]
pub struct WorkflowData {
    pub name: String,
    pub description: Option<String>,
    /// Upstream slug this workflow was installed from, if any.
    pub source: Option<String>,
    pub tracker_id: String,
    /// The sanitized workflow id (derived from the file stem).
    pub workflow_id: String,
    pub on: Triggers,
    /// Slash command names that gate activation.
    pub command: Vec<String>,
    pub roles: Roles,
    pub permissions: Option<PermissionSet>,
    pub engine: EngineConfig,
    pub tools: Tools,
    pub mcp_servers: IndexMap<String, Value>,
    pub network: NetworkPermissions,
    pub sandbox: SandboxConfig,
    pub safe_outputs: Option<SafeOutputs>,
    /// User-authored custom jobs, preserved as opaque maps.
    pub jobs: IndexMap<String, Mapping>,
    pub plugins: Vec<String>,
    pub steps: Vec<Value>,
    pub runs_on: Option<Value>,
    pub concurrency: Option<Value>,
    pub env: IndexMap<String, String>,
    pub timeout_minutes: Option<u64>,
    /// Absolute stop time, already resolved from relative forms.
    pub stop_after: Option<String>,
    pub strict: bool,
    pub features: IndexMap<String, Value>,
    pub github_token: Option<String>,
}

impl WorkflowData {
    /// Builds the model from the parsed frontmatter mapping. `stem` is
    /// the input file stem; `now` anchors relative `stop-after:` forms.
    pub fn parse(stem: &str, mapping: &Mapping, now: DateTime<Utc>) -> Result<Self, CompileError> {
        let workflow_id = sanitize_workflow_id(stem);

        let mut data = Self {
            name: stem.to_string(),
            tracker_id: workflow_id.clone(),
            workflow_id,
            ..Self::default()
        };

        for (key, value) in mapping {
            let key = key.as_str().unwrap_or_default();
            match key {
                "name" => {
                    data.name = value
                        .as_str()
                        .map(str::to_string)
                        .ok_or_else(|| CompileError::validation("`name:` must be a string"))?;
                }
                "description" => data.description = value.as_str().map(str::to_string),
                "source" => data.source = value.as_str().map(str::to_string),
                "tracker-id" => {
                    if let Some(id) = value.as_str() {
                        data.tracker_id = id.to_string();
                    }
                }
                "on" => data.on = Triggers::parse(value)?,
                "command" => data.command = command_list(value)?,
                "roles" => data.roles = Roles::parse(value)?,
                "permissions" => data.permissions = Some(PermissionSet::parse(value)?),
                "engine" => data.engine = EngineConfig::parse(value)?,
                "tools" => data.tools = Tools::parse(value)?,
                "mcp-servers" => {
                    let Value::Mapping(map) = value else {
                        return Err(CompileError::validation("`mcp-servers:` must be a mapping"));
                    };
                    for (name, config) in map {
                        let Some(name) = name.as_str() else {
                            return Err(CompileError::validation(
                                "MCP server names must be strings",
                            ));
                        };
                        data.mcp_servers.insert(name.to_string(), config.clone());
                    }
                }
                "network" => data.network = NetworkPermissions::parse(value)?,
                "sandbox" => data.sandbox = SandboxConfig::parse(value)?,
                "safe-outputs" => data.safe_outputs = Some(SafeOutputs::parse(value)?),
                "cache-memory" => data.tools.cache_memory = CacheMemoryConfig::parse(value)?,
                "repo-memory" => {
                    // Accepted and currently mapped onto cache-memory with
                    // repo scope.
                    if !matches!(value, Value::Bool(false)) {
                        data.tools.cache_memory = Some(CacheMemoryConfig {
                            key: None,
                            scope: CacheScope::Repo,
                        });
                    }
                }
                "jobs" => {
                    let Value::Mapping(map) = value else {
                        return Err(CompileError::validation("`jobs:` must be a mapping"));
                    };
                    for (name, job) in map {
                        let Some(name) = name.as_str() else {
                            return Err(CompileError::validation("job names must be strings"));
                        };
                        let Value::Mapping(job) = job else {
                            return Err(CompileError::validation(format!(
                                "job `{name}` must be a mapping"
                            )));
                        };
                        data.jobs.insert(name.to_string(), job.clone());
                    }
                }
                "plugins" => data.plugins = string_list(value, "plugins")?,
                "steps" => {
                    let Value::Sequence(seq) = value else {
                        return Err(CompileError::validation("`steps:` must be a list"));
                    };
                    data.steps = seq.clone();
                }
                "runs-on" => data.runs_on = Some(value.clone()),
                "concurrency" => data.concurrency = Some(value.clone()),
                "env" => {
                    let Value::Mapping(map) = value else {
                        return Err(CompileError::validation("`env:` must be a mapping"));
                    };
                    for (name, value) in map {
                        let (Some(name), Some(value)) = (name.as_str(), scalar_to_string(value))
                        else {
                            return Err(CompileError::validation(
                                "`env:` entries must be string-valued",
                            ));
                        };
                        data.env.insert(name.to_string(), value);
                    }
                }
                "timeout-minutes" => {
                    data.timeout_minutes = value.as_u64();
                    if data.timeout_minutes.is_none() {
                        return Err(CompileError::validation(
                            "`timeout-minutes:` must be a positive integer",
                        ));
                    }
                }
                "stop-after" => {
                    let raw = scalar_to_string(value).ok_or_else(|| {
                        CompileError::validation("`stop-after:` must be a string")
                    })?;
                    data.stop_after = Some(resolve_stop_after(&raw, now)?);
                }
                "strict" => data.strict = value.as_bool().unwrap_or(false),
                "features" => {
                    let Value::Mapping(map) = value else {
                        return Err(CompileError::validation("`features:` must be a mapping"));
                    };
                    for (name, value) in map {
                        let Some(name) = name.as_str() else {
                            continue;
                        };
                        if !KNOWN_FEATURES.contains(&name) {
                            tracing::warn!("unrecognized feature `{name}` ignored");
                            continue;
                        }
                        data.features.insert(name.to_string(), value.clone());
                    }
                }
                "github-token" => {
                    data.github_token = value.as_str().map(str::to_string);
                }
                "imports" => {
                    // Import resolution happens before compilation; an
                    // unresolved imports key left in the frontmatter is
                    // not an error, just inert.
                    tracing::debug!("`imports:` present; entries assumed already resolved");
                }
                _ => {
                    // Unknown keys were rejected by frontmatter::validate_keys.
                }
            }
        }

        Ok(data)
    }

    /// Whether the synthesized graph needs a `pre_activation` job.
    pub fn needs_pre_activation(&self) -> bool {
        self.roles.requires_check() || self.stop_after.is_some() || !self.command.is_empty()
    }

    /// The `action-tag` feature value, if declared.
    pub fn action_tag_feature(&self) -> Option<&str> {
        self.features.get("action-tag").and_then(Value::as_str)
    }

    /// Whether threat detection is enabled.
    pub fn threat_detection(&self) -> bool {
        self.safe_outputs
            .as_ref()
            .is_some_and(|outputs| outputs.threat_detection.enabled)
    }
}

fn string_list(value: &Value, field: &str) -> Result<Vec<String>, CompileError> {
    match value {
        Value::Sequence(seq) => seq
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    CompileError::validation(format!("`{field}` entries must be strings"))
                })
            })
            .collect(),
        Value::String(s) => Ok(vec![s.clone()]),
        _ => Err(CompileError::validation(format!(
            "`{field}` must be a string or a list of strings"
        ))),
    }
}

fn command_list(value: &Value) -> Result<Vec<String>, CompileError> {
    let commands = string_list(value, "command")?;
    for command in &commands {
        if command.starts_with('/') {
            return Err(CompileError::validation(format!(
                "command `{command}` must be written without the leading slash"
            )));
        }
    }
    Ok(commands)
}

/// Resolves a `stop-after:` value to an absolute `YYYY-MM-DD HH:MM:SS`
/// UTC timestamp. Relative forms (`+25h`, `+3d`) resolve against the
/// compile clock.
fn resolve_stop_after(raw: &str, now: DateTime<Utc>) -> Result<String, CompileError> {
    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    if let Some(relative) = raw.strip_prefix('+') {
        let split = relative.len().saturating_sub(1);
        let (amount, unit) = relative.split_at(split);
        let amount: i64 = amount.parse().map_err(|_| {
            CompileError::validation(format!("invalid relative stop-after `{raw}`"))
        })?;

        let duration = match unit {
            "m" => Duration::minutes(amount),
            "h" => Duration::hours(amount),
            "d" => Duration::days(amount),
            "w" => Duration::weeks(amount),
            _ => {
                return Err(CompileError::validation(format!(
                    "invalid stop-after unit in `{raw}` (expected m, h, d, or w)"
                )));
            }
        };

        return Ok((now + duration).format(FORMAT).to_string());
    }

    if let Ok(absolute) = DateTime::parse_from_rfc3339(raw) {
        return Ok(absolute.with_timezone(&Utc).format(FORMAT).to_string());
    }
    if let Ok(absolute) = NaiveDateTime::parse_from_str(raw, FORMAT) {
        return Ok(absolute.format(FORMAT).to_string());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(|| {
            CompileError::validation(format!("invalid stop-after date `{raw}`"))
        })?;
        return Ok(midnight.format(FORMAT).to_string());
    }

    Err(CompileError::validation(format!(
        "invalid stop-after timestamp `{raw}` (expected +<duration> or an absolute time)"
    )))
}
