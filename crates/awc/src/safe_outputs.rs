//! Typed configuration for the safe-outputs subsystem.
//!
//! A safe output is a structured request the agent emits through a
//! dedicated MCP server; a downstream job with narrowly scoped
//! permissions validates and executes it. Each variant has a typed
//! config; parsing follows three field modes (key-existence,
//! bool-value, templatable-bool), made first-class in [`FieldMode`].

use std::collections::BTreeMap;

use serde_yaml::{Mapping, Value};

use crate::error::CompileError;
use crate::permissions::{Level, PermissionSet};
use crate::utils::{closest_match, scalar_to_string};

/// Every safe-output variant the compiler understands.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SafeOutputKind {
    CreateIssue,
    UpdateIssue,
    CloseIssue,
    CreatePullRequest,
    UpdatePullRequest,
    ClosePullRequest,
    PushToPullRequestBranch,
    CreatePullRequestReviewComment,
    SubmitPullRequestReview,
    ResolvePullRequestReviewThread,
    CreateDiscussion,
    UpdateDiscussion,
    CloseDiscussion,
    AddComment,
    HideComment,
    AddLabels,
    RemoveLabels,
    AddReviewer,
    AssignMilestone,
    AssignToUser,
    UnassignFromUser,
    AssignToAgent,
    CreateCodeScanningAlert,
    AutofixCodeScanningAlert,
    CreateProject,
    UpdateProject,
    UploadAsset,
    DispatchWorkflow,
    LinkSubIssue,
    CreateAgentSession,
    MissingTool,
    MissingData,
}

impl SafeOutputKind {
    pub const ALL: &[SafeOutputKind] = &[
        SafeOutputKind::CreateIssue,
        SafeOutputKind::UpdateIssue,
        SafeOutputKind::CloseIssue,
        SafeOutputKind::CreatePullRequest,
        SafeOutputKind::UpdatePullRequest,
        SafeOutputKind::ClosePullRequest,
        SafeOutputKind::PushToPullRequestBranch,
        SafeOutputKind::CreatePullRequestReviewComment,
        SafeOutputKind::SubmitPullRequestReview,
        SafeOutputKind::ResolvePullRequestReviewThread,
        SafeOutputKind::CreateDiscussion,
        SafeOutputKind::UpdateDiscussion,
        SafeOutputKind::CloseDiscussion,
        SafeOutputKind::AddComment,
        SafeOutputKind::HideComment,
        SafeOutputKind::AddLabels,
        SafeOutputKind::RemoveLabels,
        SafeOutputKind::AddReviewer,
        SafeOutputKind::AssignMilestone,
        SafeOutputKind::AssignToUser,
        SafeOutputKind::UnassignFromUser,
        SafeOutputKind::AssignToAgent,
        SafeOutputKind::CreateCodeScanningAlert,
        SafeOutputKind::AutofixCodeScanningAlert,
        SafeOutputKind::CreateProject,
        SafeOutputKind::UpdateProject,
        SafeOutputKind::UploadAsset,
        SafeOutputKind::DispatchWorkflow,
        SafeOutputKind::LinkSubIssue,
        SafeOutputKind::CreateAgentSession,
        SafeOutputKind::MissingTool,
        SafeOutputKind::MissingData,
    ];

    /// The kebab-case frontmatter key for this variant.
    pub fn key(self) -> &'static str {
        match self {
            SafeOutputKind::CreateIssue => "create-issue",
            SafeOutputKind::UpdateIssue => "update-issue",
            SafeOutputKind::CloseIssue => "close-issue",
            SafeOutputKind::CreatePullRequest => "create-pull-request",
            SafeOutputKind::UpdatePullRequest => "update-pull-request",
            SafeOutputKind::ClosePullRequest => "close-pull-request",
            SafeOutputKind::PushToPullRequestBranch => "push-to-pull-request-branch",
            SafeOutputKind::CreatePullRequestReviewComment => "create-pull-request-review-comment",
            SafeOutputKind::SubmitPullRequestReview => "submit-pull-request-review",
            SafeOutputKind::ResolvePullRequestReviewThread => "resolve-pull-request-review-thread",
            SafeOutputKind::CreateDiscussion => "create-discussion",
            SafeOutputKind::UpdateDiscussion => "update-discussion",
            SafeOutputKind::CloseDiscussion => "close-discussion",
            SafeOutputKind::AddComment => "add-comment",
            SafeOutputKind::HideComment => "hide-comment",
            SafeOutputKind::AddLabels => "add-labels",
            SafeOutputKind::RemoveLabels => "remove-labels",
            SafeOutputKind::AddReviewer => "add-reviewer",
            SafeOutputKind::AssignMilestone => "assign-milestone",
            SafeOutputKind::AssignToUser => "assign-to-user",
            SafeOutputKind::UnassignFromUser => "unassign-from-user",
            SafeOutputKind::AssignToAgent => "assign-to-agent",
            SafeOutputKind::CreateCodeScanningAlert => "create-code-scanning-alert",
            SafeOutputKind::AutofixCodeScanningAlert => "autofix-code-scanning-alert",
            SafeOutputKind::CreateProject => "create-project",
            SafeOutputKind::UpdateProject => "update-project",
            SafeOutputKind::UploadAsset => "upload-asset",
            SafeOutputKind::DispatchWorkflow => "dispatch-workflow",
            SafeOutputKind::LinkSubIssue => "link-sub-issue",
            SafeOutputKind::CreateAgentSession => "create-agent-session",
            SafeOutputKind::MissingTool => "missing-tool",
            SafeOutputKind::MissingData => "missing-data",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.key() == key)
    }

    /// The synthesized job name for this variant.
    pub fn job_name(self) -> String {
        self.key().replace('-', "_")
    }

    /// Default `max` (requests per run) when the config leaves it unset.
    pub fn default_max(self) -> u64 {
        match self {
            SafeOutputKind::AddComment => 3,
            SafeOutputKind::HideComment => 5,
            SafeOutputKind::AddLabels | SafeOutputKind::RemoveLabels => 5,
            SafeOutputKind::ResolvePullRequestReviewThread => 10,
            SafeOutputKind::UploadAsset => 10,
            SafeOutputKind::LinkSubIssue => 5,
            SafeOutputKind::MissingTool | SafeOutputKind::MissingData => 20,
            _ => 1,
        }
    }

    /// Whether `target-repo: "*"` is accepted for this variant.
    ///
    /// Creation-style outputs are always bound to a concrete repository;
    /// mutation of existing objects may be fanned out.
    pub fn allows_wildcard_target_repo(self) -> bool {
        !matches!(
            self,
            SafeOutputKind::CreateIssue
                | SafeOutputKind::CreatePullRequest
                | SafeOutputKind::PushToPullRequestBranch
                | SafeOutputKind::CreateDiscussion
                | SafeOutputKind::CreateCodeScanningAlert
                | SafeOutputKind::AutofixCodeScanningAlert
                | SafeOutputKind::CreateProject
                | SafeOutputKind::UpdateProject
                | SafeOutputKind::UploadAsset
                | SafeOutputKind::DispatchWorkflow
                | SafeOutputKind::CreateAgentSession
                | SafeOutputKind::AssignToAgent
                | SafeOutputKind::MissingTool
                | SafeOutputKind::MissingData
        )
    }

    /// The minimum permissions the executing job needs. Every variant
    /// that touches the repository gets `contents: read` as a base.
    pub fn permissions(self) -> PermissionSet {
        use Level::{Read, Write};

        match self {
            SafeOutputKind::CreateIssue
            | SafeOutputKind::UpdateIssue
            | SafeOutputKind::CloseIssue
            | SafeOutputKind::AssignMilestone
            | SafeOutputKind::AssignToUser
            | SafeOutputKind::UnassignFromUser
            | SafeOutputKind::LinkSubIssue => {
                PermissionSet::of(&[("contents", Read), ("issues", Write)])
            }
            SafeOutputKind::CreatePullRequest => PermissionSet::of(&[
                ("contents", Write),
                ("pull-requests", Write),
            ]),
            SafeOutputKind::UpdatePullRequest
            | SafeOutputKind::ClosePullRequest
            | SafeOutputKind::CreatePullRequestReviewComment
            | SafeOutputKind::SubmitPullRequestReview
            | SafeOutputKind::ResolvePullRequestReviewThread
            | SafeOutputKind::AddReviewer => {
                PermissionSet::of(&[("contents", Read), ("pull-requests", Write)])
            }
            SafeOutputKind::PushToPullRequestBranch => {
                PermissionSet::of(&[("contents", Write)])
            }
            SafeOutputKind::CreateDiscussion
            | SafeOutputKind::UpdateDiscussion
            | SafeOutputKind::CloseDiscussion => {
                PermissionSet::of(&[("contents", Read), ("discussions", Write)])
            }
            SafeOutputKind::AddComment | SafeOutputKind::HideComment => PermissionSet::of(&[
                ("contents", Read),
                ("issues", Write),
                ("pull-requests", Write),
                ("discussions", Write),
            ]),
            SafeOutputKind::AddLabels | SafeOutputKind::RemoveLabels => PermissionSet::of(&[
                ("contents", Read),
                ("issues", Write),
                ("pull-requests", Write),
            ]),
            SafeOutputKind::AssignToAgent => PermissionSet::of(&[
                ("contents", Read),
                ("issues", Write),
                ("pull-requests", Write),
            ]),
            SafeOutputKind::CreateCodeScanningAlert => {
                PermissionSet::of(&[("contents", Read), ("security-events", Write)])
            }
            SafeOutputKind::AutofixCodeScanningAlert => PermissionSet::of(&[
                ("contents", Write),
                ("security-events", Write),
            ]),
            SafeOutputKind::CreateProject | SafeOutputKind::UpdateProject => {
                PermissionSet::of(&[("contents", Read), ("organization-projects", Write)])
            }
            SafeOutputKind::UploadAsset => PermissionSet::of(&[("contents", Write)]),
            SafeOutputKind::DispatchWorkflow => {
                PermissionSet::of(&[("contents", Read), ("actions", Write)])
            }
            SafeOutputKind::CreateAgentSession
            | SafeOutputKind::MissingTool
            | SafeOutputKind::MissingData => PermissionSet::new(),
        }
    }
}

/// How a config field's YAML value maps onto its stored form.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FieldMode {
    /// The key's presence (regardless of value) enables the field.
    KeyExistence,
    /// A literal boolean controls the field; `null` means `true`.
    BoolValue,
    /// A literal boolean or a `${{ … }}` expression string; stored as a
    /// string either way.
    TemplatableBool,
}

/// The parsed value of a flag-style field.
#[derive(Clone, Debug, PartialEq)]
pub enum FlagValue {
    Bool(bool),
    /// A `${{ … }}` expression, resolved at workflow runtime.
    Template(String),
}

impl FlagValue {
    /// The string form stored in handler configs.
    pub fn as_config_str(&self) -> String {
        match self {
            FlagValue::Bool(b) => b.to_string(),
            FlagValue::Template(t) => t.clone(),
        }
    }
}

/// Parses `map[key]` under the given mode. Returns `None` when the key
/// is absent.
pub fn parse_flag(
    map: &Mapping,
    key: &str,
    mode: FieldMode,
) -> Result<Option<FlagValue>, CompileError> {
    let Some(value) = map.get(key) else {
        return Ok(None);
    };

    match mode {
        FieldMode::KeyExistence => Ok(Some(FlagValue::Bool(true))),
        FieldMode::BoolValue => match value {
            Value::Bool(b) => Ok(Some(FlagValue::Bool(*b))),
            // Null kept as true for backward compatibility with the
            // key-existence form.
            Value::Null => Ok(Some(FlagValue::Bool(true))),
            _ => Err(CompileError::validation(format!(
                "`{key}` must be a boolean"
            ))),
        },
        FieldMode::TemplatableBool => match value {
            Value::Bool(b) => Ok(Some(FlagValue::Bool(*b))),
            Value::Null => Ok(Some(FlagValue::Bool(true))),
            Value::String(s) if s.trim_start().starts_with("${{") => {
                Ok(Some(FlagValue::Template(s.clone())))
            }
            _ => Err(CompileError::validation(format!(
                "`{key}` must be a boolean or a ${{{{ … }}}} expression"
            ))),
        },
    }
}

/// Validates that a configured GitHub token is a secrets expression
/// (optionally with `||` fallbacks), never a plaintext token.
pub fn validate_github_token(expr: &str) -> Result<(), CompileError> {
    let trimmed = expr.trim();

    let inner = trimmed
        .strip_prefix("${{")
        .and_then(|rest| rest.strip_suffix("}}"))
        .ok_or_else(|| {
            CompileError::validation(
                "github-token must be a ${{ secrets.* }} expression, not a plaintext value",
            )
        })?;

    for alternative in inner.split("||") {
        let alternative = alternative.trim();
        if !(alternative.starts_with("secrets.") || alternative == "github.token") {
            return Err(CompileError::validation(format!(
                "github-token fallback `{alternative}` is not a secrets reference"
            )));
        }
    }

    Ok(())
}

/// Fields shared by every safe-output config.
#[derive(Clone, Debug, PartialEq)]
pub struct BaseSafeOutputConfig {
    /// Maximum number of requests of this kind per run.
    pub max: u64,
    /// Per-variant token override (validated secrets expression).
    pub github_token: Option<String>,
}

/// Targeting fields shared by most variants.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TargetConfig {
    /// `"triggering"` (default), `"*"`, or an explicit object number.
    pub target: Option<String>,
    /// `"owner/repo"`, or `"*"` where the variant documents it.
    pub target_repo: Option<String>,
    /// Repositories a wildcard target may fan out to.
    pub allowed_repos: Vec<String>,
}

/// Filtering fields for comment/label/update variants.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterConfig {
    pub required_labels: Vec<String>,
    pub required_title_prefix: Option<String>,
    /// Discussions only.
    pub required_category: Option<String>,
}

/// The config shape for variants with no distinctive fields.
#[derive(Clone, Debug, PartialEq)]
pub struct BasicConfig {
    pub base: BaseSafeOutputConfig,
    pub target: TargetConfig,
    pub filter: FilterConfig,
}

/// `create-issue` configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct CreateIssueConfig {
    pub base: BaseSafeOutputConfig,
    pub target: TargetConfig,
    pub title_prefix: Option<String>,
    pub labels: Vec<String>,
    pub allowed_labels: Vec<String>,
    pub assignees: Vec<String>,
    pub close_older_issues: bool,
    pub expires: Option<String>,
    pub group: bool,
    pub footer: Option<String>,
}

/// `update-issue` configuration. The three update flags use bool-value
/// mode: `title: null` keeps the old key-existence behavior (enabled),
/// `title: false` disables.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateIssueConfig {
    pub base: BaseSafeOutputConfig,
    pub target: TargetConfig,
    pub filter: FilterConfig,
    pub can_update_title: bool,
    pub can_update_body: bool,
    pub can_update_status: bool,
}

/// `create-pull-request` configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct CreatePullRequestConfig {
    pub base: BaseSafeOutputConfig,
    pub target: TargetConfig,
    pub title_prefix: Option<String>,
    pub labels: Vec<String>,
    /// Templatable: `true`, `false`, or a `${{ … }}` expression.
    pub draft: Option<FlagValue>,
    /// Open an issue instead when PR creation is not possible.
    pub fallback_as_issue: bool,
    pub base_branch: Option<String>,
}

/// `create-discussion` configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct CreateDiscussionConfig {
    pub base: BaseSafeOutputConfig,
    pub target: TargetConfig,
    pub title_prefix: Option<String>,
    pub category: Option<String>,
}

/// `add-labels` / `remove-labels` configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelsConfig {
    pub base: BaseSafeOutputConfig,
    pub target: TargetConfig,
    pub filter: FilterConfig,
    /// The labels the agent may apply or remove; empty means any.
    pub allowed: Vec<String>,
}

/// `create-code-scanning-alert` configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct CodeScanningAlertConfig {
    pub base: BaseSafeOutputConfig,
    /// SARIF driver name recorded in uploaded reports.
    pub driver: Option<String>,
}

/// `upload-asset` configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct UploadAssetConfig {
    pub base: BaseSafeOutputConfig,
    pub allowed_exts: Vec<String>,
    pub max_size_kb: Option<u64>,
}

/// `dispatch-workflow` configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct DispatchWorkflowConfig {
    pub base: BaseSafeOutputConfig,
    /// Workflow file names the agent may dispatch.
    pub workflows: Vec<String>,
}

/// `assign-to-agent` configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct AssignToAgentConfig {
    pub base: BaseSafeOutputConfig,
    pub target: TargetConfig,
    /// The agent to assign; defaults to the workflow's own engine.
    pub agent: Option<String>,
}

/// Threat-detection configuration (`safe-outputs.threat-detection`).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ThreatDetectionConfig {
    pub enabled: bool,
    pub prompt: Option<String>,
    /// Extra steps appended to the detection job.
    pub steps: Vec<Value>,
}

impl ThreatDetectionConfig {
    fn parse(value: &Value) -> Result<Self, CompileError> {
        match value {
            Value::Bool(enabled) => Ok(Self {
                enabled: *enabled,
                ..Self::default()
            }),
            Value::Null => Ok(Self {
                enabled: true,
                ..Self::default()
            }),
            Value::Mapping(map) => {
                let mut config = Self {
                    enabled: true,
                    ..Self::default()
                };
                for (key, value) in map {
                    match key.as_str().unwrap_or_default() {
                        "enabled" => config.enabled = value.as_bool().unwrap_or(true),
                        "prompt" => config.prompt = value.as_str().map(str::to_string),
                        "steps" => {
                            if let Value::Sequence(steps) = value {
                                config.steps = steps.clone();
                            }
                        }
                        other => {
                            return Err(CompileError::validation(format!(
                                "unknown threat-detection field `{other}`"
                            )));
                        }
                    }
                }
                Ok(config)
            }
            _ => Err(CompileError::validation(
                "`threat-detection` must be a boolean or a mapping",
            )),
        }
    }
}

/// The full `safe-outputs:` block.
#[derive(Clone, Debug, Default)]
pub struct SafeOutputs {
    pub create_issue: Option<CreateIssueConfig>,
    pub update_issue: Option<UpdateIssueConfig>,
    pub close_issue: Option<BasicConfig>,
    pub create_pull_request: Option<CreatePullRequestConfig>,
    pub update_pull_request: Option<BasicConfig>,
    pub close_pull_request: Option<BasicConfig>,
    pub push_to_pull_request_branch: Option<BasicConfig>,
    pub create_pull_request_review_comment: Option<BasicConfig>,
    pub submit_pull_request_review: Option<BasicConfig>,
    pub resolve_pull_request_review_thread: Option<BasicConfig>,
    pub create_discussion: Option<CreateDiscussionConfig>,
    pub update_discussion: Option<BasicConfig>,
    pub close_discussion: Option<BasicConfig>,
    pub add_comment: Option<BasicConfig>,
    pub hide_comment: Option<BasicConfig>,
    pub add_labels: Option<LabelsConfig>,
    pub remove_labels: Option<LabelsConfig>,
    pub add_reviewer: Option<BasicConfig>,
    pub assign_milestone: Option<BasicConfig>,
    pub assign_to_user: Option<BasicConfig>,
    pub unassign_from_user: Option<BasicConfig>,
    pub assign_to_agent: Option<AssignToAgentConfig>,
    pub create_code_scanning_alert: Option<CodeScanningAlertConfig>,
    pub autofix_code_scanning_alert: Option<BasicConfig>,
    pub create_project: Option<BasicConfig>,
    pub update_project: Option<BasicConfig>,
    pub upload_asset: Option<UploadAssetConfig>,
    pub dispatch_workflow: Option<DispatchWorkflowConfig>,
    pub link_sub_issue: Option<BasicConfig>,
    pub create_agent_session: Option<BasicConfig>,
    pub missing_tool: Option<BasicConfig>,
    pub missing_data: Option<BasicConfig>,

    pub threat_detection: ThreatDetectionConfig,
    /// Collect requests as artifacts without executing them.
    pub staged: bool,
    /// Block-level token default, inherited by variants without one.
    pub github_token: Option<String>,
    /// Custom user-facing messages, passed through to handlers.
    pub messages: Option<Mapping>,
}

impl SafeOutputs {
    pub fn parse(value: &Value) -> Result<Self, CompileError> {
        let Value::Mapping(map) = value else {
            return Err(CompileError::validation("`safe-outputs:` must be a mapping"));
        };

        let mut outputs = Self::default();
        let mut missing_tool_disabled = false;
        let mut missing_data_disabled = false;

        for (key, value) in map {
            let key = key.as_str().unwrap_or_default();

            match key {
                "threat-detection" => {
                    outputs.threat_detection = ThreatDetectionConfig::parse(value)?;
                    continue;
                }
                "staged" => {
                    outputs.staged = value.as_bool().unwrap_or(false);
                    continue;
                }
                "github-token" => {
                    let token = value.as_str().ok_or_else(|| {
                        CompileError::validation("`github-token` must be a string")
                    })?;
                    validate_github_token(token)?;
                    outputs.github_token = Some(token.to_string());
                    continue;
                }
                "messages" => {
                    if let Value::Mapping(messages) = value {
                        outputs.messages = Some(messages.clone());
                    }
                    continue;
                }
                _ => {}
            }

            let Some(kind) = SafeOutputKind::from_key(key) else {
                let mut message = format!("unknown safe-output type `{key}`");
                let candidates = SafeOutputKind::ALL.iter().map(|kind| kind.key());
                if let Some(suggestion) = closest_match(key, candidates, 2) {
                    message.push_str(&format!(", did you mean: {suggestion}"));
                }
                return Err(CompileError::Validation(message));
            };

            // `<kind>: false` explicitly disables a variant (relevant for
            // the auto-enabled fallbacks).
            if matches!(value, Value::Bool(false)) {
                match kind {
                    SafeOutputKind::MissingTool => missing_tool_disabled = true,
                    SafeOutputKind::MissingData => missing_data_disabled = true,
                    _ => {}
                }
                continue;
            }

            let config = match value {
                Value::Null | Value::Bool(true) => Mapping::new(),
                Value::Mapping(map) => map.clone(),
                _ => {
                    return Err(CompileError::validation(format!(
                        "`{key}` must be null, a boolean, or a mapping"
                    )));
                }
            };

            outputs.set_variant(kind, &config)?;
        }

        // The reporting fallbacks are auto-enabled whenever a
        // safe-outputs block exists at all.
        if outputs.missing_tool.is_none() && !missing_tool_disabled {
            outputs.missing_tool = Some(basic_config(SafeOutputKind::MissingTool, &Mapping::new())?);
        }
        if outputs.missing_data.is_none() && !missing_data_disabled {
            outputs.missing_data = Some(basic_config(SafeOutputKind::MissingData, &Mapping::new())?);
        }

        Ok(outputs)
    }

    fn set_variant(&mut self, kind: SafeOutputKind, config: &Mapping) -> Result<(), CompileError> {
        match kind {
            SafeOutputKind::CreateIssue => {
                self.create_issue = Some(parse_create_issue(config)?);
            }
            SafeOutputKind::UpdateIssue => {
                self.update_issue = Some(parse_update_issue(config)?);
            }
            SafeOutputKind::CloseIssue => self.close_issue = Some(basic_config(kind, config)?),
            SafeOutputKind::CreatePullRequest => {
                self.create_pull_request = Some(parse_create_pull_request(config)?);
            }
            SafeOutputKind::UpdatePullRequest => {
                self.update_pull_request = Some(basic_config(kind, config)?);
            }
            SafeOutputKind::ClosePullRequest => {
                self.close_pull_request = Some(basic_config(kind, config)?);
            }
            SafeOutputKind::PushToPullRequestBranch => {
                self.push_to_pull_request_branch = Some(basic_config(kind, config)?);
            }
            SafeOutputKind::CreatePullRequestReviewComment => {
                self.create_pull_request_review_comment = Some(basic_config(kind, config)?);
            }
            SafeOutputKind::SubmitPullRequestReview => {
                self.submit_pull_request_review = Some(basic_config(kind, config)?);
            }
            SafeOutputKind::ResolvePullRequestReviewThread => {
                self.resolve_pull_request_review_thread = Some(basic_config(kind, config)?);
            }
            SafeOutputKind::CreateDiscussion => {
                self.create_discussion = Some(parse_create_discussion(config)?);
            }
            SafeOutputKind::UpdateDiscussion => {
                self.update_discussion = Some(basic_config(kind, config)?);
            }
            SafeOutputKind::CloseDiscussion => {
                self.close_discussion = Some(basic_config(kind, config)?);
            }
            SafeOutputKind::AddComment => self.add_comment = Some(basic_config(kind, config)?),
            SafeOutputKind::HideComment => self.hide_comment = Some(basic_config(kind, config)?),
            SafeOutputKind::AddLabels => self.add_labels = Some(parse_labels(kind, config)?),
            SafeOutputKind::RemoveLabels => self.remove_labels = Some(parse_labels(kind, config)?),
            SafeOutputKind::AddReviewer => self.add_reviewer = Some(basic_config(kind, config)?),
            SafeOutputKind::AssignMilestone => {
                self.assign_milestone = Some(basic_config(kind, config)?);
            }
            SafeOutputKind::AssignToUser => {
                self.assign_to_user = Some(basic_config(kind, config)?);
            }
            SafeOutputKind::UnassignFromUser => {
                self.unassign_from_user = Some(basic_config(kind, config)?);
            }
            SafeOutputKind::AssignToAgent => {
                self.assign_to_agent = Some(parse_assign_to_agent(config)?);
            }
            SafeOutputKind::CreateCodeScanningAlert => {
                self.create_code_scanning_alert = Some(parse_code_scanning_alert(config)?);
            }
            SafeOutputKind::AutofixCodeScanningAlert => {
                self.autofix_code_scanning_alert = Some(basic_config(kind, config)?);
            }
            SafeOutputKind::CreateProject => {
                self.create_project = Some(basic_config(kind, config)?);
            }
            SafeOutputKind::UpdateProject => {
                self.update_project = Some(basic_config(kind, config)?);
            }
            SafeOutputKind::UploadAsset => {
                self.upload_asset = Some(parse_upload_asset(config)?);
            }
            SafeOutputKind::DispatchWorkflow => {
                self.dispatch_workflow = Some(parse_dispatch_workflow(config)?);
            }
            SafeOutputKind::LinkSubIssue => {
                self.link_sub_issue = Some(basic_config(kind, config)?);
            }
            SafeOutputKind::CreateAgentSession => {
                self.create_agent_session = Some(basic_config(kind, config)?);
            }
            SafeOutputKind::MissingTool => {
                self.missing_tool = Some(basic_config(kind, config)?);
            }
            SafeOutputKind::MissingData => {
                self.missing_data = Some(basic_config(kind, config)?);
            }
        }

        Ok(())
    }

    /// Whether a given variant is enabled.
    pub fn is_enabled(&self, kind: SafeOutputKind) -> bool {
        match kind {
            SafeOutputKind::CreateIssue => self.create_issue.is_some(),
            SafeOutputKind::UpdateIssue => self.update_issue.is_some(),
            SafeOutputKind::CloseIssue => self.close_issue.is_some(),
            SafeOutputKind::CreatePullRequest => self.create_pull_request.is_some(),
            SafeOutputKind::UpdatePullRequest => self.update_pull_request.is_some(),
            SafeOutputKind::ClosePullRequest => self.close_pull_request.is_some(),
            SafeOutputKind::PushToPullRequestBranch => self.push_to_pull_request_branch.is_some(),
            SafeOutputKind::CreatePullRequestReviewComment => {
                self.create_pull_request_review_comment.is_some()
            }
            SafeOutputKind::SubmitPullRequestReview => self.submit_pull_request_review.is_some(),
            SafeOutputKind::ResolvePullRequestReviewThread => {
                self.resolve_pull_request_review_thread.is_some()
            }
            SafeOutputKind::CreateDiscussion => self.create_discussion.is_some(),
            SafeOutputKind::UpdateDiscussion => self.update_discussion.is_some(),
            SafeOutputKind::CloseDiscussion => self.close_discussion.is_some(),
            SafeOutputKind::AddComment => self.add_comment.is_some(),
            SafeOutputKind::HideComment => self.hide_comment.is_some(),
            SafeOutputKind::AddLabels => self.add_labels.is_some(),
            SafeOutputKind::RemoveLabels => self.remove_labels.is_some(),
            SafeOutputKind::AddReviewer => self.add_reviewer.is_some(),
            SafeOutputKind::AssignMilestone => self.assign_milestone.is_some(),
            SafeOutputKind::AssignToUser => self.assign_to_user.is_some(),
            SafeOutputKind::UnassignFromUser => self.unassign_from_user.is_some(),
            SafeOutputKind::AssignToAgent => self.assign_to_agent.is_some(),
            SafeOutputKind::CreateCodeScanningAlert => self.create_code_scanning_alert.is_some(),
            SafeOutputKind::AutofixCodeScanningAlert => {
                self.autofix_code_scanning_alert.is_some()
            }
            SafeOutputKind::CreateProject => self.create_project.is_some(),
            SafeOutputKind::UpdateProject => self.update_project.is_some(),
            SafeOutputKind::UploadAsset => self.upload_asset.is_some(),
            SafeOutputKind::DispatchWorkflow => self.dispatch_workflow.is_some(),
            SafeOutputKind::LinkSubIssue => self.link_sub_issue.is_some(),
            SafeOutputKind::CreateAgentSession => self.create_agent_session.is_some(),
            SafeOutputKind::MissingTool => self.missing_tool.is_some(),
            SafeOutputKind::MissingData => self.missing_data.is_some(),
        }
    }

    /// Every enabled variant, in canonical order.
    pub fn enabled_kinds(&self) -> Vec<SafeOutputKind> {
        SafeOutputKind::ALL
            .iter()
            .copied()
            .filter(|kind| self.is_enabled(*kind))
            .collect()
    }

    /// Enabled variants that synthesize an executing job. The reporting
    /// fallbacks are handled inside the consolidated handler and never
    /// get their own job.
    pub fn job_kinds(&self) -> Vec<SafeOutputKind> {
        self.enabled_kinds()
            .into_iter()
            .filter(|kind| {
                !matches!(
                    kind,
                    SafeOutputKind::MissingTool | SafeOutputKind::MissingData
                )
            })
            .collect()
    }

    /// The union of permissions required by every enabled variant.
    pub fn permissions(&self) -> PermissionSet {
        let mut set = PermissionSet::new();

        for kind in self.enabled_kinds() {
            set.union(&kind.permissions());
        }

        // A PR fallback issue needs issue write access too.
        if let Some(pr) = &self.create_pull_request {
            if pr.fallback_as_issue {
                set.grant("issues", Level::Write);
            }
        }

        set
    }

    /// The serialized handler configuration
    /// (`GH_AW_SAFE_OUTPUTS_HANDLER_CONFIG`), with alphabetical keys.
    pub fn handler_config_json(&self) -> serde_json::Value {
        let mut handlers = BTreeMap::new();

        for kind in self.enabled_kinds() {
            let mut entry = BTreeMap::new();
            entry.insert("max".to_string(), serde_json::json!(self.max_for(kind)));
            if let Some(target_repo) = self.target_repo_for(kind) {
                entry.insert(
                    "target-repo".to_string(),
                    serde_json::json!(target_repo),
                );
            }
            handlers.insert(kind.key().to_string(), serde_json::json!(entry));
        }

        serde_json::json!(handlers)
    }

    /// The effective `max` for a variant (configured or default).
    pub fn max_for(&self, kind: SafeOutputKind) -> u64 {
        self.base_for(kind)
            .map(|base| base.max)
            .unwrap_or_else(|| kind.default_max())
    }

    fn base_for(&self, kind: SafeOutputKind) -> Option<&BaseSafeOutputConfig> {
        match kind {
            SafeOutputKind::CreateIssue => self.create_issue.as_ref().map(|c| &c.base),
            SafeOutputKind::UpdateIssue => self.update_issue.as_ref().map(|c| &c.base),
            SafeOutputKind::CloseIssue => self.close_issue.as_ref().map(|c| &c.base),
            SafeOutputKind::CreatePullRequest => {
                self.create_pull_request.as_ref().map(|c| &c.base)
            }
            SafeOutputKind::UpdatePullRequest => {
                self.update_pull_request.as_ref().map(|c| &c.base)
            }
            SafeOutputKind::ClosePullRequest => self.close_pull_request.as_ref().map(|c| &c.base),
            SafeOutputKind::PushToPullRequestBranch => {
                self.push_to_pull_request_branch.as_ref().map(|c| &c.base)
            }
            SafeOutputKind::CreatePullRequestReviewComment => self
                .create_pull_request_review_comment
                .as_ref()
                .map(|c| &c.base),
            SafeOutputKind::SubmitPullRequestReview => {
                self.submit_pull_request_review.as_ref().map(|c| &c.base)
            }
            SafeOutputKind::ResolvePullRequestReviewThread => self
                .resolve_pull_request_review_thread
                .as_ref()
                .map(|c| &c.base),
            SafeOutputKind::CreateDiscussion => self.create_discussion.as_ref().map(|c| &c.base),
            SafeOutputKind::UpdateDiscussion => self.update_discussion.as_ref().map(|c| &c.base),
            SafeOutputKind::CloseDiscussion => self.close_discussion.as_ref().map(|c| &c.base),
            SafeOutputKind::AddComment => self.add_comment.as_ref().map(|c| &c.base),
            SafeOutputKind::HideComment => self.hide_comment.as_ref().map(|c| &c.base),
            SafeOutputKind::AddLabels => self.add_labels.as_ref().map(|c| &c.base),
            SafeOutputKind::RemoveLabels => self.remove_labels.as_ref().map(|c| &c.base),
            SafeOutputKind::AddReviewer => self.add_reviewer.as_ref().map(|c| &c.base),
            SafeOutputKind::AssignMilestone => self.assign_milestone.as_ref().map(|c| &c.base),
            SafeOutputKind::AssignToUser => self.assign_to_user.as_ref().map(|c| &c.base),
            SafeOutputKind::UnassignFromUser => self.unassign_from_user.as_ref().map(|c| &c.base),
            SafeOutputKind::AssignToAgent => self.assign_to_agent.as_ref().map(|c| &c.base),
            SafeOutputKind::CreateCodeScanningAlert => {
                self.create_code_scanning_alert.as_ref().map(|c| &c.base)
            }
            SafeOutputKind::AutofixCodeScanningAlert => {
                self.autofix_code_scanning_alert.as_ref().map(|c| &c.base)
            }
            SafeOutputKind::CreateProject => self.create_project.as_ref().map(|c| &c.base),
            SafeOutputKind::UpdateProject => self.update_project.as_ref().map(|c| &c.base),
            SafeOutputKind::UploadAsset => self.upload_asset.as_ref().map(|c| &c.base),
            SafeOutputKind::DispatchWorkflow => self.dispatch_workflow.as_ref().map(|c| &c.base),
            SafeOutputKind::LinkSubIssue => self.link_sub_issue.as_ref().map(|c| &c.base),
            SafeOutputKind::CreateAgentSession => {
                self.create_agent_session.as_ref().map(|c| &c.base)
            }
            SafeOutputKind::MissingTool => self.missing_tool.as_ref().map(|c| &c.base),
            SafeOutputKind::MissingData => self.missing_data.as_ref().map(|c| &c.base),
        }
    }

    fn target_repo_for(&self, kind: SafeOutputKind) -> Option<&str> {
        let target = match kind {
            SafeOutputKind::CreateIssue => self.create_issue.as_ref().map(|c| &c.target),
            SafeOutputKind::UpdateIssue => self.update_issue.as_ref().map(|c| &c.target),
            SafeOutputKind::CloseIssue => self.close_issue.as_ref().map(|c| &c.target),
            SafeOutputKind::AddComment => self.add_comment.as_ref().map(|c| &c.target),
            SafeOutputKind::AssignToUser => self.assign_to_user.as_ref().map(|c| &c.target),
            SafeOutputKind::UnassignFromUser => {
                self.unassign_from_user.as_ref().map(|c| &c.target)
            }
            _ => None,
        };

        target.and_then(|t| t.target_repo.as_deref())
    }
}

fn parse_base(kind: SafeOutputKind, map: &Mapping) -> Result<BaseSafeOutputConfig, CompileError> {
    let max = match map.get("max") {
        None | Some(Value::Null) => kind.default_max(),
        Some(value) => value.as_u64().ok_or_else(|| {
            CompileError::validation(format!(
                "`{key}.max` must be a positive integer",
                key = kind.key()
            ))
        })?,
    };

    let github_token = match map.get("github-token") {
        None | Some(Value::Null) => None,
        Some(value) => {
            let token = value.as_str().ok_or_else(|| {
                CompileError::validation(format!(
                    "`{key}.github-token` must be a string",
                    key = kind.key()
                ))
            })?;
            validate_github_token(token)?;
            Some(token.to_string())
        }
    };

    Ok(BaseSafeOutputConfig { max, github_token })
}

fn parse_target(kind: SafeOutputKind, map: &Mapping) -> Result<TargetConfig, CompileError> {
    let mut target = TargetConfig::default();

    if let Some(value) = map.get("target") {
        target.target = scalar_to_string(value).filter(|s| !s.is_empty());
    }

    if let Some(value) = map.get("target-repo") {
        let repo = value.as_str().ok_or_else(|| {
            CompileError::validation(format!(
                "`{key}.target-repo` must be a string",
                key = kind.key()
            ))
        })?;

        if repo == "*" {
            if !kind.allows_wildcard_target_repo() {
                return Err(CompileError::validation(format!(
                    "`target-repo: \"*\"` is not allowed for {key}",
                    key = kind.key()
                )));
            }
        } else if repo.split('/').filter(|part| !part.is_empty()).count() != 2 {
            return Err(CompileError::validation(format!(
                "`{key}.target-repo` must be `owner/repo` or `*`",
                key = kind.key()
            )));
        }

        target.target_repo = Some(repo.to_string());
    }

    if let Some(value) = map.get("allowed-repos") {
        if let Value::Sequence(seq) = value {
            target.allowed_repos = seq
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
        }
    }

    Ok(target)
}

fn parse_filter(map: &Mapping) -> FilterConfig {
    let mut filter = FilterConfig::default();

    if let Some(Value::Sequence(labels)) = map.get("required-labels") {
        filter.required_labels = labels
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
    }
    if let Some(value) = map.get("required-title-prefix") {
        filter.required_title_prefix = value.as_str().map(str::to_string);
    }
    if let Some(value) = map.get("required-category") {
        filter.required_category = value.as_str().map(str::to_string);
    }

    filter
}

fn basic_config(kind: SafeOutputKind, map: &Mapping) -> Result<BasicConfig, CompileError> {
    Ok(BasicConfig {
        base: parse_base(kind, map)?,
        target: parse_target(kind, map)?,
        filter: parse_filter(map),
    })
}

fn opt_string(map: &Mapping, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn string_seq(map: &Mapping, key: &str) -> Vec<String> {
    match map.get(key) {
        Some(Value::Sequence(seq)) => seq
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => vec![],
    }
}

fn parse_create_issue(map: &Mapping) -> Result<CreateIssueConfig, CompileError> {
    let kind = SafeOutputKind::CreateIssue;

    Ok(CreateIssueConfig {
        base: parse_base(kind, map)?,
        target: parse_target(kind, map)?,
        title_prefix: opt_string(map, "title-prefix"),
        labels: string_seq(map, "labels"),
        allowed_labels: string_seq(map, "allowed-labels"),
        assignees: string_seq(map, "assignees"),
        close_older_issues: matches!(
            parse_flag(map, "close-older-issues", FieldMode::BoolValue)?,
            Some(FlagValue::Bool(true))
        ),
        expires: opt_string(map, "expires"),
        group: matches!(
            parse_flag(map, "group", FieldMode::BoolValue)?,
            Some(FlagValue::Bool(true))
        ),
        footer: opt_string(map, "footer"),
    })
}

fn parse_update_issue(map: &Mapping) -> Result<UpdateIssueConfig, CompileError> {
    let kind = SafeOutputKind::UpdateIssue;

    let flag = |key: &str| -> Result<bool, CompileError> {
        Ok(matches!(
            parse_flag(map, key, FieldMode::BoolValue)?,
            Some(FlagValue::Bool(true))
        ))
    };

    Ok(UpdateIssueConfig {
        base: parse_base(kind, map)?,
        target: parse_target(kind, map)?,
        filter: parse_filter(map),
        can_update_title: flag("title")?,
        can_update_body: flag("body")?,
        can_update_status: flag("status")?,
    })
}

fn parse_create_pull_request(map: &Mapping) -> Result<CreatePullRequestConfig, CompileError> {
    let kind = SafeOutputKind::CreatePullRequest;

    Ok(CreatePullRequestConfig {
        base: parse_base(kind, map)?,
        target: parse_target(kind, map)?,
        title_prefix: opt_string(map, "title-prefix"),
        labels: string_seq(map, "labels"),
        draft: parse_flag(map, "draft", FieldMode::TemplatableBool)?,
        fallback_as_issue: matches!(
            parse_flag(map, "fallback-as-issue", FieldMode::BoolValue)?,
            Some(FlagValue::Bool(true))
        ),
        base_branch: opt_string(map, "base"),
    })
}

fn parse_create_discussion(map: &Mapping) -> Result<CreateDiscussionConfig, CompileError> {
    let kind = SafeOutputKind::CreateDiscussion;

    Ok(CreateDiscussionConfig {
        base: parse_base(kind, map)?,
        target: parse_target(kind, map)?,
        title_prefix: opt_string(map, "title-prefix"),
        category: opt_string(map, "category"),
    })
}

fn parse_labels(kind: SafeOutputKind, map: &Mapping) -> Result<LabelsConfig, CompileError> {
    Ok(LabelsConfig {
        base: parse_base(kind, map)?,
        target: parse_target(kind, map)?,
        filter: parse_filter(map),
        allowed: string_seq(map, "allowed"),
    })
}

fn parse_code_scanning_alert(map: &Mapping) -> Result<CodeScanningAlertConfig, CompileError> {
    Ok(CodeScanningAlertConfig {
        base: parse_base(SafeOutputKind::CreateCodeScanningAlert, map)?,
        driver: opt_string(map, "driver"),
    })
}

fn parse_upload_asset(map: &Mapping) -> Result<UploadAssetConfig, CompileError> {
    Ok(UploadAssetConfig {
        base: parse_base(SafeOutputKind::UploadAsset, map)?,
        allowed_exts: string_seq(map, "allowed-exts"),
        max_size_kb: map
            .get("max-size")
            .and_then(Value::as_u64),
    })
}

fn parse_dispatch_workflow(map: &Mapping) -> Result<DispatchWorkflowConfig, CompileError> {
    Ok(DispatchWorkflowConfig {
        base: parse_base(SafeOutputKind::DispatchWorkflow, map)?,
        workflows: string_seq(map, "workflows"),
    })
}

fn parse_assign_to_agent(map: &Mapping) -> Result<AssignToAgentConfig, CompileError> {
    let kind = SafeOutputKind::AssignToAgent;

    Ok(AssignToAgentConfig {
        base: parse_base(kind, map)?,
        target: parse_target(kind, map)?,
        agent: opt_string(map, "agent"),
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::permissions::Level;

    use super::*;

    fn parse(yaml: &str) -> SafeOutputs {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        SafeOutputs::parse(&value).unwrap()
    }

    fn parse_err(yaml: &str) -> String {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        SafeOutputs::parse(&value).unwrap_err().to_string()
    }

    #[test]
    fn test_defaults() {
        let outputs = parse("create-issue:");
        let issue = outputs.create_issue.as_ref().unwrap();
        assert_eq!(issue.base.max, 1);
        assert!(issue.base.github_token.is_none());

        assert_eq!(outputs.max_for(SafeOutputKind::AddComment), 3);
        assert_eq!(
            outputs.max_for(SafeOutputKind::ResolvePullRequestReviewThread),
            10
        );
    }

    #[test]
    fn test_missing_fallbacks_auto_enabled() {
        let outputs = parse("create-issue:");
        assert!(outputs.missing_tool.is_some());
        assert!(outputs.missing_data.is_some());
        assert_eq!(outputs.max_for(SafeOutputKind::MissingTool), 20);

        let disabled = parse("create-issue:\nmissing-tool: false");
        assert!(disabled.missing_tool.is_none());
        assert!(disabled.missing_data.is_some());
    }

    #[test]
    fn test_fallbacks_do_not_make_jobs() {
        let outputs = parse("create-issue:");
        assert_eq!(outputs.job_kinds(), vec![SafeOutputKind::CreateIssue]);
    }

    #[test]
    fn test_wildcard_target_repo_policy() {
        // Creation variants reject the wildcard.
        let err = parse_err("create-issue:\n  target-repo: \"*\"");
        assert!(
            err.contains("`target-repo: \"*\"` is not allowed for create-issue"),
            "got: {err}"
        );

        // Mutation variants accept it.
        let outputs = parse("update-issue:\n  target-repo: \"*\"");
        assert_eq!(
            outputs
                .update_issue
                .unwrap()
                .target
                .target_repo
                .as_deref(),
            Some("*")
        );

        // Open-question decision: allowed for assign-to-user, rejected
        // for assign-to-agent.
        parse("assign-to-user:\n  target-repo: \"*\"");
        let err = parse_err("assign-to-agent:\n  target-repo: \"*\"");
        assert!(err.contains("not allowed for assign-to-agent"), "got: {err}");
    }

    #[test]
    fn test_target_repo_shape() {
        let err = parse_err("update-issue:\n  target-repo: not-a-slug");
        assert!(err.contains("owner/repo"), "got: {err}");

        parse("update-issue:\n  target-repo: octo/repo");
    }

    #[test]
    fn test_update_issue_bool_value_mode() {
        // Null keeps backward-compatible enablement.
        let outputs = parse("update-issue:\n  body:\n  title: true\n  status: false");
        let update = outputs.update_issue.unwrap();
        assert!(update.can_update_body);
        assert!(update.can_update_title);
        assert!(!update.can_update_status);

        // Absent means disabled.
        let outputs = parse("update-issue:");
        let update = outputs.update_issue.unwrap();
        assert!(!update.can_update_body);
    }

    #[test]
    fn test_templatable_bool() {
        let outputs = parse("create-pull-request:\n  draft: ${{ inputs.draft }}");
        assert_eq!(
            outputs.create_pull_request.unwrap().draft,
            Some(FlagValue::Template("${{ inputs.draft }}".into()))
        );

        let outputs = parse("create-pull-request:\n  draft: false");
        assert_eq!(
            outputs.create_pull_request.unwrap().draft,
            Some(FlagValue::Bool(false))
        );

        let err = parse_err("create-pull-request:\n  draft: maybe");
        assert!(err.contains("draft"), "got: {err}");
    }

    #[test]
    fn test_github_token_validation() {
        parse("create-issue:\n  github-token: ${{ secrets.CUSTOM_PAT }}");
        parse(
            "github-token: ${{ secrets.GH_AW_GITHUB_TOKEN || secrets.GITHUB_TOKEN }}\ncreate-issue:",
        );

        let err = parse_err("create-issue:\n  github-token: ghp_plaintext123");
        assert!(err.contains("plaintext"), "got: {err}");

        let err = parse_err("create-issue:\n  github-token: ${{ github.actor }}");
        assert!(err.contains("not a secrets reference"), "got: {err}");
    }

    #[test]
    fn test_unknown_variant_suggests() {
        let err = parse_err("create-isue:");
        assert!(err.contains("unknown safe-output type"), "got: {err}");
        assert!(err.contains("did you mean: create-issue"), "got: {err}");
    }

    #[test]
    fn test_permission_union() {
        let outputs = parse("create-issue:\nadd-comment:\ncreate-code-scanning-alert:");
        let permissions = outputs.permissions();

        assert_eq!(permissions.get("contents"), Some(Level::Read));
        assert_eq!(permissions.get("issues"), Some(Level::Write));
        assert_eq!(permissions.get("pull-requests"), Some(Level::Write));
        assert_eq!(permissions.get("discussions"), Some(Level::Write));
        assert_eq!(permissions.get("security-events"), Some(Level::Write));
        assert_eq!(permissions.get("actions"), None);
    }

    #[test]
    fn test_fallback_as_issue_adds_issue_write() {
        let plain = parse("create-pull-request:");
        assert_eq!(plain.permissions().get("issues"), None);

        let with_fallback = parse("create-pull-request:\n  fallback-as-issue: true");
        assert_eq!(
            with_fallback.permissions().get("issues"),
            Some(Level::Write)
        );
    }

    #[test]
    fn test_upload_asset_contents_write() {
        let outputs = parse("upload-asset:");
        assert_eq!(outputs.permissions().get("contents"), Some(Level::Write));
    }

    #[test]
    fn test_threat_detection_forms() {
        assert!(parse("threat-detection: true\ncreate-issue:").threat_detection.enabled);
        assert!(!parse("create-issue:").threat_detection.enabled);

        let configured = parse("threat-detection:\n  prompt: extra care\ncreate-issue:");
        assert!(configured.threat_detection.enabled);
        assert_eq!(
            configured.threat_detection.prompt.as_deref(),
            Some("extra care")
        );
    }

    #[test]
    fn test_handler_config_alphabetical() {
        let outputs = parse("create-issue:\nadd-comment:\n  max: 2");
        let config = outputs.handler_config_json();
        let rendered = serde_json::to_string(&config).unwrap();

        // BTreeMap serialization is alphabetical by handler key.
        let add_comment = rendered.find("add-comment").unwrap();
        let create_issue = rendered.find("create-issue").unwrap();
        assert!(add_comment < create_issue);
        assert!(rendered.contains(r#""max":2"#));
    }

    #[test]
    fn test_create_issue_fields() {
        let outputs = parse(
            "create-issue:\n  title-prefix: '[triage] '\n  labels: [bot]\n  close-older-issues: true\n  max: 2",
        );
        let issue = outputs.create_issue.unwrap();
        assert_eq!(issue.title_prefix.as_deref(), Some("[triage] "));
        assert_eq!(issue.labels, vec!["bot"]);
        assert!(issue.close_older_issues);
        assert_eq!(issue.base.max, 2);
    }
}
