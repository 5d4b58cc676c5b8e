//! Compiler for agentic workflows.
//!
//! Takes a Markdown workflow file (frontmatter + body), validates it
//! (frontmatter shape, content security scan, expression safety),
//! synthesizes the job graph, and emits a locked GitHub Actions
//! workflow. See [`Compiler::compile`] for the pipeline.

#![warn(clippy::all)]

use camino::Utf8Path;
use chrono::{DateTime, Utc};

pub mod actions;
pub mod emit;
pub mod engine;
pub mod error;
pub mod exprcheck;
pub mod frontmatter;
pub mod jobs;
pub mod permissions;
pub mod safe_outputs;
pub mod scan;
pub mod substitute;
pub mod utils;
pub mod workflow;

use actions::{ActionMode, ActionResolver};
use error::CompileError;
use jobs::builtin::Synthesizer;
use safe_outputs::FlagValue;
use workflow::WorkflowData;

/// The compiler's own version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The result of a successful compilation.
#[derive(Debug)]
pub struct Compilation {
    /// The rendered lock file.
    pub lock: String,
    /// The normalized model, for callers that inspect it.
    pub data: WorkflowData,
}

/// One compilation configuration. Reusable across inputs; independent
/// compilations may run on separate threads.
#[derive(Clone, Debug)]
pub struct Compiler {
    pub mode: ActionMode,
    pub action_tag: Option<String>,
    pub strict: bool,
    /// Trial mode: safe outputs forced into staged collection.
    pub trial: bool,
    pub version: String,
}

impl Default for Compiler {
    fn default() -> Self {
        Self {
            mode: ActionMode::Release,
            action_tag: None,
            strict: false,
            trial: false,
            version: VERSION.to_string(),
        }
    }
}

impl Compiler {
    /// Compiles one workflow file's content.
    pub fn compile(&self, path: &Utf8Path, content: &str) -> Result<Compilation, CompileError> {
        self.compile_at(path, content, Utc::now())
    }

    /// Like [`Self::compile`], with an explicit clock for `stop-after:`
    /// resolution.
    pub fn compile_at(
        &self,
        path: &Utf8Path,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<Compilation, CompileError> {
        let path_str = path.as_str();
        let stem = path.file_stem().unwrap_or("workflow");

        // Parse: metadata block, then the model.
        let split = frontmatter::split_frontmatter(path_str, content)?;
        let mapping = match split.frontmatter {
            Some(frontmatter) => frontmatter::parse_frontmatter(path_str, content, frontmatter)?,
            None => serde_yaml::Mapping::new(),
        };
        frontmatter::validate_keys(&mapping)?;
        let data = WorkflowData::parse(stem, &mapping, now)?;

        let strict = self.strict || data.strict;

        // Scan the body before anything interprets it.
        let findings = scan::scan_markdown(split.body, split.body_offset);
        let (errors, warnings): (Vec<_>, Vec<_>) = findings
            .into_iter()
            .partition(|finding| finding.category.fails_compile());

        for warning in &warnings {
            tracing::warn!(
                "{path_str}:{line}: {category}: {description}",
                line = warning.line,
                category = warning.category,
                description = warning.description
            );
        }

        if !errors.is_empty() {
            return Err(CompileError::Security {
                path: path_str.to_string(),
                findings: errors,
            });
        }

        // Resolve action references.
        let resolver = ActionResolver::new(
            self.mode,
            self.action_tag.clone(),
            data.action_tag_feature().map(str::to_string),
            self.version.clone(),
        );

        if strict && self.mode == ActionMode::Release && resolver.uses_local_actions() {
            return Err(CompileError::validation(
                "strict mode: release compilation cannot resolve pinned action references (no action tag and a dev version)",
            ));
        }

        self.check_dangerous_permissions(&data, strict)?;

        // Synthesize the graph, then validate every expression against
        // it.
        let graph = Synthesizer {
            data: &data,
            actions: &resolver,
            prompt: split.body,
            staged: self.trial,
        }
        .synthesize()?;

        let known_jobs = graph.names();
        exprcheck::validate_text(path_str, split.body, split.body_offset, &known_jobs)?;
        self.validate_templatable_fields(&data, &known_jobs)?;

        if let Some(token) = &data.github_token {
            safe_outputs::validate_github_token(token)?;
        }

        let lock = emit::Emitter {
            data: &data,
            graph: &graph,
            compiler_version: &self.version,
        }
        .emit();

        Ok(Compilation { lock, data })
    }

    /// User-declared write grants on scopes the agent could abuse for
    /// persistence or lateral movement. Warned by default, fatal under
    /// strict mode, silenced by the `dangerous-permissions-write`
    /// feature.
    fn check_dangerous_permissions(
        &self,
        data: &WorkflowData,
        strict: bool,
    ) -> Result<(), CompileError> {
        const SENSITIVE_SCOPES: &[&str] =
            &["actions", "contents", "deployments", "id-token", "packages"];

        let Some(user) = &data.permissions else {
            return Ok(());
        };

        let feature_enabled = data
            .features
            .get("dangerous-permissions-write")
            .and_then(serde_yaml::Value::as_bool)
            .unwrap_or(false);
        if feature_enabled {
            return Ok(());
        }

        for scope in SENSITIVE_SCOPES.iter().copied() {
            if user.get(scope) == Some(permissions::Level::Write) {
                if strict {
                    return Err(CompileError::validation(format!(
                        "strict mode: `{scope}: write` requires the `dangerous-permissions-write` feature"
                    )));
                }
                tracing::warn!(
                    "workflow declares `{scope}: write`; enable the `dangerous-permissions-write` feature to acknowledge this"
                );
            }
        }

        Ok(())
    }

    /// Templatable config fields carry expressions too; they go through
    /// the same safety engine as the body.
    fn validate_templatable_fields(
        &self,
        data: &WorkflowData,
        known_jobs: &[String],
    ) -> Result<(), CompileError> {
        let Some(outputs) = &data.safe_outputs else {
            return Ok(());
        };

        if let Some(pr) = &outputs.create_pull_request {
            if let Some(FlagValue::Template(expr)) = &pr.draft {
                exprcheck::validate_expression_string(
                    "create-pull-request.draft",
                    expr,
                    known_jobs,
                )?;
            }
        }

        Ok(())
    }
}
