//! The `awc` command-line front-end: read a workflow Markdown file,
//! compile it, write `<stem>.lock.yml` next to it.

#![warn(clippy::all)]

use std::fs;
use std::process::ExitCode;

use annotate_snippets::{Group, Level, Renderer};
use anstream::{eprintln, println};
use anyhow::Context as _;
use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};
use clap_verbosity_flag::WarnLevel;
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

use awc::actions::ActionMode;
use awc::error::CompileError;
use awc::{Compiler, VERSION};

/// Compiles agentic workflow Markdown files into locked GitHub Actions
/// workflows.
#[derive(Parser)]
#[command(about, version)]
struct App {
    /// The workflow Markdown file to compile.
    input: Utf8PathBuf,

    /// How first-party action references are emitted.
    #[arg(long, value_enum, default_value_t)]
    actions_mode: CliActionMode,

    /// Explicit ref for first-party action references, overriding the
    /// frontmatter `action-tag` feature and the compiler version.
    #[arg(long)]
    action_tag: Option<String>,

    /// Fail on conditions that are warnings by default, such as
    /// unresolvable action versions.
    #[arg(long, env = "GH_AW_STRICT")]
    strict: bool,

    /// Suppress informational output.
    #[arg(short, long)]
    quiet: bool,

    /// Compile in trial mode: safe outputs are staged, and no lock
    /// file is written.
    #[arg(long)]
    trial: bool,

    /// The repository slug a trial compilation targets.
    #[arg(long, requires = "trial")]
    trial_logical_repo: Option<String>,

    #[command(flatten)]
    verbose: clap_verbosity_flag::Verbosity<WarnLevel>,
}

#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum CliActionMode {
    /// Local action paths (requires a checkout of the actions repo).
    Dev,
    /// Pinned remote references.
    #[default]
    Release,
}

impl From<CliActionMode> for ActionMode {
    fn from(mode: CliActionMode) -> Self {
        match mode {
            CliActionMode::Dev => ActionMode::Dev,
            CliActionMode::Release => ActionMode::Release,
        }
    }
}

fn main() -> ExitCode {
    let app = App::parse();

    let default_level = if app.quiet {
        tracing::level_filters::LevelFilter::ERROR
    } else {
        app.verbose.tracing_level_filter()
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    match run(&app) {
        Ok(Some(output)) => {
            if !app.quiet {
                println!("{} {output}", "compiled:".green().bold());
            }
            ExitCode::SUCCESS
        }
        Ok(None) => ExitCode::SUCCESS,
        Err(error) => {
            render_error(&error);
            ExitCode::FAILURE
        }
    }
}

enum CliError {
    Io(anyhow::Error),
    Compile(CompileError),
}

impl From<CompileError> for CliError {
    fn from(error: CompileError) -> Self {
        Self::Compile(error)
    }
}

fn run(app: &App) -> Result<Option<Utf8PathBuf>, CliError> {
    let content = fs::read_to_string(&app.input)
        .with_context(|| format!("couldn't read {input}", input = app.input))
        .map_err(CliError::Io)?;

    let compiler = Compiler {
        mode: app.actions_mode.into(),
        action_tag: app.action_tag.clone(),
        strict: app.strict,
        trial: app.trial,
        version: VERSION.to_string(),
    };

    let compilation = compiler.compile(&app.input, &content)?;

    if app.trial {
        if let Some(repo) = &app.trial_logical_repo {
            tracing::info!("trial compilation against {repo}; lock file not written");
        } else {
            tracing::info!("trial compilation; lock file not written");
        }
        return Ok(None);
    }

    // Emission is atomic: the document is fully rendered before the
    // single write below.
    let output = app.input.with_extension("lock.yml");
    fs::write(&output, &compilation.lock)
        .with_context(|| format!("couldn't write {output}"))
        .map_err(CliError::Io)?;

    Ok(Some(output))
}

fn render_error(error: &CliError) {
    match error {
        CliError::Io(error) => {
            eprintln!("{} {error}", "error:".red().bold());
        }
        // Parse diagnostics and security reports carry their own
        // multi-line formatting.
        CliError::Compile(error @ (CompileError::Parse(_) | CompileError::Security { .. })) => {
            eprintln!("{error}");
        }
        CliError::Compile(error) => {
            let mut group = Group::with_title(Level::ERROR.primary_title(error.to_string()));

            if matches!(error, CompileError::Internal(_)) {
                group = group.element(
                    Level::HELP.message("this is a compiler bug; please include the workflow file in your report"),
                );
            }

            let renderer = Renderer::styled();
            eprintln!("{}", renderer.render(&[group]));
        }
    }
}
