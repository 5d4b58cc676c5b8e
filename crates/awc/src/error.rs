//! The compiler's error taxonomy.
//!
//! Every failure bubbles to the compile boundary as a [`CompileError`].
//! Output is deterministic: the same input produces the same errors in
//! the same order.

use std::fmt;

use thiserror::Error;

use crate::scan::SecurityFinding;

/// A frontmatter (or body position) parse error, rendered as
/// `filename:line:column: error: message` followed by source context.
#[derive(Debug)]
pub struct ParseDiagnostic {
    /// The input path, as given by the caller.
    pub path: String,
    /// 1-based line in the original file.
    pub line: usize,
    /// 1-based column.
    pub column: usize,
    /// The (already translated) message.
    pub message: String,
    /// Up to a few `(line number, text)` context lines.
    pub context: Vec<(usize, String)>,
}

impl fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{path}:{line}:{column}: error: {message}",
            path = self.path,
            line = self.line,
            column = self.column,
            message = self.message
        )?;

        for (number, text) in &self.context {
            write!(f, "\n  {number:>4} | {text}")?;
            if *number == self.line {
                let caret_pad = self.column.saturating_sub(1);
                write!(f, "\n       | {:caret_pad$}^", "")?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for ParseDiagnostic {}

fn render_security(path: &str, findings: &[SecurityFinding]) -> String {
    let mut out = String::new();

    for finding in findings {
        out.push_str(&format!(
            "{path}:{line}:1: error: {description} ({category})\n",
            line = finding.line,
            description = finding.description,
            category = finding.category,
        ));
    }

    out.push_str(&format!(
        "workflow rejected: {count} content security issue(s) found in the workflow body",
        count = findings.len()
    ));
    out
}

/// All the ways a compilation can fail.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The metadata block (or the file shape around it) is malformed.
    #[error(transparent)]
    Parse(#[from] ParseDiagnostic),

    /// A well-formed input failed a semantic check: unauthorized
    /// expression, plaintext token, invalid target-repo, unknown
    /// safe-output variant, a job cycle, and friends.
    #[error("{0}")]
    Validation(String),

    /// The Markdown security scanner found disqualifying content.
    #[error("{}", render_security(.path, .findings))]
    Security {
        /// The input path.
        path: String,
        /// The disqualifying findings, in source order.
        findings: Vec<SecurityFinding>,
    },

    /// An internal invariant was violated.
    #[error("compiler error: {0} (this is a bug in the compiler, please report it)")]
    Internal(String),
}

impl CompileError {
    /// Convenience constructor for [`CompileError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
