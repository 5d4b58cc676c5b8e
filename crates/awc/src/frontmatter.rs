//! Splitting and parsing of the leading metadata block.
//!
//! A workflow file is a metadata block delimited by `---` on line 1 and
//! a later `---` line, followed by a Markdown body. All downstream line
//! numbers (scanner findings, expression diagnostics) are adjusted by
//! the recorded body offset so they point into the original file.

use serde_yaml::Mapping;

use crate::error::{CompileError, ParseDiagnostic};
use crate::utils::closest_match;

/// Frontmatter keys the compiler understands. Anything else is a
/// validation error (with a suggestion when a near-miss exists).
pub const RECOGNIZED_KEYS: &[&str] = &[
    "cache-memory",
    "command",
    "concurrency",
    "description",
    "engine",
    "env",
    "features",
    "github-token",
    "imports",
    "jobs",
    "mcp-servers",
    "name",
    "network",
    "on",
    "permissions",
    "plugins",
    "repo-memory",
    "roles",
    "runs-on",
    "safe-outputs",
    "sandbox",
    "source",
    "steps",
    "stop-after",
    "strict",
    "timeout-minutes",
    "tools",
    "tracker-id",
];

/// The result of splitting a workflow file.
#[derive(Debug, PartialEq)]
pub struct Split<'a> {
    /// The raw metadata block, without its delimiters.
    pub frontmatter: Option<&'a str>,
    /// The Markdown body.
    pub body: &'a str,
    /// The number of lines preceding the body in the original file
    /// (0 when there is no metadata block).
    pub body_offset: usize,
}

/// Splits `content` into its metadata block and body.
///
/// A file without a leading `---` line is all body. A `---` opener
/// without a closing delimiter is a parse error.
pub fn split_frontmatter<'a>(path: &str, content: &'a str) -> Result<Split<'a>, CompileError> {
    let mut lines = content.split_inclusive('\n');

    let Some(first) = lines.next() else {
        return Ok(Split {
            frontmatter: None,
            body: content,
            body_offset: 0,
        });
    };

    if first.trim_end() != "---" {
        return Ok(Split {
            frontmatter: None,
            body: content,
            body_offset: 0,
        });
    }

    let fm_start = first.len();
    let mut offset = fm_start;
    let mut line_number = 1;

    for line in lines {
        line_number += 1;
        if line.trim_end() == "---" {
            let frontmatter = &content[fm_start..offset];
            let body = &content[offset + line.len()..];
            return Ok(Split {
                frontmatter: Some(frontmatter),
                body,
                body_offset: line_number,
            });
        }
        offset += line.len();
    }

    Err(ParseDiagnostic {
        path: path.into(),
        line: 1,
        column: 1,
        message: "unterminated frontmatter block (missing closing `---`)".into(),
        context: context_lines(content, 1),
    }
    .into())
}

/// Parses the metadata block into a YAML mapping, translating opaque
/// parser messages into plain English and attaching original-file
/// positions.
pub fn parse_frontmatter(
    path: &str,
    content: &str,
    frontmatter: &str,
) -> Result<Mapping, CompileError> {
    let parsed: serde_yaml::Value = serde_yaml::from_str(frontmatter).map_err(|err| {
        // The frontmatter starts on file line 2, below the opening `---`.
        let (line, column) = err
            .location()
            .map(|loc| (loc.line() + 1, loc.column()))
            .unwrap_or((2, 1));

        CompileError::from(ParseDiagnostic {
            path: path.into(),
            line,
            column,
            message: translate_yaml_error(&err.to_string()),
            context: context_lines(content, line),
        })
    })?;

    match parsed {
        serde_yaml::Value::Null => Ok(Mapping::new()),
        serde_yaml::Value::Mapping(mapping) => Ok(mapping),
        _ => Err(ParseDiagnostic {
            path: path.into(),
            line: 2,
            column: 1,
            message: "frontmatter must be a mapping of configuration keys".into(),
            context: context_lines(content, 2),
        }
        .into()),
    }
}

/// Rejects unrecognized top-level keys, suggesting the closest known key
/// when one is within edit distance 2.
pub fn validate_keys(mapping: &Mapping) -> Result<(), CompileError> {
    for key in mapping.keys() {
        let Some(key) = key.as_str() else {
            return Err(CompileError::validation(
                "frontmatter keys must be strings",
            ));
        };

        if !RECOGNIZED_KEYS.contains(&key) {
            let mut message = format!("unknown frontmatter field `{key}`");
            if let Some(suggestion) = closest_match(key, RECOGNIZED_KEYS.iter().copied(), 2) {
                message.push_str(&format!(", did you mean: {suggestion}"));
            }
            return Err(CompileError::Validation(message));
        }
    }

    Ok(())
}

/// Translates serde_yaml's parser messages into plain English. Unmatched
/// messages pass through with their internal position suffix removed.
fn translate_yaml_error(message: &str) -> String {
    let lowered = message.to_ascii_lowercase();

    if lowered.contains("mapping values are not allowed") {
        return "Invalid syntax: unexpected ':' - check your indentation".into();
    }
    if lowered.contains("could not find expected ':'") {
        return "Invalid syntax: missing ':' after a key".into();
    }
    if lowered.contains("found character that cannot start any token") {
        return "Invalid syntax: unexpected character - check for stray tabs or special characters"
            .into();
    }
    if lowered.contains("did not find expected key") {
        return "Invalid syntax: expected a key - check your indentation".into();
    }
    if lowered.contains("duplicate entry") {
        return "Invalid syntax: duplicate key".into();
    }

    // serde_yaml appends an "at line X column Y" suffix; the diagnostic
    // carries the position already.
    match message.split(" at line ").next() {
        Some(prefix) if !prefix.is_empty() => prefix.into(),
        _ => message.into(),
    }
}

/// Collects the source lines around `line` (1-based) for diagnostics.
fn context_lines(content: &str, line: usize) -> Vec<(usize, String)> {
    let first = line.saturating_sub(1).max(1);
    content
        .lines()
        .enumerate()
        .map(|(idx, text)| (idx + 1, text.to_string()))
        .filter(|(number, _)| (first..=line + 1).contains(number))
        .collect()
}
