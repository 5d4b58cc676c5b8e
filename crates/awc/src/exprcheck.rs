//! The expression safety engine.
//!
//! Every `${{ … }}` in the workflow body (and in templatable config
//! fields) is parsed and validated against an allow-list of known-safe
//! contexts. Rejections carry a fuzzy-matched suggestion; property
//! names that could reach JavaScript prototype machinery are blocked
//! unconditionally, even via bracket access.

use actions_expressions::context::{Context, ContextPattern};
use actions_expressions::extract::extract_expressions;
use actions_expressions::Expr;

use crate::error::CompileError;
use crate::utils::closest_match;

/// Property names blocked anywhere in an expression chain: each one,
/// dereferenced on a JavaScript host object, is a step toward prototype
/// pollution or code execution.
pub const DANGEROUS_PROPERTIES: &[&str] = &[
    "constructor",
    "__proto__",
    "prototype",
    "__defineGetter__",
    "__defineSetter__",
    "__lookupGetter__",
    "__lookupSetter__",
    "hasOwnProperty",
    "isPrototypeOf",
    "propertyIsEnumerable",
    "toString",
    "valueOf",
    "toLocaleString",
];

macro_rules! pat {
    ($pat:expr) => {
        ContextPattern::new($pat)
    };
}

/// Contexts that are always safe to interpolate: stable GitHub metadata
/// that cannot carry attacker-controlled code, sanitized content
/// outputs, and workflow inputs.
static ALLOWED: &[ContextPattern<'static>] = &[
    pat!("github.workflow"),
    pat!("github.workspace"),
    pat!("github.repository"),
    pat!("github.repository_owner"),
    pat!("github.actor"),
    pat!("github.triggering_actor"),
    pat!("github.run_id"),
    pat!("github.run_number"),
    pat!("github.run_attempt"),
    pat!("github.job"),
    pat!("github.ref"),
    pat!("github.ref_name"),
    pat!("github.sha"),
    pat!("github.server_url"),
    pat!("github.api_url"),
    pat!("github.event_name"),
    pat!("github.event.action"),
    pat!("github.event.number"),
    pat!("github.event.before"),
    pat!("github.event.after"),
    pat!("github.event.issue.number"),
    pat!("github.event.issue.title"),
    pat!("github.event.issue.state"),
    pat!("github.event.pull_request.number"),
    pat!("github.event.pull_request.title"),
    pat!("github.event.pull_request.state"),
    pat!("github.event.pull_request.head.sha"),
    pat!("github.event.pull_request.head.ref"),
    pat!("github.event.pull_request.base.ref"),
    pat!("github.event.discussion.number"),
    pat!("github.event.discussion.title"),
    pat!("github.event.comment.id"),
    pat!("github.event.comment.discussion_id"),
    pat!("github.event.review.id"),
    pat!("github.event.repository.default_branch"),
    pat!("github.event.repository.name"),
    pat!("github.event.check_run.id"),
    pat!("github.event.workflow_run.conclusion"),
    pat!("github.event.workflow_run.html_url"),
    pat!("github.event.workflow_run.head_sha"),
    pat!("github.event.workflow_run.run_number"),
    pat!("github.event.workflow_run.event"),
    pat!("github.event.workflow_run.status"),
    pat!("github.event.inputs.*"),
    pat!("env.*"),
    pat!("inputs.*"),
    pat!("steps.sanitized.outputs.text"),
    pat!("steps.sanitized.outputs.title"),
    pat!("steps.sanitized.outputs.body"),
];

/// Validates every expression in `text`. `offset` is the number of
/// original-file lines preceding `text`; `known_jobs` are the job names
/// whose outputs `needs.*` references may name.
pub fn validate_text(
    path: &str,
    text: &str,
    offset: usize,
    known_jobs: &[String],
) -> Result<(), CompileError> {
    let lines: Vec<&str> = text.lines().collect();

    for (idx, line) in lines.iter().enumerate() {
        let line_number = offset + idx + 1;
        let mut scanned_to = 0;

        for (extracted, span) in extract_expressions(line) {
            scanned_to = span.end;
            let bare = extracted.as_bare();

            if bare.contains("${{") {
                return Err(CompileError::validation(format!(
                    "{path}:{line_number}: nested expressions are not allowed: `{raw}`",
                    raw = extracted.as_raw()
                )));
            }

            let expr = Expr::parse(bare).map_err(|err| {
                CompileError::validation(format!("{path}:{line_number}: {err}"))
            })?;

            check_expr(&expr, known_jobs)
                .map_err(|message| {
                    CompileError::validation(format!("{path}:{line_number}: {message}"))
                })?;
        }

        // An opener left unterminated on this line is literal text,
        // unless a later line closes it: the Actions runner would
        // evaluate that as one multi-line expression, bypassing the
        // per-line checks above.
        if line[scanned_to..].contains("${{")
            && lines[idx + 1..].iter().any(|later| later.contains("}}"))
        {
            return Err(CompileError::validation(format!(
                "{path}:{line_number}: multi-line expressions are not allowed"
            )));
        }
    }

    Ok(())
}

/// Validates a single already-extracted expression string (used for
/// templatable config fields).
pub fn validate_expression_string(
    field: &str,
    raw: &str,
    known_jobs: &[String],
) -> Result<(), CompileError> {
    for (extracted, _) in extract_expressions(raw) {
        let expr = Expr::parse(extracted.as_bare())
            .map_err(|err| CompileError::validation(format!("in `{field}`: {err}")))?;

        check_expr(&expr, known_jobs)
            .map_err(|message| CompileError::validation(format!("in `{field}`: {message}")))?;
    }

    Ok(())
}

fn check_expr(expr: &Expr<'_>, known_jobs: &[String]) -> Result<(), String> {
    // The dangerous-property check runs first and unconditionally: an
    // otherwise allow-listed chain that mentions `constructor` is still
    // rejected.
    for name in expr.property_names() {
        if DANGEROUS_PROPERTIES
            .iter()
            .any(|dangerous| dangerous.eq_ignore_ascii_case(name))
        {
            return Err(format!(
                "expression references dangerous property `{name}`"
            ));
        }
    }

    for context in expr.contexts() {
        check_context(context, known_jobs)?;
    }

    Ok(())
}

fn check_context(context: &Context<'_>, known_jobs: &[String]) -> Result<(), String> {
    // Call-headed contexts (`fromJSON(x).y`) validate through their
    // argument contexts, which `Expr::contexts` already surfaces.
    let Some(head) = context.head() else {
        return Ok(());
    };

    if head.eq_ignore_ascii_case("needs") {
        return check_needs_context(context, known_jobs);
    }

    if ALLOWED.iter().any(|pattern| pattern.matches(context)) {
        return Ok(());
    }

    let raw = context.as_raw();
    let mut message = format!("expression `{raw}` is not allowed");

    let normalized = context.as_pattern().unwrap_or_else(|| raw.to_string());
    if let Some(suggestion) = closest_match(
        &normalized,
        ALLOWED.iter().map(|pattern| pattern.as_str()),
        2,
    ) {
        message.push_str(&format!(", did you mean: {suggestion}"));
    }

    Err(message)
}

fn check_needs_context(context: &Context<'_>, known_jobs: &[String]) -> Result<(), String> {
    let raw = context.as_raw();
    let pattern = context.as_pattern().unwrap_or_default();
    let parts: Vec<&str> = pattern.split('.').collect();

    let shape_ok = parts.len() == 4 && parts[0] == "needs" && parts[2] == "outputs";
    if !shape_ok {
        return Err(format!(
            "expression `{raw}` must have the form needs.<job>.outputs.<output>"
        ));
    }

    let job = parts[1];
    if !known_jobs.iter().any(|known| known == job) {
        let mut message = format!("expression `{raw}` references unknown job `{job}`");
        if let Some(suggestion) =
            closest_match(job, known_jobs.iter().map(String::as_str), 2)
        {
            message.push_str(&format!(", did you mean: {suggestion}"));
        }
        return Err(message);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(text: &str) -> Result<(), CompileError> {
        validate_text("workflow.md", text, 0, &["precompute".to_string()])
    }

    fn validate_err(text: &str) -> String {
        validate(text).unwrap_err().to_string()
    }

    #[test]
    fn test_allowed_expressions() {
        validate("Actor: ${{ github.actor }}, repo ${{ github.repository }}\n").unwrap();
        validate("Issue ${{ github.event.issue.number }}\n").unwrap();
        validate("${{ env.GH_AW_PROMPT }} and ${{ env.ANYTHING }}\n").unwrap();
        validate("${{ steps.sanitized.outputs.text }}\n").unwrap();
        validate("${{ github.event.inputs.dry-run }}\n").unwrap();
        validate("${{ needs.precompute.outputs.action }}\n").unwrap();
        validate("${{ inputs.plan }}\n").unwrap();
    }

    #[test]
    fn test_secrets_rejected() {
        let err = validate_err("${{ secrets.GITHUB_TOKEN }}\n");
        assert!(err.contains("not allowed"), "got: {err}");
    }

    #[test]
    fn test_misspelling_gets_suggestion() {
        let err = validate_err("${{ github.workfow }}\n");
        assert!(err.contains("not allowed"), "got: {err}");
        assert!(err.contains("did you mean: github.workflow"), "got: {err}");
    }

    #[test]
    fn test_dangerous_properties_blocked() {
        for expr in [
            "${{ github.constructor }}",
            "${{ github['__proto__'] }}",
            "${{ env.FOO.toString }}",
            "${{ github.event.issue['valueOf'] }}",
        ] {
            let err = validate_err(&format!("{expr}\n"));
            assert!(err.contains("dangerous property"), "{expr}: {err}");
        }
    }

    #[test]
    fn test_dangerous_property_beats_allow_list() {
        // `env.*` would allow this chain's head, but the property check
        // is unconditional.
        let err = validate_err("${{ env['constructor'] }}\n");
        assert!(err.contains("dangerous property"), "got: {err}");
    }

    #[test]
    fn test_unknown_needs_job() {
        let err = validate_err("${{ needs.precompute2.outputs.x }}\n");
        assert!(err.contains("unknown job"), "got: {err}");
        assert!(err.contains("did you mean: precompute"), "got: {err}");
    }

    #[test]
    fn test_needs_shape() {
        let err = validate_err("${{ needs.precompute }}\n");
        assert!(err.contains("needs.<job>.outputs.<output>"), "got: {err}");
    }

    #[test]
    fn test_nested_rejected() {
        let err = validate_err("${{ ${{ github.actor }} }}\n");
        assert!(err.contains("nested"), "got: {err}");
    }

    #[test]
    fn test_unterminated_is_literal_text() {
        validate("this ${{ never closes\n").unwrap();
        validate("lone ${ brace }\n").unwrap();
    }

    #[test]
    fn test_multiline_expression_rejected() {
        let err = validate_err("start ${{ secrets.X\n}} end\n");
        assert!(err.contains("multi-line"), "got: {err}");

        // A later, unrelated close brace still counts: the runner
        // would see one expression spanning the lines.
        let err = validate_err("start ${{ github.actor\nmore text }} tail\n");
        assert!(err.contains("multi-line"), "got: {err}");
    }

    #[test]
    fn test_line_numbers_respect_offset() {
        let err = validate_text(
            "workflow.md",
            "ok line\n${{ secrets.X }}\n",
            10,
            &[],
        )
        .unwrap_err()
        .to_string();
        assert!(err.contains("workflow.md:12:"), "got: {err}");
    }

    #[test]
    fn test_boolean_composition_of_allowed() {
        validate("${{ github.event_name == 'push' && github.ref || github.sha }}\n").unwrap();
        validate("${{ contains(github.event.issue.title, 'bug') }}\n").unwrap();
    }
}
