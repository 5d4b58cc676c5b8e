//! Known-needs expression substitution for the activation prompt.
//!
//! `needs.<job>.outputs.<out>` expressions in the prompt cannot be
//! interpolated directly (the prompt file is written before job outputs
//! are in scope at the right places), so the compiler maps each one to
//! an env var on the "Substitute placeholders" step and rewrites the
//! prompt to reference the env var instead.

use actions_expressions::extract::extract_expressions;

use crate::utils::needs_env_name;

/// One prompt expression mapped onto an environment variable.
#[derive(Clone, Debug, PartialEq)]
pub struct ExpressionMapping {
    /// The expression as written, fences included.
    pub original: String,
    /// The env var carrying its value, `GH_AW_NEEDS_<JOB>_OUTPUTS_<OUT>`.
    pub env_var: String,
    /// The bare expression content.
    pub content: String,
}

/// Splits a bare `needs.*` expression into `(job, output)`.
///
/// Returns `None` for anything that is not a well-formed
/// `needs.<job>.outputs.<output>` chain.
fn parse_needs_ref(content: &str) -> Option<(&str, &str)> {
    let rest = content.strip_prefix("needs.")?;
    let (job, rest) = rest.split_once('.')?;
    let output = rest.strip_prefix("outputs.")?;

    let word = |s: &str| {
        !s.is_empty()
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    };

    (word(job) && word(output)).then_some((job, output))
}

/// Collects the substitution mappings for a prompt.
///
/// Filtering rules:
/// - `needs.*` expressions referencing jobs in the before-activation
///   set map to env vars;
/// - `needs.*` expressions referencing any other job are dropped;
/// - malformed `needs.*` refs (no second dot) are kept verbatim in the
///   prompt, conservatively, and produce no mapping;
/// - non-`needs` expressions are always kept in the prompt for runtime
///   interpolation and produce no mapping.
pub fn known_needs_mappings(prompt: &str, before_activation: &[String]) -> Vec<ExpressionMapping> {
    let mut mappings: Vec<ExpressionMapping> = vec![];

    for (extracted, _) in extract_expressions(prompt) {
        let content = extracted.as_bare();

        let Some((job, output)) = parse_needs_ref(content) else {
            continue;
        };

        if !before_activation.iter().any(|known| known == job) {
            continue;
        }

        let env_var = needs_env_name(job, output);
        if mappings.iter().any(|mapping| mapping.env_var == env_var) {
            continue;
        }

        mappings.push(ExpressionMapping {
            original: extracted.as_raw().to_string(),
            env_var,
            content: content.to_string(),
        });
    }

    mappings
}

/// Rewrites the prompt, replacing each mapped expression with a
/// `${ENV_VAR}` placeholder the substitution step resolves at runtime.
/// `needs.*` expressions that were dropped by the filter are removed
/// from the prompt entirely.
pub fn rewrite_prompt(prompt: &str, mappings: &[ExpressionMapping]) -> String {
    let mut rewritten = String::with_capacity(prompt.len());
    let mut cursor = 0;

    for (extracted, span) in extract_expressions(prompt) {
        let content = extracted.as_bare();

        let replacement = if let Some(mapping) = mappings
            .iter()
            .find(|mapping| mapping.content == content)
        {
            Some(format!("${{{env}}}", env = mapping.env_var))
        } else if parse_needs_ref(content).is_some() {
            // A well-formed needs ref that did not survive the filter:
            // scrubbed from the prompt.
            Some(String::new())
        } else {
            // Non-needs (and malformed-needs) expressions stay as
            // written.
            None
        };

        if let Some(replacement) = replacement {
            rewritten.push_str(&prompt[cursor..span.start]);
            rewritten.push_str(&replacement);
            cursor = span.end;
        }
    }

    rewritten.push_str(&prompt[cursor..]);
    rewritten
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn before() -> Vec<String> {
        vec!["pre_activation".to_string(), "precompute".to_string()]
    }

    #[test]
    fn test_mapping_for_before_activation_job() {
        let mappings =
            known_needs_mappings("Act on ${{ needs.precompute.outputs.action }} now", &before());

        assert_eq!(
            mappings,
            vec![ExpressionMapping {
                original: "${{ needs.precompute.outputs.action }}".into(),
                env_var: "GH_AW_NEEDS_PRECOMPUTE_OUTPUTS_ACTION".into(),
                content: "needs.precompute.outputs.action".into(),
            }]
        );
    }

    #[test]
    fn test_jobs_after_activation_dropped() {
        let mappings =
            known_needs_mappings("${{ needs.config.outputs.value }}", &before());
        assert!(mappings.is_empty());
    }

    #[test]
    fn test_non_needs_not_mapped() {
        let mappings = known_needs_mappings(
            "${{ github.actor }} and ${{ steps.sanitized.outputs.text }}",
            &before(),
        );
        assert!(mappings.is_empty());
    }

    #[test]
    fn test_malformed_needs_kept_verbatim() {
        let prompt = "${{ needs.precompute }}";
        assert!(known_needs_mappings(prompt, &before()).is_empty());
        assert_eq!(rewrite_prompt(prompt, &[]), prompt);
    }

    #[test]
    fn test_duplicates_collapse() {
        let prompt = "${{ needs.precompute.outputs.action }} twice ${{ needs.precompute.outputs.action }}";
        assert_eq!(known_needs_mappings(prompt, &before()).len(), 1);
    }

    #[test]
    fn test_rewrite_prompt() {
        let prompt = "Do ${{ needs.precompute.outputs.action }} as ${{ github.actor }}.\nSkip ${{ needs.config.outputs.value }}!";
        let mappings = known_needs_mappings(prompt, &before());
        let rewritten = rewrite_prompt(prompt, &mappings);

        assert_eq!(
            rewritten,
            "Do ${GH_AW_NEEDS_PRECOMPUTE_OUTPUTS_ACTION} as ${{ github.actor }}.\nSkip !"
        );
    }
}
