//! Dangerous HTML in workflow bodies: active-content tags and inline
//! event handlers. Formatting tags (`<details>`, `<summary>`, `<b>`,
//! tables) are allowed. Lines inside fenced code blocks are exempt.

use std::sync::LazyLock;

use regex::Regex;

use super::{Category, MarkdownBody, Scan, SecurityFinding, scan_meta};

pub(crate) struct HtmlAbuse;

scan_meta!(HtmlAbuse, Category::HtmlAbuse);

/// Opening tags that execute, embed, or restyle content.
static BLOCKED_TAGS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    let tag = |name: &str| {
        Regex::new(&format!(r"(?i)<{name}(\s|>|/)")).expect("static regex")
    };

    vec![
        (tag("script"), "<script>"),
        (tag("iframe"), "<iframe>"),
        (tag("object"), "<object>"),
        (tag("embed"), "<embed>"),
        (tag("form"), "<form>"),
        (tag("style"), "<style>"),
    ]
});

static STYLESHEET_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<link[^>]*rel\s*=\s*["']?stylesheet"#).expect("static regex")
});

static META_REFRESH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]*http-equiv\s*=\s*["']?refresh"#).expect("static regex")
});

/// Any `on*` attribute with a non-empty value.
static EVENT_HANDLER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<[^>]*\son[a-z]+\s*=\s*("[^"]+"|'[^']+'|[^\s>"'][^\s>]*)"#)
        .expect("static regex")
});

impl Scan for HtmlAbuse {
    fn scan(&self, body: &MarkdownBody<'_>) -> Vec<SecurityFinding> {
        let mut findings = vec![];

        for line in body.prose_lines() {
            for (pattern, name) in BLOCKED_TAGS.iter() {
                if pattern.is_match(line.text) {
                    findings.push(Self::finding(
                        format!("dangerous HTML tag {name}"),
                        line.number,
                    ));
                }
            }

            if STYLESHEET_LINK.is_match(line.text) {
                findings.push(Self::finding(
                    "dangerous HTML tag <link rel=\"stylesheet\">",
                    line.number,
                ));
            }

            if META_REFRESH.is_match(line.text) {
                findings.push(Self::finding(
                    "dangerous HTML tag <meta http-equiv=\"refresh\">",
                    line.number,
                ));
            }

            if EVENT_HANDLER.is_match(line.text) {
                findings.push(Self::finding(
                    "HTML element with an inline event handler attribute",
                    line.number,
                ));
            }
        }

        findings
    }
}
