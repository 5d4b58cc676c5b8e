//! Executable content embedded in the document body: scripted SVG and
//! data URIs carrying executable MIME types.

use std::sync::LazyLock;

use regex::Regex;

use super::{Category, MarkdownBody, Scan, SecurityFinding, scan_meta};

pub(crate) struct EmbeddedFiles;

scan_meta!(EmbeddedFiles, Category::EmbeddedFiles);

/// `<svg>` whose content includes `<script>` or `<foreignObject>`,
/// matched across lines.
static SCRIPTED_SVG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<svg[\s>].*?<(script|foreignObject)[\s>]").expect("static regex")
});

/// MIME types that make a data URI an embedded executable document.
const EXECUTABLE_MIMES: &[&str] = &[
    "text/html",
    "application/javascript",
    "application/x-javascript",
    "image/svg+xml",
];

static DATA_URI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)data:([a-z0-9.+/-]+)[;,]").expect("static regex"));

impl Scan for EmbeddedFiles {
    fn scan(&self, body: &MarkdownBody<'_>) -> Vec<SecurityFinding> {
        let mut findings = vec![];

        for capture in SCRIPTED_SVG.captures_iter(body.raw()) {
            let whole = capture.get(0).expect("group 0 always present");
            let inner = capture.get(1).map(|m| m.as_str()).unwrap_or_default();
            findings.push(Self::finding(
                format!("embedded SVG containing <{inner}>"),
                body.line_of_offset(whole.start()),
            ));
        }

        for line in body.lines() {
            for capture in DATA_URI.captures_iter(line.text) {
                let mime = capture
                    .get(1)
                    .map(|m| m.as_str().to_ascii_lowercase())
                    .unwrap_or_default();

                if EXECUTABLE_MIMES.contains(&mime.as_str()) {
                    findings.push(Self::finding(
                        format!("data URI embedding executable content ({mime})"),
                        line.number,
                    ));
                }
            }
        }

        findings
    }
}
