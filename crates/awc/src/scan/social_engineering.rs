//! Prompt-injection phrasing and payload-delivery patterns in prose.
//! Fenced code blocks are exempt: documentation legitimately shows
//! dangerous commands inside code samples.

use std::sync::LazyLock;

use regex::Regex;

use super::{Category, MarkdownBody, Scan, SecurityFinding, scan_meta};

pub(crate) struct SocialEngineering;

scan_meta!(SocialEngineering, Category::SocialEngineering);

static PROMPT_INJECTION: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)ignore\s+(all\s+)?previous\s+instructions",
        r"(?i)override\s+(your\s+|all\s+)?instructions",
        r"(?i)forget\s+(your\s+|all\s+)?previous",
        r"(?i)you\s+are\s+now",
        r"(?i)disregard\s+(all|any|previous)",
        r"(?i)new\s+instructions\s*:",
        r"(?i)system\s+override",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("static regex"))
    .collect()
});

static PIPE_TO_SHELL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(curl|wget)\b[^|\n]*\|\s*(sudo\s+)?(ba|z|da|k)?sh\b").expect("static regex")
});

static BASE64_DECODE_EXEC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)base64\s+(-d|--decode)\b[^|\n]*\|\s*(sudo\s+)?(ba|z|da|k)?sh\b")
        .expect("static regex")
});

static ECHO_BASE64_DECODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)echo\s+[A-Za-z0-9+/=]{8,}\s*\|\s*base64\s+(-d|--decode)\b")
        .expect("static regex")
});

static BASE64_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9+/=]{200,}").expect("static regex"));

static HEX_ESCAPE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\\x[0-9a-fA-F]{2}){20,}").expect("static regex"));

impl Scan for SocialEngineering {
    fn scan(&self, body: &MarkdownBody<'_>) -> Vec<SecurityFinding> {
        let mut findings = vec![];

        for line in body.prose_lines() {
            if let Some(pattern) = PROMPT_INJECTION
                .iter()
                .find_map(|regex| regex.find(line.text))
            {
                findings.push(Self::finding(
                    format!(
                        "prompt-injection phrasing (`{found}`)",
                        found = pattern.as_str()
                    ),
                    line.number,
                ));
            }

            if PIPE_TO_SHELL.is_match(line.text) {
                findings.push(Self::finding(
                    "download piped directly into a shell",
                    line.number,
                ));
            }

            if BASE64_DECODE_EXEC.is_match(line.text) || ECHO_BASE64_DECODE.is_match(line.text) {
                findings.push(Self::finding(
                    "base64-decode-and-execute pattern",
                    line.number,
                ));
            }

            if BASE64_RUN.is_match(line.text) {
                findings.push(Self::finding(
                    "contiguous base64-looking run of 200 or more characters",
                    line.number,
                ));
            }

            if HEX_ESCAPE_RUN.is_match(line.text) {
                findings.push(Self::finding(
                    "run of 20 or more consecutive hex escape sequences",
                    line.number,
                ));
            }
        }

        findings
    }
}
