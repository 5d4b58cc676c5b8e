//! Link targets that hide where they really go: data and javascript
//! URIs, URL shorteners, raw IP addresses, credential-bearing query
//! strings, and double-encoded sequences.
//!
//! Findings in this category are advisory; they do not fail the
//! compile on their own (executable data URIs additionally surface as
//! `embedded-files`, which does).

use std::sync::LazyLock;

use regex::Regex;

use super::{Category, MarkdownBody, Scan, SecurityFinding, scan_meta};

pub(crate) struct ObfuscatedLinks;

scan_meta!(ObfuscatedLinks, Category::ObfuscatedLinks);

/// Markdown link/image targets and autolinks.
static LINK_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"!?\[[^\]]*\]\(\s*<?([^)\s>]+)[^)]*\)|<((?:https?|data|javascript)[^>\s]+)>"#)
        .expect("static regex")
});

static RAW_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s<>()\[\]]+").expect("static regex"));

static IPV4_HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}([:/]|$)").expect("static regex")
});

static SENSITIVE_QUERY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[?&](token|auth|key|secret|password|session)=").expect("static regex")
});

static DOUBLE_ENCODED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%25[0-9a-fA-F]{2}").expect("static regex"));

const URL_SHORTENERS: &[&str] = &[
    "bit.ly",
    "tinyurl.com",
    "t.co",
    "goo.gl",
    "ow.ly",
    "is.gd",
    "buff.ly",
    "rebrand.ly",
    "tiny.cc",
    "shorturl.at",
];

fn host_of(url: &str) -> Option<&str> {
    let rest = url.split_once("://")?.1;
    let host = rest.split(['/', '?', '#']).next()?;
    Some(host.split(':').next().unwrap_or(host))
}

fn check_target(target: &str, line: usize, findings: &mut Vec<SecurityFinding>) {
    let lowered = target.to_ascii_lowercase();

    if lowered.starts_with("data:") {
        findings.push(ObfuscatedLinks::finding(
            "link target is a data: URI",
            line,
        ));
    }

    if lowered.starts_with("javascript:") {
        findings.push(ObfuscatedLinks::finding(
            "link target uses the javascript: protocol",
            line,
        ));
    }

    if let Some(host) = host_of(&lowered) {
        if URL_SHORTENERS.contains(&host) {
            findings.push(ObfuscatedLinks::finding(
                format!("link goes through URL shortener {host}"),
                line,
            ));
        }
    }

    if IPV4_HOST.is_match(&lowered) {
        findings.push(ObfuscatedLinks::finding(
            "link target is a raw IP address",
            line,
        ));
    }

    if SENSITIVE_QUERY.is_match(target) {
        findings.push(ObfuscatedLinks::finding(
            "link carries a credential-like query parameter",
            line,
        ));
    }

    if DOUBLE_ENCODED.is_match(target) {
        findings.push(ObfuscatedLinks::finding(
            "link contains multiply-URL-encoded sequences",
            line,
        ));
    }
}

impl Scan for ObfuscatedLinks {
    fn scan(&self, body: &MarkdownBody<'_>) -> Vec<SecurityFinding> {
        let mut findings = vec![];

        for line in body.lines() {
            let mut seen_spans: Vec<(usize, usize)> = vec![];

            for capture in LINK_TARGET.captures_iter(line.text) {
                let target = capture
                    .get(1)
                    .or_else(|| capture.get(2))
                    .map(|m| (m.as_str(), m.start(), m.end()));
                if let Some((target, start, end)) = target {
                    seen_spans.push((start, end));
                    check_target(target, line.number, &mut findings);
                }
            }

            // Bare URLs outside explicit link syntax.
            for url in RAW_URL.find_iter(line.text) {
                let overlaps = seen_spans
                    .iter()
                    .any(|(start, end)| url.start() < *end && url.end() > *start);
                if !overlaps {
                    check_target(url.as_str(), line.number, &mut findings);
                }
            }
        }

        findings
    }
}
