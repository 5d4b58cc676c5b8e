//! Invisible characters, bidirectional overrides, and raw control
//! characters. Unlike the other scans, this one covers every line,
//! including fenced code blocks: a Trojan Source payload in a code
//! sample is exactly as dangerous as one in prose.

use super::{Category, MarkdownBody, Scan, SecurityFinding, scan_meta};

pub(crate) struct UnicodeAbuse;

scan_meta!(UnicodeAbuse, Category::UnicodeAbuse);

/// Zero-width and otherwise invisible characters.
const INVISIBLE: &[(char, &str)] = &[
    ('\u{200B}', "zero width space"),
    ('\u{200C}', "zero width non-joiner"),
    ('\u{200D}', "zero width joiner"),
    ('\u{FEFF}', "zero width no-break space"),
    ('\u{00AD}', "soft hyphen"),
    ('\u{2060}', "word joiner"),
];

fn describe(c: char) -> Option<String> {
    if let Some((_, name)) = INVISIBLE.iter().find(|(ch, _)| *ch == c) {
        return Some(format!(
            "invisible character U+{code:04X} ({name})",
            code = c as u32
        ));
    }

    if ('\u{202A}'..='\u{202E}').contains(&c) || ('\u{2066}'..='\u{2069}').contains(&c) {
        return Some(format!(
            "bidirectional override character U+{code:04X}",
            code = c as u32
        ));
    }

    if c.is_control() && !matches!(c, '\n' | '\r' | '\t') {
        return Some(format!("control character U+{code:04X}", code = c as u32));
    }

    None
}

impl Scan for UnicodeAbuse {
    fn scan(&self, body: &MarkdownBody<'_>) -> Vec<SecurityFinding> {
        let mut findings = vec![];

        for line in body.lines() {
            // One finding per line, describing the first offending
            // character, is enough to fail the compile.
            if let Some(description) = line.text.chars().find_map(describe) {
                findings.push(Self::finding(description, line.number));
            }
        }

        findings
    }
}
