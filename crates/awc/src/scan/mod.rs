//! The Markdown security scanner.
//!
//! Workflow bodies are scanned before compilation for content that
//! could smuggle instructions or payloads past a human reviewer. Each
//! finding category lives in its own module; [`scan_markdown`] runs all
//! of them and returns findings in deterministic order.
//!
//! The metadata block is stripped before scanning; the recorded line
//! offset maps every finding back to its original file position.

use std::fmt;

use line_index::{LineIndex, TextSize};

pub(crate) mod embedded_files;
pub(crate) mod hidden_content;
pub(crate) mod html_abuse;
pub(crate) mod obfuscated_links;
pub(crate) mod social_engineering;
pub(crate) mod unicode_abuse;

use embedded_files::EmbeddedFiles;
use hidden_content::HiddenContent;
use html_abuse::HtmlAbuse;
use obfuscated_links::ObfuscatedLinks;
use social_engineering::SocialEngineering;
use unicode_abuse::UnicodeAbuse;

/// The finding categories.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Category {
    UnicodeAbuse,
    HiddenContent,
    ObfuscatedLinks,
    HtmlAbuse,
    EmbeddedFiles,
    SocialEngineering,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::UnicodeAbuse => "unicode-abuse",
            Category::HiddenContent => "hidden-content",
            Category::ObfuscatedLinks => "obfuscated-links",
            Category::HtmlAbuse => "html-abuse",
            Category::EmbeddedFiles => "embedded-files",
            Category::SocialEngineering => "social-engineering",
        }
    }

    /// Whether findings of this category fail the compile.
    /// `obfuscated-links` findings are advisory.
    pub fn fails_compile(self) -> bool {
        !matches!(self, Category::ObfuscatedLinks)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single scanner finding, positioned in the original file.
#[derive(Clone, Debug, PartialEq)]
pub struct SecurityFinding {
    pub category: Category,
    pub description: String,
    /// 1-based line number in the original file.
    pub line: usize,
}

/// A body line, classified by the fence tracker.
#[derive(Debug)]
pub(crate) struct Line<'doc> {
    /// 1-based line number in the original file.
    pub(crate) number: usize,
    pub(crate) text: &'doc str,
    /// Whether the line sits inside (or delimits) a fenced code block.
    pub(crate) in_code_block: bool,
}

/// The scanner's view of a workflow body: classified lines plus the raw
/// text for multi-line patterns.
pub(crate) struct MarkdownBody<'doc> {
    raw: &'doc str,
    offset: usize,
    lines: Vec<Line<'doc>>,
    index: LineIndex,
}

impl<'doc> MarkdownBody<'doc> {
    /// Classifies `body`, whose first line is original file line
    /// `offset + 1`.
    ///
    /// A fence is a line whose first non-whitespace content is three or
    /// more backticks or tildes, optionally followed by an info string.
    /// Only a bare fence (no info string) closes a block, regardless of
    /// which fence opened it.
    pub(crate) fn new(body: &'doc str, offset: usize) -> Self {
        let mut lines = Vec::new();
        let mut in_block = false;

        for (idx, text) in body.lines().enumerate() {
            let mut in_code_block = in_block;

            if let Some(info) = fence_info(text) {
                if !in_block {
                    in_block = true;
                } else if info.is_empty() {
                    in_block = false;
                }
                // Fence lines belong to the block they delimit. A fence
                // with an info string inside an open block is content.
                in_code_block = true;
            }

            lines.push(Line {
                number: offset + idx + 1,
                text,
                in_code_block,
            });
        }

        Self {
            raw: body,
            offset,
            lines,
            index: LineIndex::new(body),
        }
    }

    pub(crate) fn lines(&self) -> impl Iterator<Item = &Line<'doc>> {
        self.lines.iter()
    }

    /// Lines outside fenced code blocks (prose).
    pub(crate) fn prose_lines(&self) -> impl Iterator<Item = &Line<'doc>> {
        self.lines.iter().filter(|line| !line.in_code_block)
    }

    pub(crate) fn raw(&self) -> &'doc str {
        self.raw
    }

    /// Maps a byte offset in the raw body to an original file line.
    pub(crate) fn line_of_offset(&self, byte: usize) -> usize {
        let byte = byte.min(self.raw.len());
        let position = self.index.line_col(TextSize::new(byte as u32));
        self.offset + position.line as usize + 1
    }
}

/// Returns the info string when `text` is a fence line.
fn fence_info(text: &str) -> Option<&str> {
    let trimmed = text.trim_start();

    for marker in ['`', '~'] {
        let run = trimmed.len() - trimmed.trim_start_matches(marker).len();
        if run >= 3 {
            return Some(trimmed[run..].trim());
        }
    }

    None
}

/// A single scanner unit, producing findings for one category.
pub(crate) trait Scan {
    fn scan(&self, body: &MarkdownBody<'_>) -> Vec<SecurityFinding>;
}

/// Declares a scanner unit's category and gives it a finding
/// constructor.
macro_rules! scan_meta {
    ($t:ty, $category:expr) => {
        impl $t {
            pub(crate) const CATEGORY: crate::scan::Category = $category;

            pub(crate) fn finding(
                description: impl Into<String>,
                line: usize,
            ) -> crate::scan::SecurityFinding {
                crate::scan::SecurityFinding {
                    category: Self::CATEGORY,
                    description: description.into(),
                    line,
                }
            }
        }
    };
}

pub(crate) use scan_meta;

/// Runs every scanner unit over the body and returns all findings,
/// ordered by line (ties keep category registration order). The scan is
/// idempotent and deterministic.
pub fn scan_markdown(body: &str, offset: usize) -> Vec<SecurityFinding> {
    let body = MarkdownBody::new(body, offset);

    let mut findings = Vec::new();
    findings.extend(UnicodeAbuse.scan(&body));
    findings.extend(HiddenContent.scan(&body));
    findings.extend(ObfuscatedLinks.scan(&body));
    findings.extend(HtmlAbuse.scan(&body));
    findings.extend(EmbeddedFiles.scan(&body));
    findings.extend(SocialEngineering.scan(&body));

    findings.sort_by_key(|finding| finding.line);
    findings
}
