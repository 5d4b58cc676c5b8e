//! Extraction of `${{ … }}` spans from free-form text.

use std::ops::Range;

/// A single `${{ … }}` occurrence extracted from surrounding text.
#[derive(Debug, PartialEq)]
pub struct Extracted<'src> {
    raw: &'src str,
}

impl<'src> Extracted<'src> {
    /// Returns the extraction exactly as it appeared, fences included.
    pub fn as_raw(&self) -> &'src str {
        self.raw
    }

    /// Returns the inner expression, without fences, trimmed.
    pub fn as_bare(&self) -> &'src str {
        self.raw
            .strip_prefix("${{")
            .and_then(|inner| inner.strip_suffix("}}"))
            .expect("invariant violated: extraction is not fenced")
            .trim()
    }
}

/// Finds the next `${{ … }}` occurrence at or after `offset`.
///
/// The terminating `}}` is found with a quote-aware scan: a `}}` inside
/// a single-quoted string does not terminate the expression. An
/// unterminated `${{` yields `None`; callers treat it as literal text.
fn extract_expression(text: &str, offset: usize) -> Option<(Extracted<'_>, Range<usize>)> {
    let view = &text[offset..];
    let start = view.find("${{")?;

    let bytes = view.as_bytes();
    let mut in_string = false;
    let mut end = None;

    let mut idx = start + 3;
    while idx < bytes.len() {
        match bytes[idx] {
            b'\'' => in_string = !in_string,
            b'}' if !in_string && idx + 1 < bytes.len() && bytes[idx + 1] == b'}' => {
                end = Some(idx + 1);
                break;
            }
            _ => (),
        }
        idx += 1;
    }

    end.map(|end| {
        (
            Extracted {
                raw: &view[start..=end],
            },
            offset + start..offset + end + 1,
        )
    })
}

/// Extracts zero or more `${{ … }}` occurrences from the given text.
///
/// Returned ranges are byte ranges into `text`, in source order.
pub fn extract_expressions(text: &str) -> Vec<(Extracted<'_>, Range<usize>)> {
    let mut exprs = vec![];
    let mut offset = 0;

    while let Some((expr, span)) = extract_expression(text, offset) {
        offset = span.end;
        exprs.push((expr, span));

        if offset >= text.len() {
            break;
        }
    }

    exprs
}
