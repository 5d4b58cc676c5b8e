//! Parsing and matching APIs for GitHub Actions expression contexts
//! (e.g. `github.event.issue.number`).

use crate::{Expr, Literal};

/// Represents a context in a GitHub Actions expression.
///
/// These typically look like `github.actor` or `needs.build.outputs.sha`,
/// although they can also be "call" contexts like `fromJSON(x).foo`, where
/// the head is a function call rather than an identifier.
#[derive(Debug, PartialEq)]
pub struct Context<'src> {
    raw: &'src str,
    /// The individual parts of the context.
    pub parts: Vec<Expr<'src>>,
}

impl<'src> Context<'src> {
    pub(crate) fn new(raw: &'src str, parts: Vec<Expr<'src>>) -> Self {
        Self { raw, parts }
    }

    /// Returns the context exactly as it appears in the source expression.
    pub fn as_raw(&self) -> &'src str {
        self.raw
    }

    /// Returns the head identifier of the context, if the head is an
    /// identifier (`github` in `github.actor`; `None` for call heads).
    pub fn head(&self) -> Option<&'src str> {
        match self.parts.first() {
            Some(Expr::Identifier(ident)) => Some(ident.0),
            _ => None,
        }
    }

    /// Returns whether the context matches the given pattern exactly.
    pub fn matches(&self, pattern: impl TryInto<ContextPattern<'src>>) -> bool {
        let Ok(pattern) = pattern.try_into() else {
            return false;
        };

        pattern.matches(self)
    }

    /// Returns whether the context is a child of the given pattern.
    ///
    /// A context is considered its own child, i.e. `foo.bar` is a child
    /// of `foo.bar`.
    pub fn child_of(&self, parent: impl TryInto<ContextPattern<'src>>) -> bool {
        let Ok(parent) = parent.try_into() else {
            return false;
        };

        parent.parent_of(self)
    }

    /// Return this context's "single tail," if it has one.
    ///
    /// Useful for contexts under `env` and `inputs`, where exactly one
    /// tail part is expected (`env.FOO`, `inputs['bar']`).
    pub fn single_tail(&self) -> Option<&str> {
        if self.parts.len() != 2 || !matches!(self.parts[0], Expr::Identifier(_)) {
            return None;
        }

        match &self.parts[1] {
            Expr::Identifier(ident) => Some(ident.as_str()),
            Expr::Index(idx) => match idx.as_ref() {
                Expr::Literal(Literal::String(key)) => Some(key.as_ref()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Returns the "pattern equivalent" of this context: a lowercase
    /// dotted form where string-literal indices become keys and computed
    /// indices become `*`.
    ///
    /// Returns `None` when the context has no sensible pattern form,
    /// e.g. when it starts with a call.
    pub fn as_pattern(&self) -> Option<String> {
        fn push_part(part: &Expr<'_>, pattern: &mut String) {
            match part {
                Expr::Identifier(ident) => pattern.push_str(ident.0),
                Expr::Star => pattern.push('*'),
                Expr::Index(idx) => match idx.as_ref() {
                    // foo['bar'] -> foo.bar
                    Expr::Literal(Literal::String(key)) => pattern.push_str(key),
                    // foo[0], foo[n], foo[f()] all become wildcards.
                    _ => pattern.push('*'),
                },
                _ => unreachable!("unexpected part in context pattern"),
            }
        }

        let mut parts = self.parts.iter();

        let head = parts.next()?;
        if matches!(head, Expr::Call { .. }) {
            return None;
        }

        let mut pattern = String::new();
        push_part(head, &mut pattern);
        for part in parts {
            pattern.push('.');
            push_part(part, &mut pattern);
        }

        pattern.make_ascii_lowercase();
        Some(pattern)
    }
}

enum Comparison {
    Child,
    Match,
}

/// A `ContextPattern` matches one or more contexts.
///
/// Patterns use a restricted subset of context syntax: always dotted,
/// containing only identifiers and `*` wildcards, where the head segment
/// must be an identifier. Contexts containing indices can still be
/// matched: `github.event.assignees.*.name` matches the context
/// `github.event.assignees[0].name`.
#[derive(Copy, Clone, Debug)]
pub struct ContextPattern<'src>(&'src str);

impl<'src> TryFrom<&'src str> for ContextPattern<'src> {
    type Error = InvalidPattern;

    fn try_from(val: &'src str) -> Result<Self, InvalidPattern> {
        Self::try_new(val).ok_or(InvalidPattern)
    }
}

/// The error returned for syntactically invalid context patterns.
#[derive(Debug, thiserror::Error)]
#[error("invalid context pattern")]
pub struct InvalidPattern;

impl<'src> ContextPattern<'src> {
    /// Creates a new [`ContextPattern`], panicking if the pattern is
    /// invalid. Intended for static pattern tables.
    pub const fn new(pattern: &'src str) -> Self {
        match Self::try_new(pattern) {
            Some(pattern) => pattern,
            None => panic!("invalid context pattern; use try_new to handle errors"),
        }
    }

    /// Creates a new [`ContextPattern`], returning `None` if the pattern
    /// is invalid.
    pub const fn try_new(pattern: &'src str) -> Option<Self> {
        let bytes = pattern.as_bytes();

        // Segments are '.'-separated; each is either a lone `*` or a
        // non-empty run of [A-Za-z0-9_-]. The head segment must be an
        // identifier, not a wildcard.
        let mut idx = 0;
        let mut seg_len = 0usize;
        let mut seg_is_star = false;
        let mut head = true;

        while idx < bytes.len() {
            match bytes[idx] {
                b'.' => {
                    if seg_len == 0 {
                        return None;
                    }
                    head = false;
                    seg_len = 0;
                    seg_is_star = false;
                }
                b'*' => {
                    if head || seg_len != 0 {
                        return None;
                    }
                    seg_is_star = true;
                    seg_len = 1;
                }
                c if c.is_ascii_alphanumeric() || c == b'_' || c == b'-' => {
                    if seg_is_star {
                        return None;
                    }
                    seg_len += 1;
                }
                _ => return None,
            }

            idx += 1;
        }

        if seg_len == 0 {
            // Empty pattern, or a trailing dot.
            return None;
        }

        Some(Self(pattern))
    }

    /// Returns the pattern's source string.
    pub fn as_str(&self) -> &'src str {
        self.0
    }

    fn compare_part(pattern: &str, part: &Expr<'src>) -> bool {
        if pattern == "*" {
            return true;
        }

        match part {
            Expr::Identifier(ident) => pattern.eq_ignore_ascii_case(ident.0),
            Expr::Index(idx) => match idx.as_ref() {
                Expr::Literal(Literal::String(key)) => pattern.eq_ignore_ascii_case(key),
                _ => false,
            },
            _ => false,
        }
    }

    fn compare(&self, ctx: &Context<'src>) -> Option<Comparison> {
        let mut pattern_parts = self.0.split('.').peekable();
        let mut ctx_parts = ctx.parts.iter().peekable();

        while let (Some(pattern), Some(part)) = (pattern_parts.peek(), ctx_parts.peek()) {
            if !Self::compare_part(pattern, part) {
                return None;
            }

            pattern_parts.next();
            ctx_parts.next();
        }

        match (pattern_parts.next(), ctx_parts.next()) {
            (None, None) => Some(Comparison::Match),
            (None, Some(_)) => Some(Comparison::Child),
            _ => None,
        }
    }

    /// Returns true if the given context is a child of the pattern.
    ///
    /// This is a loose relationship: `foo` is its own parent, as well as
    /// the parent of `foo.bar` and `foo.bar.baz`.
    pub fn parent_of(&self, ctx: &Context<'src>) -> bool {
        matches!(
            self.compare(ctx),
            Some(Comparison::Child | Comparison::Match)
        )
    }

    /// Returns true if the given context exactly matches the pattern.
    pub fn matches(&self, ctx: &Context<'src>) -> bool {
        matches!(self.compare(ctx), Some(Comparison::Match))
    }
}
