//! Deterministic YAML document construction and emission.
//!
//! This crate provides an insertion-ordered [`Value`] model and a writer
//! with fully deterministic output rules: mappings emit in insertion
//! order, multiline strings emit as block-literal-strip scalars (`|-`),
//! and scalars that a YAML parser would reinterpret (numbers, booleans,
//! `null`, `on`/`off`) always emit quoted. Emitting the same document
//! twice yields byte-identical text.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use std::fmt::Write as _;

use indexmap::IndexMap;

/// An insertion-ordered YAML mapping.
pub type Mapping = IndexMap<String, Value>;

/// A YAML value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// The null value.
    Null,
    /// A boolean.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A string.
    Str(String),
    /// A sequence.
    Seq(Vec<Value>),
    /// A mapping, in insertion order.
    Map(Mapping),
}

impl Value {
    /// Convenience constructor for [`Value::Str`].
    pub fn str(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }

    /// Returns the contained string, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the contained mapping, if this is a mapping value.
    pub fn as_map(&self) -> Option<&Mapping> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Returns a mutable reference to the contained mapping, if this is
    /// a mapping value.
    pub fn as_map_mut(&mut self) -> Option<&mut Mapping> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Int(n.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(seq: Vec<Value>) -> Self {
        Self::Seq(seq)
    }
}

impl From<Mapping> for Value {
    fn from(map: Mapping) -> Self {
        Self::Map(map)
    }
}

impl<V: Into<Value>> FromIterator<(String, V)> for Value {
    fn from_iter<T: IntoIterator<Item = (String, V)>>(iter: T) -> Self {
        Self::Map(iter.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

/// A YAML document: leading full-line comments plus a root value.
#[derive(Clone, Debug, Default)]
pub struct Document {
    comments: Vec<String>,
    root: Mapping,
}

impl Document {
    /// Creates a document with the given root mapping.
    pub fn new(root: Mapping) -> Self {
        Self {
            comments: vec![],
            root,
        }
    }

    /// Appends a leading `# …` comment line.
    pub fn push_comment(&mut self, comment: impl Into<String>) {
        self.comments.push(comment.into());
    }

    /// Renders the document to its canonical textual form.
    pub fn render(&self) -> String {
        let mut out = String::new();

        for comment in &self.comments {
            if comment.is_empty() {
                out.push_str("#\n");
            } else {
                let _ = writeln!(out, "# {comment}");
            }
        }

        if !self.comments.is_empty() {
            out.push('\n');
        }

        emit_mapping(&mut out, &self.root, 0);
        out
    }
}

/// Renders a single value as a standalone document fragment.
///
/// This exists mostly for tests; real documents go through [`Document`].
pub fn render_value(value: &Value) -> String {
    let mut out = String::new();
    match value {
        Value::Map(map) => emit_mapping(&mut out, map, 0),
        Value::Seq(seq) => emit_sequence(&mut out, seq, 0),
        scalar => {
            out.push_str(&scalar_repr(scalar));
            out.push('\n');
        }
    }
    out
}

const INDENT: usize = 2;

fn pad(out: &mut String, indent: usize) {
    for _ in 0..indent {
        out.push(' ');
    }
}

fn emit_mapping(out: &mut String, map: &Mapping, indent: usize) {
    for (key, value) in map {
        pad(out, indent);
        out.push_str(&key_repr(key));
        out.push(':');
        emit_entry_value(out, value, indent);
    }
}

fn emit_sequence(out: &mut String, seq: &[Value], indent: usize) {
    for item in seq {
        pad(out, indent);
        out.push('-');
        match item {
            Value::Map(map) if !map.is_empty() => {
                // The first entry shares the dash line; the rest align
                // under it.
                let mut entries = map.iter();
                let (key, value) = entries.next().expect("checked non-empty");

                out.push(' ');
                out.push_str(&key_repr(key));
                out.push(':');
                emit_entry_value(out, value, indent + INDENT);

                let rest: Mapping = entries.map(|(k, v)| (k.clone(), v.clone())).collect();
                emit_mapping(out, &rest, indent + INDENT);
            }
            Value::Seq(inner) if !inner.is_empty() => {
                out.push('\n');
                emit_sequence(out, inner, indent + INDENT);
            }
            other => {
                out.push(' ');
                emit_scalar_inline(out, other, indent);
            }
        }
    }
}

/// Emits the value of a `key:` entry, starting immediately after the
/// colon (the caller has already emitted `key:`).
fn emit_entry_value(out: &mut String, value: &Value, indent: usize) {
    match value {
        // Null entries emit as a bare `key:`, the conventional form for
        // GitHub workflow triggers.
        Value::Null => {
            out.push('\n');
        }
        Value::Map(map) if !map.is_empty() => {
            out.push('\n');
            emit_mapping(out, map, indent + INDENT);
        }
        Value::Seq(seq) if !seq.is_empty() => {
            out.push('\n');
            emit_sequence(out, seq, indent + INDENT);
        }
        other => {
            out.push(' ');
            emit_scalar_inline(out, other, indent);
        }
    }
}

/// Emits a scalar (or empty collection) in value position, including the
/// trailing newline. Multiline strings become `|-` block literals whose
/// lines are indented one level past the key.
fn emit_scalar_inline(out: &mut String, value: &Value, indent: usize) {
    if let Value::Str(s) = value {
        if s.contains('\n') && block_literal_safe(s) {
            out.push_str("|-\n");
            for line in s.trim_end_matches('\n').split('\n') {
                if line.is_empty() {
                    out.push('\n');
                } else {
                    pad(out, indent + INDENT);
                    out.push_str(line);
                    out.push('\n');
                }
            }
            return;
        }
    }

    out.push_str(&scalar_repr(value));
    out.push('\n');
}

/// Whether a multiline string can be represented exactly as a `|-`
/// block literal: no line may carry leading/trailing whitespace that the
/// indentation indicator would misinterpret, and the content must not
/// end with interior blank structure the strip indicator would destroy.
fn block_literal_safe(s: &str) -> bool {
    let stripped = s.trim_end_matches('\n');
    if stripped.contains('\r') {
        return false;
    }
    match stripped.split('\n').next() {
        Some(first) => !first.starts_with(' ') && !first.starts_with('\t'),
        None => false,
    }
}

fn key_repr(key: &str) -> String {
    if plain_safe(key) {
        key.into()
    } else {
        double_quoted(key)
    }
}

fn scalar_repr(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(b) => b.to_string(),
        Value::Int(n) => n.to_string(),
        // {:?} keeps a trailing `.0` so floats re-parse as floats.
        Value::Float(f) => format!("{f:?}"),
        Value::Seq(seq) => {
            debug_assert!(seq.is_empty());
            "[]".into()
        }
        Value::Map(map) => {
            debug_assert!(map.is_empty());
            "{}".into()
        }
        Value::Str(s) => {
            if plain_safe(s) {
                s.into()
            } else {
                double_quoted(s)
            }
        }
    }
}

/// Whether a string can be emitted as a plain (unquoted) scalar without
/// any YAML parser reinterpreting it.
fn plain_safe(s: &str) -> bool {
    if s.is_empty() || looks_numeric(s) || looks_like_keyword(s) {
        return false;
    }

    let first = s.chars().next().expect("checked non-empty");
    if "!&*?|>%@`\"'#,[]{}:- ".contains(first) {
        return false;
    }

    !(s.ends_with(' ')
        || s.ends_with(':')
        || s.contains(": ")
        || s.contains(" #")
        || s.contains('\t')
        || s.contains('\n')
        || s.chars().any(char::is_control))
}

/// Whether a YAML parser would read this string as a number. Covers
/// decimal ints and floats, exponents, hex/octal forms, and the special
/// float names. Such strings always emit quoted.
fn looks_numeric(s: &str) -> bool {
    let body = s.strip_prefix(['+', '-']).unwrap_or(s);
    if body.is_empty() {
        return false;
    }

    if matches!(body, ".inf" | ".Inf" | ".INF" | ".nan" | ".NaN" | ".NAN") {
        return true;
    }

    if let Some(hex) = body.strip_prefix("0x") {
        return !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit());
    }
    if let Some(oct) = body.strip_prefix("0o") {
        return !oct.is_empty() && oct.bytes().all(|b| (b'0'..=b'7').contains(&b));
    }

    // [digits][.digits][(e|E)[+|-]digits]
    let mut rest = body;
    let leading = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    rest = &rest[leading..];

    let mut frac = 0;
    if let Some(after) = rest.strip_prefix('.') {
        frac = after.len() - after.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        rest = &after[frac..];
    }

    if leading == 0 && frac == 0 {
        return false;
    }

    if let Some(exp) = rest.strip_prefix(['e', 'E']) {
        let exp = exp.strip_prefix(['+', '-']).unwrap_or(exp);
        return !exp.is_empty() && exp.bytes().all(|b| b.is_ascii_digit());
    }

    rest.is_empty()
}

/// Keyword-ish strings that YAML 1.1 parsers reinterpret: booleans,
/// null forms, and the `on`/`off`/`yes`/`no` family (GitHub workflow
/// keys include `on`, which always emits quoted).
fn looks_like_keyword(s: &str) -> bool {
    matches!(
        s.to_ascii_lowercase().as_str(),
        "true" | "false" | "null" | "~" | "yes" | "no" | "on" | "off"
    )
}

fn double_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
