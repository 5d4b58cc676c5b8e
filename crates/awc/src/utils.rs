//! Helper routines shared across the compiler.

use serde_yaml::Value;

/// Sanitizes a workflow file stem into an identifier that is safe to use
/// in cache keys and environment values: lowercased, with every character
/// outside `[a-z0-9_-]` replaced by `-`.
pub fn sanitize_workflow_id(stem: &str) -> String {
    stem.to_ascii_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' | '-' => c,
            _ => '-',
        })
        .collect()
}

/// Normalizes a job or output name for use inside an environment variable
/// name: uppercased, with `-` (and anything else outside `[A-Z0-9_]`)
/// becoming `_`.
pub fn normalize_for_env(name: &str) -> String {
    name.to_ascii_uppercase()
        .chars()
        .map(|c| match c {
            'A'..='Z' | '0'..='9' => c,
            _ => '_',
        })
        .collect()
}

/// The environment variable that carries `needs.<job>.outputs.<output>`
/// into the activation prompt.
pub fn needs_env_name(job: &str, output: &str) -> String {
    format!(
        "GH_AW_NEEDS_{}_OUTPUTS_{}",
        normalize_for_env(job),
        normalize_for_env(output)
    )
}

/// Wraps `s` in single quotes for a POSIX shell, escaping interior
/// single quotes as `'\''`.
pub fn sh_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}

/// Returns the allow-listed candidate closest to `needle` within the
/// given Levenshtein distance, for `did you mean:` suggestions.
pub fn closest_match<'a>(
    needle: &str,
    candidates: impl IntoIterator<Item = &'a str>,
    max_distance: usize,
) -> Option<&'a str> {
    candidates
        .into_iter()
        .map(|candidate| (strsim::levenshtein(needle, candidate), candidate))
        .filter(|(distance, _)| *distance <= max_distance)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate)
}

/// Parses a `needs:` field value: a single job name or a list of names.
/// Already-normalized string arrays come back unchanged.
pub fn parse_needs_field(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) => Some(vec![s.clone()]),
        Value::Sequence(seq) => seq
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>(),
        _ => None,
    }
}

/// Converts a parsed YAML value into the emission model, preserving
/// mapping order. Used for user-authored pass-through content (custom
/// jobs, extra steps).
pub fn yaml_value_to_emit(value: &Value) -> yamlemit::Value {
    match value {
        Value::Null => yamlemit::Value::Null,
        Value::Bool(b) => yamlemit::Value::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                yamlemit::Value::Int(i)
            } else {
                yamlemit::Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => yamlemit::Value::Str(s.clone()),
        Value::Sequence(seq) => {
            yamlemit::Value::Seq(seq.iter().map(yaml_value_to_emit).collect())
        }
        Value::Mapping(map) => yamlemit::Value::Map(
            map.iter()
                .map(|(k, v)| {
                    let key = k
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| scalar_to_string(k).unwrap_or_default());
                    (key, yaml_value_to_emit(v))
                })
                .collect(),
        ),
        Value::Tagged(tagged) => yaml_value_to_emit(&tagged.value),
    }
}

/// Converts a YAML value into its JSON equivalent, for embedding
/// user-declared MCP server configs into generated JSON documents.
/// Non-string mapping keys stringify; tagged values collapse to their
/// inner value.
pub fn yaml_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                serde_json::Value::from(i)
            } else if let Some(f) = n.as_f64() {
                serde_json::Number::from_f64(f)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null)
            } else {
                serde_json::Value::Null
            }
        }
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Sequence(seq) => serde_json::Value::Array(seq.iter().map(yaml_to_json).collect()),
        Value::Mapping(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let key = k
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| scalar_to_string(k).unwrap_or_default());
                    (key, yaml_to_json(v))
                })
                .collect(),
        ),
        Value::Tagged(tagged) => yaml_to_json(&tagged.value),
    }
}

/// Interprets a YAML scalar as a string the way GitHub Actions does:
/// numbers and booleans stringify, null is empty.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}
