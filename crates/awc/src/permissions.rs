//! Permission scopes, levels, and merge rules.
//!
//! Safe outputs contribute fixed permission sets (see
//! [`crate::safe_outputs`]); user-declared permissions merge in by
//! taking the stronger level. A missing scope means "not requested".

use indexmap::IndexMap;
use itertools::Itertools as _;

use crate::error::CompileError;
use crate::utils::closest_match;

/// A single permission level. Ordered so that `write > read > none`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// No access.
    #[default]
    None,
    /// Read access.
    Read,
    /// Write access (implies read).
    Write,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::None => "none",
            Level::Read => "read",
            Level::Write => "write",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Level::None),
            "read" => Some(Level::Read),
            "write" => Some(Level::Write),
            _ => None,
        }
    }
}

/// Permission scopes GitHub accepts in a `permissions:` block.
const KNOWN_SCOPES: &[&str] = &[
    "actions",
    "attestations",
    "checks",
    "contents",
    "deployments",
    "discussions",
    "id-token",
    "issues",
    "models",
    "organization-projects",
    "packages",
    "pages",
    "pull-requests",
    "repository-projects",
    "security-events",
    "statuses",
];

/// A set of scope → level grants.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PermissionSet {
    scopes: IndexMap<String, Level>,
}

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from a static table, used for the per-safe-output
    /// contribution constants.
    pub fn of(grants: &[(&str, Level)]) -> Self {
        let mut set = Self::new();
        for (scope, level) in grants {
            set.grant(scope, *level);
        }
        set
    }

    /// Grants `level` on `scope`, keeping the stronger level when the
    /// scope is already present.
    pub fn grant(&mut self, scope: &str, level: Level) {
        let entry = self.scopes.entry(scope.to_string()).or_insert(level);
        *entry = (*entry).max(level);
    }

    /// Merges every grant of `other` into `self` by max level.
    pub fn union(&mut self, other: &PermissionSet) {
        for (scope, level) in &other.scopes {
            self.grant(scope, *level);
        }
    }

    pub fn get(&self, scope: &str) -> Option<Level> {
        self.scopes.get(scope).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Parses a user-declared `permissions:` block: either a mapping of
    /// scope to level, or the blanket `read-all` / `write-all` strings.
    pub fn parse(value: &serde_yaml::Value) -> Result<Self, CompileError> {
        match value {
            serde_yaml::Value::String(blanket) => {
                let level = match blanket.as_str() {
                    "read-all" => Level::Read,
                    "write-all" => Level::Write,
                    other => {
                        return Err(CompileError::validation(format!(
                            "invalid blanket permission `{other}` (expected `read-all` or `write-all`)"
                        )));
                    }
                };

                let mut set = Self::new();
                for scope in KNOWN_SCOPES {
                    set.grant(scope, level);
                }
                Ok(set)
            }
            serde_yaml::Value::Mapping(mapping) => {
                let mut set = Self::new();

                for (key, value) in mapping {
                    let scope = key.as_str().ok_or_else(|| {
                        CompileError::validation("permission scope must be a string")
                    })?;

                    if !KNOWN_SCOPES.contains(&scope) {
                        let mut message = format!("unknown permission scope `{scope}`");
                        if let Some(suggestion) =
                            closest_match(scope, KNOWN_SCOPES.iter().copied(), 2)
                        {
                            message.push_str(&format!(", did you mean: {suggestion}"));
                        }
                        return Err(CompileError::Validation(message));
                    }

                    let level = value
                        .as_str()
                        .and_then(Level::parse)
                        .ok_or_else(|| {
                            CompileError::validation(format!(
                                "invalid level for permission scope `{scope}` (expected read, write, or none)"
                            ))
                        })?;

                    set.grant(scope, level);
                }

                Ok(set)
            }
            _ => Err(CompileError::validation(
                "permissions must be a mapping or a blanket string",
            )),
        }
    }

    /// Renders the set as an emission value, with scopes in alphabetical
    /// order for deterministic output.
    pub fn to_value(&self) -> yamlemit::Value {
        let sorted: yamlemit::Mapping = self
            .scopes
            .iter()
            .sorted_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(scope, level)| (scope.clone(), yamlemit::Value::str(level.as_str())))
            .collect();

        yamlemit::Value::Map(sorted)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Level)> {
        self.scopes.iter().map(|(scope, level)| (scope.as_str(), *level))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Write > Level::Read);
        assert!(Level::Read > Level::None);
    }

    #[test]
    fn test_grant_keeps_stronger() {
        let mut set = PermissionSet::new();
        set.grant("issues", Level::Write);
        set.grant("issues", Level::Read);
        assert_eq!(set.get("issues"), Some(Level::Write));

        set.grant("contents", Level::Read);
        set.grant("contents", Level::Write);
        assert_eq!(set.get("contents"), Some(Level::Write));
    }

    #[test]
    fn test_union_is_max_merge() {
        let mut lhs = PermissionSet::of(&[("contents", Level::Read), ("issues", Level::Write)]);
        let rhs = PermissionSet::of(&[("contents", Level::Write), ("actions", Level::Read)]);
        lhs.union(&rhs);

        assert_eq!(lhs.get("contents"), Some(Level::Write));
        assert_eq!(lhs.get("issues"), Some(Level::Write));
        assert_eq!(lhs.get("actions"), Some(Level::Read));
    }

    #[test]
    fn test_parse_mapping() {
        let value: serde_yaml::Value =
            serde_yaml::from_str("{contents: read, issues: write}").unwrap();
        let set = PermissionSet::parse(&value).unwrap();
        assert_eq!(set.get("contents"), Some(Level::Read));
        assert_eq!(set.get("issues"), Some(Level::Write));
    }

    #[test]
    fn test_parse_unknown_scope_suggests() {
        let value: serde_yaml::Value = serde_yaml::from_str("{isues: write}").unwrap();
        let err = PermissionSet::parse(&value).unwrap_err().to_string();
        assert!(err.contains("did you mean: issues"), "got: {err}");
    }

    #[test]
    fn test_to_value_alphabetical() {
        let set = PermissionSet::of(&[("issues", Level::Write), ("contents", Level::Read)]);
        let rendered = yamlemit::render_value(&set.to_value());
        assert_eq!(rendered, "contents: read\nissues: write\n");
    }
}
