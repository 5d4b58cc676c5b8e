//! Action reference resolution.
//!
//! First-party runtime actions (membership checks, safe-output
//! handlers, the placeholder substituter) are referenced either as
//! local paths (dev mode, requires a checkout) or as pinned
//! `owner/repo/actions/<name>@<ref>` references (release mode).
//! Third-party actions are always pinned to known SHAs.

use std::collections::HashMap;
use std::sync::{LazyLock, RwLock};

use regex::Regex;

/// Pinned third-party actions used by generated workflows.
pub mod pinned {
    /// actions/checkout v4.2.2
    pub const CHECKOUT: &str = "actions/checkout@11bd71901bbe5b1630ceea73d27597364c9af683";
    /// actions/setup-node v4.1.0
    pub const SETUP_NODE: &str = "actions/setup-node@39370e3970a6d050c480ffad4ff0ed4d3fdee5af";
    /// actions/cache v4.1.2
    pub const CACHE: &str = "actions/cache@6849a6489940f00c2f30c0fb92c6274307ccb58a";
    /// actions/cache/restore v4.1.2
    pub const CACHE_RESTORE: &str =
        "actions/cache/restore@6849a6489940f00c2f30c0fb92c6274307ccb58a";
    /// actions/cache/save v4.1.2
    pub const CACHE_SAVE: &str = "actions/cache/save@6849a6489940f00c2f30c0fb92c6274307ccb58a";
    /// actions/github-script v7.0.4
    pub const GITHUB_SCRIPT: &str =
        "actions/github-script@60a0d83039c74a4aee543508d2ffcb1c3799cdea";
    /// actions/upload-artifact v4.4.3
    pub const UPLOAD_ARTIFACT: &str =
        "actions/upload-artifact@b4b15b8c7c6ac21ea08fcf65892d2ee8f75cf882";
    /// actions/download-artifact v4.1.8
    pub const DOWNLOAD_ARTIFACT: &str =
        "actions/download-artifact@fa0a91b85d4f404e444e00e005971372dc801d16";
}

/// The repository that hosts the first-party runtime actions.
const ACTIONS_REPO: &str = "githubnext/gh-aw";

/// How first-party action references are emitted.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ActionMode {
    /// Local paths (`./actions/<name>`); requires a checkout step.
    Dev,
    /// Pinned remote references.
    #[default]
    Release,
}

/// Resolves first-party action names to `uses:` references.
#[derive(Clone, Debug)]
pub struct ActionResolver {
    mode: ActionMode,
    /// Explicit CLI override for the ref.
    action_tag: Option<String>,
    /// The frontmatter `action-tag` feature value.
    frontmatter_tag: Option<String>,
    /// The compiler's own version string.
    version: String,
}

impl ActionResolver {
    pub fn new(
        mode: ActionMode,
        action_tag: Option<String>,
        frontmatter_tag: Option<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            mode,
            action_tag,
            frontmatter_tag,
            version: version.into(),
        }
    }

    /// The ref used in release mode: the explicit override wins, then
    /// the frontmatter feature, then the compiler version. A `dev`
    /// version yields nothing, forcing the local-path fallback.
    fn release_ref(&self) -> Option<&str> {
        self.action_tag
            .as_deref()
            .or(self.frontmatter_tag.as_deref())
            .or_else(|| (self.version != "dev").then_some(self.version.as_str()))
    }

    /// Resolves a first-party action name to its `uses:` reference.
    pub fn resolve(&self, name: &str) -> String {
        match self.mode {
            ActionMode::Dev => format!("./actions/{name}"),
            ActionMode::Release => match self.release_ref() {
                Some(tag) => format!("{ACTIONS_REPO}/actions/{name}@{tag}"),
                None => format!("./actions/{name}"),
            },
        }
    }

    /// Whether resolved references are local paths (and generated jobs
    /// using them therefore need a checkout step).
    pub fn uses_local_actions(&self) -> bool {
        match self.mode {
            ActionMode::Dev => true,
            ActionMode::Release => self.release_ref().is_none(),
        }
    }
}

static LOCKED_USES: LazyLock<Regex> = LazyLock::new(|| {
    // `uses: owner/repo[/path]@<sha>  # <tag>`
    Regex::new(r"(?m)^\s*(?:- )?uses:\s*([\w.-]+/[\w.-]+)(?:/[\w./-]+)?@([0-9a-f]{40})\s*#\s*(\S+)")
        .expect("static regex")
});

/// A shared `(repo, tag) → SHA` cache, populated from previously
/// compiled lock files. Reads dominate; the lock makes the cache safe
/// to share across parallel compilations.
#[derive(Debug, Default)]
pub struct ActionShaCache {
    inner: RwLock<HashMap<(String, String), String>>,
}

impl ActionShaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, repo: &str, tag: &str) -> Option<String> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.get(&(repo.to_string(), tag.to_string())).cloned()
    }

    pub fn insert(&self, repo: &str, tag: &str, sha: &str) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.insert((repo.to_string(), tag.to_string()), sha.to_string());
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Harvests pinned references from a compiled lock file. Duplicate
    /// references collapse onto one entry.
    pub fn record_from_lock(&self, lock: &str) {
        for capture in LOCKED_USES.captures_iter(lock) {
            let (repo, sha, tag) = (&capture[1], &capture[2], &capture[3]);
            self.insert(repo, tag, sha);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_dev_mode_resolves_local() {
        let resolver = ActionResolver::new(ActionMode::Dev, None, None, "1.2.3");
        assert_eq!(
            resolver.resolve("check-membership"),
            "./actions/check-membership"
        );
        assert!(resolver.uses_local_actions());
    }

    #[test]
    fn test_release_mode_uses_version() {
        let resolver = ActionResolver::new(ActionMode::Release, None, None, "1.2.3");
        assert_eq!(
            resolver.resolve("create-issue"),
            "githubnext/gh-aw/actions/create-issue@1.2.3"
        );
        assert!(!resolver.uses_local_actions());
    }

    #[test]
    fn test_tag_priority() {
        // Explicit override beats the frontmatter tag, which beats the
        // compiler version.
        let resolver = ActionResolver::new(
            ActionMode::Release,
            Some("v9".into()),
            Some("v5".into()),
            "1.2.3",
        );
        assert_eq!(
            resolver.resolve("x"),
            "githubnext/gh-aw/actions/x@v9"
        );

        let resolver = ActionResolver::new(ActionMode::Release, None, Some("v5".into()), "1.2.3");
        assert_eq!(resolver.resolve("x"), "githubnext/gh-aw/actions/x@v5");
    }

    #[test]
    fn test_dev_version_falls_back_to_local() {
        let resolver = ActionResolver::new(ActionMode::Release, None, None, "dev");
        assert_eq!(resolver.resolve("x"), "./actions/x");
        assert!(resolver.uses_local_actions());
    }

    #[test]
    fn test_sha_cache_round_trip() {
        let cache = ActionShaCache::new();
        assert!(cache.is_empty());

        cache.insert("actions/checkout", "v4", "11bd71901bbe5b1630ceea73d27597364c9af683");
        assert_eq!(
            cache.get("actions/checkout", "v4").as_deref(),
            Some("11bd71901bbe5b1630ceea73d27597364c9af683")
        );
        assert_eq!(cache.get("actions/checkout", "v5"), None);
    }

    #[test]
    fn test_record_from_lock_dedupes() {
        let lock = "\
jobs:
  a:
    steps:
      - uses: actions/checkout@11bd71901bbe5b1630ceea73d27597364c9af683 # v4.2.2
      - uses: actions/checkout@11bd71901bbe5b1630ceea73d27597364c9af683 # v4.2.2
      - uses: actions/cache/restore@6849a6489940f00c2f30c0fb92c6274307ccb58a # v4.1.2
";
        let cache = ActionShaCache::new();
        cache.record_from_lock(lock);

        assert_eq!(cache.len(), 2);
        assert_eq!(
            cache.get("actions/checkout", "v4.2.2").as_deref(),
            Some("11bd71901bbe5b1630ceea73d27597364c9af683")
        );
        // Subpath references cache under their repo slug.
        assert_eq!(
            cache.get("actions/cache", "v4.1.2").as_deref(),
            Some("6849a6489940f00c2f30c0fb92c6274307ccb58a")
        );
    }
}
