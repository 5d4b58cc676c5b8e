//! Cache-memory wiring.
//!
//! Without threat detection, the agent job uses the standard cache
//! action (save happens in its post step). With detection enabled, a
//! compromised agent must not be able to poison the cache: the agent
//! job only restores, uploads the directory as an artifact, and a
//! separate job persists it after detection reports success.

use yamlemit::Value;

use crate::actions::pinned;
use crate::error::CompileError;
use crate::workflow::{CacheMemoryConfig, CacheScope};

use super::{
    AGENT_JOB, CACHE_MEMORY_DIR, DETECTION_JOB, Job, StepBuilder, UPDATE_CACHE_MEMORY_JOB,
};

/// The cache key and its restore prefix. Keys are workflow-scoped by
/// default; repo scope drops the workflow discriminator.
pub fn cache_keys(config: &CacheMemoryConfig) -> (String, String) {
    let prefix = match (&config.key, config.scope) {
        (Some(key), _) => key.clone(),
        (None, CacheScope::Workflow) => "memory-${{ env.GH_AW_WORKFLOW_ID_SANITIZED }}".into(),
        (None, CacheScope::Repo) => "memory".into(),
    };

    (
        format!("{prefix}-${{{{ github.run_id }}}}"),
        format!("{prefix}-"),
    )
}

/// A bare `memory-` restore key would share cache entries across every
/// workflow in the repository; that is only legitimate when the cache
/// is explicitly repo-scoped.
pub fn validate(config: &CacheMemoryConfig) -> Result<(), CompileError> {
    let (_, restore_key) = cache_keys(config);

    if restore_key == "memory-" && config.scope != CacheScope::Repo {
        return Err(CompileError::validation(
            "cache-memory key `memory` requires `scope: repo`; workflow-scoped caches must keep the workflow discriminator",
        ));
    }

    Ok(())
}

/// The restore step placed in the agent job.
pub fn restore_step(config: &CacheMemoryConfig, detection_enabled: bool) -> Value {
    let (key, restore_key) = cache_keys(config);

    let action = if detection_enabled {
        pinned::CACHE_RESTORE
    } else {
        pinned::CACHE
    };

    StepBuilder::uses("Restore cache memory", action)
        .with("key", Value::str(key))
        .with("path", Value::str(CACHE_MEMORY_DIR))
        .with("restore-keys", Value::str(restore_key))
        .build()
}

/// The artifact upload placed in the agent job when detection gates
/// cache persistence.
pub fn upload_artifact_step() -> Value {
    StepBuilder::uses("Upload cache memory artifact", pinned::UPLOAD_ARTIFACT)
        .if_condition("always()")
        .with("name", Value::str("cache-memory"))
        .with("path", Value::str(CACHE_MEMORY_DIR))
        .build()
}

/// The `update_cache_memory` job: after detection succeeds, download
/// the artifact and persist it with the save action.
pub fn update_job(config: &CacheMemoryConfig) -> Job {
    let (key, _) = cache_keys(config);

    let mut job = Job::new(UPDATE_CACHE_MEMORY_JOB);
    job.needs = vec![AGENT_JOB.to_string(), DETECTION_JOB.to_string()];
    job.if_condition = Some(format!(
        "always() && needs.{DETECTION_JOB}.outputs.success == 'true'"
    ));
    job.timeout_minutes = Some(10);
    job.steps = vec![
        StepBuilder::uses("Download cache memory artifact", pinned::DOWNLOAD_ARTIFACT)
            .with("name", Value::str("cache-memory"))
            .with("path", Value::str(CACHE_MEMORY_DIR))
            .build(),
        StepBuilder::uses("Save cache memory", pinned::CACHE_SAVE)
            .with("key", Value::str(key))
            .with("path", Value::str(CACHE_MEMORY_DIR))
            .build(),
    ];

    job
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_default_keys_are_workflow_scoped() {
        let (key, restore) = cache_keys(&CacheMemoryConfig::default());
        assert_eq!(
            key,
            "memory-${{ env.GH_AW_WORKFLOW_ID_SANITIZED }}-${{ github.run_id }}"
        );
        assert_eq!(restore, "memory-${{ env.GH_AW_WORKFLOW_ID_SANITIZED }}-");
    }

    #[test]
    fn test_repo_scope_drops_discriminator() {
        let config = CacheMemoryConfig {
            key: None,
            scope: CacheScope::Repo,
        };
        let (key, restore) = cache_keys(&config);
        assert_eq!(key, "memory-${{ github.run_id }}");
        assert_eq!(restore, "memory-");
        validate(&config).unwrap();
    }

    #[test]
    fn test_bare_memory_key_requires_repo_scope() {
        let config = CacheMemoryConfig {
            key: Some("memory".into()),
            scope: CacheScope::Workflow,
        };
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_restore_step_action_selection() {
        let config = CacheMemoryConfig::default();

        let gated = restore_step(&config, true);
        let uses = gated.as_map().unwrap()["uses"].as_str().unwrap();
        assert!(uses.starts_with("actions/cache/restore@"));

        let inline = restore_step(&config, false);
        let uses = inline.as_map().unwrap()["uses"].as_str().unwrap();
        assert!(uses.starts_with("actions/cache@"));
    }

    #[test]
    fn test_update_job_shape() {
        let job = update_job(&CacheMemoryConfig::default());

        assert_eq!(job.needs, vec!["agent", "detection"]);
        assert_eq!(
            job.if_condition.as_deref(),
            Some("always() && needs.detection.outputs.success == 'true'")
        );

        let last = job.steps.last().unwrap().as_map().unwrap();
        assert!(
            last["uses"]
                .as_str()
                .unwrap()
                .starts_with("actions/cache/save@")
        );
    }
}
