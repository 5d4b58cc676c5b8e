//! The synthesized job graph: built-in jobs plus user jobs, with
//! dependency validation and cycle detection.

use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;

use crate::error::CompileError;
use crate::utils::parse_needs_field;

use super::{ACTIVATION_JOB, Job};

/// A user-authored job: opaque content, normalized dependencies.
#[derive(Clone, Debug)]
pub struct UserJob {
    pub name: String,
    pub needs: Vec<String>,
    /// The job body as written, minus `needs` (re-emitted from the
    /// normalized list).
    pub raw: serde_yaml::Mapping,
}

impl UserJob {
    /// Normalizes a user job: a missing `needs:` becomes
    /// `needs: activation`.
    pub fn new(name: &str, raw: &serde_yaml::Mapping) -> Result<Self, CompileError> {
        let mut needs = match raw.get("needs") {
            Some(value) => parse_needs_field(value).ok_or_else(|| {
                CompileError::validation(format!(
                    "job `{name}`: `needs` must be a job name or a list of job names"
                ))
            })?,
            None => vec![ACTIVATION_JOB.to_string()],
        };

        // Duplicate entries are legal YAML but would skew the
        // in-degree bookkeeping.
        let mut seen = HashSet::new();
        needs.retain(|need| seen.insert(need.clone()));

        Ok(Self {
            name: name.to_string(),
            needs,
            raw: raw.clone(),
        })
    }
}

/// A node in the synthesized graph.
#[derive(Clone, Debug)]
pub enum GraphJob {
    Builtin(Job),
    User(UserJob),
}

impl GraphJob {
    pub fn needs(&self) -> &[String] {
        match self {
            GraphJob::Builtin(job) => &job.needs,
            GraphJob::User(job) => &job.needs,
        }
    }
}

/// The full job graph, in insertion order.
#[derive(Debug, Default)]
pub struct JobGraph {
    pub jobs: IndexMap<String, GraphJob>,
}

impl JobGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_builtin(&mut self, job: Job) {
        self.jobs.insert(job.name.clone(), GraphJob::Builtin(job));
    }

    pub fn insert_user(&mut self, job: UserJob) {
        self.jobs.insert(job.name.clone(), GraphJob::User(job));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.jobs.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.jobs.keys().cloned().collect()
    }

    /// Every `needs:` edge must point at a job in the graph.
    pub fn validate_needs_exist(&self) -> Result<(), CompileError> {
        for (name, job) in &self.jobs {
            for need in job.needs() {
                if !self.jobs.contains_key(need) {
                    return Err(CompileError::validation(format!(
                        "job `{name}` depends on unknown job `{need}`"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Rejects dependency cycles, via an iterative Kahn traversal over
    /// the normalized adjacency map.
    pub fn check_acyclic(&self) -> Result<(), CompileError> {
        // In-degree of a job = the number of dependencies it declares.
        let mut in_degree: IndexMap<&str, usize> = self
            .jobs
            .iter()
            .map(|(name, job)| (name.as_str(), job.needs().len()))
            .collect();

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();

        let mut processed = 0;
        while let Some(ready) = queue.pop_front() {
            processed += 1;

            for (name, job) in &self.jobs {
                if job.needs().iter().any(|need| need == ready) {
                    let degree = in_degree
                        .get_mut(name.as_str())
                        .expect("every job has an in-degree entry");
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(name.as_str());
                    }
                }
            }
        }

        if processed < self.jobs.len() {
            let (name, job) = self
                .jobs
                .iter()
                .find(|(name, _)| in_degree.get(name.as_str()).copied().unwrap_or(0) > 0)
                .expect("a cycle leaves at least one job unprocessed");
            let need = job
                .needs()
                .first()
                .map(String::as_str)
                .unwrap_or_default();
            return Err(CompileError::validation(format!(
                "job dependency cycle detected involving `{name}` -> `{need}`"
            )));
        }

        Ok(())
    }

    /// The names of jobs that topologically precede activation:
    /// activation's transitive dependency closure.
    pub fn before_activation(&self) -> Vec<String> {
        let Some(activation) = self.jobs.get(ACTIVATION_JOB) else {
            return vec![];
        };

        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> =
            activation.needs().iter().map(String::as_str).collect();

        while let Some(name) = queue.pop_front() {
            if !seen.insert(name) {
                continue;
            }
            if let Some(job) = self.jobs.get(name) {
                queue.extend(job.needs().iter().map(String::as_str));
            }
        }

        // Deterministic order: graph insertion order.
        self.jobs
            .keys()
            .filter(|name| seen.contains(name.as_str()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::jobs::PRE_ACTIVATION_JOB;

    use super::*;

    fn builtin(name: &str, needs: &[&str]) -> Job {
        let mut job = Job::new(name);
        job.needs = needs.iter().map(|n| n.to_string()).collect();
        job
    }

    fn user(name: &str, needs: &[&str]) -> UserJob {
        let yaml = if needs.is_empty() {
            "runs-on: ubuntu-latest".to_string()
        } else {
            format!("needs: [{}]\nruns-on: ubuntu-latest", needs.join(", "))
        };
        let raw: serde_yaml::Mapping = serde_yaml::from_str(&yaml).unwrap();
        UserJob::new(name, &raw).unwrap()
    }

    #[test]
    fn test_user_job_default_needs_activation() {
        let job = user("deploy", &[]);
        assert_eq!(job.needs, vec![ACTIVATION_JOB]);
    }

    #[test]
    fn test_validate_needs_exist() {
        let mut graph = JobGraph::new();
        graph.insert_builtin(builtin(ACTIVATION_JOB, &[]));
        graph.insert_user(user("deploy", &["missing"]));

        let err = graph.validate_needs_exist().unwrap_err().to_string();
        assert!(err.contains("unknown job `missing`"));
    }

    #[test]
    fn test_acyclic_ok() {
        let mut graph = JobGraph::new();
        graph.insert_builtin(builtin(PRE_ACTIVATION_JOB, &[]));
        graph.insert_builtin(builtin(ACTIVATION_JOB, &[PRE_ACTIVATION_JOB]));
        graph.insert_builtin(builtin("agent", &[ACTIVATION_JOB]));
        graph.insert_user(user("deploy", &["agent"]));

        graph.check_acyclic().unwrap();
    }

    #[test]
    fn test_cycle_detected() {
        let mut graph = JobGraph::new();
        graph.insert_user(user("a", &["b"]));
        graph.insert_user(user("b", &["a"]));

        let err = graph.check_acyclic().unwrap_err().to_string();
        assert!(err.contains("cycle"), "got: {err}");
    }

    #[test]
    fn test_self_cycle_detected() {
        let mut graph = JobGraph::new();
        graph.insert_user(user("a", &["a"]));
        assert!(graph.check_acyclic().is_err());
    }

    #[test]
    fn test_before_activation_closure() {
        let mut graph = JobGraph::new();
        graph.insert_builtin(builtin(PRE_ACTIVATION_JOB, &[]));
        graph.insert_user(user("precompute", &[PRE_ACTIVATION_JOB]));
        graph.insert_builtin(builtin(
            ACTIVATION_JOB,
            &[PRE_ACTIVATION_JOB, "precompute"],
        ));
        graph.insert_builtin(builtin("agent", &[ACTIVATION_JOB]));
        graph.insert_user(user("config", &[PRE_ACTIVATION_JOB, ACTIVATION_JOB]));

        assert_eq!(
            graph.before_activation(),
            vec![PRE_ACTIVATION_JOB.to_string(), "precompute".to_string()]
        );
    }
}
