//! The job table: [`JobDefinition`] value objects and the ordered,
//! validated [`Schedule`] that holds them.

use std::collections::HashMap;
use std::path::Path;

use chronod_domain::Error;
use serde::{Deserialize, Serialize};

use crate::expression::{self, TimeExpression};

/// A single recurring job, as persisted and as validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    pub label: String,
    pub command: String,
    #[serde(default)]
    pub group_name: Option<String>,
    pub schedule: String,
    #[serde(default)]
    pub locking: bool,

    /// The compiled form of `schedule`. Not serialized; recomputed on load
    /// and on every validation so a form-edited job (schedule string
    /// changed but predicates not recompiled by the caller) is still caught.
    #[serde(skip)]
    pub predicates: Option<TimeExpression>,
}

impl JobDefinition {
    pub fn new(label: impl Into<String>, command: impl Into<String>, schedule: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            command: command.into(),
            group_name: None,
            schedule: schedule.into(),
            locking: false,
            predicates: None,
        }
    }

    /// Does this job's compiled expression accept the given minute?
    ///
    /// Panics if called before `compile` — callers always go through
    /// `Schedule::validate` first, which guarantees this invariant.
    pub fn matches(&self, t: &chrono::NaiveDateTime) -> bool {
        self.predicates
            .as_ref()
            .expect("predicates compiled during validation")
            .matches(t)
    }

    fn compile(&mut self) -> Result<(), Error> {
        self.predicates = Some(expression::compile(&self.schedule)?);
        Ok(())
    }
}

/// The serialized shape of the job table file: `[[job]] ...` array of
/// tables, the idiomatic TOML representation of `Vec<JobDefinition>`.
#[derive(Debug, Serialize, Deserialize)]
struct JobFile {
    #[serde(default, rename = "job")]
    jobs: Vec<JobDefinition>,
}

/// The ordered, validated collection of jobs currently in force, plus a
/// derived `label -> index` lookup.
///
/// Serializes as a bare job list (the label index is derived, not stored)
/// so it can travel as an HTTP request/response body; a deserialized value
/// is unvalidated until it passes through `Schedule::validate`.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    pub(crate) jobs: Vec<JobDefinition>,
    label_index: HashMap<String, usize>,
}

impl Serialize for Schedule {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.jobs.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Schedule {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let jobs = Vec::<JobDefinition>::deserialize(deserializer)?;
        Ok(Schedule::unvalidated(jobs))
    }
}

impl Schedule {
    pub fn new(jobs: Vec<JobDefinition>) -> Result<Self, Error> {
        let mut schedule = Self {
            jobs,
            label_index: HashMap::new(),
        };
        schedule.validate()?;
        Ok(schedule)
    }

    /// Build a Schedule without validating it yet. Used at the HTTP
    /// boundary: a proposed replacement is deserialized here and handed to
    /// the scheduler loop, which is the only thing that actually validates
    /// and installs it (see `ControlRequest::ReplaceSchedule`).
    pub fn unvalidated(jobs: Vec<JobDefinition>) -> Self {
        Self {
            jobs,
            label_index: HashMap::new(),
        }
    }

    pub fn jobs(&self) -> &[JobDefinition] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Re-validate every invariant, recompile every expression, and rebuild
    /// the label index. Invoked after initial load and before any proposed
    /// replacement is accepted.
    pub fn validate(&mut self) -> Result<(), Error> {
        let mut seen = HashMap::new();

        for (idx, job) in self.jobs.iter_mut().enumerate() {
            if job.label.trim().is_empty() {
                return Err(Error::ConfigInvalid(format!(
                    "job at index {idx} has an empty label"
                )));
            }
            if job.label.contains('_') {
                return Err(Error::ConfigInvalid(format!(
                    "label '{}' contains an underscore, which is reserved as a URL-safe space substitute",
                    job.label
                )));
            }
            if job.command.trim().is_empty() {
                return Err(Error::ConfigInvalid(format!(
                    "job '{}' has an empty command",
                    job.label
                )));
            }
            if seen.insert(job.label.clone(), idx).is_some() {
                return Err(Error::ConfigInvalid(format!(
                    "duplicate label '{}'",
                    job.label
                )));
            }
            job.compile()?;
        }

        self.label_index = seen;
        Ok(())
    }

    /// Exact match first; on miss, retry once after replacing underscores
    /// with spaces (URL path components escape space as underscore).
    pub fn find_by_label(&self, label: &str) -> Result<(&JobDefinition, usize), Error> {
        if let Some(&idx) = self.label_index.get(label) {
            return Ok((&self.jobs[idx], idx));
        }
        let despaced = label.replace('_', " ");
        if let Some(&idx) = self.label_index.get(&despaced) {
            return Ok((&self.jobs[idx], idx));
        }
        Err(Error::NotFound(label.to_string()))
    }

    pub fn label_index(&self) -> &HashMap<String, usize> {
        &self.label_index
    }

    /// Load a job table from a TOML file, validating it on the way in.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path)?;
        let file: JobFile = toml::from_str(&raw)?;
        Self::new(file.jobs)
    }

    /// Write the job table to `path`, preserving the prior file as a
    /// timestamped backup. On write failure, the backup is restored and the
    /// error surfaced; the caller's in-memory schedule is unaffected either
    /// way since persistence is not a transaction boundary.
    pub fn persist(&self, path: &Path) -> Result<(), Error> {
        let toml_text = toml::to_string_pretty(&JobFile {
            jobs: self.jobs.clone(),
        })?;

        let backup_path = if path.exists() {
            let unix_seconds = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            let mut backup = path.as_os_str().to_os_string();
            backup.push(format!(".backup{unix_seconds}"));
            let backup = std::path::PathBuf::from(backup);
            std::fs::rename(path, &backup)?;
            Some(backup)
        } else {
            None
        };

        match std::fs::write(path, toml_text) {
            Ok(()) => Ok(()),
            Err(write_err) => {
                if let Some(backup) = backup_path {
                    let _ = std::fs::rename(&backup, path);
                }
                Err(Error::Io(write_err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(label: &str, schedule: &str) -> JobDefinition {
        JobDefinition::new(label, "/bin/true", schedule)
    }

    #[test]
    fn validate_builds_label_index_bijection() {
        let schedule = Schedule::new(vec![
            job("alpha", "* * * * *"),
            job("beta", "0 * * * *"),
            job("gamma", "0 0 * * *"),
        ])
        .unwrap();

        let mut indices: Vec<usize> = schedule.label_index().values().copied().collect();
        indices.sort();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn duplicate_labels_are_rejected() {
        let err = Schedule::new(vec![job("backup", "* * * * *"), job("backup", "0 * * * *")])
            .unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid(_)));
    }

    #[test]
    fn empty_label_is_rejected() {
        let err = Schedule::new(vec![job("", "* * * * *")]).unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid(_)));
    }

    #[test]
    fn underscore_in_label_is_rejected() {
        let err = Schedule::new(vec![job("night_backup", "* * * * *")]).unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid(_)));
    }

    #[test]
    fn empty_command_is_rejected() {
        let mut j = job("alpha", "* * * * *");
        j.command = "   ".to_string();
        let err = Schedule::new(vec![j]).unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid(_)));
    }

    #[test]
    fn malformed_expression_is_rejected_at_schedule_level() {
        let err = Schedule::new(vec![job("alpha", "bogus")]).unwrap_err();
        assert!(matches!(err, Error::MalformedExpression { .. }));
    }

    #[test]
    fn find_by_label_exact_match() {
        let schedule = Schedule::new(vec![job("nightly backup", "* * * * *")]).unwrap();
        let (found, idx) = schedule.find_by_label("nightly backup").unwrap();
        assert_eq!(found.label, "nightly backup");
        assert_eq!(idx, 0);
    }

    #[test]
    fn find_by_label_retries_with_underscores_as_spaces() {
        let schedule = Schedule::new(vec![job("nightly backup", "* * * * *")]).unwrap();
        let (found, _) = schedule.find_by_label("nightly_backup").unwrap();
        assert_eq!(found.label, "nightly backup");
    }

    #[test]
    fn find_by_label_missing_is_not_found() {
        let schedule = Schedule::new(vec![job("alpha", "* * * * *")]).unwrap();
        assert!(matches!(
            schedule.find_by_label("does-not-exist"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn persist_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.toml");

        let schedule = Schedule::new(vec![job("alpha", "*/15 * * * *"), job("beta", "0 9 * * 1-5")])
            .unwrap();
        schedule.persist(&path).unwrap();

        let reloaded = Schedule::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.jobs()[0].label, "alpha");
        assert_eq!(reloaded.jobs()[1].schedule, "0 9 * * 1-5");
    }

    #[test]
    fn persist_backs_up_prior_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.toml");

        let first = Schedule::new(vec![job("alpha", "* * * * *")]).unwrap();
        first.persist(&path).unwrap();

        let second = Schedule::new(vec![job("beta", "0 * * * *")]).unwrap();
        second.persist(&path).unwrap();

        let backups: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("backup"))
            .collect();
        assert_eq!(backups.len(), 1);
    }
}
