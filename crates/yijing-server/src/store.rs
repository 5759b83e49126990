//! In-memory job store.
//!
//! [`JobStore`] is the only shared mutable state in the service. Every
//! mutation goes through [`JobStore::create`] or [`JobStore::update`]; both
//! take the write lock, so a reader never observes a half-applied update such
//! as an interpretation without `is_ready`, or the reverse.
//!
//! The store is an ordinary value: clone it to share, construct a fresh one in
//! each test. Jobs are never evicted.

use crate::{Error, Result, interpret::Interpretation};
use chrono::{DateTime, Utc};
use core::{fmt, str::FromStr};
use parking_lot::RwLock;
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use uuid::Uuid;
use yijing::Reading;

/// Opaque job token: a random 128-bit UUIDv4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Everything needed to open a job, supplied by the orchestrator.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub matter: String,
    pub hexagram: String,
    pub reading: Reading,
}

/// One divination tracked from pending to ready.
#[derive(Debug, Clone)]
pub struct Job {
    id: JobId,
    matter: String,
    hexagram: String,
    reading: Reading,
    interpretation: String,
    advice: String,
    is_ready: bool,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl Job {
    fn open(id: JobId, new: NewJob) -> Self {
        Self {
            id,
            matter: new.matter,
            hexagram: new.hexagram,
            reading: new.reading,
            interpretation: String::new(),
            advice: String::new(),
            is_ready: false,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Applies the terminal result.
    ///
    /// Returns `false` and leaves the job untouched if it is already ready;
    /// `is_ready` only ever moves from `false` to `true`.
    pub fn complete(&mut self, result: Interpretation) -> bool {
        if self.is_ready {
            return false;
        }
        self.interpretation = result.interpretation;
        self.advice = result.advice;
        self.is_ready = true;
        self.completed_at = Some(Utc::now());
        true
    }

    pub const fn id(&self) -> JobId {
        self.id
    }

    pub fn matter(&self) -> &str {
        &self.matter
    }

    pub fn hexagram(&self) -> &str {
        &self.hexagram
    }

    pub const fn reading(&self) -> &Reading {
        &self.reading
    }

    pub fn interpretation(&self) -> &str {
        &self.interpretation
    }

    pub fn advice(&self) -> &str {
        &self.advice
    }

    pub const fn is_ready(&self) -> bool {
        self.is_ready
    }

    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub const fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }
}

/// Shared, lock-guarded map from [`JobId`] to [`Job`].
#[derive(Debug, Clone, Default)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a pending job under a fresh random id.
    pub fn create(&self, new: NewJob) -> JobId {
        let mut jobs = self.jobs.write();
        // A v4 collision is astronomically unlikely, but never overwrite.
        let id = loop {
            let id = JobId::new_random();
            if !jobs.contains_key(&id) {
                break id;
            }
        };
        jobs.insert(id, Job::open(id, new));
        id
    }

    /// Returns a copy of the job.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no job has this id.
    pub fn get(&self, id: &JobId) -> Result<Job> {
        self.jobs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    /// Runs `f` against the job while holding the write lock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no job has this id; `f` is not called.
    pub fn update<R>(&self, id: &JobId, f: impl FnOnce(&mut Job) -> R) -> Result<R> {
        let mut jobs = self.jobs.write();
        let job = jobs.get_mut(id).ok_or_else(|| not_found(id))?;
        Ok(f(job))
    }

    /// The terminal update: marks the job ready with `result`.
    ///
    /// Returns `Ok(false)` if the job was already ready.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no job has this id.
    pub fn complete(&self, id: &JobId, result: Interpretation) -> Result<bool> {
        self.update(id, |job| job.complete(result))
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }

    /// Number of jobs still waiting for their interpretation.
    pub fn pending(&self) -> usize {
        self.jobs.read().values().filter(|job| !job.is_ready).count()
    }
}

fn not_found(id: &JobId) -> Error {
    Error::NotFound { id: id.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yijing::Line;

    fn new_job() -> NewJob {
        NewJob {
            matter: "career".into(),
            hexagram: "乾为天".into(),
            reading: Reading::new([Line::YoungYang; 6]),
        }
    }

    fn result(text: &str) -> Interpretation {
        Interpretation {
            interpretation: text.into(),
            advice: "建议：稳步前行。".into(),
        }
    }

    #[test]
    fn created_job_is_pending_and_empty() {
        let store = JobStore::new();
        let id = store.create(new_job());
        let job = store.get(&id).unwrap();

        assert_eq!(job.id(), id);
        assert!(!job.is_ready());
        assert!(job.interpretation().is_empty());
        assert!(job.advice().is_empty());
        assert_eq!(job.matter(), "career");
        assert_eq!(store.pending(), 1);
    }

    #[test]
    fn complete_is_monotonic() {
        let store = JobStore::new();
        let id = store.create(new_job());

        assert!(matches!(store.complete(&id, result("first")), Ok(true)));
        assert!(matches!(store.complete(&id, result("second")), Ok(false)));

        let job = store.get(&id).unwrap();
        assert!(job.is_ready());
        assert_eq!(job.interpretation(), "first");
        assert!(job.completed_at().is_some());
        assert_eq!(store.pending(), 0);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let store = JobStore::new();
        let id: JobId = "0b6f1c1e-8f0a-4a8e-9d7e-3c1c2b6a9f00".parse().unwrap();

        assert!(matches!(store.get(&id), Err(Error::NotFound { .. })));
        assert!(matches!(
            store.update(&id, |_| unreachable!()),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn ids_are_unique() {
        let store = JobStore::new();
        let ids: std::collections::HashSet<_> = (0..1000).map(|_| store.create(new_job())).collect();
        assert_eq!(ids.len(), 1000);
        assert_eq!(store.len(), 1000);
    }

    #[test]
    fn readers_never_see_torn_updates() {
        let store = JobStore::new();
        let id = store.create(new_job());

        std::thread::scope(|s| {
            for _ in 0..4 {
                let store = store.clone();
                s.spawn(move || {
                    for _ in 0..10_000 {
                        let job = store.get(&id).unwrap();
                        assert_eq!(job.is_ready(), !job.interpretation().is_empty());
                        assert_eq!(job.is_ready(), !job.advice().is_empty());
                    }
                });
            }
            s.spawn(|| {
                store.complete(&id, result("done")).unwrap();
            });
        });
    }
}
