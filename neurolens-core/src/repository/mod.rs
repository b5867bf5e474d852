//! Per-subject baseline and history storage.
//!
//! The repository only stores; ordering and at-most-once baseline creation across
//! concurrent callers are the tracker's job, which serializes writes per subject.

pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::StorageConfig;
use crate::error::NeurolensError;
use crate::features::FeatureVector;

pub use postgres::PgSubjectRepository;

/// A subject's reference measurement: the first vector recorded after creation or reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub features: FeatureVector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub recorded_on: NaiveDate,
    pub schema_version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub date: NaiveDate,
    pub schema_version: u32,
    pub features: FeatureVector,
}

#[async_trait]
pub trait SubjectRepository: Send + Sync {
    async fn baseline(&self, subject: &str) -> Result<Option<Baseline>, NeurolensError>;

    /// Append `record` to history and, in the same write, store `baseline` unless one
    /// exists. Either both land or neither does. Returns whether the baseline was stored.
    async fn record_observation(
        &self,
        subject: &str,
        baseline: &Baseline,
        record: &HistoryRecord,
    ) -> Result<bool, NeurolensError>;

    /// Drop the baseline; history is kept. Returns whether one existed.
    async fn clear_baseline(&self, subject: &str) -> Result<bool, NeurolensError>;

    /// History in arrival order, trimmed to the most recent `limit` entries when given.
    async fn history(
        &self,
        subject: &str,
        limit: Option<usize>,
    ) -> Result<Vec<HistoryRecord>, NeurolensError>;

    async fn subjects(&self) -> Result<Vec<String>, NeurolensError>;

    /// Short backend status line for health reporting.
    async fn health(&self) -> Result<String, NeurolensError>;

    fn name(&self) -> &str;
}

#[derive(Debug, Default)]
struct SubjectState {
    baseline: Option<Baseline>,
    history: Vec<HistoryRecord>,
}

#[derive(Debug, Default)]
pub struct InMemorySubjectRepository {
    subjects: DashMap<String, SubjectState>,
}

impl InMemorySubjectRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubjectRepository for InMemorySubjectRepository {
    async fn baseline(&self, subject: &str) -> Result<Option<Baseline>, NeurolensError> {
        Ok(self
            .subjects
            .get(subject)
            .and_then(|s| s.baseline.clone()))
    }

    async fn record_observation(
        &self,
        subject: &str,
        baseline: &Baseline,
        record: &HistoryRecord,
    ) -> Result<bool, NeurolensError> {
        let mut state = self.subjects.entry(subject.to_string()).or_default();
        let created = state.baseline.is_none();
        if created {
            state.baseline = Some(baseline.clone());
        }
        state.history.push(record.clone());
        Ok(created)
    }

    async fn clear_baseline(&self, subject: &str) -> Result<bool, NeurolensError> {
        Ok(self
            .subjects
            .get_mut(subject)
            .and_then(|mut s| s.baseline.take())
            .is_some())
    }

    async fn history(
        &self,
        subject: &str,
        limit: Option<usize>,
    ) -> Result<Vec<HistoryRecord>, NeurolensError> {
        Ok(self
            .subjects
            .get(subject)
            .map(|s| most_recent(&s.history, limit).to_vec())
            .unwrap_or_default())
    }

    async fn subjects(&self) -> Result<Vec<String>, NeurolensError> {
        let mut names: Vec<String> = self.subjects.iter().map(|e| e.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn health(&self) -> Result<String, NeurolensError> {
        Ok(format!("in-memory, {} subjects", self.subjects.len()))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Tail of `records` holding at most `limit` entries, order preserved.
pub fn most_recent<T>(records: &[T], limit: Option<usize>) -> &[T] {
    match limit {
        Some(n) if n < records.len() => &records[records.len() - n..],
        _ => records,
    }
}

/// Open the configured storage backend.
pub async fn open_repository(
    config: &StorageConfig,
) -> Result<Arc<dyn SubjectRepository>, NeurolensError> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(InMemorySubjectRepository::new())),
        "postgres" => Ok(Arc::new(PgSubjectRepository::connect(config).await?)),
        other => Err(NeurolensError::InvalidInput(format!(
            "unknown storage backend '{other}'"
        ))),
    }
}
