//! Longitudinal tracking of a subject's feature vectors against their baseline.
//!
//! A subject is either untracked (no baseline) or tracked. The first recorded vector
//! becomes the baseline and stays fixed until an explicit [`LongitudinalTracker::reset_baseline`].
//! Writes for one subject run one at a time behind a per-subject async mutex, so history
//! keeps arrival order and the baseline is created at most once. Different subjects never
//! contend.

use chrono::NaiveDate;
use dashmap::DashMap;
use rand::Rng;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::TrackingConfig;
use crate::error::NeurolensError;
use crate::estimator::{bootstrap_confidence_interval, ConfidenceInterval};
use crate::extractor::{Extraction, FeatureExtractor};
use crate::features::{FeatureField, FeatureVector, FEATURE_SCHEMA_VERSION};
use crate::repository::{Baseline, HistoryRecord, SubjectRepository};
use crate::transcript::Segment;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RecordOutcome {
    pub date: NaiveDate,
    pub baseline_created: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Observation {
    pub subject: String,
    #[serde(flatten)]
    pub outcome: RecordOutcome,
    pub extraction: Extraction,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureChange {
    pub field: FeatureField,
    pub baseline: f64,
    pub latest: f64,
    pub percent_change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftReport {
    pub subject: String,
    pub baseline_date: NaiveDate,
    pub latest_date: NaiveDate,
    pub changes: Vec<FeatureChange>,
}

impl DriftReport {
    pub fn change(&self, field: FeatureField) -> Option<&FeatureChange> {
        self.changes.iter().find(|c| c.field == field)
    }
}

/// One line per field: `speech_speed: 1.000 (change -50.0%)`.
impl fmt::Display for DriftReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in &self.changes {
            writeln!(
                f,
                "{}: {:.3} (change {:+.1}%)",
                c.field, c.latest, c.percent_change
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// One field's values across history, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSeries {
    pub subject: String,
    pub field: FeatureField,
    pub points: Vec<TrendPoint>,
}

impl TrendSeries {
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.points.iter().map(|p| (p.date, p.value))
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldInterval {
    pub field: FeatureField,
    pub samples: usize,
    pub iterations: usize,
    pub alpha: f64,
    #[serde(flatten)]
    pub interval: ConfidenceInterval,
}

/// `(latest - baseline) / baseline * 100`, or 0 when the baseline is 0.
pub fn percent_change(baseline: f64, latest: f64) -> f64 {
    if baseline == 0.0 {
        0.0
    } else {
        (latest - baseline) / baseline * 100.0
    }
}

fn check_schema(found: u32) -> Result<(), NeurolensError> {
    if found == FEATURE_SCHEMA_VERSION {
        Ok(())
    } else {
        Err(NeurolensError::SchemaMismatch {
            expected: FEATURE_SCHEMA_VERSION,
            found,
        })
    }
}

fn validate_subject(subject: &str) -> Result<&str, NeurolensError> {
    let subject = subject.trim();
    if subject.is_empty() {
        return Err(NeurolensError::InvalidInput(
            "subject identifier must not be empty".to_string(),
        ));
    }
    Ok(subject)
}

pub struct LongitudinalTracker {
    repository: Arc<dyn SubjectRepository>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    config: TrackingConfig,
}

impl fmt::Debug for LongitudinalTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LongitudinalTracker")
            .field("repository", &self.repository.name())
            .field("subjects_locked", &self.locks.len())
            .finish()
    }
}

impl LongitudinalTracker {
    pub fn new(repository: Arc<dyn SubjectRepository>, config: TrackingConfig) -> Self {
        Self {
            repository,
            locks: DashMap::new(),
            config,
        }
    }

    pub fn repository(&self) -> &Arc<dyn SubjectRepository> {
        &self.repository
    }

    fn lock_for(&self, subject: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(subject.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Append a dated vector; the subject's first vector also becomes its baseline.
    pub async fn record(
        &self,
        subject: &str,
        features: FeatureVector,
        embedding: Option<Vec<f32>>,
        date: NaiveDate,
    ) -> Result<RecordOutcome, NeurolensError> {
        let subject = validate_subject(subject)?;
        let lock = self.lock_for(subject);
        let _guard = lock.lock().await;
        self.record_locked(subject, features, embedding, date).await
    }

    async fn record_locked(
        &self,
        subject: &str,
        features: FeatureVector,
        embedding: Option<Vec<f32>>,
        date: NaiveDate,
    ) -> Result<RecordOutcome, NeurolensError> {
        let baseline = Baseline {
            features,
            embedding,
            recorded_on: date,
            schema_version: FEATURE_SCHEMA_VERSION,
        };
        let record = HistoryRecord {
            date,
            schema_version: FEATURE_SCHEMA_VERSION,
            features,
        };
        let baseline_created = self
            .repository
            .record_observation(subject, &baseline, &record)
            .await?;
        if baseline_created {
            tracing::info!(subject = %subject, date = %date, "Baseline created");
        }
        tracing::debug!(subject = %subject, date = %date, "History record appended");

        Ok(RecordOutcome {
            date,
            baseline_created,
        })
    }

    /// Extract features against the stored baseline embedding, then record them.
    /// The subject stays locked for the whole call so drift is measured against the
    /// baseline the record will be compared to.
    pub async fn observe(
        &self,
        extractor: &FeatureExtractor,
        subject: &str,
        segments: &[Segment],
        date: NaiveDate,
    ) -> Result<Observation, NeurolensError> {
        let subject = validate_subject(subject)?;
        let lock = self.lock_for(subject);
        let _guard = lock.lock().await;

        let baseline = self.repository.baseline(subject).await?;
        let baseline_embedding = baseline.as_ref().and_then(|b| b.embedding.as_deref());
        let extraction = extractor.extract(segments, baseline_embedding).await;

        let outcome = self
            .record_locked(
                subject,
                extraction.features,
                extraction.embedding.clone(),
                date,
            )
            .await?;

        Ok(Observation {
            subject: subject.to_string(),
            outcome,
            extraction,
        })
    }

    /// Percent change of every field, latest record against baseline.
    pub async fn drift_report(&self, subject: &str) -> Result<DriftReport, NeurolensError> {
        let subject = validate_subject(subject)?;
        let lock = self.lock_for(subject);
        let _guard = lock.lock().await;
        let no_baseline = || NeurolensError::NoBaseline {
            subject: subject.to_string(),
        };

        let baseline = self.repository.baseline(subject).await?.ok_or_else(no_baseline)?;
        let latest = self
            .repository
            .history(subject, Some(1))
            .await?
            .pop()
            .ok_or_else(no_baseline)?;
        check_schema(baseline.schema_version)?;
        check_schema(latest.schema_version)?;

        let changes = FeatureField::ALL
            .into_iter()
            .map(|field| {
                let (b, l) = (baseline.features.get(field), latest.features.get(field));
                FeatureChange {
                    field,
                    baseline: b,
                    latest: l,
                    percent_change: percent_change(b, l),
                }
            })
            .collect();

        Ok(DriftReport {
            subject: subject.to_string(),
            baseline_date: baseline.recorded_on,
            latest_date: latest.date,
            changes,
        })
    }

    pub async fn trend_series(
        &self,
        subject: &str,
        field: FeatureField,
    ) -> Result<TrendSeries, NeurolensError> {
        let subject = validate_subject(subject)?;
        let history = {
            let lock = self.lock_for(subject);
            let _guard = lock.lock().await;
            self.repository.history(subject, None).await?
        };
        let points = history
            .iter()
            .map(|r| {
                check_schema(r.schema_version)?;
                Ok(TrendPoint {
                    date: r.date,
                    value: r.features.get(field),
                })
            })
            .collect::<Result<Vec<_>, NeurolensError>>()?;

        Ok(TrendSeries {
            subject: subject.to_string(),
            field,
            points,
        })
    }

    /// The most recent `limit` records (default: the configured window), oldest first.
    pub async fn recent_history(
        &self,
        subject: &str,
        limit: Option<usize>,
    ) -> Result<Vec<HistoryRecord>, NeurolensError> {
        let subject = validate_subject(subject)?;
        let limit = limit.unwrap_or(self.config.history_window);
        let lock = self.lock_for(subject);
        let _guard = lock.lock().await;
        self.repository.history(subject, Some(limit)).await
    }

    /// Forget the baseline; the next recorded vector becomes the new one.
    pub async fn reset_baseline(&self, subject: &str) -> Result<bool, NeurolensError> {
        let subject = validate_subject(subject)?;
        let lock = self.lock_for(subject);
        let _guard = lock.lock().await;
        let cleared = self.repository.clear_baseline(subject).await?;
        if cleared {
            tracing::info!(subject = %subject, "Baseline reset");
        }
        Ok(cleared)
    }

    /// Bootstrap interval for the mean of one field over the subject's history.
    /// `iterations` and `alpha` fall back to the configured defaults; iterations above
    /// `max_bootstrap_iterations` are rejected. Resampling runs on the blocking pool.
    pub async fn field_confidence_interval<R: Rng + Send + 'static>(
        &self,
        subject: &str,
        field: FeatureField,
        iterations: Option<usize>,
        alpha: Option<f64>,
        mut rng: R,
    ) -> Result<FieldInterval, NeurolensError> {
        let iterations = iterations.unwrap_or(self.config.bootstrap_iterations);
        let alpha = alpha.unwrap_or(self.config.bootstrap_alpha);
        if iterations > self.config.max_bootstrap_iterations {
            return Err(NeurolensError::InvalidInput(format!(
                "iterations {iterations} exceeds the limit of {}",
                self.config.max_bootstrap_iterations
            )));
        }

        let values = self.trend_series(subject, field).await?.values();
        let samples = values.len();
        let interval = tokio::task::spawn_blocking(move || {
            bootstrap_confidence_interval(&values, iterations, alpha, &mut rng)
        })
        .await
        .map_err(|e| NeurolensError::Other(format!("bootstrap task failed: {e}")))??;

        Ok(FieldInterval {
            field,
            samples,
            iterations,
            alpha,
            interval,
        })
    }

    /// Every subject with a baseline or history, sorted.
    pub async fn subjects(&self) -> Result<Vec<String>, NeurolensError> {
        self.repository.subjects().await
    }
}
