use chrono::{NaiveDate, Utc};
use neurolens_core::ipc::{NeurolensRequest, NeurolensResponse};
use neurolens_core::repository::{open_repository, SubjectRepository};
use neurolens_core::transcript::Segment;
use neurolens_core::{
    Capabilities, FeatureExtractor, LongitudinalTracker, NeurolensConfig, NeurolensError,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Process-wide state shared by the IPC and HTTP front ends.
pub struct AppState {
    pub config: NeurolensConfig,
    pub extractor: FeatureExtractor,
    pub tracker: LongitudinalTracker,
    analysis_slots: Semaphore,
}

impl AppState {
    pub fn new(
        config: NeurolensConfig,
        capabilities: Capabilities,
        repository: Arc<dyn SubjectRepository>,
    ) -> Self {
        let slots = match config.service.max_concurrent_analyses {
            0 => num_cpus::get(),
            n => n,
        };
        tracing::info!(slots, "Analysis concurrency bound");
        Self {
            extractor: FeatureExtractor::new(capabilities, config.features.clone()),
            tracker: LongitudinalTracker::new(repository, config.tracking.clone()),
            analysis_slots: Semaphore::new(slots),
            config,
        }
    }

    /// Load capabilities once and open the configured repository.
    pub async fn from_config(config: NeurolensConfig) -> Result<Self, NeurolensError> {
        let capabilities = Capabilities::load(&config);
        let repository = open_repository(&config.storage).await?;
        Ok(Self::new(config, capabilities, repository))
    }
}

pub async fn handle_request(request: NeurolensRequest, state: &AppState) -> NeurolensResponse {
    match dispatch(request, state).await {
        Ok(data) => NeurolensResponse::ok(data),
        Err(e) => {
            if !e.is_client_error() {
                tracing::error!(error = %e, "Request failed");
            }
            NeurolensResponse::err(e.to_string())
        }
    }
}

/// Execute one request; errors keep their kind so the HTTP layer can map status codes.
pub async fn dispatch(request: NeurolensRequest, state: &AppState) -> Result<Value, NeurolensError> {
    match request {
        NeurolensRequest::Ping => Ok(json!({"pong": true})),
        NeurolensRequest::Health => health(state).await,
        NeurolensRequest::Analyze { segments } => analyze(state, &segments).await,
        NeurolensRequest::Observe {
            subject,
            segments,
            date,
        } => observe(state, &subject, &segments, date).await,
        NeurolensRequest::ObserveAudio {
            subject,
            audio_path,
            date,
        } => {
            let audio = tokio::fs::read(&audio_path).await?;
            let segments = {
                let _permit = acquire(state).await?;
                state.extractor.transcribe(&audio).await?
            };
            tracing::info!(subject = %subject, segments = segments.len(), "Audio transcribed");
            observe(state, &subject, &segments, date).await
        }
        NeurolensRequest::DriftReport { subject } => {
            let report = state.tracker.drift_report(&subject).await?;
            let mut data = serde_json::to_value(&report)?;
            data["report"] = Value::String(report.to_string());
            Ok(data)
        }
        NeurolensRequest::Trend { subject, field } => {
            let series = state.tracker.trend_series(&subject, field).await?;
            Ok(serde_json::to_value(series)?)
        }
        NeurolensRequest::History { subject, limit } => {
            let records = state.tracker.recent_history(&subject, limit).await?;
            Ok(json!({
                "subject": subject,
                "count": records.len(),
                "records": records,
            }))
        }
        NeurolensRequest::ConfidenceInterval {
            subject,
            field,
            iterations,
            alpha,
            seed,
        } => {
            let rng = match seed {
                Some(s) => StdRng::seed_from_u64(s),
                None => StdRng::from_entropy(),
            };
            let ci = state
                .tracker
                .field_confidence_interval(&subject, field, iterations, alpha, rng)
                .await?;
            let mut data = serde_json::to_value(ci)?;
            data["subject"] = json!(subject);
            data["seeded"] = json!(seed.is_some());
            Ok(data)
        }
        NeurolensRequest::ResetBaseline { subject } => {
            let cleared = state.tracker.reset_baseline(&subject).await?;
            Ok(json!({"subject": subject, "cleared": cleared}))
        }
        NeurolensRequest::Subjects => {
            let subjects = state.tracker.subjects().await?;
            Ok(json!({"count": subjects.len(), "subjects": subjects}))
        }
    }
}

async fn acquire(state: &AppState) -> Result<tokio::sync::SemaphorePermit<'_>, NeurolensError> {
    state
        .analysis_slots
        .acquire()
        .await
        .map_err(|e| NeurolensError::Other(format!("analysis queue closed: {e}")))
}

async fn health(state: &AppState) -> Result<Value, NeurolensError> {
    let repository = state.tracker.repository();
    let storage = repository.health().await?;
    Ok(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "storage": {"backend": repository.name(), "detail": storage},
        "capabilities": state.extractor.capabilities().status(),
        "analysis_slots_free": state.analysis_slots.available_permits(),
    }))
}

async fn analyze(state: &AppState, segments: &[Segment]) -> Result<Value, NeurolensError> {
    let _permit = acquire(state).await?;
    let extraction = state.extractor.extract(segments, None).await;
    Ok(serde_json::to_value(extraction)?)
}

async fn observe(
    state: &AppState,
    subject: &str,
    segments: &[Segment],
    date: Option<NaiveDate>,
) -> Result<Value, NeurolensError> {
    let date = date.unwrap_or_else(|| Utc::now().date_naive());
    let _permit = acquire(state).await?;
    let observation = state
        .tracker
        .observe(&state.extractor, subject, segments, date)
        .await?;
    Ok(serde_json::to_value(observation)?)
}
