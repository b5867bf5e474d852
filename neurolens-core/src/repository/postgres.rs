use async_trait::async_trait;
use chrono::NaiveDate;
use pgvector::Vector;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;

use super::{Baseline, HistoryRecord, SubjectRepository};
use crate::config::StorageConfig;
use crate::error::NeurolensError;
use crate::features::FeatureVector;

const SCHEMA: [&str; 4] = [
    "CREATE EXTENSION IF NOT EXISTS vector",
    "CREATE TABLE IF NOT EXISTS subject_baselines (
        subject        TEXT PRIMARY KEY,
        features       JSONB NOT NULL,
        embedding      vector,
        recorded_on    DATE NOT NULL,
        schema_version INTEGER NOT NULL,
        created_at     TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS subject_history (
        id             BIGSERIAL PRIMARY KEY,
        subject        TEXT NOT NULL,
        observed_on    DATE NOT NULL,
        schema_version INTEGER NOT NULL,
        features       JSONB NOT NULL,
        created_at     TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE INDEX IF NOT EXISTS subject_history_subject_id_idx ON subject_history (subject, id)",
];

type BaselineRow = (Json<FeatureVector>, Option<Vector>, NaiveDate, i32);
type HistoryRow = (NaiveDate, i32, Json<FeatureVector>);

/// Postgres-backed repository: features as JSONB, baseline embedding as pgvector.
#[derive(Debug, Clone)]
pub struct PgSubjectRepository {
    pool: PgPool,
}

impl PgSubjectRepository {
    pub async fn connect(config: &StorageConfig) -> Result<Self, NeurolensError> {
        let pool = create_pool(config).await?;
        let repo = Self::from_pool(pool);
        repo.ensure_schema().await?;
        let pgvector = check_pgvector(&repo.pool).await?;
        tracing::info!(pgvector = %pgvector, "Subject store ready");
        Ok(repo)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ensure_schema(&self) -> Result<(), NeurolensError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

pub async fn create_pool(config: &StorageConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}

pub async fn check_pgvector(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) =
        sqlx::query_as("SELECT extversion FROM pg_extension WHERE extname = 'vector'")
            .fetch_one(pool)
            .await?;
    Ok(row.0)
}

fn schema_version(raw: i32) -> u32 {
    u32::try_from(raw).unwrap_or_default()
}

#[async_trait]
impl SubjectRepository for PgSubjectRepository {
    async fn baseline(&self, subject: &str) -> Result<Option<Baseline>, NeurolensError> {
        let row: Option<BaselineRow> = sqlx::query_as(
            "SELECT features, embedding, recorded_on, schema_version
             FROM subject_baselines WHERE subject = $1",
        )
        .bind(subject)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(features, embedding, recorded_on, version)| Baseline {
            features: features.0,
            embedding: embedding.map(|v| v.to_vec()),
            recorded_on,
            schema_version: schema_version(version),
        }))
    }

    async fn record_observation(
        &self,
        subject: &str,
        baseline: &Baseline,
        record: &HistoryRecord,
    ) -> Result<bool, NeurolensError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO subject_baselines (subject, features, embedding, recorded_on, schema_version)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (subject) DO NOTHING",
        )
        .bind(subject)
        .bind(Json(baseline.features))
        .bind(baseline.embedding.clone().map(Vector::from))
        .bind(baseline.recorded_on)
        .bind(baseline.schema_version as i32)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO subject_history (subject, observed_on, schema_version, features)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(subject)
        .bind(record.date)
        .bind(record.schema_version as i32)
        .bind(Json(record.features))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(inserted.rows_affected() == 1)
    }

    async fn clear_baseline(&self, subject: &str) -> Result<bool, NeurolensError> {
        let result = sqlx::query("DELETE FROM subject_baselines WHERE subject = $1")
            .bind(subject)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn history(
        &self,
        subject: &str,
        limit: Option<usize>,
    ) -> Result<Vec<HistoryRecord>, NeurolensError> {
        // newest first so LIMIT keeps the tail, then flip back to arrival order
        let limit = limit.map(|n| n.min(i64::MAX as usize) as i64);
        let mut rows: Vec<HistoryRow> = sqlx::query_as(
            "SELECT observed_on, schema_version, features
             FROM subject_history WHERE subject = $1
             ORDER BY id DESC
             LIMIT $2",
        )
        .bind(subject)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.reverse();

        Ok(rows
            .into_iter()
            .map(|(date, version, features)| HistoryRecord {
                date,
                schema_version: schema_version(version),
                features: features.0,
            })
            .collect())
    }

    async fn subjects(&self) -> Result<Vec<String>, NeurolensError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT subject FROM subject_baselines
             UNION
             SELECT subject FROM subject_history
             ORDER BY subject",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(s,)| s).collect())
    }

    async fn health(&self) -> Result<String, NeurolensError> {
        let pg = health_check(&self.pool).await?;
        let pgvector = check_pgvector(&self.pool).await?;
        Ok(format!("{pg}; pgvector {pgvector}"))
    }

    fn name(&self) -> &str {
        "postgres"
    }
}
