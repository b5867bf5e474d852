use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::features::FeatureField;
use crate::transcript::Segment;

pub const PROTOCOL_VERSION: &str = "neurolens/1";

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NeurolensRequest {
    Ping,
    Health,
    /// Features for one transcript, no subject bookkeeping.
    Analyze {
        segments: Vec<Segment>,
    },
    Observe {
        subject: String,
        segments: Vec<Segment>,
        /// Defaults to today (UTC).
        date: Option<NaiveDate>,
    },
    /// Transcribe a local audio file, then observe it.
    ObserveAudio {
        subject: String,
        audio_path: String,
        date: Option<NaiveDate>,
    },
    DriftReport {
        subject: String,
    },
    Trend {
        subject: String,
        field: FeatureField,
    },
    History {
        subject: String,
        limit: Option<usize>,
    },
    ConfidenceInterval {
        subject: String,
        field: FeatureField,
        iterations: Option<usize>,
        alpha: Option<f64>,
        /// Fixed seed for a reproducible interval.
        seed: Option<u64>,
    },
    ResetBaseline {
        subject: String,
    },
    /// Every tracked subject, sorted.
    Subjects,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NeurolensResponse {
    pub status: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub version: String,
}

impl NeurolensResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: "ok".to_string(),
            data: Some(data),
            error: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(msg.into()),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}
