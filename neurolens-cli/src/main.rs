//! neurolens-cli: command line client for a running Neurolens server
//!
//! Submits transcripts (as segment JSON files) and prints longitudinal reports.
//!
//! # Subcommands
//! - `status`                                       : show server health
//! - `analyze <segments.json> [--json]`             : features for one transcript
//! - `observe <subject> <segments.json> [--date D]` : record an observation
//! - `drift <subject> [--json]`                     : percent change against baseline
//! - `history <subject> [-n <limit>] [--json]`      : most recent observations
//! - `trend <subject> <field> [--json]`             : one feature across history
//! - `ci <subject> <field> [--iterations N] [--alpha A] [--seed S]`: bootstrap interval
//! - `reset <subject>`                              : clear the baseline

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::Value;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8767";
const DEFAULT_LIMIT: usize = 10;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "neurolens-cli",
    version,
    about = "Speech feature extraction and longitudinal drift tracking"
)]
struct Cli {
    /// Neurolens HTTP server URL (overrides NEUROLENS_HTTP_URL env var)
    #[arg(long, env = "NEUROLENS_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show Neurolens server status
    Status,

    /// List every subject with recorded observations
    Subjects {
        #[arg(long)]
        json: bool,
    },

    /// Extract features from a segment file without recording anything
    Analyze {
        /// JSON file: `{"segments": [...]}` or a bare segment array
        file: PathBuf,

        /// Print the raw server response
        #[arg(long)]
        json: bool,
    },

    /// Extract features and record them for a subject
    Observe {
        subject: String,

        /// JSON file: `{"segments": [...]}` or a bare segment array
        file: PathBuf,

        /// Observation date (YYYY-MM-DD); the server uses today when omitted
        #[arg(long)]
        date: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Compare a subject's latest observation with their baseline
    Drift {
        subject: String,

        #[arg(long)]
        json: bool,
    },

    /// List a subject's most recent observations
    History {
        subject: String,

        /// Maximum number of records to return
        #[arg(short = 'n', long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// Show one feature across a subject's history
    Trend {
        subject: String,

        /// Feature name, e.g. speech_speed
        field: String,

        #[arg(long)]
        json: bool,
    },

    /// Bootstrap confidence interval for the mean of one feature
    Ci {
        subject: String,

        field: String,

        #[arg(long)]
        iterations: Option<usize>,

        #[arg(long)]
        alpha: Option<f64>,

        /// Fixed seed for a reproducible interval
        #[arg(long)]
        seed: Option<u64>,

        #[arg(long)]
        json: bool,
    },

    /// Clear a subject's baseline; the next observation becomes the new one
    Reset { subject: String },
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct FeatureChange {
    pub field: String,
    pub baseline: f64,
    pub latest: f64,
    pub percent_change: f64,
}

#[derive(Debug, Deserialize)]
pub struct DriftResponse {
    pub subject: String,
    pub baseline_date: String,
    pub latest_date: String,
    pub changes: Vec<FeatureChange>,
}

#[derive(Debug, Deserialize)]
pub struct TrendPoint {
    pub date: String,
    pub value: f64,
}

#[derive(Debug, Deserialize)]
pub struct TrendResponse {
    pub subject: String,
    pub field: String,
    pub points: Vec<TrendPoint>,
}

#[derive(Debug, Deserialize)]
pub struct SubjectsResponse {
    pub subjects: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct IntervalResponse {
    pub subject: String,
    pub field: String,
    pub samples: usize,
    pub alpha: f64,
    pub lower: f64,
    pub upper: f64,
    pub mean: f64,
}

// ============================================================================
// Formatting (pure, tested)
// ============================================================================

pub fn format_subjects(list: &SubjectsResponse) -> String {
    if list.subjects.is_empty() {
        return "No subjects tracked yet\n".to_string();
    }
    let mut out = format!("{} subject(s):\n", list.subjects.len());
    for subject in &list.subjects {
        out.push_str(&format!("  {subject}\n"));
    }
    out
}

/// Aligned table of every feature change, baseline and latest side by side.
pub fn format_drift(drift: &DriftResponse) -> String {
    let width = drift
        .changes
        .iter()
        .map(|c| c.field.len())
        .max()
        .unwrap_or(0);
    let mut out = format!(
        "Subject {}: baseline {} → latest {}\n",
        drift.subject, drift.baseline_date, drift.latest_date
    );
    for c in &drift.changes {
        out.push_str(&format!(
            "  {:<width$}  {:>10.3}  {:>10.3}  {:>+8.1}%\n",
            c.field,
            c.baseline,
            c.latest,
            c.percent_change,
            width = width
        ));
    }
    out
}

/// Eight-level bar per value, scaled to the series range.
pub fn sparkline(values: &[f64]) -> String {
    const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
    let finite = values.iter().copied().filter(|v| v.is_finite());
    let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    values
        .iter()
        .map(|&v| {
            if !v.is_finite() {
                ' '
            } else if max - min <= f64::EPSILON {
                BARS[0]
            } else {
                let level = ((v - min) / (max - min) * 7.0).round() as usize;
                BARS[level.min(7)]
            }
        })
        .collect()
}

pub fn format_trend(trend: &TrendResponse) -> String {
    let values: Vec<f64> = trend.points.iter().map(|p| p.value).collect();
    let mut out = format!(
        "{} / {} ({} points) {}\n",
        trend.subject,
        trend.field,
        trend.points.len(),
        sparkline(&values)
    );
    for p in &trend.points {
        out.push_str(&format!("  {}  {:.3}\n", p.date, p.value));
    }
    out
}

pub fn format_interval(ci: &IntervalResponse) -> String {
    format!(
        "{} / {}: mean {:.3}, {:.0}% CI [{:.3}, {:.3}] over {} samples",
        ci.subject,
        ci.field,
        ci.mean,
        (1.0 - ci.alpha) * 100.0,
        ci.lower,
        ci.upper,
        ci.samples
    )
}

/// `name value` lines for a feature object.
pub fn format_features(features: &Value) -> String {
    let Some(map) = features.as_object() else {
        return String::new();
    };
    let width = map.keys().map(|k| k.len()).max().unwrap_or(0);
    map.iter()
        .map(|(k, v)| {
            format!(
                "  {:<width$}  {:.3}\n",
                k,
                v.as_f64().unwrap_or(f64::NAN),
                width = width
            )
        })
        .collect()
}

/// Server URL with extra path segments, each percent-encoded.
pub fn endpoint(server: &str, segments: &[&str]) -> anyhow::Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(server).with_context(|| format!("invalid server URL {server}"))?;
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("server URL cannot take a path: {server}"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

struct Client {
    server: String,
    http: reqwest::blocking::Client,
}

impl Client {
    fn new(server: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            server: server.to_string(),
            http,
        })
    }

    fn send(&self, req: reqwest::blocking::RequestBuilder, url: &reqwest::Url) -> anyhow::Result<Value> {
        let resp = req
            .send()
            .with_context(|| format!("connection failed to {url}"))?;
        let status = resp.status();
        let body: Value = resp.json().unwrap_or_default();
        if !status.is_success() {
            let msg = body["error"].as_str().unwrap_or("no error message");
            anyhow::bail!("server returned {status}: {msg}");
        }
        Ok(body)
    }

    fn get(&self, segments: &[&str], query: &[(&str, String)]) -> anyhow::Result<Value> {
        let url = endpoint(&self.server, segments)?;
        self.send(self.http.get(url.clone()).query(query), &url)
    }

    fn post(&self, segments: &[&str], body: &Value) -> anyhow::Result<Value> {
        let url = endpoint(&self.server, segments)?;
        self.send(self.http.post(url.clone()).json(body), &url)
    }

    fn delete(&self, segments: &[&str]) -> anyhow::Result<Value> {
        let url = endpoint(&self.server, segments)?;
        self.send(self.http.delete(url.clone()), &url)
    }
}

fn read_segments(path: &Path) -> anyhow::Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let value: Value =
        serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", path.display()))?;
    Ok(match value {
        Value::Array(_) => serde_json::json!({ "segments": value }),
        other => other,
    })
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_extraction(extraction: &Value) {
    print!("{}", format_features(&extraction["features"]));
    if let Some(degraded) = extraction["degraded"].as_array().filter(|d| !d.is_empty()) {
        let names: Vec<&str> = degraded.iter().filter_map(Value::as_str).collect();
        println!("Degraded: {} (dependent features are 0)", names.join(", "));
    }
}

fn do_status(client: &Client) -> anyhow::Result<()> {
    let body = client.get(&["health"], &[])?;
    let caps = &body["capabilities"];
    let flag = |name: &str| if caps[name].as_bool().unwrap_or(false) { "yes" } else { "no" };
    println!("Neurolens server: {}", body["status"].as_str().unwrap_or("unknown"));
    println!("Version:          {}", body["version"].as_str().unwrap_or("?"));
    println!(
        "Storage:          {} ({})",
        body["storage"]["backend"].as_str().unwrap_or("?"),
        body["storage"]["detail"].as_str().unwrap_or("?")
    );
    println!("Parser:           {}", flag("parser"));
    println!("Embedder:         {}", flag("embedder"));
    println!("Transcriber:      {}", flag("transcriber"));
    println!("Socket:           {}", body["socket"].as_str().unwrap_or("?"));
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let server = cli.server.trim_end_matches('/').to_string();
    let timeout = match cli.command {
        Commands::Status => 10,
        _ => 120,
    };
    let client = Client::new(&server, timeout)?;

    match cli.command {
        Commands::Status => do_status(&client),
        Commands::Subjects { json } => {
            let body = client.get(&["subjects"], &[])?;
            if json {
                return print_json(&body);
            }
            let list: SubjectsResponse = serde_json::from_value(body)?;
            print!("{}", format_subjects(&list));
            Ok(())
        }
        Commands::Analyze { file, json } => {
            let body = client.post(&["analyze"], &read_segments(&file)?)?;
            if json {
                return print_json(&body);
            }
            print_extraction(&body);
            Ok(())
        }
        Commands::Observe {
            subject,
            file,
            date,
            json,
        } => {
            let mut payload = read_segments(&file)?;
            if let Some(d) = date {
                payload["date"] = Value::String(d);
            }
            let body = client.post(&["subjects", &subject, "observations"], &payload)?;
            if json {
                return print_json(&body);
            }
            let created = body["baseline_created"].as_bool().unwrap_or(false);
            println!(
                "Recorded {} for {}{}",
                body["date"].as_str().unwrap_or("?"),
                subject,
                if created { " (new baseline)" } else { "" }
            );
            print_extraction(&body["extraction"]);
            Ok(())
        }
        Commands::Drift { subject, json } => {
            let body = client.get(&["subjects", &subject, "drift"], &[])?;
            if json {
                return print_json(&body);
            }
            let drift: DriftResponse = serde_json::from_value(body)?;
            print!("{}", format_drift(&drift));
            Ok(())
        }
        Commands::History {
            subject,
            limit,
            json,
        } => {
            let body = client.get(
                &["subjects", &subject, "history"],
                &[("limit", limit.to_string())],
            )?;
            if json {
                return print_json(&body);
            }
            let records = body["records"].as_array().cloned().unwrap_or_default();
            if records.is_empty() {
                eprintln!("No observations recorded for: {}", subject);
                return Ok(());
            }
            for record in &records {
                println!("{}", record["date"].as_str().unwrap_or("?"));
                print!("{}", format_features(&record["features"]));
            }
            Ok(())
        }
        Commands::Trend {
            subject,
            field,
            json,
        } => {
            let body = client.get(&["subjects", &subject, "trend", &field], &[])?;
            if json {
                return print_json(&body);
            }
            let trend: TrendResponse = serde_json::from_value(body)?;
            print!("{}", format_trend(&trend));
            Ok(())
        }
        Commands::Ci {
            subject,
            field,
            iterations,
            alpha,
            seed,
            json,
        } => {
            let mut query = Vec::new();
            if let Some(n) = iterations {
                query.push(("iterations", n.to_string()));
            }
            if let Some(a) = alpha {
                query.push(("alpha", a.to_string()));
            }
            if let Some(s) = seed {
                query.push(("seed", s.to_string()));
            }
            let body = client.get(&["subjects", &subject, "confidence", &field], &query)?;
            if json {
                return print_json(&body);
            }
            let ci: IntervalResponse = serde_json::from_value(body)?;
            println!("{}", format_interval(&ci));
            Ok(())
        }
        Commands::Reset { subject } => {
            let body = client.delete(&["subjects", &subject, "baseline"])?;
            if body["cleared"].as_bool().unwrap_or(false) {
                println!("Baseline cleared for {}", subject);
            } else {
                println!("{} had no baseline", subject);
            }
            Ok(())
        }
    }
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    if let Err(e) = run(Cli::parse()) {
        eprintln!("neurolens-cli: {:#}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
