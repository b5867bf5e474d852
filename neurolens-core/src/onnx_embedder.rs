//! Local transcript embeddings via `all-MiniLM-L6-v2` on ONNX Runtime.
//!
//! The session is not reentrant, so calls are serialized behind a mutex and run on
//! the blocking pool.

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::capability::CapabilityError;
use crate::embeddings::{EmbeddingBackend, OnnxConfig};

const MODEL_STEM: &str = "all-MiniLM-L6-v2";

pub struct OnnxEmbeddingClient {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<tokenizers::Tokenizer>,
    dimensions: usize,
}

impl std::fmt::Debug for OnnxEmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbeddingClient")
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

impl OnnxEmbeddingClient {
    /// Load the model and tokenizer. Either file missing yields `ModelNotFound`.
    pub fn new(config: OnnxConfig) -> Result<Self, CapabilityError> {
        for required in [&config.model_path, &config.tokenizer_path] {
            if !required.exists() {
                return Err(CapabilityError::ModelNotFound {
                    path: required.display().to_string(),
                });
            }
        }

        let session = Session::builder()
            .and_then(|b| b.with_intra_threads(1))
            .and_then(|b| b.commit_from_file(&config.model_path))
            .map_err(|e| CapabilityError::OnnxInference(e.to_string()))?;

        let tokenizer = tokenizers::Tokenizer::from_file(&config.tokenizer_path)
            .map_err(|e| CapabilityError::Tokenizer(e.to_string()))?;

        tracing::info!(model = %config.model_path.display(), "Loaded ONNX embedding model");

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            dimensions: config.dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for OnnxEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>, CapabilityError> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let dimensions = self.dimensions;
        let text = text.to_string();

        let result = tokio::task::spawn_blocking(move || {
            let mut guard = session
                .lock()
                .map_err(|e| CapabilityError::OnnxInference(format!("session lock poisoned: {e}")))?;
            embed_sync(&mut guard, &tokenizer, &text, dimensions)
        })
        .await
        .map_err(|e| CapabilityError::OnnxInference(format!("spawn_blocking join error: {e}")))?;

        result.map(Some)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "onnx"
    }
}

fn onnx_err(e: impl std::fmt::Display) -> CapabilityError {
    CapabilityError::OnnxInference(e.to_string())
}

fn embed_sync(
    session: &mut Session,
    tokenizer: &tokenizers::Tokenizer,
    text: &str,
    expected_dims: usize,
) -> Result<Vec<f32>, CapabilityError> {
    let encoding = tokenizer
        .encode(text, true)
        .map_err(|e| CapabilityError::Tokenizer(e.to_string()))?;

    let to_i64 = |xs: &[u32]| xs.iter().map(|&x| x as i64).collect::<Vec<i64>>();
    let input_ids = to_i64(encoding.get_ids());
    let attention_mask = to_i64(encoding.get_attention_mask());
    let token_type_ids = to_i64(encoding.get_type_ids());

    let shape = vec![1i64, input_ids.len() as i64];
    let ids_tensor = Tensor::from_array((shape.clone(), input_ids)).map_err(onnx_err)?;
    let mask_tensor = Tensor::from_array((shape.clone(), attention_mask.clone())).map_err(onnx_err)?;
    let types_tensor = Tensor::from_array((shape, token_type_ids)).map_err(onnx_err)?;
    let inputs = ort::inputs! {
        "input_ids" => ids_tensor,
        "attention_mask" => mask_tensor,
        "token_type_ids" => types_tensor,
    };

    let outputs = session.run(inputs).map_err(onnx_err)?;

    // last_hidden_state: [1, seq_len, hidden]
    let (out_shape, data) = outputs[0].try_extract_tensor::<f32>().map_err(onnx_err)?;
    if out_shape.len() != 3 {
        return Err(CapabilityError::OnnxInference(format!(
            "Expected 3D output, got {}D",
            out_shape.len()
        )));
    }
    let hidden_dim = out_shape[2] as usize;

    let mut pooled = mean_pool(data, hidden_dim, &attention_mask);
    l2_normalize(&mut pooled);

    if pooled.len() != expected_dims {
        return Err(CapabilityError::InvalidDimensions {
            expected: expected_dims,
            actual: pooled.len(),
        });
    }
    Ok(pooled)
}

/// Attention-masked mean over token rows of a flat `[seq_len, hidden]` buffer.
fn mean_pool(hidden_states: &[f32], hidden_dim: usize, mask: &[i64]) -> Vec<f32> {
    let mut pooled = vec![0.0f32; hidden_dim];
    if hidden_dim == 0 {
        return pooled;
    }
    let mut weight = 0.0f32;
    for (row, &m) in hidden_states.chunks_exact(hidden_dim).zip(mask) {
        if m <= 0 {
            continue;
        }
        weight += m as f32;
        for (acc, &x) in pooled.iter_mut().zip(row) {
            *acc += x * m as f32;
        }
    }
    if weight > 0.0 {
        pooled.iter_mut().for_each(|v| *v /= weight);
    }
    pooled
}

fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// `$XDG_DATA_HOME/neurolens/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    let data_home = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".local/share")
        });
    data_home.join("neurolens/models")
}

/// Model and tokenizer paths; the tokenizer sits next to the model as `{stem}-tokenizer.json`.
pub fn resolve_onnx_paths(onnx_model_path: &str) -> (PathBuf, PathBuf) {
    let model = if onnx_model_path.is_empty() {
        default_model_dir().join(format!("{MODEL_STEM}.onnx"))
    } else {
        PathBuf::from(shellexpand::tilde(onnx_model_path).as_ref())
    };
    let stem = model
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| MODEL_STEM.to_string());
    let tokenizer = model.with_file_name(format!("{stem}-tokenizer.json"));
    (model, tokenizer)
}
