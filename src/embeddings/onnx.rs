//! ONNX Runtime embedder for sentence-transformer style models

use super::similarity::l2_normalize;
use super::{EmbeddingModel, Embedder, Role};
use crate::error::{PipelineError, Result};
use ndarray::Array2;
use ort::{inputs, session::Session, value::Value};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;
use tracing::debug;

/// ONNX model limit for e5/bge/minilm
const MAX_TOKENS: usize = 512;

/// ONNX-based embedding generator
///
/// The session needs exclusive access per inference run, so it sits behind a
/// mutex; tokenization happens outside the lock.
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dimension: usize,
    model: EmbeddingModel,
}

/// Model and tokenizer locations for one model id under `models_dir`
///
/// Prefers `model_quantized.onnx` when present.
pub fn model_files(models_dir: &Path, model: EmbeddingModel) -> (PathBuf, PathBuf) {
    let dir = models_dir.join(model.id());
    let quantized = dir.join("model_quantized.onnx");
    let model_path = if quantized.exists() {
        quantized
    } else {
        dir.join("model.onnx")
    };
    (model_path, dir.join("tokenizer.json"))
}

fn backend<E: std::fmt::Display>(context: &'static str) -> impl FnOnce(E) -> PipelineError {
    move |e| PipelineError::embedding(format!("{}: {}", context, e))
}

impl OnnxEmbedder {
    /// Load the model files for `model` from `models_dir`
    pub fn from_models_dir(models_dir: &Path, model: EmbeddingModel) -> Result<Self> {
        let (model_path, tokenizer_path) = model_files(models_dir, model);
        Self::new_from_paths(&model_path, &tokenizer_path, model)
    }

    /// Create a new ONNX embedder from explicit paths
    ///
    /// # Arguments
    /// * `model_path` - Path to ONNX model file
    /// * `tokenizer_path` - Path to tokenizer.json file
    /// * `model` - Which built-in model these files are (sets dimension and prefixes)
    pub fn new_from_paths(model_path: &Path, tokenizer_path: &Path, model: EmbeddingModel) -> Result<Self> {
        let dimension = match (model.is_onnx(), model.dimension()) {
            (true, Some(dimension)) => dimension,
            _ => {
                return Err(PipelineError::InvalidConfig(format!(
                    "'{}' is not an ONNX embedding model",
                    model
                )))
            }
        };

        if !model_path.exists() {
            return Err(PipelineError::InvalidConfig(format!(
                "ONNX model not found at: {}\n\n\
                Download it into {} (model.onnx or model_quantized.onnx)",
                model_path.display(),
                model_path.parent().unwrap_or(model_path).display(),
            )));
        }

        if !tokenizer_path.exists() {
            return Err(PipelineError::InvalidConfig(format!(
                "Tokenizer not found at: {}",
                tokenizer_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(backend("failed to create ONNX session builder"))?
            .commit_from_file(model_path)
            .map_err(backend("failed to load ONNX model"))?;

        let mut tokenizer =
            Tokenizer::from_file(tokenizer_path).map_err(backend("failed to load tokenizer"))?;

        // Long chunks would otherwise overflow the position embeddings
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(backend("failed to configure truncation"))?;

        debug!(model = %model, path = %model_path.display(), "loaded onnx embedder");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimension,
            model,
        })
    }

    /// Tokenize text into input_ids and attention_mask
    fn tokenize(&self, text: &str) -> Result<(Vec<i64>, Vec<i64>)> {
        let encoding = self
            .tokenizer
            .encode(text, true) // Add special tokens ([CLS], [SEP])
            .map_err(backend("tokenization failed"))?;

        let input_ids = encoding.get_ids().iter().map(|&x| x as i64).collect();
        let attention_mask = encoding
            .get_attention_mask()
            .iter()
            .map(|&x| x as i64)
            .collect();

        Ok((input_ids, attention_mask))
    }

    /// Mean pooling - average token embeddings weighted by attention mask
    fn mean_pooling(&self, token_embeddings: &Array2<f32>, attention_mask: &[i64]) -> Vec<f32> {
        let mask_sum: f32 = attention_mask.iter().map(|&x| x as f32).sum();

        if mask_sum == 0.0 {
            return vec![0.0; self.dimension];
        }

        let mut pooled = vec![0.0; self.dimension];
        for (i, &mask) in attention_mask.iter().enumerate() {
            if mask == 1 && i < token_embeddings.nrows() {
                for (j, value) in pooled.iter_mut().enumerate() {
                    *value += token_embeddings[[i, j]];
                }
            }
        }

        pooled.iter().map(|&x| x / mask_sum).collect()
    }

    fn with_prefix(&self, role: Role, text: &str) -> String {
        match self.model.prefix(role) {
            Some(prefix) => format!("{}{}", prefix, text),
            None => text.to_string(),
        }
    }

    fn infer(&self, text: &str) -> Result<Vec<f32>> {
        let (input_ids, attention_mask) = self.tokenize(text)?;

        let seq_len = input_ids.len();
        let input_ids_array = Array2::from_shape_vec((1, seq_len), input_ids)
            .map_err(backend("failed to create input_ids array"))?;
        let attention_mask_array = Array2::from_shape_vec((1, seq_len), attention_mask.clone())
            .map_err(backend("failed to create attention_mask array"))?;
        // Token type IDs - all zeros for single-sentence embeddings
        let token_type_ids_array = Array2::from_shape_vec((1, seq_len), vec![0i64; seq_len])
            .map_err(backend("failed to create token_type_ids array"))?;

        let input_ids_value =
            Value::from_array(input_ids_array).map_err(backend("failed to build input tensor"))?;
        let attention_mask_value = Value::from_array(attention_mask_array)
            .map_err(backend("failed to build input tensor"))?;
        let token_type_ids_value = Value::from_array(token_type_ids_array)
            .map_err(backend("failed to build input tensor"))?;

        let token_embeddings = {
            let mut session = self.session.lock();
            let outputs = session
                .run(inputs![
                    "input_ids" => input_ids_value,
                    "attention_mask" => attention_mask_value,
                    "token_type_ids" => token_type_ids_value
                ])
                .map_err(backend("ONNX inference failed"))?;

            let (shape, data) = outputs["last_hidden_state"]
                .try_extract_tensor::<f32>()
                .map_err(backend("failed to extract last_hidden_state tensor"))?;

            // [batch_size=1, seq_len, hidden_dim]
            let shape_dims = shape.as_ref();
            if shape_dims.len() != 3 {
                return Err(PipelineError::embedding(format!(
                    "expected 3D tensor, got shape: {:?}",
                    shape_dims
                )));
            }

            let seq_len = shape_dims[1] as usize;
            let hidden_dim = shape_dims[2] as usize;
            if hidden_dim != self.dimension {
                return Err(PipelineError::DimensionMismatch {
                    expected: self.dimension,
                    actual: hidden_dim,
                });
            }

            let first_batch = data[0..seq_len * hidden_dim].to_vec();
            let token_embeddings = Array2::from_shape_vec((seq_len, hidden_dim), first_batch)
                .map_err(backend("failed to reshape token embeddings"))?;
            token_embeddings
        };

        let mut embedding = self.mean_pooling(&token_embeddings, &attention_mask);
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.infer(text)
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.infer(&self.with_prefix(Role::Query, text))
    }

    fn embed_passage(&self, text: &str) -> Result<Vec<f32>> {
        self.infer(&self.with_prefix(Role::Passage, text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        self.model.id()
    }
}
