//! Candle cross-encoder for (query, passage) relevance.

use std::sync::Mutex;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::{Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tracing::{debug, info, warn};

use crate::config::{DevicePreference, RerankerModelConfig};
use crate::error::{ModelError, ModelResult};
use crate::model_locator::ModelLocator;
use crate::RerankerModel;

/// Pairs scored per forward pass.
const MAX_BATCH_SIZE: usize = 8;

/// BERT cross-encoder with a single-logit classifier head.
pub struct CandleRerankerModel {
    model_id: String,
    model: BertModel,
    classifier_weight: Tensor,
    classifier_bias: Tensor,
    tokenizer: Mutex<Tokenizer>,
    device: Device,
}

impl std::fmt::Debug for CandleRerankerModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleRerankerModel")
            .field("model_id", &self.model_id)
            .field("device", &self.device)
            .finish()
    }
}

unsafe impl Send for CandleRerankerModel {}
unsafe impl Sync for CandleRerankerModel {}

/// Token tensors for one batch of pairs, padded to the longest pair.
struct PairBatch {
    input_ids: Tensor,
    token_type_ids: Tensor,
    attention_mask: Tensor,
}

impl CandleRerankerModel {
    /// Load weights, classifier head and tokenizer from the configured path.
    pub fn new(config: &RerankerModelConfig) -> ModelResult<Self> {
        let model_path = config.effective_model_path();
        if !model_path.exists() {
            return Err(ModelError::ModelNotFound {
                model_id: config.model_id.clone(),
                path: model_path,
            });
        }
        ModelLocator::new().validate_model_dir(&model_path)?;

        let load_err = |e: &dyn std::fmt::Display| ModelError::model_load(&config.model_id, e.to_string());

        info!(
            "Loading reranker model '{}' from {:?}",
            config.model_id, model_path
        );

        let device = select_device(config.device)?;

        let bert_config: BertConfig = {
            let content = std::fs::read_to_string(model_path.join("config.json"))?;
            serde_json::from_str(&content)?
        };

        // SAFETY: the safetensors file is not modified while mapped.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[model_path.join("model.safetensors")], DType::F32, &device)
                .map_err(|e| load_err(&e))?
        };

        let model = BertModel::load(vb.clone(), &bert_config).map_err(|e| load_err(&e))?;
        let classifier_weight = vb
            .get((1, bert_config.hidden_size), "classifier.weight")
            .map_err(|e| load_err(&format!("classifier.weight: {}", e)))?;
        let classifier_bias = vb
            .get(1, "classifier.bias")
            .map_err(|e| load_err(&format!("classifier.bias: {}", e)))?;

        let mut tokenizer =
            Tokenizer::from_file(model_path.join("tokenizer.json")).map_err(|e| load_err(&e))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            pad_id: 0,
            pad_token: "[PAD]".to_string(),
            ..Default::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_length,
                ..Default::default()
            }))
            .map_err(|e| load_err(&e))?;

        info!("Reranker model loaded on {:?}", device);

        Ok(Self {
            model_id: config.model_id.clone(),
            model,
            classifier_weight,
            classifier_bias,
            tokenizer: Mutex::new(tokenizer),
            device,
        })
    }

    fn infer_err(&self, e: impl std::fmt::Display) -> ModelError {
        ModelError::reranking_failed(&self.model_id, e.to_string())
    }

    fn encode_pairs(&self, query: &str, passages: &[String]) -> ModelResult<PairBatch> {
        let encodings: Vec<Encoding> = {
            let tokenizer = self.tokenizer.lock().map_err(|e| self.infer_err(e))?;
            let pairs: Vec<(String, String)> = passages
                .iter()
                .map(|p| (query.to_string(), p.clone()))
                .collect();
            tokenizer
                .encode_batch(pairs, true)
                .map_err(|e| ModelError::tokenization(e.to_string()))?
        };

        let batch = encodings.len();
        let width = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);

        let mut ids = Vec::with_capacity(batch * width);
        let mut types = Vec::with_capacity(batch * width);
        let mut mask = Vec::with_capacity(batch * width);
        for enc in &encodings {
            let pad = width - enc.get_ids().len();
            ids.extend(enc.get_ids().iter().copied().chain(std::iter::repeat_n(0u32, pad)));
            types.extend(enc.get_type_ids().iter().copied().chain(std::iter::repeat_n(0u32, pad)));
            mask.extend(
                enc.get_attention_mask()
                    .iter()
                    .copied()
                    .chain(std::iter::repeat_n(0u32, pad)),
            );
        }

        let shape = (batch, width);
        Ok(PairBatch {
            input_ids: Tensor::from_vec(ids, shape, &self.device).map_err(|e| self.infer_err(e))?,
            token_type_ids: Tensor::from_vec(types, shape, &self.device)
                .map_err(|e| self.infer_err(e))?,
            attention_mask: Tensor::from_vec(mask, shape, &self.device)
                .map_err(|e| self.infer_err(e))?,
        })
    }

    /// Forward one chunk and read the classifier logit off the CLS token.
    fn score_chunk(&self, query: &str, passages: &[String]) -> ModelResult<Vec<f32>> {
        let batch = self.encode_pairs(query, passages)?;

        // [batch, seq, hidden]
        let hidden = self
            .model
            .forward(
                &batch.input_ids,
                &batch.token_type_ids,
                Some(&batch.attention_mask),
            )
            .map_err(|e| self.infer_err(e))?;

        // [batch, hidden]
        let cls = hidden
            .narrow(1, 0, 1)
            .and_then(|t| t.squeeze(1))
            .map_err(|e| self.infer_err(e))?;

        // [batch, hidden] x [hidden, 1] + bias -> [batch]
        let logits = self
            .classifier_weight
            .t()
            .and_then(|w| cls.matmul(&w))
            .and_then(|t| t.broadcast_add(&self.classifier_bias))
            .and_then(|t| t.squeeze(1))
            .map_err(|e| self.infer_err(e))?;

        logits.to_vec1().map_err(|e| self.infer_err(e))
    }
}

impl RerankerModel for CandleRerankerModel {
    fn score_batch(&self, query: &str, passages: &[String]) -> ModelResult<Vec<f32>> {
        if passages.is_empty() {
            return Ok(vec![]);
        }
        debug!("Scoring {} passages on {:?}", passages.len(), self.device);

        let mut scores = Vec::with_capacity(passages.len());
        for chunk in passages.chunks(MAX_BATCH_SIZE) {
            scores.extend(self.score_chunk(query, chunk)?);
        }
        Ok(scores)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Cross-encoder batch matmul is unreliable on Metal, so `Auto` stays on CPU.
fn select_device(preference: DevicePreference) -> ModelResult<Device> {
    match preference {
        DevicePreference::Auto | DevicePreference::Cpu => Ok(Device::Cpu),
        DevicePreference::Gpu => match try_gpu() {
            Some(device) => {
                warn!("Reranker using GPU on explicit request");
                Ok(device)
            }
            None => Err(ModelError::DeviceNotAvailable {
                reason: "no GPU backend compiled in or detected (build with --features metal or cuda)"
                    .to_string(),
            }),
        },
    }
}

fn try_gpu() -> Option<Device> {
    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => return Some(device),
            Err(e) => debug!("Metal not available: {}", e),
        }
    }

    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => return Some(device),
            Err(e) => debug!("CUDA not available: {}", e),
        }
    }

    None
}
