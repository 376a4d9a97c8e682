//! In-process embeddings via fastembed.
//!
//! The model is downloaded from Hugging Face on first use and cached; after
//! that no network calls are made. Inference runs on a blocking thread.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

use risk_rag_core::embedding::{EmbedRole, EmbeddingProvider, PrefixPolicy};
use risk_rag_core::vector::DenseVector;

use crate::config::EmbeddingConfig;

const DEFAULT_LOCAL_MODEL: &str = "multilingual-e5-small";

pub struct LocalProvider {
    model_name: String,
    prefix: PrefixPolicy,
    batch_size: usize,
    model: OnceCell<Option<Arc<Mutex<fastembed::TextEmbedding>>>>,
}

impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            model_name: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string()),
            prefix: config.prefix_policy(),
            batch_size: config.batch_size.max(1),
            model: OnceCell::new(),
        }
    }

    /// Load the model once. A failed load is remembered so we do not retry
    /// a multi-hundred-megabyte download on every query.
    async fn model(&self) -> Option<Arc<Mutex<fastembed::TextEmbedding>>> {
        self.model
            .get_or_init(|| async {
                let Some(which) = to_fastembed_model(&self.model_name) else {
                    tracing::warn!(model = %self.model_name, "unknown local embedding model");
                    return None;
                };
                let loaded = tokio::task::spawn_blocking(move || {
                    fastembed::TextEmbedding::try_new(
                        fastembed::InitOptions::new(which).with_show_download_progress(false),
                    )
                })
                .await;
                match loaded {
                    Ok(Ok(model)) => Some(Arc::new(Mutex::new(model))),
                    Ok(Err(e)) => {
                        tracing::warn!(model = %self.model_name, error = %e, "failed to load local embedding model");
                        None
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "local model loader panicked");
                        None
                    }
                }
            })
            .await
            .clone()
    }

    async fn run(&self, inputs: Vec<String>) -> Option<Vec<DenseVector>> {
        let model = self.model().await?;
        let batch_size = self.batch_size;
        let expected = inputs.len();
        let result = tokio::task::spawn_blocking(move || {
            let mut guard = model.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            guard.embed(inputs, Some(batch_size))
        })
        .await;

        match result {
            Ok(Ok(vectors)) if vectors.len() == expected => Some(vectors),
            Ok(Ok(vectors)) => {
                tracing::warn!(expected, got = vectors.len(), "local model returned wrong count");
                None
            }
            Ok(Err(e)) => {
                tracing::warn!(model = %self.model_name, error = %e, "local embedding failed");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "local embedding task panicked");
                None
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn embed_one(&self, text: &str, role: EmbedRole) -> Option<DenseVector> {
        if text.trim().is_empty() {
            return None;
        }
        let input = vec![self.prefix.apply(text, role).into_owned()];
        self.run(input).await?.pop()
    }

    async fn embed_batch(&self, texts: &[String], role: EmbedRole) -> Option<Vec<Option<DenseVector>>> {
        let sendable: Vec<(usize, String)> = texts
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.trim().is_empty())
            .map(|(i, t)| (i, self.prefix.apply(t, role).into_owned()))
            .collect();

        let mut slots: Vec<Option<DenseVector>> = vec![None; texts.len()];
        if sendable.is_empty() {
            return Some(slots);
        }
        let inputs: Vec<String> = sendable.iter().map(|(_, t)| t.clone()).collect();
        let vectors = self.run(inputs).await?;
        for ((i, _), v) in sendable.iter().zip(vectors) {
            slots[*i] = Some(v);
        }
        Some(slots)
    }
}

fn to_fastembed_model(name: &str) -> Option<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Some(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Some(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Some(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-small-zh-v1.5" => Some(fastembed::EmbeddingModel::BGESmallZHV15),
        "multilingual-e5-small" => Some(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Some(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Some(fastembed::EmbeddingModel::MultilingualE5Large),
        _ => None,
    }
}
