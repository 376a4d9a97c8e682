//! Concrete embedding providers.
//!
//! Implements the core [`EmbeddingProvider`] trait for:
//! - **[`RemoteProvider`]**: an OpenAI-compatible `/v1/embeddings` endpoint
//!   with batching, bounded retries and a fixed backoff.
//! - **[`LocalProvider`]**: an in-process fastembed model (feature
//!   `local-embeddings-fastembed`), loaded once on first use.
//!
//! # Provider Selection
//!
//! [`create_provider`] never fails on a missing backend. It downgrades
//! instead and logs why:
//!
//! ```text
//! local  ──(feature off)──▶ remote ──(no credential)──▶ disabled
//! ```
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: fixed `backoff_ms` between attempts, `max_retries` retries
//!
//! Every failure is logged and turned into `None` at the trait boundary.

#[cfg(feature = "local-embeddings-fastembed")]
mod local;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use risk_rag_core::embedding::{EmbedRole, EmbeddingProvider, NoEmbeddings, PrefixPolicy};
use risk_rag_core::vector::DenseVector;

use crate::config::EmbeddingConfig;

#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalProvider;

const DEFAULT_REMOTE_MODEL: &str = "text-embedding-3-small";

// ============ Remote Provider ============

/// Embedding provider for any OpenAI-compatible HTTP endpoint.
///
/// Calls `POST {base_url}/v1/embeddings` with a bearer credential.
pub struct RemoteProvider {
    model: String,
    endpoint: String,
    api_key: String,
    prefix: PrefixPolicy,
    batch_size: usize,
    max_retries: u32,
    backoff: Duration,
    client: reqwest::Client,
}

impl RemoteProvider {
    /// Create a remote provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_REMOTE_MODEL.to_string()),
            endpoint: format!("{}/v1/embeddings", config.base_url.trim_end_matches('/')),
            api_key,
            prefix: config.prefix_policy(),
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.backoff_ms),
            client,
        })
    }

    /// One embeddings request with retry; vectors come back in input order.
    async fn request(&self, inputs: &[String]) -> Result<Vec<DenseVector>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": inputs,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.backoff).await;
            }

            let resp = self
                .client
                .post(&self.endpoint)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_embeddings_response(&json, inputs.len());
                    }

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        tracing::debug!(attempt, %status, "embedding request failed, will retry");
                        last_err = Some(anyhow::anyhow!(
                            "Embeddings API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    // Client error (not 429): fail now
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Embeddings API error {}: {}", status, body_text);
                }
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "embedding request errored, will retry");
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_one(&self, text: &str, role: EmbedRole) -> Option<DenseVector> {
        if text.trim().is_empty() {
            return None;
        }
        let input = vec![self.prefix.apply(text, role).into_owned()];
        match self.request(&input).await {
            Ok(mut vectors) => vectors.pop(),
            Err(e) => {
                tracing::warn!(provider = %self.model, error = %e, "embedding failed");
                None
            }
        }
    }

    async fn embed_batch(&self, texts: &[String], role: EmbedRole) -> Option<Vec<Option<DenseVector>>> {
        let mut slots: Vec<Option<DenseVector>> = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.batch_size) {
            // Empty texts are never sent; their slots stay `None`.
            let sendable: Vec<(usize, String)> = chunk
                .iter()
                .enumerate()
                .filter(|(_, t)| !t.trim().is_empty())
                .map(|(i, t)| (i, self.prefix.apply(t, role).into_owned()))
                .collect();

            let mut chunk_slots: Vec<Option<DenseVector>> = vec![None; chunk.len()];
            if !sendable.is_empty() {
                let inputs: Vec<String> = sendable.iter().map(|(_, t)| t.clone()).collect();
                match self.request(&inputs).await {
                    Ok(vectors) => {
                        for ((i, _), v) in sendable.iter().zip(vectors) {
                            chunk_slots[*i] = Some(v);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            provider = %self.model,
                            count = texts.len(),
                            error = %e,
                            "batch embedding failed"
                        );
                        return None;
                    }
                }
            }
            slots.extend(chunk_slots);
        }

        Some(slots)
    }
}

/// Parse an OpenAI-style embeddings response.
///
/// Items are re-ordered by their `index` field. A response whose item count
/// differs from `expected` is rejected, as is any empty embedding or one
/// with a component that is not a finite `f32`.
fn parse_embeddings_response(json: &serde_json::Value, expected: usize) -> Result<Vec<DenseVector>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid embeddings response: missing data array"))?;

    if data.len() != expected {
        bail!(
            "Invalid embeddings response: expected {} embeddings, got {}",
            expected,
            data.len()
        );
    }

    let mut indexed: Vec<(usize, DenseVector)> = Vec::with_capacity(data.len());

    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid embeddings response: missing embedding"))?;

        if embedding.is_empty() {
            bail!("Invalid embeddings response: empty embedding at position {}", position);
        }

        let vec = embedding
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|x| x as f32)
                    .filter(|x| x.is_finite())
                    .ok_or_else(|| anyhow::anyhow!("Invalid embeddings response: bad component {}", v))
            })
            .collect::<Result<DenseVector>>()?;

        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);

        indexed.push((index, vec));
    }

    // Sort by index to ensure order matches input
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

/// Create the embedding provider described by `config`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`NoEmbeddings`] |
/// | `"remote"` | [`RemoteProvider`], or disabled without a credential |
/// | `"local"` | `LocalProvider` with the fastembed feature, else remote |
///
/// # Errors
///
/// Only fails if an HTTP client cannot be constructed. Unknown provider
/// names are rejected earlier by [`crate::config::load_config`].
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "local" => create_local(config),
        "remote" => create_remote(config),
        _ => Ok(Arc::new(NoEmbeddings)),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn create_local(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    Ok(Arc::new(LocalProvider::new(config)))
}

#[cfg(not(feature = "local-embeddings-fastembed"))]
fn create_local(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    tracing::warn!(
        provider = "local",
        fallback = "remote",
        "local embeddings need --features local-embeddings-fastembed, trying remote provider"
    );
    create_remote(config)
}

fn create_remote(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.api_key() {
        Some(key) => Ok(Arc::new(RemoteProvider::new(config, key)?)),
        None => {
            tracing::warn!(
                provider = "remote",
                fallback = "disabled",
                env = %config.api_key_env,
                "no embedding credential set, falling back to sparse-only retrieval"
            );
            Ok(Arc::new(NoEmbeddings))
        }
    }
}
