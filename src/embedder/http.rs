// src/embedder/http.rs
// reqwest-based embedding client against an OpenAI-compatible /embeddings
// endpoint. Provider selection follows a single configurable endpoint
// rather than a multi-provider factory.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embedder::Embedder;
use crate::error::{ReasoningBankError, Result};

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
}

impl HttpEmbedder {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
            model: model.into(),
            dimensions,
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&EmbeddingRequest { model: &self.model, input: texts });

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ReasoningBankError::Embedding(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ReasoningBankError::Embedding(format!("embedding request failed: {}", response.status())));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ReasoningBankError::Embedding(e.to_string()))?;

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_batch(texts).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ReasoningBankError::Embedding("empty embedding response".to_string()))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
