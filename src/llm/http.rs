// src/llm/http.rs
// reqwest-based chat-completion client for an OpenAI-compatible
// /chat/completions endpoint, used for the consolidation-merge prompt
// (spec.md §6.3). Modeled on the same provider-factory idiom as the
// embedding adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ReasoningBankError, Result};
use crate::llm::LLMClient;

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

pub struct HttpLLMClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpLLMClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
            model: model.into(),
        }
    }
}

#[async_trait]
impl LLMClient for HttpLLMClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut request = self.client.post(format!("{}/chat/completions", self.base_url)).json(&ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            temperature: 0.2,
        });

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| ReasoningBankError::Llm(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ReasoningBankError::Llm(format!("completion request failed: {}", response.status())));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| ReasoningBankError::Llm(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ReasoningBankError::Llm("empty completion response".to_string()))
    }
}
