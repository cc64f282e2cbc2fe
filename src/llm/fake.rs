// src/llm/fake.rs
// Scripted LLM client for tests — returns queued responses in order and
// counts calls, so tests can assert "LLM call count MUST remain N" style
// properties (spec.md §8, scenarios S4-S6).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{ReasoningBankError, Result};
use crate::llm::LLMClient;

pub struct FakeLLMClient {
    responses: Mutex<Vec<String>>,
    call_count: AtomicUsize,
}

impl FakeLLMClient {
    pub fn new(responses: Vec<String>) -> Self {
        Self { responses: Mutex::new(responses), call_count: AtomicUsize::new(0) }
    }

    /// Always produce the same well-formed consolidation response.
    pub fn always_succeeding(response: impl Into<String>) -> Self {
        let response = response.into();
        Self { responses: Mutex::new(vec![response; 10_000]), call_count: AtomicUsize::new(0) }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LLMClient for FakeLLMClient {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(ReasoningBankError::Llm("no scripted response left".to_string()));
        }
        Ok(responses.remove(0))
    }
}
