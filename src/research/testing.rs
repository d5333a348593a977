use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{CompletionRequest, GroundedResponse, LanguageModel, LlmError};

/// In-memory model that replays canned responses and counts calls.
#[derive(Default)]
pub struct ScriptedModel {
    json: Mutex<VecDeque<String>>,
    answers: Mutex<VecDeque<String>>,
    search_response: GroundedResponse,
    search_prompts: Mutex<Vec<String>>,
    complete_prompts: Mutex<Vec<String>>,
    json_calls: AtomicUsize,
    complete_calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a structured (JSON) response.
    pub fn push_json(self, raw: &str) -> Self {
        self.json.lock().unwrap().push_back(raw.to_string());
        self
    }

    /// Queue a free-text response.
    pub fn push_answer(self, text: &str) -> Self {
        self.answers.lock().unwrap().push_back(text.to_string());
        self
    }

    /// Response returned by every grounded search.
    pub fn with_search(mut self, response: GroundedResponse) -> Self {
        self.search_response = response;
        self
    }

    pub fn json_calls(&self) -> usize {
        self.json_calls.load(Ordering::SeqCst)
    }

    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.search_prompts.lock().unwrap().len()
    }

    pub fn search_prompts(&self) -> Vec<String> {
        self.search_prompts.lock().unwrap().clone()
    }

    pub fn complete_prompts(&self) -> Vec<String> {
        self.complete_prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        self.complete_prompts
            .lock()
            .unwrap()
            .push(request.prompt.clone());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(LlmError::EmptyResponse)
    }

    async fn complete_json(
        &self,
        _request: &CompletionRequest,
        _schema: &Value,
    ) -> Result<String, LlmError> {
        self.json_calls.fetch_add(1, Ordering::SeqCst);
        self.json
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(LlmError::EmptyResponse)
    }

    async fn search(&self, request: &CompletionRequest) -> Result<GroundedResponse, LlmError> {
        self.search_prompts
            .lock()
            .unwrap()
            .push(request.prompt.clone());
        Ok(self.search_response.clone())
    }
}
