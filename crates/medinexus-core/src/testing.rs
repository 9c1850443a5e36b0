//! Scripted gateway for unit tests

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::GatewayError;
use crate::providers::{ContentTurn, GenerateOptions, Generation, LlmGateway};

/// One call the stub received
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system_instruction: String,
    pub content: Vec<ContentTurn>,
    pub options: GenerateOptions,
}

/// Replays queued results in order and records every request.
/// Once the queue is empty every call fails as malformed.
#[derive(Default)]
pub struct ScriptedGateway {
    replies: Mutex<VecDeque<Result<Generation, GatewayError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: &str) -> Self {
        self.then(Ok(Generation::text(text)))
    }

    pub fn fail(self, error: GatewayError) -> Self {
        self.then(Err(error))
    }

    pub fn then(self, result: Result<Generation, GatewayError>) -> Self {
        self.replies.lock().unwrap().push_back(result);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmGateway for ScriptedGateway {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn generate(
        &self,
        system_instruction: &str,
        content: &[ContentTurn],
        options: &GenerateOptions,
    ) -> Result<Generation, GatewayError> {
        self.calls.lock().unwrap().push(RecordedCall {
            system_instruction: system_instruction.to_string(),
            content: content.to_vec(),
            options: options.clone(),
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::Malformed("no scripted reply".to_string())))
    }
}
