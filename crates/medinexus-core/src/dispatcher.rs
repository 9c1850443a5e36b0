//! Specialist dispatch
//!
//! Builds a bounded context from the transcript, enables the tools the
//! chosen specialist is permitted, makes one free-text generation call and
//! picks at most one citation from the grounding metadata.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use crate::agents::{AgentId, AgentRegistry};
use crate::error::{ConfigurationError, GatewayError};
use crate::providers::{ContentTurn, GenerateOptions, GroundingReference, LlmGateway};
use crate::types::{ConversationTurn, GenerationResult, TurnRole};

/// Reply used when the specialist call fails
pub const UNAVAILABLE_TEXT: &str =
    "A system error occurred. The agent is currently unavailable.";

/// Reply used when the specialist answers with no text
pub const EMPTY_REPLY_TEXT: &str =
    "I'm sorry, I'm unable to process your request at the moment.";

/// Anything that can produce a specialist answer
#[async_trait]
pub trait SpecialistResponder: Send + Sync {
    /// Answer `utterance` as `agent`, given the prior `history`.
    ///
    /// Only configuration failures are returned as errors.
    async fn respond(
        &self,
        agent: AgentId,
        history: &[ConversationTurn],
        utterance: &str,
    ) -> Result<GenerationResult, ConfigurationError>;
}

/// Configuration for the dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Number of prior conversational turns sent with each request
    pub history_window: usize,
    /// Sampling temperature; `None` leaves the backend default
    pub temperature: Option<f32>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            history_window: 6,
            temperature: None,
        }
    }
}

/// LLM-backed specialist dispatcher
pub struct Dispatcher {
    registry: Arc<AgentRegistry>,
    gateway: Arc<dyn LlmGateway>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(registry: Arc<AgentRegistry>, gateway: Arc<dyn LlmGateway>) -> Self {
        Self {
            registry,
            gateway,
            config: DispatcherConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Last `history_window` conversational turns, then the new utterance.
    ///
    /// System notices are dropped before windowing; assistant turns map to
    /// the model role and everything else to the user role.
    fn build_context(&self, history: &[ConversationTurn], utterance: &str) -> Vec<ContentTurn> {
        let conversational: Vec<&ConversationTurn> =
            history.iter().filter(|t| t.is_conversational()).collect();
        let start = conversational
            .len()
            .saturating_sub(self.config.history_window);

        let mut content: Vec<ContentTurn> = conversational[start..]
            .iter()
            .map(|turn| match turn.role {
                TurnRole::Assistant => ContentTurn::model(turn.text.as_str()),
                _ => ContentTurn::user(turn.text.as_str()),
            })
            .collect();
        content.push(ContentTurn::user(utterance));
        content
    }
}

/// First reference exposing a URL, if any
fn select_citation(grounding: &[GroundingReference]) -> Option<Url> {
    grounding.iter().find_map(GroundingReference::url).cloned()
}

#[async_trait]
impl SpecialistResponder for Dispatcher {
    async fn respond(
        &self,
        agent: AgentId,
        history: &[ConversationTurn],
        utterance: &str,
    ) -> Result<GenerationResult, ConfigurationError> {
        let profile = self.registry.lookup(agent);
        let content = self.build_context(history, utterance);

        let mut options = GenerateOptions::default().with_tools(profile.gateway_tools());
        options.temperature = self.config.temperature;

        debug!(
            "Dispatching to {} with {} content turns, tools={:?}",
            agent,
            content.len(),
            options.tools
        );

        match self
            .gateway
            .generate(&profile.instruction, &content, &options)
            .await
        {
            Ok(generation) => {
                let citation = select_citation(&generation.grounding);
                let text = if generation.text.trim().is_empty() {
                    warn!("{} returned an empty answer", agent);
                    EMPTY_REPLY_TEXT.to_string()
                } else {
                    generation.text
                };
                info!(
                    "{} answered ({} chars, citation: {})",
                    agent,
                    text.len(),
                    citation.as_ref().map_or("none", Url::as_str)
                );
                Ok(GenerationResult { text, citation })
            }
            Err(GatewayError::MissingCredential) => Err(ConfigurationError::MissingCredential),
            Err(e) => {
                warn!("Specialist {} unavailable: {}", agent, e);
                Ok(GenerationResult {
                    text: UNAVAILABLE_TEXT.to_string(),
                    citation: None,
                })
            }
        }
    }
}
