//! Provider-agnostic types for the LLM gateway

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::GatewayError;

/// Message role as the backend sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentRole {
    User,
    /// The model's own earlier output
    Model,
}

impl std::fmt::Display for ContentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Model => write!(f, "model"),
        }
    }
}

/// One piece of conversation content sent to the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentTurn {
    pub role: ContentRole,
    pub text: String,
}

impl ContentTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ContentRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ContentRole::Model,
            text: text.into(),
        }
    }
}

/// Backend-side tools that can be switched on for a single call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayTool {
    WebSearch,
}

/// Per-call generation options
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// JSON schema the output must follow; forces JSON instead of free text
    pub response_schema: Option<Value>,
    pub tools: Vec<GatewayTool>,
    pub temperature: Option<f32>,
}

impl GenerateOptions {
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn with_tools(mut self, tools: Vec<GatewayTool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// A source the backend reports as having informed its answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroundingReference {
    /// A web page with a resolvable absolute URL
    Web { url: Url, title: Option<String> },
    /// A reference the backend reported without a usable URL
    Unlinked { title: Option<String> },
}

impl GroundingReference {
    pub fn url(&self) -> Option<&Url> {
        match self {
            Self::Web { url, .. } => Some(url),
            Self::Unlinked { .. } => None,
        }
    }
}

/// Output of one generate call
#[derive(Debug, Clone, Default)]
pub struct Generation {
    pub text: String,
    pub grounding: Vec<GroundingReference>,
}

impl Generation {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            grounding: Vec::new(),
        }
    }
}

/// Single "generate" call against an LLM backend.
///
/// Implementations perform exactly one outbound request and no retries.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Human-readable provider name (e.g. "google")
    fn provider_name(&self) -> &str;

    /// Model identifier (e.g. "gemini-2.5-flash")
    fn model(&self) -> &str;

    async fn generate(
        &self,
        system_instruction: &str,
        content: &[ContentTurn],
        options: &GenerateOptions,
    ) -> Result<Generation, GatewayError>;
}
