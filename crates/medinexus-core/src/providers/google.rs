//! Google Gemini gateway

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::GatewayError;

use super::credentials::CredentialResolver;
use super::types::{
    ContentTurn, GatewayTool, GenerateOptions, Generation, GroundingReference,
    LlmGateway,
};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Connection settings for the Gemini backend
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    pub max_output_tokens: Option<u32>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_output_tokens: None,
        }
    }
}

/// Gateway backed by the Gemini `generateContent` endpoint
pub struct GeminiGateway {
    client: Client,
    credentials: CredentialResolver,
    config: GeminiConfig,
}

impl std::fmt::Debug for GeminiGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiGateway")
            .field("client", &"<reqwest::Client>")
            .field("credentials", &self.credentials)
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .finish()
    }
}

impl GeminiGateway {
    pub fn new(config: GeminiConfig, credentials: CredentialResolver) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            credentials,
            config,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    /// Build the Gemini wire request
    fn build_request(
        &self,
        system_instruction: &str,
        content: &[ContentTurn],
        options: &GenerateOptions,
    ) -> GeminiRequest {
        let contents = content
            .iter()
            .map(|turn| GeminiContent {
                role: turn.role.to_string(),
                parts: vec![GeminiPart::text(&turn.text)],
            })
            .collect();

        let tools = options
            .tools
            .iter()
            .map(|tool| match tool {
                GatewayTool::WebSearch => GeminiTool {
                    google_search: GeminiGoogleSearch {},
                },
            })
            .collect();

        GeminiRequest {
            contents,
            system_instruction: GeminiInstruction {
                parts: vec![GeminiPart::text(system_instruction)],
            },
            generation_config: GeminiGenerationConfig {
                temperature: options.temperature,
                response_mime_type: options
                    .response_schema
                    .as_ref()
                    .map(|_| "application/json".to_string()),
                response_schema: options.response_schema.clone(),
                max_output_tokens: self.config.max_output_tokens,
            },
            tools,
        }
    }

    /// Convert a Gemini response to provider-agnostic form
    fn from_gemini_response(resp: GeminiApiResponse) -> Result<Generation, GatewayError> {
        let candidate = resp
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::Malformed("response had no candidates".to_string()))?;

        let text = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<String>()
            })
            .unwrap_or_default();

        let grounding = candidate
            .grounding_metadata
            .map(|m| to_grounding(m.grounding_chunks))
            .unwrap_or_default();

        debug!(
            "Gemini candidate: finish_reason={:?}, text={} chars, grounding={}",
            candidate.finish_reason,
            text.len(),
            grounding.len()
        );

        Ok(Generation { text, grounding })
    }
}

/// Validate raw grounding chunks into typed references.
///
/// Web chunks with an absolute http(s) URI become [`GroundingReference::Web`];
/// web chunks without one become [`GroundingReference::Unlinked`]. Chunks of
/// any other shape are dropped.
fn to_grounding(chunks: Vec<Value>) -> Vec<GroundingReference> {
    chunks
        .into_iter()
        .filter_map(|raw| match serde_json::from_value::<GeminiGroundingChunk>(raw) {
            Ok(chunk) => chunk.web,
            Err(e) => {
                debug!("Dropping malformed grounding chunk: {}", e);
                None
            }
        })
        .map(|web| {
            let url = web
                .uri
                .as_deref()
                .and_then(|uri| Url::parse(uri).ok())
                .filter(|url| matches!(url.scheme(), "http" | "https"));
            match url {
                Some(url) => GroundingReference::Web {
                    url,
                    title: web.title,
                },
                None => GroundingReference::Unlinked { title: web.title },
            }
        })
        .collect()
}

#[async_trait]
impl LlmGateway for GeminiGateway {
    fn provider_name(&self) -> &str {
        "google"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn generate(
        &self,
        system_instruction: &str,
        content: &[ContentTurn],
        options: &GenerateOptions,
    ) -> Result<Generation, GatewayError> {
        let api_key = self
            .credentials
            .get()
            .ok_or(GatewayError::MissingCredential)?;

        let body = self.build_request(system_instruction, content, options);

        debug!(
            "Gemini request: model={}, contents={}, tools={}, structured={}",
            self.config.model,
            body.contents.len(),
            body.tools.len(),
            options.response_schema.is_some()
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key.expose())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: error_text,
            });
        }

        let raw = response.text().await?;
        let api_response: GeminiApiResponse = serde_json::from_str(&raw)
            .map_err(|e| GatewayError::Malformed(format!("invalid JSON body: {}", e)))?;

        debug!(
            "Gemini response: candidates={}",
            api_response.candidates.len()
        );

        Self::from_gemini_response(api_response)
    }
}

// ── Gemini wire types ──

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    system_instruction: GeminiInstruction,
    generation_config: GeminiGenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

impl GeminiPart {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct GeminiInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    google_search: GeminiGoogleSearch,
}

#[derive(Debug, Clone, Serialize)]
struct GeminiGoogleSearch {}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiApiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    grounding_metadata: Option<GeminiGroundingMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiGroundingChunk {
    #[serde(default)]
    web: Option<GeminiWebChunk>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiWebChunk {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    title: Option<String>,
}
