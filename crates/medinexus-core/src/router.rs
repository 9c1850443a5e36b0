//! Request routing
//!
//! Classifies a user utterance into one of the specialist agents using a
//! schema-constrained call made with the hub agent's instruction. The router
//! never blocks a conversation: any failure other than a missing credential
//! falls back to a fixed default specialist.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::agents::{AgentId, AgentRegistry};
use crate::error::{ConfigurationError, GatewayError, RoutingFailure};
use crate::providers::{ContentTurn, GenerateOptions, LlmGateway};
use crate::types::RoutingDecision;

/// Rationale attached to fallback decisions
pub const FALLBACK_REASONING: &str = "System routing failed, defaulting to general inquiry.";

/// Anything that can pick a target agent for an utterance
#[async_trait]
pub trait RequestRouter: Send + Sync {
    /// Decide which agent handles `utterance`.
    ///
    /// Only configuration failures are returned as errors.
    async fn route(&self, utterance: &str) -> Result<RoutingDecision, ConfigurationError>;
}

/// Configuration for the router
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Sampling temperature for classification
    pub temperature: f32,
    /// Specialist used when classification fails
    pub fallback_agent: AgentId,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            fallback_agent: AgentId::PatientInfo,
        }
    }
}

/// LLM-backed router using the hub persona
pub struct Router {
    registry: Arc<AgentRegistry>,
    gateway: Arc<dyn LlmGateway>,
    config: RouterConfig,
}

impl Router {
    pub fn new(registry: Arc<AgentRegistry>, gateway: Arc<dyn LlmGateway>) -> Self {
        Self {
            registry,
            gateway,
            config: RouterConfig::default(),
        }
    }

    /// Set the router configuration. A hub fallback is replaced by the default.
    pub fn with_config(mut self, mut config: RouterConfig) -> Self {
        if config.fallback_agent.is_hub() {
            warn!(
                "Router fallback cannot be the hub agent, using {}",
                RouterConfig::default().fallback_agent
            );
            config.fallback_agent = RouterConfig::default().fallback_agent;
        }
        self.config = config;
        self
    }

    /// Output schema restricting the answer to a specialist id and a rationale
    fn routing_schema(&self) -> Value {
        let ids: Vec<&str> = self
            .registry
            .specialist_ids()
            .iter()
            .map(AgentId::as_str)
            .collect();
        json!({
            "type": "OBJECT",
            "properties": {
                "targetAgentId": {
                    "type": "STRING",
                    "enum": ids,
                    "description": "The ID of the specialist agent best suited for the request."
                },
                "reasoning": {
                    "type": "STRING",
                    "description": "A brief explanation of why this agent was chosen."
                }
            },
            "required": ["targetAgentId", "reasoning"]
        })
    }

    async fn classify(&self, utterance: &str) -> Result<RoutingDecision, RoutingFailure> {
        let hub = self.registry.hub();
        let options = GenerateOptions::default()
            .with_schema(self.routing_schema())
            .with_temperature(self.config.temperature);

        let generation = self
            .gateway
            .generate(&hub.instruction, &[ContentTurn::user(utterance)], &options)
            .await
            .map_err(RoutingFailure::Gateway)?;

        parse_decision(&generation.text, self.registry.specialist_ids())
    }
}

#[async_trait]
impl RequestRouter for Router {
    async fn route(&self, utterance: &str) -> Result<RoutingDecision, ConfigurationError> {
        match self.classify(utterance).await {
            Ok(decision) => {
                info!("Routed to {}: {}", decision.target, decision.reasoning);
                Ok(decision)
            }
            Err(RoutingFailure::Gateway(GatewayError::MissingCredential)) => {
                Err(ConfigurationError::MissingCredential)
            }
            Err(e) => {
                warn!(
                    "Routing failed ({}), falling back to {}",
                    e, self.config.fallback_agent
                );
                Ok(RoutingDecision::fallback(
                    self.config.fallback_agent,
                    FALLBACK_REASONING,
                ))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawDecision {
    #[serde(rename = "targetAgentId")]
    target_agent_id: String,
    #[serde(default)]
    reasoning: String,
}

/// Parse the constrained router output into a decision.
///
/// The target must be one of `allowed`; the hub and foreign identifiers are
/// rejected.
fn parse_decision(text: &str, allowed: &[AgentId]) -> Result<RoutingDecision, RoutingFailure> {
    let body = strip_code_fence(text.trim());
    if body.is_empty() {
        return Err(RoutingFailure::EmptyResponse);
    }

    let raw: RawDecision = serde_json::from_str(body).map_err(RoutingFailure::Malformed)?;
    debug!("Router raw output: {:?}", raw);

    let target: AgentId = raw.target_agent_id.parse()?;
    if !allowed.contains(&target) {
        return Err(RoutingFailure::NotASpecialist(target));
    }
    Ok(RoutingDecision::new(target, raw.reasoning))
}

fn strip_code_fence(text: &str) -> &str {
    text.strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGateway;

    fn router(gateway: Arc<ScriptedGateway>) -> Router {
        Router::new(Arc::new(AgentRegistry::builtin()), gateway)
    }

    #[tokio::test]
    async fn test_route_to_specialist() {
        let gateway = Arc::new(ScriptedGateway::new().reply(
            r#"{"targetAgentId": "PATIENT_INFO", "reasoning": "Address change is a personal detail."}"#,
        ));
        let decision = router(gateway.clone())
            .route("I need to update my address")
            .await
            .unwrap();
        assert_eq!(decision.target, AgentId::PatientInfo);
        assert!(!decision.fallback);
        assert_eq!(decision.reasoning, "Address change is a personal detail.");
    }

    #[tokio::test]
    async fn test_route_call_shape() {
        let gateway = Arc::new(
            ScriptedGateway::new().reply(r#"{"targetAgentId": "BILLING", "reasoning": "invoice"}"#),
        );
        router(gateway.clone()).route("Why is my invoice so high?").await.unwrap();

        let calls = gateway.calls();
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(call.system_instruction, AgentRegistry::builtin().hub().instruction);
        assert_eq!(call.content, vec![ContentTurn::user("Why is my invoice so high?")]);
        assert_eq!(call.options.temperature, Some(0.1));
        assert!(call.options.tools.is_empty());

        let schema = call.options.response_schema.as_ref().unwrap();
        let allowed = schema["properties"]["targetAgentId"]["enum"].as_array().unwrap();
        assert_eq!(allowed.len(), 4);
        assert!(!allowed.contains(&json!("NAVIGATOR")));
    }

    #[tokio::test]
    async fn test_gateway_failure_falls_back() {
        let gateway = Arc::new(ScriptedGateway::new().fail(GatewayError::Status {
            status: 503,
            body: "overloaded".to_string(),
        }));
        let decision = router(gateway).route("hello").await.unwrap();
        assert_eq!(decision.target, AgentId::PatientInfo);
        assert!(decision.fallback);
        assert_eq!(decision.reasoning, FALLBACK_REASONING);
    }

    #[tokio::test]
    async fn test_malformed_output_falls_back() {
        let gateway = Arc::new(ScriptedGateway::new().reply("Sure! Billing sounds right."));
        let decision = router(gateway).route("invoice").await.unwrap();
        assert!(decision.fallback);
        assert_eq!(decision.target, AgentId::PatientInfo);
    }

    #[tokio::test]
    async fn test_unknown_agent_falls_back() {
        let gateway = Arc::new(
            ScriptedGateway::new().reply(r#"{"targetAgentId": "PHARMACY", "reasoning": "meds"}"#),
        );
        let decision = router(gateway).route("refill my prescription").await.unwrap();
        assert!(decision.fallback);
        assert_eq!(decision.target, AgentId::PatientInfo);
    }

    #[tokio::test]
    async fn test_hub_target_falls_back() {
        let gateway = Arc::new(
            ScriptedGateway::new().reply(r#"{"targetAgentId": "NAVIGATOR", "reasoning": "me"}"#),
        );
        let decision = router(gateway).route("hi").await.unwrap();
        assert!(decision.fallback);
        assert!(AgentId::SPECIALISTS.contains(&decision.target));
    }

    #[tokio::test]
    async fn test_missing_credential_propagates() {
        let gateway = Arc::new(ScriptedGateway::new().fail(GatewayError::MissingCredential));
        let err = router(gateway.clone()).route("hello").await.unwrap_err();
        assert_eq!(err, ConfigurationError::MissingCredential);
        assert_eq!(gateway.call_count(), 1);
    }

    #[tokio::test]
    async fn test_custom_fallback_agent() {
        let gateway = Arc::new(ScriptedGateway::new().reply(""));
        let decision = router(gateway)
            .with_config(RouterConfig {
                temperature: 0.0,
                fallback_agent: AgentId::Scheduler,
            })
            .route("??")
            .await
            .unwrap();
        assert_eq!(decision.target, AgentId::Scheduler);
    }

    #[test]
    fn test_hub_fallback_rejected() {
        let gateway = Arc::new(ScriptedGateway::new());
        let r = router(gateway).with_config(RouterConfig {
            temperature: 0.2,
            fallback_agent: AgentId::Navigator,
        });
        assert_eq!(r.config.fallback_agent, AgentId::PatientInfo);
        assert_eq!(r.config.temperature, 0.2);
    }

    #[test]
    fn test_parse_decision_tolerates_code_fence() {
        let text = "```json\n{\"targetAgentId\": \"SCHEDULER\", \"reasoning\": \"booking\"}\n```";
        let decision = parse_decision(text, &AgentId::SPECIALISTS).unwrap();
        assert_eq!(decision.target, AgentId::Scheduler);
    }

    #[test]
    fn test_parse_decision_errors() {
        assert!(matches!(
            parse_decision("   ", &AgentId::SPECIALISTS),
            Err(RoutingFailure::EmptyResponse)
        ));
        assert!(matches!(
            parse_decision(r#"{"reasoning": "x"}"#, &AgentId::SPECIALISTS),
            Err(RoutingFailure::Malformed(_))
        ));
        assert!(matches!(
            parse_decision(r#"{"targetAgentId": "LAB"}"#, &AgentId::SPECIALISTS),
            Err(RoutingFailure::UnknownAgent(_))
        ));
        assert!(matches!(
            parse_decision(r#"{"targetAgentId": "NAVIGATOR"}"#, &AgentId::SPECIALISTS),
            Err(RoutingFailure::NotASpecialist(AgentId::Navigator))
        ));
    }
}
