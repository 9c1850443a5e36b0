//! Error taxonomy for the orchestration core

use thiserror::Error;

use crate::agents::{AgentId, UnknownAgentId};
use crate::sequencer::TurnPhase;

/// Failure of a single backend call
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No API credential could be resolved; the call was not attempted
    #[error("no API credential configured")]
    MissingCredential,

    #[error("request to LLM backend failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("LLM backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed LLM backend response: {0}")]
    Malformed(String),
}

impl GatewayError {
    /// Whether this failure is a configuration problem rather than a
    /// recoverable backend failure
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::MissingCredential)
    }
}

/// Why a classification could not be used. Recovered inside the router.
#[derive(Debug, Error)]
pub enum RoutingFailure {
    #[error("gateway call failed: {0}")]
    Gateway(GatewayError),

    #[error("router returned an empty response")]
    EmptyResponse,

    #[error("router output did not match the schema: {0}")]
    Malformed(serde_json::Error),

    #[error(transparent)]
    UnknownAgent(#[from] UnknownAgentId),

    #[error("router chose {0}, which is not a specialist")]
    NotASpecialist(AgentId),
}

/// Fatal to the current turn; surfaced to the user, never retried
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error(
        "no API credential configured; set gateway.api_key in the config file \
         or one of the API_KEY, GEMINI_API_KEY, GOOGLE_AI_API_KEY environment variables"
    )]
    MissingCredential,
}

/// Why a submission was not accepted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("utterance is blank")]
    Blank,

    #[error("a turn is already in progress ({0})")]
    Busy(TurnPhase),

    /// The runtime shut down before the turn finished
    #[error("the turn was interrupted before completing")]
    Interrupted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_missing_credential_is_configuration() {
        assert!(GatewayError::MissingCredential.is_configuration());
        assert!(!GatewayError::Malformed("x".into()).is_configuration());
        assert!(
            !GatewayError::Status {
                status: 500,
                body: String::new()
            }
            .is_configuration()
        );
    }

    #[test]
    fn test_routing_failure_display() {
        let unknown = RoutingFailure::from(UnknownAgentId("LAB".to_string()));
        assert_eq!(unknown.to_string(), "unknown agent identifier 'LAB'");
        assert_eq!(
            RoutingFailure::NotASpecialist(AgentId::Navigator).to_string(),
            "router chose NAVIGATOR, which is not a specialist"
        );
    }

    #[test]
    fn test_configuration_error_mentions_setup() {
        let msg = ConfigurationError::MissingCredential.to_string();
        assert!(msg.contains("api_key"));
        assert!(msg.contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_submit_error_display() {
        assert_eq!(SubmitError::Blank.to_string(), "utterance is blank");
        assert_eq!(
            SubmitError::Busy(TurnPhase::Routing).to_string(),
            "a turn is already in progress (routing)"
        );
    }
}
