//! Shared types for medinexus-core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::agents::AgentId;

/// Who a conversation turn came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TurnRole {
    User,
    Assistant,
    /// UI artifact of a delegation event, never sent to the backend
    SystemNotice,
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::SystemNotice => write!(f, "system-notice"),
        }
    }
}

/// One entry in the append-only transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: String,
    pub role: TurnRole,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentId>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation: Option<Url>,
    /// Set on the reply produced when a turn failed on configuration
    #[serde(default)]
    pub is_error: bool,
}

impl ConversationTurn {
    fn new(role: TurnRole, text: impl Into<String>, agent: Option<AgentId>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            text: text.into(),
            agent,
            created_at: Utc::now(),
            citation: None,
            is_error: false,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(TurnRole::User, text, None)
    }

    pub fn assistant(agent: AgentId, text: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, text, Some(agent))
    }

    pub fn notice(text: impl Into<String>) -> Self {
        Self::new(TurnRole::SystemNotice, text, None)
    }

    /// An attributed reply reporting a configuration failure
    pub fn configuration_error(agent: AgentId, text: impl Into<String>) -> Self {
        let mut turn = Self::assistant(agent, text);
        turn.is_error = true;
        turn
    }

    pub fn with_citation(mut self, citation: Option<Url>) -> Self {
        self.citation = citation;
        self
    }

    /// Whether this turn carries conversational content for the backend
    pub fn is_conversational(&self) -> bool {
        self.role != TurnRole::SystemNotice
    }
}

/// Where a request should go, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub target: AgentId,
    /// For logs only; never shown to the user as an answer
    pub reasoning: String,
    /// True when the router could not classify and applied its default
    #[serde(default)]
    pub fallback: bool,
}

impl RoutingDecision {
    pub fn new(target: AgentId, reasoning: impl Into<String>) -> Self {
        Self {
            target,
            reasoning: reasoning.into(),
            fallback: false,
        }
    }

    pub fn fallback(target: AgentId, reasoning: impl Into<String>) -> Self {
        Self {
            target,
            reasoning: reasoning.into(),
            fallback: true,
        }
    }
}

/// A specialist's answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation: Option<Url>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_role_display() {
        assert_eq!(TurnRole::User.to_string(), "user");
        assert_eq!(TurnRole::Assistant.to_string(), "assistant");
        assert_eq!(TurnRole::SystemNotice.to_string(), "system-notice");
    }

    #[test]
    fn test_turn_constructors() {
        let user = ConversationTurn::user("hello");
        assert_eq!(user.role, TurnRole::User);
        assert!(user.agent.is_none());
        assert!(user.is_conversational());

        let reply = ConversationTurn::assistant(AgentId::Billing, "hi");
        assert_eq!(reply.agent, Some(AgentId::Billing));
        assert!(!reply.is_error);

        let notice = ConversationTurn::notice("handing over");
        assert!(!notice.is_conversational());
    }

    #[test]
    fn test_turn_ids_unique() {
        let a = ConversationTurn::user("a");
        let b = ConversationTurn::user("a");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_configuration_error_turn_is_flagged() {
        let turn = ConversationTurn::configuration_error(AgentId::Navigator, "no key");
        assert_eq!(turn.role, TurnRole::Assistant);
        assert!(turn.is_error);
    }

    #[test]
    fn test_turn_serialization_skips_empty_fields() {
        let turn = ConversationTurn::notice("note");
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["role"], "system-notice");
        assert!(json.get("agent").is_none());
        assert!(json.get("citation").is_none());
    }

    #[test]
    fn test_routing_decision_fallback_flag() {
        assert!(!RoutingDecision::new(AgentId::Billing, "invoice").fallback);
        assert!(RoutingDecision::fallback(AgentId::PatientInfo, "failed").fallback);
    }
}
