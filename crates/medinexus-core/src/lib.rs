//! medinexus-core - Orchestration core of the MediNexus hospital assistant
//!
//! This crate provides:
//! - Agent registry with the hub navigator and four specialist personas
//! - Router that classifies a request into a specialist with a schema-constrained call
//! - Dispatcher that answers as the chosen specialist with bounded history and web search
//! - Sequencer that drives one turn at a time and owns the transcript
//! - Gemini gateway with lazy credential resolution

pub mod agents;
pub mod dispatcher;
pub mod error;
pub mod providers;
pub mod router;
pub mod sequencer;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use agents::{AgentId, AgentProfile, AgentRegistry, ToolKind, UnknownAgentId};
pub use dispatcher::{Dispatcher, DispatcherConfig, SpecialistResponder};
pub use error::{ConfigurationError, GatewayError, RoutingFailure, SubmitError};
pub use providers::{CredentialResolver, GeminiConfig, GeminiGateway, LlmGateway};
pub use router::{RequestRouter, Router, RouterConfig};
pub use sequencer::{Sequencer, SessionConfig, SessionStatus, TurnPhase, TurnReport};
pub use types::{ConversationTurn, GenerationResult, RoutingDecision, TurnRole};
