//! LLM gateway abstraction layer
//!
//! A gateway issues one "generate" call against a backend and hides
//! transport and authentication. [`GeminiGateway`] is the production
//! implementation; credentials are resolved lazily through
//! [`CredentialResolver`].

pub mod credentials;
pub mod google;
pub mod types;

pub use credentials::{ApiKey, CredentialResolver, CredentialSource, mask_secret, resolve_credential};
pub use google::{GeminiConfig, GeminiGateway};
pub use types::{
    ContentRole, ContentTurn, GatewayTool, GenerateOptions, Generation, GroundingReference,
    LlmGateway,
};
