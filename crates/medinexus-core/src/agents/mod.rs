//! Agent personas - identifiers, profiles, and the registry that holds them
//!
//! One hub agent routes requests; four specialists answer them. The table
//! is fixed at startup and never mutated afterwards.

pub mod profile;
pub mod registry;

pub use profile::{AgentId, AgentProfile, ToolKind, UnknownAgentId};
pub use registry::AgentRegistry;
