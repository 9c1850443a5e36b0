//! Agent profile - defines an agent's identity, persona instruction, and tools

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::providers::GatewayTool;

/// Closed set of agent identifiers.
///
/// `Navigator` is the hub: it routes requests but never answers them. The
/// other four are specialists a request can be delegated to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentId {
    Navigator,
    Scheduler,
    PatientInfo,
    Billing,
    MedicalRecords,
}

impl AgentId {
    /// The coordinating hub identifier
    pub const HUB: AgentId = AgentId::Navigator;

    /// Specialist identifiers, in the order they are offered to the router
    pub const SPECIALISTS: [AgentId; 4] = [
        AgentId::Scheduler,
        AgentId::PatientInfo,
        AgentId::Billing,
        AgentId::MedicalRecords,
    ];

    /// All identifiers, hub first
    pub const ALL: [AgentId; 5] = [
        AgentId::Navigator,
        AgentId::Scheduler,
        AgentId::PatientInfo,
        AgentId::Billing,
        AgentId::MedicalRecords,
    ];

    pub fn is_hub(&self) -> bool {
        *self == Self::HUB
    }

    /// Wire identifier, as used in routing schemas and backend output
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Navigator => "NAVIGATOR",
            Self::Scheduler => "SCHEDULER",
            Self::PatientInfo => "PATIENT_INFO",
            Self::Billing => "BILLING",
            Self::MedicalRecords => "MEDICAL_RECORDS",
        }
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name one of the five agents
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown agent identifier '{0}'")]
pub struct UnknownAgentId(pub String);

impl FromStr for AgentId {
    type Err = UnknownAgentId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == s.trim())
            .ok_or_else(|| UnknownAgentId(s.to_string()))
    }
}

/// Capabilities an agent may be permitted to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// External web search, enabled on the backend per call
    WebSearch,
    /// Structured documents (forms, tables) rendered in the answer text
    DocumentGeneration,
}

impl ToolKind {
    /// The backend tool this capability enables, if any.
    ///
    /// Document generation is carried by the persona instruction alone.
    pub fn gateway_tool(&self) -> Option<GatewayTool> {
        match self {
            Self::WebSearch => Some(GatewayTool::WebSearch),
            Self::DocumentGeneration => None,
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WebSearch => write!(f, "web_search"),
            Self::DocumentGeneration => write!(f, "document_generation"),
        }
    }
}

/// An agent persona: display metadata, system instruction, permitted tools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: AgentId,
    pub name: String,
    pub role: String,
    pub description: String,
    pub instruction: String,
    #[serde(default)]
    pub tools: Vec<ToolKind>,
}

impl AgentProfile {
    pub fn new(id: AgentId, name: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            role: String::new(),
            description: String::new(),
            instruction: instruction.into(),
            tools: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tools(mut self, tools: impl IntoIterator<Item = ToolKind>) -> Self {
        self.tools = tools.into_iter().collect();
        self
    }

    /// Check if a tool is permitted for this agent
    pub fn is_tool_allowed(&self, tool: ToolKind) -> bool {
        self.tools.contains(&tool)
    }

    /// Backend tools to enable when this agent answers
    pub fn gateway_tools(&self) -> Vec<GatewayTool> {
        let mut enabled = Vec::new();
        for tool in self.tools.iter().filter_map(ToolKind::gateway_tool) {
            if !enabled.contains(&tool) {
                enabled.push(tool);
            }
        }
        enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_id_roundtrips_wire_names() {
        for id in AgentId::ALL {
            assert_eq!(id.as_str().parse::<AgentId>().unwrap(), id);
        }
        assert_eq!(" BILLING ".parse::<AgentId>().unwrap(), AgentId::Billing);
    }

    #[test]
    fn test_agent_id_rejects_foreign_names() {
        let err = "PHARMACY".parse::<AgentId>().unwrap_err();
        assert_eq!(err, UnknownAgentId("PHARMACY".to_string()));
        assert!("billing".parse::<AgentId>().is_err());
    }

    #[test]
    fn test_agent_id_serde_matches_display() {
        let json = serde_json::to_string(&AgentId::MedicalRecords).unwrap();
        assert_eq!(json, "\"MEDICAL_RECORDS\"");
        assert_eq!(AgentId::MedicalRecords.to_string(), "MEDICAL_RECORDS");
    }

    #[test]
    fn test_specialists_exclude_hub() {
        assert!(!AgentId::SPECIALISTS.contains(&AgentId::HUB));
        assert!(AgentId::Navigator.is_hub());
        assert!(!AgentId::Scheduler.is_hub());
    }

    #[test]
    fn test_profile_tools() {
        let profile = AgentProfile::new(AgentId::Billing, "Billing", "You handle billing.")
            .with_tools([ToolKind::WebSearch, ToolKind::DocumentGeneration]);
        assert!(profile.is_tool_allowed(ToolKind::WebSearch));
        assert_eq!(profile.gateway_tools(), vec![GatewayTool::WebSearch]);
    }

    #[test]
    fn test_profile_without_search_enables_nothing() {
        let profile = AgentProfile::new(AgentId::MedicalRecords, "Records", "You keep records.")
            .with_tools([ToolKind::DocumentGeneration]);
        assert!(!profile.is_tool_allowed(ToolKind::WebSearch));
        assert!(profile.gateway_tools().is_empty());
    }
}
