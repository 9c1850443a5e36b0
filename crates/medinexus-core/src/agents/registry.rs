//! Agent registry - the fixed table of agent personas

use tracing::info;

use super::profile::{AgentId, AgentProfile, ToolKind};

const NAVIGATOR_INSTRUCTION: &str = "\
You are the Hospital System Navigator. Your SOLE purpose is to route user requests to the correct sub-agent.
You NEVER answer the user's specific question directly.

Analyze the user's input and classify it into one of these categories:
- SCHEDULER: For booking, rescheduling, or cancelling appointments, checking doctor availability.
- PATIENT_INFO: For registration, updating personal details, general patient status.
- BILLING: For insurance, invoices, payments, financial aid.
- MEDICAL_RECORDS: For test results, diagnosis, treatment history, requesting medical files.

Return the result in JSON format: { \"targetAgentId\": \"AGENT_ID\", \"reasoning\": \"short explanation\" }.";

const SCHEDULER_INSTRUCTION: &str = "\
You are the Appointment Scheduler Agent.
Your role: Manage scheduling, rescheduling, and cancellation of patient appointments.
Tone: Efficient, polite, and organized.
Capabilities:
- You can find doctor availability (simulate checking a database).
- You can confirm bookings.
- Use Google Search if the user asks for general department contact info or clinic locations.";

const PATIENT_INFO_INSTRUCTION: &str = "\
You are the Patient Information Agent.
Your role: Handle new patient registration, update personal details (address, phone), and general status checks.
Tone: Welcoming, helpful, and clear.
Capabilities:
- Specific patient data lookup (simulate this).
- Generate forms: If a user needs a registration form, generate a Markdown table representing the form structure.";

const BILLING_INSTRUCTION: &str = "\
You are the Billing and Insurance Agent.
Your role: Explain invoices, clarify insurance benefits, and discuss payment options.
Tone: Professional, empathetic, and precise regarding numbers.
Capabilities:
- Explain general insurance terms using Google Search.
- Generate financial summaries in Markdown tables.";

const MEDICAL_RECORDS_INSTRUCTION: &str = "\
You are the Medical Records Agent.
Your role: Retrieve and provide access to patient medical records (tests, diagnosis, history).
Tone: Highly professional, confidential, and secure.
CRITICAL: Emphasize security and privacy in your responses.
Capabilities:
- Present medical data in structured formats (Markdown tables/lists).
- If requested, simulate generating a \"PDF\" or \"DOCX\" by providing a comprehensive text block labeled as such.";

/// Immutable lookup table from [`AgentId`] to [`AgentProfile`].
///
/// Every identifier always has exactly one profile, so [`lookup`](Self::lookup)
/// is total. Build it once at startup and share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    navigator: AgentProfile,
    scheduler: AgentProfile,
    patient_info: AgentProfile,
    billing: AgentProfile,
    medical_records: AgentProfile,
}

impl AgentRegistry {
    /// The built-in hospital personas
    pub fn builtin() -> Self {
        let registry = Self {
            navigator: AgentProfile::new(
                AgentId::Navigator,
                "Hospital System Navigator",
                NAVIGATOR_INSTRUCTION,
            )
            .with_role("Central Hub")
            .with_description("Analyzes your request and connects you to the right specialist."),
            scheduler: AgentProfile::new(
                AgentId::Scheduler,
                "Appointment Scheduler",
                SCHEDULER_INSTRUCTION,
            )
            .with_role("Scheduling Specialist")
            .with_description("Manages appointments, doctor availability, and department contacts.")
            .with_tools([ToolKind::WebSearch]),
            patient_info: AgentProfile::new(
                AgentId::PatientInfo,
                "Patient Info Agent",
                PATIENT_INFO_INSTRUCTION,
            )
            .with_role("Registration & Updates")
            .with_description("Handles registration, personal details, and general inquiries.")
            .with_tools([ToolKind::DocumentGeneration, ToolKind::WebSearch]),
            billing: AgentProfile::new(AgentId::Billing, "Billing & Insurance", BILLING_INSTRUCTION)
                .with_role("Financial Specialist")
                .with_description("Clarifies invoices, insurance coverage, and payment options.")
                .with_tools([ToolKind::WebSearch, ToolKind::DocumentGeneration]),
            medical_records: AgentProfile::new(
                AgentId::MedicalRecords,
                "Medical Records",
                MEDICAL_RECORDS_INSTRUCTION,
            )
            .with_role("Records Keeper")
            .with_description("Securely retrieves test results, diagnoses, and history.")
            .with_tools([ToolKind::DocumentGeneration]),
        };
        info!("AgentRegistry: loaded {} built-in agents", AgentId::ALL.len());
        registry
    }

    /// Replace the profile stored under `profile.id`
    pub fn with_profile(mut self, profile: AgentProfile) -> Self {
        info!(
            "AgentRegistry: overriding agent '{}' ({})",
            profile.id, profile.name
        );
        let id = profile.id;
        *self.slot_mut(id) = profile;
        self
    }

    /// Get the profile for an identifier
    pub fn lookup(&self, id: AgentId) -> &AgentProfile {
        match id {
            AgentId::Navigator => &self.navigator,
            AgentId::Scheduler => &self.scheduler,
            AgentId::PatientInfo => &self.patient_info,
            AgentId::Billing => &self.billing,
            AgentId::MedicalRecords => &self.medical_records,
        }
    }

    /// The hub profile
    pub fn hub(&self) -> &AgentProfile {
        self.lookup(AgentId::HUB)
    }

    /// Identifiers the router may choose from
    pub fn specialist_ids(&self) -> &'static [AgentId] {
        &AgentId::SPECIALISTS
    }

    /// All profiles, hub first
    pub fn profiles(&self) -> impl Iterator<Item = &AgentProfile> {
        AgentId::ALL.into_iter().map(|id| self.lookup(id))
    }

    fn slot_mut(&mut self, id: AgentId) -> &mut AgentProfile {
        match id {
            AgentId::Navigator => &mut self.navigator,
            AgentId::Scheduler => &mut self.scheduler,
            AgentId::PatientInfo => &mut self.patient_info,
            AgentId::Billing => &mut self.billing,
            AgentId::MedicalRecords => &mut self.medical_records,
        }
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
