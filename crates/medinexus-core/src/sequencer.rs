//! Turn sequencing - drives one user turn through routing and generation
//!
//! A session owns the append-only transcript and allows exactly one turn in
//! flight. Each accepted submission moves through
//! `Idle → Routing → (Delegating) → Generating → Idle` and always ends with
//! exactly one assistant turn appended, even when the turn fails.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast, watch};
use tracing::{debug, error, info};

use crate::agents::{AgentId, AgentRegistry};
use crate::dispatcher::SpecialistResponder;
use crate::error::{ConfigurationError, SubmitError};
use crate::router::RequestRouter;
use crate::types::{ConversationTurn, RoutingDecision};

/// Greeting the hub posts when a session starts
pub const DEFAULT_GREETING: &str = "**Welcome to MediNexus.**\n\n\
I am the Hospital System Navigator. How can I help you today? \
I can connect you with scheduling, patient information, billing, or medical records.";

/// Reply posted when a turn fails on configuration
pub const CONFIGURATION_ERROR_TEXT: &str = "A system error occurred while processing your request. \
Make sure the API key has been configured.";

/// Where the session is within a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnPhase {
    Idle,
    Routing,
    Delegating,
    Generating,
}

impl std::fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Routing => write!(f, "routing"),
            Self::Delegating => write!(f, "delegating"),
            Self::Generating => write!(f, "generating"),
        }
    }
}

/// Snapshot of the session's visual state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub phase: TurnPhase,
    /// The agent currently in focus
    pub active_agent: AgentId,
}

/// What happened during one accepted turn
#[derive(Debug, Clone)]
pub struct TurnReport {
    /// `None` when the turn failed before routing completed
    pub decision: Option<RoutingDecision>,
    pub notice: Option<ConversationTurn>,
    pub reply: ConversationTurn,
}

/// Configuration for a session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Hub greeting; `None` starts with an empty transcript
    pub greeting: Option<String>,
    /// Capacity of the turn broadcast channel
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            greeting: Some(DEFAULT_GREETING.to_string()),
            event_capacity: 64,
        }
    }
}

/// A turn that ended on a configuration failure, with what it got through
struct TurnFailure {
    decision: Option<RoutingDecision>,
    notice: Option<ConversationTurn>,
    error: ConfigurationError,
}

struct SessionState {
    phase: TurnPhase,
    transcript: Vec<ConversationTurn>,
}

/// Orchestrates routing and specialist generation for one conversation
pub struct Sequencer {
    inner: Arc<Session>,
}

/// Shared session state; turns run against it on their own task
struct Session {
    registry: Arc<AgentRegistry>,
    router: Arc<dyn RequestRouter>,
    responder: Arc<dyn SpecialistResponder>,
    state: Mutex<SessionState>,
    status: watch::Sender<SessionStatus>,
    turns: broadcast::Sender<ConversationTurn>,
}

impl Sequencer {
    pub fn new(
        registry: Arc<AgentRegistry>,
        router: Arc<dyn RequestRouter>,
        responder: Arc<dyn SpecialistResponder>,
        config: SessionConfig,
    ) -> Self {
        let transcript = config
            .greeting
            .map(|text| vec![ConversationTurn::assistant(AgentId::HUB, text)])
            .unwrap_or_default();
        let (status, _) = watch::channel(SessionStatus {
            phase: TurnPhase::Idle,
            active_agent: AgentId::HUB,
        });
        let (turns, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            inner: Arc::new(Session {
                registry,
                router,
                responder,
                state: Mutex::new(SessionState {
                    phase: TurnPhase::Idle,
                    transcript,
                }),
                status,
                turns,
            }),
        }
    }

    /// Current phase and active agent
    pub fn status(&self) -> SessionStatus {
        *self.inner.status.borrow()
    }

    /// Follow phase and active-agent changes
    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status.subscribe()
    }

    /// Follow turns as they are appended
    pub fn subscribe_turns(&self) -> broadcast::Receiver<ConversationTurn> {
        self.inner.turns.subscribe()
    }

    /// Copy of the transcript so far
    pub async fn transcript(&self) -> Vec<ConversationTurn> {
        self.inner.state.lock().await.transcript.clone()
    }

    /// Run one user turn to completion.
    ///
    /// Rejected without side effects when `text` is blank or another turn is
    /// in flight. Once accepted, the turn finishes on its own task: dropping
    /// the returned future does not stop it from appending its reply and
    /// returning the session to idle.
    pub async fn submit(&self, text: &str) -> Result<TurnReport, SubmitError> {
        let utterance = text.trim();
        if utterance.is_empty() {
            return Err(SubmitError::Blank);
        }

        let history = self.inner.begin(utterance).await?;

        let session = self.inner.clone();
        let utterance = utterance.to_string();
        let turn = tokio::spawn(async move { session.complete(&history, &utterance).await });

        match turn.await {
            Ok(report) => Ok(report),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                error!("Turn task did not complete: {}", e);
                Err(SubmitError::Interrupted)
            }
        }
    }
}

impl Session {
    /// Accept a turn: check idle, append the user turn, enter routing.
    /// Returns the transcript as it stood before the user turn.
    async fn begin(&self, utterance: &str) -> Result<Vec<ConversationTurn>, SubmitError> {
        let history = {
            let mut state = self.state.lock().await;
            if state.phase != TurnPhase::Idle {
                debug!("Rejecting submission while {}", state.phase);
                return Err(SubmitError::Busy(state.phase));
            }
            let history = state.transcript.clone();
            state.phase = TurnPhase::Routing;
            self.append(&mut state, ConversationTurn::user(utterance));
            history
        };
        self.publish(TurnPhase::Routing, AgentId::HUB);
        Ok(history)
    }

    /// Run the accepted turn, append exactly one reply, return to idle
    async fn complete(&self, history: &[ConversationTurn], utterance: &str) -> TurnReport {
        let report = match self.run_turn(history, utterance).await {
            Ok(report) => report,
            Err(failure) => {
                error!("Turn failed: {}", failure.error);
                TurnReport {
                    decision: failure.decision,
                    notice: failure.notice,
                    reply: ConversationTurn::configuration_error(
                        AgentId::HUB,
                        CONFIGURATION_ERROR_TEXT,
                    ),
                }
            }
        };

        {
            let mut state = self.state.lock().await;
            self.append(&mut state, report.reply.clone());
            state.phase = TurnPhase::Idle;
        }
        let active = self.status.borrow().active_agent;
        self.publish(TurnPhase::Idle, active);

        report
    }

    /// Route, announce, generate. The reply is returned, not appended.
    async fn run_turn(
        &self,
        history: &[ConversationTurn],
        utterance: &str,
    ) -> Result<TurnReport, TurnFailure> {
        let decision = self
            .router
            .route(utterance)
            .await
            .map_err(|error| TurnFailure {
                decision: None,
                notice: None,
                error,
            })?;
        let target = decision.target;

        let notice = if target.is_hub() {
            None
        } else {
            Some(self.announce(target).await)
        };

        self.state.lock().await.phase = TurnPhase::Generating;
        self.publish(TurnPhase::Generating, target);

        let result = match self.responder.respond(target, history, utterance).await {
            Ok(result) => result,
            Err(error) => {
                return Err(TurnFailure {
                    decision: Some(decision),
                    notice,
                    error,
                });
            }
        };

        Ok(TurnReport {
            decision: Some(decision),
            notice,
            reply: ConversationTurn::assistant(target, result.text).with_citation(result.citation),
        })
    }

    /// Post the handover notice and move focus to the specialist
    async fn announce(&self, target: AgentId) -> ConversationTurn {
        let profile = self.registry.lookup(target);
        info!("Navigator delegating to {} ({})", profile.name, target);
        let notice =
            ConversationTurn::notice(format!("Navigator is delegating to {}...", profile.name));
        {
            let mut state = self.state.lock().await;
            state.phase = TurnPhase::Delegating;
            self.append(&mut state, notice.clone());
        }
        self.publish(TurnPhase::Delegating, target);
        notice
    }

    fn append(&self, state: &mut SessionState, turn: ConversationTurn) {
        debug!("Appending {} turn {}", turn.role, turn.id);
        state.transcript.push(turn.clone());
        // No subscribers is fine
        let _ = self.turns.send(turn);
    }

    fn publish(&self, phase: TurnPhase, active_agent: AgentId) {
        self.status.send_replace(SessionStatus {
            phase,
            active_agent,
        });
    }
}
