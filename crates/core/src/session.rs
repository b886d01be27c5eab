//! Conversation Session State Machine
//!
//! This module implements the assistant's conversation flow: a caller states
//! what they want, proves their identity against a bank of security
//! questions, and either reaches their account balance or has the session
//! closed on them. A [`Session`] is a plain value owned by the caller; the
//! [`Teller`] keeps no per-conversation state, so a single instance can
//! drive any number of sessions.

use crate::auth::{AuthEngine, AuthPolicy, StepOutcome};
use crate::challenge::{ChallengeBank, ConfigError};
use crate::classifier::{Classifier, Intent, with_deadline};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Waiting to learn what the caller wants.
    IntentDetection,
    /// Walking the caller through the security questions.
    Authentication,
    /// Identity verified; the account balance has been released.
    Success,
    /// Closed without success. No further turns are processed.
    Terminal,
}

impl SessionState {
    /// Whether the session accepts further turns.
    pub fn is_closed(&self) -> bool {
        matches!(self, SessionState::Success | SessionState::Terminal)
    }

    /// The fixed line shown to a caller who keeps typing into a closed
    /// session, if this state is a closed one.
    pub fn closed_reply(&self) -> Option<&'static str> {
        match self {
            SessionState::Terminal => {
                Some("This conversation has ended. Please start a new session.")
            }
            SessionState::Success => Some(
                "You have successfully accessed your account information. \
                 Is there anything else I can help you with?",
            ),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::IntentDetection => write!(f, "intent_detection"),
            SessionState::Authentication => write!(f, "authentication"),
            SessionState::Success => write!(f, "success"),
            SessionState::Terminal => write!(f, "terminal"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageRole {
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// One entry in a session transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

/// The full record of one conversation.
///
/// All fields are private: the state, transcript, and attempt counters only
/// change through [`Teller::process_turn`], which keeps the bookkeeping
/// consistent with the state machine. Failed turns leave the session
/// untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    id: Uuid,
    state: SessionState,
    history: Vec<Message>,
    challenge_index: usize,
    failed_attempts: u32,
    created_at: DateTime<Utc>,
}

impl Session {
    /// Opens a fresh session awaiting the caller's first message.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::IntentDetection,
            history: Vec::new(),
            challenge_index: 0,
            failed_attempts: 0,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The transcript so far, oldest message first.
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Index of the challenge the caller is currently answering.
    pub fn challenge_index(&self) -> usize {
        self.challenge_index
    }

    /// Failed attempts recorded against the current challenge.
    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    pub(crate) fn push_message(&mut self, role: MessageRole, content: String) {
        self.history.push(Message { role, content });
    }

    /// Moves to the next challenge and resets the attempt counter.
    pub(crate) fn advance_challenge(&mut self) {
        self.challenge_index += 1;
        self.failed_attempts = 0;
    }

    /// Counts one failed attempt and returns the new total.
    pub(crate) fn record_failed_attempt(&mut self) -> u32 {
        self.failed_attempts += 1;
        self.failed_attempts
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Contract violations reported to the integrating caller.
///
/// These are caller bugs, not conversation outcomes: the session is left
/// exactly as it was.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is already closed ({0})")]
    AlreadyClosed(SessionState),
    #[error("challenge index {index} is out of range for a bank of {count}")]
    ChallengeOutOfRange { index: usize, count: usize },
}

/// The assistant's conversation engine.
///
/// Holds the classifier, the challenge bank, and the attempt policy; drives
/// caller-owned [`Session`] values one turn at a time.
pub struct Teller {
    classifier: Arc<dyn Classifier>,
    auth: AuthEngine,
}

impl Teller {
    /// Assembles the engine, validating the bank and policy up front.
    pub fn new(
        classifier: Arc<dyn Classifier>,
        bank: ChallengeBank,
        policy: AuthPolicy,
    ) -> Result<Self, ConfigError> {
        let auth = AuthEngine::new(bank, Arc::clone(&classifier), policy)?;
        Ok(Self { classifier, auth })
    }

    /// Processes one caller message and returns the assistant's reply.
    ///
    /// Exactly one user message and one assistant message are appended to
    /// the transcript per successful call. Calling this on a closed session
    /// is an error and leaves the session unchanged.
    pub async fn process_turn(
        &self,
        session: &mut Session,
        user_text: &str,
    ) -> Result<String, SessionError> {
        let reply = match session.state() {
            SessionState::Success | SessionState::Terminal => {
                return Err(SessionError::AlreadyClosed(session.state()));
            }
            SessionState::IntentDetection => self.detect_intent(session, user_text).await,
            SessionState::Authentication => {
                let (reply, outcome) = self.auth.step(session, user_text).await?;
                match outcome {
                    StepOutcome::Completed => {
                        session.set_state(SessionState::Success);
                        info!(session_id = %session.id(), "identity verified, session succeeded");
                    }
                    StepOutcome::Failed => {
                        session.set_state(SessionState::Terminal);
                        info!(session_id = %session.id(), "attempt budget exhausted, session terminated");
                    }
                    StepOutcome::Advanced | StepOutcome::Retry => {}
                }
                reply
            }
        };

        session.push_message(MessageRole::User, user_text.to_string());
        session.push_message(MessageRole::Assistant, reply.clone());
        Ok(reply)
    }

    /// First-turn handling: tag the caller's intent and route the session.
    async fn detect_intent(&self, session: &mut Session, user_text: &str) -> String {
        let limit = self.auth.policy().classifier_timeout;
        let verdict = with_deadline(
            limit,
            self.classifier.classify_intent(user_text, session.history()),
        )
        .await;

        let intent = match verdict {
            Ok(intent) => intent,
            Err(error) => {
                // Fail closed: an unreachable classifier must not open the
                // authentication flow.
                warn!(session_id = %session.id(), %error, "intent classification failed, treating intent as unsupported");
                Intent::Other
            }
        };

        if intent.requires_authentication() {
            session.set_state(SessionState::Authentication);
            info!(session_id = %session.id(), %intent, "intent accepted, starting identity verification");
            format!(
                "I can help you check your account balance. Let me verify your identity first.\
                 \n\nPlease answer the following security question: {}",
                self.auth.bank().first().prompt
            )
        } else {
            session.set_state(SessionState::Terminal);
            info!(session_id = %session.id(), %intent, "unsupported intent, closing session");
            "I'm sorry, I can only help with account balance inquiries at this time.".to_string()
        }
    }
}
