//! Authentication Engine
//!
//! The per-challenge sub-machine of the conversation flow. It checks caller
//! answers against the challenge bank, consults the classifier to tell wrong
//! answers apart from attempts to dodge the question, and enforces the
//! per-challenge attempt budget. The engine only reports outcomes; moving
//! the session between states is the caller's job.

use crate::challenge::{ChallengeBank, ConfigError};
use crate::classifier::{Classifier, with_deadline};
use crate::session::{Session, SessionError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tunable limits for the verification flow.
#[derive(Debug, Clone, Copy)]
pub struct AuthPolicy {
    /// Failed attempts allowed per challenge before the session is closed.
    pub max_attempts_per_challenge: u32,
    /// Upper bound on any single classifier call.
    pub classifier_timeout: Duration,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            max_attempts_per_challenge: 3,
            classifier_timeout: Duration::from_secs(10),
        }
    }
}

/// What one verification turn did to the caller's standing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Correct answer, with a further challenge waiting.
    Advanced,
    /// Wrong or evasive answer, with budget left on this challenge.
    Retry,
    /// The attempt budget is exhausted. Verification failed.
    Failed,
    /// Correct answer to the last challenge. Verification complete.
    Completed,
}

/// Walks callers through the challenge bank one answer at a time.
pub struct AuthEngine {
    bank: ChallengeBank,
    classifier: Arc<dyn Classifier>,
    policy: AuthPolicy,
}

impl fmt::Debug for AuthEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthEngine")
            .field("bank", &self.bank)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl AuthEngine {
    /// Builds an engine over a validated bank, rejecting unusable policies.
    pub fn new(
        bank: ChallengeBank,
        classifier: Arc<dyn Classifier>,
        policy: AuthPolicy,
    ) -> Result<Self, ConfigError> {
        if policy.max_attempts_per_challenge == 0 {
            return Err(ConfigError::InvalidAttemptLimit);
        }
        Ok(Self {
            bank,
            classifier,
            policy,
        })
    }

    pub fn bank(&self) -> &ChallengeBank {
        &self.bank
    }

    pub fn policy(&self) -> &AuthPolicy {
        &self.policy
    }

    /// Judges one answer to the session's current challenge.
    ///
    /// The comparator runs first; the classifier is consulted only when the
    /// answer does not match, so correct answers never depend on the
    /// language model. Returns the reply to show the caller together with
    /// the outcome the caller maps onto session state.
    pub async fn step(
        &self,
        session: &mut Session,
        answer: &str,
    ) -> Result<(String, StepOutcome), SessionError> {
        let index = session.challenge_index();
        let challenge =
            self.bank
                .challenge_at(index)
                .ok_or(SessionError::ChallengeOutOfRange {
                    index,
                    count: self.bank.count(),
                })?;

        if challenge.accepts(answer) {
            session.advance_challenge();
            return Ok(match self.bank.challenge_at(session.challenge_index()) {
                Some(next) => {
                    debug!(challenge = %next, "challenge cleared, asking the next one");
                    (
                        format!("Correct! Next question: {}", next.prompt),
                        StepOutcome::Advanced,
                    )
                }
                None => (
                    "Authentication successful! You can now access your account balance. \
                     Your current balance is $1,234.56."
                        .to_string(),
                    StepOutcome::Completed,
                ),
            });
        }

        let verdict = with_deadline(
            self.policy.classifier_timeout,
            self.classifier
                .is_topic_change(answer, challenge, session.history()),
        )
        .await;

        let evading = match verdict {
            Ok(evading) => evading,
            Err(error) => {
                // Fail closed: an unreadable verdict counts as evasion.
                warn!(%error, "evasion check failed, treating the reply as a topic change");
                true
            }
        };

        let attempts = session.record_failed_attempt();
        if attempts >= self.policy.max_attempts_per_challenge {
            info!(attempts, evading, "attempt budget exhausted");
            return Ok((
                "Maximum authentication attempts exceeded. This session has ended for security reasons."
                    .to_string(),
                StepOutcome::Failed,
            ));
        }

        let reply = if evading {
            format!(
                "Please complete the authentication process first. {} (Attempt {}/{})",
                challenge.prompt,
                attempts + 1,
                self.policy.max_attempts_per_challenge
            )
        } else {
            format!(
                "That's incorrect. {} (Attempt {}/{})",
                challenge.prompt,
                attempts + 1,
                self.policy.max_attempts_per_challenge
            )
        };
        Ok((reply, StepOutcome::Retry))
    }
}
