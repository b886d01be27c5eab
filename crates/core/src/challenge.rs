use std::fmt;
use thiserror::Error;

/// Errors raised while assembling the verification setup at startup.
///
/// These are fatal: a process that cannot build a valid challenge bank or
/// attempt policy must not start taking conversations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("challenge bank must contain at least one challenge")]
    EmptyBank,
    #[error("challenge {index} has a blank prompt")]
    BlankPrompt { index: usize },
    #[error("challenge {index} has a blank expected answer")]
    BlankAnswer { index: usize },
    #[error("max attempts per challenge must be at least 1")]
    InvalidAttemptLimit,
}

/// Decides whether a caller's answer satisfies a challenge.
///
/// The first argument is the stored expected answer, the second is the
/// caller's raw reply.
pub type AnswerComparator = fn(&str, &str) -> bool;

/// The default comparator: trimmed, ASCII-case-insensitive equality.
fn exact_match(expected: &str, candidate: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(candidate.trim())
}

/// A single identity-verification question with its accepted answer.
///
/// Challenges are immutable once constructed. Answer checking goes through
/// [`Challenge::accepts`], so the matching rule can be swapped per challenge
/// without touching the engine that asks the questions.
#[derive(Debug, Clone)]
pub struct Challenge {
    /// The question shown to the caller.
    pub prompt: String,
    /// The answer the comparator checks candidate replies against.
    pub expected_answer: String,
    comparator: AnswerComparator,
}

impl Challenge {
    /// Creates a challenge using the default matching rule.
    pub fn new(prompt: String, expected_answer: String) -> Self {
        Self::with_comparator(prompt, expected_answer, exact_match)
    }

    /// Creates a challenge with a custom matching rule.
    pub fn with_comparator(
        prompt: String,
        expected_answer: String,
        comparator: AnswerComparator,
    ) -> Self {
        Self {
            prompt,
            expected_answer,
            comparator,
        }
    }

    /// Checks a caller's reply against the expected answer.
    pub fn accepts(&self, candidate: &str) -> bool {
        (self.comparator)(&self.expected_answer, candidate)
    }
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prompt)
    }
}

/// An ordered, read-only set of challenges a caller must clear in sequence.
///
/// The bank is validated at construction and never empty afterwards, so
/// `first()` is always safe to call.
#[derive(Debug, Clone)]
pub struct ChallengeBank {
    challenges: Vec<Challenge>,
}

impl ChallengeBank {
    /// Validates and wraps an ordered list of challenges.
    pub fn new(challenges: Vec<Challenge>) -> Result<Self, ConfigError> {
        if challenges.is_empty() {
            return Err(ConfigError::EmptyBank);
        }
        for (index, challenge) in challenges.iter().enumerate() {
            if challenge.prompt.trim().is_empty() {
                return Err(ConfigError::BlankPrompt { index });
            }
            if challenge.expected_answer.trim().is_empty() {
                return Err(ConfigError::BlankAnswer { index });
            }
        }
        Ok(Self { challenges })
    }

    /// Returns the challenge at `index`, or `None` past the end of the bank.
    pub fn challenge_at(&self, index: usize) -> Option<&Challenge> {
        self.challenges.get(index)
    }

    /// The first challenge, asked when verification begins.
    pub fn first(&self) -> &Challenge {
        &self.challenges[0]
    }

    /// Number of challenges a caller must clear.
    pub fn count(&self) -> usize {
        self.challenges.len()
    }
}
