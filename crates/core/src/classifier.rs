use crate::challenge::Challenge;
use crate::session::Message;
use anyhow::Context;
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// What the caller is asking the assistant to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intent {
    /// The caller wants to see their account balance.
    BalanceInquiry,
    /// Anything the assistant does not handle.
    Other,
}

impl Intent {
    /// Whether acting on this intent requires the caller to verify their
    /// identity first.
    pub fn requires_authentication(&self) -> bool {
        matches!(self, Intent::BalanceInquiry)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::BalanceInquiry => write!(f, "account_balance"),
            Intent::Other => write!(f, "other"),
        }
    }
}

/// Failures of the classification backend.
///
/// The conversation flow recovers from every variant by falling back to the
/// restrictive verdict; none of these surface to the caller.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier unavailable: {0}")]
    Unavailable(#[from] anyhow::Error),
    #[error("unrecognized classifier verdict: {0:?}")]
    Malformed(String),
    #[error("classifier timed out after {0:?}")]
    Timeout(Duration),
}

/// The language-model capability the conversation flow depends on.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Tags a caller message with the intent it expresses.
    async fn classify_intent(
        &self,
        text: &str,
        history: &[Message],
    ) -> Result<Intent, ClassifierError>;

    /// Judges whether a reply to `challenge` is an answer attempt or an
    /// attempt to steer the conversation away from verification.
    async fn is_topic_change(
        &self,
        text: &str,
        challenge: &Challenge,
        history: &[Message],
    ) -> Result<bool, ClassifierError>;
}

/// Runs a classifier call with an upper bound on how long it may take.
pub(crate) async fn with_deadline<T, F>(limit: Duration, call: F) -> Result<T, ClassifierError>
where
    F: Future<Output = Result<T, ClassifierError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(verdict) => verdict,
        Err(_) => Err(ClassifierError::Timeout(limit)),
    }
}

const INTENT_PROMPT: &str = r#"Analyze the following user message and determine their intent.

User message: "{text}"

Classify the intent as one of the following:
- "account_balance": If the user wants to check account balance, account details, or similar banking information
- "other": For any other request

Respond with only one line in the format:
INTENT: [intent_type]"#;

const TOPIC_CHANGE_PROMPT: &str = r#"During an authentication process where I asked the security question "{question}", the user responded with: "{text}"

Determine if the user is:
1. Attempting to answer the security question (even if incorrect)
2. Trying to change the topic or avoid authentication

Examples of answering: "40", "thirty", "I think it's 50", "um... 45?"
Examples of changing topic: "I need help with something else", "can you do something different", "forget that"

Respond with only: ANSWERING or CHANGING_TOPIC"#;

fn parse_intent(raw: &str) -> Result<Intent, ClassifierError> {
    if raw.contains("INTENT: account_balance") {
        Ok(Intent::BalanceInquiry)
    } else if raw.contains("INTENT: other") {
        Ok(Intent::Other)
    } else {
        Err(ClassifierError::Malformed(raw.to_string()))
    }
}

fn parse_topic_change(raw: &str) -> Result<bool, ClassifierError> {
    if raw.contains("CHANGING_TOPIC") {
        Ok(true)
    } else if raw.contains("ANSWERING") {
        Ok(false)
    } else {
        Err(ClassifierError::Malformed(raw.to_string()))
    }
}

/// A `Classifier` backed by any OpenAI-compatible chat completion API.
///
/// Both checks are single-shot prompts with a low temperature and a strict
/// one-line response format, parsed by marker rather than by JSON so that
/// chatty models still produce usable verdicts.
pub struct LLMClassifier {
    client: Client<OpenAIConfig>,
    model: String,
}

impl LLMClassifier {
    /// Creates a new classifier over an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    /// * `model` - The model identifier to use for classification (e.g., "gpt-4o").
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }

    async fn complete(&self, prompt: String, max_tokens: u32) -> anyhow::Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(0.1f32)
            .max_completion_tokens(max_tokens)
            .messages(vec![
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt)
                    .build()?
                    .into(),
            ])
            .build()?;

        let response = self.client.chat().create(request).await?;

        let content = response
            .choices
            .get(0)
            .context("No response choice from classifier model")?
            .message
            .content
            .as_ref()
            .context("No content in classifier response")?;

        Ok(content.clone())
    }
}

#[async_trait]
impl Classifier for LLMClassifier {
    async fn classify_intent(
        &self,
        text: &str,
        _history: &[Message],
    ) -> Result<Intent, ClassifierError> {
        let prompt = INTENT_PROMPT.replace("{text}", text);
        let raw = self.complete(prompt, 150).await?;
        parse_intent(&raw)
    }

    async fn is_topic_change(
        &self,
        text: &str,
        challenge: &Challenge,
        _history: &[Message],
    ) -> Result<bool, ClassifierError> {
        let prompt = TOPIC_CHANGE_PROMPT
            .replace("{question}", &challenge.prompt)
            .replace("{text}", text);
        let raw = self.complete(prompt, 20).await?;
        parse_topic_change(&raw)
    }
}

/// A fixed-verdict `Classifier` for development and testing.
///
/// This implementation returns the same verdicts for every call, which is
/// useful for exercising the conversation flow without external dependencies
/// or API costs.
pub struct StaticClassifier {
    intent: Intent,
    topic_change: bool,
}

impl StaticClassifier {
    /// Creates a classifier that always reports `intent` and `topic_change`.
    pub fn new(intent: Intent, topic_change: bool) -> Self {
        Self {
            intent,
            topic_change,
        }
    }
}

#[async_trait]
impl Classifier for StaticClassifier {
    async fn classify_intent(
        &self,
        _text: &str,
        _history: &[Message],
    ) -> Result<Intent, ClassifierError> {
        Ok(self.intent)
    }

    async fn is_topic_change(
        &self,
        _text: &str,
        _challenge: &Challenge,
        _history: &[Message],
    ) -> Result<bool, ClassifierError> {
        Ok(self.topic_change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_marker_is_parsed_from_noisy_output() {
        assert_eq!(
            parse_intent("INTENT: account_balance").unwrap(),
            Intent::BalanceInquiry
        );
        assert_eq!(
            parse_intent("Sure!\nINTENT: account_balance\nAnything else?").unwrap(),
            Intent::BalanceInquiry
        );
        assert_eq!(parse_intent("INTENT: other").unwrap(), Intent::Other);
    }

    #[test]
    fn unrecognized_intent_output_is_an_error() {
        let err = parse_intent("the user wants pizza").unwrap_err();
        assert!(matches!(err, ClassifierError::Malformed(_)));
    }

    #[test]
    fn topic_change_marker_wins_over_answering() {
        // A verbose model may emit both words; the evasive verdict wins.
        assert!(parse_topic_change("CHANGING_TOPIC").unwrap());
        assert!(parse_topic_change("not ANSWERING, CHANGING_TOPIC").unwrap());
        assert!(!parse_topic_change("ANSWERING").unwrap());
    }

    #[test]
    fn unrecognized_topic_output_is_an_error() {
        let err = parse_topic_change("maybe?").unwrap_err();
        assert!(matches!(err, ClassifierError::Malformed(_)));
    }

    #[test]
    fn intent_display_matches_wire_tags() {
        assert_eq!(Intent::BalanceInquiry.to_string(), "account_balance");
        assert_eq!(Intent::Other.to_string(), "other");
    }

    #[test]
    fn only_balance_inquiries_require_authentication() {
        assert!(Intent::BalanceInquiry.requires_authentication());
        assert!(!Intent::Other.requires_authentication());
    }

    #[tokio::test]
    async fn static_classifier_reports_fixed_verdicts() {
        let classifier = StaticClassifier::new(Intent::BalanceInquiry, true);
        let challenge = Challenge::new("What is 20 + 20?".to_string(), "40".to_string());

        let intent = classifier.classify_intent("hi", &[]).await.unwrap();
        let evading = classifier.is_topic_change("hi", &challenge, &[]).await.unwrap();

        assert_eq!(intent, Intent::BalanceInquiry);
        assert!(evading);
    }

    #[tokio::test]
    async fn deadline_cuts_off_a_stalled_call() {
        let stalled = std::future::pending::<Result<bool, ClassifierError>>();
        let verdict = with_deadline(Duration::from_millis(10), stalled).await;

        assert!(matches!(verdict, Err(ClassifierError::Timeout(_))));
    }

    #[tokio::test]
    async fn deadline_passes_through_a_fast_call() {
        let verdict = with_deadline(Duration::from_secs(1), async { Ok(true) }).await;

        assert!(verdict.unwrap());
    }
}
