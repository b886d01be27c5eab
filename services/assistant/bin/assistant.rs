//! Main Entrypoint for the Teller Assistant
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment and CLI flags.
//! 2. Initializing logging.
//! 3. Building the classifier for the configured provider.
//! 4. Assembling the challenge bank and the conversation engine.
//! 5. Running the interactive chat loop.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use teller_assistant::{
    chat,
    config::{self, Config, Provider},
};
use teller_core::{
    challenge::ChallengeBank,
    classifier::{Classifier, LLMClassifier},
    session::{Session, Teller},
};
use tracing::{Instrument, info, info_span};

#[derive(Parser, Debug)]
#[command(
    name = "assistant",
    version,
    about = "Terminal banking assistant with challenge-response identity verification"
)]
struct Args {
    /// Path to a JSON challenge file (overrides CHALLENGES_PATH)
    #[arg(long)]
    challenges: Option<PathBuf>,

    /// Failed attempts allowed per challenge (overrides MAX_AUTH_ATTEMPTS)
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Chat model used for classification (overrides CHAT_MODEL)
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // --- 1. Load Configuration ---
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(path) = args.challenges {
        config.challenges_path = Some(path);
    }
    if let Some(max_attempts) = args.max_attempts {
        config.max_auth_attempts = max_attempts;
    }
    if let Some(model) = args.model {
        config.chat_model = model;
    }

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing the assistant...");

    // --- 3. Build the Classifier ---
    let classifier: Arc<dyn Classifier> = match &config.provider {
        Provider::OpenAI => {
            info!("Using OpenAI provider.");
            let api_key = config.openai_api_key.as_ref().unwrap();
            let openai_config = OpenAIConfig::new()
                .with_api_key(api_key)
                .with_api_base("https://api.openai.com/v1/");
            Arc::new(LLMClassifier::new(openai_config, config.chat_model.clone()))
        }
        Provider::Gemini => {
            info!("Using Gemini provider.");
            let api_key = config.gemini_api_key.as_ref().unwrap();
            let openai_config = OpenAIConfig::new()
                .with_api_key(api_key)
                .with_api_base("https://generativelanguage.googleapis.com/v1beta/openai");
            Arc::new(LLMClassifier::new(openai_config, config.chat_model.clone()))
        }
    };

    // --- 4. Assemble the Conversation Engine ---
    let challenges = match &config.challenges_path {
        Some(path) => config::load_challenges(path)?,
        None => config::default_challenges(),
    };
    let bank = ChallengeBank::new(challenges).context("Invalid challenge bank")?;
    info!(challenges = bank.count(), "Challenge bank ready.");

    let teller = Teller::new(classifier, bank, config.auth_policy())
        .context("Failed to assemble the conversation engine")?;

    // --- 5. Run the Chat Loop ---
    let mut session = Session::new();
    info!(
        provider = ?config.provider,
        model = %config.chat_model,
        max_attempts = config.max_auth_attempts,
        session_id = %session.id(),
        "Assistant configured. Starting chat..."
    );

    let session_span = info_span!("chat_session", session_id = %session.id());
    chat::run(&teller, &mut session).instrument(session_span).await?;

    info!("Assistant has shut down.");
    Ok(())
}
