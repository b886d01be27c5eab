use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use teller_core::auth::AuthPolicy;
use teller_core::challenge::Challenge;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Defines the supported backend providers for the classifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Gemini,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub provider: Provider,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub chat_model: String,
    pub log_level: Level,
    pub classifier_timeout: Duration,
    pub max_auth_attempts: u32,
    pub challenges_path: Option<PathBuf>,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let provider_str =
            std::env::var("CLASSIFIER_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let provider = match provider_str.to_lowercase().as_str() {
            "gemini" => Provider::Gemini,
            _ => Provider::OpenAI,
        };

        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let gemini_api_key = std::env::var("GEMINI_API_KEY").ok();

        let chat_model = std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let timeout_str =
            std::env::var("CLASSIFIER_TIMEOUT_SECS").unwrap_or_else(|_| "10".to_string());
        let timeout_secs = timeout_str.parse::<u64>().map_err(|_| {
            ConfigError::InvalidValue(
                "CLASSIFIER_TIMEOUT_SECS".to_string(),
                format!("'{}' is not a number of seconds", timeout_str),
            )
        })?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "CLASSIFIER_TIMEOUT_SECS".to_string(),
                "the timeout must be at least one second".to_string(),
            ));
        }

        let max_attempts_str =
            std::env::var("MAX_AUTH_ATTEMPTS").unwrap_or_else(|_| "3".to_string());
        let max_auth_attempts = max_attempts_str.parse::<u32>().map_err(|_| {
            ConfigError::InvalidValue(
                "MAX_AUTH_ATTEMPTS".to_string(),
                format!("'{}' is not a valid attempt count", max_attempts_str),
            )
        })?;

        let challenges_path = std::env::var("CHALLENGES_PATH").ok().map(PathBuf::from);

        match provider {
            Provider::OpenAI => {
                if openai_api_key.is_none() {
                    return Err(ConfigError::MissingVar(
                        "OPENAI_API_KEY must be set for 'openai' provider".to_string(),
                    ));
                }
            }
            Provider::Gemini => {
                if gemini_api_key.is_none() {
                    return Err(ConfigError::MissingVar(
                        "GEMINI_API_KEY must be set for 'gemini' provider".to_string(),
                    ));
                }
            }
        }

        Ok(Self {
            provider,
            openai_api_key,
            gemini_api_key,
            chat_model,
            log_level,
            classifier_timeout: Duration::from_secs(timeout_secs),
            max_auth_attempts,
            challenges_path,
        })
    }

    /// The verification limits this configuration selects.
    pub fn auth_policy(&self) -> AuthPolicy {
        AuthPolicy {
            max_attempts_per_challenge: self.max_auth_attempts,
            classifier_timeout: self.classifier_timeout,
        }
    }
}

/// One entry in a JSON challenge file.
#[derive(Debug, Deserialize)]
struct ChallengeEntry {
    prompt: String,
    answer: String,
}

/// Loads a challenge list from a JSON file of `{"prompt", "answer"}` objects.
pub fn load_challenges(path: &Path) -> anyhow::Result<Vec<Challenge>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read challenge file {}", path.display()))?;
    let entries: Vec<ChallengeEntry> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse challenge file {}", path.display()))?;

    Ok(entries
        .into_iter()
        .map(|entry| Challenge::new(entry.prompt, entry.answer))
        .collect())
}

/// The built-in challenge list used when no file is configured.
pub fn default_challenges() -> Vec<Challenge> {
    vec![
        Challenge::new("What is 20 + 20?".to_string(), "40".to_string()),
        Challenge::new("What is 10 + 10?".to_string(), "20".to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tracing::Level;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("CLASSIFIER_PROVIDER");
            env::remove_var("OPENAI_API_KEY");
            env::remove_var("GEMINI_API_KEY");
            env::remove_var("CHAT_MODEL");
            env::remove_var("RUST_LOG");
            env::remove_var("CLASSIFIER_TIMEOUT_SECS");
            env::remove_var("MAX_AUTH_ATTEMPTS");
            env::remove_var("CHALLENGES_PATH");
        }
    }

    fn set_minimal_env_openai() {
        unsafe {
            env::set_var("CLASSIFIER_PROVIDER", "openai");
            env::set_var("OPENAI_API_KEY", "test-openai-key");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    fn test_provider_debug_and_clone() {
        let openai = Provider::OpenAI;
        let gemini = Provider::Gemini;

        assert!(format!("{:?}", openai).contains("OpenAI"));
        assert!(format!("{:?}", gemini).contains("Gemini"));

        let cloned = openai.clone();
        assert_eq!(openai, cloned);
    }

    #[test]
    #[serial]
    fn test_config_from_env_minimal_openai() {
        clear_env_vars();
        set_minimal_env_openai();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.provider, Provider::OpenAI);
        assert_eq!(config.openai_api_key, Some("test-openai-key".to_string()));
        assert_eq!(config.gemini_api_key, None);
        assert_eq!(config.chat_model, "gpt-4o");
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.classifier_timeout, Duration::from_secs(10));
        assert_eq!(config.max_auth_attempts, 3);
        assert_eq!(config.challenges_path, None);
    }

    #[test]
    #[serial]
    fn test_config_from_env_gemini_provider() {
        clear_env_vars();
        unsafe {
            env::set_var("CLASSIFIER_PROVIDER", "gemini");
            env::set_var("GEMINI_API_KEY", "test-gemini-key");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.provider, Provider::Gemini);
        assert_eq!(config.gemini_api_key, Some("test-gemini-key".to_string()));
        assert_eq!(config.openai_api_key, None);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("CLASSIFIER_PROVIDER", "openai");
            env::set_var("OPENAI_API_KEY", "custom-openai-key");
            env::set_var("GEMINI_API_KEY", "custom-gemini-key");
            env::set_var("CHAT_MODEL", "gpt-4o-mini");
            env::set_var("RUST_LOG", "debug");
            env::set_var("CLASSIFIER_TIMEOUT_SECS", "3");
            env::set_var("MAX_AUTH_ATTEMPTS", "5");
            env::set_var("CHALLENGES_PATH", "/custom/challenges.json");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.provider, Provider::OpenAI);
        assert_eq!(config.openai_api_key, Some("custom-openai-key".to_string()));
        assert_eq!(config.gemini_api_key, Some("custom-gemini-key".to_string()));
        assert_eq!(config.chat_model, "gpt-4o-mini");
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.classifier_timeout, Duration::from_secs(3));
        assert_eq!(config.max_auth_attempts, 5);
        assert_eq!(
            config.challenges_path,
            Some(PathBuf::from("/custom/challenges.json"))
        );
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        unsafe {
            env::set_var("OPENAI_API_KEY", "test-openai-key");
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            _ => panic!("Expected InvalidValue for RUST_LOG"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_timeout() {
        clear_env_vars();
        unsafe {
            env::set_var("OPENAI_API_KEY", "test-openai-key");
            env::set_var("CLASSIFIER_TIMEOUT_SECS", "soon");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "CLASSIFIER_TIMEOUT_SECS"),
            _ => panic!("Expected InvalidValue for CLASSIFIER_TIMEOUT_SECS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_zero_timeout_rejected() {
        clear_env_vars();
        unsafe {
            env::set_var("OPENAI_API_KEY", "test-openai-key");
            env::set_var("CLASSIFIER_TIMEOUT_SECS", "0");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "CLASSIFIER_TIMEOUT_SECS"),
            _ => panic!("Expected InvalidValue for CLASSIFIER_TIMEOUT_SECS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_max_attempts() {
        clear_env_vars();
        unsafe {
            env::set_var("OPENAI_API_KEY", "test-openai-key");
            env::set_var("MAX_AUTH_ATTEMPTS", "many");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "MAX_AUTH_ATTEMPTS"),
            _ => panic!("Expected InvalidValue for MAX_AUTH_ATTEMPTS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_missing_openai_key() {
        clear_env_vars();
        unsafe {
            env::set_var("CLASSIFIER_PROVIDER", "openai");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(msg) => {
                assert!(msg.contains("OPENAI_API_KEY"));
            }
            _ => panic!("Expected MissingVar for OPENAI_API_KEY"),
        }
    }

    #[test]
    #[serial]
    fn test_config_missing_gemini_key() {
        clear_env_vars();
        unsafe {
            env::set_var("CLASSIFIER_PROVIDER", "gemini");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(msg) => {
                assert!(msg.contains("GEMINI_API_KEY"));
            }
            _ => panic!("Expected MissingVar for GEMINI_API_KEY"),
        }
    }

    #[test]
    #[serial]
    fn test_auth_policy_reflects_config() {
        clear_env_vars();
        set_minimal_env_openai();
        unsafe {
            env::set_var("CLASSIFIER_TIMEOUT_SECS", "7");
            env::set_var("MAX_AUTH_ATTEMPTS", "2");
        }

        let policy = Config::from_env().unwrap().auth_policy();

        assert_eq!(policy.max_attempts_per_challenge, 2);
        assert_eq!(policy.classifier_timeout, Duration::from_secs(7));
    }

    #[test]
    fn test_load_challenges_from_json_file() {
        let file = tempfile::NamedTempFile::new().expect("temp file");
        fs::write(
            file.path(),
            r#"[
                {"prompt": "What city were you born in?", "answer": "Tulsa"},
                {"prompt": "What is 20 + 20?", "answer": "40"}
            ]"#,
        )
        .expect("write challenge file");

        let challenges = load_challenges(file.path()).expect("challenges should parse");

        assert_eq!(challenges.len(), 2);
        assert_eq!(challenges[0].prompt, "What city were you born in?");
        assert!(challenges[0].accepts("tulsa"));
        assert!(challenges[1].accepts(" 40 "));
    }

    #[test]
    fn test_load_challenges_rejects_malformed_json() {
        let file = tempfile::NamedTempFile::new().expect("temp file");
        fs::write(file.path(), r#"{"prompt": "not a list"}"#).expect("write challenge file");

        let err = load_challenges(file.path()).unwrap_err();

        assert!(err.to_string().contains("Failed to parse challenge file"));
    }

    #[test]
    fn test_load_challenges_missing_file() {
        let err = load_challenges(Path::new("/nonexistent/challenges.json")).unwrap_err();

        assert!(err.to_string().contains("Failed to read challenge file"));
    }

    #[test]
    fn test_default_challenges_match_the_builtin_bank() {
        let challenges = default_challenges();

        assert_eq!(challenges.len(), 2);
        assert_eq!(challenges[0].prompt, "What is 20 + 20?");
        assert!(challenges[0].accepts("40"));
        assert_eq!(challenges[1].prompt, "What is 10 + 10?");
        assert!(challenges[1].accepts("20"));
    }
}
