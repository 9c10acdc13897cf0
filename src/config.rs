use crate::defaults;
use crate::error::{RelayError, Result};
use crate::upstream::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub retry: RetryConfig,
    pub generation: GenerationConfig,
    pub transcription: TranscriptionConfig,
}

/// Inbound HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub max_upload_bytes: usize,
}

/// Remote Azure OpenAI service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub chat_deployment: Option<String>,
    pub transcription_deployment: Option<String>,
    pub api_version: String,
    pub attempt_timeout_secs: u64,
}

/// Retry behaviour for upstream calls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub transcription_max_attempts: u32,
}

/// Chat-completion request parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub system_prompt: String,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub max_tokens: u32,
}

/// Upload staging and forwarding configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub upload_dir: Option<PathBuf>,
    pub file_name: String,
    pub mime_type: String,
}

/// Everything needed to reach one upstream deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: defaults::BIND_ADDR.to_string(),
            max_upload_bytes: defaults::MAX_UPLOAD_BYTES,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            chat_deployment: None,
            transcription_deployment: None,
            api_version: defaults::API_VERSION.to_string(),
            attempt_timeout_secs: defaults::ATTEMPT_TIMEOUT_SECS,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::MAX_ATTEMPTS,
            initial_delay_ms: defaults::INITIAL_RETRY_DELAY_MS,
            max_delay_ms: defaults::MAX_RETRY_DELAY_MS,
            transcription_max_attempts: defaults::TRANSCRIPTION_MAX_ATTEMPTS,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            system_prompt: defaults::SYSTEM_PROMPT.to_string(),
            temperature: defaults::TEMPERATURE,
            top_p: defaults::TOP_P,
            frequency_penalty: defaults::FREQUENCY_PENALTY,
            presence_penalty: defaults::PRESENCE_PENALTY,
            max_tokens: defaults::MAX_TOKENS,
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            upload_dir: None,
            file_name: defaults::AUDIO_FILE_NAME.to_string(),
            mime_type: defaults::AUDIO_MIME_TYPE.to_string(),
        }
    }
}

impl UpstreamConfig {
    /// Per-attempt deadline for upstream calls, at least one second.
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs.max(1))
    }

    /// Credentials for the chat-completion deployment.
    ///
    /// Fails with a configuration error if the endpoint, key, or chat
    /// deployment is missing.
    pub fn chat_credentials(&self) -> Result<Credentials> {
        self.credentials_for(self.chat_deployment.as_deref(), "chat deployment")
    }

    /// Credentials for the transcription deployment.
    pub fn transcription_credentials(&self) -> Result<Credentials> {
        self.credentials_for(
            self.transcription_deployment.as_deref(),
            "transcription deployment",
        )
    }

    fn credentials_for(&self, deployment: Option<&str>, what: &str) -> Result<Credentials> {
        let (Some(endpoint), Some(api_key)) = (non_empty(&self.endpoint), non_empty(&self.api_key))
        else {
            return Err(RelayError::configuration(
                "Azure OpenAI credentials not configured",
            ));
        };
        let deployment = deployment
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| RelayError::configuration(format!("Azure OpenAI {what} not configured")))?;

        Ok(Credentials {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            deployment: deployment.to_string(),
            api_version: self.api_version.clone(),
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl RetryConfig {
    /// Retry policy for streaming generation calls.
    pub fn generation_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }

    /// Retry policy for transcription calls.
    pub fn transcription_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.transcription_max_attempts,
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

impl TranscriptionConfig {
    /// Directory where uploads are staged.
    pub fn upload_dir(&self) -> PathBuf {
        self.upload_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(RelayError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - AZURE_OPENAI_ENDPOINT → upstream.endpoint
    /// - AZURE_OPENAI_API_KEY → upstream.api_key
    /// - AZURE_OPENAI_DEPLOYMENT_NAME → upstream.chat_deployment
    /// - AZURE_OPENAI_WHISPER_DEPLOYMENT → upstream.transcription_deployment
    /// - TOKENRELAY_BIND → server.bind
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(endpoint) = env_value("AZURE_OPENAI_ENDPOINT") {
            self.upstream.endpoint = Some(endpoint);
        }

        if let Some(api_key) = env_value("AZURE_OPENAI_API_KEY") {
            self.upstream.api_key = Some(api_key);
        }

        if let Some(deployment) = env_value("AZURE_OPENAI_DEPLOYMENT_NAME") {
            self.upstream.chat_deployment = Some(deployment);
        }

        if let Some(deployment) = env_value("AZURE_OPENAI_WHISPER_DEPLOYMENT") {
            self.upstream.transcription_deployment = Some(deployment);
        }

        if let Some(bind) = env_value("TOKENRELAY_BIND") {
            self.server.bind = bind;
        }

        self
    }

    /// Copy of this configuration that is safe to print.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.upstream.api_key.is_some() {
            config.upstream.api_key = Some("********".to_string());
        }
        config
    }

    /// Serialize to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| RelayError::Other(e.to_string()))
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/tokenrelay/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("tokenrelay")
            .join("config.toml")
    }

    /// Commented configuration template.
    pub fn template() -> String {
        format!(
            r#"# tokenrelay configuration

[server]
# Listen address (env: TOKENRELAY_BIND)
bind = "{bind}"
# Largest accepted upload in bytes
max_upload_bytes = {max_upload}

[upstream]
# Azure OpenAI resource URL (env: AZURE_OPENAI_ENDPOINT)
# endpoint = "https://my-resource.openai.azure.com"
# API key (env: AZURE_OPENAI_API_KEY)
# api_key = ""
# Chat-completion deployment (env: AZURE_OPENAI_DEPLOYMENT_NAME)
# chat_deployment = "gpt-4o"
# Transcription deployment (env: AZURE_OPENAI_WHISPER_DEPLOYMENT)
# transcription_deployment = "whisper"
api_version = "{api_version}"
# Deadline for one upstream attempt
attempt_timeout_secs = {timeout}

[retry]
max_attempts = {attempts}
initial_delay_ms = {initial}
max_delay_ms = {max}
transcription_max_attempts = {transcription_attempts}

[generation]
temperature = {temperature:?}
top_p = {top_p:?}
frequency_penalty = {frequency:?}
presence_penalty = {presence:?}
max_tokens = {max_tokens}

[transcription]
# Staging directory for uploads (default: system temp dir)
# upload_dir = "/var/tmp/tokenrelay"
file_name = "{file_name}"
mime_type = "{mime}"
"#,
            bind = defaults::BIND_ADDR,
            max_upload = defaults::MAX_UPLOAD_BYTES,
            api_version = defaults::API_VERSION,
            timeout = defaults::ATTEMPT_TIMEOUT_SECS,
            attempts = defaults::MAX_ATTEMPTS,
            initial = defaults::INITIAL_RETRY_DELAY_MS,
            max = defaults::MAX_RETRY_DELAY_MS,
            transcription_attempts = defaults::TRANSCRIPTION_MAX_ATTEMPTS,
            temperature = defaults::TEMPERATURE,
            top_p = defaults::TOP_P,
            frequency = defaults::FREQUENCY_PENALTY,
            presence = defaults::PRESENCE_PENALTY,
            max_tokens = defaults::MAX_TOKENS,
            file_name = defaults::AUDIO_FILE_NAME,
            mime = defaults::AUDIO_MIME_TYPE,
        )
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "AZURE_OPENAI_ENDPOINT",
        "AZURE_OPENAI_API_KEY",
        "AZURE_OPENAI_DEPLOYMENT_NAME",
        "AZURE_OPENAI_WHISPER_DEPLOYMENT",
        "TOKENRELAY_BIND",
    ];

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn clear_relay_env() {
        for key in ENV_KEYS {
            unsafe { std::env::remove_var(key) }
        }
    }

    fn configured_upstream() -> UpstreamConfig {
        UpstreamConfig {
            endpoint: Some("https://example.openai.azure.com/".to_string()),
            api_key: Some("secret".to_string()),
            chat_deployment: Some("gpt".to_string()),
            transcription_deployment: Some("whisper".to_string()),
            ..UpstreamConfig::default()
        }
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.server.bind, "127.0.0.1:3000");
        assert_eq!(config.server.max_upload_bytes, 25 * 1024 * 1024);

        assert_eq!(config.upstream.endpoint, None);
        assert_eq!(config.upstream.api_version, "2024-02-15-preview");
        assert_eq!(config.upstream.attempt_timeout(), Duration::from_secs(30));

        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_delay_ms, 1000);
        assert_eq!(config.retry.max_delay_ms, 5000);
        assert_eq!(config.retry.transcription_max_attempts, 1);

        assert_eq!(config.generation.max_tokens, 1500);
        assert_eq!(config.transcription.file_name, "audio.mp3");
        assert_eq!(config.transcription.mime_type, "audio/mpeg");
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            [server]
            bind = "0.0.0.0:8080"

            [upstream]
            endpoint = "https://example.openai.azure.com"
            api_key = "secret"
            chat_deployment = "gpt-4o"
            transcription_deployment = "whisper"
            attempt_timeout_secs = 10

            [retry]
            max_attempts = 5
            transcription_max_attempts = 2

            [generation]
            temperature = 0.2
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.upstream.chat_deployment.as_deref(), Some("gpt-4o"));
        assert_eq!(config.upstream.attempt_timeout_secs, 10);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.transcription_max_attempts, 2);
        assert_eq!(config.generation.temperature, 0.2);

        // Untouched fields keep their defaults
        assert_eq!(config.retry.initial_delay_ms, 1000);
        assert_eq!(config.generation.max_tokens, 1500);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[server\nbind = \"broken").unwrap();

        let result = Config::load(temp_file.path());
        assert!(matches!(result, Err(RelayError::ConfigParse(_))));
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let missing_path = Path::new("/tmp/nonexistent_tokenrelay_config_12345.toml");
        let config = Config::load_or_default(missing_path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_or_default_rejects_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[upstream\n").unwrap();

        assert!(Config::load_or_default(temp_file.path()).is_err());
    }

    #[test]
    fn test_env_overrides_upstream() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_relay_env();

        set_env("AZURE_OPENAI_ENDPOINT", "https://env.openai.azure.com");
        set_env("AZURE_OPENAI_API_KEY", "env-key");
        set_env("AZURE_OPENAI_DEPLOYMENT_NAME", "env-gpt");
        set_env("AZURE_OPENAI_WHISPER_DEPLOYMENT", "env-whisper");
        set_env("TOKENRELAY_BIND", "0.0.0.0:9000");

        let config = Config::default().with_env_overrides();

        assert_eq!(
            config.upstream.endpoint.as_deref(),
            Some("https://env.openai.azure.com")
        );
        assert_eq!(config.upstream.api_key.as_deref(), Some("env-key"));
        assert_eq!(config.upstream.chat_deployment.as_deref(), Some("env-gpt"));
        assert_eq!(
            config.upstream.transcription_deployment.as_deref(),
            Some("env-whisper")
        );
        assert_eq!(config.server.bind, "0.0.0.0:9000");

        clear_relay_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_relay_env();

        set_env("AZURE_OPENAI_API_KEY", "");
        let config = Config::default().with_env_overrides();
        assert_eq!(config.upstream.api_key, None);

        clear_relay_env();
    }

    #[test]
    fn test_zero_attempt_timeout_is_raised_to_one_second() {
        let upstream = UpstreamConfig {
            attempt_timeout_secs: 0,
            ..UpstreamConfig::default()
        };
        assert_eq!(upstream.attempt_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_chat_credentials_trim_trailing_slash() {
        let credentials = configured_upstream().chat_credentials().unwrap();
        assert_eq!(credentials.endpoint, "https://example.openai.azure.com");
        assert_eq!(credentials.deployment, "gpt");
        assert_eq!(credentials.api_version, "2024-02-15-preview");
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        let upstream = UpstreamConfig {
            api_key: None,
            ..configured_upstream()
        };
        let err = upstream.transcription_credentials().unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.to_string(), "Azure OpenAI credentials not configured");
    }

    #[test]
    fn test_blank_endpoint_is_configuration_error() {
        let upstream = UpstreamConfig {
            endpoint: Some("   ".to_string()),
            ..configured_upstream()
        };
        assert!(matches!(
            upstream.chat_credentials(),
            Err(RelayError::Configuration { .. })
        ));
    }

    #[test]
    fn test_missing_deployment_is_configuration_error() {
        let upstream = UpstreamConfig {
            transcription_deployment: None,
            ..configured_upstream()
        };
        let err = upstream.transcription_credentials().unwrap_err();
        assert!(err.to_string().contains("transcription deployment"));
        assert!(upstream.chat_credentials().is_ok());
    }

    #[test]
    fn test_policies_follow_retry_section() {
        let retry = RetryConfig::default();
        let generation = retry.generation_policy();
        assert_eq!(generation.max_attempts(), 3);
        assert_eq!(generation.delay_for_attempt(1), Duration::from_millis(1000));

        let transcription = retry.transcription_policy();
        assert_eq!(transcription.max_attempts(), 1);
    }

    #[test]
    fn test_redacted_hides_api_key() {
        let config = Config {
            upstream: configured_upstream(),
            ..Config::default()
        };
        let redacted = config.redacted();
        assert_eq!(redacted.upstream.api_key.as_deref(), Some("********"));
        assert_eq!(redacted.upstream.endpoint, config.upstream.endpoint);
    }

    #[test]
    fn test_template_parses_to_defaults() {
        let config: Config = toml::from_str(&Config::template()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_to_toml_roundtrips() {
        let config = Config {
            upstream: configured_upstream(),
            ..Config::default()
        };
        let text = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_default_path_ends_with_config_toml() {
        let path = Config::default_path();
        let path_str = path.to_string_lossy();
        assert!(path_str.contains("tokenrelay"));
        assert!(path_str.ends_with("config.toml"));
    }
}
