use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_GENERATION_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 500;
pub const DEFAULT_RETRIEVAL_K: usize = 3;
pub const DEFAULT_MIN_CONTEXT_LENGTH: usize = 100;
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_INDEX_PATH: &str = "./vectorstore/index.json";
pub const DEFAULT_AUDIT_LOG_PATH: &str = "./logs/conversations.jsonl";

pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Process-wide settings, resolved once at startup and passed by reference
/// into the pipeline and its collaborators. Nothing here changes mid-session.
#[derive(Clone)]
pub struct PipelineConfig {
    pub api_key: String,
    pub model: String,
    pub api_base_url: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub retrieval_k: usize,
    pub min_context_length: usize,
    pub generation_timeout: Duration,
    pub index_path: PathBuf,
    pub audit_log_path: PathBuf,
    /// External policy document; the built-in policy is used when unset.
    pub policy_path: Option<PathBuf>,
}

impl std::fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("api_base_url", &self.api_base_url)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("retrieval_k", &self.retrieval_k)
            .field("min_context_length", &self.min_context_length)
            .field("generation_timeout", &self.generation_timeout)
            .field("index_path", &self.index_path)
            .field("audit_log_path", &self.audit_log_path)
            .field("policy_path", &self.policy_path)
            .finish()
    }
}

impl PipelineConfig {
    /// Config with every default applied and the given credential.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            api_base_url: DEFAULT_GENERATION_URL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            retrieval_k: DEFAULT_RETRIEVAL_K,
            min_context_length: DEFAULT_MIN_CONTEXT_LENGTH,
            generation_timeout: Duration::from_secs(DEFAULT_GENERATION_TIMEOUT_SECS),
            index_path: PathBuf::from(DEFAULT_INDEX_PATH),
            audit_log_path: PathBuf::from(DEFAULT_AUDIT_LOG_PATH),
            policy_path: None,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve the config through an arbitrary variable source.
    /// `from_env` is this with the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_key = read(API_KEY_ENV).ok_or(ConfigError::Missing(API_KEY_ENV))?;
        let mut config = Self::with_api_key(api_key);

        if let Some(model) = read("CALMLINE_MODEL") {
            config.model = model;
        }
        if let Some(url) = read("CALMLINE_GENERATION_URL") {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(raw) = read("CALMLINE_TEMPERATURE") {
            let value: f32 = parse_number("CALMLINE_TEMPERATURE", &raw)?;
            if !(0.0..=2.0).contains(&value) {
                return Err(invalid(
                    "CALMLINE_TEMPERATURE",
                    raw,
                    "must be within 0.0..=2.0",
                ));
            }
            config.temperature = value;
        }
        if let Some(raw) = read("CALMLINE_MAX_OUTPUT_TOKENS") {
            let value: u32 = parse_number("CALMLINE_MAX_OUTPUT_TOKENS", &raw)?;
            if value == 0 {
                return Err(invalid(
                    "CALMLINE_MAX_OUTPUT_TOKENS",
                    raw,
                    "must be at least 1",
                ));
            }
            config.max_output_tokens = value;
        }
        if let Some(raw) = read("CALMLINE_RETRIEVAL_K") {
            let value: usize = parse_number("CALMLINE_RETRIEVAL_K", &raw)?;
            if value == 0 {
                return Err(invalid("CALMLINE_RETRIEVAL_K", raw, "must be at least 1"));
            }
            config.retrieval_k = value;
        }
        if let Some(raw) = read("CALMLINE_MIN_CONTEXT_LENGTH") {
            config.min_context_length = parse_number("CALMLINE_MIN_CONTEXT_LENGTH", &raw)?;
        }
        if let Some(raw) = read("CALMLINE_GENERATION_TIMEOUT_SECS") {
            let secs: u64 = parse_number("CALMLINE_GENERATION_TIMEOUT_SECS", &raw)?;
            if secs == 0 {
                return Err(invalid(
                    "CALMLINE_GENERATION_TIMEOUT_SECS",
                    raw,
                    "must be at least 1",
                ));
            }
            config.generation_timeout = Duration::from_secs(secs);
        }
        if let Some(path) = read("CALMLINE_INDEX_PATH") {
            config.index_path = PathBuf::from(path);
        }
        if let Some(path) = read("CALMLINE_AUDIT_LOG") {
            config.audit_log_path = PathBuf::from(path);
        }
        config.policy_path = read("CALMLINE_POLICY_PATH").map(PathBuf::from);

        Ok(config)
    }
}

/// The part of the config the answer pipeline itself consults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    pub retrieval_k: usize,
    pub min_context_length: usize,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub generation_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            retrieval_k: DEFAULT_RETRIEVAL_K,
            min_context_length: DEFAULT_MIN_CONTEXT_LENGTH,
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            generation_timeout: Duration::from_secs(DEFAULT_GENERATION_TIMEOUT_SECS),
        }
    }
}

impl From<&PipelineConfig> for PipelineSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            retrieval_k: config.retrieval_k,
            min_context_length: config.min_context_length,
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            generation_timeout: config.generation_timeout,
        }
    }
}

fn parse_number<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| invalid(var, raw.to_string(), &e.to_string()))
}

fn invalid(var: &'static str, value: String, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value,
        reason: reason.to_string(),
    }
}
