//! Configuration types for conversations and the motion scheduler.

use std::fmt;
use std::time::Duration;

use crate::format::{REMOTE_OUTPUT_RATE, SUPPORTED_RATES};
use crate::ConfigError;

/// Environment variable holding the remote service credential.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Environment variable overriding the remote model identifier.
pub const MODEL_ENV: &str = "GEMINI_MODEL";

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";

/// Persona prompt used when no system instruction is configured.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are Reachy Mini, a friendly desk companion robot. \
     You help with tasks, answer questions, and provide companionship. \
     Keep your responses natural and conversational. Be brief but helpful.";

/// Prompt sent when an initial greeting is requested.
pub const DEFAULT_GREETING: &str = "Say hello and introduce yourself as Reachy Mini, \
     a friendly desk companion. Keep it brief.";

/// Configuration for a conversation session.
///
/// Build with [`ConversationConfig::new()`] or [`ConversationConfig::from_env()`];
/// both validate the credential up front. Adjust the remaining fields
/// directly and call [`validate()`](Self::validate) if you change rates or
/// capacities.
///
/// # Example
///
/// ```
/// use companion_runtime::ConversationConfig;
/// use std::time::Duration;
///
/// let config = ConversationConfig {
///     duration: Some(Duration::from_secs(30)),
///     ..ConversationConfig::new("secret-key").unwrap()
/// };
/// assert_eq!(config.input_queue_capacity, 5);
/// ```
#[derive(Clone)]
pub struct ConversationConfig {
    /// Credential for the remote service.
    pub api_key: String,

    /// Remote model identifier.
    pub model: String,

    /// System prompt sent when the session opens.
    pub system_instruction: String,

    /// Prompt sent right after connecting, asking the service to speak first.
    ///
    /// `None` disables the greeting. Default: `None`
    pub greeting: Option<String>,

    /// Capacity of the input relay queue, in encoded frames.
    ///
    /// Small values bound end-to-end latency; the capture stage waits when
    /// the queue is full. Default: 5
    pub input_queue_capacity: usize,

    /// Idle backoff of the capture stage when the device has no frame ready.
    ///
    /// Default: 10ms
    pub capture_poll_interval: Duration,

    /// Sample rate of audio returned by the remote service.
    ///
    /// Default: 24000
    pub remote_output_rate: u32,

    /// Sample rate the device plays at.
    ///
    /// Default: 16000
    pub device_rate: u32,

    /// Stop automatically after this long. `None` runs until stopped.
    ///
    /// Default: `None`
    pub duration: Option<Duration>,

    /// How long a graceful stop may take before the session is aborted.
    ///
    /// Default: 5 seconds
    pub stop_timeout: Duration,
}

impl ConversationConfig {
    /// Creates a configuration with defaults and the given credential.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if the credential is empty.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ConfigError> {
        let config = Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            greeting: None,
            input_queue_capacity: 5,
            capture_poll_interval: Duration::from_millis(10),
            remote_output_rate: REMOTE_OUTPUT_RATE,
            device_rate: 16000,
            duration: None,
            stop_timeout: Duration::from_secs(5),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reads the credential and model from the process environment.
    ///
    /// Uses `GEMINI_API_KEY` (required) and `GEMINI_MODEL` (optional).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if `GEMINI_API_KEY` is unset or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var(API_KEY_ENV).unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(ConfigError::Missing { name: API_KEY_ENV });
        }

        let mut config = Self::new(api_key)?;
        if let Ok(model) = std::env::var(MODEL_ENV) {
            if !model.trim().is_empty() {
                config.model = model;
            }
        }
        Ok(config)
    }

    /// Enables the initial greeting with the default prompt.
    #[must_use]
    pub fn with_greeting(mut self) -> Self {
        self.greeting = Some(DEFAULT_GREETING.to_string());
        self
    }

    /// Checks that every setting is usable.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Missing { name: API_KEY_ENV });
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Missing { name: "model" });
        }
        if self.input_queue_capacity == 0 {
            return Err(ConfigError::invalid(
                "input_queue_capacity",
                "must be at least 1",
            ));
        }
        if !SUPPORTED_RATES.contains(&self.remote_output_rate) {
            return Err(ConfigError::invalid(
                "remote_output_rate",
                format!("{}Hz is not one of {SUPPORTED_RATES:?}", self.remote_output_rate),
            ));
        }
        if !SUPPORTED_RATES.contains(&self.device_rate) {
            return Err(ConfigError::invalid(
                "device_rate",
                format!("{}Hz is not one of {SUPPORTED_RATES:?}", self.device_rate),
            ));
        }
        if self.stop_timeout.is_zero() {
            return Err(ConfigError::invalid("stop_timeout", "must be non-zero"));
        }
        Ok(())
    }

    /// Returns the session parameters sent to the remote service on connect.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            response_modalities: vec![ResponseModality::Audio],
            system_instruction: self.system_instruction.clone(),
        }
    }
}

impl fmt::Debug for ConversationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("model", &self.model)
            .field("greeting", &self.greeting.is_some())
            .field("input_queue_capacity", &self.input_queue_capacity)
            .field("capture_poll_interval", &self.capture_poll_interval)
            .field("remote_output_rate", &self.remote_output_rate)
            .field("device_rate", &self.device_rate)
            .field("duration", &self.duration)
            .field("stop_timeout", &self.stop_timeout)
            .finish_non_exhaustive()
    }
}

/// Shows only the last four characters of a secret.
fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "***".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("***{tail}")
}

/// Kind of content the remote service should answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseModality {
    /// Spoken audio.
    Audio,
    /// Text.
    Text,
}

/// Parameters passed to [`RemoteService::connect()`](crate::RemoteService::connect).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Requested response modalities.
    pub response_modalities: Vec<ResponseModality>,
    /// System prompt for the session.
    pub system_instruction: String,
}

/// Configuration for the motion scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How long the worker waits for a command before running the idle filler.
    ///
    /// Default: 100ms
    pub poll_timeout: Duration,

    /// How long [`stop()`](crate::MotionScheduler::stop) waits for the worker.
    ///
    /// Default: 5 seconds
    pub stop_timeout: Duration,

    /// Pause after a failing idle filler.
    ///
    /// Default: 100ms
    pub error_backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(100),
            stop_timeout: Duration::from_secs(5),
            error_backoff: Duration::from_millis(100),
        }
    }
}
