//! Sandbox session configuration.

use std::time::Duration;
use toolbridge_core::{BridgeError, Result, SessionId};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080/";

pub const ENV_ENDPOINT: &str = "TOOLBRIDGE_SANDBOX_ENDPOINT";
pub const ENV_SESSION_ID: &str = "TOOLBRIDGE_SESSION_ID";
pub const ENV_TIMEOUT_SECONDS: &str = "TOOLBRIDGE_TIMEOUT_SECONDS";
pub const ENV_SANITIZE_INPUT: &str = "TOOLBRIDGE_SANITIZE_INPUT";
pub const ENV_BEARER_TOKEN: &str = "TOOLBRIDGE_BEARER_TOKEN";

/// How generated stubs wait for results inside the sandbox.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSettings {
    /// Sleep between checks for a result file
    pub poll_interval: Duration,
    /// A stub raises `TimeoutError` after waiting this long
    pub call_timeout: Duration,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            call_timeout: Duration::from_secs(300),
        }
    }
}

impl ChannelSettings {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}

#[derive(Clone)]
pub struct SandboxConfig {
    /// Pool management endpoint; normalized by the HTTP transport
    pub endpoint: String,
    pub session_id: SessionId,
    /// Execution timeout sent with every execute request
    pub timeout_seconds: u64,
    /// Client-side timeout for a single HTTP request
    pub request_timeout: Duration,
    /// Strip markdown fences and a leading `python` tag from submitted code
    pub sanitize_input: bool,
    pub channel: ChannelSettings,
    /// How long the relay keeps collecting calls after the first one arrives
    pub batch_window: Duration,
    /// How long one relay iteration waits before answering `waiting`
    pub relay_wait: Duration,
    pub bearer_token: Option<String>,
}

impl std::fmt::Debug for SandboxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxConfig")
            .field("endpoint", &self.endpoint)
            .field("session_id", &self.session_id)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("request_timeout", &self.request_timeout)
            .field("sanitize_input", &self.sanitize_input)
            .field("channel", &self.channel)
            .field("batch_window", &self.batch_window)
            .field("relay_wait", &self.relay_wait)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

impl SandboxConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            session_id: SessionId::generate(),
            timeout_seconds: 300,
            request_timeout: Duration::from_secs(330),
            sanitize_input: true,
            channel: ChannelSettings::default(),
            batch_window: Duration::from_millis(200),
            relay_wait: Duration::from_secs(60),
            bearer_token: None,
        }
    }

    /// Load configuration from the process environment, reading `.env` first.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = lookup(ENV_ENDPOINT)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| BridgeError::Configuration(format!("{} is not set", ENV_ENDPOINT)))?;
        let mut config = Self::new(endpoint.trim());

        if let Some(session_id) = lookup(ENV_SESSION_ID).filter(|value| !value.is_empty()) {
            config.session_id = SessionId::from_external(session_id);
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECONDS) {
            let seconds = raw.trim().parse::<u64>().map_err(|err| {
                BridgeError::Configuration(format!("{} must be a number of seconds: {}", ENV_TIMEOUT_SECONDS, err))
            })?;
            config = config.with_timeout_seconds(seconds);
        }
        if let Some(raw) = lookup(ENV_SANITIZE_INPUT) {
            config.sanitize_input = parse_flag(ENV_SANITIZE_INPUT, &raw)?;
        }
        config.bearer_token = lookup(ENV_BEARER_TOKEN).filter(|value| !value.is_empty());

        config.validate()?;
        Ok(config)
    }

    pub fn with_session_id(mut self, session_id: SessionId) -> Self {
        self.session_id = session_id;
        self
    }

    /// Set the execution timeout; the request timeout follows with 30 s of slack.
    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self.request_timeout = Duration::from_secs(seconds.saturating_add(30));
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_sanitize_input(mut self, sanitize: bool) -> Self {
        self.sanitize_input = sanitize;
        self
    }

    pub fn with_channel(mut self, channel: ChannelSettings) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_batch_window(mut self, window: Duration) -> Self {
        self.batch_window = window;
        self
    }

    pub fn with_relay_wait(mut self, wait: Duration) -> Self {
        self.relay_wait = wait;
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// A relay iteration must finish well inside one execute request.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(BridgeError::Configuration("sandbox endpoint is empty".to_string()));
        }
        if self.timeout_seconds == 0 {
            return Err(BridgeError::Configuration("timeout must be at least one second".to_string()));
        }
        if self.relay_wait >= Duration::from_secs(self.timeout_seconds) {
            return Err(BridgeError::Configuration(format!(
                "relay wait {:?} must be shorter than the execution timeout of {} s",
                self.relay_wait, self.timeout_seconds
            )));
        }
        if self.batch_window >= self.relay_wait {
            return Err(BridgeError::Configuration(format!(
                "batch window {:?} must be shorter than the relay wait {:?}",
                self.batch_window, self.relay_wait
            )));
        }
        if self.channel.poll_interval.is_zero() {
            return Err(BridgeError::Configuration("poll interval must be positive".to_string()));
        }
        Ok(())
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(BridgeError::Configuration(format!(
            "{} must be true or false, got '{}'",
            key, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_are_consistent() {
        let config = SandboxConfig::default();
        assert_eq!(config.timeout_seconds, 300);
        assert!(config.sanitize_input);
        assert_eq!(config.channel.poll_interval, Duration::from_millis(10));
        config.validate().unwrap();
    }

    #[test]
    fn endpoint_is_required() {
        let err = SandboxConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, BridgeError::Configuration(msg) if msg.contains(ENV_ENDPOINT)));
    }

    #[test]
    fn environment_overrides_apply() {
        let config = SandboxConfig::from_lookup(lookup(&[
            (ENV_ENDPOINT, "https://pool.example/python/execute"),
            (ENV_SESSION_ID, "session-1"),
            (ENV_TIMEOUT_SECONDS, "120"),
            (ENV_SANITIZE_INPUT, "false"),
            (ENV_BEARER_TOKEN, "secret"),
        ]))
        .unwrap();
        assert_eq!(config.session_id.as_str(), "session-1");
        assert_eq!(config.timeout_seconds, 120);
        assert_eq!(config.request_timeout, Duration::from_secs(150));
        assert!(!config.sanitize_input);
        assert_eq!(config.bearer_token.as_deref(), Some("secret"));
        assert!(!format!("{:?}", config).contains("secret"));
    }

    #[test]
    fn bad_values_are_configuration_errors() {
        let err = SandboxConfig::from_lookup(lookup(&[
            (ENV_ENDPOINT, "https://pool.example/"),
            (ENV_TIMEOUT_SECONDS, "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, BridgeError::Configuration(_)));

        let err = SandboxConfig::from_lookup(lookup(&[
            (ENV_ENDPOINT, "https://pool.example/"),
            (ENV_TIMEOUT_SECONDS, "30"),
        ]))
        .unwrap_err();
        assert!(matches!(err, BridgeError::Configuration(msg) if msg.contains("relay wait")));
    }
}
