use crate::error::ConfigError;
use crate::peer::state::{GATHER_TIMEOUT, GRACE_PERIOD};
use crate::peer::types::ServerConfig;
use crate::session::SessionId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

pub const DEFAULT_SIGNALING_BASE: &str = "ws://localhost:8000";
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Overrides `signaling_base`
pub const SIGNALING_BASE_ENV: &str = "INTERVIEW_WS_URL";
/// Overrides `require_identity`
pub const REQUIRE_AUTH_ENV: &str = "INTERVIEW_REQUIRE_AUTH";

/// Static configuration shared by every session attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// `ws`/`wss` base of the interview endpoint; `http(s)` is accepted and mapped
    pub signaling_base: String,
    pub ice_servers: Vec<ServerConfig>,
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub gather_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub disconnect_grace: Duration,
    /// Fail with `Unauthorized` when no identity is supplied
    pub require_identity: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            signaling_base: DEFAULT_SIGNALING_BASE.into(),
            ice_servers: vec![ServerConfig::stun(DEFAULT_STUN_SERVER)],
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            gather_timeout: GATHER_TIMEOUT,
            disconnect_grace: GRACE_PERIOD,
            require_identity: false,
        }
    }
}

impl SessionConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: SessionConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Some(base) = env_non_empty(SIGNALING_BASE_ENV) {
            self.signaling_base = base;
        }
        if let Some(required) = env_truthy(REQUIRE_AUTH_ENV) {
            self.require_identity = required;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.signaling_url()?;

        if self.ice_servers.is_empty() {
            return Err(ConfigError::NoIceServers);
        }
        for server in &self.ice_servers {
            if server.url.trim().is_empty() {
                return Err(ConfigError::EmptyIceUrl(server.id.clone()));
            }
            if server.is_turn() && (server.username.is_none() || server.credential.is_none()) {
                return Err(ConfigError::MissingTurnCredentials(server.id.clone()));
            }
        }
        Ok(())
    }

    /// The signaling base with its scheme normalised to `ws`/`wss`.
    pub fn signaling_url(&self) -> Result<Url, ConfigError> {
        let mut url = Url::parse(self.signaling_base.trim()).map_err(|err| {
            ConfigError::InvalidUrl {
                url: self.signaling_base.clone(),
                reason: err.to_string(),
            }
        })?;
        let scheme = match url.scheme() {
            "ws" | "http" => "ws",
            "wss" | "https" => "wss",
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        };
        url.set_scheme(scheme)
            .map_err(|_| ConfigError::UnsupportedScheme(scheme.to_string()))?;
        Ok(url)
    }

    /// `{base}/ws/interview/{session_id}`
    pub fn endpoint(&self, session_id: &SessionId) -> Result<Url, ConfigError> {
        let mut url = self.signaling_url()?;
        url.path_segments_mut()
            .map_err(|_| ConfigError::InvalidUrl {
                url: self.signaling_base.clone(),
                reason: "url cannot carry a path".into(),
            })?
            .pop_if_empty()
            .extend(["ws", "interview", session_id.as_str()]);
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }
}

fn env_non_empty(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_truthy(var: &str) -> Option<bool> {
    let value = env_non_empty(var)?;
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
