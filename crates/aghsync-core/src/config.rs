//! Configuration types for the aghsync system
//!
//! [`EndpointConfig`] is the immutable connection descriptor of one
//! accessory. It deserializes from the host's accessory JSON, so the
//! historical key names (`isGlinet`, `type`, `interval`, `autoOnTimer`,
//! `UUID`) are accepted as aliases.

use crate::device::AccessoryKind;
use crate::scheduler::MAX_AUTO_ON_DELAY;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Connection descriptor for one appliance/accessory pair
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    /// Display name used in logs
    #[serde(default = "default_name")]
    pub name: String,

    /// Appliance (direct mode) or router (router mode) host
    #[serde(default = "default_host")]
    pub host: String,

    /// Control port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Use `https` instead of `http`
    #[serde(default)]
    pub https: bool,

    /// Username for basic auth (direct) or the challenge (router)
    #[serde(default)]
    pub username: String,

    /// Password; never logged
    #[serde(default)]
    pub password: String,

    /// Reach the appliance through the router's JSON-RPC plane
    #[serde(default, alias = "isGlinet")]
    pub router_mode: bool,

    /// Presentation of the accessory
    #[serde(default, rename = "type")]
    pub kind: AccessoryKind,

    /// Poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms", alias = "interval")]
    pub poll_interval_ms: u64,

    /// Auto-on timers in minutes; the first positive entry backs `set`
    ///
    /// Accepts a single number or a list (one entry per timer switch).
    /// Non-positive entries are ignored.
    #[serde(
        default,
        alias = "autoOnTimer",
        deserialize_with = "deserialize_minutes"
    )]
    pub auto_on_minutes: Vec<f64>,

    /// Log full error detail for offline conditions
    #[serde(default)]
    pub debug: bool,

    /// Log every observed state and command result
    #[serde(default)]
    pub state_logging: bool,

    /// Stable identifier used to key the timer record
    #[serde(default = "default_accessory_id", alias = "UUID")]
    pub accessory_id: String,

    /// Directory holding the timer record
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Which control endpoint toggles protection in direct mode
    #[serde(default)]
    pub write_endpoint: WriteEndpoint,

    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Router session lifetime in seconds
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// Engine tuning
    #[serde(default)]
    pub engine: EngineConfig,
}

// Password stays out of Debug output
impl std::fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("https", &self.https)
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("router_mode", &self.router_mode)
            .field("kind", &self.kind)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("auto_on_minutes", &self.auto_on_minutes)
            .field("accessory_id", &self.accessory_id)
            .field("storage_dir", &self.storage_dir)
            .finish_non_exhaustive()
    }
}

impl EndpointConfig {
    /// Create a direct-mode configuration with defaults
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            name: default_name(),
            host: host.into(),
            port: default_port(),
            https: false,
            username: String::new(),
            password: String::new(),
            router_mode: false,
            kind: AccessoryKind::default(),
            poll_interval_ms: default_poll_interval_ms(),
            auto_on_minutes: Vec::new(),
            debug: false,
            state_logging: false,
            accessory_id: default_accessory_id(),
            storage_dir: default_storage_dir(),
            write_endpoint: WriteEndpoint::default(),
            request_timeout_secs: default_request_timeout_secs(),
            session_ttl_secs: default_session_ttl_secs(),
            engine: EngineConfig::default(),
        }
    }

    /// Set the credential pair
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Switch to router mode
    pub fn with_router_mode(mut self, router_mode: bool) -> Self {
        self.router_mode = router_mode;
        self
    }

    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set a single auto-on timer in minutes
    pub fn with_auto_on_minutes(mut self, minutes: f64) -> Self {
        self.auto_on_minutes = vec![minutes];
        self
    }

    /// Set several auto-on timers in minutes
    pub fn with_auto_on_timers(mut self, minutes: impl IntoIterator<Item = f64>) -> Self {
        self.auto_on_minutes = minutes.into_iter().collect();
        self
    }

    /// Parse a configuration from the host's accessory JSON
    pub fn from_json(json: &str) -> Result<Self, crate::Error> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.host.trim().is_empty() {
            return Err(crate::Error::config("Host cannot be empty"));
        }
        if self.port == 0 {
            return Err(crate::Error::config("Port must be > 0"));
        }
        if self.poll_interval_ms == 0 {
            return Err(crate::Error::config("Poll interval must be > 0"));
        }
        let max_minutes = MAX_AUTO_ON_DELAY.as_secs_f64() / 60.0;
        for &minutes in &self.auto_on_minutes {
            if !minutes.is_finite() || minutes < 0.0 {
                return Err(crate::Error::config(format!(
                    "Auto-on timer must be a non-negative number of minutes, got {}",
                    minutes
                )));
            }
            if minutes > max_minutes {
                return Err(crate::Error::config(format!(
                    "Auto-on timer must be at most {} minutes, got {}",
                    max_minutes, minutes
                )));
            }
        }
        if self.accessory_id.trim().is_empty() {
            return Err(crate::Error::config("Accessory id cannot be empty"));
        }
        if self.router_mode && (self.username.is_empty() || self.password.is_empty()) {
            return Err(crate::Error::config(
                "Router mode requires both username and password",
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(crate::Error::config("Request timeout must be > 0"));
        }
        if self.router_mode && self.session_ttl_secs == 0 {
            return Err(crate::Error::config("Session TTL must be > 0"));
        }
        if self.engine.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }

        Ok(())
    }

    /// `http` or `https`
    pub fn scheme(&self) -> &'static str {
        if self.https { "https" } else { "http" }
    }

    /// `scheme://host:port`
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme(), self.host, self.port)
    }

    /// Direct-mode control API prefix
    pub fn control_url(&self) -> String {
        format!("{}/control", self.base_url())
    }

    /// Router-mode JSON-RPC endpoint
    pub fn rpc_url(&self) -> String {
        format!("{}/rpc", self.base_url())
    }

    /// Registry key of the client this endpoint needs
    pub fn client_type(&self) -> &'static str {
        if self.router_mode { "router" } else { "direct" }
    }

    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Per-request HTTP timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Router session lifetime
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Delay used by `set`: the first configured timer, if any
    pub fn auto_on_delay(&self) -> Option<Duration> {
        self.auto_on_delays().into_iter().next()
    }

    /// Every usable timer, in configuration order, clamped to [`MAX_AUTO_ON_DELAY`]
    pub fn auto_on_delays(&self) -> Vec<Duration> {
        self.auto_on_minutes
            .iter()
            .filter(|m| m.is_finite() && **m > 0.0)
            .map(|m| {
                Duration::try_from_secs_f64(m * 60.0)
                    .unwrap_or(MAX_AUTO_ON_DELAY)
                    .min(MAX_AUTO_ON_DELAY)
            })
            .collect()
    }

    /// Location of this accessory's timer record
    pub fn timer_file_path(&self) -> PathBuf {
        self.storage_dir
            .join(format!("aghsync-{}-timer.config", self.accessory_id))
    }
}

/// Direct-mode write endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteEndpoint {
    /// `POST /control/dns_config {"protection_enabled": b}`
    #[default]
    DnsConfig,
    /// `POST /control/protection {"enabled": b}`
    Protection,
}

impl WriteEndpoint {
    /// Path below `/control`
    pub fn path(self) -> &'static str {
        match self {
            Self::DnsConfig => "dns_config",
            Self::Protection => "protection",
        }
    }

    /// JSON body for the requested flag
    pub fn body(self, enabled: bool) -> serde_json::Value {
        match self {
            Self::DnsConfig => serde_json::json!({ "protection_enabled": enabled }),
            Self::Protection => serde_json::json!({ "enabled": enabled }),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Poll failures suppressed right after a fresh router login
    ///
    /// Covers the case where our new session races with an unrelated
    /// router-side login. Set to 0 to report every failure immediately.
    #[serde(default = "default_glitch_tolerance")]
    pub glitch_tolerance: u32,

    /// Capacity of the engine event channel
    ///
    /// When full, events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            glitch_tolerance: default_glitch_tolerance(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

// Host configs carry either `"autoOnTimer": 15` or `"autoOnTimer": [15, 30]`
fn deserialize_minutes<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Minutes {
        One(f64),
        Many(Vec<f64>),
    }

    Ok(match Option::<Minutes>::deserialize(deserializer)? {
        Some(Minutes::One(m)) => vec![m],
        Some(Minutes::Many(list)) => list,
        None => Vec::new(),
    })
}

fn default_name() -> String {
    "AdGuard Home".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    80
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_accessory_id() -> String {
    "default".to_string()
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_session_ttl_secs() -> u64 {
    240
}

fn default_glitch_tolerance() -> u32 {
    1
}

fn default_event_channel_capacity() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_json_with_legacy_keys() {
        let json = r#"{
            "name": "Living room",
            "host": "192.168.8.1",
            "port": 443,
            "https": true,
            "username": "root",
            "password": "hunter2",
            "isGlinet": true,
            "type": "lock",
            "interval": 2000,
            "autoOnTimer": 15,
            "stateLogging": true,
            "UUID": "3f1c"
        }"#;

        let config = EndpointConfig::from_json(json).unwrap();
        assert!(config.router_mode);
        assert_eq!(config.kind, AccessoryKind::Lock);
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.auto_on_delay(), Some(Duration::from_secs(900)));
        assert_eq!(config.rpc_url(), "https://192.168.8.1:443/rpc");
        assert_eq!(config.client_type(), "router");
        assert!(config.timer_file_path().ends_with("aghsync-3f1c-timer.config"));
    }

    #[test]
    fn test_defaults() {
        let config = EndpointConfig::from_json("{}").unwrap();
        assert_eq!(config.control_url(), "http://localhost:80/control");
        assert_eq!(config.kind, AccessoryKind::Switch);
        assert_eq!(config.auto_on_delay(), None);
        assert_eq!(config.session_ttl(), Duration::from_secs(240));
        assert_eq!(config.engine.glitch_tolerance, 1);
        assert_eq!(config.write_endpoint, WriteEndpoint::DnsConfig);
    }

    #[test]
    fn test_router_mode_requires_credentials() {
        let config = EndpointConfig::new("192.168.8.1").with_router_mode(true);
        assert!(config.validate().is_err());

        let config = config.with_credentials("root", "secret");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_negative_timer_rejected() {
        let config = EndpointConfig::new("localhost").with_auto_on_minutes(-1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timer_list_from_host_json() {
        let config = EndpointConfig::from_json(r#"{"host":"h","autoOnTimer":[15,30]}"#).unwrap();
        assert_eq!(config.auto_on_minutes, vec![15.0, 30.0]);
        assert_eq!(config.auto_on_delay(), Some(Duration::from_secs(900)));
        assert_eq!(
            config.auto_on_delays(),
            vec![Duration::from_secs(900), Duration::from_secs(1800)]
        );
    }

    #[test]
    fn test_timer_list_skips_disabled_entries() {
        let config = EndpointConfig::from_json(r#"{"autoOnTimer":[0,5]}"#).unwrap();
        assert_eq!(config.auto_on_delay(), Some(Duration::from_secs(300)));

        let config = EndpointConfig::from_json(r#"{"autoOnTimer":[]}"#).unwrap();
        assert_eq!(config.auto_on_delay(), None);

        let config = EndpointConfig::from_json(r#"{"autoOnTimer":null}"#).unwrap();
        assert!(config.auto_on_minutes.is_empty());
    }

    #[test]
    fn test_oversized_timer_rejected() {
        let result = EndpointConfig::from_json(r#"{"host":"h","autoOnTimer":1e300}"#);
        assert!(matches!(result, Err(crate::Error::Config(_))), "got: {result:?}");

        let result = EndpointConfig::from_json(r#"{"host":"h","autoOnTimer":[10,1e300]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_oversized_timer_clamped_without_validation() {
        let config = EndpointConfig::new("localhost").with_auto_on_minutes(1e300);
        assert_eq!(config.auto_on_delay(), Some(MAX_AUTO_ON_DELAY));

        let config = EndpointConfig::new("localhost").with_auto_on_minutes(f64::INFINITY);
        assert_eq!(config.auto_on_delay(), None);
    }

    #[test]
    fn test_password_not_in_debug() {
        let config = EndpointConfig::new("localhost").with_credentials("admin", "s3cret-pass");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("s3cret-pass"));
        assert!(debug.contains("EndpointConfig"));
    }

    #[test]
    fn test_write_endpoint_bodies() {
        assert_eq!(
            WriteEndpoint::DnsConfig.body(true),
            serde_json::json!({ "protection_enabled": true })
        );
        assert_eq!(WriteEndpoint::Protection.path(), "protection");
        assert_eq!(
            WriteEndpoint::Protection.body(false),
            serde_json::json!({ "enabled": false })
        );
    }
}
