use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::pacing::{PacingPolicy, PacingUnit};
use crate::ws::ConnectionLimits;

// =============================================================================
// File config (figment-deserialized from defaults / persona-relay.toml / env)
// =============================================================================
//
//   persona-relay.toml:   [upstream]
//                         model = "gpt-4o-mini"
//
//   env var:              PERSONA_RELAY_UPSTREAM__MODEL=gpt-4o-mini
//
// Double underscore nests into a section; single underscores stay inside
// field names (PERSONA_RELAY_PACING__DELAY_MS).

pub const DEFAULT_CONFIG_FILE: &str = "persona-relay.toml";
pub const ENV_PREFIX: &str = "PERSONA_RELAY_";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub upstream: UpstreamFileConfig,
    #[serde(default)]
    pub pacing: PacingFileConfig,
    #[serde(default)]
    pub websocket: WebSocketFileConfig,
}

/// Listener settings (`[server]`)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerFileConfig {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        use anyhow::Context;
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }
}

/// Completion service settings (`[upstream]`)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpstreamFileConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Whole-request timeout; 0 disables it
    #[serde(default)]
    pub request_timeout_secs: u64,
}

impl Default for UpstreamFileConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            request_timeout_secs: 0,
        }
    }
}

impl UpstreamFileConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        if self.request_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.request_timeout_secs))
        }
    }

    /// Configured key, ignoring blank values
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

/// Persona stream pacing (`[pacing]`)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PacingFileConfig {
    #[serde(default)]
    pub unit: PacingUnit,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for PacingFileConfig {
    fn default() -> Self {
        Self {
            unit: PacingUnit::default(),
            delay_ms: default_delay_ms(),
        }
    }
}

impl PacingFileConfig {
    pub fn policy(&self) -> PacingPolicy {
        PacingPolicy::new(self.unit, Duration::from_millis(self.delay_ms))
    }
}

/// Per-connection limits (`[websocket]`)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebSocketFileConfig {
    #[serde(default = "default_send_channel_capacity")]
    pub send_channel_capacity: usize,
    /// Messages that may wait behind a running relay; more are refused
    #[serde(default = "default_inbound_queue_capacity")]
    pub inbound_queue_capacity: usize,
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

impl Default for WebSocketFileConfig {
    fn default() -> Self {
        Self {
            send_channel_capacity: default_send_channel_capacity(),
            inbound_queue_capacity: default_inbound_queue_capacity(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

impl WebSocketFileConfig {
    pub fn limits(&self) -> ConnectionLimits {
        ConnectionLimits {
            send_channel_capacity: self.send_channel_capacity,
            inbound_queue_capacity: self.inbound_queue_capacity,
            max_message_bytes: self.max_message_bytes,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_base_url() -> String {
    responses_stream::DEFAULT_BASE_URL.to_string()
}
fn default_model() -> String {
    responses_stream::DEFAULT_MODEL.to_string()
}
fn default_delay_ms() -> u64 {
    20
}
fn default_send_channel_capacity() -> usize {
    ConnectionLimits::default().send_channel_capacity
}
fn default_inbound_queue_capacity() -> usize {
    ConnectionLimits::default().inbound_queue_capacity
}
fn default_max_message_bytes() -> usize {
    ConnectionLimits::default().max_message_bytes
}

/// Build a figment that layers defaults, `OPENAI_API_KEY`, the config file and
/// `PERSONA_RELAY_*` env vars.
///
/// A missing config file is not an error. `OPENAI_API_KEY` only fills
/// `upstream.api_key` when neither the file nor `PERSONA_RELAY_UPSTREAM__API_KEY`
/// sets it.
pub fn load_config(config_path: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(
            Env::raw()
                .only(&["OPENAI_API_KEY"])
                .map(|_| "upstream.api_key".into()),
        )
        .merge(Toml::file(config_path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}
