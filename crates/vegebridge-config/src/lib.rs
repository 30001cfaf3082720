//! Configuration for the vegebridge binary.
//!
//! One TOML file layered under `VEGEBRIDGE_` environment variables, then
//! validated and translated to `vegebridge_core::BridgeConfig`. CLI flag
//! overrides are applied by the binary on top of the loaded [`Config`].

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::FixedOffset;
use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use vegebridge_core::config::{
    DEFAULT_COMMAND_PREFIX, DEFAULT_FEEDBACK_PREFIX, DEFAULT_STORE_PATH,
};
use vegebridge_core::decoder::DEFAULT_IR_OFFSET;
use vegebridge_core::{BridgeConfig, DecoderConfig, GateFields, ProcessorKind};

/// Environment variable prefix; nested keys are separated by `__`,
/// e.g. `VEGEBRIDGE_MQTT__BROKER`.
pub const ENV_PREFIX: &str = "VEGEBRIDGE_";

const REDACTED: &str = "********";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config file {} does not exist", path.display())]
    Missing { path: PathBuf },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub mqtt: MqttConfig,

    #[serde(default)]
    pub decoder: DecoderSection,
}

/// Hub-facing HTTP listeners.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Every port serves the same API.
    #[serde(default = "default_ports")]
    pub ports: Vec<u16>,

    #[serde(default = "default_bind")]
    pub bind: IpAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ports: default_ports(),
            bind: default_bind(),
        }
    }
}

fn default_ports() -> Vec<u16> {
    vec![8060]
}
fn default_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

/// Settings store file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Quiet period before a change is written, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_PATH)
}
fn default_debounce_ms() -> u64 {
    500
}

/// MQTT broker connection. Without a `broker`, nothing is published.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MqttConfig {
    pub broker: Option<String>,

    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    pub user: Option<String>,

    /// Plaintext -- prefer `VEGEBRIDGE_MQTT__PASSWORD`.
    pub password: Option<String>,

    /// Defaults to one unique per process.
    pub client_id: Option<String>,

    /// Prefix for published readings and settings.
    #[serde(default = "default_pub_topic")]
    pub pub_topic: String,

    /// Prefix for command topics.
    #[serde(default = "default_sub_topic")]
    pub sub_topic: String,

    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: None,
            port: default_mqtt_port(),
            user: None,
            password: None,
            client_id: None,
            pub_topic: default_pub_topic(),
            sub_topic: default_sub_topic(),
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

fn default_mqtt_port() -> u16 {
    1883
}
fn default_pub_topic() -> String {
    DEFAULT_FEEDBACK_PREFIX.into()
}
fn default_sub_topic() -> String {
    DEFAULT_COMMAND_PREFIX.into()
}
fn default_keep_alive_secs() -> u64 {
    60
}

/// Sensor decoding.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DecoderSection {
    #[serde(default)]
    pub processor: ProcessorKind,

    /// Light channel baseline from IR illumination, volts.
    #[serde(default = "default_ir_offset")]
    pub ir_offset: f64,

    /// Offset applied to hub timestamps. Unset uses the host's local offset.
    pub utc_offset_minutes: Option<i32>,

    #[serde(default)]
    pub fields: GateFields,
}

impl Default for DecoderSection {
    fn default() -> Self {
        Self {
            processor: ProcessorKind::default(),
            ir_offset: default_ir_offset(),
            utc_offset_minutes: None,
            fields: GateFields::default(),
        }
    }
}

fn default_ir_offset() -> f64 {
    DEFAULT_IR_OFFSET
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "vegebridge", "vegebridge").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("vegebridge");
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// The provider stack: defaults, then the TOML file, then environment.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load and validate the configuration.
///
/// An explicit `path` must exist; the default location may be absent, in
/// which case only defaults and environment apply.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(p) if !p.exists() => {
            return Err(ConfigError::Missing {
                path: p.to_path_buf(),
            });
        }
        Some(p) => p.to_path_buf(),
        None => config_path(),
    };

    let config: Config = figment(&path).extract()?;
    config.validate()?;
    Ok(config)
}

// ── Validation & translation ────────────────────────────────────────

impl Config {
    /// Check values the type system cannot. Errors name the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.ports.is_empty() {
            return Err(invalid("server.ports", "at least one port is required"));
        }
        if self.mqtt.broker.as_deref().is_some_and(str::is_empty) {
            return Err(invalid("mqtt.broker", "must not be empty"));
        }
        if self.mqtt.port == 0 {
            return Err(invalid("mqtt.port", "must be between 1 and 65535"));
        }
        if self.mqtt.keep_alive_secs < 5 {
            return Err(invalid("mqtt.keep_alive_secs", "must be at least 5"));
        }
        for (field, topic) in [
            ("mqtt.pub_topic", &self.mqtt.pub_topic),
            ("mqtt.sub_topic", &self.mqtt.sub_topic),
        ] {
            if topic.is_empty() {
                return Err(invalid(field, "must not be empty"));
            }
            if topic.contains(['#', '+']) {
                return Err(invalid(field, "must not contain MQTT wildcards"));
            }
        }
        if !(0.0..=3.3).contains(&self.decoder.ir_offset) {
            return Err(invalid("decoder.ir_offset", "must be between 0 and 3.3 volts"));
        }
        let fields = &self.decoder.fields;
        if fields.interrupt.iter().any(String::is_empty)
            || [&fields.periodic, &fields.light, &fields.battery]
                .iter()
                .any(|f| f.is_empty())
        {
            return Err(invalid("decoder.fields", "field names must not be empty"));
        }
        self.utc_offset()?;
        Ok(())
    }

    /// Configured timestamp offset, if any.
    pub fn utc_offset(&self) -> Result<Option<FixedOffset>, ConfigError> {
        self.decoder
            .utc_offset_minutes
            .map(|minutes| {
                minutes
                    .checked_mul(60)
                    .and_then(FixedOffset::east_opt)
                    .ok_or_else(|| {
                        invalid(
                            "decoder.utc_offset_minutes",
                            format!("{minutes} is not a valid UTC offset"),
                        )
                    })
            })
            .transpose()
    }

    /// Translate to the controller's runtime configuration.
    pub fn to_bridge_config(&self) -> Result<BridgeConfig, ConfigError> {
        Ok(BridgeConfig {
            store_path: self.store.path.clone(),
            persist_debounce: Duration::from_millis(self.store.debounce_ms),
            feedback_prefix: self.mqtt.pub_topic.clone(),
            command_prefix: self.mqtt.sub_topic.clone(),
            decoder: DecoderConfig {
                kind: self.decoder.processor,
                fields: self.decoder.fields.clone(),
                ir_offset: self.decoder.ir_offset,
                utc_offset: self.utc_offset()?,
            },
        })
    }

    /// TOML rendering with the broker password masked.
    pub fn to_redacted_toml(&self) -> Result<String, ConfigError> {
        let mut shown = self.clone();
        if shown.mqtt.password.is_some() {
            shown.mqtt.password = Some(REDACTED.into());
        }
        Ok(toml::to_string_pretty(&shown)?)
    }
}
