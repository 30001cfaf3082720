// ── Runtime bridge configuration ──
//
// What the controller needs to run. Built by the binary from the config
// crate; core never reads config files itself.

use std::path::PathBuf;
use std::time::Duration;

use crate::decoder::DecoderConfig;

pub const DEFAULT_FEEDBACK_PREFIX: &str = "/vegehub_status/";
pub const DEFAULT_COMMAND_PREFIX: &str = "/vegehub_config/";
pub const DEFAULT_STORE_PATH: &str = "config.json";
pub const DEFAULT_PERSIST_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Settings store file.
    pub store_path: PathBuf,
    /// Quiet period before a mutation is written to disk.
    pub persist_debounce: Duration,
    /// Prefix of every published topic (hub readings and settings).
    pub feedback_prefix: String,
    /// Prefix of the command topics the bridge subscribes to.
    pub command_prefix: String,
    pub decoder: DecoderConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            persist_debounce: DEFAULT_PERSIST_DEBOUNCE,
            feedback_prefix: DEFAULT_FEEDBACK_PREFIX.into(),
            command_prefix: DEFAULT_COMMAND_PREFIX.into(),
            decoder: DecoderConfig::default(),
        }
    }
}
