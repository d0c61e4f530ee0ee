// config.rs

use crate::midi::{MidiError, ReconcileStrategy, Result};
use config::{Config, ConfigError, Environment, File};
use log::{debug, LevelFilter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CLIENT_NAME: &str = "midibridge";
pub const DEFAULT_HOTPLUG_INTERVAL_MS: u64 = 1000;
pub const ENV_PREFIX: &str = "MIDIBRIDGE";

/// Runtime settings for the bridge, the binary and the C interface.
///
/// Sources are layered: built-in defaults, then the optional TOML file, then
/// `MIDIBRIDGE_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Client name registered with the MIDI service, also used as port name prefix
    pub client_name: String,
    pub strategy: ReconcileStrategy,
    /// How often the midir backend compares port lists while a reset is armed
    pub hotplug_interval: Duration,
    pub log_level: LevelFilter,
    /// Overrides ~/.local/share/midibridge/logs
    pub log_dir: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            strategy: ReconcileStrategy::Poll,
            hotplug_interval: Duration::from_millis(DEFAULT_HOTPLUG_INTERVAL_MS),
            log_level: LevelFilter::Debug,
            log_dir: None,
        }
    }
}

impl BridgeConfig {
    /// Loads settings, reading `path` if given. A named file that does not
    /// exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("client_name", DEFAULT_CLIENT_NAME)?
            .set_default("strategy", "poll")?
            .set_default("hotplug_interval_ms", DEFAULT_HOTPLUG_INTERVAL_MS as i64)?
            .set_default("log_level", "debug")?;

        if let Some(path) = path {
            debug!("Reading configuration from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?;
        Self::from_settings(&settings)
    }

    fn from_settings(settings: &Config) -> Result<Self> {
        let client_name = settings.get_string("client_name")?;
        if client_name.trim().is_empty() {
            return Err(MidiError::Config("client_name must not be empty".to_string()));
        }

        let strategy = settings.get_string("strategy")?.parse::<ReconcileStrategy>()?;

        let interval_ms = settings.get_int("hotplug_interval_ms")?;
        if interval_ms <= 0 {
            return Err(MidiError::Config(format!(
                "hotplug_interval_ms must be positive, got {}",
                interval_ms
            )));
        }

        let level = settings.get_string("log_level")?;
        let log_level = level
            .parse::<LevelFilter>()
            .map_err(|_| MidiError::Config(format!("unknown log level '{}'", level)))?;

        let log_dir = match settings.get_string("log_dir") {
            Ok(dir) => Some(PathBuf::from(dir)),
            Err(ConfigError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };

        Ok(BridgeConfig {
            client_name,
            strategy,
            hotplug_interval: Duration::from_millis(interval_ms as u64),
            log_level,
            log_dir,
        })
    }
}
