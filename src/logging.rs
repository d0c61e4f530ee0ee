use crate::config::BridgeConfig;
use simplelog::*;
use std::fs::{self, OpenOptions};
use std::io::{Error, ErrorKind};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

static INIT: Once = Once::new();
static LOGGER_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Default log location, ~/.local/share/midibridge/logs
pub fn default_log_dir() -> Result<PathBuf, Error> {
    let home = std::env::var("HOME")
        .map_err(|_| Error::new(ErrorKind::NotFound, "HOME environment variable not set"))?;

    Ok(PathBuf::from(home)
        .join(".local")
        .join("share")
        .join("midibridge")
        .join("logs"))
}

/// Installs the file logger. Later calls are no-ops that report whether the
/// first one succeeded.
pub fn init_logger(config: &BridgeConfig) -> Result<(), Error> {
    let log_dir = match &config.log_dir {
        Some(dir) => dir.clone(),
        None => default_log_dir()?,
    };

    fs::create_dir_all(&log_dir)?;

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("app.log"))?;

    let level = config.log_level;
    INIT.call_once(|| {
        if let Ok(()) =
            CombinedLogger::init(vec![WriteLogger::new(level, Config::default(), log_file)])
        {
            LOGGER_INITIALIZED.store(true, Ordering::SeqCst);
        }
    });

    if LOGGER_INITIALIZED.load(Ordering::SeqCst) {
        Ok(())
    } else {
        Err(Error::new(ErrorKind::Other, "Logger initialization failed"))
    }
}

/// Logs to stderr instead of the log file, for interactive debugging.
pub fn init_stderr_logger(level: LevelFilter) -> Result<(), Error> {
    INIT.call_once(|| {
        if let Ok(()) = env_logger::Builder::new().filter_level(level).try_init() {
            LOGGER_INITIALIZED.store(true, Ordering::SeqCst);
        }
    });

    if LOGGER_INITIALIZED.load(Ordering::SeqCst) {
        Ok(())
    } else {
        Err(Error::new(ErrorKind::Other, "Logger initialization failed"))
    }
}
