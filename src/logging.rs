use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str::FromStr;

use log::LevelFilter;
use simplelog::WriteLogger;

use crate::config::LoggingConfig;
use crate::error::Error;

/// Parse a level name such as `"warn"` or `"debug"`.
pub fn level_filter(level: &str) -> Result<LevelFilter, Error> {
    LevelFilter::from_str(level.trim()).map_err(|_| Error::InvalidLogLevel(level.to_string()))
}

/// Resolve the configured log file, expanding a leading `~`.
/// `None` means stderr.
pub fn log_path(config: &LoggingConfig) -> Option<PathBuf> {
    let file = config.file.trim();
    if file.is_empty() {
        return None;
    }
    Some(PathBuf::from(shellexpand::tilde(file).as_ref()))
}

/// Install the global logger described by `config`.
///
/// Logs go to the configured file (appended, parent directory created) or to
/// stderr, never to stdout, which may be wired into a pipeline.
pub fn init(config: &LoggingConfig) -> Result<(), Error> {
    let level = level_filter(&config.level)?;
    let log_config = simplelog::ConfigBuilder::new()
        .set_time_format_rfc3339()
        .build();

    match log_path(config) {
        Some(path) => {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir).map_err(|source| Error::Io {
                    context: format!("creating log directory {}", dir.display()),
                    source,
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|source| Error::Io {
                    context: format!("opening log file {}", path.display()),
                    source,
                })?;
            WriteLogger::init(level, log_config, file)?;
        }
        None => WriteLogger::init(level, log_config, std::io::stderr())?,
    }
    Ok(())
}
