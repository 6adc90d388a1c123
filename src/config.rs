use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Embedded default configuration.
const DEFAULT_CONFIG: &str = include_str!("../config.default.toml");

/// Location of the user overlay, relative to `$HOME`.
const USER_CONFIG_PATH: &str = ".config/safepipe/config.toml";

// ── Final (merged) config types ──

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Binding names with this prefix configure processes instead of
    /// being substituted.
    #[serde(default = "default_reserved_prefix")]
    pub reserved_prefix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            reserved_prefix: default_reserved_prefix(),
        }
    }
}

fn default_reserved_prefix() -> String {
    "_".into()
}

/// Host variables carried into a replacement environment.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub keep: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// Log file path; empty means stderr.
    #[serde(default)]
    pub file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: String::new(),
        }
    }
}

fn default_level() -> String {
    "warn".into()
}

// ── Overlay types (user config that merges with defaults) ──

#[derive(Debug, Deserialize, Default)]
struct ConfigOverlay {
    #[serde(default)]
    settings: SettingsOverlay,
    #[serde(default)]
    environment: EnvironmentOverlay,
    #[serde(default)]
    logging: LoggingOverlay,
}

#[derive(Debug, Deserialize, Default)]
struct SettingsOverlay {
    reserved_prefix: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct EnvironmentOverlay {
    #[serde(default)]
    replace: bool,
    #[serde(default)]
    keep: Vec<String>,
    #[serde(default)]
    remove_keep: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct LoggingOverlay {
    level: Option<String>,
    file: Option<String>,
}

// ── Merge logic ──

/// Merge a user list into a default list.
/// In replace mode: user list replaces default entirely.
/// In merge mode: remove items first, then extend with additions (deduped).
fn merge_list(base: &mut Vec<String>, add: Vec<String>, remove: &[String], replace: bool) {
    if replace {
        *base = add;
    } else {
        base.retain(|item| !remove.contains(item));
        for item in add {
            if !base.contains(&item) {
                base.push(item);
            }
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

impl Config {
    /// Load the default embedded configuration.
    pub fn default_config() -> Self {
        // The embedded file is covered by `default_config_parses`; fall back
        // to the serde defaults rather than panic.
        toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|e| {
            log::error!("embedded default config failed to parse: {e}");
            Config {
                settings: Settings::default(),
                environment: EnvironmentConfig::default(),
                logging: LoggingConfig::default(),
            }
        })
    }

    /// Parse a complete configuration from TOML. Missing sections take their
    /// defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, Error> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration with resolution order:
    /// 1. Start with embedded defaults
    /// 2. Merge user overlay from ~/.config/safepipe/config.toml (if exists)
    ///
    /// Scalars override; lists extend. Set `replace = true` in a section to
    /// replace its defaults, or `remove_<field>` to subtract items.
    pub fn load() -> Self {
        let mut config = Self::default_config();
        if let Some(overlay) = Self::load_overlay() {
            config.apply_overlay(overlay);
        }
        config
    }

    /// Try to load user overlay from ~/.config/safepipe/config.toml.
    fn load_overlay() -> Option<ConfigOverlay> {
        let home = std::env::var_os("HOME")?;
        let path = std::path::Path::new(&home).join(USER_CONFIG_PATH);
        let content = std::fs::read_to_string(&path).ok()?;
        match toml::from_str(&content) {
            Ok(overlay) => Some(overlay),
            Err(e) => {
                log::warn!("ignoring {}: {e}", path.display());
                None
            }
        }
    }

    /// Merge an overlay given as TOML text on top of this config.
    pub fn apply_overlay_str(&mut self, toml_str: &str) -> Result<(), Error> {
        let overlay: ConfigOverlay = toml::from_str(toml_str)?;
        self.apply_overlay(overlay);
        Ok(())
    }

    fn apply_overlay(&mut self, overlay: ConfigOverlay) {
        if let Some(v) = overlay.settings.reserved_prefix {
            self.settings.reserved_prefix = v;
        }

        let e = overlay.environment;
        merge_list(&mut self.environment.keep, e.keep, &e.remove_keep, e.replace);

        let l = overlay.logging;
        if let Some(v) = l.level {
            self.logging.level = v;
        }
        if let Some(v) = l.file {
            self.logging.file = v;
        }
    }
}
