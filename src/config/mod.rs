//! Settings for the renderer, the compression layer and request logging.
//!
//! Settings are plain YAML. A directory may hold several `*.yaml` / `*.yml`
//! files; they are merged in file-name order, later files overriding earlier
//! keys, and environment variables are applied last:
//!
//! | Variable                      | Setting                       |
//! |-------------------------------|-------------------------------|
//! | `CONNEG_RENDER_DEFAULT_FORMAT`| `render.default_format`       |
//! | `CONNEG_COMPRESSION_ENABLED`  | `compression.enabled`         |
//! | `CONNEG_COMPRESSION_LEVEL`    | `compression.level`           |
//!
//! ```yaml
//! render:
//!   default_format: yaml   # json | yaml | xml | ~ (no default)
//! compression:
//!   enabled: true
//!   level: 6
//! logging:
//!   excluded_paths: ["/healthy", "/ready"]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

use crate::render::Format;

const ENV_DEFAULT_FORMAT: &str = "CONNEG_RENDER_DEFAULT_FORMAT";
const ENV_COMPRESSION_ENABLED: &str = "CONNEG_COMPRESSION_ENABLED";
const ENV_COMPRESSION_LEVEL: &str = "CONNEG_COMPRESSION_LEVEL";

/// Errors produced while loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings in {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidOverride {
        key: String,
        value: String,
        reason: String,
    },
}

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub render: RenderSettings,
    pub compression: CompressionSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Format for `*`, `*/*` and `+*` media types. `None` disables the fallback.
    pub default_format: Option<Format>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            default_format: Some(Format::Json),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CompressionSettings {
    pub enabled: bool,
    /// flate2 compression level, clamped to `0..=9`.
    pub level: u32,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            level: 6,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Request paths the request logger stays quiet about.
    pub excluded_paths: Vec<String>,
}

impl Settings {
    /// Parses settings from a YAML document. Missing keys keep their defaults.
    ///
    /// # Examples
    ///
    /// ```
    /// use conneg::config::Settings;
    /// use conneg::render::Format;
    ///
    /// let settings = Settings::from_yaml_str("render:\n  default_format: xml\n").unwrap();
    /// assert_eq!(settings.render.default_format, Some(Format::Xml));
    /// assert!(settings.compression.enabled);
    /// ```
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let value = parse_value(yaml, "<string>")?;
        from_value(value, "<string>")
    }

    /// Loads settings from a single YAML file, or from every `*.yaml` /
    /// `*.yml` file in a directory merged in file-name order. Environment
    /// overrides are applied afterwards.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] when the path cannot be read, [`ConfigError::Parse`]
    /// for malformed YAML, [`ConfigError::InvalidOverride`] for bad
    /// environment values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let files = if path.is_dir() {
            yaml_files(path)?
        } else {
            vec![path.to_path_buf()]
        };

        let mut merged = Value::Mapping(Mapping::new());
        for file in &files {
            let content = fs::read_to_string(file).map_err(|source| ConfigError::Io {
                path: file.clone(),
                source,
            })?;
            let value = parse_value(&content, &file.display().to_string())?;
            merge(&mut merged, value);
        }

        let mut settings = from_value(merged, &path.display().to_string())?;
        settings.apply_overrides(std::env::vars())?;
        Ok(settings)
    }

    /// Applies `CONNEG_*` overrides from `(key, value)` pairs; unrelated keys
    /// are ignored.
    pub fn apply_overrides<I, K, V>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref().trim());
            let invalid = |reason: String| ConfigError::InvalidOverride {
                key: key.to_owned(),
                value: value.to_owned(),
                reason,
            };

            match key {
                ENV_DEFAULT_FORMAT => {
                    self.render.default_format = if value.eq_ignore_ascii_case("none") {
                        None
                    } else {
                        Some(value.parse().map_err(|e| invalid(format!("{e}")))?)
                    };
                }
                ENV_COMPRESSION_ENABLED => {
                    self.compression.enabled = value
                        .parse()
                        .map_err(|_| invalid("expected true or false".to_owned()))?;
                }
                ENV_COMPRESSION_LEVEL => {
                    let level: u32 = value
                        .parse()
                        .map_err(|_| invalid("expected an integer".to_owned()))?;
                    if level > 9 {
                        return Err(invalid("level must be between 0 and 9".to_owned()));
                    }
                    self.compression.level = level;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn yaml_files(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let entries = fs::read_dir(dir).map_err(|source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|source| ConfigError::Io {
                path: dir.to_path_buf(),
                source,
            })?
            .path();
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        if is_yaml && path.is_file() {
            files.push(path);
        } else {
            tracing::debug!(path = %path.display(), "skipping non-yaml settings entry");
        }
    }
    files.sort();
    Ok(files)
}

fn parse_value(yaml: &str, origin: &str) -> Result<Value, ConfigError> {
    let value: Value = serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
        origin: origin.to_owned(),
        source,
    })?;
    // An empty document parses as null.
    Ok(match value {
        Value::Null => Value::Mapping(Mapping::new()),
        other => other,
    })
}

fn from_value(value: Value, origin: &str) -> Result<Settings, ConfigError> {
    serde_yaml::from_value(value).map_err(|source| ConfigError::Parse {
        origin: origin.to_owned(),
        source,
    })
}

// Deep-merges mappings; any other value in `overlay` replaces `base`.
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
