//! Host-facing interpreter configuration (section 1.1, ambient stack): resource
//! limits, the boot image path, and which tracer an embedder wants, loaded from
//! a TOML document via `toml_edit` rather than environment variables.

use std::fmt;
use std::time::Duration;

use toml_edit::DocumentMut;

use crate::resource::ResourceLimits;

/// Which built-in tracer an embedder selected, by name, in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TracerSelection {
    #[default]
    Noop,
    Recording,
    Stderr,
}

impl fmt::Display for TracerSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Noop => "noop",
            Self::Recording => "recording",
            Self::Stderr => "stderr",
        };
        f.write_str(name)
    }
}

/// Top-level configuration for one `Interpreter` (section 1.1).
///
/// All fields have sensible defaults; a missing `[config]` table is not an
/// error, only a missing or malformed *value* inside a present table is.
#[derive(Debug, Clone, Default)]
pub struct InterpreterConfig {
    pub limits: ResourceLimits,
    pub boot_image_path: Option<String>,
    pub tracer: TracerSelection,
}

#[derive(Debug)]
pub enum ConfigError {
    Parse(toml_edit::TomlError),
    InvalidValue { key: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "config parse failure: {e}"),
            Self::InvalidValue { key, reason } => write!(f, "invalid value for '{key}': {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<toml_edit::TomlError> for ConfigError {
    fn from(e: toml_edit::TomlError) -> Self {
        Self::Parse(e)
    }
}

impl InterpreterConfig {
    /// Parses a config document, applying any present keys over the defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let doc: DocumentMut = text.parse()?;
        let mut config = Self::default();

        if let Some(limits) = doc.get("limits").and_then(|item| item.as_table()) {
            if let Some(v) = limits.get("max_allocations").and_then(|i| i.as_integer()) {
                config.limits.max_allocations = Some(non_negative("limits.max_allocations", v)?);
            }
            if let Some(v) = limits.get("max_operations").and_then(|i| i.as_integer()) {
                config.limits.max_operations = Some(non_negative("limits.max_operations", v)?);
            }
            if let Some(v) = limits.get("max_memory_bytes").and_then(|i| i.as_integer()) {
                config.limits.max_memory = Some(non_negative("limits.max_memory_bytes", v)?);
            }
            if let Some(v) = limits.get("max_recursion_depth").and_then(|i| i.as_integer()) {
                config.limits.max_recursion_depth = Some(non_negative("limits.max_recursion_depth", v)?);
            }
            if let Some(v) = limits.get("max_duration_ms").and_then(|i| i.as_integer()) {
                config.limits.max_duration = Some(Duration::from_millis(non_negative("limits.max_duration_ms", v)? as u64));
            }
        }

        if let Some(path) = doc.get("boot_image_path").and_then(|i| i.as_str()) {
            config.boot_image_path = Some(path.to_owned());
        }

        if let Some(tracer) = doc.get("tracer").and_then(|i| i.as_str()) {
            config.tracer = match tracer {
                "noop" => TracerSelection::Noop,
                "recording" => TracerSelection::Recording,
                "stderr" => TracerSelection::Stderr,
                other => {
                    return Err(ConfigError::InvalidValue {
                        key: "tracer",
                        reason: format!("unknown tracer '{other}'"),
                    });
                }
            };
        }

        Ok(config)
    }
}

fn non_negative(key: &'static str, value: i64) -> Result<usize, ConfigError> {
    usize::try_from(value).map_err(|_| ConfigError::InvalidValue {
        key,
        reason: format!("must be non-negative, got {value}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_tables_absent() {
        let config = InterpreterConfig::from_toml_str("").unwrap();
        assert!(config.limits.max_allocations.is_none());
        assert_eq!(config.tracer, TracerSelection::Noop);
    }

    #[test]
    fn reads_limits_and_tracer_selection() {
        let toml = r#"
            boot_image_path = "boot.bin"
            tracer = "recording"

            [limits]
            max_allocations = 10000
            max_recursion_depth = 256
            max_duration_ms = 5000
        "#;
        let config = InterpreterConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.limits.max_allocations, Some(10_000));
        assert_eq!(config.limits.max_recursion_depth, Some(256));
        assert_eq!(config.limits.max_duration, Some(Duration::from_millis(5000)));
        assert_eq!(config.boot_image_path.as_deref(), Some("boot.bin"));
        assert_eq!(config.tracer, TracerSelection::Recording);
    }

    #[test]
    fn rejects_unknown_tracer_name() {
        assert!(InterpreterConfig::from_toml_str("tracer = \"bogus\"").is_err());
    }
}
