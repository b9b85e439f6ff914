use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::session::parse_duration;

pub const CONFIG_FILE: &str = "schemapull.toml";

/// Main configuration structure loaded from schemapull.toml
#[derive(Deserialize, Default, Debug)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub schema: Option<SchemaConfig>,
    pub introspect: Option<IntrospectConfig>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
    /// Schema file, relative to the project directory
    pub path: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct IntrospectConfig {
    /// e.g. "5s", "500ms"
    pub connect_timeout: Option<String>,
    pub statement_timeout: Option<String>,
}

impl Config {
    /// Load config from file, or return default if no config exists.
    /// An explicit path (--config) MUST exist. Otherwise `schemapull.toml`
    /// in `base_dir` is used when present.
    pub fn load(explicit: Option<&Path>, base_dir: &Path) -> Result<Self> {
        let config_path: PathBuf = match explicit {
            Some(p) => {
                if !p.exists() {
                    bail!("Config file not found: {}", p.display());
                }
                p.to_path_buf()
            }
            None => {
                let default_path = base_dir.join(CONFIG_FILE);
                if default_path.exists() {
                    default_path
                } else {
                    return Ok(Config::default());
                }
            }
        };

        let contents = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("Failed to parse {}", config_path.display()))
    }

    fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if let Some(p) = self.schema_path() {
            Self::validate_path(p, "schema.path")?;
        }
        // Surface bad durations at load time rather than mid-run.
        self.connect_timeout()?;
        self.statement_timeout()?;
        Ok(())
    }

    /// Validate a single path doesn't contain path traversal
    fn validate_path(path: &str, field: &str) -> Result<()> {
        if path.contains("..") {
            bail!(
                "Invalid {} path '{}': paths cannot contain '..'",
                field,
                path
            );
        }
        if Path::new(path).is_absolute() {
            bail!("Invalid {} path '{}': paths must be relative", field, path);
        }
        Ok(())
    }

    pub fn schema_path(&self) -> Option<&str> {
        self.schema.as_ref().and_then(|s| s.path.as_deref())
    }

    pub fn connect_timeout(&self) -> Result<Option<Duration>> {
        self.introspect
            .as_ref()
            .and_then(|i| i.connect_timeout.as_deref())
            .map(|s| parse_duration(s).context("Invalid introspect.connect_timeout"))
            .transpose()
    }

    pub fn statement_timeout(&self) -> Result<Option<Duration>> {
        self.introspect
            .as_ref()
            .and_then(|i| i.statement_timeout.as_deref())
            .map(|s| parse_duration(s).context("Invalid introspect.statement_timeout"))
            .transpose()
    }
}
