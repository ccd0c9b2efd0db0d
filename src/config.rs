use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use toml::Value;

use crate::plan::TablePlan;

pub const SOURCE_URL_ENV: &str = "SOURCE_DATABASE_URL";
pub const DESTINATION_URL_ENV: &str = "DESTINATION_DATABASE_URL";

const DEFAULT_CONFIG_FILE: &str = "config.toml";
const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_MIGRATIONS_DIR: &str = "migrations";
const DEFAULT_MAX_CONNECTIONS: u32 = 2;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    source: DatabaseConfig,
    destination: DatabaseConfig,
    settings: SettingsConfig,
    plan: TablePlan,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SettingsConfig {
    pub batch_size: usize,
    pub migrations_dir: PathBuf,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        SettingsConfig {
            batch_size: DEFAULT_BATCH_SIZE,
            migrations_dir: PathBuf::from(DEFAULT_MIGRATIONS_DIR),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl Config {
    pub fn new(
        source_url: String,
        destination_url: String,
        settings: SettingsConfig,
        plan: TablePlan,
    ) -> Result<Self> {
        let source = database_config(source_url, &settings).context("Invalid source database")?;
        let destination =
            database_config(destination_url, &settings).context("Invalid destination database")?;

        Ok(Config {
            source,
            destination,
            settings,
            plan,
        })
    }

    /// Loads the settings file (an explicit path must exist, the default one
    /// may be absent) and applies the connection string environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let value = match path {
            Some(path) => read_toml(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                read_toml(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => {
                debug!("No {} found, using built-in settings", DEFAULT_CONFIG_FILE);
                Value::Table(Default::default())
            }
        };

        Self::from_toml(value, |key| std::env::var(key).ok())
    }

    pub(crate) fn from_toml(config: Value, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let source_url = resolve_url(&config, "source", SOURCE_URL_ENV, &env)?;
        let destination_url = resolve_url(&config, "destination", DESTINATION_URL_ENV, &env)?;

        let settings = match config.get("settings") {
            Some(settings) => parse_settings_config(settings)?,
            None => SettingsConfig::default(),
        };

        let plan = TablePlan::from_toml(&config).context("Invalid table plan")?;

        Config::new(source_url, destination_url, settings, plan)
    }

    pub fn source(&self) -> &DatabaseConfig {
        &self.source
    }

    pub fn destination(&self) -> &DatabaseConfig {
        &self.destination
    }

    pub fn settings(&self) -> &SettingsConfig {
        &self.settings
    }

    pub fn plan(&self) -> &TablePlan {
        &self.plan
    }
}

fn read_toml(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let value = content
        .parse::<Value>()
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(value)
}

fn resolve_url(
    config: &Value,
    section: &str,
    env_key: &str,
    env: &impl Fn(&str) -> Option<String>,
) -> Result<String> {
    env(env_key)
        .filter(|url| !url.trim().is_empty())
        .or_else(|| {
            config
                .get(section)
                .and_then(|value| value.get("url"))
                .and_then(|value| value.as_str())
                .map(|value| value.to_string())
        })
        .ok_or_else(|| {
            anyhow!(
                "Missing {} database url, set {} or [{}] url",
                section,
                env_key,
                section
            )
        })
}

fn database_config(url: String, settings: &SettingsConfig) -> Result<DatabaseConfig> {
    if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
        bail!("Connection string must use the postgres:// or postgresql:// scheme");
    }

    Ok(DatabaseConfig {
        url,
        max_connections: settings.max_connections,
        connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
    })
}

fn parse_settings_config(config: &Value) -> Result<SettingsConfig> {
    let defaults = SettingsConfig::default();

    let batch_size = match config.get("batch_size") {
        Some(value) => value
            .as_integer()
            .filter(|value| *value > 0)
            .ok_or_else(|| anyhow!("Invalid batch size, expected a positive integer"))?
            as usize,
        None => defaults.batch_size,
    };

    let migrations_dir = match config.get("migrations_dir") {
        Some(value) => value
            .as_str()
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("Invalid migrations directory"))?,
        None => defaults.migrations_dir,
    };

    let max_connections = match config.get("max_connections") {
        Some(value) => value
            .as_integer()
            .filter(|value| *value > 0)
            .ok_or_else(|| anyhow!("Invalid max connections, expected a positive integer"))?
            .try_into()?,
        None => defaults.max_connections,
    };

    let connect_timeout_secs = match config.get("connect_timeout_secs") {
        Some(value) => value
            .as_integer()
            .filter(|value| *value > 0)
            .ok_or_else(|| anyhow!("Invalid connect timeout, expected a positive integer"))?
            as u64,
        None => defaults.connect_timeout_secs,
    };

    Ok(SettingsConfig {
        batch_size,
        migrations_dir,
        max_connections,
        connect_timeout_secs,
    })
}
