use crate::models::UserConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File};
use std::fs;

/// Name of the user configuration file inside the config directory.
pub const USER_CONFIG_FILE: &str = "swch Config.yaml";

/// Prefix for environment overrides, e.g. `SWCH_DEBUG_MODE=true`.
pub const ENV_PREFIX: &str = "SWCH";

/// Configuration manager for loading and saving the YAML user configuration.
///
/// Values are layered: built-in defaults, then `swch Config.yaml`, then `SWCH_*`
/// environment variables.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    user_config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// # Arguments
    /// * `config_dir` - Directory containing configuration files
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            user_config_path: config_dir.join(USER_CONFIG_FILE),
            config_dir,
        })
    }

    /// The per-user default location, `<OS config dir>/swch`.
    pub fn default_dir() -> Result<Utf8PathBuf> {
        let base = dirs::config_dir().context("No per-user config directory on this system")?;
        let base = Utf8PathBuf::from_path_buf(base)
            .map_err(|p| anyhow::anyhow!("Config directory is not UTF-8: {}", p.display()))?;
        Ok(base.join(crate::APP_NAME))
    }

    /// Load the user configuration.
    ///
    /// # Returns
    /// The layered UserConfig; defaults if neither the file nor any override exists
    pub fn load_user_config(&self) -> Result<UserConfig> {
        self.load_layered(Self::environment())
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("catalog_urls")
    }

    fn load_layered(&self, env: Environment) -> Result<UserConfig> {
        if self.user_config_path.exists() {
            tracing::info!("Loading user config from {}", self.user_config_path);
        } else {
            tracing::warn!(
                "User config file not found at {}, using defaults",
                self.user_config_path
            );
        }

        let layered = Config::builder()
            .add_source(File::from(self.user_config_path.as_std_path()).required(false))
            .add_source(env)
            .build()
            .with_context(|| format!("Failed to read user config: {}", self.user_config_path))?;

        let config: UserConfig = layered
            .try_deserialize()
            .with_context(|| format!("Failed to parse user config: {}", self.user_config_path))?;

        Ok(config)
    }

    /// Save the user configuration file.
    ///
    /// # Arguments
    /// * `config` - The UserConfig to save
    pub fn save_user_config(&self, config: &UserConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize user config to YAML")?;

        fs::write(&self.user_config_path, yaml_string)
            .with_context(|| format!("Failed to write user config: {}", self.user_config_path))?;

        tracing::info!("Saved user config to {}", self.user_config_path);
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn user_config_path(&self) -> &Utf8Path {
        &self.user_config_path
    }
}
