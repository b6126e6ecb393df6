use std::fmt;
use std::path::Path;

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

use crate::path::ConfigPathError;
use source::TomlTableSource;

pub mod source;

/// The only config file layout understood by this crate.
pub const CONFIG_VERSION: u32 = 1;

/// Name of the profile used when none is given.
pub const DEFAULT_PROFILE: &str = "default";

#[derive(thiserror::Error, Debug)]
pub enum LoadConfigError {
    #[error("Failed to get config file path: {0}")]
    FailedToGetConfigFilePath(#[from] ConfigPathError),

    #[error("Failed to build config: {0}")]
    FailedToBuildConfig(#[from] ConfigError),

    #[error("Unsupported config version: {0}")]
    UnsupportedConfigVersion(u32),
}

#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
pub struct KeyVaultConfig {
    /// Base URL of the vault, e.g. `https://my-vault.vault.azure.net`
    pub vault_url: Option<String>,
    /// OAuth2 client id used for the client-credentials exchange
    pub client_id: Option<String>,
    /// OAuth2 client secret used for the client-credentials exchange
    pub client_secret: Option<String>,
    /// Vault API version sent as `api-version`
    pub api_version: Option<String>,
}

impl fmt::Debug for KeyVaultConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyVaultConfig")
            .field("vault_url", &self.vault_url)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("api_version", &self.api_version)
            .finish()
    }
}

/// Load the config from the default file and environment variables for a given profile
/// If no profile name is provided, the default profile is loaded
pub fn load_config(profile_name: Option<&str>) -> Result<KeyVaultConfig, LoadConfigError> {
    let config_file_path = crate::path::config_file()?;
    load_config_from_file(config_file_path, true, profile_name)
}

/// Load the config for a given file and profile, optionally loading environment variables
pub fn load_config_from_file(
    config_file_path: impl AsRef<Path>,
    load_environment_variables: bool,
    profile_name: Option<&str>,
) -> Result<KeyVaultConfig, LoadConfigError> {
    let config_file_path = config_file_path.as_ref();

    // Layers, lowest to highest precedence:
    // 1. top-level keys of the file
    // 2. the profile table
    // 3. KEYVAULT_* environment variables
    let mut config_builder = Config::builder()
        .add_source(TomlTableSource::global(config_file_path))
        .add_source(TomlTableSource::profile(
            config_file_path,
            profile_name.unwrap_or(DEFAULT_PROFILE),
        ));

    if load_environment_variables {
        config_builder = config_builder.add_source(Environment::with_prefix("KEYVAULT"));
    }

    let config = config_builder.build()?;

    // A file without a version is treated as the current layout
    let config_version = match config.get::<u32>("version") {
        Ok(version) => version,
        Err(ConfigError::NotFound(_)) => CONFIG_VERSION,
        Err(_) => return Err(LoadConfigError::UnsupportedConfigVersion(0)),
    };
    if config_version != CONFIG_VERSION {
        return Err(LoadConfigError::UnsupportedConfigVersion(config_version));
    }

    Ok(config.try_deserialize::<KeyVaultConfig>()?)
}
