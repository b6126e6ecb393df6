use std::path::PathBuf;

use thiserror::Error;

const CONFIG_DIR_NAME: &str = "keyvault";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigPathError {
    #[error("Could not determine config directory")]
    CouldNotDetermineConfigDir,
}

/// Get the keyvault config directory for the current platform
///
/// On macOS, this is `~/Library/Application Support/keyvault`
/// On Linux, this is `~/.config/keyvault`
/// On Windows, this is `%APPDATA%\keyvault`
pub fn home_directory() -> Result<PathBuf, ConfigPathError> {
    let config_dir = dirs::config_dir().ok_or(ConfigPathError::CouldNotDetermineConfigDir)?;
    Ok(config_dir.join(CONFIG_DIR_NAME))
}

/// Get the path to the default config file, `config.toml` inside [`home_directory`]
pub fn config_file() -> Result<PathBuf, ConfigPathError> {
    Ok(home_directory()?.join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_file_lives_in_home_directory() {
        // dirs returns None on exotic platforms without a home; nothing to check there.
        let (Ok(home), Ok(file)) = (home_directory(), config_file()) else {
            return;
        };
        assert_eq!(file.parent(), Some(home.as_path()));
        assert!(file.ends_with("keyvault/config.toml"));
    }
}
