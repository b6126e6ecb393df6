use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use config::{ConfigError, Source, Value, ValueKind};

#[derive(thiserror::Error, Debug)]
pub enum TomlSourceError {
    #[error("Failed to read file {0}: {1}")]
    FailedToReadFile(PathBuf, std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    FailedToParseTOML(#[from] toml::de::Error),

    #[error("Invalid root, was expecting table")]
    InvalidRootExpectedTable,

    #[error("Invalid profile {0}, was expecting table")]
    InvalidProfileExpectedTable(String),
}

impl From<TomlSourceError> for ConfigError {
    fn from(error: TomlSourceError) -> Self {
        ConfigError::Foreign(Box::new(error))
    }
}

/// Which table of the config file a [`TomlTableSource`] reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Table {
    /// Top-level keys, shared by every profile.
    Global,
    /// Keys under `[<name>]`, overriding the global ones.
    Profile(String),
}

/// A `config` source reading scalar keys from one table of a TOML file.
///
/// A missing file yields no keys, so credentials can come from the
/// environment alone.
#[derive(Clone, Debug)]
pub struct TomlTableSource {
    path: PathBuf,
    table: Table,
}

impl TomlTableSource {
    pub fn global(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            table: Table::Global,
        }
    }

    pub fn profile(path: impl Into<PathBuf>, profile_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            table: Table::Profile(profile_name.into()),
        }
    }

    fn origin(&self) -> &str {
        match &self.table {
            Table::Global => "global",
            Table::Profile(name) => name,
        }
    }

    fn select(&self, mut root: toml::Table) -> Result<toml::Table, TomlSourceError> {
        match &self.table {
            Table::Global => Ok(root),
            Table::Profile(name) => match root.remove(name) {
                Some(toml::Value::Table(profile)) => Ok(profile),
                Some(_) => Err(TomlSourceError::InvalidProfileExpectedTable(name.clone())),
                None => Ok(toml::Table::new()),
            },
        }
    }
}

impl Source for TomlTableSource {
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new((*self).clone())
    }

    fn collect(&self) -> Result<HashMap<String, Value>, ConfigError> {
        let Some(root) = read_root(&self.path)? else {
            return Ok(HashMap::new());
        };
        let table = self.select(root)?;
        Ok(scalar_values(self.origin(), table))
    }
}

fn read_root(path: &Path) -> Result<Option<toml::Table>, TomlSourceError> {
    let file_content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(TomlSourceError::FailedToReadFile(path.to_path_buf(), e)),
    };

    match toml::from_str::<toml::Value>(&file_content)? {
        toml::Value::Table(root) => Ok(Some(root)),
        _ => Err(TomlSourceError::InvalidRootExpectedTable),
    }
}

/// Keep the scalar keys of `table`; nested tables are profiles and arrays
/// or datetimes are not used by any setting.
fn scalar_values(origin: &str, table: toml::Table) -> HashMap<String, Value> {
    let origin = origin.to_string();
    table
        .into_iter()
        .filter_map(|(key, value)| {
            let kind = match value {
                toml::Value::String(s) => ValueKind::String(s),
                toml::Value::Integer(i) => ValueKind::I64(i),
                toml::Value::Float(f) => ValueKind::Float(f),
                toml::Value::Boolean(b) => ValueKind::Boolean(b),
                toml::Value::Array(_) | toml::Value::Datetime(_) | toml::Value::Table(_) => {
                    return None;
                }
            };
            Some((key, Value::new(Some(&origin), kind)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn global_source_skips_profile_tables() {
        let file = write_config(
            r#"
            version = 1
            vault_url = "https://global.vault.example.net"

            [staging]
            vault_url = "https://staging.vault.example.net"
            "#,
        );

        let values = TomlTableSource::global(file.path()).collect().unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(
            values["vault_url"].clone().into_string().unwrap(),
            "https://global.vault.example.net"
        );
    }

    #[test]
    fn profile_source_reads_named_table() {
        let file = write_config(
            r#"
            [staging]
            client_id = "staging-client"
            "#,
        );

        let values = TomlTableSource::profile(file.path(), "staging")
            .collect()
            .unwrap();
        assert_eq!(
            values["client_id"].clone().into_string().unwrap(),
            "staging-client"
        );

        let missing = TomlTableSource::profile(file.path(), "production")
            .collect()
            .unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn profile_that_is_not_a_table_is_rejected() {
        let file = write_config(r#"staging = "oops""#);
        assert!(
            TomlTableSource::profile(file.path(), "staging")
                .collect()
                .is_err()
        );
    }

    #[test]
    fn missing_file_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let values = TomlTableSource::global(dir.path().join("absent.toml"))
            .collect()
            .unwrap();
        assert!(values.is_empty());
    }
}
