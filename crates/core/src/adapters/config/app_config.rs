use config::Config;
use error_stack::{report, ResultExt};
use serde::Deserialize;
use serde_path_to_error::{Deserializer as PathDeserializer, Segment, Track};
use thiserror::Error;

pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "Config";
pub const ENV_PREFIX: &str = "SHEETS_SESSION";

#[derive(serde::Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub sheets: super::sheets_config::SpreadsheetConfig,
}

#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("Error reading config file '{0}'")]
    Read(String),
    #[error("Failed to deserialize config file '{path}', field path: {field}")]
    Deserialize { path: String, field: String },
}

impl AppConfig {
    /// Loads the file named by `CONFIG_PATH` (default `Config`, any extension
    /// the `config` crate understands), overridden by `SHEETS_SESSION__*`
    /// environment variables.
    pub fn from_env() -> error_stack::Result<Self, ConfigLoadError> {
        let config_path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(&config_path)
    }

    pub fn load(config_path: &str) -> error_stack::Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .change_context_lazy(|| ConfigLoadError::Read(config_path.to_string()))?;

        let value = config
            .try_deserialize::<serde_json::Value>()
            .change_context_lazy(|| ConfigLoadError::Read(config_path.to_string()))?;

        use serde::de::IntoDeserializer;
        let mut track = Track::new();
        let path_de = PathDeserializer::new(value.into_deserializer(), &mut track);
        match AppConfig::deserialize(path_de) {
            Ok(val) => Ok(val),
            Err(e) => {
                let path_str = track
                    .path()
                    .iter()
                    .map(|seg| match seg {
                        Segment::Seq { index } => format!("[{}]", index),
                        Segment::Map { key } => format!(".{}", key),
                        Segment::Enum { variant } => format!("::{}", variant),
                        Segment::Unknown => String::from("<?>"),
                    })
                    .collect::<String>();
                Err(report!(ConfigLoadError::Deserialize {
                    path: config_path.to_string(),
                    field: path_str.trim_start_matches('.').to_string(),
                }))
                .attach_printable(e.to_string())
                .attach_printable(
                    "Make sure all required fields are present in the configuration file.",
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        let path = path.to_string_lossy().to_string();
        (dir, path)
    }

    #[test]
    fn test_load_full_config() {
        let (_dir, path) = write_config(
            r#"
            [sheets]
            priv_key = "client_secret.json"
            lookup = "key=abc123"
            "#,
        );

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.sheets.priv_key.as_ref(), "client_secret.json");
        assert_eq!(config.sheets.lookup.as_deref(), Some("key=abc123"));
    }

    #[test]
    fn test_lookup_is_optional() {
        let (_dir, path) = write_config(
            r#"
            [sheets]
            priv_key = "client_secret.json"
            "#,
        );

        let config = AppConfig::load(&path).unwrap();
        assert!(config.sheets.lookup.is_none());
    }

    #[test]
    fn test_missing_field_reports_path() {
        let (_dir, path) = write_config(
            r#"
            [sheets]
            lookup = "Budget"
            "#,
        );

        let report = AppConfig::load(&path).unwrap_err();
        match report.current_context() {
            ConfigLoadError::Deserialize { field, .. } => assert!(field.starts_with("sheets")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
