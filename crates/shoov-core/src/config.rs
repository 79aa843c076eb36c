//! Layered configuration, resolved once at startup.
//!
//! Precedence (highest first): explicit overrides, environment, the JSON
//! file `~/.shoov.json`, built-in defaults. Every key may be spelled bare
//! (`access_token`) or prefixed (`SHOOV_ACCESS_TOKEN`). Empty values count
//! as unset.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Result, ShoovError};

pub const DEFAULT_BACKEND_URL: &str = "https://live-shoov.pantheonsite.io";
pub const DEFAULT_CLIENT_URL: &str = "https://app.shoov.io";
pub const CONFIG_FILE_NAME: &str = ".shoov.json";

const ENV_PREFIX: &str = "SHOOV_";

/// One source of configuration values.
#[derive(Debug, Clone, Default)]
pub struct ConfigLayer {
    name: String,
    values: HashMap<String, String>,
}

impl ConfigLayer {
    /// Layer from explicit key/value pairs (e.g. CLI flags).
    pub fn from_pairs<K, V>(name: &str, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.to_string(),
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Layer from the process environment.
    pub fn from_env() -> Self {
        Self::from_pairs("environment", std::env::vars())
    }

    /// Layer from a JSON object file. A missing file is an empty layer.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::from_pairs(
                    "file",
                    std::iter::empty::<(String, String)>(),
                ))
            }
            Err(e) => {
                return Err(ShoovError::Config(format!(
                    "cannot read {}: {e}",
                    path.display()
                )))
            }
        };

        let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&content)
            .map_err(|e| ShoovError::Config(format!("invalid JSON in {}: {e}", path.display())))?;

        let values = object.into_iter().filter_map(|(k, v)| {
            let value = match v {
                serde_json::Value::String(s) => s,
                serde_json::Value::Bool(b) => b.to_string(),
                serde_json::Value::Number(n) => n.to_string(),
                _ => return None,
            };
            Some((k, value))
        });
        Ok(Self::from_pairs(&path.display().to_string(), values))
    }

    /// Bare key first, then the `SHOOV_` upper-case spelling.
    fn get(&self, key: &str) -> Option<&str> {
        let prefixed = format!("{ENV_PREFIX}{}", key.to_ascii_uppercase());
        let found = [key, prefixed.as_str()]
            .into_iter()
            .filter_map(|k| self.values.get(k))
            .map(String::as_str)
            .find(|v| !v.is_empty());
        found
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Immutable resolved configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct ShoovConfig {
    pub access_token: Option<String>,
    pub backend_url: String,
    pub client_url: String,
    pub open_link: bool,
    pub debug: bool,
}

impl Default for ShoovConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            client_url: DEFAULT_CLIENT_URL.to_string(),
            open_link: false,
            debug: false,
        }
    }
}

impl std::fmt::Debug for ShoovConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShoovConfig")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<redacted>"),
            )
            .field("backend_url", &self.backend_url)
            .field("client_url", &self.client_url)
            .field("open_link", &self.open_link)
            .field("debug", &self.debug)
            .finish()
    }
}

impl ShoovConfig {
    /// Resolve from `layers`, highest precedence first, over the defaults.
    pub fn resolve(layers: &[ConfigLayer]) -> Self {
        let lookup = |key: &str| layers.iter().find_map(|layer| layer.get(key));
        let defaults = ShoovConfig::default();

        ShoovConfig {
            access_token: lookup("access_token").map(str::to_string),
            backend_url: lookup("backend_url")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.backend_url),
            client_url: lookup("client_url")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.client_url),
            open_link: lookup("open_link").map(parse_bool).unwrap_or(defaults.open_link),
            debug: lookup("debug").map(parse_bool).unwrap_or(defaults.debug),
        }
    }

    /// Standard resolution: `overrides`, environment, then the config file
    /// (`file` or `~/.shoov.json`).
    pub fn load(overrides: ConfigLayer, file: Option<&Path>) -> Result<Self> {
        let file_layer = match file.map(Path::to_path_buf).or_else(default_config_path) {
            Some(path) => ConfigLayer::from_json_file(&path)?,
            None => ConfigLayer::default(),
        };
        Ok(Self::resolve(&[overrides, ConfigLayer::from_env(), file_layer]))
    }

    /// The access token, or [`ShoovError::MissingCredential`].
    pub fn require_token(&self) -> Result<&str> {
        self.access_token
            .as_deref()
            .ok_or(ShoovError::MissingCredential)
    }

    /// Link to the regressions of `build` in the web client.
    pub fn regression_url(&self, build: &str) -> String {
        format!("{}/#/screenshots/{}", self.client_url, build)
    }
}

/// `~/.shoov.json` (`%USERPROFILE%` on Windows).
pub fn default_config_path() -> Option<PathBuf> {
    let home_var = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
    std::env::var_os(home_var).map(|home| PathBuf::from(home).join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_without_layers() {
        let config = ShoovConfig::resolve(&[]);
        assert_eq!(config, ShoovConfig::default());
        assert_eq!(config.backend_url, DEFAULT_BACKEND_URL);
        assert!(config.require_token().is_err());
    }

    #[test]
    fn test_higher_layer_wins() {
        let env = ConfigLayer::from_pairs("env", [("SHOOV_ACCESS_TOKEN", "from-env")]);
        let file = ConfigLayer::from_pairs(
            "file",
            [("access_token", "from-file"), ("client_url", "https://c.example")],
        );

        let config = ShoovConfig::resolve(&[env, file]);
        assert_eq!(config.access_token.as_deref(), Some("from-env"));
        assert_eq!(config.client_url, "https://c.example");
    }

    #[test]
    fn test_empty_value_falls_through() {
        let env = ConfigLayer::from_pairs("env", [("SHOOV_ACCESS_TOKEN", "")]);
        let file = ConfigLayer::from_pairs("file", [("access_token", "from-file")]);

        let config = ShoovConfig::resolve(&[env, file]);
        assert_eq!(config.access_token.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_bool_parsing() {
        let cases = [
            ("1", true),
            ("TRUE", true),
            ("yes", true),
            ("0", false),
            ("no", false),
        ];
        for (raw, expected) in cases {
            let layer = ConfigLayer::from_pairs("env", [("SHOOV_DEBUG", raw)]);
            assert_eq!(ShoovConfig::resolve(&[layer]).debug, expected, "raw: {raw}");
        }
    }

    #[test]
    fn test_json_file_layer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            r#"{"access_token": "abc", "open_link": true, "backend_url": "https://b.example/"}"#,
        )
        .unwrap();

        let layer = ConfigLayer::from_json_file(&path).unwrap();
        let config = ShoovConfig::resolve(&[layer]);
        assert_eq!(config.access_token.as_deref(), Some("abc"));
        assert!(config.open_link);
        assert_eq!(config.backend_url, "https://b.example");
    }

    #[test]
    fn test_missing_file_is_empty_layer() {
        let dir = tempdir().unwrap();
        let layer = ConfigLayer::from_json_file(&dir.path().join("absent.json")).unwrap();
        assert_eq!(ShoovConfig::resolve(&[layer]), ShoovConfig::default());
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            ConfigLayer::from_json_file(&path),
            Err(ShoovError::Config(_))
        ));
    }

    #[test]
    fn test_debug_output_redacts_token() {
        let layer = ConfigLayer::from_pairs("env", [("access_token", "very-secret")]);
        let rendered = format!("{:?}", ShoovConfig::resolve(&[layer]));
        assert!(!rendered.contains("very-secret"));
    }

    #[test]
    fn test_regression_url() {
        let config = ShoovConfig::default();
        assert_eq!(
            config.regression_url("42"),
            "https://app.shoov.io/#/screenshots/42"
        );
    }
}
