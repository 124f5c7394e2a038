//! # Configuration
//!
//! Centralizes all settings with a clear override hierarchy:
//! defaults → config file → env vars → CLI flags.
//!
//! Config lives at `~/.pagekit/config.toml`. If missing on first run, a
//! commented-out default is generated so users can discover all options.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::binding::DEFAULT_SCROLL_THRESHOLD;
use crate::core::paging::DEFAULT_ERROR_MESSAGE;
use crate::pager::DEFAULT_PAGE_SIZE;
use crate::source::rest::{
    DEFAULT_DATA_FIELD, DEFAULT_FIRST_PAGE, DEFAULT_PAGE_COUNT_FIELD, DEFAULT_TIMEOUT,
};
use crate::source::{DEFAULT_CONTENT_TYPE, DEFAULT_LIMIT_FIELD, DEFAULT_PAGE_FIELD};

// ============================================================================
// Config Structs (all fields Option<T> for sparse TOML)
// ============================================================================

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PagekitConfig {
    #[serde(default)]
    pub paging: PagingConfig,
    #[serde(default)]
    pub rest: RestConfig,
    #[serde(default)]
    pub list: ListConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PagingConfig {
    pub page_size: Option<u32>,
    pub enabled: Option<bool>,
    pub scroll_threshold: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RestConfig {
    pub url: Option<String>,
    pub page_field: Option<String>,
    pub limit_field: Option<String>,
    pub first_page: Option<u32>,
    pub content_type: Option<String>,
    pub data_field: Option<String>,
    pub page_count_field: Option<String>,
    pub timeout_secs: Option<u64>,
    pub params: Option<toml::Table>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ListConfig {
    pub key_path: Option<String>,
    pub error_message: Option<String>,
}

// ============================================================================
// Resolved Config (concrete values, no Options)
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub url: Option<String>,
    pub params: Map<String, Value>,
    pub page_size: u32,
    pub paging: bool,
    pub scroll_threshold: usize,
    pub page_field: String,
    pub limit_field: String,
    pub first_page: u32,
    pub content_type: String,
    pub data_field: String,
    pub page_count_field: String,
    pub timeout: Duration,
    pub key_path: String,
    pub error_message: String,
}

/// Values supplied on the command line (None = not specified).
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub url: Option<String>,
    pub page_size: Option<u32>,
    pub key_path: Option<String>,
    pub no_paging: bool,
    pub params: Vec<(String, String)>,
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config I/O error: {e}"),
            ConfigError::Parse(e) => write!(f, "config parse error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Loading
// ============================================================================

/// Returns the path to `~/.pagekit/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".pagekit").join("config.toml"))
}

/// Load config from `path`, or from `~/.pagekit/config.toml` when `None`.
///
/// A missing default file is generated (commented out) and yields
/// `PagekitConfig::default()`. An explicit `path` must exist; otherwise
/// `ConfigError::Io`. A malformed file is `ConfigError::Parse`.
pub fn load_config(path: Option<&Path>) -> Result<PagekitConfig, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let Some(p) = config_path() else {
                warn!("Could not determine home directory, using default config");
                return Ok(PagekitConfig::default());
            };
            if !p.exists() {
                info!("No config file found, generating default at {}", p.display());
                generate_default_config(&p);
                return Ok(PagekitConfig::default());
            }
            p
        }
    };

    let contents = fs::read_to_string(&path).map_err(ConfigError::Io)?;
    let config: PagekitConfig = toml::from_str(&contents).map_err(ConfigError::Parse)?;
    info!("Loaded config from {}", path.display());
    debug!("Config: {:?}", config);
    Ok(config)
}

/// Generates a commented-out default config file at the given path.
fn generate_default_config(path: &Path) {
    let default_content = r#"# pagekit configuration
# All settings are optional. Defaults are used for anything not specified.
# Override hierarchy: defaults → this file → env vars → CLI flags.

# [paging]
# page_size = 10
# enabled = true
# scroll_threshold = 3               # rows from the end that trigger the next page

# [rest]
# url = "https://api.example.com/items"   # Or set PAGEKIT_URL
# page_field = "page"
# limit_field = "limit"
# first_page = 1
# content_type = "application/json"
# data_field = "data"                # where the items live in the response
# page_count_field = "pageCount"
# timeout_secs = 15
#
# [rest.params]
# category = "books"

# [list]
# key_path = "id"                    # dotted path to each item's identity
# error_message = "Something went wrong. Please try again."
"#;

    if let Some(parent) = path.parent()
        && let Err(e) = fs::create_dir_all(parent)
    {
        warn!("Failed to create config directory: {}", e);
        return;
    }
    if let Err(e) = fs::write(path, default_content) {
        warn!("Failed to write default config: {}", e);
    }
}

// ============================================================================
// Resolution
// ============================================================================

fn toml_to_json(value: &toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s.clone()),
        toml::Value::Integer(i) => Value::from(*i),
        toml::Value::Float(f) => Value::from(*f),
        toml::Value::Boolean(b) => Value::Bool(*b),
        toml::Value::Datetime(d) => Value::String(d.to_string()),
        toml::Value::Array(values) => Value::Array(values.iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .iter()
                .map(|(k, v)| (k.clone(), toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Resolve the final config by collapsing: defaults → config file → env vars → CLI.
pub fn resolve(config: &PagekitConfig, cli: &CliOverrides) -> ResolvedConfig {
    // URL: CLI → env → config
    let url = cli
        .url
        .clone()
        .or_else(|| std::env::var("PAGEKIT_URL").ok())
        .or_else(|| config.rest.url.clone());

    // Page size: CLI → env → config → default
    let page_size = cli
        .page_size
        .or_else(|| {
            std::env::var("PAGEKIT_PAGE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
        })
        .or(config.paging.page_size)
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .max(1);

    // Params: config table, then CLI pairs on top
    let mut params: Map<String, Value> = config
        .rest
        .params
        .as_ref()
        .map(|table| {
            table
                .iter()
                .map(|(k, v)| (k.clone(), toml_to_json(v)))
                .collect()
        })
        .unwrap_or_default();
    for (k, v) in &cli.params {
        params.insert(k.clone(), Value::String(v.clone()));
    }

    let paging = !cli.no_paging && config.paging.enabled.unwrap_or(true);

    ResolvedConfig {
        url,
        params,
        page_size,
        paging,
        scroll_threshold: config
            .paging
            .scroll_threshold
            .unwrap_or(DEFAULT_SCROLL_THRESHOLD),
        page_field: config
            .rest
            .page_field
            .clone()
            .unwrap_or_else(|| DEFAULT_PAGE_FIELD.to_string()),
        limit_field: config
            .rest
            .limit_field
            .clone()
            .unwrap_or_else(|| DEFAULT_LIMIT_FIELD.to_string()),
        first_page: config.rest.first_page.unwrap_or(DEFAULT_FIRST_PAGE),
        content_type: config
            .rest
            .content_type
            .clone()
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
        data_field: config
            .rest
            .data_field
            .clone()
            .unwrap_or_else(|| DEFAULT_DATA_FIELD.to_string()),
        page_count_field: config
            .rest
            .page_count_field
            .clone()
            .unwrap_or_else(|| DEFAULT_PAGE_COUNT_FIELD.to_string()),
        timeout: config
            .rest
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT),
        key_path: cli
            .key_path
            .clone()
            .or_else(|| config.list.key_path.clone())
            .unwrap_or_else(|| "id".to_string()),
        error_message: config
            .list
            .error_message
            .clone()
            .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config_parses() {
        let config = PagekitConfig::default();
        assert!(config.rest.url.is_none());
        assert!(config.paging.page_size.is_none());
    }

    #[test]
    fn test_resolve_uses_defaults_when_empty() {
        let resolved = resolve(&PagekitConfig::default(), &CliOverrides::default());
        assert_eq!(resolved.page_size, DEFAULT_PAGE_SIZE);
        assert!(resolved.paging);
        assert_eq!(resolved.page_field, "page");
        assert_eq!(resolved.limit_field, "limit");
        assert_eq!(resolved.first_page, 1);
        assert_eq!(resolved.key_path, "id");
        assert_eq!(resolved.timeout, DEFAULT_TIMEOUT);
        assert_eq!(resolved.error_message, DEFAULT_ERROR_MESSAGE);
    }

    #[test]
    fn test_cli_wins_over_config() {
        let config = PagekitConfig {
            paging: PagingConfig {
                page_size: Some(25),
                ..Default::default()
            },
            list: ListConfig {
                key_path: Some("uuid".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let cli = CliOverrides {
            page_size: Some(5),
            key_path: Some("slug".into()),
            no_paging: true,
            ..Default::default()
        };
        let resolved = resolve(&config, &cli);
        assert_eq!(resolved.page_size, 5);
        assert_eq!(resolved.key_path, "slug");
        assert!(!resolved.paging);
    }

    #[test]
    fn test_page_size_never_zero() {
        let cli = CliOverrides {
            page_size: Some(0),
            ..Default::default()
        };
        assert_eq!(resolve(&PagekitConfig::default(), &cli).page_size, 1);
    }

    #[test]
    fn test_toml_parses_with_params() {
        let toml_str = r#"
[paging]
page_size = 20
scroll_threshold = 5

[rest]
page_field = "p"
limit_field = "per_page"
first_page = 0
timeout_secs = 3

[rest.params]
category = "books"
in_stock = true

[list]
key_path = "meta.id"
"#;
        let config: PagekitConfig = toml::from_str(toml_str).unwrap();
        let cli = CliOverrides {
            params: vec![("sort".into(), "asc".into())],
            ..Default::default()
        };
        let resolved = resolve(&config, &cli);
        assert_eq!(resolved.page_size, 20);
        assert_eq!(resolved.scroll_threshold, 5);
        assert_eq!(resolved.page_field, "p");
        assert_eq!(resolved.limit_field, "per_page");
        assert_eq!(resolved.first_page, 0);
        assert_eq!(resolved.timeout, Duration::from_secs(3));
        assert_eq!(resolved.key_path, "meta.id");
        assert_eq!(resolved.params["category"], json!("books"));
        assert_eq!(resolved.params["in_stock"], json!(true));
        assert_eq!(resolved.params["sort"], json!("asc"));
    }

    #[test]
    fn test_sparse_toml_parses() {
        let config: PagekitConfig = toml::from_str("[list]\nerror_message = \"Oops\"\n").unwrap();
        assert_eq!(config.list.error_message.as_deref(), Some("Oops"));
        assert!(config.rest.params.is_none());
    }

    #[test]
    fn test_load_config_explicit_path() {
        let path = std::env::temp_dir().join(format!("pagekit-{}.toml", uuid::Uuid::new_v4()));
        fs::write(&path, "[paging]\npage_size = 7\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.paging.page_size, Some(7));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_config_malformed() {
        let path = std::env::temp_dir().join(format!("pagekit-{}.toml", uuid::Uuid::new_v4()));
        fs::write(&path, "[paging\npage_size = ").unwrap();
        assert!(matches!(load_config(Some(&path)), Err(ConfigError::Parse(_))));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_config_missing_explicit_path_is_error() {
        let path = std::env::temp_dir().join(format!("pagekit-{}.toml", uuid::Uuid::new_v4()));
        assert!(matches!(load_config(Some(&path)), Err(ConfigError::Io(_))));
        assert!(!path.exists());
    }
}
