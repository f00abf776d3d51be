//! TOML configuration parsing and validation.
//!
//! ```toml
//! [db]
//! path = "./data/shelf.sqlite"
//!
//! [sources.products]
//! kind = "graphql"
//! url_hex = "68747470733a2f2f..."        # or: url = "https://..."
//! query_file = "queries/product.graphql"  # or: query = "..."
//! items_path = "data.productDetail.items"
//! page_size = 20
//! page_limit = 625                        # 0 = until the first empty page
//! delay_ms = 500
//! store = "raw"                           # or "transformed"
//!
//! [sources.pages]
//! kind = "html"
//! listing_url = "https://shop.example/catalog?page={page}"
//! link_selector = ".product__information meta"
//! link_attr = "content"
//! delay_ms = 2000
//! store = "transformed"
//! ```
//!
//! Every problem found here is a [`ConfigError`]: nothing is fetched or
//! written until the whole file validates.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use shelf_core::error::ConfigError;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Paginated JSON API queried with a GraphQL template.
    Graphql,
    /// Paginated HTML listing pages linking to product pages.
    Html,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Graphql => "graphql",
            SourceKind::Html => "html",
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    /// Persist the record exactly as received.
    #[default]
    Raw,
    /// Persist the transformer's flat record.
    Transformed,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub kind: SourceKind,

    #[serde(default)]
    pub url: Option<String>,
    /// Hex-encoded URL, decoded at load time.
    #[serde(default)]
    pub url_hex: Option<String>,

    #[serde(default)]
    pub query: Option<String>,
    /// Path to the query template, relative to the config file.
    #[serde(default)]
    pub query_file: Option<PathBuf>,
    #[serde(default = "default_items_path")]
    pub items_path: String,
    #[serde(default = "default_id_path")]
    pub id_path: String,

    #[serde(default)]
    pub listing_url: Option<String>,
    #[serde(default)]
    pub link_selector: Option<String>,
    #[serde(default = "default_link_attr")]
    pub link_attr: String,

    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub store: StoreMode,
}

fn default_items_path() -> String {
    "data.productDetail.items".to_string()
}
fn default_id_path() -> String {
    "id".to_string()
}
fn default_link_attr() -> String {
    "href".to_string()
}
fn default_page_size() -> u32 {
    20
}
fn default_page_limit() -> u32 {
    625
}
fn default_delay_ms() -> u64 {
    500
}
fn default_timeout_secs() -> u64 {
    30
}

impl SourceConfig {
    /// Last page to request, `None` when bounded only by the first empty page.
    pub fn page_limit(&self) -> Option<u32> {
        (self.page_limit > 0).then_some(self.page_limit)
    }

    /// Resolved request URL (graphql sources).
    pub fn endpoint(&self) -> Result<&str> {
        self.url
            .as_deref()
            .ok_or_else(|| ConfigError("source has no url".to_string()).into())
    }

    /// Resolved query template (graphql sources).
    pub fn query_template(&self) -> Result<&str> {
        self.query
            .as_deref()
            .ok_or_else(|| ConfigError("source has no query template".to_string()).into())
    }
}

/// Table that holds the records of a source.
pub fn table_name(source: &str) -> String {
    format!("records_{}", source)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Decode a hex-masked string such as `68747470...` into text.
pub fn decode_hex_url(masked: &str) -> Result<String> {
    let bytes = hex::decode(masked.trim())
        .map_err(|e| ConfigError(format!("url_hex is not valid hex: {}", e)))?;
    let url = String::from_utf8(bytes)
        .map_err(|e| ConfigError(format!("url_hex does not decode to UTF-8: {}", e)))?;
    Ok(url)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    for (name, source) in config.sources.iter_mut() {
        resolve_source(name, source, base_dir)
            .with_context(|| format!("Invalid source '{}'", name))?;
    }

    Ok(config)
}

fn resolve_source(name: &str, source: &mut SourceConfig, base_dir: &Path) -> Result<()> {
    if !is_identifier(name) {
        bail!(ConfigError(format!(
            "source name '{}' must be lowercase letters, digits and '_', starting with a letter",
            name
        )));
    }
    if source.page_size == 0 {
        bail!(ConfigError("page_size must be > 0".to_string()));
    }

    match source.kind {
        SourceKind::Graphql => {
            if source.url.is_none() {
                let masked = source.url_hex.as_deref().ok_or_else(|| {
                    ConfigError("graphql sources need `url` or `url_hex`".to_string())
                })?;
                source.url = Some(decode_hex_url(masked)?);
            }
            if source.query.is_none() {
                let file = source.query_file.as_ref().ok_or_else(|| {
                    ConfigError("graphql sources need `query` or `query_file`".to_string())
                })?;
                let file = base_dir.join(file);
                let template = std::fs::read_to_string(&file).map_err(|e| {
                    ConfigError(format!("cannot read query_file {}: {}", file.display(), e))
                })?;
                source.query = Some(template);
            }
            if source.items_path.trim().is_empty() {
                bail!(ConfigError("items_path must not be empty".to_string()));
            }
            if source.id_path.trim().is_empty() {
                bail!(ConfigError("id_path must not be empty".to_string()));
            }
        }
        SourceKind::Html => {
            let listing = source.listing_url.as_deref().ok_or_else(|| {
                ConfigError("html sources need `listing_url`".to_string())
            })?;
            if !listing.contains("{page}") {
                bail!(ConfigError(
                    "listing_url must contain a {page} placeholder".to_string()
                ));
            }
            let selector = source.link_selector.as_deref().ok_or_else(|| {
                ConfigError("html sources need `link_selector`".to_string())
            })?;
            scraper::Selector::parse(selector).map_err(|e| {
                ConfigError(format!("link_selector '{}' is invalid: {}", selector, e))
            })?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(tmp: &TempDir, body: &str) -> PathBuf {
        let path = tmp.path().join("shelf.toml");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn graphql_source_with_masked_url_and_query_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("q.graphql"), "query Q { items }").unwrap();
        let path = write_config(
            &tmp,
            r#"
[db]
path = "data/shelf.sqlite"

[sources.products]
kind = "graphql"
url_hex = "68747470733a2f2f7368656c662e74657374"
query_file = "q.graphql"
"#,
        );
        let cfg = load_config(&path).unwrap();
        let src = &cfg.sources["products"];
        assert_eq!(src.endpoint().unwrap(), "https://shelf.test");
        assert_eq!(src.query_template().unwrap(), "query Q { items }");
        assert_eq!(src.page_size, 20);
        assert_eq!(src.page_limit(), Some(625));
        assert_eq!(src.store, StoreMode::Raw);
        assert_eq!(src.items_path, "data.productDetail.items");
    }

    #[test]
    fn zero_page_limit_is_unbounded() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[db]
path = "x.sqlite"

[sources.api]
kind = "graphql"
url = "http://localhost/graphql"
query = "{ q }"
page_limit = 0
store = "transformed"
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.sources["api"].page_limit(), None);
        assert_eq!(cfg.sources["api"].store, StoreMode::Transformed);
    }

    #[test]
    fn missing_query_is_a_config_error() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[db]
path = "x.sqlite"

[sources.api]
kind = "graphql"
url = "http://localhost/graphql"
"#,
        );
        let err = load_config(&path).unwrap_err();
        assert!(err.chain().any(|e| e.downcast_ref::<ConfigError>().is_some()));
    }

    #[test]
    fn html_source_requires_page_placeholder() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[db]
path = "x.sqlite"

[sources.pages]
kind = "html"
listing_url = "http://localhost/catalog"
link_selector = "a.product"
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn source_names_must_be_identifiers() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[db]
path = "x.sqlite"

[sources."drop table"]
kind = "graphql"
url = "http://localhost/graphql"
query = "{ q }"
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn example_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/shelf.example.toml");
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.sources.len(), 3);
        assert_eq!(
            cfg.sources["products"].endpoint().unwrap(),
            "https://catalog.example/graphql"
        );
        assert!(cfg.sources["products"]
            .query_template()
            .unwrap()
            .contains("productDetail"));
        assert_eq!(cfg.sources["pages"].page_limit(), None);
    }

    #[test]
    fn bad_hex_is_rejected() {
        assert!(decode_hex_url("zz").is_err());
        assert_eq!(decode_hex_url("68692f").unwrap(), "hi/");
    }
}
