//! HTTP page fetchers.
//!
//! Two [`PageFetcher`] implementations, chosen by the source's `kind`:
//!
//! - [`GraphqlFetcher`] POSTs `{ "query", "variables": { "page", "size" } }`
//!   to a JSON endpoint and reads the item list at `items_path`.
//! - [`HtmlListingFetcher`] GETs a listing page, collects product links with
//!   a CSS selector and fetches every product page as a document.
//!
//! Both throttle themselves: consecutive requests are at least `delay_ms`
//! apart. HTML is parsed in plain functions so that no `scraper::Html` lives
//! across an `.await`.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

use shelf_core::error::FetchError;
use shelf_core::extract::{walk, Segment};
use shelf_core::models::RawRecord;
use shelf_core::paginate::PageFetcher;

use crate::config::{SourceConfig, SourceKind};

/// Minimum spacing between consecutive requests.
struct Throttle {
    delay: Duration,
    last: Mutex<Option<Instant>>,
}

impl Throttle {
    fn new(delay_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            last: Mutex::new(None),
        }
    }

    async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            tokio::time::sleep_until(prev + self.delay).await;
        }
        *last = Some(Instant::now());
    }
}

fn http_client(source: &SourceConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(source.timeout_secs))
        .user_agent(concat!("shelf/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create HTTP client")
}

fn transport(url: &str, e: reqwest::Error) -> FetchError {
    FetchError::Transport {
        url: url.to_string(),
        source: Box::new(e),
    }
}

fn check_status(url: &str, resp: &reqwest::Response) -> Result<(), FetchError> {
    let status = resp.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

/// Build the fetcher for a validated source.
pub fn build_fetcher(source: &SourceConfig) -> Result<Box<dyn PageFetcher>> {
    Ok(match source.kind {
        SourceKind::Graphql => Box::new(GraphqlFetcher::from_config(source)?),
        SourceKind::Html => Box::new(HtmlListingFetcher::from_config(source)?),
    })
}

/// Paginated JSON API queried with a GraphQL template.
pub struct GraphqlFetcher {
    client: reqwest::Client,
    url: String,
    query: String,
    items_path: Vec<Segment>,
    throttle: Throttle,
}

impl GraphqlFetcher {
    pub fn from_config(source: &SourceConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(source)?,
            url: source.endpoint()?.to_string(),
            query: source.query_template()?.to_string(),
            items_path: Segment::parse_path(&source.items_path),
            throttle: Throttle::new(source.delay_ms),
        })
    }

    fn request_body(&self, page: u32, size: u32) -> Value {
        json!({
            "query": self.query,
            "variables": { "page": page, "size": size },
        })
    }
}

#[async_trait]
impl PageFetcher for GraphqlFetcher {
    async fn fetch_page(&self, page: u32, size: u32) -> Result<Vec<RawRecord>, FetchError> {
        self.throttle.wait().await;
        debug!(url = %self.url, page, size, "requesting page");

        let resp = self
            .client
            .post(&self.url)
            .json(&self.request_body(page, size))
            .send()
            .await
            .map_err(|e| transport(&self.url, e))?;
        check_status(&self.url, &resp)?;

        let body: Value = resp.json().await.map_err(|e| FetchError::Decode {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;
        items_at(&body, &self.items_path).map_err(|reason| FetchError::Decode {
            url: self.url.clone(),
            reason,
        })
    }
}

/// The item list of a response. A missing list is an error, not an empty
/// page, so an upstream error reply never looks like exhaustion.
fn items_at(body: &Value, path: &[Segment]) -> Result<Vec<RawRecord>, String> {
    match walk(body, path) {
        Value::Array(items) => Ok(items.into_iter().map(RawRecord::Json).collect()),
        other => {
            let path = path
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(".");
            let mut reason = format!("expected a list at '{}', found {}", path, kind_of(&other));
            if let Some(errors) = body.get("errors") {
                reason.push_str(&format!("; errors: {}", errors));
            }
            Err(reason)
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "nothing",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

/// Paginated HTML listing whose entries link to product pages.
pub struct HtmlListingFetcher {
    client: reqwest::Client,
    listing_url: String,
    link_selector: Selector,
    link_attr: String,
    throttle: Throttle,
}

impl HtmlListingFetcher {
    pub fn from_config(source: &SourceConfig) -> Result<Self> {
        let listing_url = source
            .listing_url
            .clone()
            .context("html source has no listing_url")?;
        let css = source
            .link_selector
            .as_deref()
            .context("html source has no link_selector")?;
        let link_selector = Selector::parse(css)
            .map_err(|e| anyhow::anyhow!("invalid link_selector '{}': {}", css, e))?;

        Ok(Self {
            client: http_client(source)?,
            listing_url,
            link_selector,
            link_attr: source.link_attr.clone(),
            throttle: Throttle::new(source.delay_ms),
        })
    }

    pub fn listing_page_url(&self, page: u32) -> String {
        self.listing_url.replace("{page}", &page.to_string())
    }

    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        self.throttle.wait().await;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport(url, e))?;
        check_status(url, &resp)?;
        resp.text().await.map_err(|e| FetchError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl PageFetcher for HtmlListingFetcher {
    /// The listing decides the page size; `size` is not sent.
    async fn fetch_page(&self, page: u32, _size: u32) -> Result<Vec<RawRecord>, FetchError> {
        let listing = self.listing_page_url(page);
        let base = Url::parse(&listing).map_err(|e| FetchError::Decode {
            url: listing.clone(),
            reason: e.to_string(),
        })?;

        let html = self.get_text(&listing).await?;
        let links = extract_links(&html, &base, &self.link_selector, &self.link_attr);
        debug!(url = %listing, page, links = links.len(), "listing parsed");

        let mut documents = Vec::with_capacity(links.len());
        for url in links {
            let html = self.get_text(&url).await?;
            documents.push(RawRecord::Document { url, html });
        }
        Ok(documents)
    }
}

/// Absolute product links in document order, without repeats.
fn extract_links(html: &str, base: &Url, selector: &Selector, attr: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();
    doc.select(selector)
        .filter_map(|el| el.value().attr(attr))
        .filter_map(|href| base.join(href.trim()).ok())
        .map(String::from)
        .filter(|url| seen.insert(url.clone()))
        .collect()
}
