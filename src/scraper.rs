//! Page loading and the page side of the extraction channel.
//!
//! Uses reqwest for fetching and scraper for HTML parsing.

use crate::extractor;
use crate::protocol::{PageRequest, PageResponse};
use async_trait::async_trait;
use lazy_static::lazy_static;
use reqwest::Client;
use scraper::{Html, Selector};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// User-Agent string identifying this scraper
const USER_AGENT: &str = concat!(
    "precis/",
    env!("CARGO_PKG_VERSION"),
    " (https://github.com/cladam/precis)"
);

/// Default timeout for HTTP requests
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

lazy_static! {
    static ref TITLE: Selector = Selector::parse("title").expect("title selector");
    static ref H1: Selector = Selector::parse("h1").expect("h1 selector");
}

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("failed to fetch URL: {0}")]
    FetchError(#[from] reqwest::Error),
    #[error("failed to read file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
    #[error("page is not loaded: {0}")]
    NotLoaded(String),
    #[error("page state lock poisoned")]
    LockPoisoned,
    #[error("no content found at URL")]
    NoContent,
}

/// Extracted content from a webpage
#[derive(Debug, Clone)]
pub struct WebContent {
    /// The original URL
    pub url: String,
    /// Page title
    pub title: Option<String>,
    /// Main text content
    pub text: String,
}

/// The page side of the extraction channel.
///
/// A page only answers requests once it has been loaded; `load` is the
/// on-demand injection step.
#[async_trait]
pub trait PageChannel: Send + Sync {
    /// URL of the page the user is looking at, if any
    fn active_url(&self) -> Option<String>;

    async fn request(&self, url: &str, request: PageRequest) -> Result<PageResponse, ScraperError>;

    async fn load(&self, url: &str) -> Result<(), ScraperError>;

    /// Title of the loaded page
    fn title(&self) -> Option<String> {
        None
    }
}

struct LoadedPage {
    url: String,
    html: String,
    title: Option<String>,
}

/// A single page given by URL or local path, loaded on demand.
pub struct WebPage {
    url: String,
    client: Client,
    loaded: Mutex<Option<LoadedPage>>,
}

impl WebPage {
    pub fn new(url: impl Into<String>) -> Result<Self, ScraperError> {
        Ok(Self {
            url: url.into(),
            client: create_client()?,
            loaded: Mutex::new(None),
        })
    }
}

#[async_trait]
impl PageChannel for WebPage {
    fn active_url(&self) -> Option<String> {
        Some(self.url.clone())
    }

    async fn request(&self, url: &str, request: PageRequest) -> Result<PageResponse, ScraperError> {
        let guard = self.loaded.lock().map_err(|_| ScraperError::LockPoisoned)?;
        match (request, guard.as_ref()) {
            (PageRequest::ExtractText, Some(page)) if page.url == url => {
                let text = extractor::extract_article_text(&Html::parse_document(&page.html));
                Ok(PageResponse { text })
            }
            _ => Err(ScraperError::NotLoaded(url.to_string())),
        }
    }

    async fn load(&self, url: &str) -> Result<(), ScraperError> {
        let html = load_html(&self.client, url).await?;
        let title = extract_title(&Html::parse_document(&html));
        debug!(url, bytes = html.len(), ?title, "page loaded");
        let mut guard = self.loaded.lock().map_err(|_| ScraperError::LockPoisoned)?;
        *guard = Some(LoadedPage {
            url: url.to_string(),
            html,
            title,
        });
        Ok(())
    }

    fn title(&self) -> Option<String> {
        self.loaded.lock().ok()?.as_ref()?.title.clone()
    }
}

/// Create a configured HTTP client for scraping
fn create_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()
}

/// Read page HTML from http(s), `file://` or a plain filesystem path
async fn load_html(client: &Client, url: &str) -> Result<String, ScraperError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        let response = client.get(url).send().await?.error_for_status()?;
        return Ok(response.text().await?);
    }

    let path = match url.strip_prefix("file://") {
        Some(path) => PathBuf::from(path),
        None if !url.contains("://") => PathBuf::from(url),
        None => {
            let scheme = url.split("://").next().unwrap_or(url);
            return Err(ScraperError::UnsupportedScheme(scheme.to_string()));
        }
    };
    Ok(tokio::fs::read_to_string(path).await?)
}

/// Fetch a page and extract its title and main text
pub async fn fetch_content(url: &str) -> Result<WebContent, ScraperError> {
    let client = create_client()?;
    let html = load_html(&client, url).await?;
    let document = Html::parse_document(&html);

    let title = extract_title(&document);
    let text = extractor::extract_article_text(&document);

    if text.trim().is_empty() {
        return Err(ScraperError::NoContent);
    }

    Ok(WebContent {
        url: url.to_string(),
        title,
        text,
    })
}

/// Extract the page title from <title> or <h1>
pub fn extract_title(document: &Html) -> Option<String> {
    [&*TITLE, &*H1].into_iter().find_map(|selector| {
        let element = document.select(selector).next()?;
        let title = element.text().collect::<Vec<_>>().join(" ");
        let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
        (!title.is_empty()).then_some(title)
    })
}
