//! Outbound HTTP shared by scrapers and enrichers.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, REFERER};
use reqwest::Client;
use tracing::{debug, warn};

use crate::error::ScrapeError;

/// Identifying user agent for search-page requests
pub const BOT_USER_AGENT: &str = "RepairScoutBot/1.0 (+https://github.com/repair-scout)";

/// Desktop browser user agent for sources that reject bots outright
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

pub const ACCEPT_LANGUAGE_FR: &str = "fr-FR,fr;q=0.9,en;q=0.8";

/// Text-extraction proxy that renders a page as markdown
pub const MIRROR_PREFIX: &str = "https://r.jina.ai/http://";

/// Route `url` through the text-extraction proxy.
pub fn mirror_url(url: &str) -> String {
    let bare = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    format!("{MIRROR_PREFIX}{bare}")
}

/// Thin wrapper over a pooled reqwest client with fixed identity headers.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    user_agent: String,
}

impl HttpFetcher {
    /// Create a fetcher that announces itself with `user_agent`
    pub fn new(user_agent: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE_FR));

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
        })
    }

    /// User agent sent with every request
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn bot() -> Result<Self> {
        Self::new(BOT_USER_AGENT)
    }

    pub fn browser() -> Result<Self> {
        Self::new(BROWSER_USER_AGENT)
    }

    /// GET `url` and return the body, failing on non-2xx.
    pub async fn fetch_text(&self, url: &str, timeout: Duration) -> Result<String, ScrapeError> {
        self.fetch_text_with_referer(url, timeout, None).await
    }

    pub async fn fetch_text_with_referer(
        &self,
        url: &str,
        timeout: Duration,
        referer: Option<&str>,
    ) -> Result<String, ScrapeError> {
        debug!("Fetching URL: {}", url);

        let mut request = self.client.get(url).timeout(timeout);
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }

        let response = request.send().await.map_err(|e| timeout_or_http(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            warn!("{} returned status: {}", url, status);
            return Err(ScrapeError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| timeout_or_http(e, timeout))?;
        debug!("Downloaded {} bytes from {}", body.len(), url);
        Ok(body)
    }

    /// GET `url` and decode a JSON body.
    pub async fn fetch_json(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<serde_json::Value, ScrapeError> {
        let body = self.fetch_text(url, timeout).await?;
        serde_json::from_str(&body).map_err(|e| ScrapeError::parse("json response", e))
    }
}

/// The two client identities in use.
///
/// Search pages get the identifying bot agent. Pages that turn bots away
/// (eBay item pages, AliExpress) get the desktop browser agent.
#[derive(Clone)]
pub struct Fetchers {
    pub bot: HttpFetcher,
    pub browser: HttpFetcher,
}

impl Fetchers {
    pub fn new() -> Result<Self> {
        Ok(Self {
            bot: HttpFetcher::bot()?,
            browser: HttpFetcher::browser()?,
        })
    }
}

fn timeout_or_http(err: reqwest::Error, timeout: Duration) -> ScrapeError {
    if err.is_timeout() {
        ScrapeError::Timeout(timeout)
    } else {
        ScrapeError::Http(err)
    }
}
