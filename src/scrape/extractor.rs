//! Content Extractors
//!
//! The primary extractor fetches pages directly and strips them to text
//! with an HTML parser. The fallback is a JS-capable remote extraction
//! API used when the primary yields low-quality content (client-rendered
//! pages, aggressive markup).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::types::{ErrorClassifier, FathomError, Result};

/// Raw extraction result before quality scoring.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub content: String,
    pub mime: String,
    pub fetched_at: DateTime<Utc>,
    pub publish_date: Option<DateTime<Utc>>,
}

/// Content extraction interface.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, url: &str, timeout: Duration) -> Result<Extraction>;

    /// Extractor name for logging and error records
    fn name(&self) -> &str;
}

// =============================================================================
// Primary: direct fetch + HTML parsing
// =============================================================================

/// Direct HTTP fetch with HTML-to-text extraction.
pub struct HttpExtractor {
    client: reqwest::Client,
}

impl HttpExtractor {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("fathom-research/0.1")
            .build()
            .map_err(FathomError::Http)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Extractor for HttpExtractor {
    async fn extract(&self, url: &str, timeout: Duration) -> Result<Extraction> {
        debug!(url, "fetching page");

        let response = tokio::time::timeout(timeout, self.client.get(url).send())
            .await
            .map_err(|_| FathomError::timeout(format!("fetch {}", url), timeout))??;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(ErrorClassifier::classify_http_status(
                status,
                &format!("fetch failed for {}", url),
                "http-extractor",
            )
            .into());
        }

        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .split(';')
            .next()
            .unwrap_or("text/html")
            .to_string();

        let body = response.text().await?;

        let (content, publish_date) = if mime.contains("html") {
            html_to_text(&body)
        } else {
            (body, None)
        };

        Ok(Extraction {
            content,
            mime,
            fetched_at: Utc::now(),
            publish_date,
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Strip an HTML document to readable text and pull the publish date
/// from standard meta tags.
fn html_to_text(html: &str) -> (String, Option<DateTime<Utc>>) {
    let document = Html::parse_document(html);

    let publish_date = extract_publish_date(&document);

    // Prefer article/main containers; fall back to body
    let text = ["article", "main", "body"]
        .iter()
        .find_map(|tag| {
            let selector = Selector::parse(tag).ok()?;
            let element = document.select(&selector).next()?;
            let text = collect_text(element);
            (!text.trim().is_empty()).then_some(text)
        })
        .unwrap_or_default();

    (text, publish_date)
}

fn collect_text(element: scraper::ElementRef<'_>) -> String {
    const SKIP: &[&str] = &["script", "style", "nav", "header", "footer", "noscript"];

    let mut out = String::new();
    for node in element.descendants() {
        if let Some(text) = node.value().as_text() {
            let in_skipped = node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .map(|e| SKIP.contains(&e.name()))
                    .unwrap_or(false)
            });
            if !in_skipped {
                out.push_str(text);
                out.push(' ');
            }
        }
    }
    out
}

fn extract_publish_date(document: &Html) -> Option<DateTime<Utc>> {
    const META_SELECTORS: &[&str] = &[
        r#"meta[property="article:published_time"]"#,
        r#"meta[name="date"]"#,
        r#"meta[name="publish-date"]"#,
        "time[datetime]",
    ];

    for raw in META_SELECTORS {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        let Some(element) = document.select(&selector).next() else {
            continue;
        };
        let Some(value) = element
            .value()
            .attr("content")
            .or_else(|| element.value().attr("datetime"))
        else {
            continue;
        };
        if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
            return Some(parsed.with_timezone(&Utc));
        }
    }
    None
}

// =============================================================================
// Fallback: JS-capable remote extraction API
// =============================================================================

const EXTRACT_API_BASE: &str = "https://api.tavily.com";

/// Remote extraction API that renders JavaScript before extracting.
pub struct RenderExtractor {
    api_key: SecretString,
    api_base: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for RenderExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderExtractor")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl RenderExtractor {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let api_key_str = api_key
            .or_else(|| std::env::var("TAVILY_API_KEY").ok())
            .ok_or_else(|| {
                FathomError::Config(
                    "extraction API key not found. Set TAVILY_API_KEY or provide in config"
                        .to_string(),
                )
            })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FathomError::Http)?;

        Ok(Self {
            api_key: SecretString::from(api_key_str),
            api_base: EXTRACT_API_BASE.to_string(),
            client,
        })
    }
}

#[async_trait]
impl Extractor for RenderExtractor {
    async fn extract(&self, url: &str, timeout: Duration) -> Result<Extraction> {
        debug!(url, "remote extraction");

        let body = ExtractRequest {
            api_key: self.api_key.expose_secret().to_string(),
            urls: vec![url.to_string()],
        };

        let response = tokio::time::timeout(
            timeout,
            self.client
                .post(format!("{}/extract", self.api_base))
                .json(&body)
                .send(),
        )
        .await
        .map_err(|_| FathomError::timeout(format!("extract {}", url), timeout))??;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(
                ErrorClassifier::classify_http_status(status, &text, "render-extractor").into(),
            );
        }

        let parsed: ExtractResponse = response.json().await?;
        let content = parsed
            .results
            .into_iter()
            .next()
            .map(|r| r.raw_content)
            .ok_or_else(|| FathomError::scrape_failed(url, "extraction API returned no results"))?;

        Ok(Extraction {
            content,
            mime: "text/plain".to_string(),
            fetched_at: Utc::now(),
            publish_date: None,
        })
    }

    fn name(&self) -> &str {
        "render"
    }
}

#[derive(Debug, Serialize)]
struct ExtractRequest {
    api_key: String,
    urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    results: Vec<ExtractHit>,
}

#[derive(Debug, Deserialize)]
struct ExtractHit {
    raw_content: String,
}
