//! Scraper
//!
//! Turns search results into quality-scored page content. Each URL goes
//! through the primary extractor; when the yield scores below the
//! fallback threshold the JS-capable extractor gets a second attempt and
//! the better result wins. Pages below `quality_reject` are dropped,
//! pages in the flagged band are retained but marked for downstream
//! filtering. Failures after retries are recorded, never fatal.
//!
//! Scrapes within a subtopic may finish out of order; output is sorted
//! by `(subtopic_id, -quality_score, url)` so downstream behavior stays
//! deterministic.

pub mod extractor;

pub use extractor::{Extraction, Extractor, HttpExtractor, RenderExtractor};

use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use regex::Regex;
use std::sync::LazyLock;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::constants::scrape as scrape_constants;
use crate::state::{RunError, ScrapedPage, SearchResult};

/// Scraper tuning.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub quality_reject: f64,
    pub quality_accept: f64,
    pub fallback_threshold: f64,
    pub max_concurrent: usize,
    pub timeout: Duration,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            quality_reject: scrape_constants::QUALITY_REJECT,
            quality_accept: scrape_constants::QUALITY_ACCEPT,
            fallback_threshold: scrape_constants::FALLBACK_THRESHOLD,
            max_concurrent: scrape_constants::MAX_CONCURRENT,
            timeout: Duration::from_secs(scrape_constants::TIMEOUT_SECS),
        }
    }
}

/// Outcome of scraping one batch of search results.
#[derive(Debug, Default)]
pub struct ScrapeOutcome {
    /// Retained pages, sorted `(subtopic_id, -quality_score, url)`
    pub pages: Vec<ScrapedPage>,
    /// URLs that failed after retries
    pub errors: Vec<RunError>,
}

/// Bounded-concurrency scraper with quality scoring and fallback.
pub struct Scraper {
    primary: Arc<dyn Extractor>,
    fallback: Option<Arc<dyn Extractor>>,
    config: ScrapeConfig,
    semaphore: Arc<Semaphore>,
}

impl Scraper {
    pub fn new(
        primary: Arc<dyn Extractor>,
        fallback: Option<Arc<dyn Extractor>>,
        config: ScrapeConfig,
    ) -> Self {
        let permits = config.max_concurrent.max(1);
        Self {
            primary,
            fallback,
            config,
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Scrape every result in the batch.
    pub async fn scrape(&self, results: &[SearchResult]) -> ScrapeOutcome {
        let mut outcome = ScrapeOutcome::default();

        let mut tasks = FuturesUnordered::new();
        for result in results {
            let semaphore = Arc::clone(&self.semaphore);
            tasks.push(async move {
                let _permit = semaphore.acquire().await;
                let page = self.scrape_one(result).await;
                (result, page)
            });
        }

        while let Some((result, scraped)) = tasks.next().await {
            match scraped {
                Ok(Some(page)) => outcome.pages.push(page),
                Ok(None) => {
                    debug!(url = %result.url, "page dropped below quality floor");
                }
                Err(err) => {
                    warn!(url = %result.url, error = %err, "scrape failed");
                    outcome.errors.push(
                        RunError::new("scrape", err.to_string())
                            .subtopic(&result.subtopic_id)
                            .url(&result.url),
                    );
                }
            }
        }

        outcome.pages.sort_by(|a, b| {
            a.subtopic_id
                .cmp(&b.subtopic_id)
                .then_with(|| {
                    b.quality_score
                        .partial_cmp(&a.quality_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.url.cmp(&b.url))
        });

        info!(
            pages = outcome.pages.len(),
            errors = outcome.errors.len(),
            "scrape batch complete"
        );
        outcome
    }

    /// Extract one URL. `Ok(None)` means the page scored below the
    /// rejection floor on every extractor.
    async fn scrape_one(&self, result: &SearchResult) -> crate::types::Result<Option<ScrapedPage>> {
        let primary = self.extract_with_retry(&self.primary, &result.url).await?;
        let mut best = ScoredExtraction::score(primary);

        if best.quality < self.config.fallback_threshold
            && let Some(fallback) = &self.fallback
        {
            debug!(url = %result.url, quality = best.quality, "trying JS-capable fallback");
            match self.extract_with_retry(fallback, &result.url).await {
                Ok(extraction) => {
                    let rescored = ScoredExtraction::score(extraction);
                    if rescored.quality > best.quality {
                        best = rescored;
                    }
                }
                Err(err) => {
                    warn!(url = %result.url, error = %err, "fallback extractor failed");
                }
            }
        }

        if best.quality < self.config.quality_reject {
            return Ok(None);
        }

        let flagged = best.quality < self.config.quality_accept;
        Ok(Some(ScrapedPage {
            url: result.url.clone(),
            word_count: best.word_count,
            content: Some(best.content),
            quality_score: best.quality,
            subtopic_id: result.subtopic_id.clone(),
            flagged,
        }))
    }

    async fn extract_with_retry(
        &self,
        extractor: &Arc<dyn Extractor>,
        url: &str,
    ) -> crate::types::Result<Extraction> {
        let attempt = || async { extractor.extract(url, self.config.timeout).await };

        attempt
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_secs(1))
                    .with_max_delay(Duration::from_secs(30))
                    .with_jitter()
                    .with_max_times(2),
            )
            .when(|err| err.is_recoverable())
            .await
    }
}

// =============================================================================
// Quality Scoring
// =============================================================================

struct ScoredExtraction {
    content: String,
    word_count: usize,
    quality: f64,
}

impl ScoredExtraction {
    fn score(extraction: Extraction) -> Self {
        let content = sanitize(&extraction.content);
        let word_count = content.split_whitespace().count();
        let quality = quality_score(&content, word_count, extraction.publish_date);
        Self {
            content,
            word_count,
            quality,
        }
    }
}

/// Combine length, boilerplate ratio, freshness, and paywall detection
/// into a single score in [0,1].
fn quality_score(content: &str, word_count: usize, publish_date: Option<DateTime<Utc>>) -> f64 {
    // Below the word floor nothing else can rescue the page
    if word_count < scrape_constants::MIN_WORDS {
        return (word_count as f64 / scrape_constants::MIN_WORDS as f64) * 0.2;
    }

    let length = length_score(word_count);
    let substance = 1.0 - boilerplate_ratio(content);
    let freshness = freshness_score(publish_date);
    let paywall_free = if looks_paywalled(content) { 0.0 } else { 1.0 };

    (0.45 * length + 0.25 * substance + 0.15 * freshness + 0.15 * paywall_free).clamp(0.0, 1.0)
}

fn length_score(word_count: usize) -> f64 {
    if word_count <= scrape_constants::MIN_WORDS {
        return 0.0;
    }
    let span = (scrape_constants::FULL_WORDS - scrape_constants::MIN_WORDS) as f64;
    (((word_count - scrape_constants::MIN_WORDS) as f64) / span).min(1.0)
}

/// Fraction of lines that look like navigation or chrome rather than prose.
fn boilerplate_ratio(content: &str) -> f64 {
    let lines: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return 1.0;
    }
    let short = lines
        .iter()
        .filter(|l| l.split_whitespace().count() < 4)
        .count();
    short as f64 / lines.len() as f64
}

fn freshness_score(publish_date: Option<DateTime<Utc>>) -> f64 {
    let Some(date) = publish_date else {
        // Unknown age is neutral, not penalized
        return 0.5;
    };
    let age_days = (Utc::now() - date).num_days().max(0) as f64;
    if age_days <= 365.0 {
        1.0
    } else {
        // Linear decay to 0.2 over five years
        (1.0 - (age_days - 365.0) / (4.0 * 365.0) * 0.8).max(0.2)
    }
}

const PAYWALL_MARKERS: &[&str] = &[
    "subscribe to continue",
    "subscribe to read",
    "sign in to read",
    "this article is for subscribers",
    "create a free account to continue",
];

fn looks_paywalled(content: &str) -> bool {
    let lower = content.to_lowercase();
    PAYWALL_MARKERS.iter().any(|marker| lower.contains(marker))
}

static CONTROL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x08\x0b\x0c\x0e-\x1f\x7f]").expect("valid regex"));
static EXCESS_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));
static EXCESS_SPACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("valid regex"));

/// Strip control characters and collapse excessive whitespace.
pub fn sanitize(content: &str) -> String {
    let no_controls = CONTROL_CHARS.replace_all(content, "");
    let no_blanks = EXCESS_BLANK_LINES.replace_all(&no_controls, "\n\n");
    EXCESS_SPACES.replace_all(&no_blanks, " ").trim().to_string()
}
