use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::ScrapingConfig;
use crate::error::{Result, ScraperError};
use crate::observability::metrics;
use crate::pipeline::ingestion::parser::parse_page_data;
use crate::pipeline::processing::enrich::CategoryMapping;
use crate::pipeline::storage::Snapshot;

const USER_AGENT: &str = concat!("factbook_scraper/", env!("CARGO_PKG_VERSION"));

/// Upper bound on a single retry wait
const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

/// File name of the run report inside a snapshot's `analysis/`
pub const SCRAPE_REPORT_FILE: &str = "scrape_report.json";

/// Source of parsed JSON documents. Tests swap in an in-memory map.
pub trait PageFetcher {
    fn fetch_json(&self, url: &str) -> Result<Value>;
}

/// `{base_url}/page-data/countries/{slug}/page-data.json`
pub fn country_page_url(base_url: &str, slug: &str) -> String {
    format!(
        "{}/page-data/countries/{}/page-data.json",
        base_url.trim_end_matches('/'),
        slug
    )
}

/// Wait before retry number `attempt` (1-based): `base * 2^(attempt - 1)`,
/// capped at [`MAX_RETRY_DELAY`].
pub fn retry_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.checked_pow(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    base.checked_mul(factor)
        .unwrap_or(MAX_RETRY_DELAY)
        .min(MAX_RETRY_DELAY)
}

/// Blocking HTTP fetcher with exponential-backoff retries and a pause between requests
pub struct HttpPageFetcher {
    client: Client,
    retry_attempts: u32,
    retry_delay: Duration,
    rate_limit_delay: Duration,
}

impl HttpPageFetcher {
    pub fn new(config: &ScrapingConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout())
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            retry_attempts: config.retry_attempts,
            retry_delay: config.retry_delay(),
            rate_limit_delay: config.rate_limit_delay(),
        })
    }

    fn backoff(&self, url: &str, attempt: u32, reason: &str) {
        let delay = retry_delay(self.retry_delay, attempt);
        warn!(
            url,
            attempt,
            max_retries = self.retry_attempts,
            delay_ms = delay.as_millis() as u64,
            reason,
            "Request failed, retrying"
        );
        metrics::fetch::retry();
        thread::sleep(delay);
    }
}

/// Server errors and throttling are worth another try; other statuses are not.
fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

impl PageFetcher for HttpPageFetcher {
    fn fetch_json(&self, url: &str) -> Result<Value> {
        let mut attempt = 0;
        loop {
            let start = Instant::now();
            debug!(url, attempt, "Fetching");

            let response = match self.client.get(url).send() {
                Ok(response) => response,
                Err(e) if attempt < self.retry_attempts => {
                    self.backoff(url, attempt + 1, &e.to_string());
                    attempt += 1;
                    continue;
                }
                Err(e) => {
                    metrics::fetch::request_error();
                    return Err(e.into());
                }
            };

            let status = response.status();
            if !status.is_success() {
                if is_retryable(status) && attempt < self.retry_attempts {
                    self.backoff(url, attempt + 1, status.as_str());
                    attempt += 1;
                    continue;
                }
                metrics::fetch::request_error();
                return Err(ScraperError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            let body = response.text().map_err(|e| {
                metrics::fetch::request_error();
                e
            })?;
            metrics::fetch::request_duration(start.elapsed().as_secs_f64());
            metrics::fetch::payload_bytes(body.len());

            let value = serde_json::from_str::<Value>(&body).map_err(|e| {
                metrics::fetch::request_error();
                e
            })?;
            metrics::fetch::request_success();
            info!(url, bytes = body.len(), "Fetched");

            thread::sleep(self.rate_limit_delay);
            return Ok(value);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeStatus {
    Success,
    Failed,
}

/// One country's line in the run report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryScrape {
    pub country_slug: String,
    pub timestamp: DateTime<Utc>,
    pub status: ScrapeStatus,
    pub duration_seconds: f64,
    pub source_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a scrape run, saved as `analysis/scrape_report.json`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrapeReport {
    pub snapshot: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub requested: usize,
    pub saved: Vec<String>,
    pub failed: Vec<String>,
    /// Share of requested countries that were saved, 0..=1
    pub success_rate: f64,
    pub total_fields_scraped: usize,
    pub countries: Vec<CountryScrape>,
}

impl ScrapeReport {
    fn start(snapshot: &str) -> Self {
        let now = Utc::now();
        Self {
            snapshot: snapshot.to_string(),
            started_at: now,
            finished_at: now,
            duration_seconds: 0.0,
            requested: 0,
            saved: Vec::new(),
            failed: Vec::new(),
            success_rate: 0.0,
            total_fields_scraped: 0,
            countries: Vec::new(),
        }
    }

    fn finish(&mut self) {
        self.finished_at = Utc::now();
        self.duration_seconds = seconds_between(self.started_at, self.finished_at);
        self.success_rate = if self.requested == 0 {
            0.0
        } else {
            self.saved.len() as f64 / self.requested as f64
        };
    }
}

fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 1000.0
}

/// Fetch, parse and store each country, then write the run report into the
/// snapshot. A failing country is logged and listed in the report; the others
/// still run.
pub fn scrape_countries<F: PageFetcher + ?Sized>(
    fetcher: &F,
    base_url: &str,
    slugs: &[String],
    snapshot: &Snapshot,
) -> ScrapeReport {
    let mut report = ScrapeReport::start(snapshot.name());

    for slug in slugs.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        report.requested += 1;
        let url = country_page_url(base_url, slug);
        let started = Utc::now();

        let outcome = fetcher
            .fetch_json(&url)
            .and_then(|page| parse_page_data(slug, &page, Some(url.as_str())))
            .and_then(|record| {
                let path = snapshot.save_raw(&record)?;
                Ok((path, record.fields.len()))
            });

        let mut entry = CountryScrape {
            country_slug: slug.to_string(),
            timestamp: started,
            status: ScrapeStatus::Success,
            duration_seconds: seconds_between(started, Utc::now()),
            source_url: url,
            fields_count: None,
            error: None,
        };
        match outcome {
            Ok((path, fields)) => {
                debug!(slug, path = %path.display(), fields, "Stored raw record");
                report.saved.push(slug.to_string());
                report.total_fields_scraped += fields;
                entry.fields_count = Some(fields);
            }
            Err(e) => {
                error!(slug, error = %e, "Failed to scrape country");
                report.failed.push(slug.to_string());
                entry.status = ScrapeStatus::Failed;
                entry.error = Some(e.to_string());
            }
        }
        report.countries.push(entry);
    }

    report.finish();
    if let Err(e) = snapshot.save_analysis(SCRAPE_REPORT_FILE, &report) {
        error!(snapshot = snapshot.name(), error = %e, "Failed to save scrape report");
    }

    info!(
        requested = report.requested,
        saved = report.saved.len(),
        failed = report.failed.len(),
        snapshot = snapshot.name(),
        "Scrape finished"
    );
    report
}

/// Fetch the category JSON and extract the id → category table.
/// Returns the mapping and its number of categories.
pub fn fetch_category_mapping<F: PageFetcher + ?Sized>(
    fetcher: &F,
    url: &str,
) -> Result<(CategoryMapping, usize)> {
    let payload = fetcher.fetch_json(url)?;
    let (mapping, categories) = CategoryMapping::from_category_json(&payload);
    info!(url, fields = mapping.len(), categories, "Extracted category mapping");
    Ok((mapping, categories))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_country_page_url() {
        assert_eq!(
            country_page_url("https://www.cia.gov/the-world-factbook/", "france"),
            "https://www.cia.gov/the-world-factbook/page-data/countries/france/page-data.json"
        );
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
        assert!(!is_retryable(StatusCode::FORBIDDEN));
    }

    #[test]
    fn test_retry_delay_doubles_per_attempt() {
        let base = Duration::from_secs(2);
        assert_eq!(retry_delay(base, 1), Duration::from_secs(2));
        assert_eq!(retry_delay(base, 2), Duration::from_secs(4));
        assert_eq!(retry_delay(base, 3), Duration::from_secs(8));
        assert_eq!(retry_delay(Duration::ZERO, 5), Duration::ZERO);
    }

    #[test]
    fn test_retry_delay_is_capped() {
        let base = Duration::from_secs(2);
        assert_eq!(retry_delay(base, 20), MAX_RETRY_DELAY);
        assert_eq!(retry_delay(base, u32::MAX), MAX_RETRY_DELAY);
        assert_eq!(retry_delay(Duration::MAX, 2), MAX_RETRY_DELAY);
    }

    #[test]
    fn test_client_builds_from_config() {
        assert!(HttpPageFetcher::new(&ScrapingConfig::default()).is_ok());
    }
}
