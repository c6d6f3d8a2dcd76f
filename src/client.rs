use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use rand::Rng;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tokio::time::sleep;

use crate::error::{EmptyKind, Result, SightingError};
use crate::record::{NewSighting, SearchFilter, SightingRecord, SightingSummary, SightingUpdate};

/// Talks to a sighting API over HTTP.
pub struct SightingClient {
    client: Client,
    base_url: String,
    pub(crate) base_delay: Duration,
    pub(crate) max_retries: u32,
}

/// List and search bodies come back either as records or, from older
/// servers, as summary strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListBody {
    Records(BTreeMap<String, SightingRecord>),
    Summaries(BTreeMap<String, String>),
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    field: Option<String>,
}

/// Field names a server may report on a validation error.
fn known_field(name: Option<&str>) -> &'static str {
    match name {
        Some("species") => "species",
        Some("location") => "location",
        Some("date") => "date",
        Some("time") => "time",
        Some("body") => "body",
        _ => "request",
    }
}

impl SightingClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("wildlife-sightings/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            base_delay: Duration::from_millis(500),
            max_retries: 3,
        })
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.base_delay = Duration::from_millis(delay_ms);
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Exponential backoff with up to one base delay of jitter.
    pub(crate) fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let jitter = if base_ms > 0 {
            rand::rng().random_range(0..base_ms)
        } else {
            0
        };
        Duration::from_millis(2_u64.saturating_pow(attempt).saturating_mul(base_ms) + jitter)
    }

    /// Send a request, retrying connection failures, 429 and 5xx. Anything
    /// else (including domain errors) is returned on the first attempt.
    async fn send(&self, build: impl Fn() -> RequestBuilder) -> Result<Response> {
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let delay = self.backoff_delay(attempt);
                info!(
                    "Retrying request (attempt {}) after {}ms delay",
                    attempt + 1,
                    delay.as_millis()
                );
                sleep(delay).await;
            }

            let can_retry = attempt < self.max_retries;
            match build().send().await {
                Ok(response) if can_retry && is_transient(response.status()) => {
                    warn!("HTTP {} from {}, retrying...", response.status(), response.url());
                }
                Ok(response) => return Ok(response),
                Err(e) if can_retry && (e.is_connect() || e.is_timeout()) => {
                    warn!("Request failed, retrying...: {}", e);
                }
                Err(e) => return Err(e.into()),
            }
            attempt += 1;
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response, id: Option<u64>) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }
        let text = response.text().await?;
        Err(map_error(status.as_u16(), &text, id))
    }

    pub async fn create(&self, sighting: &NewSighting) -> Result<SightingRecord> {
        let url = self.url("/sightings/");
        let response = self.send(|| self.client.post(&url).json(sighting)).await?;
        let record: SightingRecord = Self::decode(response, None).await?;
        info!("Remote recorded sighting {}: {}", record.id, record);
        Ok(record)
    }

    pub async fn list(&self) -> Result<Vec<SightingRecord>> {
        let url = self.url("/sightings/");
        let response = self
            .send(|| self.client.get(&url).query(&[("format", "records")]))
            .await?;
        let body: ListBody = Self::decode(response, None).await?;
        Ok(records_from_body(body)?.into_values().collect())
    }

    pub async fn search(&self, filter: &SearchFilter) -> Result<BTreeMap<u64, SightingRecord>> {
        let url = self.url("/sightings/search/");
        let mut params = vec![("format", "records")];
        if let Some(species) = filter.species.as_deref() {
            params.push(("species", species));
        }
        if let Some(location) = filter.location.as_deref() {
            params.push(("location", location));
        }
        let response = self.send(|| self.client.get(&url).query(&params)).await?;
        let body: ListBody = Self::decode(response, None).await?;
        records_from_body(body)
    }

    /// The API has no single-record endpoint, so this scans the full list.
    pub async fn get(&self, id: u64) -> Result<SightingRecord> {
        match self.list().await {
            Ok(records) => records
                .into_iter()
                .find(|r| r.id == id)
                .ok_or(SightingError::NotFound(id)),
            Err(SightingError::Empty(_)) => Err(SightingError::NotFound(id)),
            Err(e) => Err(e),
        }
    }

    pub async fn update(&self, id: u64, update: &SightingUpdate) -> Result<SightingRecord> {
        let url = self.url(&format!("/sightings/{}", id));
        let response = self.send(|| self.client.put(&url).json(update)).await?;
        Self::decode(response, Some(id)).await
    }

    pub async fn delete(&self, id: u64) -> Result<()> {
        let url = self.url(&format!("/sightings/{}", id));
        let response = self.send(|| self.client.delete(&url)).await?;
        let _: serde_json::Value = Self::decode(response, Some(id)).await?;
        info!("Remote deleted sighting {}", id);
        Ok(())
    }

    /// Create many sightings concurrently, at most `max_concurrent` in flight.
    /// Results come back in input order.
    pub async fn submit_many(
        &self,
        sightings: &[NewSighting],
        max_concurrent: usize,
    ) -> Vec<Result<SightingRecord>> {
        let progress_bar = ProgressBar::new(sightings.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {percent:>3}% ETA: {eta_precise} {msg}")
        {
            progress_bar.set_style(style.progress_chars("##-"));
        }
        progress_bar.set_message("Submitting sightings");

        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let pb = Arc::new(progress_bar);

        let tasks = sightings.iter().map(|sighting| {
            let permit = Arc::clone(&semaphore);
            let progress = Arc::clone(&pb);
            async move {
                let _permit = permit.acquire().await;
                let result = self.create(sighting).await;
                progress.inc(1);
                result
            }
        });

        let results = join_all(tasks).await;
        pb.finish_and_clear();

        let created = results.iter().filter(|r| r.is_ok()).count();
        info!("Submitted {} out of {} sightings", created, sightings.len());
        results
    }
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

// JSON object keys are always strings; ids are parsed here rather than by
// serde because untagged enums buffer keys as strings.
fn parse_id(key: &str) -> Result<u64> {
    key.parse()
        .map_err(|_| SightingError::Corrupt(format!("sighting id {:?}", key)))
}

fn records_from_body(body: ListBody) -> Result<BTreeMap<u64, SightingRecord>> {
    match body {
        ListBody::Records(records) => records
            .into_iter()
            .map(|(key, record)| Ok((parse_id(&key)?, record)))
            .collect(),
        ListBody::Summaries(summaries) => {
            debug!("Decoding {} legacy summaries", summaries.len());
            summaries
                .into_iter()
                .map(|(key, line)| {
                    let id = parse_id(&key)?;
                    Ok((id, line.parse::<SightingSummary>()?.into_record(id)?))
                })
                .collect()
        }
    }
}

/// Rebuild a domain error from an error response. Servers that send a
/// `category` are trusted; older ones are recognized by status and detail.
fn map_error(status: u16, body: &str, id: Option<u64>) -> SightingError {
    let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) else {
        return SightingError::Remote {
            status,
            detail: body.to_string(),
        };
    };
    let detail = parsed.detail;
    let field = known_field(parsed.field.as_deref());
    let empty_kind = if detail == EmptyKind::NoRecords.to_string() {
        EmptyKind::NoRecords
    } else {
        EmptyKind::NoMatches
    };

    match (parsed.category.as_deref(), status) {
        (Some("validation"), _) => SightingError::validation(field, detail),
        (Some("duplicate"), _) => SightingError::Duplicate,
        (Some("not_found"), _) => SightingError::NotFound(id.unwrap_or_default()),
        (Some("empty"), _) => SightingError::Empty(empty_kind),
        (None, 400) if detail == SightingError::Duplicate.to_string() => SightingError::Duplicate,
        (None, 400 | 422) => SightingError::validation(field, detail),
        (None, 404) => match id {
            Some(id) => SightingError::NotFound(id),
            None => SightingError::Empty(empty_kind),
        },
        _ => SightingError::Remote { status, detail },
    }
}
