use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::time::sleep;
use url::Url;

use snapshot_core::error::AppError;
use snapshot_core::{
    Endpoint, HarvestMode, HarvestSession, HttpConfig, SessionFactory, SessionOptions,
};

use crate::xml::{clean_xml, oai_error, resumption_token};

const USER_AGENT: &str = "oai-snapshot/0.1 (metadata-harvester)";

/// Name of the per-endpoint file remembering the last successful harvest.
const STATE_FILE: &str = "state.json";

/// What a session remembers between runs for one endpoint and format.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
struct HarvestState {
    last_harvest: NaiveDate,
}

/// Creates [`OaiSession`]s that share one HTTP client.
///
/// # Examples
///
/// ```no_run
/// use snapshot_client::OaiSessionFactory;
/// use snapshot_core::{Endpoint, HttpConfig, SessionFactory, HarvestSession};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let factory = OaiSessionFactory::new("/tmp/harvest", &HttpConfig::default())?;
/// let mut session = factory.create(&Endpoint::from("http://export.arxiv.org/oai2")).await?;
/// session.run().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct OaiSessionFactory {
    transport: Transport,
    base_dir: PathBuf,
}

impl OaiSessionFactory {
    /// Creates a factory that stores harvested pages below `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ClientError` if the HTTP client cannot be built.
    pub fn new(base_dir: impl Into<PathBuf>, http: &HttpConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(http.timeout)
            .build()
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        Ok(Self {
            transport: Transport {
                client,
                http: http.clone(),
            },
            base_dir: base_dir.into(),
        })
    }
}

#[async_trait]
impl SessionFactory for OaiSessionFactory {
    type Session = OaiSession;

    /// Validates the endpoint address and checks it answers `Identify`.
    async fn create(&self, endpoint: &Endpoint) -> Result<OaiSession, AppError> {
        let base_url = parse_endpoint(endpoint)?;

        let mut identify = base_url.clone();
        identify.query_pairs_mut().append_pair("verb", "Identify");
        let body = self.transport.get_text(&identify).await?;
        if let Some(err) = oai_error(&clean_xml(&body)) {
            return Err(AppError::Protocol {
                code: err.code,
                message: err.message,
            });
        }

        Ok(OaiSession::new(
            self.transport.clone(),
            base_url,
            self.base_dir.clone(),
        ))
    }
}

/// One harvest of one OAI-PMH endpoint.
///
/// Pages of `ListRecords` responses are written verbatim to a directory
/// derived from the endpoint and the metadata format.
pub struct OaiSession {
    transport: Transport,
    base_url: Url,
    base_dir: PathBuf,
    options: SessionOptions,
}

impl OaiSession {
    fn new(transport: Transport, base_url: Url, base_dir: PathBuf) -> Self {
        Self {
            transport,
            base_url,
            base_dir,
            options: SessionOptions::default(),
        }
    }

    /// Directory holding pages and state for this endpoint and format.
    pub fn harvest_dir(&self) -> PathBuf {
        let key = format!("{}#{}", self.options.format, self.base_url);
        let digest = Sha256::digest(key.as_bytes());
        self.base_dir.join(format!("{:x}", digest))
    }

    fn list_records_url(&self, from: Option<NaiveDate>, token: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("verb", "ListRecords");
            match token {
                Some(token) => {
                    query.append_pair("resumptionToken", token);
                }
                None => {
                    query.append_pair("metadataPrefix", &self.options.format);
                    if let Some(from) = from {
                        query.append_pair("from", &from.format("%Y-%m-%d").to_string());
                    }
                }
            }
        }
        url
    }

    /// Works out the `from` date for this run.
    ///
    /// Returns `AppError::AlreadySynced` when a selective run finds a harvest
    /// from today.
    async fn harvest_from(
        &self,
        dir: &Path,
        today: NaiveDate,
    ) -> Result<Option<NaiveDate>, AppError> {
        if self.options.mode == HarvestMode::Full {
            return Ok(None);
        }
        match read_state(dir).await? {
            Some(state) if state.last_harvest >= today => Err(AppError::AlreadySynced),
            Some(state) => Ok(Some(state.last_harvest)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl HarvestSession for OaiSession {
    fn options_mut(&mut self) -> &mut SessionOptions {
        &mut self.options
    }

    async fn run(&mut self) -> Result<(), AppError> {
        let dir = self.harvest_dir();
        tokio::fs::create_dir_all(&dir).await?;

        let today = Utc::now().date_naive();
        let from = self.harvest_from(&dir, today).await?;

        tracing::debug!(
            endpoint = %self.base_url,
            mode = %self.options.mode,
            from = ?from,
            dir = %dir.display(),
            "Starting harvest"
        );

        let mut token: Option<String> = None;
        let mut pages = 0usize;
        loop {
            if pages >= self.options.max_requests {
                tracing::warn!(
                    endpoint = %self.base_url,
                    max_requests = self.options.max_requests,
                    "Request limit reached, stopping harvest"
                );
                break;
            }

            let url = self.list_records_url(from, token.as_deref());
            let mut body = self.transport.get_text(&url).await?;
            pages += 1;

            if self.options.clean_before_decode {
                body = clean_xml(&body);
            }

            if let Some(err) = oai_error(&body) {
                if err.is_no_records_match() {
                    tracing::debug!(endpoint = %self.base_url, "No records match");
                    break;
                }
                return Err(AppError::Protocol {
                    code: err.code,
                    message: err.message,
                });
            }

            let page_file = dir.join(format!("{}-{:08}.xml", today, pages));
            tokio::fs::write(&page_file, &body).await?;

            token = resumption_token(&body);
            if token.is_none() {
                break;
            }
        }

        write_state(&dir, &HarvestState { last_harvest: today }).await?;
        tracing::debug!(endpoint = %self.base_url, pages, "Harvest finished");
        Ok(())
    }
}

/// Parses an endpoint identifier into an HTTP(S) base URL.
fn parse_endpoint(endpoint: &Endpoint) -> Result<Url, AppError> {
    let url = Url::parse(endpoint.as_str())
        .map_err(|_| AppError::InvalidEndpoint(endpoint.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(AppError::InvalidEndpoint(endpoint.to_string())),
    }
}

async fn read_state(dir: &Path) -> Result<Option<HarvestState>, AppError> {
    match tokio::fs::read(dir.join(STATE_FILE)).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_state(dir: &Path, state: &HarvestState) -> Result<(), AppError> {
    let json = serde_json::to_vec_pretty(state)?;
    tokio::fs::write(dir.join(STATE_FILE), json).await?;
    Ok(())
}

/// HTTP GET with retries, shared by the factory and its sessions.
#[derive(Clone)]
struct Transport {
    client: Client,
    http: HttpConfig,
}

impl Transport {
    async fn get_text(&self, url: &Url) -> Result<String, AppError> {
        let resp = self.request_with_retry(url).await?;
        resp.text()
            .await
            .map_err(|e| AppError::ClientError(e.to_string()))
    }

    /// Makes an HTTP GET request with automatic retry on transient failures.
    ///
    /// Whatever [`AppError::is_retryable`] accepts is retried: network
    /// errors, timeouts, server errors (5xx) and rate limiting (429, with
    /// exponential backoff).
    async fn request_with_retry(&self, url: &Url) -> Result<reqwest::Response, AppError> {
        let max_retries = self.http.max_retries.max(1);
        let base_delay = self.http.retry_base_delay;
        let mut last_error = AppError::Generic("No attempts made".to_string());

        for attempt in 1..=max_retries {
            last_error = match self.client.get(url.clone()).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => self.status_error(resp.status(), url),
                Err(e) => self.transport_error(e),
            };

            if attempt == max_retries || !last_error.is_retryable() {
                break;
            }

            let delay = match last_error {
                AppError::RateLimitExceeded => base_delay * 2_u32.pow(attempt),
                _ => base_delay * attempt,
            };
            tracing::debug!(
                url = %url,
                attempt,
                error = %last_error,
                "Retrying request"
            );
            sleep(delay).await;
        }

        Err(last_error)
    }

    fn status_error(&self, status: StatusCode, url: &Url) -> AppError {
        if status == StatusCode::TOO_MANY_REQUESTS {
            AppError::RateLimitExceeded
        } else if status.is_server_error() {
            AppError::ServerError(status.as_u16())
        } else {
            AppError::ClientError(format!("HTTP {} from {}", status.as_u16(), url))
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Timeout(self.http.timeout.as_secs())
        } else if e.is_connect() {
            AppError::NetworkError(format!("Connection failed: {}", e))
        } else {
            AppError::ClientError(e.to_string())
        }
    }
}
