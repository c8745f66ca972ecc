//! A signed HTTP client for one Intersight domain.

use super::discovery::{self, PhysicalSummaryPage, PAGE_SIZE, PHYSICAL_SUMMARIES_PATH};
use super::query::{self, TelemetryQuery, TIME_SERIES_PATH};
use super::signing::{RequestSigner, SigningInput};
use crate::core::{DomainDescriptor, Sample, ServerId};
use crate::error::{BridgeError, BridgeResult};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, DATE, HOST, USER_AGENT};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

const JSON_CONTENT_TYPE: &str = "application/json";

/// Upper bound on discovery pages, in case the API ignores `$skip`.
const MAX_DISCOVERY_PAGES: usize = 1_000;

/// Transport-level failures, before they are mapped to a `BridgeError`.
#[derive(Error, Debug)]
enum ApiError {
    #[error("request timed out")]
    Timeout,
    #[error("HTTP {0}: {1}")]
    Status(StatusCode, String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

pub struct IntersightClient {
    http: reqwest::Client,
    base_url: Url,
    signer: RequestSigner,
    user_agent: String,
}

impl IntersightClient {
    /// Loads the domain's key and builds a client for its endpoint.
    pub async fn from_descriptor(
        domain: &DomainDescriptor,
        request_timeout: Duration,
    ) -> BridgeResult<Self> {
        let signer = RequestSigner::from_key_material(&domain.key_id, &domain.private_key).await?;
        Self::new(domain.endpoint_url.clone(), signer, request_timeout)
    }

    pub fn new(base_url: Url, signer: RequestSigner, request_timeout: Duration) -> BridgeResult<Self> {
        // Appliances commonly present self-signed certificates.
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(request_timeout)
            .build()
            .map_err(|e| BridgeError::AuthInit(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            signer,
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        })
    }

    /// Queries the average power of `server` over the minute ending at `now`.
    #[instrument(skip(self, now, tz), fields(domain = %self.base_url))]
    pub async fn fetch_power_sample(
        &self,
        server: &ServerId,
        now: DateTime<Utc>,
        tz: Tz,
    ) -> BridgeResult<Sample> {
        let payload = TelemetryQuery::power_of(server, now, tz);
        let body = serde_json::to_vec(&payload)
            .map_err(|e| BridgeError::Upstream(format!("failed to encode query: {}", e)))?;

        let response: serde_json::Value = self
            .call(Method::POST, TIME_SERIES_PATH, &[], body)
            .await
            .map_err(|e| match e {
                ApiError::Timeout => BridgeError::MissingDatum(format!(
                    "telemetry query for server {} timed out",
                    server
                )),
                ApiError::Decode(msg) => BridgeError::MalformedResponse(msg),
                other => BridgeError::Upstream(other.to_string()),
            })?;

        query::parse_power_response(server, &response)
    }

    /// Lists the serials of the domain's monitored servers, page by page.
    #[instrument(skip(self), fields(domain = %self.base_url))]
    pub async fn discover_servers(&self) -> BridgeResult<Vec<ServerId>> {
        self.discover_within(MAX_DISCOVERY_PAGES).await
    }

    async fn discover_within(&self, max_pages: usize) -> BridgeResult<Vec<ServerId>> {
        let mut summaries = Vec::new();
        let mut exhausted = false;
        for page_index in 0..max_pages {
            let skip = page_index * PAGE_SIZE;
            let page: PhysicalSummaryPage = self
                .call(
                    Method::GET,
                    PHYSICAL_SUMMARIES_PATH,
                    &discovery::page_query(skip),
                    Vec::new(),
                )
                .await
                .map_err(|e| BridgeError::Discovery(e.to_string()))?;

            let received = page.results.len();
            summaries.extend(page.results);
            debug!(skip, received, "Fetched physical summaries page");
            if received < PAGE_SIZE {
                exhausted = true;
                break;
            }
        }
        if !exhausted {
            warn!(
                pages = max_pages,
                listed = summaries.len(),
                "Discovery stopped at the page limit; the server list may be incomplete"
            );
        }
        Ok(discovery::select_monitored(&summaries))
    }

    fn endpoint(&self, path: &str, query: &[(&str, String)]) -> Url {
        let mut url = self.base_url.clone();
        let base_path = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{}{}", base_path, path));
        url.set_query(None);
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Vec<u8>,
    ) -> Result<T, ApiError> {
        let url = self.endpoint(path, query);
        let signed = self
            .signer
            .sign(&SigningInput {
                method: method.as_str(),
                url: &url,
                body: &body,
                content_type: JSON_CONTENT_TYPE,
                user_agent: &self.user_agent,
                created: Utc::now(),
            })
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let response = self
            .http
            .request(method, url)
            .header(HOST, signed.host)
            .header(DATE, signed.date)
            .header("Digest", signed.digest)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .header(ACCEPT, JSON_CONTENT_TYPE)
            .header(USER_AGENT, &self.user_agent)
            .header(AUTHORIZATION, signed.authorization)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(ApiError::Status(
                status,
                String::from_utf8_lossy(&bytes).chars().take(512).collect(),
            ));
        }
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }
}
