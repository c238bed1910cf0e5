use crate::config::{ConnectionConfig, ImportConfig};
use crate::metrics_defs::{SAP_FETCH_FALLBACK, SAP_FETCH_PAGES};
use crate::synthetic::SyntheticGenerator;
use crate::types::{Fetched, RecordOrigin, Segmentation};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use shared::{counter, histogram};
use tokio::time::{Duration, sleep};

// The probe only checks that the endpoint answers and accepts our credentials.
const PROBE_LIMIT: u32 = 1;

// Upstream fields may be null or missing, those map to the zero value.
#[derive(Deserialize)]
struct SapItem {
    address_sap_id: Option<String>,
    adr_segment: Option<String>,
    segment_id: Option<i64>,
}

impl From<SapItem> for Segmentation {
    fn from(item: SapItem) -> Self {
        Segmentation::new(
            item.address_sap_id.unwrap_or_default(),
            item.adr_segment.unwrap_or_default(),
            item.segment_id.unwrap_or_default(),
        )
    }
}

#[derive(Deserialize)]
struct SapPage {
    #[serde(default)]
    items: Option<Vec<SapItem>>,
}

#[derive(thiserror::Error, Debug)]
pub enum SapError {
    #[error("could not build SAP request: {0}")]
    RequestConstructionFailed(String),
    #[error("error connecting to SAP API: {0}")]
    TransportFailed(reqwest::Error),
    #[error("error response from SAP API: status={status}, body={body}")]
    UpstreamStatus { status: StatusCode, body: String },
    #[error("could not decode SAP response: {0}")]
    ResponseDecodeFailed(#[from] serde_json::Error),
}

/// Produces the full current set of segmentation records.
#[async_trait]
pub trait SegmentationSource: Send + Sync {
    async fn fetch(&self) -> Result<Fetched, SapError>;
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum FallbackReason {
    Configured,
    Unauthorized,
}

/// Progress of a single fetch. Errors leave the loop through `?`.
enum FetchState {
    Probing,
    Paginating {
        offset: u64,
        records: Vec<Segmentation>,
        pages: u64,
    },
    SyntheticFallback(FallbackReason),
    Done {
        records: Vec<Segmentation>,
        pages: u64,
    },
}

enum PageResponse {
    Body(Bytes),
    Unauthorized,
}

pub struct SapClient {
    client: reqwest::Client,
    url: Url,
    auth_header: HeaderValue,
    batch_size: u32,
    interval: Duration,
    use_test_data: bool,
    synthetic: SyntheticGenerator,
}

impl SapClient {
    pub fn new(connection: &ConnectionConfig, import: &ImportConfig) -> Result<Self, SapError> {
        let credential = STANDARD.encode(connection.credential.as_bytes());
        let mut auth_header = HeaderValue::from_str(&format!("Basic {credential}"))
            .map_err(|e| SapError::RequestConstructionFailed(e.to_string()))?;
        auth_header.set_sensitive(true);

        let client = reqwest::Client::builder()
            .timeout(connection.timeout)
            .user_agent(connection.user_agent.as_str())
            .build()
            .map_err(|e| SapError::RequestConstructionFailed(e.to_string()))?;

        Ok(SapClient {
            client,
            url: connection.url.clone(),
            auth_header,
            batch_size: import.batch_size,
            interval: connection.interval,
            use_test_data: import.use_test_data,
            synthetic: SyntheticGenerator::from_config(&import.synthetic),
        })
    }

    /// Replace the generator used for the synthetic fallback.
    pub fn with_generator(mut self, generator: SyntheticGenerator) -> Self {
        self.synthetic = generator;
        self
    }

    async fn probe(&self) -> Result<FetchState, SapError> {
        tracing::info!(url = %self.url, "testing connection to SAP API");

        // Only an explicit 401 falls back to synthetic data. A transport error
        // here is returned to the caller like any other failure.
        match self.get_page(PROBE_LIMIT, 0).await? {
            PageResponse::Unauthorized => {
                tracing::warn!("SAP API rejected credentials, using test data");
                Ok(FetchState::SyntheticFallback(FallbackReason::Unauthorized))
            }
            PageResponse::Body(_) => Ok(FetchState::Paginating {
                offset: 0,
                records: Vec::new(),
                pages: 0,
            }),
        }
    }

    async fn next_page(
        &self,
        offset: u64,
        mut records: Vec<Segmentation>,
        pages: u64,
    ) -> Result<FetchState, SapError> {
        tracing::info!(offset, limit = self.batch_size, "fetching data from SAP API");

        let body = match self.get_page(self.batch_size, offset).await? {
            PageResponse::Body(body) => body,
            PageResponse::Unauthorized => {
                tracing::warn!(
                    offset,
                    discarded = records.len(),
                    "SAP API rejected credentials during fetching, using test data"
                );
                return Ok(FetchState::SyntheticFallback(FallbackReason::Unauthorized));
            }
        };

        let Some(items) = decode_page(&body)? else {
            return Ok(FetchState::Done { records, pages });
        };

        tracing::debug!(offset, items = items.len(), "received page");
        records.extend(items);

        sleep(self.interval).await;

        Ok(FetchState::Paginating {
            offset: offset + u64::from(self.batch_size),
            records,
            pages: pages + 1,
        })
    }

    /// Issues one GET and fully consumes the response before returning, so
    /// no connection is held across the delay between pages.
    async fn get_page(&self, limit: u32, offset: u64) -> Result<PageResponse, SapError> {
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("p_limit", &limit.to_string())
            .append_pair("p_offset", &offset.to_string());

        let request = self
            .client
            .get(url)
            .header(AUTHORIZATION, self.auth_header.clone())
            .build()
            .map_err(|e| SapError::RequestConstructionFailed(e.to_string()))?;

        let response = self
            .client
            .execute(request)
            .await
            .map_err(SapError::TransportFailed)?;

        match response.status() {
            StatusCode::OK => {
                let body = response.bytes().await.map_err(SapError::TransportFailed)?;
                Ok(PageResponse::Body(body))
            }
            StatusCode::UNAUTHORIZED => Ok(PageResponse::Unauthorized),
            status => {
                let body = match response.text().await {
                    Ok(body) => body,
                    Err(e) => {
                        tracing::debug!(
                            status = status.as_u16(),
                            error = %e,
                            "failed to read SAP error response body"
                        );
                        String::new()
                    }
                };
                tracing::error!(
                    status = status.as_u16(),
                    body = %body,
                    "SAP API returned error status"
                );
                Err(SapError::UpstreamStatus { status, body })
            }
        }
    }

    fn synthetic(&self, reason: FallbackReason) -> Fetched {
        if reason == FallbackReason::Unauthorized {
            counter!(SAP_FETCH_FALLBACK).increment(1);
        }

        let records = self.synthetic.generate();
        tracing::info!(?reason, count = records.len(), "generated test data");

        Fetched {
            records,
            origin: RecordOrigin::Synthetic,
        }
    }
}

#[async_trait]
impl SegmentationSource for SapClient {
    async fn fetch(&self) -> Result<Fetched, SapError> {
        let mut state = if self.use_test_data {
            tracing::info!("using test data as configured");
            FetchState::SyntheticFallback(FallbackReason::Configured)
        } else {
            FetchState::Probing
        };

        loop {
            state = match state {
                FetchState::Probing => self.probe().await?,
                FetchState::Paginating {
                    offset,
                    records,
                    pages,
                } => self.next_page(offset, records, pages).await?,
                FetchState::SyntheticFallback(reason) => return Ok(self.synthetic(reason)),
                FetchState::Done { records, pages } => {
                    histogram!(SAP_FETCH_PAGES).record(pages as f64);
                    tracing::info!(
                        pages,
                        total_segments = records.len(),
                        "finished fetching data from SAP API"
                    );
                    return Ok(Fetched {
                        records,
                        origin: RecordOrigin::Upstream,
                    });
                }
            };
        }
    }
}

/// Returns `None` once the upstream signals the end of the data set.
fn decode_page(body: &[u8]) -> Result<Option<Vec<Segmentation>>, SapError> {
    let body = body.trim_ascii();
    if body.is_empty() || body == b"[]" || body == b"{}" {
        return Ok(None);
    }

    let page: SapPage = serde_json::from_slice(body)?;
    let items = page.items.unwrap_or_default();
    if items.is_empty() {
        return Ok(None);
    }

    Ok(Some(items.into_iter().map(Segmentation::from).collect()))
}
