use crate::sap_client::{SapError, SegmentationSource};
use crate::types::{Fetched, RecordOrigin, Segmentation};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

/// In-process source returning a fixed result, for tests that do not care
/// about the HTTP protocol.
pub struct StaticSource {
    result: Result<Fetched, StatusCode>,
    delay: Option<Duration>,
}

impl StaticSource {
    pub fn upstream(records: Vec<Segmentation>) -> Self {
        Self::new(Ok(Fetched {
            records,
            origin: RecordOrigin::Upstream,
        }))
    }

    pub fn synthetic(records: Vec<Segmentation>) -> Self {
        Self::new(Ok(Fetched {
            records,
            origin: RecordOrigin::Synthetic,
        }))
    }

    pub fn failing(status: StatusCode) -> Self {
        Self::new(Err(status))
    }

    fn new(result: Result<Fetched, StatusCode>) -> Self {
        StaticSource {
            result,
            delay: None,
        }
    }

    /// Hold every fetch for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl SegmentationSource for StaticSource {
    async fn fetch(&self) -> Result<Fetched, SapError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.result.clone().map_err(|status| SapError::UpstreamStatus {
            status,
            body: "upstream unavailable".into(),
        })
    }
}
