use serde::{Deserialize, Serialize};

/// A single segmentation entry as produced by the SAP source.
///
/// Records are immutable once built. The storage-assigned surrogate id is not
/// part of this type, see [`StoredSegmentation`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segmentation {
    #[serde(rename = "address_sap_id")]
    address_key: String,
    #[serde(rename = "adr_segment")]
    segment_label: String,
    segment_id: i64,
}

impl Segmentation {
    pub fn new<K, L>(address_key: K, segment_label: L, segment_id: i64) -> Self
    where
        K: Into<String>,
        L: Into<String>,
    {
        Segmentation {
            address_key: address_key.into(),
            segment_label: segment_label.into(),
            segment_id,
        }
    }

    pub fn address_key(&self) -> &str {
        &self.address_key
    }

    pub fn segment_label(&self) -> &str {
        &self.segment_label
    }

    pub fn segment_id(&self) -> i64 {
        self.segment_id
    }
}

/// A segmentation row read back from storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoredSegmentation {
    // Storage detail, never exposed through the API.
    #[serde(skip)]
    pub id: i64,
    #[serde(flatten)]
    pub record: Segmentation,
}

/// Where the records of a fetch came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordOrigin {
    Upstream,
    Synthetic,
}

/// The complete result of one fetch cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct Fetched {
    pub records: Vec<Segmentation>,
    pub origin: RecordOrigin,
}
