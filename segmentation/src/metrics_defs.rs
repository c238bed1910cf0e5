//! Metrics definitions for the segmentation importer.

use shared::metrics_defs::{MetricDef, MetricType};

pub const SAP_FETCH_PAGES: MetricDef = MetricDef {
    name: "sap.fetch.pages",
    metric_type: MetricType::Histogram,
    description: "Number of non-empty pages read from the SAP API in one fetch",
};

pub const SAP_FETCH_FALLBACK: MetricDef = MetricDef {
    name: "sap.fetch.fallback",
    metric_type: MetricType::Counter,
    description: "Number of fetches answered with synthetic data instead of SAP data",
};

pub const IMPORT_DURATION: MetricDef = MetricDef {
    name: "import.duration",
    metric_type: MetricType::Histogram,
    description: "Time to complete an import cycle in seconds",
};

pub const IMPORT_ROWS: MetricDef = MetricDef {
    name: "import.rows",
    metric_type: MetricType::Histogram,
    description: "Number of segmentation records written by an import cycle",
};

pub const IMPORT_FAILED: MetricDef = MetricDef {
    name: "import.failed",
    metric_type: MetricType::Counter,
    description: "Number of import cycles that ended with an error",
};

pub const ALL_METRICS: &[MetricDef] = &[
    SAP_FETCH_PAGES,
    SAP_FETCH_FALLBACK,
    IMPORT_DURATION,
    IMPORT_ROWS,
    IMPORT_FAILED,
];
