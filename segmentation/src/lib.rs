pub mod api;
pub mod config;
pub mod importer;
pub mod metrics_defs;
pub mod sap_client;
pub mod store;
pub mod synthetic;
pub mod types;

#[cfg(test)]
mod testutils;
