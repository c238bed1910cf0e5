//! Placeholder records used when the SAP endpoint rejects our credentials, or
//! when the upstream is disabled in configuration.
use crate::config::SyntheticConfig;
use crate::types::Segmentation;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const PREFIXES: &[&str] = &["SAP-", "SEG-", "ADR-"];
const SEGMENTS: &[&str] = &["Premium", "Standard", "VIP", "Corporate", "SMB"];
const BASE_SEGMENT_ID: i64 = 1000;

#[derive(Clone, Debug)]
pub struct SyntheticGenerator {
    count: usize,
    seed: Option<u64>,
}

impl SyntheticGenerator {
    pub fn new(count: usize, seed: Option<u64>) -> Self {
        SyntheticGenerator { count, seed }
    }

    pub fn from_config(config: &SyntheticConfig) -> Self {
        Self::new(config.count, config.seed)
    }

    /// Generate a record set. Uses the configured seed, or a fresh one per call.
    pub fn generate(&self) -> Vec<Segmentation> {
        let seed = self.seed.unwrap_or_else(rand::random);
        self.generate_with_seed(seed)
    }

    /// The same seed always yields the same records.
    pub fn generate_with_seed(&self, seed: u64) -> Vec<Segmentation> {
        let mut rng = StdRng::seed_from_u64(seed);

        (0..self.count)
            .map(|i| {
                let prefix = PREFIXES[rng.gen_range(0..PREFIXES.len())];
                let segment = SEGMENTS[rng.gen_range(0..SEGMENTS.len())];
                Segmentation::new(
                    format!("{prefix}{:03}", i + 1),
                    segment,
                    BASE_SEGMENT_ID + i as i64,
                )
            })
            .collect()
    }
}
