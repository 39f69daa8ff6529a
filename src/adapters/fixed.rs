//! Extractor over pre-extracted candidate batches.
//!
//! Feeds the pipeline from candidates that already exist as JSON, one
//! batch per pass. Used to validate extractor output captured earlier
//! without re-invoking the model, and as the extractor behind
//! file-based processing in the CLI.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::Extractor;
use crate::domain::candidate::CandidateAction;

/// Extractor that hands out prepared batches in order
pub struct FixedExtractor {
    batches: Mutex<VecDeque<Vec<CandidateAction>>>,
}

impl FixedExtractor {
    /// Extractor serving the given batches, one per pass
    pub fn new(batches: Vec<Vec<CandidateAction>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
        }
    }

    /// Extractor serving a single batch
    pub fn single(batch: Vec<CandidateAction>) -> Self {
        Self::new(vec![batch])
    }

    /// Extractor serving one batch parsed from a JSON candidate array
    pub fn from_json(json: &str) -> Result<Self> {
        let batch: Vec<CandidateAction> =
            serde_json::from_str(json).context("Failed to parse candidate array")?;
        Ok(Self::single(batch))
    }

    /// Number of batches not yet served
    pub fn remaining(&self) -> usize {
        self.batches.lock().map(|b| b.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Extractor for FixedExtractor {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn extract(
        &self,
        _transcript: &str,
        _timeout: Duration,
    ) -> Result<Vec<CandidateAction>> {
        let batch = self
            .batches
            .lock()
            .map_err(|_| anyhow::anyhow!("Batch queue poisoned"))?
            .pop_front();
        // Exhausted batches read as an empty pass, not an error
        Ok(batch.unwrap_or_default())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
