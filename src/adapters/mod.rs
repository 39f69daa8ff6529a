//! Extractor interfaces for the upstream transcription and extraction
//! service.
//!
//! Extractors produce raw candidate batches from a transcript. The
//! pipeline treats them as opaque producers: one extractor call is one
//! extraction pass, and everything downstream (scoring, gating,
//! merging) is extractor-agnostic.

pub mod command;
pub mod fixed;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

pub use command::CommandExtractor;
pub use fixed::FixedExtractor;

use crate::domain::candidate::CandidateAction;

/// Trait for upstream candidate extractors
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Human-readable extractor name
    fn name(&self) -> &str;

    /// Produce raw candidates for one pass over the transcript
    async fn extract(
        &self,
        transcript: &str,
        timeout: Duration,
    ) -> Result<Vec<CandidateAction>>;

    /// Health check (for subprocess/HTTP extractors)
    async fn health_check(&self) -> Result<()>;
}
