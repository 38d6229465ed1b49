//! # Balance Sheet Normalizer
//!
//! A library for normalizing arbitrary balance sheet spreadsheets into a
//! standardized taxonomy of financial positions via LLM structured
//! extraction.
//!
//! ## Core Concepts
//!
//! - **Taxonomy**: the closed, externally governed set of standardized
//!   position codes the pipeline is allowed to output
//! - **Claim**: a model-proposed mapping from sheet data to a code, prior to
//!   validation
//! - **Accepted position**: a claim that passed reconciliation and is
//!   persisted under a report
//! - **Excluded claim**: a claim rejected during extraction or
//!   reconciliation, kept only as diagnostic output
//!
//! The pipeline is a single linear run per uploaded file: read the first
//! sheet into a layout-preserving grid, take one taxonomy snapshot, issue one
//! structured extraction call (with bounded retries), reconcile the untrusted
//! model output against the snapshot, and persist the surviving positions
//! atomically.
//!
//! ## Example
//!
//! ```rust,ignore
//! use balance_sheet_normalizer::*;
//!
//! let store = SqliteReportStore::open("reports.db".as_ref())?;
//! store.seed_taxonomy(&Taxonomy::standard())?;
//!
//! let config = ExtractionConfig::from_env()?;
//! let backend = GeminiClient::new(&config)?;
//! let processor = ReportProcessor::new(backend, &config, store);
//!
//! let bytes = std::fs::read("q1_balance.xlsx")?;
//! let outcome = processor.process("q1_balance.xlsx", &bytes).await?;
//! println!("{} positions accepted", outcome.report.positions.len());
//! ```

pub mod config;
pub mod error;
pub mod llm;
pub mod reconcile;
pub mod schema;
pub mod sheet;
pub mod store;
pub mod taxonomy;

pub use config::ExtractionConfig;
pub use error::{ReportError, Result};
pub use llm::{BackendError, DelayFn, ExtractionBackend, GeminiClient, PositionExtractor};
pub use reconcile::{reconcile, Reconciliation};
pub use schema::{ExcludedClaim, ExtractedClaim, SheetExtraction};
pub use sheet::{read_first_sheet, render_rows, CellValue, RawRow};
pub use store::{Report, ReportFilter, ReportPosition, ReportRepository, SqliteReportStore};
pub use taxonomy::{PositionCategory, PositionType, Taxonomy, TaxonomyProvider};

use chrono::Utc;
use log::{debug, info};

/// Output of one pipeline run: the persisted report plus the diagnostic list
/// of everything that was filtered out, by the model or by reconciliation.
/// The diagnostics are never written to durable storage.
#[derive(Debug, Clone)]
pub struct ProcessedReport {
    pub report: Report,
    pub excluded: Vec<ExcludedClaim>,
}

/// The extraction-and-normalization pipeline. Independent instances may run
/// concurrently; they share no mutable state beyond the store, whose reads
/// and transactional writes are concurrency-safe.
pub struct ReportProcessor<B, S> {
    extractor: PositionExtractor<B>,
    store: S,
}

impl<B, S> ReportProcessor<B, S>
where
    B: ExtractionBackend,
    S: TaxonomyProvider + ReportRepository,
{
    pub fn new(backend: B, config: &ExtractionConfig, store: S) -> Self {
        Self {
            extractor: PositionExtractor::new(backend, config),
            store,
        }
    }

    pub fn with_delay_fn(mut self, delay: DelayFn) -> Self {
        self.extractor = self.extractor.with_delay_fn(delay);
        self
    }

    /// Process one uploaded file end to end. Any stage failure aborts the run
    /// before the single write at the end, so a failed run never leaves a
    /// partial report behind.
    pub async fn process(&self, file_name: &str, bytes: &[u8]) -> Result<ProcessedReport> {
        info!("Processing report file: {}", file_name);

        let rows = sheet::read_first_sheet(bytes)?;
        debug!("Sheet yielded {} rows", rows.len());

        let taxonomy = self.store.load_taxonomy()?;
        debug!("Taxonomy snapshot holds {} codes", taxonomy.len());

        let SheetExtraction {
            positions: claims,
            excluded: mut diagnostics,
        } = self.extractor.extract(&rows, &taxonomy).await?;

        let reconciliation = reconcile(claims, &taxonomy);
        diagnostics.extend(reconciliation.excluded);

        let report = self
            .store
            .create_report(file_name, Utc::now(), &reconciliation.accepted)?;
        info!(
            "Report {} persisted with {} positions ({} claims excluded)",
            report.id,
            report.positions.len(),
            diagnostics.len()
        );

        Ok(ProcessedReport {
            report,
            excluded: diagnostics,
        })
    }
}
