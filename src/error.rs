use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Unreadable spreadsheet: {0}")]
    UnreadableFile(String),

    #[error("First sheet has no used range")]
    EmptySheet,

    #[error("Taxonomy unavailable: {0}")]
    TaxonomyUnavailable(String),

    #[error("Extraction misconfigured: {0}")]
    ExtractionConfig(String),

    #[error("Extraction unavailable after {attempts} attempts: {last_error}")]
    ExtractionUnavailable { attempts: u32, last_error: String },

    #[error("Persistence failed: {0}")]
    Persistence(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, ReportError>;
