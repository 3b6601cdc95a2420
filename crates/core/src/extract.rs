//! Exact-match text extraction.
//!
//! Walks a decoded document page by page and reports every text run whose
//! text is a member of the search-term set, together with its position and
//! the dimensions of the page it sits on.
//!
//! The decoder is reached through [`TextSource`], so matching can be tested
//! against fixture pages without a real PDF.

use pdf::{PageGeometry, PdfError, TextRun};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::search::{SearchTerms, ValidationError};

/// Scale at which page geometry is reported.
pub const GEOMETRY_SCALE: f32 = 1.0;

/// One matched text run.  `x` and `y` are the run's anchor (the translation
/// of its transform), not a bounding-box corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub page_width: f32,
    pub page_height: f32,
}

/// Output for a single invocation item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    pub matched_texts: Vec<MatchRecord>,
}

/// Host-independent classification of extraction failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller's parameters are malformed.
    Validation,
    /// The PDF could not be decoded or processed.
    Decode,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Error processing PDF: {0}")]
    Decode(String),
}

impl ExtractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::Validation(_) => ErrorKind::Validation,
            ExtractError::Decode(_) => ErrorKind::Decode,
        }
    }
}

impl From<PdfError> for ExtractError {
    fn from(e: PdfError) -> Self {
        ExtractError::Decode(e.to_string())
    }
}

/// A decoded document seen as numbered pages of text runs.
pub trait TextSource {
    type Error: std::fmt::Display;

    fn page_count(&self) -> usize;

    /// Runs of page `page` (1-based) in decoder order.
    fn page_runs(&self, page: u32) -> Result<Vec<TextRun>, Self::Error>;

    fn page_geometry(&self, page: u32, scale: f32) -> Result<PageGeometry, Self::Error>;
}

impl TextSource for pdf::Document {
    type Error = PdfError;

    fn page_count(&self) -> usize {
        pdf::Document::page_count(self)
    }

    fn page_runs(&self, page: u32) -> Result<Vec<TextRun>, PdfError> {
        self.page(page)?.text_runs()
    }

    fn page_geometry(&self, page: u32, scale: f32) -> Result<PageGeometry, PdfError> {
        self.page(page)?.geometry(scale)
    }
}

/// Match the runs of one page.  Pure: records come out in run order.
pub fn match_page(
    runs: &[TextRun],
    geometry: PageGeometry,
    terms: &SearchTerms,
) -> Vec<MatchRecord> {
    runs.iter()
        .filter(|run| terms.contains(&run.text))
        .map(|run| MatchRecord {
            text: run.text.clone(),
            x: run.x(),
            y: run.y(),
            width: run.width,
            height: run.height,
            page_width: geometry.width,
            page_height: geometry.height,
        })
        .collect()
}

/// Run the matcher over every page of `source`, in ascending page order.
///
/// Any page failure aborts the whole extraction.
pub fn extract_from<S: TextSource>(
    source: &S,
    terms: &SearchTerms,
) -> Result<Vec<MatchRecord>, ExtractError> {
    let mut records = Vec::new();
    if terms.is_empty() {
        return Ok(records);
    }

    for page in 1..=source.page_count() as u32 {
        let decode = |e: S::Error| ExtractError::Decode(e.to_string());
        let geometry = source
            .page_geometry(page, GEOMETRY_SCALE)
            .map_err(decode)?;
        let runs = source.page_runs(page).map_err(decode)?;
        records.extend(match_page(&runs, geometry, terms));
    }

    Ok(records)
}

/// Decode `pdf_bytes` and return every run whose text is one of `terms`.
pub fn extract(pdf_bytes: &[u8], terms: &SearchTerms) -> Result<Vec<MatchRecord>, ExtractError> {
    let document = pdf::Document::from_bytes(pdf_bytes)?;
    extract_from(&document, terms)
}
