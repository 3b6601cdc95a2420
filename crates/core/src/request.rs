//! Invocation items: host parameters in, [`Extraction`]s out.
//!
//! Each item carries a base64 PDF and a JSON-array search parameter.
//! Validation of the search terms always happens before the PDF payload is
//! decoded, so a bad term list is reported as such even when the PDF is
//! also broken.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::extract::{extract, ExtractError, Extraction};
use crate::search::SearchTerms;

/// Prefix of a PDF data URL; accepted in front of the base64 payload.
const DATA_URL_PREFIX: &str = "data:application/pdf;base64,";

/// The two parameters of one invocation item, as the host supplies them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemParams {
    pub base64_pdf: String,
    /// A JSON array literal, e.g. `["Invoice", "Total"]`.
    pub search_text_array: String,
}

/// A validated extraction request.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRequest {
    pub pdf_bytes: Vec<u8>,
    pub search_terms: SearchTerms,
}

impl ExtractionRequest {
    pub fn from_params(params: &ItemParams) -> Result<Self, ExtractError> {
        let search_terms = SearchTerms::parse(&params.search_text_array)?;
        let pdf_bytes = decode_base64_pdf(&params.base64_pdf)?;
        Ok(Self {
            pdf_bytes,
            search_terms,
        })
    }

    pub fn run(&self) -> Result<Extraction, ExtractError> {
        Ok(Extraction {
            matched_texts: extract(&self.pdf_bytes, &self.search_terms)?,
        })
    }
}

/// Decode a standard-alphabet base64 payload.  Surrounding whitespace and a
/// `data:application/pdf;base64,` prefix are ignored.
pub fn decode_base64_pdf(payload: &str) -> Result<Vec<u8>, ExtractError> {
    let trimmed = payload.trim();
    let data = trimmed.strip_prefix(DATA_URL_PREFIX).unwrap_or(trimmed);
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| ExtractError::Decode(format!("invalid base64 PDF data: {}", e)))
}

/// Process a single invocation item.
pub fn run_item(params: &ItemParams) -> Result<Extraction, ExtractError> {
    ExtractionRequest::from_params(params)?.run()
}

/// Process items in order.  The first failing item fails the whole batch and
/// no partial output is returned.
pub fn run_items(items: &[ItemParams]) -> Result<Vec<Extraction>, ExtractError> {
    items.iter().map(run_item).collect()
}
