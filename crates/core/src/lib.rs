//! Core library for pdfmatch
//!
//! This crate implements the **Functional Core** of the pdfmatch application,
//! following the Functional Core - Imperative Shell architectural pattern.
//!
//! # Architecture Overview
//!
//! - **`pdf`**: the decode capability (text runs, page geometry, editing)
//! - **`pdfmatch_core`** (this crate): parameter validation, exact matching
//!   and match-record assembly, with no I/O
//! - **`pdfmatch`**: CLI, MCP and HTTP hosts (the Imperative Shell)
//!
//! The hosts hand this crate raw parameters and get back either an
//! [`Extraction`] or an [`ExtractError`] whose [`ErrorKind`] they translate
//! into their own failure shape.
//!
//! # Module Organization
//!
//! - [`search`]: parsing of the JSON search-term parameter
//! - [`extract`]: page walking and exact matching over a [`extract::TextSource`]
//! - [`request`]: invocation items and batch processing
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use pdfmatch_core::{run_item, ItemParams};
//!
//! let params = ItemParams {
//!     base64_pdf: base64_encoded_pdf,
//!     search_text_array: r#"["Invoice"]"#.to_string(),
//! };
//! let extraction = run_item(&params)?;
//! for record in extraction.matched_texts {
//!     println!("{} at ({}, {})", record.text, record.x, record.y);
//! }
//! ```

pub mod extract;
pub mod request;
pub mod search;

pub use extract::{extract, ErrorKind, ExtractError, Extraction, MatchRecord};
pub use request::{run_item, run_items, ExtractionRequest, ItemParams};
pub use search::{SearchTerms, ValidationError};
