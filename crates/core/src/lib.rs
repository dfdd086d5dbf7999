//! Core library: extraction, OCR fallback, normalization, scoring, routing
//! and archiving of intake documents.

pub mod archive;
pub mod config;
pub mod error;
pub mod extractor;
pub mod features;
pub mod models;
pub mod normalizer;
pub mod ocr;
pub mod pipeline;
pub mod router;
pub mod runlog;
pub mod scanner;
pub mod selector;
pub mod stopwords;
pub mod taxonomy;

pub use error::TriageError;
