pub mod epub;

use serde::{Deserialize, Serialize};

/// Metadata extracted from one book's package document.
///
/// Serialized verbatim into the store's `metadata` column, so the field
/// names follow the camelCase wire form the UI layer reads back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookMetadata {
    pub title: String,
    pub author: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_index: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_sort: Option<String>,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Raw cover image bytes pulled out of the archive, before normalization.
#[derive(Debug, Clone)]
pub struct RawCover {
    pub data: Vec<u8>,
    /// Media type declared in the manifest (e.g. "image/jpeg"). May be
    /// empty; the normalizer sniffs the actual format from the bytes.
    pub media_type: String,
}

/// Result of parsing one EPUB: metadata plus the cover, if the package
/// document references one.
#[derive(Debug)]
pub struct ParsedBook {
    pub metadata: BookMetadata,
    pub cover: Option<RawCover>,
}
