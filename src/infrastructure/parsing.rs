//! HTML parsing infrastructure.
//!
//! The generic article parser is driven entirely by per-source selector
//! configuration; sources whose markup a selector string cannot express
//! override individual steps through `strategies`. Listing pages go
//! through `link_parser`.

pub mod article_parser;
pub mod error;
pub mod link_parser;
pub mod strategies;

// Re-export public types
pub use article_parser::{ArticleParser, ScrapeOutcome};
pub use error::{ExtractionError, ExtractionResult};
pub use strategies::SourceStrategy;

/// Decode a percent-encoded URL fragment, falling back to the raw input
/// when it is not valid UTF-8.
pub(crate) fn percent_decode(value: &str) -> String {
    percent_encoding::percent_decode_str(value)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| value.to_string())
}
