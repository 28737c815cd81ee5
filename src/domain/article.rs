//! Article entities: the transient extraction DTO and the persisted rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marker prefixed to heading blocks when content is flattened to a string.
/// Consumers re-split the string on blank lines and recover block types.
pub const HEADING_MARKER: &str = "### ";

/// Character budget for derived excerpts/summaries.
pub const EXCERPT_CHAR_LIMIT: usize = 200;

/// One ordered block of article body text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Heading { text: String },
    Paragraph { text: String },
}

impl ContentBlock {
    pub fn text(&self) -> &str {
        match self {
            Self::Heading { text } | Self::Paragraph { text } => text,
        }
    }
}

/// Flatten ordered blocks into the marker-encoded content string.
pub fn render_blocks(blocks: &[ContentBlock]) -> String {
    let mut out = String::new();
    for block in blocks {
        if let ContentBlock::Heading { .. } = block {
            out.push_str(HEADING_MARKER);
        }
        out.push_str(block.text());
        out.push_str("\n\n");
    }
    out
}

/// Recover the structured block list from a marker-encoded content string.
/// Round-trips with [`render_blocks`].
pub fn parse_blocks(content: &str) -> Vec<ContentBlock> {
    content
        .split("\n\n")
        .filter_map(|segment| {
            let segment = segment.trim();
            if segment.is_empty() {
                return None;
            }
            Some(match segment.strip_prefix(HEADING_MARKER) {
                Some(text) => ContentBlock::Heading { text: text.trim().to_string() },
                None => ContentBlock::Paragraph { text: segment.to_string() },
            })
        })
        .collect()
}

/// Truncate to a character budget without splitting multi-byte text.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// An image attached to an article, as produced by extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedImage {
    pub url: String,
    pub caption: Option<String>,
}

/// Normalized extraction output. Transient: this is what the parser hands
/// to the import pipeline, never what gets stored directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedArticle {
    pub article_id: Option<String>,
    pub title: String,
    /// Marker-encoded block string; see [`HEADING_MARKER`].
    pub content: String,
    pub author: Option<String>,
    pub category: Option<String>,
    pub sub_category: Option<String>,
    /// Verbatim as provided by the source; never reparsed here.
    pub published_date: String,
    pub updated_date: Option<String>,
    pub main_image_url: Option<String>,
    pub main_image_caption: Option<String>,
    pub gallery: Vec<ScrapedImage>,
    pub tags: Vec<String>,
    pub summary: Option<String>,
}

/// Persisted article row, keyed by (source_id, source_article_id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub source_id: String,
    pub source_article_id: String,
    pub source_url: String,
    pub title: String,
    pub author: Option<String>,
    pub category: Option<String>,
    pub sub_category: Option<String>,
    /// Comma-joined tag list.
    pub tags: Option<String>,
    pub published_date: Option<String>,
    pub updated_date: Option<String>,
    pub content: Vec<ContentBlock>,
    pub excerpt: Option<String>,
    pub main_image_url: Option<String>,
    pub main_image_caption: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Gallery image row, owned exclusively by its article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleImage {
    pub id: String,
    pub article_id: String,
    pub image_url: String,
    pub caption: Option<String>,
    pub display_order: i64,
    pub is_main_image: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_round_trip_preserves_interleaving() {
        let blocks = vec![
            ContentBlock::Paragraph { text: "first".into() },
            ContentBlock::Heading { text: "middle".into() },
            ContentBlock::Paragraph { text: "last".into() },
        ];
        let rendered = render_blocks(&blocks);
        assert!(rendered.contains("### middle"));
        assert_eq!(parse_blocks(&rendered), blocks);
    }

    #[test]
    fn parse_blocks_skips_blank_segments() {
        let parsed = parse_blocks("one\n\n\n\ntwo\n\n");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].text(), "one");
        assert_eq!(parsed[1].text(), "two");
    }

    #[test]
    fn truncate_chars_is_multibyte_safe() {
        let text = "港聞".repeat(300);
        let truncated = truncate_chars(&text, EXCERPT_CHAR_LIMIT);
        assert_eq!(truncated.chars().count(), EXCERPT_CHAR_LIMIT);
    }
}
