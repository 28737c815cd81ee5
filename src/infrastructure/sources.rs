//! Source registry - central configuration for all crawlable news sites.
//!
//! Selectors are data, not code: adding a source means adding a
//! configuration value (and, when its markup needs bespoke handling, a
//! strategy in `parsing::strategies`), never editing the extractor.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Closed set of supported sources. Dispatch is by matching on this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKey {
    Hk01,
    MingPao,
}

/// Configuration error: a source key outside the supported set.
/// Fails fast, before any network activity.
#[derive(Debug, Clone, Error)]
#[error("unsupported news source '{0}'")]
pub struct UnknownSourceError(pub String);

impl SourceKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hk01 => "hk01",
            Self::MingPao => "mingpao",
        }
    }

    pub fn parse(value: &str) -> Result<Self, UnknownSourceError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hk01" => Ok(Self::Hk01),
            "mingpao" => Ok(Self::MingPao),
            other => Err(UnknownSourceError(other.to_string())),
        }
    }

    pub fn all() -> [Self; 2] {
        [Self::Hk01, Self::MingPao]
    }

    /// Detect the owning source from an article or listing URL.
    pub fn detect_from_url(url: &str) -> Option<Self> {
        let host = Url::parse(url).ok()?.host_str()?.to_ascii_lowercase();
        if host.ends_with("hk01.com") {
            Some(Self::Hk01)
        } else if host.ends_with("mingpao.com") {
            Some(Self::MingPao)
        } else {
            None
        }
    }
}

/// CSS selectors for article pages. All fields are plain selector strings
/// compiled by the parser at construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleSelectors {
    pub title: String,
    /// Element carrying the source-native article id.
    pub article_id: String,
    /// Attribute on that element holding the id.
    pub article_id_attr: String,
    pub author: String,
    /// Byline labels stripped from the author text.
    pub author_prefixes: Vec<String>,
    /// Ordered breadcrumb-like set: first match is category, second is
    /// sub-category.
    pub breadcrumbs: String,
    /// Tried in priority order until one yields a date.
    pub publish_date: Vec<String>,
    /// Container of the "updated:" label span.
    pub publish_info: String,
    pub top_section: String,
    pub top_caption: String,
    pub body_images: String,
    pub content_container: String,
    /// Heading/paragraph elements inside the container, in document order.
    pub content_blocks: String,
    pub tags: String,
}

/// Identity and crawl configuration of one news site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsSource {
    pub key: SourceKey,
    pub name: String,
    pub base_url: String,
    pub is_active: bool,
    /// Default listing/category pages crawled when no explicit URL is given.
    pub list_pages: Vec<String>,
    pub selectors: ArticleSelectors,
}

impl NewsSource {
    pub fn for_key(key: SourceKey) -> Self {
        match key {
            SourceKey::Hk01 => Self::hk01(),
            SourceKey::MingPao => Self::mingpao(),
        }
    }

    pub fn hk01() -> Self {
        Self {
            key: SourceKey::Hk01,
            name: "HK01".to_string(),
            base_url: "https://www.hk01.com".to_string(),
            is_active: true,
            list_pages: (1..=12)
                .map(|zone| format!("https://www.hk01.com/zone/{zone}"))
                .collect(),
            selectors: ArticleSelectors {
                title: "h1#articleTitle".to_string(),
                article_id: "[data-article-id]".to_string(),
                article_id_attr: "data-article-id".to_string(),
                author: "[data-testid=\"article-author\"]".to_string(),
                author_prefixes: vec!["撰文：".to_string(), "撰文:".to_string()],
                breadcrumbs: "[data-testid=\"article-breadcrumb-zone\"], [data-testid=\"article-breadcrumb-channel\"]"
                    .to_string(),
                publish_date: vec![
                    "[data-testid=\"article-publish-info\"] time[datetime]".to_string(),
                    "[data-testid=\"article-publish-info\"] time".to_string(),
                    "time[datetime]".to_string(),
                    "time".to_string(),
                ],
                publish_info: "[data-testid=\"article-publish-info\"]".to_string(),
                top_section: "[data-testid=\"article-top-section\"]".to_string(),
                top_caption: "[data-testid=\"article-top-section-caption\"], figcaption, .img-caption"
                    .to_string(),
                body_images: ".article-grid__content-section .lazyload-wrapper".to_string(),
                content_container: "article#article-content-section".to_string(),
                content_blocks: "h3, p".to_string(),
                tags: "[data-testid=\"article-tag\"] a".to_string(),
            },
        }
    }

    pub fn mingpao() -> Self {
        Self {
            key: SourceKey::MingPao,
            name: "Ming Pao 明報".to_string(),
            base_url: "https://news.mingpao.com".to_string(),
            is_active: true,
            // pns/ins section index pages; the `latest` segment resolves to
            // the current issue on the site itself.
            list_pages: [
                "https://news.mingpao.com/pns/%E8%A6%81%E8%81%9E/section/latest/s00001",
                "https://news.mingpao.com/pns/%E6%B8%AF%E8%81%9E/section/latest/s00002",
                "https://news.mingpao.com/pns/%E7%B6%93%E6%BF%9F/section/latest/s00004",
                "https://news.mingpao.com/pns/%E5%A8%9B%E6%A8%82/section/latest/s00016",
                "https://news.mingpao.com/pns/%E5%89%AF%E5%88%8A/section/latest/s00005",
                "https://news.mingpao.com/pns/%E7%A4%BE%E8%A9%95/section/latest/s00003",
                "https://news.mingpao.com/pns/%E8%A7%80%E9%BB%9E/section/latest/s00012",
                "https://news.mingpao.com/pns/%E4%B8%AD%E5%9C%8B/section/latest/s00013",
                "https://news.mingpao.com/pns/%E5%9C%8B%E9%9A%9B/section/latest/s00014",
                "https://news.mingpao.com/pns/%E6%95%99%E8%82%B2/section/latest/s00011",
                "https://news.mingpao.com/pns/%E9%AB%94%E8%82%B2/section/latest/s00015",
                "https://news.mingpao.com/pns/%E8%8B%B1%E6%96%87/section/latest/s00017",
                "https://news.mingpao.com/pns/%E4%BD%9C%E5%AE%B6%E5%B0%88%E6%AC%84/section/latest/s00018",
                "https://news.mingpao.com/ins/%E5%A4%A7%E7%81%A3%E5%8D%80/section/latest/special",
                "https://news.mingpao.com/ins/%E6%B8%AF%E8%81%9E/section/latest/s00001",
                "https://news.mingpao.com/ins/%E7%86%B1%E9%BB%9E/section/latest/s00024",
            ]
            .iter()
            .map(|url| (*url).to_string())
            .collect(),
            selectors: ArticleSelectors {
                title: "hgroup h1, h1.main-title".to_string(),
                article_id: String::new(),
                article_id_attr: String::new(),
                author: "h2".to_string(),
                author_prefixes: Vec::new(),
                breadcrumbs: "div.colleft a h3".to_string(),
                publish_date: vec!["div[itemprop=\"datePublished\"].date, div.date".to_string()],
                publish_info: String::new(),
                top_section: "#topimage".to_string(),
                top_caption: String::new(),
                body_images: "#blockcontent #zoomedimg div[id^=\"zoom_\"]".to_string(),
                content_container: "article.txt4".to_string(),
                content_blocks: "h2, p".to_string(),
                tags: "a.content_tag".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_key_parse_is_case_insensitive() {
        assert_eq!(SourceKey::parse("HK01").unwrap(), SourceKey::Hk01);
        assert_eq!(SourceKey::parse(" mingpao ").unwrap(), SourceKey::MingPao);
        assert!(SourceKey::parse("scmp").is_err());
    }

    #[test]
    fn detect_from_url_maps_hostnames() {
        assert_eq!(
            SourceKey::detect_from_url("https://www.hk01.com/港聞/10001/some-slug"),
            Some(SourceKey::Hk01)
        );
        assert_eq!(
            SourceKey::detect_from_url("https://news.mingpao.com/pns/x/article/20251203/s00001/1700000000000/y"),
            Some(SourceKey::MingPao)
        );
        assert_eq!(SourceKey::detect_from_url("https://example.com/a"), None);
    }

    #[test]
    fn hk01_defaults_cover_twelve_zones() {
        let source = NewsSource::hk01();
        assert_eq!(source.list_pages.len(), 12);
        assert_eq!(source.list_pages[0], "https://www.hk01.com/zone/1");
    }
}
