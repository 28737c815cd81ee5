//! Listing-page link extraction.
//!
//! Each source encodes articles in a distinctive URL shape; anchors that
//! do not match it (channel/zone/issue index pages and the like) are
//! ignored. Output order follows the document; cross-page dedup and
//! sorting are the discovery layer's job.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::domain::newslist::CandidateLink;
use crate::infrastructure::parsing::percent_decode;
use crate::infrastructure::sources::SourceKey;

static ANCHORS: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("a[href]").ok());

// HK01 article path: /category/articleId/title-slug
static HK01_ARTICLE_PATH: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^/([\w%\-]+)/(\d+)/(.*)$").ok());
// Index pages that would otherwise match the article shape
const HK01_EXCLUDED_PREFIXES: [&str; 3] = ["/channel/", "/issue/", "/zone/"];

const HK01_BASE: &str = "https://www.hk01.com";
const MINGPAO_BASE: &str = "https://news.mingpao.com";

/// Extract candidate article links from one listing page.
pub fn parse_listing(key: SourceKey, html: &str) -> Vec<CandidateLink> {
    match key {
        SourceKey::Hk01 => parse_hk01_listing(html),
        SourceKey::MingPao => parse_mingpao_listing(html),
    }
}

fn parse_hk01_listing(html: &str) -> Vec<CandidateLink> {
    let doc = Html::parse_document(html);
    let Some(anchors) = ANCHORS.as_ref() else { return Vec::new() };
    let Some(article_path) = HK01_ARTICLE_PATH.as_ref() else { return Vec::new() };

    let mut candidates = Vec::new();
    for anchor in doc.select(anchors) {
        let Some(href) = anchor.value().attr("href") else { continue };
        let path = match href.strip_prefix(HK01_BASE) {
            Some(path) => path,
            None if href.starts_with('/') => href,
            None => continue,
        };
        if HK01_EXCLUDED_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
            continue;
        }
        let Some(caps) = article_path.captures(path) else { continue };

        let category = percent_decode(&caps[1]);
        let article_id = caps[2].to_string();
        let title = percent_decode(&caps[3]).replace('-', " ");
        let url = format!("{HK01_BASE}{path}");

        candidates.push(CandidateLink {
            article_id,
            url,
            category: Some(category),
            title: (!title.is_empty()).then_some(title),
        });
    }
    candidates
}

fn parse_mingpao_listing(html: &str) -> Vec<CandidateLink> {
    let doc = Html::parse_document(html);
    let Some(anchors) = ANCHORS.as_ref() else { return Vec::new() };

    let mut candidates = Vec::new();
    for anchor in doc.select(anchors) {
        let Some(href) = anchor.value().attr("href") else { continue };
        if !href.contains("/article/") {
            continue;
        }
        let absolute = if href.starts_with("http") {
            href.to_string()
        } else {
            let Ok(base) = Url::parse(MINGPAO_BASE) else { continue };
            let Ok(joined) = base.join(href) else { continue };
            joined.to_string()
        };
        let Ok(parsed) = Url::parse(&absolute) else { continue };
        let segments: Vec<&str> = match parsed.path_segments() {
            Some(segments) => segments.filter(|s| !s.is_empty()).collect(),
            None => continue,
        };

        // Specials carry the id right after the marker; regular articles
        // three segments after it (/article/YYYYMMDD/sectionCode/id/slug).
        let article_id = if let Some(index) = segments.iter().position(|s| *s == "special") {
            segments.get(index + 1).copied()
        } else {
            segments
                .iter()
                .position(|s| *s == "article")
                .and_then(|index| segments.get(index + 3).copied())
        };
        let Some(article_id) = article_id.filter(|id| !id.is_empty()) else { continue };

        let category = segments.get(1).map(|s| percent_decode(s));
        let title = segments
            .last()
            .map(|s| percent_decode(s).replace('-', " "))
            .filter(|t| !t.is_empty() && t != article_id);

        candidates.push(CandidateLink {
            article_id: article_id.to_string(),
            url: absolute,
            category,
            title,
        });
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hk01_matches_article_shape_and_skips_index_pages() {
        let html = r#"
            <html><body>
            <a href="/%E6%B8%AF%E8%81%9E/60300150/first-article">one</a>
            <a href="https://www.hk01.com/%E6%B8%AF%E8%81%9E/60300151/second-article">two</a>
            <a href="/channel/390/%E7%A4%BE%E6%9C%83">channel index</a>
            <a href="/zone/1/latest">zone index</a>
            <a href="/issue/1234/today">issue index</a>
            <a href="/about">not an article</a>
            </body></html>
        "#;
        let candidates = parse_listing(SourceKey::Hk01, html);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].article_id, "60300150");
        assert_eq!(candidates[0].url, "https://www.hk01.com/%E6%B8%AF%E8%81%9E/60300150/first-article");
        assert_eq!(candidates[0].category.as_deref(), Some("港聞"));
        assert_eq!(candidates[0].title.as_deref(), Some("first article"));
        assert_eq!(candidates[1].article_id, "60300151");
    }

    #[test]
    fn mingpao_extracts_ids_from_article_and_special_paths() {
        let html = r#"
            <html><body>
            <a href="/pns/%E8%A6%81%E8%81%9E/article/20251203/s00001/1765132930340/some-headline">regular</a>
            <a href="https://news.mingpao.com/ins/%E5%A4%A7%E7%81%A3%E5%8D%80/article/special/9876543/bay-news">special</a>
            <a href="/pns/%E8%A6%81%E8%81%9E/section/latest/s00001">section index</a>
            </body></html>
        "#;
        let candidates = parse_listing(SourceKey::MingPao, html);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].article_id, "1765132930340");
        assert_eq!(candidates[0].category.as_deref(), Some("要聞"));
        assert_eq!(candidates[0].title.as_deref(), Some("some headline"));
        assert_eq!(candidates[1].article_id, "9876543");
    }
}
