//! Per-source extraction strategies.
//!
//! A strategy replaces individual steps of the generic parser when a
//! source's markup cannot be expressed as a plain selector string. Each
//! step function takes the same parsed document handle and returns the
//! same shape as the generic step it stands in for, so strategies and the
//! generic extractor compose rather than fork.

use scraper::Html;

use crate::domain::article::{ContentBlock, ScrapedImage};
use crate::infrastructure::sources::SourceKey;

type IdStep = fn(&Html, Option<&str>) -> Option<String>;
type TextStep = fn(&Html) -> Option<String>;
type CategoriesStep = fn(&Html, Option<&str>) -> (Option<String>, Option<String>);
type ImageStep = fn(&Html) -> Option<ScrapedImage>;
type GalleryStep = fn(&Html) -> Vec<ScrapedImage>;
type ContentStep = fn(&Html) -> Vec<ContentBlock>;
type TagsStep = fn(&Html) -> Vec<String>;

/// Optional overrides for individual extraction steps. `None` means the
/// generic, selector-driven step runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceStrategy {
    pub article_id: Option<IdStep>,
    pub title: Option<TextStep>,
    pub author: Option<TextStep>,
    pub categories: Option<CategoriesStep>,
    pub published_date: Option<TextStep>,
    pub main_image: Option<ImageStep>,
    pub gallery: Option<GalleryStep>,
    pub content: Option<ContentStep>,
    pub tags: Option<TagsStep>,
}

/// Strategy lookup over the closed source set. HK01's markup is fully
/// covered by its selector configuration; Ming Pao needs bespoke handling
/// for nearly every step.
pub fn strategy_for(key: SourceKey) -> SourceStrategy {
    match key {
        SourceKey::Hk01 => SourceStrategy::default(),
        SourceKey::MingPao => SourceStrategy {
            article_id: Some(mingpao::article_id),
            title: Some(mingpao::title),
            author: Some(mingpao::author),
            categories: Some(mingpao::categories),
            published_date: Some(mingpao::published_date),
            main_image: Some(mingpao::main_image),
            gallery: Some(mingpao::gallery),
            content: Some(mingpao::content),
            tags: Some(mingpao::tags),
        },
    }
}

pub mod mingpao {
    //! Ming Pao quirks: lazy-loaded carousel images keyed by `zoom_` div
    //! ids with captions in a custom `dtitle` attribute, Chinese long
    //! dates, and a related-keywords paragraph that doubles as the tag
    //! list and must be dropped from the body.

    use once_cell::sync::Lazy;
    use regex::Regex;
    use scraper::{ElementRef, Html, Selector};

    use crate::domain::article::{ContentBlock, ScrapedImage};
    use crate::infrastructure::parsing::article_parser::{attr_text, element_text};

    static HGROUP_TITLE: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("hgroup h1").ok());
    static OG_TITLE: Lazy<Option<Selector>> =
        Lazy::new(|| Selector::parse("meta[property=\"og:title\"]").ok());
    static H2: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("h2").ok());
    static AUTHOR_FALLBACK: Lazy<Option<Selector>> =
        Lazy::new(|| Selector::parse("[itemprop=\"author\"], .author-name, .byline").ok());
    static COLLEFT_CATEGORY: Lazy<Option<Selector>> =
        Lazy::new(|| Selector::parse("div.colleft a h3").ok());
    static SECTION_META: Lazy<Option<Selector>> =
        Lazy::new(|| Selector::parse("meta[property=\"article:section\"]").ok());
    static DATE_DIV: Lazy<Option<Selector>> =
        Lazy::new(|| Selector::parse("div[itemprop=\"datePublished\"].date, div.date").ok());
    static ZOOM_DIVS: Lazy<Option<Selector>> =
        Lazy::new(|| Selector::parse("#blockcontent #zoomedimg div[id^=\"zoom_\"]").ok());
    static TOP_IMAGE: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("#topimage").ok());
    static TOP_IMAGE_BG: Lazy<Option<Selector>> =
        Lazy::new(|| Selector::parse("#topimage div[style*=\"background-image\"]").ok());
    static IMG: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("img").ok());
    static ANCHOR: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("a").ok());
    static CONTENT_ARTICLE: Lazy<Option<Selector>> =
        Lazy::new(|| Selector::parse("article.txt4").ok());
    static CONTENT_LOWER: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("div#lower").ok());
    static CONTENT_BLOCKS: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("h2, p").ok());
    static PARAGRAPH: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("p").ok());
    static CONTENT_TAG: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("a.content_tag").ok());

    static LONG_ARTICLE_ID: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"/(\d{10,})/").ok());
    static DATE_ARTICLE_ID: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"/(\d{8})/").ok());
    static PNS_CATEGORY: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"/pns/([^/]+)/article/").ok());
    static CN_YEAR: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(\d{4})年").ok());
    static CN_MONTH: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(\d{1,2})月").ok());
    static CN_DAY: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(\d{1,2})日").ok());
    static BG_IMAGE_URL: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r#"url\("([^"]+)"\)"#).ok());

    const IMAGE_HOST: &str = "fs.mingpao.com";
    const RELATED_KEYWORDS: &str = "相關字詞";
    const LAZY_PLACEHOLDER: &str = "grey.gif";

    /// Title lives in `<hgroup><h1>`; the og:title meta is the fallback.
    pub fn title(doc: &Html) -> Option<String> {
        if let Some(sel) = HGROUP_TITLE.as_ref() {
            if let Some(el) = doc.select(sel).next() {
                let text = element_text(el);
                if !text.is_empty() {
                    return Some(text);
                }
            }
        }
        let meta = doc.select(OG_TITLE.as_ref()?).next()?;
        attr_text(meta, "content")
    }

    /// The large epoch id near the end of the path is the most reliable
    /// identifier; the YYYYMMDD issue date is a weaker fallback.
    pub fn article_id(_doc: &Html, url: Option<&str>) -> Option<String> {
        let url = url?;
        if let Some(caps) = LONG_ARTICLE_ID.as_ref().and_then(|re| re.captures(url)) {
            return Some(caps[1].to_string());
        }
        DATE_ARTICLE_ID
            .as_ref()
            .and_then(|re| re.captures(url))
            .map(|caps| caps[1].to_string())
    }

    /// Bylines are `<h2>` headings mentioning 記者.
    pub fn author(doc: &Html) -> Option<String> {
        if let Some(sel) = H2.as_ref() {
            for heading in doc.select(sel) {
                let text = element_text(heading);
                if text.contains("記者") {
                    return Some(text);
                }
            }
        }
        let fallback = doc.select(AUTHOR_FALLBACK.as_ref()?).next()?;
        let text = element_text(fallback);
        (!text.is_empty()).then_some(text)
    }

    /// Category from the section heading, then the URL path segment, then
    /// the article:section meta. No sub-category on Ming Pao pages.
    pub fn categories(doc: &Html, url: Option<&str>) -> (Option<String>, Option<String>) {
        if let Some(el) = COLLEFT_CATEGORY.as_ref().and_then(|sel| doc.select(sel).next()) {
            let text = element_text(el);
            if !text.is_empty() {
                return (Some(text), None);
            }
        }

        if let Some(caps) = url.and_then(|u| PNS_CATEGORY.as_ref().and_then(|re| re.captures(u))) {
            return (Some(crate::infrastructure::parsing::percent_decode(&caps[1])), None);
        }

        let meta = SECTION_META
            .as_ref()
            .and_then(|sel| doc.select(sel).next())
            .and_then(|el| attr_text(el, "content"));
        (meta, None)
    }

    /// Normalize the Chinese long date (2025年12月8日星期一) to YYYY-MM-DD.
    /// The page offers no machine-readable datetime.
    pub fn published_date(doc: &Html) -> Option<String> {
        let date_div = doc.select(DATE_DIV.as_ref()?).next()?;
        let text = element_text(date_div);

        let year = CN_YEAR.as_ref()?.captures(&text)?[1].to_string();
        let month = CN_MONTH.as_ref()?.captures(&text)?[1].to_string();
        let day = CN_DAY.as_ref()?.captures(&text)?[1].to_string();
        Some(format!("{year}-{month:0>2}-{day:0>2}"))
    }

    /// First carousel image wins; a dedicated top image only when the
    /// carousel is empty. Never fall back to arbitrary host images (they
    /// pick up weather icons and the like).
    pub fn main_image(doc: &Html) -> Option<ScrapedImage> {
        if let Some(first) = carousel_images(doc).into_iter().next() {
            return Some(first);
        }

        let top = doc.select(TOP_IMAGE.as_ref()?).next()?;
        let img = top.select(IMG.as_ref()?).next()?;
        let url = lazy_image_url(img)?;
        let caption = attr_text(img, "alt").or_else(|| attr_text(img, "title"));
        Some(ScrapedImage { url, caption })
    }

    /// The whole carousel is the gallery, first image included.
    pub fn gallery(doc: &Html) -> Vec<ScrapedImage> {
        carousel_images(doc)
    }

    fn carousel_images(doc: &Html) -> Vec<ScrapedImage> {
        let mut images = Vec::new();

        if let Some(sel) = ZOOM_DIVS.as_ref() {
            for zoom in doc.select(sel) {
                let url = IMG
                    .as_ref()
                    .and_then(|img_sel| zoom.select(img_sel).next())
                    .and_then(lazy_image_url)
                    .or_else(|| background_image_url(zoom))
                    .or_else(|| {
                        ANCHOR
                            .as_ref()
                            .and_then(|a_sel| zoom.select(a_sel).next())
                            .and_then(|a| attr_text(a, "href"))
                    });
                let Some(url) = url else { continue };
                if !url.contains(IMAGE_HOST) {
                    continue;
                }

                let caption = attr_text(zoom, "dtitle")
                    .or_else(|| attr_text(zoom, "title"))
                    .or_else(|| {
                        IMG.as_ref()
                            .and_then(|img_sel| zoom.select(img_sel).next())
                            .and_then(|img| attr_text(img, "alt").or_else(|| attr_text(img, "title")))
                    });
                images.push(ScrapedImage { url, caption });
            }
        }

        if images.is_empty() {
            if let Some(sel) = TOP_IMAGE_BG.as_ref() {
                for div in doc.select(sel) {
                    let Some(url) = background_image_url(div) else { continue };
                    if !url.contains(IMAGE_HOST) {
                        continue;
                    }
                    images.push(ScrapedImage { url, caption: attr_text(div, "dtitle") });
                }
            }
        }

        images
    }

    /// The real URL of a lazy-loaded image; `src` alone may be the
    /// grey.gif placeholder.
    fn lazy_image_url(img: ElementRef<'_>) -> Option<String> {
        attr_text(img, "data-original")
            .or_else(|| attr_text(img, "data-src"))
            .or_else(|| attr_text(img, "src").filter(|src| !src.contains(LAZY_PLACEHOLDER)))
    }

    fn background_image_url(el: ElementRef<'_>) -> Option<String> {
        let style = el.value().attr("style")?;
        BG_IMAGE_URL
            .as_ref()
            .and_then(|re| re.captures(style))
            .map(|caps| caps[1].to_string())
    }

    /// Body lives in `article.txt4` (or `div#lower` on older pages) as
    /// interleaved `h2`/`p`. The related-keywords paragraph and the
    /// related-news block are navigation, not content.
    pub fn content(doc: &Html) -> Vec<ContentBlock> {
        let container = CONTENT_ARTICLE
            .as_ref()
            .and_then(|sel| doc.select(sel).next())
            .or_else(|| CONTENT_LOWER.as_ref().and_then(|sel| doc.select(sel).next()));
        let Some(container) = container else { return Vec::new() };
        let Some(blocks_sel) = CONTENT_BLOCKS.as_ref() else { return Vec::new() };

        let mut blocks = Vec::new();
        for el in container.select(blocks_sel) {
            let text = element_text(el);
            if text.is_empty() || text.contains(RELATED_KEYWORDS) {
                continue;
            }
            if has_ancestor_id(el, "pnsautornews") {
                continue;
            }
            if el.value().name() == "h2" {
                blocks.push(ContentBlock::Heading { text });
            } else {
                blocks.push(ContentBlock::Paragraph { text });
            }
        }
        blocks
    }

    /// Tags hang off the related-keywords paragraph as `a.content_tag`.
    pub fn tags(doc: &Html) -> Vec<String> {
        let Some(p_sel) = PARAGRAPH.as_ref() else { return Vec::new() };
        let Some(tag_sel) = CONTENT_TAG.as_ref() else { return Vec::new() };

        let mut tags: Vec<String> = Vec::new();
        for paragraph in doc.select(p_sel) {
            if !paragraph.text().collect::<String>().contains(RELATED_KEYWORDS) {
                continue;
            }
            for anchor in paragraph.select(tag_sel) {
                let text = element_text(anchor);
                if !text.is_empty() && !tags.contains(&text) {
                    tags.push(text);
                }
            }
        }
        tags
    }

    fn has_ancestor_id(el: ElementRef<'_>, id: &str) -> bool {
        el.ancestors()
            .filter_map(ElementRef::wrap)
            .any(|ancestor| ancestor.value().id() == Some(id))
    }
}
