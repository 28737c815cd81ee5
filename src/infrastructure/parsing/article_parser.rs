//! Generic, selector-driven article extractor.
//!
//! The parser compiles one source's selector configuration up front and
//! runs a fixed sequence of extraction steps against a parsed document.
//! Title, publish date and content are hard preconditions; everything
//! else is best-effort and absent rather than fatal. A per-source
//! strategy can replace any individual step; see `strategies`.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::domain::article::{render_blocks, truncate_chars, ContentBlock, ScrapedArticle, ScrapedImage, EXCERPT_CHAR_LIMIT};
use crate::infrastructure::parsing::error::{ExtractionError, ExtractionResult};
use crate::infrastructure::parsing::strategies::{self, SourceStrategy};
use crate::infrastructure::sources::{ArticleSelectors, NewsSource, SourceKey};

/// Tagged extraction result plus scrape latency. The parser never lets an
/// error escape this envelope.
#[derive(Debug)]
pub struct ScrapeOutcome {
    pub result: ExtractionResult<ScrapedArticle>,
    pub elapsed: Duration,
}

impl ScrapeOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct ArticleParser {
    selectors: ArticleSelectors,
    strategy: SourceStrategy,

    title: Selector,
    article_id: Option<Selector>,
    author: Option<Selector>,
    breadcrumbs: Option<Selector>,
    publish_chain: Vec<Selector>,
    publish_info: Option<Selector>,
    top_section: Option<Selector>,
    top_caption: Option<Selector>,
    body_images: Option<Selector>,
    content_container: Selector,
    content_blocks: Selector,
    tags: Option<Selector>,

    img: Selector,
    span: Selector,
    time: Selector,
    img_caption: Selector,

    id_in_path: Regex,
}

impl ArticleParser {
    /// Build the parser for one of the registered sources.
    pub fn for_source(key: SourceKey) -> ExtractionResult<Self> {
        let source = NewsSource::for_key(key);
        Self::new(source.selectors, strategies::strategy_for(key))
    }

    /// Build from an explicit selector configuration and strategy.
    pub fn new(selectors: ArticleSelectors, strategy: SourceStrategy) -> ExtractionResult<Self> {
        let publish_chain = selectors
            .publish_date
            .iter()
            .map(|sel| compile(sel))
            .collect::<ExtractionResult<Vec<_>>>()?;

        Ok(Self {
            title: compile(&selectors.title)?,
            article_id: compile_optional(&selectors.article_id)?,
            author: compile_optional(&selectors.author)?,
            breadcrumbs: compile_optional(&selectors.breadcrumbs)?,
            publish_chain,
            publish_info: compile_optional(&selectors.publish_info)?,
            top_section: compile_optional(&selectors.top_section)?,
            top_caption: compile_optional(&selectors.top_caption)?,
            body_images: compile_optional(&selectors.body_images)?,
            content_container: compile(&selectors.content_container)?,
            content_blocks: compile(&selectors.content_blocks)?,
            tags: compile_optional(&selectors.tags)?,
            img: compile("img")?,
            span: compile("span")?,
            time: compile("time")?,
            img_caption: compile(".img-caption")?,
            id_in_path: Regex::new(r"/(\d+)/").map_err(|e| ExtractionError::StepFailed {
                step: "article_id",
                message: e.to_string(),
            })?,
            selectors,
            strategy,
        })
    }

    /// Extract a normalized article from raw HTML. Always returns a tagged
    /// outcome with timing; failures name the offending step.
    pub fn scrape_article(&self, html: &str, source_url: Option<&str>) -> ScrapeOutcome {
        let started = Instant::now();
        let result = self.extract(html, source_url);
        let elapsed = started.elapsed();

        match &result {
            Ok(article) => debug!(
                "Extracted article {:?} ('{}') in {:?}",
                article.article_id, article.title, elapsed
            ),
            Err(e) => warn!("Extraction failed after {:?}: {}", elapsed, e),
        }

        ScrapeOutcome { result, elapsed }
    }

    fn extract(&self, html: &str, source_url: Option<&str>) -> ExtractionResult<ScrapedArticle> {
        let doc = Html::parse_document(html);

        // Hard precondition: nothing downstream runs without a title.
        let title = match self.strategy.title {
            Some(step) => step(&doc),
            None => first_text(&doc, &self.title),
        }
        .ok_or_else(|| ExtractionError::required_field("title", &self.selectors.title))?;

        let article_id = match self.strategy.article_id {
            Some(step) => step(&doc, source_url),
            None => self.generic_article_id(&doc, source_url),
        };

        let author = match self.strategy.author {
            Some(step) => step(&doc),
            None => self.generic_author(&doc),
        };

        let (category, sub_category) = match self.strategy.categories {
            Some(step) => step(&doc, source_url),
            None => self.generic_categories(&doc),
        };

        let published_date = match self.strategy.published_date {
            Some(step) => step(&doc),
            None => self.generic_published_date(&doc),
        }
        .ok_or_else(|| {
            ExtractionError::required_field("published_date", &self.selectors.publish_date.join(", "))
        })?;

        let updated_date = self.generic_updated_date(&doc);

        let main_image = match self.strategy.main_image {
            Some(step) => step(&doc),
            None => self.generic_main_image(&doc),
        };
        let main_image_norm = main_image.as_ref().map(|img| strip_query(&img.url).to_string());

        let gallery = match self.strategy.gallery {
            Some(step) => step(&doc),
            None => self.generic_gallery(&doc, main_image_norm.as_deref()),
        };

        let blocks = match self.strategy.content {
            Some(step) => step(&doc),
            None => self.generic_content(&doc),
        };
        if blocks.is_empty() {
            return Err(ExtractionError::required_field(
                "content",
                &self.selectors.content_container,
            ));
        }
        let content = render_blocks(&blocks);

        let tags = match self.strategy.tags {
            Some(step) => step(&doc),
            None => self.generic_tags(&doc),
        };

        let summary = content
            .split("\n\n")
            .next()
            .map(|first| truncate_chars(first, EXCERPT_CHAR_LIMIT))
            .filter(|s| !s.is_empty());

        Ok(ScrapedArticle {
            article_id,
            title,
            content,
            author,
            category,
            sub_category,
            published_date,
            updated_date,
            main_image_url: main_image.as_ref().map(|img| img.url.clone()),
            main_image_caption: main_image.and_then(|img| img.caption),
            gallery,
            tags,
            summary,
        })
    }

    /// Prefer the explicit DOM attribute; fall back to a numeric path
    /// segment of the source URL.
    fn generic_article_id(&self, doc: &Html, source_url: Option<&str>) -> Option<String> {
        if let Some(sel) = &self.article_id {
            if let Some(id) = doc
                .select(sel)
                .next()
                .and_then(|el| el.value().attr(&self.selectors.article_id_attr))
                .map(str::trim)
                .filter(|id| !id.is_empty())
            {
                return Some(id.to_string());
            }
        }
        source_url
            .and_then(|url| self.id_in_path.captures(url))
            .map(|caps| caps[1].to_string())
    }

    fn generic_author(&self, doc: &Html) -> Option<String> {
        let mut author = self
            .author
            .as_ref()
            .and_then(|sel| doc.select(sel).next())
            .map(|el| el.text().collect::<String>())
            .unwrap_or_default();
        for prefix in &self.selectors.author_prefixes {
            author = author.replace(prefix.as_str(), "");
        }
        let author = author.trim().to_string();
        if !author.is_empty() {
            return Some(author);
        }

        doc.select(&self.title)
            .next()
            .and_then(|el| el.value().attr("data-author"))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// First breadcrumb match is the category, second the sub-category;
    /// falls back to a data attribute on the title element.
    fn generic_categories(&self, doc: &Html) -> (Option<String>, Option<String>) {
        let mut category = None;
        let mut sub_category = None;

        if let Some(sel) = &self.breadcrumbs {
            let mut crumbs = doc.select(sel);
            category = crumbs.next().map(element_text).filter(|t| !t.is_empty());
            sub_category = crumbs.next().map(element_text).filter(|t| !t.is_empty());
        }

        if category.is_none() {
            category = doc
                .select(&self.title)
                .next()
                .and_then(|el| el.value().attr("data-category"))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
        }

        (category, sub_category)
    }

    /// Walk the fallback chain; take the value verbatim from `datetime`,
    /// then `data-utc`, then the element text.
    fn generic_published_date(&self, doc: &Html) -> Option<String> {
        for sel in &self.publish_chain {
            let Some(el) = doc.select(sel).next() else { continue };
            let value = el
                .value()
                .attr("datetime")
                .or_else(|| el.value().attr("data-utc"))
                .map(str::to_string)
                .filter(|v| !v.is_empty())
                .or_else(|| {
                    let text = element_text(el);
                    (!text.is_empty()).then_some(text)
                });
            if let Some(value) = value {
                return Some(value);
            }
        }
        None
    }

    /// Best-effort "updated:" span inside the publish info block.
    fn generic_updated_date(&self, doc: &Html) -> Option<String> {
        let info = doc.select(self.publish_info.as_ref()?).next()?;
        for span in info.select(&self.span) {
            let text = span.text().collect::<String>();
            if !text.contains("更新：") {
                continue;
            }
            if let Some(datetime) = span
                .select(&self.time)
                .next()
                .and_then(|el| el.value().attr("datetime"))
                .filter(|v| !v.is_empty())
            {
                return Some(datetime.to_string());
            }
            if let Some(rest) = text.split("更新：").nth(1) {
                let rest = rest.trim();
                if !rest.is_empty() {
                    return Some(rest.to_string());
                }
            }
        }
        None
    }

    /// Hero image from the designated top container. Caption priority:
    /// caption element, image alt, image title.
    fn generic_main_image(&self, doc: &Html) -> Option<ScrapedImage> {
        let section = doc.select(self.top_section.as_ref()?).next()?;
        let img = section.select(&self.img).next()?;
        let url = image_url(img)?;

        let caption = self
            .top_caption
            .as_ref()
            .and_then(|sel| section.select(sel).next())
            .map(element_text)
            .filter(|t| !t.is_empty())
            .or_else(|| attr_text(img, "alt"))
            .or_else(|| attr_text(img, "title"));

        Some(ScrapedImage { url, caption })
    }

    /// In-body images, excluding the main image and de-duplicated by URL
    /// with the query string ignored.
    fn generic_gallery(&self, doc: &Html, main_image_norm: Option<&str>) -> Vec<ScrapedImage> {
        let Some(wrapper_sel) = &self.body_images else { return Vec::new() };

        let mut seen: HashSet<String> = HashSet::new();
        if let Some(main) = main_image_norm {
            seen.insert(main.to_string());
        }

        let mut images = Vec::new();
        for wrapper in doc.select(wrapper_sel) {
            let Some(img) = wrapper.select(&self.img).next() else { continue };
            let Some(url) = image_url(img) else { continue };
            if !seen.insert(strip_query(&url).to_string()) {
                continue;
            }

            let caption = attr_text(img, "title")
                .or_else(|| attr_text(img, "alt"))
                .or_else(|| {
                    wrapper
                        .parent()
                        .and_then(ElementRef::wrap)
                        .and_then(|parent| parent.select(&self.img_caption).next())
                        .map(element_text)
                        .filter(|t| !t.is_empty())
                });

            images.push(ScrapedImage { url, caption });
        }
        images
    }

    /// Ordered heading/paragraph blocks from the content container.
    fn generic_content(&self, doc: &Html) -> Vec<ContentBlock> {
        let Some(container) = doc.select(&self.content_container).next() else {
            return Vec::new();
        };

        let mut blocks = Vec::new();
        for el in container.select(&self.content_blocks) {
            let text = element_text(el);
            if text.is_empty() {
                continue;
            }
            if el.value().name() == "p" {
                blocks.push(ContentBlock::Paragraph { text });
            } else {
                blocks.push(ContentBlock::Heading { text });
            }
        }
        blocks
    }

    /// Order-preserving, de-duplicated tag list.
    fn generic_tags(&self, doc: &Html) -> Vec<String> {
        let Some(sel) = &self.tags else { return Vec::new() };
        let mut tags: Vec<String> = Vec::new();
        for anchor in doc.select(sel) {
            let Some(text) = anchor
                .select(&self.span)
                .next()
                .map(element_text)
                .filter(|t| !t.is_empty())
            else {
                continue;
            };
            if !tags.contains(&text) {
                tags.push(text);
            }
        }
        tags
    }
}

fn compile(selector: &str) -> ExtractionResult<Selector> {
    Selector::parse(selector).map_err(|e| ExtractionError::invalid_selector(selector, e))
}

fn compile_optional(selector: &str) -> ExtractionResult<Option<Selector>> {
    if selector.is_empty() {
        Ok(None)
    } else {
        compile(selector).map(Some)
    }
}

pub(crate) fn first_text(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty())
}

pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

pub(crate) fn attr_text(el: ElementRef<'_>, attr: &str) -> Option<String> {
    el.value()
        .attr(attr)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// An image URL, preferring the eager `src` over the lazy `data-src`.
pub(crate) fn image_url(el: ElementRef<'_>) -> Option<String> {
    attr_text(el, "src").or_else(|| attr_text(el, "data-src"))
}

/// Compare image URLs with the query string ignored.
pub(crate) fn strip_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}
