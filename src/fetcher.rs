//! Single-page retrieval and HTML extraction.

use crate::error::FetchError;
use crate::models::{Image, PageSnapshot};
use crate::url_utils::{canonicalize, same_site};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::time::Instant;
use url::Url;

pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Words kept in a page's text excerpt
const EXCERPT_WORDS: usize = 80;

static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("title").expect("title selector should be valid"));
static META_DESC_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("meta[name='description']").expect("meta description selector should be valid")
});
static H1_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1").expect("h1 selector should be valid"));
static HEADINGS_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1, h2, h3").expect("headings selector should be valid"));
static IMG_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img").expect("img selector should be valid"));
static ANCHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href], area[href]").expect("anchor selector should be valid"));
static CANONICAL_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("link[rel='canonical']").expect("canonical selector should be valid")
});
static VIEWPORT_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("meta[name='viewport']").expect("viewport selector should be valid")
});
static STRUCTURED_DATA_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("script[type='application/ld+json'], [itemscope]")
        .expect("structured data selector should be valid")
});
static OPEN_GRAPH_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("meta[property='og:title']").expect("open graph selector should be valid")
});
static BODY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("body").expect("body selector should be valid"));

/// A successfully fetched page and everything extracted from it
#[derive(Debug, Clone, Default)]
pub struct FetchedPage {
    /// Canonical URL that was requested
    pub url: String,
    /// URL after redirects
    pub final_url: String,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub is_html: bool,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub h1_tags: Vec<String>,
    pub headings: Vec<String>,
    /// Canonical, de-duplicated, same-site links in document order
    pub links: Vec<String>,
    pub images: Vec<Image>,
    pub canonical: Option<String>,
    pub has_viewport: bool,
    pub has_structured_data: bool,
    pub has_open_graph: bool,
    pub word_count: usize,
    pub text_excerpt: String,
    pub response_time_ms: u64,
}

impl FetchedPage {
    pub fn snapshot(&self) -> PageSnapshot {
        PageSnapshot {
            url: self.url.clone(),
            title: self.title.clone(),
            meta_description: self.meta_description.clone(),
            h1_tags: self.h1_tags.clone(),
            headings: self.headings.clone(),
            text_excerpt: self.text_excerpt.clone(),
            images: self.images.clone(),
            canonical: self.canonical.clone(),
            has_viewport: self.has_viewport,
            has_structured_data: self.has_structured_data,
            has_open_graph: self.has_open_graph,
        }
    }
}

#[derive(Debug, Default)]
struct ParsedHtml {
    title: Option<String>,
    meta_description: Option<String>,
    h1_tags: Vec<String>,
    headings: Vec<String>,
    links: Vec<String>,
    images: Vec<Image>,
    canonical: Option<String>,
    has_viewport: bool,
    has_structured_data: bool,
    has_open_graph: bool,
    word_count: usize,
    text_excerpt: String,
}

#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl Fetcher {
    pub fn new(client: reqwest::Client, max_body_bytes: usize) -> Self {
        Self {
            client,
            max_body_bytes,
        }
    }

    /// Fetches `url` and keeps only the links that stay on `scope`'s site
    pub async fn fetch(&self, url: &Url, scope: &Url) -> Result<FetchedPage, FetchError> {
        let started = Instant::now();

        let mut response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?;

        let status_code = response.status().as_u16();
        if let Some(err) = FetchError::from_status(status_code) {
            return Err(err);
        }

        if let Some(len) = response.content_length()
            && len > self.max_body_bytes as u64
        {
            return Err(FetchError::TooLarge(self.max_body_bytes));
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?
        {
            if bytes.len() + chunk.len() > self.max_body_bytes {
                return Err(FetchError::TooLarge(self.max_body_bytes));
            }
            bytes.extend_from_slice(&chunk);
        }
        let response_time_ms = started.elapsed().as_millis() as u64;
        let body = String::from_utf8_lossy(&bytes).into_owned();

        let is_html = content_type
            .as_deref()
            .map(|ct| {
                let ct = ct.to_lowercase();
                ct.contains("text/html") || ct.contains("application/xhtml")
            })
            .unwrap_or(true);

        let parsed = if is_html {
            parse_html(&body, &final_url, scope)
        } else {
            tracing::warn!(
                url = %url,
                content_type = ?content_type,
                "Non-HTML content type, skipping extraction"
            );
            ParsedHtml::default()
        };

        Ok(FetchedPage {
            url: url.to_string(),
            final_url: final_url.to_string(),
            status_code,
            content_type,
            is_html,
            title: parsed.title,
            meta_description: parsed.meta_description,
            h1_tags: parsed.h1_tags,
            headings: parsed.headings,
            links: parsed.links,
            images: parsed.images,
            canonical: parsed.canonical,
            has_viewport: parsed.has_viewport,
            has_structured_data: parsed.has_structured_data,
            has_open_graph: parsed.has_open_graph,
            word_count: parsed.word_count,
            text_excerpt: parsed.text_excerpt,
            response_time_ms,
        })
    }
}

fn element_text(el: scraper::ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extracts everything the rule engine and remediation need from a document.
/// Kept synchronous so the non-`Send` `Html` never lives across an await.
fn parse_html(body: &str, page_url: &Url, scope: &Url) -> ParsedHtml {
    let document = Html::parse_document(body);

    let title = document
        .select(&TITLE_SELECTOR)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty());

    let meta_description = document
        .select(&META_DESC_SELECTOR)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let h1_tags = document.select(&H1_SELECTOR).map(element_text).collect();

    let headings = document
        .select(&HEADINGS_SELECTOR)
        .map(element_text)
        .filter(|h| !h.is_empty())
        .collect();

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for element in document.select(&ANCHOR_SELECTOR) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Some(absolute) = page_url.join(href.trim()).ok().and_then(|u| canonicalize(&u)) else {
            continue;
        };
        if !same_site(&absolute, scope) {
            continue;
        }
        let link = absolute.to_string();
        if seen.insert(link.clone()) {
            links.push(link);
        }
    }

    let images = document
        .select(&IMG_SELECTOR)
        .filter_map(|el| {
            let src = el.value().attr("src")?;
            let src = page_url
                .join(src)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| src.to_string());
            Some(Image {
                src,
                alt: el.value().attr("alt").map(|a| a.to_string()),
            })
        })
        .collect();

    let canonical = document
        .select(&CANONICAL_SELECTOR)
        .next()
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| page_url.join(href).ok())
        .map(|u| u.to_string());

    let mut words: Vec<&str> = Vec::new();
    if let Some(body_el) = document.select(&BODY_SELECTOR).next() {
        for node in body_el.descendants() {
            let Some(text) = node.value().as_text() else {
                continue;
            };
            let in_script = node
                .parent()
                .and_then(|p| p.value().as_element().map(|e| e.name()))
                .is_some_and(|name| matches!(name, "script" | "style" | "noscript"));
            if !in_script {
                words.extend(text.split_whitespace());
            }
        }
    }

    ParsedHtml {
        title,
        meta_description,
        h1_tags,
        headings,
        links,
        images,
        canonical,
        has_viewport: document.select(&VIEWPORT_SELECTOR).next().is_some(),
        has_structured_data: document.select(&STRUCTURED_DATA_SELECTOR).next().is_some(),
        has_open_graph: document.select(&OPEN_GRAPH_SELECTOR).next().is_some(),
        word_count: words.len(),
        text_excerpt: words
            .iter()
            .take(EXCERPT_WORDS)
            .copied()
            .collect::<Vec<_>>()
            .join(" "),
    }
}
