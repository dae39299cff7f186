use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rand::prelude::IndexedRandom;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{info, warn};
use url::Url;

use llm_client::util::truncate_to_char_boundary;
use radius_common::{
    CrawlMetadata, CrawlResult, ExtractedSignals, PageHeading, PageRecord, PageSection,
    RadiusError,
};

/// Priority paths in descending order of importance. Crawling stops once
/// `max_pages` of them succeed.
const PRIORITY_PATHS: &[(&str, PageSection)] = &[
    ("/", PageSection::Homepage),
    ("/about", PageSection::About),
    ("/about-us", PageSection::About),
    ("/company", PageSection::About),
    ("/products", PageSection::Products),
    ("/product", PageSection::Products),
    ("/services", PageSection::Products),
    ("/solutions", PageSection::Products),
    ("/features", PageSection::Products),
    ("/pricing", PageSection::Pricing),
    ("/plans", PageSection::Pricing),
    ("/docs", PageSection::Documentation),
    ("/documentation", PageSection::Documentation),
    ("/help", PageSection::Support),
    ("/support", PageSection::Support),
    ("/blog", PageSection::Blog),
    ("/resources", PageSection::Resources),
    ("/customers", PageSection::Customers),
    ("/case-studies", PageSection::Customers),
    ("/security", PageSection::Trust),
    ("/privacy", PageSection::Trust),
    ("/compliance", PageSection::Trust),
];

/// Rotated per request to avoid trivial bot blocks.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
];

/// Tags whose subtrees carry no business content.
const NOISE_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "header", "aside", "iframe", "noscript", "svg",
];

const MAX_PAGE_TEXT_CHARS: usize = 15_000;
const MAX_SECTION_CHARS: usize = 8_000;
const MAX_HEADINGS_PER_PAGE: usize = 30;
const PAGE_DELAY: Duration = Duration::from_millis(300);
const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(2);

// --- PageFetcher trait ---

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
}

/// Network seam for the crawler. Tests substitute a stub serving fixture
/// HTML; production wraps reqwest.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let user_agent = USER_AGENTS
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);

        let response = self
            .http
            .get(url)
            .header("User-Agent", user_agent)
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header("Accept-Language", "en-US,en;q=0.5")
            .send()
            .await
            .map_err(|e| RadiusError::Crawl(format!("Request failed for {url}: {e}")))?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        Ok(FetchedPage { status, body })
    }
}

// --- Crawler ---

pub struct Crawler {
    base_url: Url,
    domain: String,
    fetcher: Arc<dyn PageFetcher>,
    max_pages: usize,
    extractor: SignalExtractor,
}

impl std::fmt::Debug for Crawler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crawler")
            .field("base_url", &self.base_url)
            .field("domain", &self.domain)
            .field("max_pages", &self.max_pages)
            .finish_non_exhaustive()
    }
}

impl Crawler {
    pub fn new(url: &str, fetcher: Arc<dyn PageFetcher>, max_pages: usize) -> Result<Self> {
        let normalized = if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("https://{url}")
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| RadiusError::Crawl(format!("Invalid URL {url:?}: {e}")))?;
        let domain = base_url
            .host_str()
            .ok_or_else(|| RadiusError::Crawl(format!("URL has no host: {url:?}")))?
            .trim_start_matches("www.")
            .to_string();

        Ok(Self {
            base_url,
            domain,
            fetcher,
            max_pages: max_pages.min(10),
            extractor: SignalExtractor::new(),
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Crawl the priority paths until `max_pages` succeed. Never fails:
    /// unreachable pages are tallied and skipped, and an unreachable root
    /// aborts early with an empty (but well-formed) result so downstream
    /// stages can still run on fallbacks.
    pub async fn crawl(&self) -> CrawlResult {
        info!(domain = %self.domain, "Starting comprehensive crawl");

        let mut metadata = CrawlMetadata {
            domain: self.domain.clone(),
            base_url: self.base_url.to_string(),
            crawl_timestamp: Utc::now(),
            pages_attempted: 0,
            pages_successful: 0,
            cache_used: false,
        };
        let mut pages = BTreeMap::new();
        let mut raw_content: BTreeMap<PageSection, String> = BTreeMap::new();
        let mut extracted = ExtractedSignals::default();

        for (path, section) in PRIORITY_PATHS {
            if metadata.pages_successful as usize >= self.max_pages {
                break;
            }

            let url = match self.base_url.join(path) {
                Ok(u) => u,
                Err(_) => continue,
            };
            metadata.pages_attempted += 1;

            match self.fetcher.fetch(url.as_str()).await {
                Ok(page) if page.status == 200 => {
                    let record = parse_page(url.as_str(), &page.body);
                    info!(path, section = %section, chars = record.text.len(), "Page crawled");

                    let slot = raw_content.entry(*section).or_default();
                    if !slot.is_empty() {
                        slot.push_str("\n\n");
                    }
                    slot.push_str(&record.text);

                    self.extractor.extract_into(&record, &mut extracted);
                    pages.insert(path.to_string(), record);
                    metadata.pages_successful += 1;
                }
                Ok(page) if page.status == 429 => {
                    warn!(path, "Rate limited, backing off");
                    tokio::time::sleep(RATE_LIMIT_BACKOFF).await;
                }
                Ok(page) => {
                    warn!(path, status = page.status, "Page skipped");
                    // Root page gone and nothing crawled yet: the domain is
                    // effectively unreachable, so stop probing deeper paths.
                    if metadata.pages_attempted == 1 && metadata.pages_successful == 0 {
                        warn!(domain = %self.domain, "Root page unreachable, aborting crawl");
                        break;
                    }
                }
                Err(e) => {
                    warn!(path, error = %e, "Fetch failed");
                    if metadata.pages_attempted == 1 && metadata.pages_successful == 0 {
                        warn!(domain = %self.domain, "Root page unreachable, aborting crawl");
                        break;
                    }
                }
            }

            tokio::time::sleep(PAGE_DELAY).await;
        }

        for text in raw_content.values_mut() {
            let cleaned = clean_text(text);
            *text = truncate_to_char_boundary(&cleaned, MAX_SECTION_CHARS).to_string();
        }

        info!(
            domain = %self.domain,
            attempted = metadata.pages_attempted,
            successful = metadata.pages_successful,
            "Crawl complete"
        );

        CrawlResult {
            metadata,
            pages,
            raw_content,
            extracted,
        }
    }

    /// Well-formed zero-page result for targets that cannot even be parsed
    /// as a URL, so downstream fallbacks still get a domain to name.
    pub fn empty_result(url: &str) -> CrawlResult {
        let domain = url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_start_matches("www.")
            .split('/')
            .next()
            .unwrap_or(url)
            .to_string();

        CrawlResult {
            metadata: CrawlMetadata {
                domain,
                base_url: url.to_string(),
                crawl_timestamp: Utc::now(),
                pages_attempted: 0,
                pages_successful: 0,
                cache_used: false,
            },
            pages: BTreeMap::new(),
            raw_content: BTreeMap::new(),
            extracted: ExtractedSignals::default(),
        }
    }
}

// --- HTML parsing ---

/// Parse one fetched page into a cleaned record: title (preferring og:title),
/// meta description, H1-H3 headings and visible text with noise subtrees
/// skipped.
pub fn parse_page(url: &str, html: &str) -> PageRecord {
    let document = Html::parse_document(html);

    let title = select_meta_content(&document, "meta[property=\"og:title\"]")
        .or_else(|| {
            let selector = Selector::parse("title").ok()?;
            document
                .select(&selector)
                .next()
                .map(|t| t.text().collect::<String>().trim().to_string())
        })
        .unwrap_or_default();

    let meta_description = select_meta_content(&document, "meta[name=\"description\"]")
        .or_else(|| select_meta_content(&document, "meta[property=\"og:description\"]"))
        .unwrap_or_default();

    let mut headings = Vec::new();
    if let Ok(selector) = Selector::parse("h1, h2, h3") {
        for element in document.select(&selector) {
            if headings.len() >= MAX_HEADINGS_PER_PAGE {
                break;
            }
            let text = normalize_whitespace(&element.text().collect::<String>());
            if text.len() > 3 {
                headings.push(PageHeading {
                    level: element.value().name().to_string(),
                    text: truncate_to_char_boundary(&text, 200).to_string(),
                });
            }
        }
    }

    let text = clean_text(&visible_text(&document));

    PageRecord {
        url: url.to_string(),
        title,
        meta_description,
        headings,
        text: truncate_to_char_boundary(&text, MAX_PAGE_TEXT_CHARS).to_string(),
        crawled_at: Utc::now(),
    }
}

fn select_meta_content(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

/// Depth-first walk of the DOM collecting text, skipping noise subtrees
/// entirely (script, style, nav, footer, ...).
fn visible_text(document: &Html) -> String {
    let mut out = String::new();
    let mut stack = vec![document.tree.root()];

    while let Some(node) = stack.pop() {
        match node.value() {
            scraper::Node::Element(element) => {
                if NOISE_TAGS.contains(&element.name()) {
                    continue;
                }
                // Push in reverse so children pop in document order.
                let children: Vec<_> = node.children().collect();
                for child in children.into_iter().rev() {
                    stack.push(child);
                }
            }
            scraper::Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(trimmed);
                }
            }
            _ => {
                let children: Vec<_> = node.children().collect();
                for child in children.into_iter().rev() {
                    stack.push(child);
                }
            }
        }
    }

    out
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clean_text(text: &str) -> String {
    normalize_whitespace(text)
}

// --- Signal extraction ---

/// Regex families applied over lower-cased page text to pick out social
/// proof, pricing and trust/compliance phrases.
pub struct SignalExtractor {
    social: Vec<Regex>,
    pricing: Vec<Regex>,
    trust: Vec<Regex>,
}

impl SignalExtractor {
    pub fn new() -> Self {
        let compile = |patterns: &[&str]| {
            patterns
                .iter()
                .map(|p| Regex::new(p).expect("signal pattern must compile"))
                .collect()
        };

        Self {
            social: compile(&[
                r"(\d+)\+?\s*(customers|clients|users|companies|businesses)",
                r"trusted by\s*(\d+)",
                r"(\d+)\s*(million|billion|k)\s*(users|customers)",
                r"(fortune\s*\d+|forbes|techcrunch|bloomberg)",
            ]),
            pricing: compile(&[
                r"\$(\d+(?:,\d{3})*(?:\.\d{2})?)\s*(?:/|per)?\s*(month|year|user|seat)?",
                r"(free trial|free tier|freemium|free)",
                r"(enterprise|custom pricing|contact sales)",
            ]),
            trust: compile(&[
                r"(soc\s*2|iso\s*27001|gdpr|hipaa|pci|ccpa)",
                r"(encrypted|secure|compliant|certified)",
                r"(99\.\d+%\s*uptime|sla)",
            ]),
        }
    }

    /// Fold one page's signals into the accumulated set, deduplicating.
    pub fn extract_into(&self, page: &PageRecord, extracted: &mut ExtractedSignals) {
        if extracted.title.is_empty() && !page.title.is_empty() {
            extracted.title = page.title.clone();
        }
        if extracted.meta_description.is_empty() && !page.meta_description.is_empty() {
            extracted.meta_description = page.meta_description.clone();
        }
        for heading in &page.headings {
            if !extracted.headings.contains(heading) {
                extracted.headings.push(heading.clone());
            }
        }

        let text = page.text.to_lowercase();
        collect_matches(&self.social, &text, &mut extracted.social_proof);
        collect_matches(&self.pricing, &text, &mut extracted.pricing_info);
        collect_matches(&self.trust, &text, &mut extracted.trust_signals);
    }
}

impl Default for SignalExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_matches(patterns: &[Regex], text: &str, out: &mut Vec<String>) {
    for pattern in patterns {
        for caps in pattern.captures_iter(text) {
            let joined = caps
                .iter()
                .skip(1)
                .flatten()
                .map(|m| m.as_str())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if !joined.is_empty() && !out.contains(&joined) {
                out.push(joined);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"<!DOCTYPE html>
<html><head>
<title>Fallback Title</title>
<meta property="og:title" content="Acme Payments">
<meta name="description" content="Payment infrastructure for startups.">
</head><body>
<nav>Home Pricing Docs</nav>
<script>var tracking = true;</script>
<main>
<h1>Payments for developers</h1>
<h2>Why Acme</h2>
<p>Trusted by 500 companies. Plans from $29/month. SOC 2 certified.</p>
</main>
<footer>Copyright Acme</footer>
</body></html>"#;

    #[test]
    fn parse_page_prefers_og_title() {
        let record = parse_page("https://acme.io/", FIXTURE);
        assert_eq!(record.title, "Acme Payments");
        assert_eq!(record.meta_description, "Payment infrastructure for startups.");
    }

    #[test]
    fn parse_page_skips_noise_tags() {
        let record = parse_page("https://acme.io/", FIXTURE);
        assert!(!record.text.contains("tracking"));
        assert!(!record.text.contains("Copyright"));
        assert!(record.text.contains("Trusted by 500 companies"));
    }

    #[test]
    fn parse_page_collects_headings() {
        let record = parse_page("https://acme.io/", FIXTURE);
        let levels: Vec<_> = record.headings.iter().map(|h| h.level.as_str()).collect();
        assert_eq!(levels, vec!["h1", "h2"]);
    }

    #[test]
    fn signal_extractor_finds_all_three_families() {
        let record = parse_page("https://acme.io/", FIXTURE);
        let mut extracted = ExtractedSignals::default();
        SignalExtractor::new().extract_into(&record, &mut extracted);

        assert!(extracted.social_proof.iter().any(|s| s.contains("500")));
        assert!(extracted.pricing_info.iter().any(|s| s.contains("29")));
        assert!(extracted.trust_signals.iter().any(|s| s.contains("soc 2")));
    }

    #[test]
    fn signal_extractor_deduplicates() {
        let record = parse_page("https://acme.io/", FIXTURE);
        let mut extracted = ExtractedSignals::default();
        let extractor = SignalExtractor::new();
        extractor.extract_into(&record, &mut extracted);
        let first = extracted.social_proof.len();
        extractor.extract_into(&record, &mut extracted);
        assert_eq!(extracted.social_proof.len(), first);
    }

    #[test]
    fn crawler_normalizes_bare_domains() {
        let fetcher = Arc::new(crate::testing::StubFetcher::new());
        let crawler = Crawler::new("acme.io", fetcher, 10).unwrap();
        assert_eq!(crawler.domain(), "acme.io");
        assert!(crawler.base_url().starts_with("https://"));
    }

    #[test]
    fn invalid_url_error_carries_the_crawl_category() {
        let fetcher = Arc::new(crate::testing::StubFetcher::new());
        let err = Crawler::new("http://", fetcher, 10).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RadiusError>(),
            Some(RadiusError::Crawl(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_root_aborts_after_one_attempt() {
        let fetcher = Arc::new(crate::testing::StubFetcher::new().with_page("/", 404, ""));
        let crawler = Crawler::new("https://dead.example.com", fetcher, 10).unwrap();
        let result = crawler.crawl().await;

        assert_eq!(result.metadata.pages_attempted, 1);
        assert_eq!(result.metadata.pages_successful, 0);
        assert!(result.pages.is_empty());
    }

    #[tokio::test]
    async fn crawl_accumulates_sections_and_tallies() {
        let fetcher = Arc::new(
            crate::testing::StubFetcher::new()
                .with_page("/", 200, FIXTURE)
                .with_page("/about", 200, "<html><body><p>Founded by engineers.</p></body></html>"),
        );
        let crawler = Crawler::new("https://acme.io", fetcher, 10).unwrap();
        let result = crawler.crawl().await;

        assert_eq!(result.metadata.pages_successful, 2);
        assert!(result.metadata.pages_attempted >= 2);
        assert!(result.raw_content[&PageSection::Homepage].contains("Trusted by"));
        assert!(result.raw_content[&PageSection::About].contains("Founded by engineers"));
    }
}
