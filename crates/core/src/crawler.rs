//! Fetches a URL and reduces it to clean markdown, stripping navigational
//! chrome that would otherwise pollute chunking and retrieval.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use regex::Regex;
use tracing::{debug, info, instrument, warn};
use websearch_qa_common::WebDocumentContent;

const MAX_CONTENT_CHARS: usize = 50_000;
const STRIPPED_TAGS: [&str; 4] = ["script", "style", "nav", "footer"];
const CRAWL_TIMEOUT: Duration = Duration::from_secs(10);
const JITTER_MIN_MS: u64 = 500;
const JITTER_MAX_MS: u64 = 2_000;

/// Rotated per-request so repeated crawls against the same host don't all
/// present an identical fingerprint.
const USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
];

#[async_trait]
pub trait PageCrawler: Send + Sync {
    async fn crawl(&self, url: &str) -> anyhow::Result<WebDocumentContent>;
}

/// Fetches raw HTML for a URL. Split out from [`PageCrawler`] so tests can
/// substitute canned HTML without a live network fetch.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> anyhow::Result<String>;
}

#[derive(Debug, Clone)]
pub struct ReqwestPageFetcher {
    client: reqwest::Client,
}

impl Default for ReqwestPageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ReqwestPageFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(CRAWL_TIMEOUT)
                .build()
                .expect("static client config is always valid"),
        }
    }
}

#[async_trait]
impl PageFetcher for ReqwestPageFetcher {
    #[instrument(skip(self), fields(url))]
    async fn fetch(&self, url: &str) -> anyhow::Result<String> {
        let user_agent = USER_AGENTS[rand::thread_rng().gen_range(0..USER_AGENTS.len())];
        let html = self
            .client
            .get(url)
            .header("User-Agent", user_agent)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(html)
    }
}

/// Strips navigational chrome from HTML and converts what remains to
/// markdown, truncated to [`MAX_CONTENT_CHARS`].
pub struct HeadlessCrawler<F: PageFetcher> {
    fetcher: F,
}

impl HeadlessCrawler<ReqwestPageFetcher> {
    pub fn new() -> Self {
        Self {
            fetcher: ReqwestPageFetcher::new(),
        }
    }
}

impl Default for HeadlessCrawler<ReqwestPageFetcher> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: PageFetcher> HeadlessCrawler<F> {
    pub fn with_fetcher(fetcher: F) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl<F: PageFetcher> PageCrawler for HeadlessCrawler<F> {
    #[instrument(skip(self), fields(url))]
    async fn crawl(&self, url: &str) -> anyhow::Result<WebDocumentContent> {
        let jitter_ms = rand::thread_rng().gen_range(JITTER_MIN_MS..=JITTER_MAX_MS);
        tokio::time::sleep(Duration::from_millis(jitter_ms)).await;

        let html = match tokio::time::timeout(CRAWL_TIMEOUT, self.fetcher.fetch(url)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(url, "crawl exceeded the per-URL timeout");
                anyhow::bail!("timed out crawling {url}");
            }
        };
        if html.is_empty() {
            warn!(url, "crawl returned empty content");
            anyhow::bail!("empty content for {url}");
        }

        let cleaned = strip_chrome(&html);
        let cleaned = strip_links_and_images(&cleaned);
        let mut markdown = html2text::from_read(cleaned.as_bytes(), usize::MAX);
        markdown.truncate(MAX_CONTENT_CHARS);

        debug!(url, bytes = markdown.len(), "crawled and converted to markdown");
        info!(url, "crawl succeeded");

        let crawl_datetime = Utc::now();
        let document_id = WebDocumentContent::compute_document_id(url, crawl_datetime);

        Ok(WebDocumentContent {
            url: url.to_string(),
            markdown,
            crawl_datetime,
            metadata: Default::default(),
            document_id,
        })
    }
}

fn strip_chrome(html: &str) -> String {
    let mut cleaned = html.to_string();
    for tag in STRIPPED_TAGS {
        let pattern = format!(r"(?is)<{tag}[^>]*>.*?</{tag}>");
        let re = Regex::new(&pattern).expect("static tag pattern is always valid");
        cleaned = re.replace_all(&cleaned, "").into_owned();
    }
    cleaned
}

/// Drops `<img>` tags and unwraps `<a>` tags to their inner text, mirroring
/// `html2text.ignore_images`/`ignore_links` on the source this was ported
/// from, so converted markdown never carries link or image artifacts into
/// chunking, BM25 tokenization, or the LLM context.
fn strip_links_and_images(html: &str) -> String {
    let img_re = Regex::new(r"(?is)<img\b[^>]*>").expect("static tag pattern is always valid");
    let without_images = img_re.replace_all(html, "");

    let anchor_re = Regex::new(r"(?is)<a\b[^>]*>(.*?)</a>").expect("static tag pattern is always valid");
    anchor_re.replace_all(&without_images, "$1").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixtureFetcher(String);

    #[async_trait]
    impl PageFetcher for FixtureFetcher {
        async fn fetch(&self, _url: &str) -> anyhow::Result<String> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn crawl_converts_html_to_markdown() {
        let html = "<html><body><script>evil()</script><p>Hello world</p></body></html>";
        let crawler = HeadlessCrawler::with_fetcher(FixtureFetcher(html.to_string()));
        let content = crawler.crawl("https://example.com").await.unwrap();
        assert!(content.markdown.contains("Hello world"));
    }

    #[tokio::test]
    async fn crawl_truncates_to_max_content_chars() {
        let long_paragraph = "word ".repeat(20_000);
        let html = format!("<html><body><p>{long_paragraph}</p></body></html>");
        let crawler = HeadlessCrawler::with_fetcher(FixtureFetcher(html));
        let content = crawler.crawl("https://example.com").await.unwrap();
        assert!(content.markdown.len() <= MAX_CONTENT_CHARS);
    }

    #[tokio::test]
    async fn crawl_strips_links_and_images() {
        let html = "<html><body><p>See <a href=\"https://other.example\">the docs</a> \
                     for more.</p><img src=\"https://example.com/pic.png\" alt=\"diagram\"></body></html>";
        let crawler = HeadlessCrawler::with_fetcher(FixtureFetcher(html.to_string()));
        let content = crawler.crawl("https://example.com").await.unwrap();
        assert!(content.markdown.contains("the docs"));
        assert!(!content.markdown.contains("https://other.example"));
        assert!(!content.markdown.contains("pic.png"));
    }

    #[tokio::test]
    async fn crawl_populates_url_and_document_id() {
        let crawler = HeadlessCrawler::with_fetcher(FixtureFetcher("<p>hello</p>".to_string()));
        let content = crawler.crawl("https://example.com/page").await.unwrap();
        assert_eq!(content.url, "https://example.com/page");
        assert_eq!(
            content.document_id,
            WebDocumentContent::compute_document_id("https://example.com/page", content.crawl_datetime)
        );
    }

    #[tokio::test]
    async fn crawl_rejects_empty_content() {
        let crawler = HeadlessCrawler::with_fetcher(FixtureFetcher(String::new()));
        assert!(crawler.crawl("https://example.com").await.is_err());
    }
}
