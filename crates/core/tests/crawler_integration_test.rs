//! End-to-end crawler tests against a real HTTP server (wiremock), exercising
//! the full `ReqwestPageFetcher` + `HeadlessCrawler` path rather than a
//! canned-HTML stub.

use websearch_qa_core::crawler::{HeadlessCrawler, PageCrawler, ReqwestPageFetcher};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn crawls_live_server_and_strips_navigational_chrome() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rust/async"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<html><body>\
             <nav>Home | Docs | Blog</nav>\
             <h1>Async Functions in Rust</h1>\
             <p>Async functions let you write non-blocking code.</p>\
             <footer>Copyright 2026</footer>\
             </body></html>",
        ))
        .mount(&server)
        .await;

    let crawler = HeadlessCrawler::with_fetcher(ReqwestPageFetcher::new());
    let content = crawler.crawl(&format!("{}/rust/async", server.uri())).await.unwrap();

    assert!(content.markdown.contains("Async Functions in Rust"));
    assert!(!content.markdown.contains("Home | Docs | Blog"));
    assert!(!content.markdown.contains("Copyright 2026"));
}

#[tokio::test]
async fn crawl_fails_on_http_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let crawler = HeadlessCrawler::with_fetcher(ReqwestPageFetcher::new());
    let result = crawler.crawl(&format!("{}/missing", server.uri())).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn crawl_times_out_on_a_slow_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("eventually")
                .set_delay(std::time::Duration::from_secs(15)),
        )
        .mount(&server)
        .await;

    let crawler = HeadlessCrawler::with_fetcher(ReqwestPageFetcher::new());
    let result = tokio::time::timeout(
        std::time::Duration::from_secs(12),
        crawler.crawl(&format!("{}/slow", server.uri())),
    )
    .await
    .expect("crawl itself must enforce the 10s per-URL timeout, not hang the test");
    assert!(result.is_err());
}
