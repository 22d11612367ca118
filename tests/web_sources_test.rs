use httpmock::prelude::*;
use scholar_pipeline::adapters::{HtmlSearchEngine, HttpContentFetcher};
use scholar_pipeline::config::toml_config::{ScraperConfig, SearchConfig};
use scholar_pipeline::domain::ports::{ContentFetcher, SearchEngine};
use scholar_pipeline::ScholarError;

fn search_engine(server: &MockServer, max_results: usize) -> HtmlSearchEngine {
    HtmlSearchEngine::new(
        SearchConfig {
            endpoint: server.url("/html/"),
            max_results,
            timeout_seconds: 5,
            ..SearchConfig::default()
        },
        "scholar-test",
    )
    .unwrap()
}

fn fetcher() -> HttpContentFetcher {
    HttpContentFetcher::new(&ScraperConfig {
        timeout_seconds: 5,
        ..ScraperConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_search_sends_query_and_parses_results() {
    let server = MockServer::start_async().await;
    let page = format!(
        r#"<html><body>
        <div class="result">
          <a class="result__a" href="/l/?uddg={target}&rut=1">Heat islands explained</a>
          <a class="result__snippet">Why cities are warmer.</a>
        </div>
        <div class="result">
          <a class="result__a" href="https://www.facebook.com/groups/heat">Group</a>
        </div>
        <div class="result">
          <a class="result__a" href="https://example.org/second">Second</a>
        </div>
        <div class="result">
          <a class="result__a" href="https://example.org/third">Third</a>
        </div>
        </body></html>"#,
        target = "https%3A%2F%2Fexample.org%2Fheat"
    );
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/html/")
                .query_param("q", "urban heat island")
                .header("user-agent", "scholar-test");
            then.status(200)
                .header("content-type", "text/html; charset=utf-8")
                .body(page);
        })
        .await;

    let results = search_engine(&server, 10)
        .search("urban heat island", 2)
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].url, "https://example.org/heat");
    assert_eq!(results[0].title, "Heat islands explained");
    assert_eq!(results[0].snippet, "Why cities are warmer.");
    assert_eq!(results[1].url, "https://example.org/second");
}

#[tokio::test]
async fn test_search_limit_is_capped_by_config() {
    let server = MockServer::start_async().await;
    let page = format!(
        "<html><body>{}</body></html>",
        (1..=5)
            .map(|i| format!(
                r#"<div class="result"><a class="result__a" href="https://example.org/{i}">R{i}</a></div>"#
            ))
            .collect::<String>()
    );
    server
        .mock_async(|when, then| {
            when.method(GET).path("/html/");
            then.status(200).header("content-type", "text/html").body(page);
        })
        .await;

    let results = search_engine(&server, 3).search("heat", 10).await.unwrap();
    assert_eq!(results.len(), 3);
}

#[tokio::test]
async fn test_search_endpoint_failure() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/html/");
            then.status(503);
        })
        .await;

    let err = search_engine(&server, 10).search("anything", 5).await.unwrap_err();
    assert!(matches!(err, ScholarError::SearchError { .. }));
}

#[tokio::test]
async fn test_fetch_extracts_article_text() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/articles/heat");
            then.status(200)
                .header("content-type", "text/html; charset=utf-8")
                .body(
                    r#"<html>
                    <head>
                      <title>Urban heat | Climate Weekly</title>
                      <meta property="og:site_name" content="Climate Weekly">
                    </head>
                    <body>
                      <nav><p>Home</p><p>Subscribe</p></nav>
                      <article>
                        <h1>Urban heat</h1>
                        <p>Dark surfaces absorb sunlight.</p>
                        <script>track()</script>
                        <p>Trees provide shade and evaporative cooling.</p>
                      </article>
                      <footer><p>Copyright</p></footer>
                    </body></html>"#,
                );
        })
        .await;

    let url = server.url("/articles/heat");
    let page = fetcher().fetch(&url).await.unwrap();

    assert_eq!(page.url, url);
    assert_eq!(page.title, "Urban heat | Climate Weekly");
    assert_eq!(page.site_name.as_deref(), Some("Climate Weekly"));
    assert_eq!(
        page.content,
        "Urban heat\n\nDark surfaces absorb sunlight.\n\nTrees provide shade and evaporative cooling."
    );
}

#[tokio::test]
async fn test_fetch_rejects_errors_and_binary_content() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/missing");
            then.status(404).body("not here");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/paper.pdf");
            then.status(200)
                .header("content-type", "application/pdf")
                .body("%PDF-1.7");
        })
        .await;

    let err = fetcher().fetch(&server.url("/missing")).await.unwrap_err();
    match err {
        ScholarError::ScrapeError { reason, .. } => assert!(reason.contains("404")),
        other => panic!("unexpected error: {other:?}"),
    }

    let err = fetcher().fetch(&server.url("/paper.pdf")).await.unwrap_err();
    match err {
        ScholarError::ScrapeError { reason, .. } => assert!(reason.contains("application/pdf")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_rejects_oversized_body() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/huge");
            then.status(200)
                .header("content-type", "text/plain")
                .body("x".repeat(500));
        })
        .await;

    let fetcher = HttpContentFetcher::new(&ScraperConfig {
        timeout_seconds: 5,
        max_body_bytes: 100,
        ..ScraperConfig::default()
    })
    .unwrap();

    let err = fetcher.fetch(&server.url("/huge")).await.unwrap_err();
    match err {
        ScholarError::ScrapeError { reason, .. } => assert!(reason.contains("too large")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_plain_text() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/notes.txt");
            then.status(200)
                .header("content-type", "text/plain")
                .body("Line one.\n\n   Line two.");
        })
        .await;

    let url = server.url("/notes.txt");
    let page = fetcher().fetch(&url).await.unwrap();

    assert_eq!(page.title, url);
    assert_eq!(page.site_name.as_deref(), Some("127.0.0.1"));
    assert_eq!(page.content, "Line one. Line two.");
}
