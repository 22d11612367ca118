use crate::config::toml_config::ScraperConfig;
use crate::domain::model::FetchedPage;
use crate::domain::ports::ContentFetcher;
use crate::utils::error::{Result, ScholarError};
use crate::utils::text::normalize_whitespace;
use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Node, Selector};
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;

static CONTAINERS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    ["article", "main", "body"]
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect()
});
static BLOCKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p, h1, h2, h3, h4, li, blockquote").unwrap());
static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static OG_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:title"]"#).unwrap());
static OG_SITE_NAME: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:site_name"]"#).unwrap());

const SKIPPED_TAGS: [&str; 5] = ["script", "style", "noscript", "nav", "footer"];

/// 下載網頁並擷取可閱讀的正文
pub struct HttpContentFetcher {
    client: Client,
    max_body_bytes: usize,
}

impl HttpContentFetcher {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
        })
    }

    /// 逐塊讀取回應，超過上限的部分直接捨棄
    async fn read_body(&self, url: &str, mut response: reqwest::Response) -> Result<String> {
        if let Some(length) = response.content_length() {
            if length > self.max_body_bytes as u64 {
                return Err(ScholarError::ScrapeError {
                    url: url.to_string(),
                    reason: format!("body too large ({} bytes)", length),
                });
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let room = self.max_body_bytes - body.len();
            if chunk.len() >= room {
                body.extend_from_slice(&chunk[..room]);
                tracing::debug!("✂️ Body of {} cut at {} bytes", url, self.max_body_bytes);
                break;
            }
            body.extend_from_slice(&chunk);
        }
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

/// 從 HTML 擷取標題、網站名稱與正文
pub fn extract_page(url: &str, html: &str) -> FetchedPage {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE)
        .next()
        .map(|t| normalize_whitespace(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .or_else(|| meta_content(&document, &OG_TITLE))
        .unwrap_or_else(|| url.to_string());

    let site_name = meta_content(&document, &OG_SITE_NAME).or_else(|| {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
    });

    let content = CONTAINERS
        .iter()
        .find_map(|sel| document.select(sel).next())
        .map(container_text)
        .unwrap_or_default();

    FetchedPage {
        url: url.to_string(),
        title,
        site_name,
        content,
    }
}

fn meta_content(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .and_then(|m| m.value().attr("content"))
        .map(normalize_whitespace)
        .filter(|s| !s.is_empty())
}

/// 優先取段落類元素；沒有時退回整個容器的文字
fn container_text(container: ElementRef<'_>) -> String {
    let blocks: Vec<String> = container
        .select(&BLOCKS)
        .filter(|el| !inside_skipped(*el))
        // 巢狀的 li > p 只保留最內層，避免重複
        .filter(|el| el.select(&BLOCKS).next().is_none())
        .map(visible_text)
        .filter(|t| !t.is_empty())
        .collect();

    if !blocks.is_empty() {
        return blocks.join("\n\n");
    }
    visible_text(container)
}

fn inside_skipped(element: ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| SKIPPED_TAGS.contains(&a.value().name()))
}

fn visible_text(element: ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    for node in element.descendants() {
        if let Node::Text(text) = node.value() {
            let hidden = node
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|a| SKIPPED_TAGS.contains(&a.value().name()));
            if !hidden {
                parts.push(&**text);
            }
        }
    }
    normalize_whitespace(&parts.join(" "))
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        tracing::debug!("🌐 Fetching {}", url);

        let response = self
            .client
            .get(url)
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml;q=0.9,text/plain;q=0.8",
            )
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScholarError::ScrapeError {
                url: url.to_string(),
                reason: format!("HTTP {}", status),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_ascii_lowercase();
        if !(content_type.contains("html") || content_type.starts_with("text/")) {
            return Err(ScholarError::ScrapeError {
                url: url.to_string(),
                reason: format!("unsupported content type: {}", content_type),
            });
        }

        let body = self.read_body(url, response).await?;
        let page = if content_type.contains("html") {
            extract_page(url, &body)
        } else {
            FetchedPage {
                url: url.to_string(),
                title: url.to_string(),
                site_name: Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)),
                content: normalize_whitespace(&body),
            }
        };

        tracing::debug!("🌐 Extracted {} chars from {}", page.content.chars().count(), url);
        Ok(page)
    }
}
