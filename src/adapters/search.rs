use crate::config::toml_config::SearchConfig;
use crate::domain::model::SearchResult;
use crate::domain::ports::SearchEngine;
use crate::utils::error::{Result, ScholarError};
use crate::utils::text::normalize_whitespace;
use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

/// 抓取 HTML 搜尋結果頁並以 CSS 選擇器解析
pub struct HtmlSearchEngine {
    client: Client,
    config: SearchConfig,
}

impl HtmlSearchEngine {
    pub fn new(config: SearchConfig, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { client, config })
    }

    fn selector(&self, field: &str, css: &str) -> Result<Selector> {
        Selector::parse(css).map_err(|e| ScholarError::InvalidConfigValueError {
            field: field.to_string(),
            value: css.to_string(),
            reason: format!("Invalid CSS selector: {}", e),
        })
    }

    /// 解析結果頁；純函式，方便在沒有網路時測試
    pub fn parse_results(&self, html: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let base = Url::parse(&self.config.endpoint).map_err(|e| {
            ScholarError::InvalidConfigValueError {
                field: "search.endpoint".to_string(),
                value: self.config.endpoint.clone(),
                reason: e.to_string(),
            }
        })?;
        let result_sel = self.selector("search.result_selector", &self.config.result_selector)?;
        let title_sel = self.selector("search.title_selector", &self.config.title_selector)?;
        let link_sel = self.selector("search.link_selector", &self.config.link_selector)?;
        let snippet_sel =
            self.selector("search.snippet_selector", &self.config.snippet_selector)?;

        let document = Html::parse_document(html);
        let mut seen = HashSet::new();
        let mut results = Vec::new();

        for node in document.select(&result_sel) {
            if results.len() >= limit {
                break;
            }

            let Some(href) = node
                .select(&link_sel)
                .next()
                .and_then(|a| a.value().attr("href"))
            else {
                continue;
            };
            let Some(url) = resolve_result_link(&base, href) else {
                tracing::debug!("🔎 Skipping unusable result link: {}", href);
                continue;
            };
            if self.is_excluded(&url) {
                tracing::debug!("🔎 Skipping excluded domain: {}", url);
                continue;
            }

            let url_key = url.to_string();
            if !seen.insert(url_key.clone()) {
                continue;
            }

            let title = node
                .select(&title_sel)
                .next()
                .map(element_text)
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| url_key.clone());
            let snippet = node
                .select(&snippet_sel)
                .next()
                .map(element_text)
                .unwrap_or_default();

            results.push(SearchResult {
                title,
                url: url_key,
                snippet,
            });
        }

        Ok(results)
    }

    fn is_excluded(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return true;
        };
        self.config
            .excluded_domains
            .iter()
            .any(|d| host == d || host.ends_with(&format!(".{}", d)))
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// 將結果連結轉為絕對網址；解開帶有 `uddg` 參數的跳轉連結並移除 fragment
fn resolve_result_link(base: &Url, href: &str) -> Option<Url> {
    let mut url = base.join(href).ok()?;

    let redirect_target = url
        .query_pairs()
        .find(|(k, _)| k == "uddg")
        .map(|(_, v)| v.into_owned());
    if let Some(target) = redirect_target {
        url = Url::parse(&target).ok()?;
    }

    match url.scheme() {
        "http" | "https" => {
            url.set_fragment(None);
            Some(url)
        }
        _ => None,
    }
}

#[async_trait]
impl SearchEngine for HtmlSearchEngine {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        if limit > self.config.max_results {
            tracing::warn!(
                "⚠️ Requested {} search results but search.max_results caps it at {}",
                limit,
                self.config.max_results
            );
        }
        let limit = limit.min(self.config.max_results);
        tracing::info!("🔎 Searching for \"{}\" (limit {})", query, limit);

        let response = self
            .client
            .get(&self.config.endpoint)
            .query(&[(self.config.query_param.as_str(), query)])
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ScholarError::SearchError {
                message: format!("search endpoint returned {}", response.status()),
            });
        }

        let html = response.text().await?;
        let results = self.parse_results(&html, limit)?;
        tracing::info!("🔎 Found {} results", results.len());
        Ok(results)
    }
}
