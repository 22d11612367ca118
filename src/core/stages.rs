use crate::core::assembly::assemble_document;
use crate::core::pipeline_sequence::{DocumentContext, ProgressReporter, Stage, StageOutcome};
use crate::core::prompts;
use crate::domain::model::{
    DraftedSection, Outline, OutlineSection, ScrapedSource, SearchResult, SourceFailure,
    SourceSummary, StageKind, TopicAnalysis,
};
use crate::domain::ports::{ContentFetcher, LanguageModel, SearchEngine};
use crate::utils::error::{Result, ScholarError};
use crate::utils::text::{extract_json_block, normalize_whitespace, parse_list_items, truncate_chars};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

fn stage_failure(stage: StageKind, details: impl Into<String>) -> ScholarError {
    ScholarError::StageError {
        stage: stage.to_string(),
        details: details.into(),
    }
}

// ---------------------------------------------------------------------------
// Topic detection
// ---------------------------------------------------------------------------

pub struct TopicDetectionStage {
    llm: Arc<dyn LanguageModel>,
}

impl TopicDetectionStage {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

#[derive(Deserialize)]
struct RawTopic {
    #[serde(default)]
    title: Option<String>,
    topic: String,
    #[serde(default)]
    search_query: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
}

/// 解析主題偵測的回應；非 JSON 時以第一個非空行作為主題
pub fn parse_topic(answer: &str) -> Option<TopicAnalysis> {
    if let Some(raw) = extract_json_block(answer)
        .and_then(|json| serde_json::from_str::<RawTopic>(json).ok())
    {
        let topic = normalize_whitespace(&raw.topic);
        if !topic.is_empty() {
            let search_query = raw
                .search_query
                .map(|q| normalize_whitespace(&q))
                .filter(|q| !q.is_empty())
                .unwrap_or_else(|| topic.clone());
            let title = raw
                .title
                .map(|t| normalize_whitespace(&t))
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| topic.clone());
            return Some(TopicAnalysis {
                title,
                topic,
                search_query,
                keywords: raw.keywords,
            });
        }
    }

    let line = answer
        .lines()
        .map(|l| normalize_whitespace(l.trim_matches(|c: char| c == '#' || c == '*' || c == '"')))
        .find(|l| !l.is_empty() && !l.starts_with('{') && !l.starts_with("```"))?;
    Some(topic_from_text(&line))
}

/// 使用者已指定主題時直接在本地建立分析結果
pub fn topic_from_text(topic: &str) -> TopicAnalysis {
    let topic = normalize_whitespace(topic);
    TopicAnalysis {
        title: topic.clone(),
        search_query: topic.clone(),
        topic,
        keywords: Vec::new(),
    }
}

#[async_trait::async_trait]
impl Stage for TopicDetectionStage {
    fn kind(&self) -> StageKind {
        StageKind::TopicDetection
    }

    fn should_execute(&self, context: &DocumentContext) -> bool {
        context
            .request
            .topic
            .as_deref()
            .map_or(true, |t| t.trim().is_empty())
    }

    fn on_skip(&self, context: &mut DocumentContext) {
        if let Some(topic) = &context.request.topic {
            context.topic = Some(topic_from_text(topic));
        }
    }

    async fn run(
        &self,
        context: &mut DocumentContext,
        _progress: &ProgressReporter,
    ) -> Result<StageOutcome> {
        let messages = prompts::topic_prompt(&context.request.prompt, &context.language);
        let answer = self.llm.complete(&messages).await?;

        let topic = parse_topic(&answer)
            .ok_or_else(|| stage_failure(self.kind(), "the model did not return a topic"))?;
        tracing::info!("🧭 Topic: {} (query: {})", topic.topic, topic.search_query);

        context.topic = Some(topic);
        Ok(StageOutcome::items(1))
    }
}

// ---------------------------------------------------------------------------
// Web search
// ---------------------------------------------------------------------------

pub struct WebSearchStage {
    search: Arc<dyn SearchEngine>,
}

impl WebSearchStage {
    pub fn new(search: Arc<dyn SearchEngine>) -> Self {
        Self { search }
    }
}

#[async_trait::async_trait]
impl Stage for WebSearchStage {
    fn kind(&self) -> StageKind {
        StageKind::WebSearch
    }

    fn should_execute(&self, context: &DocumentContext) -> bool {
        context.request.urls.is_empty()
    }

    /// 使用者提供的 URL 直接成為候選來源
    fn on_skip(&self, context: &mut DocumentContext) {
        context.search_results = context
            .request
            .urls
            .iter()
            .map(|url| SearchResult {
                title: url.clone(),
                url: url.clone(),
                snippet: String::new(),
            })
            .collect();
    }

    async fn run(
        &self,
        context: &mut DocumentContext,
        _progress: &ProgressReporter,
    ) -> Result<StageOutcome> {
        let query = context.require_topic()?.search_query.clone();
        // 多取一倍候選，預留抓取失敗的空間
        let limit = context.max_sources * 2;
        let results = self.search.search(&query, limit).await?;

        let mut seen = HashSet::new();
        let results: Vec<SearchResult> = results
            .into_iter()
            .filter(|r| seen.insert(r.url.clone()))
            .collect();

        if results.is_empty() {
            return Err(stage_failure(
                self.kind(),
                format!("no search results for \"{}\"", query),
            ));
        }

        let count = results.len();
        context.search_results = results;
        Ok(StageOutcome::items(count))
    }
}

// ---------------------------------------------------------------------------
// Content scraping
// ---------------------------------------------------------------------------

pub struct ContentScrapingStage {
    fetcher: Arc<dyn ContentFetcher>,
    min_content_chars: usize,
    max_content_chars: usize,
    concurrent_requests: usize,
}

impl ContentScrapingStage {
    pub fn new(
        fetcher: Arc<dyn ContentFetcher>,
        min_content_chars: usize,
        max_content_chars: usize,
        concurrent_requests: usize,
    ) -> Self {
        Self {
            fetcher,
            min_content_chars,
            max_content_chars,
            concurrent_requests: concurrent_requests.max(1),
        }
    }
}

#[async_trait::async_trait]
impl Stage for ContentScrapingStage {
    fn kind(&self) -> StageKind {
        StageKind::ContentScraping
    }

    async fn run(
        &self,
        context: &mut DocumentContext,
        progress: &ProgressReporter,
    ) -> Result<StageOutcome> {
        let candidates = context.search_results.clone();
        let mut remaining = candidates.iter();

        // 以批次抓取：每批只補足缺少的數量，結果維持候選順序
        while context.sources.len() < context.max_sources {
            let needed = context.max_sources - context.sources.len();
            let batch: Vec<SearchResult> = remaining.by_ref().take(needed).cloned().collect();
            if batch.is_empty() {
                break;
            }

            let fetched: Vec<_> = stream::iter(batch)
                .map(|candidate| {
                    let fetcher = Arc::clone(&self.fetcher);
                    async move {
                        let outcome = fetcher.fetch(&candidate.url).await;
                        (candidate, outcome)
                    }
                })
                .buffered(self.concurrent_requests)
                .collect()
                .await;

            for (candidate, outcome) in fetched {
                let page = match outcome {
                    Ok(page) => page,
                    Err(e) => {
                        let warning = context.record_failure(SourceFailure {
                            url: candidate.url.clone(),
                            stage: self.kind(),
                            reason: e.to_string(),
                        });
                        progress.warn(self.kind(), warning);
                        continue;
                    }
                };

                let length = page.content.chars().count();
                if length < self.min_content_chars {
                    let warning = context.record_failure(SourceFailure {
                        url: candidate.url.clone(),
                        stage: self.kind(),
                        reason: format!("content too short ({} chars)", length),
                    });
                    progress.warn(self.kind(), warning);
                    continue;
                }

                let title = if page.title == page.url && candidate.title != candidate.url {
                    candidate.title.clone()
                } else {
                    page.title
                };

                let id = context.sources.len() + 1;
                tracing::info!("📄 Source [{}]: {} ({} chars)", id, title, length);
                context.sources.push(ScrapedSource {
                    id,
                    title,
                    url: candidate.url.clone(),
                    site_name: page.site_name,
                    content: truncate_chars(&page.content, self.max_content_chars),
                    fetched_at: Utc::now(),
                });
            }
        }

        if context.sources.is_empty() {
            return Err(stage_failure(
                self.kind(),
                format!("none of the {} candidate pages could be used", candidates.len()),
            ));
        }

        Ok(StageOutcome::items(context.sources.len()))
    }
}

// ---------------------------------------------------------------------------
// Summarization ("fichamento")
// ---------------------------------------------------------------------------

pub struct SummarizationStage {
    llm: Arc<dyn LanguageModel>,
}

impl SummarizationStage {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

/// 將摘要回應拆成段落與重點清單
pub fn parse_summary(source: &ScrapedSource, answer: &str) -> SourceSummary {
    let key_points = parse_list_items(answer);
    let mut summary = answer
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter(|l| parse_list_items(l).is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if summary.is_empty() {
        summary = key_points.join("; ");
    }

    SourceSummary {
        source_id: source.id,
        title: source.title.clone(),
        url: source.url.clone(),
        summary,
        key_points,
    }
}

#[async_trait::async_trait]
impl Stage for SummarizationStage {
    fn kind(&self) -> StageKind {
        StageKind::Summarization
    }

    async fn run(
        &self,
        context: &mut DocumentContext,
        progress: &ProgressReporter,
    ) -> Result<StageOutcome> {
        let topic = context.require_topic()?.topic.clone();
        let sources = context.sources.clone();

        for source in &sources {
            let messages = prompts::summary_prompt(&topic, source, &context.language);
            match self.llm.complete(&messages).await {
                Ok(answer) => {
                    tracing::info!("📝 Fichamento ready for source [{}]", source.id);
                    context.summaries.push(parse_summary(source, &answer));
                }
                Err(e) => {
                    let warning = context.record_failure(SourceFailure {
                        url: source.url.clone(),
                        stage: self.kind(),
                        reason: e.to_string(),
                    });
                    progress.warn(self.kind(), warning);
                }
            }
        }

        if context.summaries.is_empty() {
            return Err(stage_failure(self.kind(), "no source could be summarized"));
        }
        Ok(StageOutcome::items(context.summaries.len()))
    }
}

// ---------------------------------------------------------------------------
// Index generation
// ---------------------------------------------------------------------------

pub struct IndexGenerationStage {
    llm: Arc<dyn LanguageModel>,
    min_sections: usize,
    max_sections: usize,
}

impl IndexGenerationStage {
    pub fn new(llm: Arc<dyn LanguageModel>, min_sections: usize, max_sections: usize) -> Self {
        Self {
            llm,
            min_sections,
            max_sections: max_sections.max(min_sections),
        }
    }

    /// 實際要求的節數：請求指定時夾在設定範圍內
    fn bounds(&self, requested: Option<usize>) -> (usize, usize) {
        match requested {
            Some(n) => {
                let n = n.clamp(self.min_sections, self.max_sections);
                (n, n)
            }
            None => (self.min_sections, self.max_sections),
        }
    }
}

#[derive(Deserialize)]
struct RawOutline {
    #[serde(default)]
    title: Option<String>,
    sections: Vec<RawSection>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSection {
    Detailed {
        title: String,
        #[serde(default)]
        description: String,
    },
    Plain(String),
}

/// 引言與結論另外撰寫，不應出現在索引中
fn is_framing_section(title: &str) -> bool {
    let lower = title.to_lowercase();
    ["introdu", "conclus", "considerações finais", "final remarks"]
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

/// 解析索引回應；JSON 失敗時改讀編號或項目符號清單
pub fn parse_outline(answer: &str, fallback_title: &str) -> Outline {
    let parsed = extract_json_block(answer).and_then(|json| {
        serde_json::from_str::<RawOutline>(json).ok().or_else(|| {
            serde_json::from_str::<Vec<RawSection>>(json)
                .ok()
                .map(|sections| RawOutline {
                    title: None,
                    sections,
                })
        })
    });

    let (title, sections) = match parsed {
        Some(raw) => (
            raw.title,
            raw.sections
                .into_iter()
                .map(|s| match s {
                    RawSection::Detailed { title, description } => OutlineSection {
                        title: normalize_whitespace(&title),
                        description: normalize_whitespace(&description),
                    },
                    RawSection::Plain(title) => OutlineSection {
                        title: normalize_whitespace(&title),
                        description: String::new(),
                    },
                })
                .collect::<Vec<_>>(),
        ),
        None => (
            None,
            parse_list_items(answer)
                .into_iter()
                .map(|title| OutlineSection {
                    title,
                    description: String::new(),
                })
                .collect(),
        ),
    };

    Outline {
        title: title
            .map(|t| normalize_whitespace(&t))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| fallback_title.to_string()),
        sections: sections
            .into_iter()
            .filter(|s| !s.title.is_empty() && !is_framing_section(&s.title))
            .collect(),
    }
}

#[async_trait::async_trait]
impl Stage for IndexGenerationStage {
    fn kind(&self) -> StageKind {
        StageKind::IndexGeneration
    }

    async fn run(
        &self,
        context: &mut DocumentContext,
        progress: &ProgressReporter,
    ) -> Result<StageOutcome> {
        let topic = context.require_topic()?.clone();
        let (min, max) = self.bounds(context.request.sections);

        let messages =
            prompts::outline_prompt(&topic, &context.summaries, min, max, &context.language);
        let answer = self.llm.complete(&messages).await?;
        let mut outline = parse_outline(&answer, &topic.title);

        if outline.sections.len() > max {
            let warning = context.record_warning(format!(
                "index had {} sections, keeping the first {}",
                outline.sections.len(),
                max
            ));
            progress.warn(self.kind(), warning);
            outline.sections.truncate(max);
        }
        if outline.sections.len() < min {
            return Err(stage_failure(
                self.kind(),
                format!(
                    "index has {} section(s), at least {} required",
                    outline.sections.len(),
                    min
                ),
            ));
        }

        tracing::info!("🗂️ Index with {} sections: {}", outline.sections.len(), outline.title);
        let count = outline.sections.len();
        context.outline = Some(outline);
        Ok(StageOutcome::items(count))
    }
}

// ---------------------------------------------------------------------------
// Introduction
// ---------------------------------------------------------------------------

pub struct IntroductionStage {
    llm: Arc<dyn LanguageModel>,
}

impl IntroductionStage {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

#[async_trait::async_trait]
impl Stage for IntroductionStage {
    fn kind(&self) -> StageKind {
        StageKind::Introduction
    }

    async fn run(
        &self,
        context: &mut DocumentContext,
        _progress: &ProgressReporter,
    ) -> Result<StageOutcome> {
        let messages = prompts::introduction_prompt(
            context.require_topic()?,
            context.require_outline()?,
            &context.summaries,
            &context.language,
        );
        let introduction = self.llm.complete(&messages).await?;
        context.introduction = Some(introduction);
        Ok(StageOutcome::items(1))
    }
}

// ---------------------------------------------------------------------------
// Section drafting
// ---------------------------------------------------------------------------

pub struct SectionDraftingStage {
    llm: Arc<dyn LanguageModel>,
}

impl SectionDraftingStage {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

#[async_trait::async_trait]
impl Stage for SectionDraftingStage {
    fn kind(&self) -> StageKind {
        StageKind::SectionDrafting
    }

    async fn run(
        &self,
        context: &mut DocumentContext,
        progress: &ProgressReporter,
    ) -> Result<StageOutcome> {
        let topic = context.require_topic()?.clone();
        let outline = context.require_outline()?.clone();
        let total = outline.sections.len();

        for (position, section) in outline.sections.iter().enumerate() {
            let written: Vec<String> = context.sections.iter().map(|s| s.title.clone()).collect();
            let messages = prompts::section_prompt(
                &topic,
                &outline,
                position,
                &written,
                &context.summaries,
                &context.language,
            );

            match self.llm.complete(&messages).await {
                Ok(body) => {
                    tracing::info!("✍️ Section {}/{} drafted: {}", position + 1, total, section.title);
                    let index = context.sections.len() + 1;
                    context.sections.push(DraftedSection {
                        index,
                        title: section.title.clone(),
                        body,
                    });
                }
                Err(e) => {
                    let warning = context.record_warning(format!(
                        "section \"{}\" was left out: {}",
                        section.title, e
                    ));
                    progress.warn(self.kind(), warning);
                }
            }
        }

        if context.sections.is_empty() {
            return Err(stage_failure(self.kind(), "no section could be drafted"));
        }
        Ok(StageOutcome::items(context.sections.len()))
    }
}

// ---------------------------------------------------------------------------
// Conclusion
// ---------------------------------------------------------------------------

pub struct ConclusionStage {
    llm: Arc<dyn LanguageModel>,
}

impl ConclusionStage {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

#[async_trait::async_trait]
impl Stage for ConclusionStage {
    fn kind(&self) -> StageKind {
        StageKind::Conclusion
    }

    async fn run(
        &self,
        context: &mut DocumentContext,
        _progress: &ProgressReporter,
    ) -> Result<StageOutcome> {
        let messages = prompts::conclusion_prompt(
            context.require_topic()?,
            context.require_outline()?,
            &context.sections,
            &context.language,
        );
        let conclusion = self.llm.complete(&messages).await?;
        context.conclusion = Some(conclusion);
        Ok(StageOutcome::items(1))
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

pub struct AssemblyStage;

#[async_trait::async_trait]
impl Stage for AssemblyStage {
    fn kind(&self) -> StageKind {
        StageKind::Assembly
    }

    async fn run(
        &self,
        context: &mut DocumentContext,
        _progress: &ProgressReporter,
    ) -> Result<StageOutcome> {
        let document = assemble_document(context)?;
        tracing::info!(
            "📚 Document assembled: {} sections, {} references",
            document.sections.len(),
            document.references.len()
        );
        let count = document.sections.len();
        context.document = Some(document);
        Ok(StageOutcome::items(count))
    }
}
