use crate::adapters::{HtmlSearchEngine, HttpContentFetcher, OpenAiCompatibleClient};
use crate::config::toml_config::{AppConfig, PipelineSettings};
use crate::core::pipeline_sequence::{DocumentContext, ProgressReporter, StageResult, StageSequence};
use crate::core::stages::{
    AssemblyStage, ConclusionStage, ContentScrapingStage, IndexGenerationStage,
    IntroductionStage, SectionDraftingStage, SummarizationStage, TopicDetectionStage,
    WebSearchStage,
};
use crate::domain::model::{AcademicDocument, DocumentRequest, Outline, SourceFailure, SourceSummary};
use crate::domain::ports::{ContentFetcher, LanguageModel, SearchEngine};
use crate::utils::error::{Result, ScholarError};
use crate::utils::validation::{require_http_url, require_text};
use std::sync::Arc;

/// 請求可覆寫的來源數上限
const MAX_SOURCES_CEILING: usize = 20;

/// 一次完整執行的產出
#[derive(Debug, Clone)]
pub struct DocumentRun {
    pub execution_id: String,
    pub document: AcademicDocument,
    pub outline: Outline,
    pub summaries: Vec<SourceSummary>,
    pub failures: Vec<SourceFailure>,
    pub results: Vec<StageResult>,
}

/// 文件生成流程：主題 → 搜尋 → 抓取 → 摘要 → 索引 → 引言 → 各節 → 結論 → 組裝
#[derive(Clone)]
pub struct DocumentPipeline {
    llm: Arc<dyn LanguageModel>,
    search: Arc<dyn SearchEngine>,
    fetcher: Arc<dyn ContentFetcher>,
    settings: PipelineSettings,
}

impl DocumentPipeline {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        search: Arc<dyn SearchEngine>,
        fetcher: Arc<dyn ContentFetcher>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            llm,
            search,
            fetcher,
            settings,
        }
    }

    /// 依設定建立實際的 HTTP 介接
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let llm = Arc::new(OpenAiCompatibleClient::new(config.llm.clone())?);
        let search = Arc::new(HtmlSearchEngine::new(
            config.search.clone(),
            &config.scraper.user_agent,
        )?);
        let fetcher = Arc::new(HttpContentFetcher::new(&config.scraper)?);
        Ok(Self::new(llm, search, fetcher, config.pipeline.clone()))
    }

    pub fn llm(&self) -> Arc<dyn LanguageModel> {
        Arc::clone(&self.llm)
    }

    pub fn search_engine(&self) -> Arc<dyn SearchEngine> {
        Arc::clone(&self.search)
    }

    pub fn fetcher(&self) -> Arc<dyn ContentFetcher> {
        Arc::clone(&self.fetcher)
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn validate_request(request: &DocumentRequest) -> Result<()> {
        require_text("prompt", &request.prompt)?;
        for url in &request.urls {
            require_http_url("urls", url)?;
        }
        if request.max_sources == Some(0) {
            return Err(ScholarError::ValidationError {
                message: "max_sources must be at least 1".to_string(),
            });
        }
        if request.sections == Some(0) {
            return Err(ScholarError::ValidationError {
                message: "sections must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn build_sequence(&self, execution_id: &str) -> StageSequence {
        let s = &self.settings;
        let mut sequence =
            StageSequence::new(execution_id.to_string()).with_monitoring(s.monitor);

        sequence.add_stage(Box::new(TopicDetectionStage::new(self.llm())));
        sequence.add_stage(Box::new(WebSearchStage::new(self.search_engine())));
        sequence.add_stage(Box::new(ContentScrapingStage::new(
            self.fetcher(),
            s.min_content_chars,
            s.max_content_chars,
            s.concurrent_requests,
        )));
        sequence.add_stage(Box::new(SummarizationStage::new(self.llm())));
        sequence.add_stage(Box::new(IndexGenerationStage::new(
            self.llm(),
            s.min_sections,
            s.max_sections,
        )));
        sequence.add_stage(Box::new(IntroductionStage::new(self.llm())));
        sequence.add_stage(Box::new(SectionDraftingStage::new(self.llm())));
        sequence.add_stage(Box::new(ConclusionStage::new(self.llm())));
        sequence.add_stage(Box::new(AssemblyStage));
        sequence
    }

    pub fn new_context(&self, execution_id: &str, request: DocumentRequest) -> DocumentContext {
        let language = request
            .language
            .clone()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| self.settings.language.clone());
        let max_sources = request
            .max_sources
            .unwrap_or(self.settings.max_sources)
            .clamp(1, MAX_SOURCES_CEILING);
        DocumentContext::new(execution_id.to_string(), request, language, max_sources)
    }

    pub async fn run(
        &self,
        execution_id: &str,
        request: DocumentRequest,
        progress: ProgressReporter,
    ) -> Result<DocumentRun> {
        Self::validate_request(&request)?;

        let sequence = self.build_sequence(execution_id);
        let mut context = self.new_context(execution_id, request);
        let results = sequence.execute_all(&mut context, &progress).await?;

        let summary = StageSequence::get_execution_summary(&results);
        tracing::info!("📈 Run {} summary: {:?}", execution_id, summary);

        let document = context.document.take().ok_or_else(|| ScholarError::ProcessingError {
            message: "pipeline finished without a document".to_string(),
        })?;
        let outline = context.outline.take().ok_or_else(|| ScholarError::ProcessingError {
            message: "pipeline finished without an index".to_string(),
        })?;

        Ok(DocumentRun {
            execution_id: execution_id.to_string(),
            document,
            outline,
            summaries: context.summaries,
            failures: context.failures,
            results,
        })
    }
}
