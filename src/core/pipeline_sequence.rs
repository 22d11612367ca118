use crate::domain::model::{
    AcademicDocument, DocumentRequest, DraftedSection, Outline, ProgressEvent, ProgressStatus,
    ScrapedSource, SearchResult, SourceFailure, SourceSummary, StageKind, TopicAnalysis,
};
use crate::utils::error::{Result, ScholarError};
use crate::utils::monitor::SystemMonitor;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// 單一階段的執行結果
#[derive(Debug, Clone)]
pub struct StageResult {
    pub stage: StageKind,
    pub items: usize,
    pub duration: Duration,
    pub warnings: Vec<String>,
}

/// 階段回報給序列執行器的內容；警告一律記錄在 `DocumentContext::warnings`
#[derive(Debug, Clone, Default)]
pub struct StageOutcome {
    pub items: usize,
}

impl StageOutcome {
    pub fn items(items: usize) -> Self {
        Self { items }
    }
}

/// 文件生成上下文，在階段之間累積狀態
#[derive(Debug, Clone)]
pub struct DocumentContext {
    pub execution_id: String,
    pub request: DocumentRequest,
    pub language: String,
    pub max_sources: usize,
    pub started_at: DateTime<Utc>,
    pub topic: Option<TopicAnalysis>,
    pub search_results: Vec<SearchResult>,
    pub sources: Vec<ScrapedSource>,
    pub summaries: Vec<SourceSummary>,
    pub outline: Option<Outline>,
    pub introduction: Option<String>,
    pub sections: Vec<DraftedSection>,
    pub conclusion: Option<String>,
    pub document: Option<AcademicDocument>,
    pub failures: Vec<SourceFailure>,
    pub warnings: Vec<String>,
}

impl DocumentContext {
    pub fn new(
        execution_id: String,
        request: DocumentRequest,
        language: String,
        max_sources: usize,
    ) -> Self {
        Self {
            execution_id,
            request,
            language,
            max_sources,
            started_at: Utc::now(),
            topic: None,
            search_results: Vec::new(),
            sources: Vec::new(),
            summaries: Vec::new(),
            outline: None,
            introduction: None,
            sections: Vec::new(),
            conclusion: None,
            document: None,
            failures: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn require_topic(&self) -> Result<&TopicAnalysis> {
        self.topic.as_ref().ok_or_else(|| ScholarError::ProcessingError {
            message: "topic has not been determined".to_string(),
        })
    }

    pub fn require_outline(&self) -> Result<&Outline> {
        self.outline.as_ref().ok_or_else(|| ScholarError::ProcessingError {
            message: "index has not been generated".to_string(),
        })
    }

    /// 記錄可容忍的單項失敗，同時轉為警告訊息
    pub fn record_failure(&mut self, failure: SourceFailure) -> String {
        let warning = format!("{}: {} ({})", failure.stage, failure.url, failure.reason);
        self.failures.push(failure);
        self.warnings.push(warning.clone());
        warning
    }

    /// 沒有 URL 的單項失敗（例如某一節撰寫失敗）
    pub fn record_warning(&mut self, warning: String) -> String {
        self.warnings.push(warning.clone());
        warning
    }
}

/// 進度回報；沒有接收端時所有事件僅寫入日誌
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    sender: Option<mpsc::UnboundedSender<ProgressEvent>>,
    percent: Arc<AtomicU8>,
}

impl ProgressReporter {
    pub fn new(sender: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self {
            sender: Some(sender),
            percent: Arc::new(AtomicU8::new(0)),
        }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn percent(&self) -> u8 {
        self.percent.load(Ordering::Relaxed)
    }

    fn set_percent(&self, percent: u8) {
        self.percent.store(percent.min(100), Ordering::Relaxed);
    }

    pub fn emit(&self, stage: StageKind, status: ProgressStatus, message: impl Into<String>) {
        let event = ProgressEvent {
            stage,
            status,
            message: message.into(),
            percent: self.percent(),
            at: Utc::now(),
        };
        if let Some(sender) = &self.sender {
            // 接收端已關閉代表沒有人在等候進度，忽略即可
            let _ = sender.send(event);
        }
    }

    pub fn warn(&self, stage: StageKind, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("⚠️ {}: {}", stage, message);
        self.emit(stage, ProgressStatus::Warning, message);
    }
}

/// 文件生成的單一階段
#[async_trait::async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    /// 根據上下文決定是否執行
    fn should_execute(&self, _context: &DocumentContext) -> bool {
        true
    }

    /// 被跳過時在本地補上後續階段需要的狀態
    fn on_skip(&self, _context: &mut DocumentContext) {}

    async fn run(
        &self,
        context: &mut DocumentContext,
        progress: &ProgressReporter,
    ) -> Result<StageOutcome>;
}

/// 階段序列，依序執行並把結果累積到上下文
pub struct StageSequence {
    stages: Vec<Box<dyn Stage>>,
    monitor: Option<SystemMonitor>,
    execution_id: String,
}

impl StageSequence {
    pub fn new(execution_id: String) -> Self {
        Self {
            stages: Vec::new(),
            monitor: None,
            execution_id,
        }
    }

    /// 啟用或禁用系統監控
    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor = if enabled {
            Some(SystemMonitor::new(true))
        } else {
            None
        };
        self
    }

    pub fn add_stage(&mut self, stage: Box<dyn Stage>) {
        self.stages.push(stage);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    fn percent_after(&self, finished: usize) -> u8 {
        if self.stages.is_empty() {
            return 100;
        }
        ((finished * 100) / self.stages.len()) as u8
    }

    /// 執行所有階段；任何階段失敗即中止並回傳 StageError
    pub async fn execute_all(
        &self,
        context: &mut DocumentContext,
        progress: &ProgressReporter,
    ) -> Result<Vec<StageResult>> {
        let mut results = Vec::new();

        tracing::info!(
            "🚀 Starting document run {} ({} stages)",
            self.execution_id,
            self.stages.len()
        );
        if let Some(monitor) = &self.monitor {
            monitor.log_stats("Document run started");
        }

        for (position, stage) in self.stages.iter().enumerate() {
            let kind = stage.kind();
            progress.set_percent(self.percent_after(position));

            if !stage.should_execute(context) {
                tracing::info!("⏭️ Skipping stage: {} (condition not met)", kind);
                stage.on_skip(context);
                progress.set_percent(self.percent_after(position + 1));
                progress.emit(kind, ProgressStatus::Skipped, format!("{} skipped", kind));
                continue;
            }

            progress.emit(kind, ProgressStatus::Started, format!("{} started", kind));
            let start_time = Instant::now();
            let warnings_before = context.warnings.len();

            match stage.run(context, progress).await {
                Ok(outcome) => {
                    let warnings = context.warnings[warnings_before..].to_vec();

                    let result = StageResult {
                        stage: kind,
                        items: outcome.items,
                        duration: start_time.elapsed(),
                        warnings,
                    };

                    tracing::info!(
                        "✅ Stage completed: {} (items: {}, warnings: {}, duration: {:?})",
                        kind,
                        result.items,
                        result.warnings.len(),
                        result.duration
                    );

                    progress.set_percent(self.percent_after(position + 1));
                    progress.emit(
                        kind,
                        ProgressStatus::Completed,
                        format!("{} completed with {} item(s)", kind, result.items),
                    );
                    results.push(result);
                }
                Err(e) => {
                    tracing::error!("❌ Stage {} failed: {}", kind, e);
                    progress.emit(kind, ProgressStatus::Failed, e.to_string());
                    if let Some(monitor) = &self.monitor {
                        monitor.log_final_stats();
                    }
                    return Err(match e {
                        err @ ScholarError::StageError { .. } => err,
                        other => ScholarError::StageError {
                            stage: kind.to_string(),
                            details: other.to_string(),
                        },
                    });
                }
            }
        }

        if let Some(monitor) = &self.monitor {
            monitor.log_stats("Document run completed");
            monitor.log_final_stats();
        }

        Ok(results)
    }

    /// 獲取執行摘要
    pub fn get_execution_summary(results: &[StageResult]) -> HashMap<String, serde_json::Value> {
        let mut summary = HashMap::new();

        let total_items: usize = results.iter().map(|r| r.items).sum();
        let total_warnings: usize = results.iter().map(|r| r.warnings.len()).sum();
        let total_duration: Duration = results.iter().map(|r| r.duration).sum();

        summary.insert("total_stages".to_string(), serde_json::Value::from(results.len()));
        summary.insert("total_items".to_string(), serde_json::Value::from(total_items));
        summary.insert("total_warnings".to_string(), serde_json::Value::from(total_warnings));
        summary.insert(
            "total_duration_ms".to_string(),
            serde_json::Value::from(total_duration.as_millis() as u64),
        );

        let stage_names: Vec<serde_json::Value> = results
            .iter()
            .map(|r| serde_json::Value::String(r.stage.to_string()))
            .collect();
        summary.insert("executed_stages".to_string(), serde_json::Value::Array(stage_names));

        summary
    }
}
