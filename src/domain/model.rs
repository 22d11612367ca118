use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// 使用者提交的文件生成請求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentRequest {
    pub prompt: String,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub max_sources: Option<usize>,
    #[serde(default)]
    pub sections: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicAnalysis {
    pub title: String,
    pub topic: String,
    pub search_query: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

/// 抓取並擷取文字後的頁面（尚未編號）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedPage {
    pub url: String,
    pub title: String,
    pub site_name: Option<String>,
    pub content: String,
}

/// 已編號的來源；`id` 即正文中的引用編號 [n]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedSource {
    pub id: usize,
    pub title: String,
    pub url: String,
    pub site_name: Option<String>,
    pub content: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFailure {
    pub url: String,
    pub stage: StageKind,
    pub reason: String,
}

/// 單一來源的摘要筆記（fichamento）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSummary {
    pub source_id: usize,
    pub title: String,
    pub url: String,
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineSection {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outline {
    pub title: String,
    pub sections: Vec<OutlineSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftedSection {
    pub index: usize,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub number: usize,
    pub title: String,
    pub url: String,
    pub site_name: Option<String>,
    pub accessed_on: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcademicDocument {
    pub title: String,
    pub topic: String,
    pub language: String,
    pub introduction: String,
    pub sections: Vec<DraftedSection>,
    pub conclusion: String,
    pub references: Vec<Reference>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// 文件生成流程的各個階段，依執行順序排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    TopicDetection,
    WebSearch,
    ContentScraping,
    Summarization,
    IndexGeneration,
    Introduction,
    SectionDrafting,
    Conclusion,
    Assembly,
}

impl StageKind {
    pub const ALL: [StageKind; 9] = [
        StageKind::TopicDetection,
        StageKind::WebSearch,
        StageKind::ContentScraping,
        StageKind::Summarization,
        StageKind::IndexGeneration,
        StageKind::Introduction,
        StageKind::SectionDrafting,
        StageKind::Conclusion,
        StageKind::Assembly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::TopicDetection => "topic_detection",
            StageKind::WebSearch => "web_search",
            StageKind::ContentScraping => "content_scraping",
            StageKind::Summarization => "summarization",
            StageKind::IndexGeneration => "index_generation",
            StageKind::Introduction => "introduction",
            StageKind::SectionDrafting => "section_drafting",
            StageKind::Conclusion => "conclusion",
            StageKind::Assembly => "assembly",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Started,
    Completed,
    Skipped,
    Warning,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: StageKind,
    pub status: ProgressStatus,
    pub message: String,
    pub percent: u8,
    pub at: DateTime<Utc>,
}
