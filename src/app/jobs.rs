use crate::core::pipeline::DocumentRun;
use crate::domain::model::{
    AcademicDocument, Outline, ProgressEvent, ProgressStatus, SourceFailure, SourceSummary,
    StageKind,
};
use crate::utils::error::{Result, ScholarError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

/// 背景文件生成工作的狀態快照
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub prompt: String,
    pub status: JobStatus,
    pub current_stage: Option<StageKind>,
    pub percent: u8,
    pub events: Vec<ProgressEvent>,
    pub document: Option<AcademicDocument>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub summaries: Vec<SourceSummary>,
    pub outline: Option<Outline>,
    pub failures: Vec<SourceFailure>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 已完成工作可匯出的內容
#[derive(Debug, Clone)]
pub struct CompletedJob {
    pub document: AcademicDocument,
    pub outline: Option<Outline>,
    pub summaries: Vec<SourceSummary>,
}

/// 預設最多保留的工作數
pub const DEFAULT_MAX_JOBS: usize = 100;

/// 記憶體內的工作清單；伺服器重啟即清空
#[derive(Debug, Clone)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<Uuid, JobRecord>>>,
    max_jobs: usize,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_JOBS)
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(max_jobs: usize) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            max_jobs: max_jobs.max(1),
        }
    }

    /// 達到上限時先移除最舊的已結束工作；全部仍在執行則拒絕
    pub async fn create(&self, prompt: &str) -> Result<Uuid> {
        let mut jobs = self.jobs.write().await;
        while jobs.len() >= self.max_jobs {
            let oldest = jobs
                .values()
                .filter(|r| matches!(r.status, JobStatus::Completed | JobStatus::Failed))
                .min_by_key(|r| r.updated_at)
                .map(|r| r.id);
            match oldest {
                Some(old) => {
                    jobs.remove(&old);
                    tracing::debug!("🧹 Evicted finished job {}", old);
                }
                None => {
                    return Err(ScholarError::Conflict {
                        message: format!(
                            "{} jobs are still in progress, try again later",
                            jobs.len()
                        ),
                    })
                }
            }
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        let record = JobRecord {
            id,
            prompt: prompt.to_string(),
            status: JobStatus::Queued,
            current_stage: None,
            percent: 0,
            events: Vec::new(),
            document: None,
            summaries: Vec::new(),
            outline: None,
            failures: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
        };
        jobs.insert(id, record);
        Ok(id)
    }

    async fn update<F>(&self, id: Uuid, apply: F)
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(record) => {
                apply(record);
                record.updated_at = Utc::now();
            }
            None => tracing::warn!("⚠️ Update for unknown job {}", id),
        }
    }

    pub async fn mark_running(&self, id: Uuid) {
        self.update(id, |record| record.status = JobStatus::Running).await;
    }

    pub async fn record_event(&self, id: Uuid, event: ProgressEvent) {
        self.update(id, |record| {
            if event.status != ProgressStatus::Warning {
                record.current_stage = Some(event.stage);
            }
            record.percent = event.percent;
            record.events.push(event);
        })
        .await;
    }

    pub async fn complete(&self, id: Uuid, run: DocumentRun) {
        self.update(id, |record| {
            record.status = JobStatus::Completed;
            record.percent = 100;
            record.document = Some(run.document);
            record.outline = Some(run.outline);
            record.summaries = run.summaries;
            record.failures = run.failures;
        })
        .await;
    }

    pub async fn fail(&self, id: Uuid, error: String) {
        self.update(id, |record| {
            record.status = JobStatus::Failed;
            record.error = Some(error);
        })
        .await;
    }

    pub async fn get(&self, id: Uuid) -> Result<JobRecord> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| ScholarError::NotFound {
                resource: format!("job {}", id),
            })
    }

    /// 取出已完成工作的文件；尚未完成時回傳 Conflict
    pub async fn completed(&self, id: Uuid) -> Result<CompletedJob> {
        let jobs = self.jobs.read().await;
        let record = jobs.get(&id).ok_or_else(|| ScholarError::NotFound {
            resource: format!("job {}", id),
        })?;

        match (&record.status, &record.document) {
            (JobStatus::Completed, Some(document)) => Ok(CompletedJob {
                document: document.clone(),
                outline: record.outline.clone(),
                summaries: record.summaries.clone(),
            }),
            (status, _) => Err(ScholarError::Conflict {
                message: format!("job {} is {:?}, not completed", id, status).to_lowercase(),
            }),
        }
    }

    pub async fn count(&self) -> usize {
        self.jobs.read().await.len()
    }
}
