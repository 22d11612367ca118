use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScholarError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("HTTP request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error in {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("LLM provider returned {status}: {message}")]
    LlmError { status: u16, message: String },

    #[error("LLM provider returned an empty completion")]
    EmptyCompletion,

    #[error("Search failed: {message}")]
    SearchError { message: String },

    #[error("Scraping {url} failed: {reason}")]
    ScrapeError { url: String, reason: String },

    #[error("Stage {stage} failed: {details}")]
    StageError { stage: String, details: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

pub type Result<T> = std::result::Result<T, ScholarError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Upstream,
    Configuration,
    Validation,
    NotFound,
    Conflict,
    Storage,
    Processing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ScholarError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ScholarError::ApiError(_) => ErrorCategory::Network,
            ScholarError::LlmError { .. }
            | ScholarError::EmptyCompletion
            | ScholarError::SearchError { .. }
            | ScholarError::ScrapeError { .. } => ErrorCategory::Upstream,
            ScholarError::ConfigValidationError { .. }
            | ScholarError::InvalidConfigValueError { .. }
            | ScholarError::MissingConfigError { .. } => ErrorCategory::Configuration,
            ScholarError::ValidationError { .. } => ErrorCategory::Validation,
            ScholarError::NotFound { .. } => ErrorCategory::NotFound,
            ScholarError::Conflict { .. } => ErrorCategory::Conflict,
            ScholarError::IoError(_) | ScholarError::ZipError(_) => ErrorCategory::Storage,
            ScholarError::CsvError(_)
            | ScholarError::SerializationError(_)
            | ScholarError::StageError { .. }
            | ScholarError::ProcessingError { .. } => ErrorCategory::Processing,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Validation | ErrorCategory::NotFound | ErrorCategory::Conflict => {
                ErrorSeverity::Low
            }
            ErrorCategory::Network | ErrorCategory::Upstream => ErrorSeverity::Medium,
            ErrorCategory::Processing => ErrorSeverity::High,
            ErrorCategory::Configuration | ErrorCategory::Storage => ErrorSeverity::Critical,
        }
    }

    /// 是否值得重試（連線錯誤、逾時、上游 5xx / 429）
    pub fn is_transient(&self) -> bool {
        match self {
            ScholarError::ApiError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ScholarError::LlmError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Network => "Check network connectivity and the configured endpoints",
            ErrorCategory::Upstream => {
                "The external provider failed; retry later or check the API key and model name"
            }
            ErrorCategory::Configuration => "Review the TOML configuration file and environment variables",
            ErrorCategory::Validation => "Fix the request payload and try again",
            ErrorCategory::NotFound => "Check the identifier; jobs live only in server memory",
            ErrorCategory::Conflict => "Wait for the job to finish before exporting",
            ErrorCategory::Storage => "Check that the output directory exists and is writable",
            ErrorCategory::Processing => {
                "Try a broader topic or provide source URLs explicitly"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            ScholarError::StageError { stage, details } => {
                format!("Document generation stopped at {}: {}", stage, details)
            }
            ScholarError::EmptyCompletion => "The language model returned no text".to_string(),
            ScholarError::LlmError { status, .. } => {
                format!("The language model request failed (HTTP {})", status)
            }
            ScholarError::MissingConfigError { field } => {
                format!("Missing required setting '{}'", field)
            }
            other => other.to_string(),
        }
    }
}
