use crate::utils::error::{Result, ScholarError};
use crate::utils::validation::{
    validate_non_empty_string, validate_path, validate_positive_number, validate_range,
    validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;

static ENV_VAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").unwrap());

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub scraper: ScraperConfig,
    pub pipeline: PipelineSettings,
    pub chat: ChatConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub cors_permissive: bool,
    pub max_jobs: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            cors_permissive: false,
            max_jobs: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
    pub retry_delay_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 2048,
            timeout_seconds: 120,
            retry_attempts: 0,
            retry_delay_seconds: 2,
        }
    }
}

/// HTML 搜尋頁面的端點與 CSS 選擇器；預設對應 DuckDuckGo HTML 版
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub endpoint: String,
    pub query_param: String,
    pub result_selector: String,
    pub title_selector: String,
    pub link_selector: String,
    pub snippet_selector: String,
    pub max_results: usize,
    pub timeout_seconds: u64,
    pub excluded_domains: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://html.duckduckgo.com/html/".to_string(),
            query_param: "q".to_string(),
            result_selector: ".result".to_string(),
            title_selector: "a.result__a".to_string(),
            link_selector: "a.result__a".to_string(),
            snippet_selector: ".result__snippet".to_string(),
            max_results: 40,
            timeout_seconds: 30,
            excluded_domains: vec!["youtube.com".to_string(), "facebook.com".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_content_chars: usize,
    pub min_content_chars: usize,
    pub concurrent_requests: usize,
    pub max_body_bytes: usize,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string(),
            timeout_seconds: 30,
            max_content_chars: 12_000,
            min_content_chars: 200,
            concurrent_requests: 3,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub language: String,
    pub max_sources: usize,
    pub min_sections: usize,
    pub max_sections: usize,
    // 以下三項只由 [scraper] 區段決定
    #[serde(skip)]
    pub min_content_chars: usize,
    #[serde(skip)]
    pub max_content_chars: usize,
    #[serde(skip)]
    pub concurrent_requests: usize,
    pub output_path: String,
    pub monitor: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        let scraper = ScraperConfig::default();
        Self {
            language: "português do Brasil".to_string(),
            max_sources: 5,
            min_sections: 3,
            max_sections: 6,
            min_content_chars: scraper.min_content_chars,
            max_content_chars: scraper.max_content_chars,
            concurrent_requests: scraper.concurrent_requests,
            output_path: "./output".to_string(),
            monitor: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub system_prompt: String,
    pub max_history: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: "You are a helpful research assistant. Answer clearly and, when relevant, \
                            point out which claims would need an academic source."
                .to_string(),
            max_history: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub log_format: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_format: "compact".to_string(),
        }
    }
}

impl AppConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ScholarError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        let mut config: AppConfig =
            toml::from_str(&processed_content).map_err(|e| ScholarError::ConfigValidationError {
                field: "toml_parsing".to_string(),
                message: format!("TOML parsing error: {}", e),
            })?;
        config.sync_pipeline_settings();
        Ok(config)
    }

    /// 替換環境變數 (例如 ${OPENAI_API_KEY})，未設定者保留原樣
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .to_string()
    }

    /// pipeline 的抓取限制沿用 [scraper] 區段，[monitoring] enabled 同時開啟階段監控
    fn sync_pipeline_settings(&mut self) {
        self.pipeline.min_content_chars = self.scraper.min_content_chars;
        self.pipeline.max_content_chars = self.scraper.max_content_chars;
        self.pipeline.concurrent_requests = self.scraper.concurrent_requests;
        self.pipeline.monitor |= self.monitoring.enabled;
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validate_positive_number("server.max_jobs", self.server.max_jobs, 1)?;
        validate_url("llm.base_url", &self.llm.base_url)?;
        validate_non_empty_string("llm.model", &self.llm.model)?;
        if self.llm.api_key.trim().is_empty() || self.llm.api_key.starts_with("${") {
            return Err(ScholarError::MissingConfigError {
                field: "llm.api_key".to_string(),
            });
        }
        validate_range("llm.temperature", self.llm.temperature, 0.0, 2.0)?;
        validate_positive_number("llm.max_tokens", self.llm.max_tokens as usize, 1)?;
        validate_positive_number("llm.timeout_seconds", self.llm.timeout_seconds as usize, 1)?;

        validate_url("search.endpoint", &self.search.endpoint)?;
        validate_non_empty_string("search.query_param", &self.search.query_param)?;
        for (field, selector) in [
            ("search.result_selector", &self.search.result_selector),
            ("search.title_selector", &self.search.title_selector),
            ("search.link_selector", &self.search.link_selector),
            ("search.snippet_selector", &self.search.snippet_selector),
        ] {
            if scraper::Selector::parse(selector).is_err() {
                return Err(ScholarError::InvalidConfigValueError {
                    field: field.to_string(),
                    value: selector.clone(),
                    reason: "Invalid CSS selector".to_string(),
                });
            }
        }
        validate_positive_number("search.max_results", self.search.max_results, 1)?;

        validate_positive_number("scraper.concurrent_requests", self.scraper.concurrent_requests, 1)?;
        validate_positive_number("scraper.max_content_chars", self.scraper.max_content_chars, 1)?;
        validate_positive_number("scraper.max_body_bytes", self.scraper.max_body_bytes, 1)?;
        if self.scraper.min_content_chars > self.scraper.max_content_chars {
            return Err(ScholarError::InvalidConfigValueError {
                field: "scraper.min_content_chars".to_string(),
                value: self.scraper.min_content_chars.to_string(),
                reason: "Must not exceed scraper.max_content_chars".to_string(),
            });
        }

        validate_non_empty_string("pipeline.language", &self.pipeline.language)?;
        validate_positive_number("pipeline.max_sources", self.pipeline.max_sources, 1)?;
        validate_positive_number("pipeline.min_sections", self.pipeline.min_sections, 1)?;
        if self.pipeline.max_sections < self.pipeline.min_sections {
            return Err(ScholarError::InvalidConfigValueError {
                field: "pipeline.max_sections".to_string(),
                value: self.pipeline.max_sections.to_string(),
                reason: "Must be at least pipeline.min_sections".to_string(),
            });
        }
        validate_path("pipeline.output_path", &self.pipeline.output_path)?;

        validate_positive_number("chat.max_history", self.chat.max_history, 1)?;

        let valid_formats = ["compact", "json"];
        if !valid_formats.contains(&self.monitoring.log_format.as_str()) {
            return Err(ScholarError::InvalidConfigValueError {
                field: "monitoring.log_format".to_string(),
                value: self.monitoring.log_format.clone(),
                reason: format!("Unsupported format. Valid formats: {}", valid_formats.join(", ")),
            });
        }

        Ok(())
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.enabled || self.pipeline.monitor
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
