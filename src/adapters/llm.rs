use crate::config::toml_config::LlmConfig;
use crate::domain::model::ChatMessage;
use crate::domain::ports::LanguageModel;
use crate::utils::error::{Result, ScholarError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    error: ProviderError,
}

#[derive(Deserialize)]
struct ProviderError {
    message: String,
}

/// OpenAI 相容的 `/chat/completions` 客戶端
pub struct OpenAiCompatibleClient {
    client: Client,
    config: LlmConfig,
}

impl OpenAiCompatibleClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        tracing::info!(model = %config.model, base_url = %config.base_url, "🤖 LLM client ready");

        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    async fn send_once(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        tracing::debug!("🤖 LLM response status: {} ({} bytes)", status, text.len());

        // 部分閘道在錯誤時回傳 HTML 頁面
        if text.trim_start().starts_with('<') {
            let preview: String = text.trim_start().chars().take(200).collect();
            return Err(ScholarError::LlmError {
                status: status.as_u16(),
                message: format!("provider returned HTML instead of JSON: {}", preview),
            });
        }

        if !status.is_success() {
            let message = serde_json::from_str::<ProviderErrorBody>(&text)
                .map(|b| b.error.message)
                .unwrap_or_else(|_| text.chars().take(300).collect());
            return Err(ScholarError::LlmError {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&text)?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(ScholarError::EmptyCompletion);
        }
        Ok(content)
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.send_once(messages).await {
                Ok(content) => return Ok(content),
                Err(e) if e.is_transient() && attempt < self.config.retry_attempts => {
                    attempt += 1;
                    tracing::warn!(
                        "🔁 LLM request failed ({}), retry {}/{}",
                        e,
                        attempt,
                        self.config.retry_attempts
                    );
                    tokio::time::sleep(Duration::from_secs(self.config.retry_delay_seconds)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
