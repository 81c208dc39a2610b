//! 원격 chat completion 생성기 (OpenAI 호환)
//!
//! source: https://platform.openai.com/docs/api-reference/chat

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::prompt::chat_user_message;
use super::{AnswerGenerator, GeneratedAnswer};
use crate::error::GenerationError;

/// 원격 생성 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatCompletionConfig {
    /// chat completions 엔드포인트 전체 URL
    pub endpoint: String,
    pub model: String,
    /// API 키를 읽을 환경변수 이름
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// 토큰 logprob 요청 (신뢰도 계산용)
    pub request_logprobs: bool,
}

impl Default for ChatCompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.0,
            max_tokens: 400,
            timeout_secs: 60,
            request_logprobs: false,
        }
    }
}

/// 원격 chat completion 생성기
#[derive(Debug)]
pub struct ChatCompletionGenerator {
    config: ChatCompletionConfig,
    api_key: String,
    client: reqwest::Client,
}

impl ChatCompletionGenerator {
    pub fn new(config: ChatCompletionConfig, api_key: String) -> Result<Self> {
        url::Url::parse(&config.endpoint)
            .with_context(|| format!("Invalid chat completion endpoint: {}", config.endpoint))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    /// 설정된 환경변수에서 API 키를 읽어 생성
    pub fn from_env(config: ChatCompletionConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .with_context(|| format!("{} environment variable not set", config.api_key_env))?;
        Self::new(config, api_key)
    }

    fn build_request_body(
        &self,
        system_instructions: &str,
        context: &str,
        question: &str,
    ) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": system_instructions },
                { "role": "user", "content": chat_user_message(context, question) },
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        if self.config.request_logprobs {
            body["logprobs"] = serde_json::json!(true);
        }

        body
    }
}

/// chat completion 응답
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    logprobs: Option<ChoiceLogprobs>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceLogprobs {
    #[serde(default)]
    content: Option<Vec<TokenLogprob>>,
}

#[derive(Debug, Deserialize)]
struct TokenLogprob {
    logprob: f32,
}

/// 에러 응답
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// 평균 토큰 logprob의 지수 (기하평균 토큰 확률)
fn mean_token_probability(logprobs: &[TokenLogprob]) -> Option<f32> {
    if logprobs.is_empty() {
        return None;
    }
    let mean = logprobs.iter().map(|t| t.logprob).sum::<f32>() / logprobs.len() as f32;
    Some(mean.exp())
}

#[async_trait]
impl AnswerGenerator for ChatCompletionGenerator {
    async fn generate(
        &self,
        system_instructions: &str,
        context: &str,
        question: &str,
    ) -> Result<GeneratedAnswer, GenerationError> {
        let body = self.build_request_body(system_instructions, context, question);

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(GenerationError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body_text)
                .map(|e| e.error.message)
                .unwrap_or(body_text);
            return Err(GenerationError::Backend {
                status: status.as_u16(),
                message,
            });
        }

        let body_text = response
            .text()
            .await
            .map_err(GenerationError::from_reqwest)?;
        let parsed: ChatResponse = serde_json::from_str(&body_text)
            .map_err(|e| GenerationError::malformed(status, e))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(GenerationError::EmptyResponse)?;

        let confidence = choice
            .logprobs
            .and_then(|l| l.content)
            .and_then(|tokens| mean_token_probability(&tokens));

        let text = choice.message.content.unwrap_or_default();

        Ok(GeneratedAnswer { text, confidence })
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}
