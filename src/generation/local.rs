//! 로컬 seq2seq 생성기
//!
//! 로컬 추론 서버(text-generation-inference 호환 `/generate`)에
//! 빔 서치 파라미터와 함께 단일 프롬프트를 보냅니다.
//! 모델 입력 길이 제한이 있으므로 문맥을 단어 수 기준으로 먼저 줄입니다.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::prompt::{fit_context_to_words, seq2seq_prompt};
use super::{AnswerGenerator, GeneratedAnswer};
use crate::error::GenerationError;

/// 단어당 평균 서브워드 토큰 수 추정치 (영어 기준)
const TOKENS_PER_WORD: f32 = 1.35;

/// 로컬 seq2seq 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSeq2SeqConfig {
    pub endpoint: String,
    pub model: String,
    /// 모델 입력 토큰 상한
    pub max_input_tokens: usize,
    pub max_new_tokens: usize,
    pub num_beams: u32,
    pub repetition_penalty: f32,
    pub length_penalty: f32,
    pub no_repeat_ngram_size: u32,
    pub early_stopping: bool,
    pub timeout_secs: u64,
}

impl Default for LocalSeq2SeqConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/generate".to_string(),
            model: "google/flan-t5-large".to_string(),
            max_input_tokens: 1024,
            max_new_tokens: 150,
            num_beams: 4,
            repetition_penalty: 1.3,
            length_penalty: 0.8,
            no_repeat_ngram_size: 3,
            early_stopping: true,
            timeout_secs: 120,
        }
    }
}

impl LocalSeq2SeqConfig {
    /// 입력 토큰 상한에 들어가는 단어 수 추정
    pub fn max_input_words(&self) -> usize {
        (self.max_input_tokens as f32 / TOKENS_PER_WORD).floor() as usize
    }
}

/// 추론 서버 요청
#[derive(Debug, Serialize)]
struct Seq2SeqRequest<'a> {
    model: &'a str,
    inputs: String,
    parameters: Seq2SeqParameters,
}

#[derive(Debug, Serialize)]
struct Seq2SeqParameters {
    max_new_tokens: usize,
    num_beams: u32,
    do_sample: bool,
    early_stopping: bool,
    repetition_penalty: f32,
    length_penalty: f32,
    no_repeat_ngram_size: u32,
    truncate: usize,
}

/// 추론 서버 응답 (목록 또는 단일 객체)
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Seq2SeqResponse {
    Many(Vec<Seq2SeqOutput>),
    One(Seq2SeqOutput),
}

#[derive(Debug, Deserialize)]
struct Seq2SeqOutput {
    generated_text: String,
    #[serde(default)]
    confidence: Option<f32>,
}

impl Seq2SeqResponse {
    fn into_first(self) -> Option<Seq2SeqOutput> {
        match self {
            Seq2SeqResponse::Many(outputs) => outputs.into_iter().next(),
            Seq2SeqResponse::One(output) => Some(output),
        }
    }
}

/// 로컬 seq2seq 생성기
#[derive(Debug)]
pub struct LocalSeq2SeqGenerator {
    config: LocalSeq2SeqConfig,
    client: reqwest::Client,
}

impl LocalSeq2SeqGenerator {
    pub fn new(config: LocalSeq2SeqConfig) -> Result<Self> {
        url::Url::parse(&config.endpoint)
            .with_context(|| format!("Invalid local generation endpoint: {}", config.endpoint))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { config, client })
    }

    /// 입력 상한에 맞춘 프롬프트
    ///
    /// 지시문과 질문 단어 수를 뺀 나머지를 문맥에 할당합니다.
    fn build_prompt(&self, system_instructions: &str, context: &str, question: &str) -> String {
        let overhead = seq2seq_prompt(system_instructions, "", question)
            .split_whitespace()
            .count();
        let room = self.config.max_input_words().saturating_sub(overhead);
        let fitted = fit_context_to_words(context, room);
        seq2seq_prompt(system_instructions, &fitted, question)
    }
}

#[async_trait]
impl AnswerGenerator for LocalSeq2SeqGenerator {
    async fn generate(
        &self,
        system_instructions: &str,
        context: &str,
        question: &str,
    ) -> Result<GeneratedAnswer, GenerationError> {
        let request = Seq2SeqRequest {
            model: &self.config.model,
            inputs: self.build_prompt(system_instructions, context, question),
            parameters: Seq2SeqParameters {
                max_new_tokens: self.config.max_new_tokens,
                num_beams: self.config.num_beams,
                do_sample: false,
                early_stopping: self.config.early_stopping,
                repetition_penalty: self.config.repetition_penalty,
                length_penalty: self.config.length_penalty,
                no_repeat_ngram_size: self.config.no_repeat_ngram_size,
                truncate: self.config.max_input_tokens,
            },
        };

        tracing::debug!(
            "Local generation request: {} prompt words",
            request.inputs.split_whitespace().count()
        );

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(GenerationError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenerationError::Backend {
                status: status.as_u16(),
                message,
            });
        }

        let body_text = response
            .text()
            .await
            .map_err(GenerationError::from_reqwest)?;
        let parsed: Seq2SeqResponse = serde_json::from_str(&body_text)
            .map_err(|e| GenerationError::malformed(status, e))?;

        let output = parsed.into_first().ok_or(GenerationError::EmptyResponse)?;

        Ok(GeneratedAnswer {
            text: output.generated_text,
            confidence: output.confidence,
        })
    }

    fn name(&self) -> &str {
        "local-seq2seq"
    }
}
