//! 답변 생성 모듈
//!
//! (시스템 지시문, 문맥, 질문) → 답변 텍스트.
//! 두 백엔드가 같은 [`AnswerGenerator`] 트레이트를 구현하며,
//! 시작 시 설정으로 하나를 골라 [`crate::app::AppContext`]에 주입합니다.
//!
//! - [`LocalSeq2SeqGenerator`]: 로컬 추론 서버의 seq2seq 모델 (빔 서치)
//! - [`ChatCompletionGenerator`]: OpenAI 호환 chat completion API
//!
//! 후처리([`AnswerPolicy`])는 두 백엔드가 공유합니다.

mod local;
mod prompt;
mod remote;
#[cfg(test)]
mod test_server;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

pub use local::{LocalSeq2SeqConfig, LocalSeq2SeqGenerator};
pub use prompt::{chat_user_message, fit_context_to_words, seq2seq_prompt, DEFAULT_SYSTEM_INSTRUCTIONS};
pub use remote::{ChatCompletionConfig, ChatCompletionGenerator};

// ============================================================================
// Fixed Answers
// ============================================================================

/// 문맥에 답이 없을 때
pub const INSUFFICIENT_INFORMATION_ANSWER: &str =
    "I don't know based on the provided documents.";

/// 생성 백엔드 실패 시
pub const GENERATION_FAILED_ANSWER: &str =
    "Sorry, I could not generate an answer: the answer generation service is unavailable or not configured.";

/// 색인된 문서가 없을 때
pub const NO_DOCUMENTS_ANSWER: &str =
    "No documents have been indexed yet, so I cannot answer this question.";

/// 불확실성 표현 (짧은 답변 판정 시 예외)
const UNCERTAINTY_MARKERS: &[&str] = &[
    "don't know",
    "do not know",
    "not sure",
    "cannot answer",
    "can't answer",
    "no information",
];

// ============================================================================
// Types
// ============================================================================

/// 백엔드가 생성한 원시 답변
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAnswer {
    pub text: String,
    /// 백엔드가 제공하는 신뢰도 (0.0 ~ 1.0), 없으면 `None`
    pub confidence: Option<f32>,
}

impl GeneratedAnswer {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: None,
        }
    }
}

/// 답변 생성기 트레이트
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// 답변 생성
    async fn generate(
        &self,
        system_instructions: &str,
        context: &str,
        question: &str,
    ) -> Result<GeneratedAnswer, GenerationError>;

    /// 백엔드 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Configuration
// ============================================================================

/// 생성 백엔드 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorKind {
    /// 로컬 seq2seq 모델
    Local,
    /// 원격 chat completion API
    Remote,
}

/// 생성 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub backend: GeneratorKind,
    /// 시스템 지시문
    pub system_instructions: String,
    /// 이보다 짧은 답변은 정보 부족으로 처리 (신뢰도가 없을 때만)
    pub min_answer_chars: usize,
    /// 이보다 낮은 신뢰도는 정보 부족으로 처리
    pub min_confidence: f32,
    pub local: LocalSeq2SeqConfig,
    pub remote: ChatCompletionConfig,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend: GeneratorKind::Remote,
            system_instructions: DEFAULT_SYSTEM_INSTRUCTIONS.to_string(),
            min_answer_chars: 10,
            min_confidence: 0.35,
            local: LocalSeq2SeqConfig::default(),
            remote: ChatCompletionConfig::default(),
        }
    }
}

// ============================================================================
// Post-processing
// ============================================================================

/// 공통 후처리 정책
#[derive(Debug, Clone)]
pub struct AnswerPolicy {
    pub min_answer_chars: usize,
    pub min_confidence: f32,
}

impl AnswerPolicy {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            min_answer_chars: config.min_answer_chars,
            min_confidence: config.min_confidence,
        }
    }

    /// 원시 답변을 최종 답변 텍스트로
    ///
    /// 신뢰도가 있으면 신뢰도로, 없으면 길이로 판정합니다.
    pub fn finalize(&self, generated: GeneratedAnswer) -> String {
        let text = collapse_trailing_repeats(generated.text.trim());

        if text.is_empty() {
            return INSUFFICIENT_INFORMATION_ANSWER.to_string();
        }

        match generated.confidence {
            Some(confidence) if confidence < self.min_confidence => {
                tracing::debug!("Low confidence answer ({:.3}), replacing", confidence);
                INSUFFICIENT_INFORMATION_ANSWER.to_string()
            }
            Some(_) => text,
            None => {
                if text.chars().count() < self.min_answer_chars && !expresses_uncertainty(&text) {
                    INSUFFICIENT_INFORMATION_ANSWER.to_string()
                } else {
                    text
                }
            }
        }
    }
}

/// 불확실성 표현 포함 여부
pub fn expresses_uncertainty(text: &str) -> bool {
    let lower = text.to_lowercase().replace('’', "'");
    UNCERTAINTY_MARKERS.iter().any(|m| lower.contains(m))
}

/// 단어 끝의 3회 이상 반복 소문자를 하나로 (디코딩 잔여물: "documentsss" → "documents")
///
/// 앞의 두 글자도 소문자일 때만 줄이므로 "XCIII" 같은 로마 숫자나 "Hmmm"은 그대로입니다.
fn collapse_trailing_repeats(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let mut j = i;
        while j < chars.len() && chars[j] == c {
            j += 1;
        }

        let run = j - i;
        let at_word_end = j == chars.len() || !chars[j].is_alphanumeric();
        let has_stem = i >= 2 && chars[i - 1].is_lowercase() && chars[i - 2].is_lowercase();

        if c.is_lowercase() && run >= 3 && at_word_end && has_stem {
            out.push(c);
        } else {
            out.extend(&chars[i..j]);
        }
        i = j;
    }

    out
}

// ============================================================================
// Unavailable Backend
// ============================================================================

/// 설정되지 않은 백엔드
///
/// 항상 [`GenerationError::NotConfigured`]를 반환합니다.
#[derive(Debug, Clone)]
pub struct UnavailableGenerator {
    reason: String,
}

impl UnavailableGenerator {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl AnswerGenerator for UnavailableGenerator {
    async fn generate(
        &self,
        _system_instructions: &str,
        _context: &str,
        _question: &str,
    ) -> Result<GeneratedAnswer, GenerationError> {
        Err(GenerationError::NotConfigured(self.reason.clone()))
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 생성기 생성
///
/// 설정이 불완전하면 에러 대신 [`UnavailableGenerator`]를 반환하여
/// 질의 경로에서 고정 에러 답변으로 처리되게 합니다.
pub fn create_generator(config: &GenerationConfig) -> Arc<dyn AnswerGenerator> {
    let built: anyhow::Result<Arc<dyn AnswerGenerator>> = match config.backend {
        GeneratorKind::Local => {
            LocalSeq2SeqGenerator::new(config.local.clone()).map(|g| Arc::new(g) as _)
        }
        GeneratorKind::Remote => {
            ChatCompletionGenerator::from_env(config.remote.clone()).map(|g| Arc::new(g) as _)
        }
    };

    match built {
        Ok(generator) => {
            tracing::info!("Using answer generator: {}", generator.name());
            generator
        }
        Err(e) => {
            tracing::warn!("Answer generator unavailable: {:#}", e);
            Arc::new(UnavailableGenerator::new(format!("{:#}", e)))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
