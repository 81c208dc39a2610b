//! 임베딩 모듈 - 텍스트 벡터화
//!
//! 텍스트를 고정 차원 단위 벡터로 변환하는 프로바이더입니다.
//! 임베딩 모델은 비대칭이므로 색인되는 문단과 질의에 서로 다른
//! 접두어(`passage: ` / `query: `)를 붙여서 임베딩합니다.
//! 두 규칙을 섞으면 검색 품질이 조용히 떨어지므로 반드시
//! [`embed_passages`]와 [`embed_query`]를 통해서만 호출하세요.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(&config.embedding)?;
//! let vectors = embed_passages(embedder.as_ref(), &texts).await?;
//! let query = embed_query(embedder.as_ref(), "What is SET?").await?;
//! ```

mod gemini;
mod hashing;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::knowledge::l2_normalize;

pub use gemini::{GeminiEmbedding, DEFAULT_DIMENSION, DEFAULT_REQUESTS_PER_MINUTE};
pub use hashing::HashingEmbedding;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Prefix Convention
// ============================================================================

/// 임베딩 대상의 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedRole {
    /// 색인되는 문서 문단
    Passage,
    /// 사용자 질의
    Query,
}

impl EmbedRole {
    pub fn prefix(self) -> &'static str {
        match self {
            EmbedRole::Passage => "passage: ",
            EmbedRole::Query => "query: ",
        }
    }

    pub fn apply(self, text: &str) -> String {
        format!("{}{}", self.prefix(), text)
    }
}

/// 문단 임베딩 (passage 접두어 + 정규화)
pub async fn embed_passages(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let prefixed: Vec<String> = texts
        .iter()
        .map(|t| EmbedRole::Passage.apply(t))
        .collect();

    let mut vectors = provider.embed_batch(&prefixed).await?;
    if vectors.len() != texts.len() {
        anyhow::bail!(
            "{} returned {} embeddings for {} passages",
            provider.name(),
            vectors.len(),
            texts.len()
        );
    }

    for vector in &mut vectors {
        l2_normalize(vector);
    }
    Ok(vectors)
}

/// 질의 임베딩 (query 접두어 + 정규화)
pub async fn embed_query(provider: &dyn EmbeddingProvider, query: &str) -> Result<Vec<f32>> {
    let mut vector = provider.embed(&EmbedRole::Query.apply(query)).await?;
    l2_normalize(&mut vector);
    Ok(vector)
}

// ============================================================================
// Configuration
// ============================================================================

/// 임베딩 프로바이더 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    /// Google Gemini API
    Gemini,
    /// 오프라인 특징 해싱
    Hashing,
}

/// 임베딩 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderKind,
    /// 벡터 차원
    pub dimension: usize,
    /// 원격 프로바이더의 분당 요청 한도
    pub requests_per_minute: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Gemini,
            dimension: DEFAULT_DIMENSION,
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
        }
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `GEMINI_API_KEY` 환경변수
/// 2. `GOOGLE_AI_API_KEY` 환경변수
pub fn get_api_key() -> Result<String> {
    for var in ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"] {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Ok(key);
            }
        }
    }

    anyhow::bail!(
        "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable.\n\
         Get your API key at: https://aistudio.google.com/app/apikey"
    )
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    get_api_key().is_ok()
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 임베딩 프로바이더 생성
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider {
        EmbeddingProviderKind::Gemini => {
            let embedder = GeminiEmbedding::from_env(config.dimension, config.requests_per_minute)?;
            tracing::info!(
                "Using Gemini API embedding (dimension: {})",
                embedder.dimension()
            );
            Ok(Arc::new(embedder))
        }
        EmbeddingProviderKind::Hashing => {
            let embedder = HashingEmbedding::new(config.dimension)?;
            tracing::info!(
                "Using offline hashing embedding (dimension: {})",
                embedder.dimension()
            );
            Ok(Arc::new(embedder))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
