//! Text Chunking Module
//!
//! 페이지 텍스트를 겹치는 고정 크기 단어 창(window)으로 분할합니다.
//! 각 청크는 원본 문서와 페이지 번호를 가집니다.
//!
//! 예: max_chunk_words=4, overlap_words=1
//! ```text
//! a b c d e f g h i j
//! [a b c d]
//!       [d e f g]
//!             [g h i j]
//! ```

use serde::{Deserialize, Serialize};

use super::store::Chunk;
use crate::error::{RagError, Result};

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// 청크당 최대 단어 수 (W)
    pub max_chunk_words: usize,
    /// 연속된 청크 간 겹치는 단어 수 (O, O < W)
    pub overlap_words: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self::for_overlapping()
    }
}

impl ChunkConfig {
    /// 겹침 있는 기본 설정 (300 / 50)
    pub fn for_overlapping() -> Self {
        Self {
            max_chunk_words: 300,
            overlap_words: 50,
        }
    }

    /// 겹침 없는 고정 크기 설정 (200 / 0)
    pub fn for_fixed() -> Self {
        Self {
            max_chunk_words: 200,
            overlap_words: 0,
        }
    }

    /// 이름 있는 프리셋으로 생성
    pub fn from_preset(preset: ChunkPreset) -> Self {
        match preset {
            ChunkPreset::Overlapping => Self::for_overlapping(),
            ChunkPreset::Fixed => Self::for_fixed(),
        }
    }

    /// 창 이동 간격 (W - O)
    pub fn stride(&self) -> usize {
        self.max_chunk_words - self.overlap_words
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_words == 0 {
            return Err(RagError::Config(
                "chunking.max_chunk_words must be greater than 0".to_string(),
            ));
        }
        if self.overlap_words >= self.max_chunk_words {
            return Err(RagError::Config(format!(
                "chunking.overlap_words ({}) must be less than max_chunk_words ({})",
                self.overlap_words, self.max_chunk_words
            )));
        }
        Ok(())
    }
}

/// 세그먼트 전략 이름
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ChunkPreset {
    Overlapping,
    Fixed,
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크 문자열로 분할
    fn split(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;

    /// 한 페이지를 출처 정보가 붙은 청크로 분할
    ///
    /// 빈 페이지는 청크를 만들지 않습니다.
    fn segment_page(&self, source: &str, page: usize, text: &str) -> Vec<Chunk> {
        self.split(text)
            .into_iter()
            .map(|text| Chunk {
                text,
                source: source.to_string(),
                page,
            })
            .collect()
    }
}

// ============================================================================
// WordWindowChunker
// ============================================================================

/// 단어 창 청커
///
/// 공백을 정규화한 뒤 W 단어씩 잘라내고, 시작 위치를 W - O 만큼 이동합니다.
/// 창이 페이지 끝에 닿으면 멈추므로 마지막 청크만 W보다 짧을 수 있습니다.
#[derive(Debug, Clone)]
pub struct WordWindowChunker {
    config: ChunkConfig,
}

impl WordWindowChunker {
    /// 설정으로 생성 (O < W 검증)
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// 기본 설정으로 생성
    pub fn with_defaults() -> Self {
        Self {
            config: ChunkConfig::default(),
        }
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }
}

impl Chunker for WordWindowChunker {
    fn split(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return vec![];
        }

        let size = self.config.max_chunk_words;
        let stride = self.config.stride();

        let mut chunks = Vec::with_capacity(words.len() / stride + 1);
        let mut start = 0;

        while start < words.len() {
            let end = (start + size).min(words.len());
            chunks.push(words[start..end].join(" "));

            if end >= words.len() {
                break;
            }

            start += stride;
        }

        chunks
    }

    fn name(&self) -> &'static str {
        "WordWindowChunker"
    }
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(WordWindowChunker::with_defaults())
}

/// 설정을 지정한 청커 생성
pub fn word_window_chunker(config: ChunkConfig) -> Result<Box<dyn Chunker>> {
    Ok(Box::new(WordWindowChunker::new(config)?))
}

// ============================================================================
// Tests
// ============================================================================
