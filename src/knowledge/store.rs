//! Document Store - 청크 레코드 저장소
//!
//! 벡터 인덱스와 위치로 정렬된 청크 목록입니다.
//! 인덱스의 i번째 벡터는 항상 저장소의 i번째 청크에 대응합니다.
//! 저장 위치: <로컬 데이터 디렉토리>/.docqa-rag/chunks.json

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (로컬 데이터 디렉토리, 없으면 홈 아래 `.docqa-rag/`)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".docqa-rag")
}

// ============================================================================
// Types
// ============================================================================

/// 검색 단위 청크
///
/// 한 문서의 한 페이지에서 잘라낸 연속된 단어열입니다.
/// 생성 후에는 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 청크 텍스트 (단어 사이 공백 하나)
    pub text: String,
    /// 원본 문서 식별자 (파일명)
    pub source: String,
    /// 페이지 번호 (1부터 시작)
    pub page: usize,
}

impl Chunk {
    /// 단어 수
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

// ============================================================================
// DocumentStore
// ============================================================================

/// 추가 전용 청크 저장소
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentStore {
    chunks: Vec<Chunk>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_chunks(chunks: Vec<Chunk>) -> Self {
        Self { chunks }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// 위치로 청크 조회
    pub fn get(&self, position: usize) -> Option<&Chunk> {
        self.chunks.get(position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }

    /// 청크 추가 (벡터 인덱스 추가와 같은 호출 안에서만 사용)
    pub(crate) fn push(&mut self, chunk: Chunk) {
        self.chunks.push(chunk);
    }

    /// 이미 색인된 문서인지 확인
    pub fn contains_source(&self, source: &str) -> bool {
        self.chunks.iter().any(|c| c.source == source)
    }

    /// 서로 다른 문서 식별자 (정렬됨)
    pub fn sources(&self) -> BTreeSet<&str> {
        self.chunks.iter().map(|c| c.source.as_str()).collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
