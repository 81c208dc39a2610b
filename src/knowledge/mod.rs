//! Knowledge 모듈 - 검색 가능한 코퍼스
//!
//! - Chunker: 페이지 텍스트를 겹치는 단어 창으로 분할
//! - Vector: 평면 L2 최근접 이웃 인덱스
//! - Store: 인덱스와 위치 정렬된 청크 저장소
//! - Corpus: 인덱스 + 저장소 쌍 (구축, 추가, 저장, 스냅샷)
//! - Retriever: 질의 → 상위 k개 청크
//! - Context: 단어 예산 안에서 문맥 결합

mod chunker;
mod context;
mod corpus;
mod retriever;
mod store;
mod vector;

// Re-exports
pub use chunker::{
    default_chunker, word_window_chunker, ChunkConfig, ChunkPreset, Chunker, WordWindowChunker,
};
pub use context::{AssembledContext, ContextAssembler, ContextStyle};
pub use corpus::{Corpus, CorpusHandle, CorpusPaths, CorpusStats};
pub use retriever::{RetrievedChunk, Retriever};
pub use store::{get_data_dir, Chunk, DocumentStore};
pub use vector::{l2_normalize, squared_l2, FlatL2Index, Neighbor};
