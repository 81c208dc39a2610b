//! docqa-rag - 문서 질의응답 RAG 시스템
//!
//! 문서를 페이지 단위로 겹치는 청크로 나눠 평면 벡터 인덱스에 색인하고,
//! 질문마다 가까운 청크를 검색해 단어 예산 안에서 문맥을 만든 뒤
//! 생성 백엔드로 답변을 만들고 답변에 반영된 문서를 출처로 붙입니다.
//!
//! 구축(수집 → 추출 → 청킹 → 임베딩 → 저장)과 질의(검색 → 문맥 → 생성 → 출처)는
//! 저장된 코퍼스 파일 쌍으로만 연결됩니다.

pub mod app;
pub mod attribution;
pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod knowledge;

// Re-exports
pub use app::{Answer, AppContext, AskTrace, BuildReport, UploadReceipt};
pub use attribution::{AttributionConfig, AttributionStrategy, Source, SourceAttributor};
pub use config::{RagConfig, RetrievalConfig, UploadConfig};
pub use embedding::{
    create_embedder, embed_passages, embed_query, get_api_key, has_api_key, EmbeddingConfig,
    EmbeddingProvider, EmbeddingProviderKind, GeminiEmbedding, HashingEmbedding,
};
pub use error::{GenerationError, RagError, Result, UploadError};
pub use generation::{
    create_generator, AnswerGenerator, AnswerPolicy, ChatCompletionGenerator, GeneratedAnswer,
    GenerationConfig, GeneratorKind, LocalSeq2SeqGenerator,
};
pub use knowledge::{
    default_chunker, get_data_dir, word_window_chunker, AssembledContext, Chunk, ChunkConfig,
    ChunkPreset, Chunker, ContextAssembler, ContextStyle, Corpus, CorpusHandle, CorpusPaths,
    CorpusStats, DocumentStore, FlatL2Index, RetrievedChunk, Retriever,
};
