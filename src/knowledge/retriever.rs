//! Retriever - 질의 임베딩 → 최근접 검색 → 청크 매핑

use std::sync::Arc;

use super::corpus::Corpus;
use super::store::Chunk;
use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::{RagError, Result};

/// 검색된 청크 (거리 오름차순)
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    /// 유클리드 거리 (작을수록 유사)
    pub distance: f32,
    /// 코퍼스 내 위치
    pub position: usize,
}

/// 벡터 검색기
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedder }
    }

    /// 질의와 가장 가까운 k개 청크 검색
    ///
    /// k가 색인된 청크 수보다 크면 청크 수로 줄입니다.
    /// 반환 위치가 저장소에 없으면 코퍼스 손상으로 보고 실패합니다.
    pub async fn retrieve(
        &self,
        corpus: &Corpus,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let k = k.min(corpus.len());
        if k == 0 {
            return Ok(vec![]);
        }

        let query_vector = embed_query(self.embedder.as_ref(), query)
            .await
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;

        let neighbors = corpus.index().search(&query_vector, k)?;

        let results = neighbors
            .into_iter()
            .map(|n| {
                let chunk = corpus.store().get(n.position).ok_or(RagError::Alignment {
                    index_len: corpus.index().len(),
                    store_len: corpus.store().len(),
                })?;
                Ok(RetrievedChunk {
                    chunk: chunk.clone(),
                    distance: n.distance,
                    position: n.position,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(best) = results.first() {
            tracing::debug!(
                "Retrieved {} chunks, best distance {:.4} ({} p.{})",
                results.len(),
                best.distance,
                best.chunk.source,
                best.chunk.page
            );
        }

        Ok(results)
    }
}
