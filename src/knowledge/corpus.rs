//! Corpus - 벡터 인덱스 + 문서 저장소 쌍
//!
//! 두 구조는 항상 같은 호출 안에서 함께 추가되고, 함께 저장/로드됩니다.
//! `index.len() == store.len()`이 깨지면 손상된 것으로 보고 즉시 실패합니다.
//!
//! 저장 파일:
//! - `index.bin`   - bincode 벡터 인덱스 (+ 저장소 파일의 SHA-256)
//! - `chunks.json` - 청크 배열
//!
//! 동시성: 읽기는 불변 스냅샷(`Arc<Corpus>`)을 공유하고,
//! 쓰기(추가, 재구축)는 단일 writer 잠금 아래에서 새 스냅샷을 만든 뒤 교체합니다.
//! 재구축은 수집부터 교체까지 잠금을 놓지 않으므로 그 사이의 업로드는 재구축 뒤에 추가됩니다.

use std::fs;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::chunker::ChunkConfig;
use super::store::{Chunk, DocumentStore};
use super::vector::FlatL2Index;
use crate::embedding::{embed_passages, EmbeddingProvider};
use crate::error::{RagError, Result, UploadError};

/// 인덱스 파일 포맷 버전
const INDEX_FORMAT_VERSION: u32 = 2;

// ============================================================================
// Paths
// ============================================================================

/// 코퍼스 파일 쌍 경로
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusPaths {
    pub index: PathBuf,
    pub store: PathBuf,
}

impl CorpusPaths {
    /// 데이터 디렉토리 아래 기본 파일명
    pub fn in_dir(data_dir: &Path) -> Self {
        Self {
            index: data_dir.join("index.bin"),
            store: data_dir.join("chunks.json"),
        }
    }

    fn tmp(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

/// 디스크상의 인덱스 파일
#[derive(Debug, Serialize, Deserialize)]
struct PersistedIndex {
    version: u32,
    dimension: usize,
    count: usize,
    vectors: Vec<f32>,
    store_sha256: [u8; 32],
    updated_at: DateTime<Utc>,
    /// 청크를 만든 분할 설정 (빈 코퍼스는 없음)
    chunking: Option<ChunkConfig>,
}

// ============================================================================
// Stats
// ============================================================================

/// 코퍼스 통계
///
/// 필드 이름은 `/stats` 응답 형태를 따릅니다. `total_pdfs`/`pdf_files`는
/// 확장자와 관계없이 저장소의 서로 다른 문서 식별자 전체입니다 (`.txt`, `.md` 포함).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorpusStats {
    pub total_chunks: usize,
    /// 서로 다른 문서 수
    pub total_pdfs: usize,
    /// 문서 식별자 (오름차순)
    pub pdf_files: Vec<String>,
}

// ============================================================================
// Corpus
// ============================================================================

/// 위치 정렬된 벡터 인덱스 + 문서 저장소
#[derive(Debug, Clone)]
pub struct Corpus {
    index: FlatL2Index,
    store: DocumentStore,
    updated_at: Option<DateTime<Utc>>,
    chunking: Option<ChunkConfig>,
}

impl Corpus {
    /// 빈 코퍼스
    pub fn empty(dimension: usize) -> Self {
        Self {
            index: FlatL2Index::new(dimension),
            store: DocumentStore::new(),
            updated_at: None,
            chunking: None,
        }
    }

    /// 인덱스와 저장소를 묶음 (정렬 검증)
    pub fn from_parts(index: FlatL2Index, store: DocumentStore) -> Result<Self> {
        let corpus = Self {
            index,
            store,
            updated_at: None,
            chunking: None,
        };
        corpus.check_alignment()?;
        Ok(corpus)
    }

    /// 청크 목록으로 새 코퍼스 구축
    ///
    /// 모든 청크를 passage 접두어로 임베딩한 뒤 순서대로 추가합니다.
    pub async fn build(chunks: Vec<Chunk>, embedder: &dyn EmbeddingProvider) -> Result<Self> {
        let mut corpus = Self::empty(embedder.dimension());
        corpus.append(chunks, embedder).await?;
        Ok(corpus)
    }

    /// 새 청크 임베딩 후 추가 (기존 벡터는 재계산하지 않음)
    pub async fn append(
        &mut self,
        chunks: Vec<Chunk>,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_passages(embedder, &texts)
            .await
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;

        self.append_embedded(chunks, vectors)
    }

    /// 이미 임베딩된 청크 추가
    ///
    /// 전부 검증한 뒤 추가하므로 실패 시 코퍼스는 변경되지 않습니다.
    pub fn append_embedded(&mut self, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<usize> {
        if chunks.len() != vectors.len() {
            return Err(RagError::Embedding(format!(
                "{} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.index.dimension()) {
            return Err(RagError::Embedding(format!(
                "vector dimension {} does not match index dimension {}",
                bad.len(),
                self.index.dimension()
            )));
        }

        let added = chunks.len();
        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            self.index.add(&vector)?;
            self.store.push(chunk);
        }

        self.check_alignment()?;
        self.updated_at = Some(Utc::now());
        Ok(added)
    }

    /// 크기 정렬 검사
    pub fn check_alignment(&self) -> Result<()> {
        if self.index.len() != self.store.len() {
            return Err(RagError::Alignment {
                index_len: self.index.len(),
                store_len: self.store.len(),
            });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn index(&self) -> &FlatL2Index {
        &self.index
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// 청크를 만든 분할 설정
    pub fn chunking(&self) -> Option<ChunkConfig> {
        self.chunking
    }

    /// 분할 설정 기록
    pub fn with_chunking(mut self, chunking: ChunkConfig) -> Self {
        self.chunking = Some(chunking);
        self
    }

    /// 저장소의 서로 다른 문서로 통계 계산
    pub fn stats(&self) -> CorpusStats {
        let pdf_files: Vec<String> = self
            .store
            .sources()
            .into_iter()
            .map(str::to_string)
            .collect();

        CorpusStats {
            total_chunks: self.store.len(),
            total_pdfs: pdf_files.len(),
            pdf_files,
        }
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// 파일 쌍으로 저장 (임시 파일에 쓴 뒤 rename)
    pub fn save(&self, paths: &CorpusPaths) -> Result<()> {
        self.check_alignment()?;

        if let Some(parent) = paths.index.parent() {
            fs::create_dir_all(parent).map_err(|e| RagError::io(parent, e))?;
        }

        let store_bytes = serde_json::to_vec(&self.store)
            .map_err(|e| RagError::Serialization(e.to_string()))?;

        let persisted = PersistedIndex {
            version: INDEX_FORMAT_VERSION,
            dimension: self.index.dimension(),
            count: self.index.len(),
            vectors: self.index.as_flat().to_vec(),
            store_sha256: Sha256::digest(&store_bytes).into(),
            updated_at: self.updated_at.unwrap_or_else(Utc::now),
            chunking: self.chunking,
        };
        let index_bytes =
            bincode::serialize(&persisted).map_err(|e| RagError::Serialization(e.to_string()))?;

        let store_tmp = CorpusPaths::tmp(&paths.store);
        let index_tmp = CorpusPaths::tmp(&paths.index);
        write_synced(&store_tmp, &store_bytes)?;
        write_synced(&index_tmp, &index_bytes)?;

        fs::rename(&store_tmp, &paths.store).map_err(|e| RagError::io(&paths.store, e))?;
        fs::rename(&index_tmp, &paths.index).map_err(|e| RagError::io(&paths.index, e))?;

        tracing::debug!(
            "Saved corpus ({} chunks) to {:?}",
            self.len(),
            paths.index.parent()
        );
        Ok(())
    }

    /// 파일 쌍에서 로드
    ///
    /// 두 파일이 모두 없으면 `None`, 하나만 있거나 쌍이 맞지 않으면 에러입니다.
    pub fn load(paths: &CorpusPaths) -> Result<Option<Self>> {
        match (paths.index.exists(), paths.store.exists()) {
            (false, false) => return Ok(None),
            (true, false) => {
                return Err(RagError::IndexMismatch(format!(
                    "{:?} exists but {:?} is missing",
                    paths.index, paths.store
                )))
            }
            (false, true) => {
                return Err(RagError::IndexMismatch(format!(
                    "{:?} exists but {:?} is missing",
                    paths.store, paths.index
                )))
            }
            (true, true) => {}
        }

        let store_bytes = fs::read(&paths.store).map_err(|e| RagError::io(&paths.store, e))?;
        let index_bytes = fs::read(&paths.index).map_err(|e| RagError::io(&paths.index, e))?;

        let persisted: PersistedIndex = bincode::deserialize(&index_bytes)
            .map_err(|e| RagError::Serialization(format!("{:?}: {}", paths.index, e)))?;

        if persisted.version != INDEX_FORMAT_VERSION {
            return Err(RagError::IndexMismatch(format!(
                "unsupported index format version {}",
                persisted.version
            )));
        }

        let digest: [u8; 32] = Sha256::digest(&store_bytes).into();
        if digest != persisted.store_sha256 {
            return Err(RagError::IndexMismatch(format!(
                "{:?} was not written together with {:?}",
                paths.store, paths.index
            )));
        }

        let store: DocumentStore = serde_json::from_slice(&store_bytes)
            .map_err(|e| RagError::Serialization(format!("{:?}: {}", paths.store, e)))?;
        let index = FlatL2Index::from_flat(persisted.dimension, persisted.vectors)?;

        if index.len() != persisted.count {
            return Err(RagError::IndexMismatch(format!(
                "index header says {} vectors but file holds {}",
                persisted.count,
                index.len()
            )));
        }

        let mut corpus = Self::from_parts(index, store)?;
        corpus.updated_at = Some(persisted.updated_at);
        corpus.chunking = persisted.chunking;

        tracing::info!("Loaded {} document chunks", corpus.len());
        Ok(Some(corpus))
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = fs::File::create(path).map_err(|e| RagError::io(path, e))?;
    file.write_all(bytes).map_err(|e| RagError::io(path, e))?;
    file.sync_all().map_err(|e| RagError::io(path, e))?;
    Ok(())
}

// ============================================================================
// CorpusHandle
// ============================================================================

/// 공유 코퍼스 핸들
///
/// - 읽기: [`CorpusHandle::snapshot`]으로 불변 스냅샷을 얻음 (잠금은 복제 순간만)
/// - 쓰기: writer 잠금으로 직렬화, 새 스냅샷을 저장한 뒤 교체
///
/// 읽는 쪽은 추가 이전 또는 추가 완료 상태만 봅니다.
pub struct CorpusHandle {
    current: RwLock<Arc<Corpus>>,
    writer: tokio::sync::Mutex<()>,
    paths: Option<CorpusPaths>,
}

impl CorpusHandle {
    /// 메모리 전용 핸들 (저장하지 않음)
    pub fn in_memory(corpus: Corpus) -> Self {
        Self {
            current: RwLock::new(Arc::new(corpus)),
            writer: tokio::sync::Mutex::new(()),
            paths: None,
        }
    }

    /// 파일 쌍을 열기 (없으면 빈 코퍼스)
    pub fn open(paths: CorpusPaths, dimension: usize) -> Result<Self> {
        let corpus = Corpus::load(&paths)?.unwrap_or_else(|| {
            tracing::info!("No persisted corpus at {:?}, starting empty", paths.index);
            Corpus::empty(dimension)
        });

        Ok(Self {
            current: RwLock::new(Arc::new(corpus)),
            writer: tokio::sync::Mutex::new(()),
            paths: Some(paths),
        })
    }

    pub fn paths(&self) -> Option<&CorpusPaths> {
        self.paths.as_ref()
    }

    /// 현재 스냅샷
    pub fn snapshot(&self) -> Arc<Corpus> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    fn swap(&self, next: Corpus) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(next);
    }

    /// 새 문서의 청크 추가
    ///
    /// `chunking`은 `chunks`를 만든 분할 설정입니다. 코퍼스에 기록된 설정과
    /// 다르면 거부하고, 기록이 없으면 이 설정을 기록합니다.
    /// 같은 문서 식별자가 이미 있으면 [`UploadError::DuplicateFilename`]을 반환합니다.
    /// 임베딩/저장 중 실패하면 현재 스냅샷은 그대로 유지됩니다.
    pub async fn append_document(
        &self,
        source: &str,
        chunking: ChunkConfig,
        chunks: Vec<Chunk>,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<usize> {
        let _writer = self.writer.lock().await;

        let base = self.snapshot();
        if base.store().contains_source(source) {
            return Err(UploadError::DuplicateFilename(source.to_string()).into());
        }
        if let Some(recorded) = base.chunking().filter(|c| *c != chunking) {
            return Err(RagError::Config(format!(
                "corpus was segmented with {}/{} words but {} was segmented with {}/{}",
                recorded.max_chunk_words,
                recorded.overlap_words,
                source,
                chunking.max_chunk_words,
                chunking.overlap_words
            )));
        }

        let mut next = Corpus::clone(&base).with_chunking(chunking);
        let added = next.append(chunks, embedder).await?;

        if let Some(paths) = &self.paths {
            next.save(paths)?;
        }

        tracing::info!(
            "Appended {} chunks for {} (total {})",
            added,
            source,
            next.len()
        );
        self.swap(next);
        Ok(added)
    }

    /// 코퍼스 전체 교체
    pub async fn replace(&self, corpus: Corpus) -> Result<()> {
        let _writer = self.writer.lock().await;
        self.commit_replacement(corpus)
    }

    /// 재구축
    ///
    /// `build`가 끝날 때까지 writer 잠금을 잡고 있으므로 그동안의 추가는
    /// 교체 뒤로 밀립니다. `build`가 실패하면 현재 스냅샷은 그대로입니다.
    pub async fn rebuild<F, Fut, T>(&self, build: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(Corpus, T)>>,
    {
        let _writer = self.writer.lock().await;
        let (corpus, output) = build().await?;
        self.commit_replacement(corpus)?;
        Ok(output)
    }

    fn commit_replacement(&self, corpus: Corpus) -> Result<()> {
        corpus.check_alignment()?;

        if let Some(paths) = &self.paths {
            corpus.save(paths)?;
        }

        tracing::info!("Replaced corpus ({} chunks)", corpus.len());
        self.swap(corpus);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
