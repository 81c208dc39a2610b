//! 애플리케이션 컨텍스트
//!
//! 프로세스 시작 시 한 번 구성되어 모든 요청이 공유하는 객체입니다.
//! 임베딩 프로바이더, 생성 백엔드, 코퍼스 핸들과 파이프라인 단계들을 묶습니다.
//!
//! 수명주기:
//! 1. [`AppContext::from_config`]로 구성 (영속 코퍼스 로드, 정렬 검증)
//! 2. 요청 처리 중에는 설정과 구성 요소가 바뀌지 않음
//! 3. 코퍼스는 업로드 시 추가, 재구축 시 통째로 교체 (읽는 쪽은 항상 완결된 스냅샷)
//! 4. 추가되는 문서는 코퍼스에 기록된 분할 설정으로 청킹 (재구축 때의 프리셋 유지)

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::attribution::{Source, SourceAttributor};
use crate::collector::{CollectorConfig, DocumentCollector};
use crate::config::RagConfig;
use crate::embedding::{create_embedder, EmbeddingProvider};
use crate::error::{GenerationError, RagError, Result, UploadError};
use crate::extractor::{extract_pages, extract_pages_from_bytes, PageText};
use crate::generation::{
    create_generator, AnswerGenerator, AnswerPolicy, GENERATION_FAILED_ANSWER,
    NO_DOCUMENTS_ANSWER,
};
use crate::knowledge::{
    word_window_chunker, AssembledContext, Chunk, ChunkConfig, Chunker, ContextAssembler,
    Corpus, CorpusHandle, CorpusStats, RetrievedChunk, Retriever,
};

/// 빈 질문에 대한 답변
pub const EMPTY_QUESTION_ANSWER: &str = "Please provide a question.";

/// 검색 실패 시 답변
pub const RETRIEVAL_FAILED_ANSWER: &str =
    "Sorry, I could not search the documents right now. Please try again later.";

// ============================================================================
// Response Types
// ============================================================================

/// 질의 응답
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question: String,
    pub answer: String,
    pub sources: Vec<Source>,
}

/// 업로드 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub filename: String,
    pub chunks_added: usize,
}

/// 디렉토리 재구축 결과
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuildReport {
    pub documents: usize,
    pub pages: usize,
    /// 텍스트가 없어 건너뛴 페이지 수
    pub skipped_pages: usize,
    /// 추출 실패로 건너뛴 문서
    pub failed_documents: Vec<String>,
    pub total_chunks: usize,
}

/// 질의 처리 과정 (디버그용)
#[derive(Debug, Clone)]
pub struct AskTrace {
    pub answer: Answer,
    pub retrieved: Vec<RetrievedChunk>,
    pub context: AssembledContext,
    pub generation_error: Option<GenerationError>,
}

impl AskTrace {
    fn early(question: &str, answer: &str) -> Self {
        Self {
            answer: Answer {
                question: question.to_string(),
                answer: answer.to_string(),
                sources: vec![],
            },
            retrieved: vec![],
            context: AssembledContext::default(),
            generation_error: None,
        }
    }
}

// ============================================================================
// AppContext
// ============================================================================

/// 공유 애플리케이션 컨텍스트
pub struct AppContext {
    config: RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn AnswerGenerator>,
    corpus: CorpusHandle,
    chunker: Box<dyn Chunker>,
    retriever: Retriever,
    assembler: ContextAssembler,
    attributor: SourceAttributor,
    policy: AnswerPolicy,
}

impl AppContext {
    /// 설정으로 전체 구성 (영속 코퍼스가 있으면 로드)
    pub fn from_config(config: RagConfig) -> Result<Self> {
        config.validate()?;

        let embedder = create_embedder(&config.embedding)
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;
        let generator = create_generator(&config.generation);
        let corpus = CorpusHandle::open(config.corpus_paths(), embedder.dimension())?;

        Self::with_components(config, embedder, generator, corpus)
    }

    /// 구성 요소를 직접 주입
    pub fn with_components(
        config: RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn AnswerGenerator>,
        corpus: CorpusHandle,
    ) -> Result<Self> {
        config.validate()?;

        let snapshot = corpus.snapshot();
        snapshot.check_alignment()?;
        if snapshot.dimension() != embedder.dimension() {
            return Err(RagError::IndexMismatch(format!(
                "index dimension {} does not match embedding provider {} ({})",
                snapshot.dimension(),
                embedder.name(),
                embedder.dimension()
            )));
        }

        tracing::info!(
            "Context ready: {} chunks, embedder {}, generator {}",
            snapshot.len(),
            embedder.name(),
            generator.name()
        );

        let chunker = word_window_chunker(config.chunking)?;
        let retriever = Retriever::new(Arc::clone(&embedder));
        let assembler = ContextAssembler::new(
            config.retrieval.context_word_budget,
            config.retrieval.min_partial_words,
            config.retrieval.context_style,
        );
        let attributor = SourceAttributor::new(config.attribution.clone());
        let policy = AnswerPolicy::from_config(&config.generation);

        Ok(Self {
            config,
            embedder,
            generator,
            corpus,
            chunker,
            retriever,
            assembler,
            attributor,
            policy,
        })
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }

    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    pub fn corpus(&self) -> &CorpusHandle {
        &self.corpus
    }

    // ------------------------------------------------------------------------
    // Query
    // ------------------------------------------------------------------------

    /// 질문에 답변 (실패하지 않음)
    pub async fn ask(&self, question: &str) -> Answer {
        self.ask_with_trace(question, None).await.answer
    }

    /// 질문에 답변하고 중간 결과도 반환
    ///
    /// 어떤 실패도 호출자에게 에러로 전달하지 않고 답변 텍스트에 담습니다.
    pub async fn ask_with_trace(&self, question: &str, top_k: Option<usize>) -> AskTrace {
        let question = question.trim();
        if question.is_empty() {
            return AskTrace::early(question, EMPTY_QUESTION_ANSWER);
        }

        let snapshot = self.corpus.snapshot();
        if snapshot.is_empty() {
            return AskTrace::early(question, NO_DOCUMENTS_ANSWER);
        }

        let k = top_k.unwrap_or(self.config.retrieval.top_k);
        let retrieved = match self.retriever.retrieve(&snapshot, question, k).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::error!("Retrieval failed: {}", e);
                return AskTrace::early(question, RETRIEVAL_FAILED_ANSWER);
            }
        };
        drop(snapshot);

        let context = self.assembler.assemble(&retrieved);
        tracing::debug!(
            "Context: {} words from {} chunks (truncated: {})",
            context.word_count,
            context.chunks_used,
            context.truncated
        );

        let generated = self
            .generator
            .generate(&self.config.generation.system_instructions, &context.text, question)
            .await;

        let (answer, sources, generation_error) = match generated {
            Ok(generated) => {
                let text = self.policy.finalize(generated);
                let sources = self.attributor.attribute(&text, &retrieved);
                (text, sources, None)
            }
            Err(e) => {
                tracing::warn!("Generation failed ({}): {}", self.generator.name(), e);
                (GENERATION_FAILED_ANSWER.to_string(), vec![], Some(e))
            }
        };

        AskTrace {
            answer: Answer {
                question: question.to_string(),
                answer,
                sources,
            },
            retrieved,
            context,
            generation_error,
        }
    }

    /// 검색만 수행
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        let snapshot = self.corpus.snapshot();
        self.retriever.retrieve(&snapshot, query, k).await
    }

    // ------------------------------------------------------------------------
    // Corpus Growth
    // ------------------------------------------------------------------------

    /// 문서 업로드
    ///
    /// 파일 이름, 형식, 중복 검사는 추출 전에 수행하며,
    /// 거부되면 코퍼스는 변경되지 않습니다.
    pub async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<UploadReceipt> {
        let name = validate_filename(filename)?;

        if !self.config.upload.accepts(&name) {
            return Err(UploadError::UnsupportedFileType {
                filename: name,
                allowed: self.config.upload.allowed_extensions.join(", "),
            }
            .into());
        }

        if self.corpus.snapshot().store().contains_source(&name) {
            return Err(UploadError::DuplicateFilename(name).into());
        }

        // PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
        let task_name = name.clone();
        let (extracted, bytes) = tokio::task::spawn_blocking(move || {
            let pages = extract_pages_from_bytes(&task_name, &bytes);
            (pages, bytes)
        })
        .await
        .map_err(|e| RagError::Ingestion {
            source_name: name.clone(),
            message: e.to_string(),
        })?;

        let pages = extracted.map_err(|e| RagError::Ingestion {
            source_name: name.clone(),
            message: format!("{:#}", e),
        })?;

        let chunks_added = self.add_document_pages(&name, pages).await?;

        self.store_original(&name, &bytes).await;

        Ok(UploadReceipt {
            filename: name,
            chunks_added,
        })
    }

    /// 추출된 페이지로 문서 추가
    ///
    /// 텍스트가 없는 페이지는 건너뛰고, 남는 청크가 없으면 거부합니다.
    pub async fn add_document_pages(&self, source: &str, pages: Vec<PageText>) -> Result<usize> {
        let chunking = self
            .corpus
            .snapshot()
            .chunking()
            .unwrap_or(self.config.chunking);

        let recorded_chunker;
        let chunker: &dyn Chunker = if chunking == self.config.chunking {
            self.chunker.as_ref()
        } else {
            tracing::warn!(
                "Corpus was segmented with {}/{} words (config: {}/{}), segmenting {} the same way",
                chunking.max_chunk_words,
                chunking.overlap_words,
                self.config.chunking.max_chunk_words,
                self.config.chunking.overlap_words,
                source
            );
            recorded_chunker = word_window_chunker(chunking)?;
            recorded_chunker.as_ref()
        };

        let (chunks, _skipped) = segment_document(chunker, source, &pages);
        if chunks.is_empty() {
            return Err(UploadError::EmptyDocument(source.to_string()).into());
        }

        self.corpus
            .append_document(source, chunking, chunks, self.embedder.as_ref())
            .await
    }

    /// 업로드 원본 보관 (재구축용)
    async fn store_original(&self, name: &str, bytes: &[u8]) {
        if self.corpus.paths().is_none() {
            return;
        }

        let dir = self.config.documents_dir();
        let result = async {
            tokio::fs::create_dir_all(&dir).await?;
            tokio::fs::write(dir.join(name), bytes).await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!("Failed to keep uploaded file {} in {:?}: {}", name, dir, e);
        }
    }

    /// 디렉토리의 문서로 코퍼스 전체 재구축
    ///
    /// 읽을 수 없는 문서와 빈 페이지는 건너뛰고 나머지로 구축합니다.
    /// 수집부터 교체까지 하나의 쓰기 작업이므로, 도중에 들어온 업로드는
    /// 새 코퍼스 위에 추가됩니다.
    pub async fn rebuild_from_dir(&self, dir: &Path) -> Result<BuildReport> {
        self.corpus
            .rebuild(|| self.build_from_dir(dir, self.config.chunking))
            .await
    }

    async fn build_from_dir(&self, dir: &Path, chunking: ChunkConfig) -> Result<(Corpus, BuildReport)> {
        let collector = DocumentCollector::new(CollectorConfig {
            extensions: self.config.upload.allowed_extensions.clone(),
            ..Default::default()
        });
        let documents = collector
            .collect_directory(dir)
            .map_err(|e| RagError::Ingestion {
                source_name: dir.display().to_string(),
                message: format!("{:#}", e),
            })?;

        let mut report = BuildReport::default();
        let mut all_chunks = Vec::new();

        for doc in &documents {
            let pages = match extract_pages(&doc.path).await {
                Ok(pages) => pages,
                Err(e) => {
                    tracing::warn!("Skipping {}: {:#}", doc.name, e);
                    report.failed_documents.push(doc.name.clone());
                    continue;
                }
            };

            let (chunks, skipped) = segment_document(self.chunker.as_ref(), &doc.name, &pages);
            report.documents += 1;
            report.pages += pages.len();
            report.skipped_pages += skipped;
            all_chunks.extend(chunks);
        }

        tracing::info!(
            "Embedding {} chunks from {} documents",
            all_chunks.len(),
            report.documents
        );

        let corpus = Corpus::build(all_chunks, self.embedder.as_ref())
            .await?
            .with_chunking(chunking);
        report.total_chunks = corpus.len();

        Ok((corpus, report))
    }

    // ------------------------------------------------------------------------
    // Stats
    // ------------------------------------------------------------------------

    pub fn stats(&self) -> CorpusStats {
        self.corpus.snapshot().stats()
    }
}

/// 문서의 모든 페이지를 청크로 (빈 페이지 수도 반환)
fn segment_document(chunker: &dyn Chunker, source: &str, pages: &[PageText]) -> (Vec<Chunk>, usize) {
    let mut chunks = Vec::new();
    let mut skipped = 0;

    for page in pages {
        if page.is_blank() {
            tracing::warn!("{} p.{}: no extractable text, skipping page", source, page.page);
            skipped += 1;
            continue;
        }
        chunks.extend(chunker.segment_page(source, page.page, &page.text));
    }

    (chunks, skipped)
}

/// 업로드 파일 이름 검증 (경로 구성 요소 불허)
fn validate_filename(filename: &str) -> std::result::Result<String, UploadError> {
    let name = filename.trim();
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.chars().any(char::is_control);

    if invalid {
        return Err(UploadError::InvalidFilename(filename.to_string()));
    }
    Ok(name.to_string())
}

// ============================================================================
// Tests
// ============================================================================
