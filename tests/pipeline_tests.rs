//! 구축 → 질의 → 업로드 전체 흐름 테스트 (네트워크 없음)

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tempfile::TempDir;

use docqa_rag::extractor::PageText;
use docqa_rag::generation::{ChatCompletionConfig, GENERATION_FAILED_ANSWER};
use docqa_rag::{
    AnswerGenerator, AppContext, ChatCompletionGenerator, Corpus, CorpusHandle,
    EmbeddingProvider, GeneratedAnswer, GenerationError, HashingEmbedding, RagConfig, RagError,
    Source, UploadError,
};

// ============================================================================
// Test Doubles
// ============================================================================

const VOCABULARY: usize = 650;

/// `w0`..`w649` 각각을 고유 축에 놓는 임베딩 (그 외 토큰은 무시)
struct VocabularyEmbedding;

#[async_trait]
impl EmbeddingProvider for VocabularyEmbedding {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut vector = vec![0.0f32; VOCABULARY];
        for token in text.split_whitespace() {
            if let Some(index) = token
                .strip_prefix('w')
                .and_then(|n| n.parse::<usize>().ok())
                .filter(|&n| n < VOCABULARY)
            {
                vector[index] += 1.0;
            }
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        VOCABULARY
    }

    fn name(&self) -> &str {
        "vocabulary"
    }
}

/// 배치 임베딩마다 지연되는 임베딩 (재구축 중 업로드 재현용)
struct SlowEmbedding(Duration);

#[async_trait]
impl EmbeddingProvider for SlowEmbedding {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        VocabularyEmbedding.embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        tokio::time::sleep(self.0).await;
        VocabularyEmbedding.embed_batch(texts).await
    }

    fn dimension(&self) -> usize {
        VOCABULARY
    }

    fn name(&self) -> &str {
        "slow-vocabulary"
    }
}

/// 고정 답변 생성기
struct ScriptedGenerator(&'static str);

#[async_trait]
impl AnswerGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        _system_instructions: &str,
        _context: &str,
        _question: &str,
    ) -> Result<GeneratedAnswer, GenerationError> {
        Ok(GeneratedAnswer::text(self.0))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn words(range: std::ops::Range<usize>) -> String {
    range.map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
}

fn test_config(data_dir: Option<&std::path::Path>) -> RagConfig {
    let mut config = RagConfig::default();
    config.data_dir = data_dir.map(|p| p.to_path_buf());
    config.upload.allowed_extensions = vec!["pdf".to_string(), "txt".to_string()];
    config
}

fn in_memory_app(generator: Arc<dyn AnswerGenerator>) -> AppContext {
    AppContext::with_components(
        test_config(None),
        Arc::new(VocabularyEmbedding),
        generator,
        CorpusHandle::in_memory(Corpus::empty(VOCABULARY)),
    )
    .unwrap()
}

async fn add_tax_guide(app: &AppContext) -> usize {
    app.add_document_pages(
        "TaxGuide.pdf",
        vec![PageText {
            page: 1,
            text: words(0..650),
        }],
    )
    .await
    .unwrap()
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn tax_guide_segments_and_retrieves_by_term() {
    let app = in_memory_app(Arc::new(ScriptedGenerator(
        "The guide explains the applicable thresholds.",
    )));

    assert_eq!(add_tax_guide(&app).await, 3);

    let snapshot = app.corpus().snapshot();
    let store = snapshot.store();
    assert_eq!(store.get(0).unwrap().text, words(0..300));
    assert_eq!(store.get(1).unwrap().text, words(250..550));
    assert_eq!(store.get(2).unwrap().text, words(500..650));
    assert_eq!(snapshot.index().len(), store.len());

    // w400은 두 번째 청크에만 있음
    let hits = app.retrieve("w400", 1).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].position, 1);

    let hits = app.retrieve("w10", 1).await.unwrap();
    assert_eq!(hits[0].position, 0);

    let trace = app.ask_with_trace("w400", Some(1)).await;
    assert_eq!(trace.retrieved[0].position, 1);
    assert_eq!(
        trace.answer.sources,
        vec![Source {
            file: "TaxGuide.pdf".to_string(),
            page: 1
        }]
    );
}

#[tokio::test]
async fn duplicate_upload_is_rejected_without_mutation() {
    let app = in_memory_app(Arc::new(ScriptedGenerator("irrelevant answer text")));
    add_tax_guide(&app).await;

    let before = app.stats();
    let index_before = app.corpus().snapshot().index().len();

    // 중복 검사는 추출 전에 수행되므로 내용은 상관없음
    let err = app
        .upload("TaxGuide.pdf", b"not even a pdf".to_vec())
        .await
        .unwrap_err();

    assert!(err.is_client_error());
    assert_eq!(
        err.to_string(),
        RagError::Upload(UploadError::DuplicateFilename("TaxGuide.pdf".to_string())).to_string()
    );
    assert_eq!(app.stats(), before);
    assert_eq!(app.corpus().snapshot().index().len(), index_before);
}

#[tokio::test]
async fn unsupported_file_type_is_rejected() {
    let app = in_memory_app(Arc::new(ScriptedGenerator("irrelevant answer text")));

    let err = app.upload("scan.png", vec![0x89, 0x50]).await.unwrap_err();
    assert!(err.is_client_error());
    assert!(matches!(
        err,
        RagError::Upload(UploadError::UnsupportedFileType { .. })
    ));
    assert_eq!(app.stats().total_chunks, 0);
}

#[tokio::test]
async fn unreachable_backend_still_answers() {
    let generator = ChatCompletionGenerator::new(
        ChatCompletionConfig {
            endpoint: "http://127.0.0.1:9/v1/chat/completions".to_string(),
            timeout_secs: 2,
            ..Default::default()
        },
        "test-key".to_string(),
    )
    .unwrap();
    let app = in_memory_app(Arc::new(generator));
    add_tax_guide(&app).await;

    let answer = app.ask("w10 w20").await;
    assert_eq!(answer.question, "w10 w20");
    assert_eq!(answer.answer, GENERATION_FAILED_ANSWER);
    assert!(answer.sources.is_empty());

    let json = serde_json::to_value(&answer).unwrap();
    assert_eq!(json["sources"], serde_json::json!([]));
    assert!(json["answer"].is_string());
}

#[tokio::test]
async fn answer_mentioning_a_document_cites_only_that_document() {
    let app = in_memory_app(Arc::new(ScriptedGenerator(
        "Per the VAT Guide, registration is mandatory above the threshold.",
    )));

    app.add_document_pages(
        "vat_guide.txt",
        vec![
            PageText { page: 1, text: words(0..40) },
            PageText { page: 2, text: words(40..80) },
        ],
    )
    .await
    .unwrap();
    app.add_document_pages("income.txt", vec![PageText { page: 7, text: words(0..60) }])
        .await
        .unwrap();

    let trace = app.ask_with_trace("w5 w45", Some(3)).await;
    assert_eq!(trace.retrieved.len(), 3);
    assert_eq!(
        trace.answer.sources,
        vec![
            Source { file: "vat_guide.txt".to_string(), page: 1 },
            Source { file: "vat_guide.txt".to_string(), page: 2 },
        ]
    );
}

#[tokio::test]
async fn persisted_corpus_round_trips() {
    let data = TempDir::new().unwrap();
    let config = test_config(Some(data.path()));
    let paths = config.corpus_paths();

    {
        let app = AppContext::with_components(
            config.clone(),
            Arc::new(VocabularyEmbedding),
            Arc::new(ScriptedGenerator("irrelevant answer text")),
            CorpusHandle::open(paths.clone(), VOCABULARY).unwrap(),
        )
        .unwrap();

        add_tax_guide(&app).await;
        let receipt = app
            .upload("notes.txt", words(100..160).into_bytes())
            .await
            .unwrap();
        assert_eq!(receipt.chunks_added, 1);
        assert!(config.documents_dir().join("notes.txt").exists());
    }

    let reloaded = Corpus::load(&paths).unwrap().unwrap();
    assert_eq!(reloaded.len(), 4);
    assert_eq!(reloaded.index().len(), reloaded.store().len());

    let stats = reloaded.stats();
    assert_eq!(stats.total_chunks, 4);
    assert_eq!(stats.total_pdfs, 2);
    assert_eq!(stats.pdf_files, vec!["TaxGuide.pdf", "notes.txt"]);
}

#[tokio::test]
async fn rebuild_from_directory_replaces_corpus() {
    let data = TempDir::new().unwrap();
    let docs = TempDir::new().unwrap();
    std::fs::write(docs.path().join("a.txt"), words(0..350)).unwrap();
    std::fs::write(docs.path().join("b.txt"), format!("{}\x0c \x0c{}", words(0..10), words(10..20)))
        .unwrap();
    std::fs::write(docs.path().join("ignored.png"), b"png").unwrap();

    let config = test_config(Some(data.path()));
    let app = AppContext::with_components(
        config.clone(),
        Arc::new(VocabularyEmbedding),
        Arc::new(ScriptedGenerator("irrelevant answer text")),
        CorpusHandle::open(config.corpus_paths(), VOCABULARY).unwrap(),
    )
    .unwrap();

    app.add_document_pages("old.txt", vec![PageText { page: 1, text: words(0..5) }])
        .await
        .unwrap();

    let report = app.rebuild_from_dir(docs.path()).await.unwrap();
    assert_eq!(report.documents, 2);
    assert_eq!(report.pages, 4);
    assert_eq!(report.skipped_pages, 1);
    // a.txt: 350 단어 → 2 청크, b.txt: 페이지 1, 3 → 2 청크
    assert_eq!(report.total_chunks, 4);

    let stats = app.stats();
    assert_eq!(stats.pdf_files, vec!["a.txt", "b.txt"]);

    let b_pages: Vec<usize> = app
        .corpus()
        .snapshot()
        .store()
        .iter()
        .filter(|c| c.source == "b.txt")
        .map(|c| c.page)
        .collect();
    assert_eq!(b_pages, vec![1, 3]);

    let reloaded = Corpus::load(&config.corpus_paths()).unwrap().unwrap();
    assert_eq!(reloaded.stats(), stats);
}

#[tokio::test]
async fn concurrent_uploads_of_same_name_admit_one() {
    let app = Arc::new(in_memory_app(Arc::new(ScriptedGenerator("irrelevant answer text"))));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let app = Arc::clone(&app);
            tokio::spawn(async move { app.upload("same.txt", words(0..20).into_bytes()).await })
        })
        .collect();

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(e) => assert!(matches!(
                e,
                RagError::Upload(UploadError::DuplicateFilename(_))
            )),
        }
    }

    assert_eq!(accepted, 1);
    assert_eq!(app.stats().total_chunks, 1);
}

#[tokio::test]
async fn upload_during_rebuild_is_kept() {
    let data = TempDir::new().unwrap();
    let docs = TempDir::new().unwrap();
    std::fs::write(docs.path().join("a.txt"), words(0..40)).unwrap();

    let config = test_config(Some(data.path()));
    let app = Arc::new(
        AppContext::with_components(
            config.clone(),
            Arc::new(SlowEmbedding(Duration::from_millis(400))),
            Arc::new(ScriptedGenerator("irrelevant answer text")),
            CorpusHandle::open(config.corpus_paths(), VOCABULARY).unwrap(),
        )
        .unwrap(),
    );

    let rebuilding = {
        let app = Arc::clone(&app);
        let dir = docs.path().to_path_buf();
        tokio::spawn(async move { app.rebuild_from_dir(&dir).await })
    };

    // 재구축이 임베딩 중일 때 업로드
    tokio::time::sleep(Duration::from_millis(100)).await;
    let receipt = app
        .upload("new.txt", words(100..120).into_bytes())
        .await
        .unwrap();
    assert_eq!(receipt.chunks_added, 1);

    let report = rebuilding.await.unwrap().unwrap();
    assert_eq!(report.documents, 1);

    assert_eq!(app.stats().pdf_files, vec!["a.txt", "new.txt"]);
    let reloaded = Corpus::load(&config.corpus_paths()).unwrap().unwrap();
    assert_eq!(reloaded.stats().pdf_files, vec!["a.txt", "new.txt"]);
    assert_eq!(reloaded.index().len(), reloaded.store().len());
}

#[tokio::test]
async fn hanging_backend_times_out_into_failure_answer() {
    // 연결만 받고 응답하지 않는 백엔드
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut open = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            open.push(socket);
        }
    });

    let generator = ChatCompletionGenerator::new(
        ChatCompletionConfig {
            endpoint: format!("http://{}/v1/chat/completions", addr),
            timeout_secs: 1,
            ..Default::default()
        },
        "test-key".to_string(),
    )
    .unwrap();
    let app = in_memory_app(Arc::new(generator));
    add_tax_guide(&app).await;

    let started = Instant::now();
    let trace = app.ask_with_trace("w10 w20", Some(2)).await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(trace.generation_error, Some(GenerationError::Timeout));
    assert_eq!(trace.answer.answer, GENERATION_FAILED_ANSWER);
    assert!(trace.answer.sources.is_empty());
    assert!(!trace.retrieved.is_empty());
}
