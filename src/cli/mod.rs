//! CLI 모듈
//!
//! docqa-rag CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::app::{AppContext, AskTrace};
use crate::config::RagConfig;
use crate::embedding::{has_api_key, EmbeddingProviderKind};
use crate::generation::GeneratorKind;
use crate::knowledge::{ChunkConfig, ChunkPreset, Corpus};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "docqa-rag")]
#[command(version, about = "문서 질의응답 RAG 시스템", long_about = None)]
pub struct Cli {
    /// 설정 파일 경로 (기본: ./docqa-rag.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 폴더의 문서로 코퍼스 전체 재구축
    Build {
        /// 문서 폴더 경로
        dir: PathBuf,

        /// 청킹 프리셋 (설정 파일의 chunking 값을 덮어씀)
        #[arg(short, long, value_enum)]
        preset: Option<ChunkPreset>,
    },

    /// 질문하기
    Ask {
        /// 질문
        question: String,

        /// 검색할 청크 수
        #[arg(short, long)]
        k: Option<usize>,

        /// 검색 결과와 문맥 정보 출력
        #[arg(long)]
        debug: bool,

        /// JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 문서 하나를 코퍼스에 추가
    Upload {
        /// 추가할 파일 경로
        file: PathBuf,
    },

    /// 코퍼스 통계
    Stats {
        /// JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = RagConfig::load(cli.config.as_deref()).context("설정 로드 실패")?;

    match cli.command {
        Commands::Build { dir, preset } => cmd_build(config, &dir, preset).await,
        Commands::Ask {
            question,
            k,
            debug,
            json,
        } => cmd_ask(config, &question, k, debug, json).await,
        Commands::Upload { file } => cmd_upload(config, &file).await,
        Commands::Stats { json } => cmd_stats(&config, json),
        Commands::Status => cmd_status(&config),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 재구축 명령어 (build)
async fn cmd_build(mut config: RagConfig, dir: &Path, preset: Option<ChunkPreset>) -> Result<()> {
    if let Some(preset) = preset {
        config.chunking = ChunkConfig::from_preset(preset);
    }

    println!(
        "[*] 청킹: {} 단어 / 겹침 {} 단어",
        config.chunking.max_chunk_words, config.chunking.overlap_words
    );

    let app = AppContext::from_config(config).context("컨텍스트 초기화 실패")?;

    println!("[*] 문서 수집 및 임베딩 중: {}", dir.display());
    let report = app
        .rebuild_from_dir(dir)
        .await
        .context("코퍼스 구축 실패")?;

    println!(
        "[OK] 완료: 문서 {}, 페이지 {}, 청크 {}",
        report.documents, report.pages, report.total_chunks
    );
    if report.skipped_pages > 0 {
        println!("[!] 텍스트가 없어 건너뛴 페이지: {}", report.skipped_pages);
    }
    for name in &report.failed_documents {
        println!("[!] 추출 실패: {}", name);
    }

    Ok(())
}

/// 질문 명령어 (ask)
async fn cmd_ask(
    config: RagConfig,
    question: &str,
    k: Option<usize>,
    debug: bool,
    json: bool,
) -> Result<()> {
    let app = AppContext::from_config(config).context("컨텍스트 초기화 실패")?;
    let trace = app.ask_with_trace(question, k).await;

    if debug {
        print_trace(&trace);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&trace.answer)?);
        return Ok(());
    }

    println!("\n{}\n", trace.answer.answer);

    if trace.answer.sources.is_empty() {
        println!("[!] 출처 없음");
    } else {
        println!("출처:");
        for source in &trace.answer.sources {
            println!("  - {} (p.{})", source.file, source.page);
        }
    }

    Ok(())
}

fn print_trace(trace: &AskTrace) {
    println!("[*] 검색 결과 ({} 건):", trace.retrieved.len());
    for (i, hit) in trace.retrieved.iter().enumerate() {
        println!(
            "{}. [거리: {:.4}] {} p.{} (#{})",
            i + 1,
            hit.distance,
            hit.chunk.source,
            hit.chunk.page,
            hit.position
        );
        println!("   {}", truncate_text(&hit.chunk.text, 120));
    }
    println!(
        "[*] 문맥: {} 단어, 청크 {} 개{}",
        trace.context.word_count,
        trace.context.chunks_used,
        if trace.context.truncated {
            " (마지막 청크 잘림)"
        } else {
            ""
        }
    );
    if let Some(ref e) = trace.generation_error {
        println!("[!] 생성 실패: {}", e);
    }
}

/// 업로드 명령어 (upload)
async fn cmd_upload(config: RagConfig, file: &Path) -> Result<()> {
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("잘못된 파일 이름: {:?}", file))?
        .to_string();

    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("파일 읽기 실패: {:?}", file))?;

    println!("[*] 업로드 중: {} ({})", filename, format_bytes(bytes.len()));

    let app = AppContext::from_config(config).context("컨텍스트 초기화 실패")?;

    match app.upload(&filename, bytes).await {
        Ok(receipt) => {
            println!(
                "[OK] {} 추가됨: 청크 {} 개",
                receipt.filename, receipt.chunks_added
            );
            Ok(())
        }
        Err(e) if e.is_client_error() => bail!("업로드 거부: {}", e),
        Err(e) => Err(e).context("업로드 실패"),
    }
}

/// 통계 명령어 (stats)
///
/// 임베딩 프로바이더 없이 저장된 코퍼스만 읽습니다.
fn cmd_stats(config: &RagConfig, json: bool) -> Result<()> {
    let stats = Corpus::load(&config.corpus_paths())
        .context("코퍼스 로드 실패")?
        .map(|c| c.stats())
        .unwrap_or_else(|| Corpus::empty(config.embedding.dimension).stats());

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("[OK] 청크: {} 개", stats.total_chunks);
    println!("[OK] 문서: {} 개", stats.total_pdfs);
    for name in &stats.pdf_files {
        println!("  - {}", name);
    }

    Ok(())
}

/// 상태 명령어 (status)
fn cmd_status(config: &RagConfig) -> Result<()> {
    println!("docqa-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let data_dir = config.data_dir();
    println!("[*] 데이터 디렉토리: {}", data_dir.display());

    // 임베딩
    match config.embedding.provider {
        EmbeddingProviderKind::Gemini => {
            if has_api_key() {
                println!("[OK] 임베딩: Gemini ({}차원), API 키 설정됨", config.embedding.dimension);
            } else {
                println!("[!] 임베딩: Gemini, API 키 미설정");
                println!("    설정: export GEMINI_API_KEY=your-key");
            }
        }
        EmbeddingProviderKind::Hashing => {
            println!("[OK] 임베딩: 오프라인 해싱 ({}차원)", config.embedding.dimension);
        }
    }

    // 답변 생성
    match config.generation.backend {
        GeneratorKind::Local => {
            println!(
                "[*] 답변 생성: 로컬 seq2seq {} @ {}",
                config.generation.local.model, config.generation.local.endpoint
            );
        }
        GeneratorKind::Remote => {
            let remote = &config.generation.remote;
            let key_set = std::env::var(&remote.api_key_env)
                .map(|k| !k.trim().is_empty())
                .unwrap_or(false);
            if key_set {
                println!("[OK] 답변 생성: {} (API 키 설정됨)", remote.model);
            } else {
                println!("[!] 답변 생성: {}, API 키 미설정", remote.model);
                println!("    설정: export {}=your-key", remote.api_key_env);
            }
        }
    }

    // 코퍼스
    let paths = config.corpus_paths();
    match Corpus::load(&paths) {
        Ok(Some(corpus)) => {
            let stats = corpus.stats();
            println!(
                "[OK] 코퍼스: 청크 {} 개, 문서 {} 개",
                stats.total_chunks, stats.total_pdfs
            );
            if let Some(updated) = corpus.updated_at() {
                println!("     갱신: {}", updated.format("%Y-%m-%d %H:%M"));
            }
            if let Ok(meta) = std::fs::metadata(&paths.index) {
                println!("     인덱스 크기: {}", format_bytes(meta.len() as usize));
            }
        }
        Ok(None) => println!("[!] 코퍼스 없음 (docqa-rag build <dir>로 구축)"),
        Err(e) => println!("[!] 코퍼스 로드 실패: {}", e),
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
