//! 에러 타입 정의
//!
//! 코퍼스 구축/질의 과정에서 발생하는 도메인 에러입니다.
//! 외부 프로바이더(임베딩 API, PDF 추출)는 `anyhow::Result`를 반환하고,
//! 이 모듈의 타입으로 감싸서 호출자에게 전달합니다.

use std::path::PathBuf;

use thiserror::Error;

/// 라이브러리 공통 Result 타입
pub type Result<T> = std::result::Result<T, RagError>;

/// RAG 파이프라인 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 문서를 읽거나 텍스트를 추출할 수 없음
    #[error("Ingestion failed for {source_name}: {message}")]
    Ingestion {
        source_name: String,
        message: String,
    },

    /// 벡터 인덱스와 문서 저장소의 크기가 다름 (손상된 코퍼스)
    #[error("Corpus is corrupt: vector index has {index_len} entries but document store has {store_len} chunks")]
    Alignment { index_len: usize, store_len: usize },

    /// 인덱스 파일과 저장소 파일이 같은 쌍이 아님
    #[error("Corpus is corrupt: {0}")]
    IndexMismatch(String),

    /// 업로드 거부 (클라이언트 에러)
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// 임베딩 프로바이더 실패
    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// 잘못된 설정
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RagError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// 클라이언트 입력 문제인지 여부 (HTTP 계층에서 4xx로 매핑)
    pub fn is_client_error(&self) -> bool {
        matches!(self, RagError::Upload(_))
    }
}

/// 업로드 거부 사유
///
/// 모든 검사는 인덱스 변경 전에 수행되므로, 이 에러가 반환되면
/// 코퍼스는 변경되지 않은 상태입니다.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("Unsupported file type: {filename} (allowed: {allowed})")]
    UnsupportedFileType { filename: String, allowed: String },

    #[error("Document already indexed: {0}")]
    DuplicateFilename(String),

    #[error("No extractable text in {0}")]
    EmptyDocument(String),

    #[error("Invalid filename: {0:?}")]
    InvalidFilename(String),
}

/// 답변 생성 실패
///
/// `AppContext::ask`에서 잡혀 고정된 답변 텍스트로 변환됩니다.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Generation backend is not configured: {0}")]
    NotConfigured(String),

    #[error("Generation backend is unreachable: {0}")]
    Unreachable(String),

    #[error("Generation request timed out")]
    Timeout,

    #[error("Generation backend error ({status}): {message}")]
    Backend { status: u16, message: String },

    #[error("Generation backend returned an empty response")]
    EmptyResponse,
}

impl GenerationError {
    /// reqwest 에러를 분류
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GenerationError::Timeout
        } else if err.is_decode() {
            GenerationError::Backend {
                status: err.status().map_or(0, |s| s.as_u16()),
                message: err.to_string(),
            }
        } else if err.is_connect() || err.is_request() {
            GenerationError::Unreachable(err.to_string())
        } else if let Some(status) = err.status() {
            GenerationError::Backend {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            GenerationError::Unreachable(err.to_string())
        }
    }

    /// 성공 응답이지만 본문을 해석할 수 없음
    pub(crate) fn malformed(status: reqwest::StatusCode, err: serde_json::Error) -> Self {
        GenerationError::Backend {
            status: status.as_u16(),
            message: format!("malformed response body: {}", err),
        }
    }
}
