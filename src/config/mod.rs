//! 설정 모듈
//!
//! 우선순위: 기본값 ← `docqa-rag.toml` (또는 `--config` 경로) ← `DOCQA_*` 환경변수.
//! 중첩 키는 `__`로 구분합니다 (예: `DOCQA_RETRIEVAL__TOP_K=8`).
//! API 키는 설정 파일에 두지 않고 각 프로바이더가 환경변수에서 읽습니다.

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::attribution::AttributionConfig;
use crate::embedding::EmbeddingConfig;
use crate::error::{RagError, Result};
use crate::generation::GenerationConfig;
use crate::knowledge::{get_data_dir, ChunkConfig, ContextStyle, CorpusPaths};

/// 기본 설정 파일 이름 (현재 디렉토리)
pub const DEFAULT_CONFIG_FILE: &str = "docqa-rag.toml";

/// 환경변수 접두어
pub const ENV_PREFIX: &str = "DOCQA_";

/// 검색/문맥 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// 질의당 검색 청크 수
    pub top_k: usize,
    /// 문맥 단어 예산
    pub context_word_budget: usize,
    /// 잘린 청크를 붙이기 위한 최소 남은 예산
    pub min_partial_words: usize,
    pub context_style: ContextStyle,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            context_word_budget: 400,
            min_partial_words: 50,
            context_style: ContextStyle::Plain,
        }
    }
}

/// 업로드 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// 허용 확장자 (소문자, 점 없이)
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: vec!["pdf".to_string()],
        }
    }
}

impl UploadConfig {
    /// 파일 이름의 확장자가 허용 목록에 있는지 (대소문자 무시)
    pub fn accepts(&self, filename: &str) -> bool {
        Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                self.allowed_extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}

/// 전체 설정
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// 데이터 디렉토리 (없으면 [`get_data_dir`])
    pub data_dir: Option<PathBuf>,
    pub chunking: ChunkConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub attribution: AttributionConfig,
    pub upload: UploadConfig,
}

impl RagConfig {
    /// 설정 로드
    ///
    /// `path`가 주어지면 그 파일이 반드시 있어야 하고,
    /// 없으면 현재 디렉토리의 `docqa-rag.toml`을 (있을 때만) 읽습니다.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(RagConfig::default()));

        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(RagError::Config(format!(
                        "config file not found: {}",
                        p.display()
                    )));
                }
                figment = figment.merge(Toml::file(p));
            }
            None => {
                figment = figment.merge(Toml::file(DEFAULT_CONFIG_FILE));
            }
        }

        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// 주어진 figment에서 추출 후 검증
    pub fn extract(figment: Figment) -> Result<Self> {
        let config: RagConfig = figment
            .extract()
            .map_err(|e| RagError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;

        if self.retrieval.top_k == 0 {
            return Err(RagError::Config("retrieval.top_k must be > 0".to_string()));
        }
        if self.retrieval.context_word_budget == 0 {
            return Err(RagError::Config(
                "retrieval.context_word_budget must be > 0".to_string(),
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(RagError::Config(
                "embedding.dimension must be > 0".to_string(),
            ));
        }
        if self.attribution.fallback_top_n == 0 {
            return Err(RagError::Config(
                "attribution.fallback_top_n must be > 0".to_string(),
            ));
        }
        if self.upload.allowed_extensions.is_empty() {
            return Err(RagError::Config(
                "upload.allowed_extensions must not be empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.generation.min_confidence) {
            return Err(RagError::Config(
                "generation.min_confidence must be within 0.0..=1.0".to_string(),
            ));
        }

        Ok(())
    }

    /// 데이터 디렉토리
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(get_data_dir)
    }

    /// 인덱스/저장소 파일 경로
    pub fn corpus_paths(&self) -> CorpusPaths {
        CorpusPaths::in_dir(&self.data_dir())
    }

    /// 업로드된 원본 문서 디렉토리
    pub fn documents_dir(&self) -> PathBuf {
        self.data_dir().join("documents")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribution::AttributionStrategy;
    use crate::generation::GeneratorKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = RagConfig::default();
        assert_eq!(config.chunking.max_chunk_words, 300);
        assert_eq!(config.chunking.overlap_words, 50);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.context_word_budget, 400);
        assert_eq!(config.attribution.fallback_top_n, 3);
        assert_eq!(config.upload.allowed_extensions, vec!["pdf"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
data_dir = "/tmp/docqa-test"

[chunking]
max_chunk_words = 200
overlap_words = 0

[retrieval]
top_k = 3
context_style = "tagged"

[generation]
backend = "local"

[attribution]
strategy = "all_retrieved"
"#
        )
        .unwrap();

        let figment = Figment::from(Serialized::defaults(RagConfig::default()))
            .merge(Toml::file(file.path()));
        let config = RagConfig::extract(figment).unwrap();

        assert_eq!(config.data_dir(), PathBuf::from("/tmp/docqa-test"));
        assert_eq!(config.chunking.max_chunk_words, 200);
        assert_eq!(config.chunking.overlap_words, 0);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.context_word_budget, 400);
        assert_eq!(config.retrieval.context_style, ContextStyle::Tagged);
        assert_eq!(config.generation.backend, GeneratorKind::Local);
        assert_eq!(config.attribution.strategy, AttributionStrategy::AllRetrieved);
    }

    #[test]
    fn test_invalid_overlap_rejected() {
        let figment = Figment::from(Serialized::defaults(RagConfig::default())).merge(
            Serialized::default("chunking.overlap_words", 300usize),
        );
        assert!(matches!(
            RagConfig::extract(figment),
            Err(RagError::Config(_))
        ));
    }

    #[test]
    fn test_zero_fallback_rejected() {
        let figment = Figment::from(Serialized::defaults(RagConfig::default())).merge(
            Serialized::default("attribution.fallback_top_n", 0usize),
        );
        assert!(matches!(
            RagConfig::extract(figment),
            Err(RagError::Config(_))
        ));
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = RagConfig::load(Some(Path::new("/definitely/not/here.toml")));
        assert!(matches!(result, Err(RagError::Config(_))));
    }

    #[test]
    fn test_upload_accepts() {
        let upload = UploadConfig::default();
        assert!(upload.accepts("TaxGuide.pdf"));
        assert!(upload.accepts("REPORT.PDF"));
        assert!(!upload.accepts("scan.png"));
        assert!(!upload.accepts("noextension"));
    }

    #[test]
    fn test_paths_follow_data_dir() {
        let config = RagConfig {
            data_dir: Some(PathBuf::from("/srv/rag")),
            ..Default::default()
        };
        assert_eq!(config.documents_dir(), PathBuf::from("/srv/rag/documents"));
        assert_eq!(
            config.corpus_paths(),
            CorpusPaths::in_dir(Path::new("/srv/rag"))
        );
    }
}
