//! 문서 수집 모듈
//!
//! 코퍼스 구축 대상 디렉토리에서 색인 가능한 문서를 찾습니다.
//! 문서 식별자는 파일 이름이므로, 같은 이름이 두 번 나오면 먼저 찾은 것만 씁니다.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ignore::WalkBuilder;

// ============================================================================
// Document Kinds
// ============================================================================

/// 지원하는 문서 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// PDF (페이지 단위 추출)
    Pdf,
    /// 일반 텍스트 (폼피드 기준 페이지)
    Text,
}

impl DocumentKind {
    /// 확장자로 문서 종류 결정
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "txt" | "md" => Some(DocumentKind::Text),
            _ => None,
        }
    }

    /// 파일 이름에서 종류 결정
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

// ============================================================================
// Collected Document
// ============================================================================

/// 수집된 문서
#[derive(Debug, Clone)]
pub struct CollectedDocument {
    pub path: PathBuf,
    /// 문서 식별자 (파일 이름)
    pub name: String,
    pub kind: DocumentKind,
    pub size: u64,
}

impl CollectedDocument {
    fn from_path(path: PathBuf) -> Result<Option<Self>> {
        let kind = match DocumentKind::from_path(&path) {
            Some(kind) => kind,
            None => return Ok(None),
        };

        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => return Ok(None),
        };

        let metadata = std::fs::metadata(&path)
            .with_context(|| format!("Failed to read metadata: {:?}", path))?;

        if !metadata.is_file() {
            return Ok(None);
        }

        Ok(Some(Self {
            path,
            name,
            kind,
            size: metadata.len(),
        }))
    }
}

// ============================================================================
// Document Collector
// ============================================================================

/// 수집기 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 허용 확장자 (비어있으면 지원하는 모든 확장자)
    pub extensions: Vec<String>,
    /// 숨김 파일 포함 여부
    pub include_hidden: bool,
    /// 하위 디렉토리 탐색 깊이 (`None`이면 무제한, `Some(1)`이면 바로 아래만)
    pub max_depth: Option<usize>,
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["pdf".to_string()],
            include_hidden: false,
            max_depth: Some(1),
            max_file_size: 50 * 1024 * 1024, // 50MB
        }
    }
}

/// 문서 수집기
pub struct DocumentCollector {
    config: CollectorConfig,
}

impl DocumentCollector {
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(CollectorConfig::default())
    }

    /// 디렉토리에서 문서 수집 (경로 순 정렬)
    pub fn collect_directory(&self, dir: &Path) -> Result<Vec<CollectedDocument>> {
        if !dir.exists() {
            anyhow::bail!("Directory not found: {:?}", dir);
        }
        if !dir.is_dir() {
            anyhow::bail!("Not a directory: {:?}", dir);
        }

        let walker = WalkBuilder::new(dir)
            .hidden(!self.config.include_hidden)
            .max_depth(self.config.max_depth)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .sort_by_file_path(|a, b| a.cmp(b))
            .build();

        let mut documents = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            match CollectedDocument::from_path(entry.path().to_path_buf()) {
                Ok(Some(doc)) => {
                    if !self.should_include(&doc) {
                        continue;
                    }
                    if !seen.insert(doc.name.clone()) {
                        tracing::warn!("Skipping {:?}: document name {} already collected", doc.path, doc.name);
                        continue;
                    }
                    documents.push(doc);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Failed to collect file: {}", e),
            }
        }

        tracing::info!("Collected {} documents from {:?}", documents.len(), dir);
        Ok(documents)
    }

    fn should_include(&self, doc: &CollectedDocument) -> bool {
        if self.config.max_file_size > 0 && doc.size > self.config.max_file_size {
            tracing::debug!("Skipping large file: {:?} ({} bytes)", doc.path, doc.size);
            return false;
        }

        if self.config.extensions.is_empty() {
            return true;
        }

        doc.path
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                self.config
                    .extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}

// ============================================================================
// Tests
// ============================================================================
