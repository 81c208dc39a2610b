//! 콘텐츠 추출 모듈
//!
//! 문서에서 페이지별 텍스트를 추출합니다.
//! - PDF: pdf-extract
//! - 텍스트: UTF-8로 읽고 폼피드(`\x0c`)를 페이지 구분으로 사용

pub mod pdf;

use std::path::Path;

use anyhow::{Context, Result};

use crate::collector::DocumentKind;

/// 한 페이지의 텍스트 (페이지 번호는 1부터)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub page: usize,
    pub text: String,
}

impl PageText {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// 파일에서 페이지별 텍스트 추출
pub async fn extract_pages(path: &Path) -> Result<Vec<PageText>> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Invalid file name: {:?}", path))?
        .to_string();

    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read file: {:?}", path))?;

    // PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
    tokio::task::spawn_blocking(move || extract_pages_from_bytes(&filename, &bytes))
        .await
        .context("Extraction task failed")?
}

/// 메모리의 파일 내용에서 페이지별 텍스트 추출 (확장자로 형식 결정)
pub fn extract_pages_from_bytes(filename: &str, bytes: &[u8]) -> Result<Vec<PageText>> {
    let kind = DocumentKind::from_path(Path::new(filename))
        .with_context(|| format!("Unsupported document type: {}", filename))?;

    match kind {
        DocumentKind::Pdf => pdf::extract_pages_from_pdf(bytes)
            .with_context(|| format!("Failed to extract PDF: {}", filename)),
        DocumentKind::Text => Ok(split_text_pages(&String::from_utf8_lossy(bytes))),
    }
}

fn split_text_pages(text: &str) -> Vec<PageText> {
    text.split('\x0c')
        .enumerate()
        .map(|(i, page)| PageText {
            page: i + 1,
            text: page.trim().to_string(),
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_pages() {
        let pages = extract_pages_from_bytes("guide.txt", b"one two\x0c\x0cthree").unwrap();
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].text, "one two");
        assert!(pages[1].is_blank());
        assert_eq!(pages[2].page, 3);
    }

    #[test]
    fn test_unsupported_type() {
        assert!(extract_pages_from_bytes("scan.png", b"\x89PNG").is_err());
    }

    #[tokio::test]
    async fn test_extract_pages_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "hello world").unwrap();

        let pages = extract_pages(&path).await.unwrap();
        assert_eq!(
            pages,
            vec![PageText {
                page: 1,
                text: "hello world".to_string()
            }]
        );
    }
}
