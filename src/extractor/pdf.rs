//! PDF 텍스트 추출 모듈
//!
//! pdf-extract 크레이트로 전체 텍스트를 뽑은 뒤 페이지별로 나눕니다.

use anyhow::{Context, Result};

use super::PageText;

/// 페이지 구분 줄 (`--- Page 3 ---` 등)
const PAGE_MARKER_PATTERN: &str = r"(?m)^[\s]*[-=]+[\s]*(?:Page[\s]*)?(\d+)[\s]*[-=]+[\s]*$";

/// PDF 바이트에서 페이지별 텍스트 추출
///
/// 페이지 번호는 1부터 시작하며, 텍스트가 없는 페이지도 번호를 유지한 채
/// 빈 텍스트로 반환합니다.
pub fn extract_pages_from_pdf(bytes: &[u8]) -> Result<Vec<PageText>> {
    let text = pdf_extract::extract_text_from_mem(bytes).context("Failed to extract text from PDF")?;

    if text.trim().is_empty() {
        tracing::warn!("No text extracted from PDF. It might be a scanned document.");
        return Ok(vec![PageText {
            page: 1,
            text: String::new(),
        }]);
    }

    Ok(split_pdf_pages(&text)
        .into_iter()
        .enumerate()
        .map(|(i, text)| PageText { page: i + 1, text })
        .collect())
}

/// 텍스트를 페이지별로 분리
///
/// 폼피드(`\x0c`)가 있으면 그 기준으로, 없으면 페이지 구분 줄 기준으로 나눕니다.
/// 중간의 빈 페이지는 번호 유지를 위해 남기고, 끝의 빈 조각만 버립니다.
fn split_pdf_pages(text: &str) -> Vec<String> {
    if text.contains('\x0c') {
        return trim_trailing_empty(text.split('\x0c').map(|s| s.trim().to_string()).collect());
    }

    if let Ok(marker) = regex::Regex::new(PAGE_MARKER_PATTERN) {
        if marker.is_match(text) {
            let pages: Vec<String> = marker.split(text).map(|s| s.trim().to_string()).collect();
            // 첫 구분 줄 앞의 빈 조각은 페이지가 아님
            let pages = match pages.first() {
                Some(first) if first.is_empty() => pages[1..].to_vec(),
                _ => pages,
            };
            let pages = trim_trailing_empty(pages);
            if pages.len() > 1 {
                return pages;
            }
        }
    }

    vec![text.trim().to_string()]
}

fn trim_trailing_empty(mut pages: Vec<String>) -> Vec<String> {
    while pages.len() > 1 && pages.last().map_or(false, |p| p.is_empty()) {
        pages.pop();
    }
    pages
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pdf_pages_with_formfeed() {
        let text = "Page 1 content\x0cPage 2 content\x0cPage 3 content\x0c";
        let pages = split_pdf_pages(text);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0], "Page 1 content");
        assert_eq!(pages[2], "Page 3 content");
    }

    #[test]
    fn test_empty_page_keeps_numbering() {
        let text = "first\x0c   \x0cthird";
        let pages = split_pdf_pages(text);
        assert_eq!(pages, vec!["first", "", "third"]);
    }

    #[test]
    fn test_split_pdf_pages_with_markers() {
        let text = "--- Page 1 ---\nalpha\n--- Page 2 ---\nbeta";
        let pages = split_pdf_pages(text);
        assert_eq!(pages, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_split_pdf_pages_no_separator() {
        let pages = split_pdf_pages("Just some text without page breaks");
        assert_eq!(pages, vec!["Just some text without page breaks"]);
    }

    #[test]
    fn test_invalid_pdf_bytes() {
        assert!(extract_pages_from_pdf(b"not a pdf").is_err());
    }
}
