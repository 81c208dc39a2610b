//! Context Assembler - 검색된 청크를 단어 예산 안에서 하나의 문맥으로 결합
//!
//! 순위 순서대로 청크 전체를 추가하다가, 다음 청크가 예산을 넘으면
//! 남은 예산이 최소 유효 크기보다 클 때만 앞부분을 잘라 붙이고 멈춥니다.

use serde::{Deserialize, Serialize};

use super::retriever::RetrievedChunk;

/// 청크 구분 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextStyle {
    /// 문단 구분 (`\n\n`)
    #[default]
    Plain,
    /// 블록마다 `[source p.N]` 태그
    Tagged,
}

/// 결합된 문맥
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledContext {
    pub text: String,
    /// 태그 포함 단어 수
    pub word_count: usize,
    /// 사용된 청크 수 (잘린 청크 포함)
    pub chunks_used: usize,
    /// 마지막 청크가 잘렸는지
    pub truncated: bool,
}

/// 문맥 결합기
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    word_budget: usize,
    min_partial_words: usize,
    style: ContextStyle,
}

impl ContextAssembler {
    pub fn new(word_budget: usize, min_partial_words: usize, style: ContextStyle) -> Self {
        Self {
            word_budget,
            min_partial_words,
            style,
        }
    }

    pub fn word_budget(&self) -> usize {
        self.word_budget
    }

    /// 문맥 결합
    ///
    /// 출력 단어 수는 예산을 넘지 않고, 입력 순위 순서를 유지합니다.
    pub fn assemble(&self, retrieved: &[RetrievedChunk]) -> AssembledContext {
        let mut blocks: Vec<String> = Vec::new();
        let mut total = 0usize;
        let mut truncated = false;

        for hit in retrieved {
            let header = self.header(hit);
            let header_words = header.as_deref().map_or(0, |h| h.split_whitespace().count());
            let words: Vec<&str> = hit.chunk.text.split_whitespace().collect();
            let needed = header_words + words.len();

            if total + needed <= self.word_budget {
                blocks.push(Self::block(header.as_deref(), &words));
                total += needed;
                continue;
            }

            // 남은 예산으로 앞부분만
            let remaining = self.word_budget - total;
            let room = remaining.saturating_sub(header_words);
            if remaining > self.min_partial_words && room > 0 {
                blocks.push(Self::block(header.as_deref(), &words[..room]));
                total += header_words + room;
                truncated = true;
            }
            break;
        }

        AssembledContext {
            text: blocks.join("\n\n"),
            word_count: total,
            chunks_used: blocks.len(),
            truncated,
        }
    }

    fn header(&self, hit: &RetrievedChunk) -> Option<String> {
        match self.style {
            ContextStyle::Plain => None,
            ContextStyle::Tagged => Some(format!(
                "[{} p.{}]",
                hit.chunk.source, hit.chunk.page
            )),
        }
    }

    fn block(header: Option<&str>, words: &[&str]) -> String {
        match header {
            Some(h) => format!("{}\n{}", h, words.join(" ")),
            None => words.join(" "),
        }
    }
}
