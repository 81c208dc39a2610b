//! Source Attributor - 답변에 실제로 반영된 문서를 출처로 선정
//!
//! 전략:
//! - `name_match`: 답변에 정규화된 문서 식별자가 부분 문자열로 등장하는 문서만 (없으면 상위 N개 문서)
//! - `name_match_strict`: 위와 같지만 단어 경계에서만 일치
//! - `all_retrieved`: 검색된 모든 (문서, 페이지)
//! - `top_ranked`: 상위 몇 개 청크의 (문서, 페이지)
//!
//! 출력은 항상 중복 없이 문서명, 페이지 오름차순입니다.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::knowledge::RetrievedChunk;

/// `name_match_strict`에서 붙여쓰기 일치에 필요한 최소 식별자 길이
const MIN_COMPACT_MATCH_CHARS: usize = 4;

/// 답변 출처
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Source {
    pub file: String,
    pub page: usize,
}

/// 출처 선정 전략
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionStrategy {
    #[default]
    NameMatch,
    /// 짧은 식별자("a.pdf")가 다른 단어 안에서 일치하지 않도록 단어 경계만 허용
    NameMatchStrict,
    AllRetrieved,
    TopRanked,
}

/// 출처 선정 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributionConfig {
    pub strategy: AttributionStrategy,
    /// 이름 일치가 없을 때 인용할 상위 문서 수 (최소 1)
    pub fallback_top_n: usize,
    /// `top_ranked` 전략에서 사용할 청크 수
    pub top_ranked_chunks: usize,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            strategy: AttributionStrategy::NameMatch,
            fallback_top_n: 3,
            top_ranked_chunks: 5,
        }
    }
}

/// 문서별 검색된 페이지 (최초 등장 순위 유지)
struct RankedDocument<'a> {
    source: &'a str,
    pages: BTreeSet<usize>,
}

/// 출처 선정기
#[derive(Debug, Clone, Default)]
pub struct SourceAttributor {
    config: AttributionConfig,
}

impl SourceAttributor {
    pub fn new(config: AttributionConfig) -> Self {
        Self { config }
    }

    pub fn strategy(&self) -> AttributionStrategy {
        self.config.strategy
    }

    /// 답변과 검색 결과로 출처 결정
    ///
    /// `retrieved`는 순위 순서(가까운 것 먼저)여야 합니다.
    /// 검색 결과가 하나라도 있으면 출처가 비지 않습니다.
    pub fn attribute(&self, answer: &str, retrieved: &[RetrievedChunk]) -> Vec<Source> {
        let sources: BTreeSet<Source> = match self.config.strategy {
            AttributionStrategy::NameMatch => self.name_match(answer, retrieved, false),
            AttributionStrategy::NameMatchStrict => self.name_match(answer, retrieved, true),
            AttributionStrategy::AllRetrieved => retrieved.iter().map(to_source).collect(),
            AttributionStrategy::TopRanked => retrieved
                .iter()
                .take(self.config.top_ranked_chunks.max(1))
                .map(to_source)
                .collect(),
        };

        sources.into_iter().collect()
    }

    fn name_match(
        &self,
        answer: &str,
        retrieved: &[RetrievedChunk],
        strict: bool,
    ) -> BTreeSet<Source> {
        let documents = group_by_document(retrieved);
        let answer_spaced = relax_separators(answer);
        let answer_compact = answer_spaced.replace(' ', "");

        let matched: Vec<&RankedDocument> = documents
            .iter()
            .filter(|doc| mentions(&answer_spaced, &answer_compact, doc.source, strict))
            .collect();

        let cited: Vec<&RankedDocument> = if matched.is_empty() {
            let top_n = self.config.fallback_top_n.max(1);
            tracing::debug!("No document named in answer, citing top {} documents", top_n);
            documents.iter().take(top_n).collect()
        } else {
            matched
        };

        cited
            .into_iter()
            .flat_map(|doc| {
                doc.pages.iter().map(move |&page| Source {
                    file: doc.source.to_string(),
                    page,
                })
            })
            .collect()
    }
}

fn to_source(hit: &RetrievedChunk) -> Source {
    Source {
        file: hit.chunk.source.clone(),
        page: hit.chunk.page,
    }
}

/// 문서별로 묶기 (문서 순서는 최고 순위 기준)
fn group_by_document(retrieved: &[RetrievedChunk]) -> Vec<RankedDocument<'_>> {
    let mut order: Vec<RankedDocument> = Vec::new();
    let mut index: BTreeMap<&str, usize> = BTreeMap::new();

    for hit in retrieved {
        let source = hit.chunk.source.as_str();
        let slot = *index.entry(source).or_insert_with(|| {
            order.push(RankedDocument {
                source,
                pages: BTreeSet::new(),
            });
            order.len() - 1
        });
        order[slot].pages.insert(hit.chunk.page);
    }

    order
}

/// 답변이 문서를 언급하는지
///
/// 구분자 차이("tax_guide" vs "Tax Guide")와 붙여쓰기("TaxGuide")를 모두 허용합니다.
fn mentions(answer_spaced: &str, answer_compact: &str, source: &str, strict: bool) -> bool {
    let id = normalize_identifier(source);
    if id.is_empty() {
        return false;
    }
    let compact = id.replace(' ', "");

    if !strict {
        return answer_spaced.contains(&id) || answer_compact.contains(&compact);
    }

    format!(" {} ", answer_spaced).contains(&format!(" {} ", id))
        || (compact.chars().count() >= MIN_COMPACT_MATCH_CHARS && answer_compact.contains(&compact))
}

/// 문서 식별자 정규화: 소문자, 확장자 제거, 구분자는 공백 하나로
///
/// `vat_rules-2023.pdf` → `vat rules 2023`
pub fn normalize_identifier(source: &str) -> String {
    let stem = match source.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            stem
        }
        _ => source,
    };
    relax_separators(stem)
}

/// 소문자화 후 글자/숫자가 아닌 문자 연속을 공백 하나로
fn relax_separators(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::Chunk;

    fn hit(source: &str, page: usize) -> RetrievedChunk {
        RetrievedChunk {
            chunk: Chunk {
                text: "text".to_string(),
                source: source.to_string(),
                page,
            },
            distance: 0.0,
            position: 0,
        }
    }

    fn src(file: &str, page: usize) -> Source {
        Source {
            file: file.to_string(),
            page,
        }
    }

    #[test]
    fn test_normalize_identifier() {
        assert_eq!(normalize_identifier("TaxGuide.pdf"), "taxguide");
        assert_eq!(normalize_identifier("vat_rules-2023.pdf"), "vat rules 2023");
        assert_eq!(normalize_identifier("Income Tax Act.PDF"), "income tax act");
        assert_eq!(normalize_identifier("README"), "readme");
        assert_eq!(normalize_identifier(".hidden"), "hidden");
    }

    #[test]
    fn test_name_match_cites_only_mentioned_documents() {
        let hits = vec![
            hit("vat_rules.pdf", 2),
            hit("TaxGuide.pdf", 1),
            hit("vat_rules.pdf", 5),
            hit("stamp.pdf", 3),
        ];
        let attributor = SourceAttributor::default();

        let sources = attributor.attribute("According to the VAT rules, registration is required.", &hits);
        assert_eq!(sources, vec![src("vat_rules.pdf", 2), src("vat_rules.pdf", 5)]);
    }

    #[test]
    fn test_name_match_compact_form() {
        let hits = vec![hit("stamp.pdf", 1), hit("tax-guide.pdf", 4)];
        let attributor = SourceAttributor::default();

        let sources = attributor.attribute("See the TaxGuide for details.", &hits);
        assert_eq!(sources, vec![src("tax-guide.pdf", 4)]);
    }

    #[test]
    fn test_fallback_to_top_three_documents() {
        let hits = vec![
            hit("delta.pdf", 9),
            hit("bravo.pdf", 2),
            hit("delta.pdf", 1),
            hit("alpha.pdf", 7),
            hit("charlie.pdf", 1),
        ];
        let attributor = SourceAttributor::default();

        let sources = attributor.attribute("The rate is fifteen percent.", &hits);
        assert_eq!(
            sources,
            vec![
                src("alpha.pdf", 7),
                src("bravo.pdf", 2),
                src("delta.pdf", 1),
                src("delta.pdf", 9)
            ]
        );
    }

    #[test]
    fn test_short_identifier_matches_inside_word() {
        let hits = vec![hit("income.pdf", 1), hit("VAT.pdf", 3), hit("stamp.pdf", 2)];
        let answer = "Exports are VATable at zero rate.";

        let sources = SourceAttributor::default().attribute(answer, &hits);
        assert_eq!(sources, vec![src("VAT.pdf", 3)]);

        // 단어 경계만 허용하면 일치 없음 → 상위 문서로 대체
        let strict = SourceAttributor::new(AttributionConfig {
            strategy: AttributionStrategy::NameMatchStrict,
            ..Default::default()
        });
        assert_eq!(
            strict.attribute(answer, &hits),
            vec![src("VAT.pdf", 3), src("income.pdf", 1), src("stamp.pdf", 2)]
        );
    }

    #[test]
    fn test_strict_rejects_single_letter_names() {
        let hits = vec![hit("a.pdf", 1), hit("rates.pdf", 4)];
        let strict = SourceAttributor::new(AttributionConfig {
            strategy: AttributionStrategy::NameMatchStrict,
            ..Default::default()
        });

        let sources = strict.attribute("The rates table lists thresholds.", &hits);
        assert_eq!(sources, vec![src("rates.pdf", 4)]);
    }

    #[test]
    fn test_zero_fallback_still_cites_one_document() {
        let hits = vec![hit("first.pdf", 2), hit("second.pdf", 1)];
        let attributor = SourceAttributor::new(AttributionConfig {
            fallback_top_n: 0,
            ..Default::default()
        });

        let sources = attributor.attribute("no names here", &hits);
        assert_eq!(sources, vec![src("first.pdf", 2)]);
    }

    #[test]
    fn test_output_sorted_and_deduplicated() {
        let hits = vec![hit("b.pdf", 3), hit("a.pdf", 2), hit("b.pdf", 1), hit("b.pdf", 3)];
        let attributor = SourceAttributor::new(AttributionConfig {
            strategy: AttributionStrategy::AllRetrieved,
            ..Default::default()
        });

        let sources = attributor.attribute("anything", &hits);
        assert_eq!(sources, vec![src("a.pdf", 2), src("b.pdf", 1), src("b.pdf", 3)]);
    }

    #[test]
    fn test_top_ranked_strategy() {
        let hits = vec![hit("z.pdf", 1), hit("y.pdf", 2), hit("x.pdf", 3)];
        let attributor = SourceAttributor::new(AttributionConfig {
            strategy: AttributionStrategy::TopRanked,
            top_ranked_chunks: 2,
            ..Default::default()
        });

        let sources = attributor.attribute("z.pdf says so", &hits);
        assert_eq!(sources, vec![src("y.pdf", 2), src("z.pdf", 1)]);
    }

    #[test]
    fn test_no_retrieval_no_sources() {
        let attributor = SourceAttributor::default();
        assert!(attributor.attribute("anything", &[]).is_empty());
    }

    #[test]
    fn test_source_serializes_as_file_page() {
        let json = serde_json::to_value(src("TaxGuide.pdf", 1)).unwrap();
        assert_eq!(json, serde_json::json!({"file": "TaxGuide.pdf", "page": 1}));
    }
}
