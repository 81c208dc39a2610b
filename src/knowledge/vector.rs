//! Vector Index - 정확한(brute-force) L2 최근접 이웃 검색
//!
//! 정규화된 벡터에 대한 유클리드 거리는 코사인 거리와 같은 순위를 줍니다.
//! 벡터는 추가된 순서대로 평면 배열에 저장되며, 위치 i가 곧 청크 i입니다.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

// ============================================================================
// Types
// ============================================================================

/// 검색된 이웃
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// 인덱스 내 위치
    pub position: usize,
    /// 유클리드 거리 (작을수록 유사)
    pub distance: f32,
}

// ============================================================================
// FlatL2Index
// ============================================================================

/// 평면 L2 벡터 인덱스
///
/// 추가만 가능하며 재정렬/삭제는 지원하지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatL2Index {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    /// 빈 인덱스 생성
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// 평면 배열에서 복원
    pub fn from_flat(dimension: usize, data: Vec<f32>) -> Result<Self> {
        if dimension == 0 {
            return Err(RagError::IndexMismatch(
                "vector index dimension is 0".to_string(),
            ));
        }
        if data.len() % dimension != 0 {
            return Err(RagError::IndexMismatch(format!(
                "vector data length {} is not a multiple of dimension {}",
                data.len(),
                dimension
            )));
        }
        Ok(Self { dimension, data })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// 저장된 벡터 수
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_flat(&self) -> &[f32] {
        &self.data
    }

    /// 위치로 벡터 조회
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// 벡터 추가
    pub(crate) fn add(&mut self, vector: &[f32]) -> Result<()> {
        self.check_dimension(vector)?;
        self.data.extend_from_slice(vector);
        Ok(())
    }

    /// k개의 최근접 이웃 검색
    ///
    /// 거리 오름차순, 같은 거리는 위치 오름차순으로 정렬합니다.
    /// k가 인덱스 크기보다 크면 인덱스 크기로 줄입니다.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.check_dimension(query)?;

        let k = k.min(self.len());
        if k == 0 {
            return Ok(vec![]);
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, vector)| (position, squared_l2(query, vector)))
            .collect();

        let by_distance = |a: &(usize, f32), b: &(usize, f32)| {
            a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0))
        };

        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, by_distance);
            scored.truncate(k);
        }
        scored.sort_by(by_distance);

        Ok(scored
            .into_iter()
            .map(|(position, d2)| Neighbor {
                position,
                distance: d2.max(0.0).sqrt(),
            })
            .collect())
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(RagError::Embedding(format!(
                "vector dimension {} does not match index dimension {}",
                vector.len(),
                self.dimension
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 제곱 유클리드 거리
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// 단위 벡터로 정규화 (영벡터는 그대로)
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

// ============================================================================
// Tests
// ============================================================================
