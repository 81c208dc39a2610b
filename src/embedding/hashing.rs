//! 오프라인 특징 해싱(feature hashing) 임베딩
//!
//! 네트워크 없이 동작하는 결정적 임베딩입니다.
//! 토큰을 FNV-1a 해시로 버킷에 배정하고, 부호 비트로 충돌 편향을 줄입니다.
//! 해시 함수가 고정되어 있으므로 저장된 인덱스는 버전이 바뀌어도 유효합니다.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use super::EmbeddingProvider;
use crate::knowledge::l2_normalize;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 특징 해싱 임베딩
#[derive(Debug, Clone)]
pub struct HashingEmbedding {
    dimension: usize,
}

impl HashingEmbedding {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            anyhow::bail!("Hashing embedding dimension must be greater than 0");
        }
        Ok(Self { dimension })
    }

    /// 소문자 영숫자 토큰
    fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut counts: HashMap<String, u32> = HashMap::new();
        for token in Self::tokens(text) {
            *counts.entry(token).or_insert(0) += 1;
        }

        let mut vector = vec![0.0f32; self.dimension];
        for (token, tf) in counts {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            // 준선형 tf 가중치
            vector[bucket] += sign * (1.0 + (tf as f32).ln());
        }

        l2_normalize(&mut vector);
        vector
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "feature-hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::squared_l2;

    #[test]
    fn test_fnv1a_known_values() {
        assert_eq!(fnv1a(b""), FNV_OFFSET);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[tokio::test]
    async fn test_deterministic_and_normalized() {
        let e = HashingEmbedding::new(128).unwrap();
        let a = e.embed("Corporate income tax rate").await.unwrap();
        let b = e.embed("corporate INCOME tax, rate").await.unwrap();

        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_similar_texts_are_closer() {
        let e = HashingEmbedding::new(1024).unwrap();
        let q = e.embed("stamp duty exemption").await.unwrap();
        let near = e.embed("the stamp duty exemption applies to").await.unwrap();
        let far = e.embed("vehicle import licence fees").await.unwrap();

        assert!(squared_l2(&q, &near) < squared_l2(&q, &far));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(HashingEmbedding::new(0).is_err());
    }
}
