//! Google Gemini 임베딩 프로바이더
//!
//! source: https://ai.google.dev/gemini-api/docs/embeddings
//!
//! 문단은 `batchEmbedContents`로 묶어서 보내고, 질의는 `embedContent`로 보냅니다.
//! 두 호출 모두 같은 분당 요청 한도와 429 백오프를 공유합니다.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{get_api_key, EmbedRole, EmbeddingProvider};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const MODEL: &str = "models/gemini-embedding-001";

/// 기본 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 768;

/// MRL로 잘라 쓸 수 있는 차원
const SUPPORTED_DIMENSIONS: [usize; 3] = [768, 1536, 3072];

/// 기본 분당 요청 수 (무료 티어)
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 60;

/// 배치 요청당 최대 텍스트 수
const MAX_BATCH: usize = 100;

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Request Throttle
// ============================================================================

/// 60초 슬라이딩 윈도우 요청 제한
///
/// 호출 간격도 `60s / rpm` 이상으로 벌려서 버스트를 막습니다.
#[derive(Debug)]
struct Throttle {
    sent: VecDeque<Instant>,
    limit: usize,
    spacing: Duration,
}

impl Throttle {
    const WINDOW: Duration = Duration::from_secs(60);

    fn per_minute(requests: u32) -> Self {
        let requests = requests.max(1);
        Self {
            sent: VecDeque::with_capacity(requests as usize),
            limit: requests as usize,
            spacing: Self::WINDOW / requests,
        }
    }

    /// 다음 요청까지 기다려야 하는 시간
    fn delay_at(&mut self, now: Instant) -> Duration {
        while let Some(&oldest) = self.sent.front() {
            if now.duration_since(oldest) >= Self::WINDOW {
                self.sent.pop_front();
            } else {
                break;
            }
        }

        let spacing_wait = self
            .sent
            .back()
            .map(|&last| self.spacing.saturating_sub(now.duration_since(last)))
            .unwrap_or_default();

        let window_wait = if self.sent.len() >= self.limit {
            self.sent
                .front()
                .map(|&oldest| Self::WINDOW.saturating_sub(now.duration_since(oldest)))
                .unwrap_or_default()
        } else {
            Duration::ZERO
        };

        spacing_wait.max(window_wait)
    }

    async fn wait_turn(&mut self) {
        let delay = self.delay_at(Instant::now());
        if !delay.is_zero() {
            tracing::debug!("Gemini throttle: waiting {:?}", delay);
            tokio::time::sleep(delay).await;
        }
        self.sent.push_back(Instant::now());
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'static str,
    content: Content<'a>,
    task_type: &'static str,
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Values,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    embeddings: Vec<Values>,
}

#[derive(Debug, Deserialize)]
struct Values {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

// ============================================================================
// Provider
// ============================================================================

/// Google Gemini 임베딩 구현체
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    client: reqwest::Client,
    dimension: usize,
    throttle: Arc<Mutex<Throttle>>,
}

impl GeminiEmbedding {
    /// 차원과 분당 요청 수를 지정하여 생성
    pub fn new(api_key: String, dimension: usize, requests_per_minute: u32) -> Result<Self> {
        if !SUPPORTED_DIMENSIONS.contains(&dimension) {
            anyhow::bail!(
                "Unsupported Gemini dimension {} (expected one of {:?})",
                dimension,
                SUPPORTED_DIMENSIONS
            );
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            client,
            dimension,
            throttle: Arc::new(Mutex::new(Throttle::per_minute(requests_per_minute))),
        })
    }

    /// 환경변수의 API 키로 생성
    pub fn from_env(dimension: usize, requests_per_minute: u32) -> Result<Self> {
        Self::new(get_api_key()?, dimension, requests_per_minute)
    }

    /// 접두어로 Gemini task type 결정
    ///
    /// 접두어는 텍스트에 그대로 남기고, task type은 같은 역할로 맞춥니다.
    fn task_type(text: &str) -> &'static str {
        if text.starts_with(EmbedRole::Query.prefix()) {
            "RETRIEVAL_QUERY"
        } else {
            "RETRIEVAL_DOCUMENT"
        }
    }

    fn request_for<'a>(&self, text: &'a str) -> EmbedRequest<'a> {
        EmbedRequest {
            model: MODEL,
            content: Content {
                parts: [Part { text }],
            },
            task_type: Self::task_type(text),
            output_dimensionality: self.dimension,
        }
    }

    fn check_dimension(&self, values: &[f32]) -> Result<()> {
        if values.len() != self.dimension {
            anyhow::bail!(
                "Gemini returned {} dimensions, expected {}",
                values.len(),
                self.dimension
            );
        }
        Ok(())
    }

    /// 제한/재시도를 거쳐 POST
    ///
    /// 429와 전송 오류만 재시도하고, 그 외 상태 코드는 바로 실패합니다.
    async fn post<B, R>(&self, method: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}:{}", API_BASE, MODEL, method);
        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 0;

        loop {
            self.throttle.lock().await.wait_turn().await;

            // API 키는 URL이 아닌 헤더로 전송
            let sent = self
                .client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(body)
                .send()
                .await;

            let retry_reason = match sent {
                Ok(response) if response.status().is_success() => {
                    let text = response
                        .text()
                        .await
                        .context("Failed to read Gemini response")?;
                    return serde_json::from_str(&text)
                        .with_context(|| format!("Failed to parse Gemini {} response", method));
                }
                Ok(response) if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                    "rate limited (429)".to_string()
                }
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    match serde_json::from_str::<ApiErrorBody>(&text) {
                        Ok(body) => anyhow::bail!(
                            "Gemini API error ({} {}): {}",
                            status.as_u16(),
                            body.error.status,
                            body.error.message
                        ),
                        Err(_) => anyhow::bail!("Gemini API error ({}): {}", status, text),
                    }
                }
                Err(e) => format!("request failed: {}", e),
            };

            attempt += 1;
            if attempt > MAX_RETRIES {
                anyhow::bail!(
                    "Gemini {} gave up after {} retries: {}",
                    method,
                    MAX_RETRIES,
                    retry_reason
                );
            }

            tracing::warn!(
                "Gemini {}: {}, retrying in {:?} ({}/{})",
                method,
                retry_reason,
                backoff,
                attempt,
                MAX_RETRIES
            );
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let response: EmbedResponse = self.post("embedContent", &self.request_for(text)).await?;
        self.check_dimension(&response.embedding.values)?;
        Ok(response.embedding.values)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = vec![vec![0.0; self.dimension]; texts.len()];

        // 빈 텍스트는 요청하지 않고 영벡터로 둠
        let pending: Vec<usize> = texts
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.trim().is_empty())
            .map(|(i, _)| i)
            .collect();

        for (batch_no, batch) in pending.chunks(MAX_BATCH).enumerate() {
            tracing::debug!(
                "Gemini batch {}/{} ({} texts)",
                batch_no + 1,
                pending.len().div_ceil(MAX_BATCH),
                batch.len()
            );

            let request = BatchRequest {
                requests: batch.iter().map(|&i| self.request_for(&texts[i])).collect(),
            };
            let response: BatchResponse = self.post("batchEmbedContents", &request).await?;

            if response.embeddings.len() != batch.len() {
                anyhow::bail!(
                    "Gemini returned {} embeddings for a batch of {}",
                    response.embeddings.len(),
                    batch.len()
                );
            }

            for (&i, embedding) in batch.iter().zip(response.embeddings) {
                self.check_dimension(&embedding.values)?;
                results[i] = embedding.values;
            }
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "gemini-embedding-001"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn embedder(dimension: usize) -> Result<GeminiEmbedding> {
        GeminiEmbedding::new("fake_key".to_string(), dimension, DEFAULT_REQUESTS_PER_MINUTE)
    }

    #[test]
    fn test_dimension_must_be_supported() {
        let err = embedder(999).unwrap_err();
        assert!(err.to_string().contains("Unsupported Gemini dimension 999"));

        for dim in SUPPORTED_DIMENSIONS {
            assert!(embedder(dim).is_ok());
        }
    }

    #[test]
    fn test_task_type_follows_prefix() {
        assert_eq!(
            GeminiEmbedding::task_type("query: what is SET?"),
            "RETRIEVAL_QUERY"
        );
        assert_eq!(
            GeminiEmbedding::task_type("passage: SET is a tax"),
            "RETRIEVAL_DOCUMENT"
        );
    }

    #[test]
    fn test_request_wire_format() {
        let embedder = embedder(768).unwrap();
        let json = serde_json::to_value(embedder.request_for("query: vat rate")).unwrap();

        assert_eq!(json["model"], MODEL);
        assert_eq!(json["taskType"], "RETRIEVAL_QUERY");
        assert_eq!(json["outputDimensionality"], 768);
        assert_eq!(json["content"]["parts"][0]["text"], "query: vat rate");
    }

    #[test]
    fn test_throttle_spacing_and_window() {
        let mut throttle = Throttle::per_minute(2);
        let start = Instant::now();

        assert_eq!(throttle.delay_at(start), Duration::ZERO);
        throttle.sent.push_back(start);

        // 2 rpm → 최소 간격 30초
        assert_eq!(
            throttle.delay_at(start + Duration::from_secs(10)),
            Duration::from_secs(20)
        );

        throttle.sent.push_back(start + Duration::from_secs(30));
        // 윈도우가 찼으므로 가장 오래된 요청이 빠질 때까지 대기
        assert_eq!(
            throttle.delay_at(start + Duration::from_secs(40)),
            Duration::from_secs(20)
        );

        // 윈도우가 지나면 오래된 기록은 정리됨
        assert_eq!(
            throttle.delay_at(start + Duration::from_secs(75)),
            Duration::ZERO
        );
        assert_eq!(throttle.sent.len(), 1);
    }

    #[tokio::test]
    async fn test_blank_texts_skip_the_network() {
        let embedder = embedder(DEFAULT_DIMENSION).unwrap();

        let v = embedder.embed("   ").await.unwrap();
        assert_eq!(v.len(), DEFAULT_DIMENSION);
        assert!(v.iter().all(|x| *x == 0.0));

        let batch = embedder
            .embed_batch(&["".to_string(), " \n".to_string()])
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().flatten().all(|x| *x == 0.0));
    }
}
