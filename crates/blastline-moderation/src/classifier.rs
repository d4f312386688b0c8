//! AI classifier clients, stages three and five of the gate.
//!
//! Provider-agnostic traits with HTTP implementations. Responses are
//! parsed into narrow typed structs; any unexpected shape is a
//! classification failure that the gate turns into a block. Transient
//! failures (connect errors, 5xx, 429) retry with bounded backoff and
//! honor a numeric `Retry-After` hint.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use blastline_core::backoff::{BackoffPolicy, parse_retry_after};
use blastline_core::config::ModerationConfig;
use blastline_core::error::{BlastlineError, Result};
use serde::Deserialize;

/// Result of the coarse moderation classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct CoarseVerdict {
    pub flagged: bool,
    /// Names of the categories that flagged, sorted for determinism.
    pub categories: Vec<String>,
    /// 0-100, derived from the highest category score.
    pub risk_score: u8,
}

/// Result of the fine-grained illegal-trade classifier.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TradeVerdict {
    pub illegal_trade: bool,
    pub category: String,
    pub confidence: f32,
}

/// Coarse text moderation: text in, categories and a score out.
#[async_trait]
pub trait ModerationClassifier: Send + Sync {
    fn name(&self) -> &str;
    async fn classify(&self, text: &str) -> Result<CoarseVerdict>;
}

/// Fine-grained illegal-trade categorization.
#[async_trait]
pub trait TradeClassifier: Send + Sync {
    fn name(&self) -> &str;
    async fn classify_trade(&self, text: &str) -> Result<TradeVerdict>;
}

// Wire format of the coarse endpoint: {model, input} in,
// {results:[{flagged, categories, category_scores}]} out.
#[derive(Debug, Deserialize)]
struct ModerationApiResponse {
    results: Vec<ModerationApiResult>,
}

#[derive(Debug, Deserialize)]
struct ModerationApiResult {
    flagged: bool,
    #[serde(default)]
    categories: HashMap<String, bool>,
    #[serde(default)]
    category_scores: HashMap<String, f32>,
}

/// HTTP client for an OpenAI-compatible moderations endpoint.
pub struct HttpModerationClassifier {
    endpoint: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
    backoff: BackoffPolicy,
}

impl HttpModerationClassifier {
    pub fn new(config: &ModerationConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
            backoff: BackoffPolicy::default(),
        }
    }
}

#[async_trait]
impl ModerationClassifier for HttpModerationClassifier {
    fn name(&self) -> &str {
        "http-moderation"
    }

    async fn classify(&self, text: &str) -> Result<CoarseVerdict> {
        let body = serde_json::json!({ "model": self.model, "input": text });
        let mut req = self.client.post(&self.endpoint).json(&body);
        if !self.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = send_with_retry(req, &self.backoff, "moderation classifier").await?;
        let parsed: ModerationApiResponse = response
            .json()
            .await
            .map_err(|e| BlastlineError::Moderation(format!("unexpected response shape: {e}")))?;

        let result = parsed
            .results
            .into_iter()
            .next()
            .ok_or_else(|| BlastlineError::Moderation("empty results".into()))?;

        let mut categories: Vec<String> = result
            .categories
            .iter()
            .filter(|&(_, &hit)| hit)
            .map(|(name, _)| name.clone())
            .collect();
        categories.sort();

        let max_score = result
            .category_scores
            .values()
            .fold(0.0f32, |acc, &s| acc.max(s));
        let risk_score = (max_score.clamp(0.0, 1.0) * 100.0).round() as u8;

        Ok(CoarseVerdict { flagged: result.flagged, categories, risk_score })
    }
}

/// HTTP client for the fine illegal-trade endpoint. The contract is a
/// strict JSON object `{illegal_trade, category, confidence}`; anything
/// else fails the classification.
pub struct HttpTradeClassifier {
    endpoint: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
    backoff: BackoffPolicy,
}

impl HttpTradeClassifier {
    pub fn new(endpoint: &str, config: &ModerationConfig) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
            backoff: BackoffPolicy::default(),
        }
    }
}

#[async_trait]
impl TradeClassifier for HttpTradeClassifier {
    fn name(&self) -> &str {
        "http-trade"
    }

    async fn classify_trade(&self, text: &str) -> Result<TradeVerdict> {
        let body = serde_json::json!({ "model": self.model, "input": text });
        let mut req = self.client.post(&self.endpoint).json(&body);
        if !self.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = send_with_retry(req, &self.backoff, "trade classifier").await?;
        let verdict: TradeVerdict = response
            .json()
            .await
            .map_err(|e| BlastlineError::Moderation(format!("unexpected trade response: {e}")))?;

        if !(0.0..=1.0).contains(&verdict.confidence) {
            return Err(BlastlineError::Moderation(format!(
                "confidence out of range: {}",
                verdict.confidence
            )));
        }
        Ok(verdict)
    }
}

/// POST with bounded exponential backoff on transient failures.
async fn send_with_retry(
    req: reqwest::RequestBuilder,
    policy: &BackoffPolicy,
    what: &str,
) -> Result<reqwest::Response> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        // JSON bodies are always clonable; streaming bodies are not used here.
        let this_try = req
            .try_clone()
            .ok_or_else(|| BlastlineError::Http(format!("{what}: request not retryable")))?;

        match this_try.send().await {
            Ok(resp) if resp.status().is_success() => return Ok(resp),
            Ok(resp) => {
                let status = resp.status();
                let retryable = status.as_u16() == 429 || status.is_server_error();
                if retryable && policy.should_retry(attempt) {
                    let hint = resp
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .and_then(parse_retry_after);
                    let delay = policy.delay_with_hint(attempt, hint);
                    tracing::warn!("⏳ {what} returned {status}, retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                let text = resp.text().await.unwrap_or_default();
                return Err(BlastlineError::Http(format!("{what} error {status}: {text}")));
            }
            Err(e) if policy.should_retry(attempt) => {
                let delay = policy.delay(attempt);
                tracing::warn!("⏳ {what} unreachable ({e}), retrying in {delay:?}");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(BlastlineError::Http(format!("{what} failed: {e}"))),
        }
    }
}
