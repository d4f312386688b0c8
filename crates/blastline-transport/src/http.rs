//! HTTP transport client against a session-based chat gateway.
//!
//! Endpoints: `POST /api/sendText`, `POST /api/sendMedia`,
//! `GET /api/sessions/{session}`. Responses parse into narrow typed
//! structs; a shape we do not recognize is a failed send, never an
//! assumed success. Transient failures (connect, 5xx, 429) retry with
//! bounded backoff honoring `Retry-After`.

use std::time::Duration;

use async_trait::async_trait;
use blastline_core::backoff::{BackoffPolicy, parse_retry_after};
use blastline_core::config::TransportConfig;
use blastline_core::error::{BlastlineError, Result};
use serde::Deserialize;

use crate::{MediaPayload, SendOutcome, SessionState, Transport};

/// Successful send acknowledgement. The provider message id is required;
/// an acknowledgement without one is treated as a failure.
#[derive(Debug, Deserialize)]
struct SendAccepted {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SessionInfo {
    status: String,
}

pub struct HttpTransport {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    backoff: BackoffPolicy,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
            backoff: BackoffPolicy {
                max_attempts: config.max_attempts.max(1),
                ..BackoffPolicy::default()
            },
        }
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            req
        } else {
            req.header("X-Api-Key", &self.api_key)
        }
    }

    /// POST a send request; retry transient failures, convert provider
    /// rejections into `SendOutcome::Failed`.
    async fn post_send(&self, path: &str, body: serde_json::Value) -> Result<SendOutcome> {
        let url = format!("{}{path}", self.base_url);
        let req = self.authed(self.client.post(&url).json(&body));

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let this_try = req
                .try_clone()
                .ok_or_else(|| BlastlineError::Http("send request not retryable".into()))?;

            match this_try.send().await {
                Ok(resp) if resp.status().is_success() => {
                    return match resp.json::<SendAccepted>().await {
                        Ok(ack) => Ok(SendOutcome::Sent { message_id: ack.id }),
                        Err(e) => Ok(SendOutcome::Failed {
                            error: format!("unexpected send acknowledgement: {e}"),
                        }),
                    };
                }
                Ok(resp) => {
                    let status = resp.status();
                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    if retryable && self.backoff.should_retry(attempt) {
                        let hint = resp
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(parse_retry_after);
                        let delay = self.backoff.delay_with_hint(attempt, hint);
                        tracing::warn!("⏳ transport returned {status}, retrying in {delay:?}");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    let text = resp.text().await.unwrap_or_default();
                    // Provider rejection: a failed attempt, not an engine error.
                    return Ok(SendOutcome::Failed { error: format!("{status}: {text}") });
                }
                Err(e) if self.backoff.should_retry(attempt) => {
                    let delay = self.backoff.delay(attempt);
                    tracing::warn!("⏳ transport unreachable ({e}), retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(BlastlineError::Transport(format!("send failed: {e}")));
                }
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http-gateway"
    }

    async fn send_text(&self, session: &str, chat_id: &str, text: &str) -> Result<SendOutcome> {
        let body = serde_json::json!({
            "session": session,
            "chatId": chat_id,
            "text": text,
        });
        self.post_send("/api/sendText", body).await
    }

    async fn send_media(
        &self,
        session: &str,
        chat_id: &str,
        media: &MediaPayload,
        caption: Option<&str>,
    ) -> Result<SendOutcome> {
        let body = serde_json::json!({
            "session": session,
            "chatId": chat_id,
            "url": media.url,
            "type": media.kind.as_str(),
            "caption": caption,
            "filename": media.filename,
            "mimetype": media.mime_type,
        });
        self.post_send("/api/sendMedia", body).await
    }

    async fn session_status(&self, session: &str) -> Result<SessionState> {
        let url = format!("{}/api/sessions/{session}", self.base_url);
        let resp = self
            .authed(self.client.get(&url))
            .send()
            .await
            .map_err(|e| BlastlineError::Transport(format!("session status: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(BlastlineError::Transport(format!("session status: {status}")));
        }

        let info: SessionInfo = resp
            .json()
            .await
            .map_err(|e| BlastlineError::Transport(format!("unexpected session info: {e}")))?;
        Ok(SessionState::from_api(&info.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_acknowledgement_requires_id() {
        let ok: SendAccepted =
            serde_json::from_str(r#"{"id": "true_919876543210@c.us_ABCD"}"#).unwrap();
        assert_eq!(ok.id, "true_919876543210@c.us_ABCD");

        assert!(serde_json::from_str::<SendAccepted>(r#"{"ok": true}"#).is_err());
    }

    #[test]
    fn test_session_info_parse() {
        let info: SessionInfo = serde_json::from_str(r#"{"status": "WORKING"}"#).unwrap();
        assert_eq!(SessionState::from_api(&info.status), SessionState::Connected);
    }
}
