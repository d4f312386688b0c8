//! # Blastline Transport
//!
//! The outbound side of the chat-transport gateway: a provider-agnostic
//! `Transport` trait, the HTTP implementation against a session-based
//! send API, and attachment materialization to durable URLs.

pub mod http;
pub mod media;

use async_trait::async_trait;
use blastline_core::error::Result;
use blastline_core::types::AttachmentKind;

/// Outcome of one send attempt. Expected failures (invalid number,
/// provider rejection) are data, not control-flow errors.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Sent { message_id: String },
    Failed { error: String },
}

/// Transport session health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Pending,
    Disconnected,
}

impl SessionState {
    /// Map the gateway's status strings onto the three states the engine
    /// cares about. Unknown strings read as disconnected.
    pub fn from_api(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "connected" | "working" | "authenticated" | "open" => SessionState::Connected,
            "pending" | "starting" | "scan_qr" | "connecting" => SessionState::Pending,
            _ => SessionState::Disconnected,
        }
    }
}

/// A materialized, sendable media attachment.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaPayload {
    /// Durable, publicly fetchable URL.
    pub url: String,
    pub kind: AttachmentKind,
    pub filename: Option<String>,
    pub mime_type: Option<String>,
}

/// The chat-transport client surface the dispatch worker drives.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    async fn send_text(&self, session: &str, chat_id: &str, text: &str) -> Result<SendOutcome>;

    async fn send_media(
        &self,
        session: &str,
        chat_id: &str,
        media: &MediaPayload,
        caption: Option<&str>,
    ) -> Result<SendOutcome>;

    async fn session_status(&self, session: &str) -> Result<SessionState>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_mapping() {
        assert_eq!(SessionState::from_api("WORKING"), SessionState::Connected);
        assert_eq!(SessionState::from_api("connected"), SessionState::Connected);
        assert_eq!(SessionState::from_api("SCAN_QR"), SessionState::Pending);
        assert_eq!(SessionState::from_api("stopped"), SessionState::Disconnected);
        assert_eq!(SessionState::from_api("???"), SessionState::Disconnected);
    }
}
