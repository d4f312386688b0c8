//! Campaign data model: the shared vocabulary of the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bulk-send campaign: one message template, one resolved contact set,
/// optional attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    /// Opaque campaign id.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Message template with `{field}` placeholders filled per contact.
    pub template: String,
    /// Optional media attachment.
    pub attachment: Option<Attachment>,
    /// Reference to the contact source (list id) this campaign targets.
    pub contact_source: String,
    /// Transport session that sends on behalf of this campaign.
    pub session_id: String,
    /// Current lifecycle status.
    pub status: CampaignStatus,
    /// Successful send attempts so far.
    pub messages_sent: u64,
    /// Failed send attempts so far.
    pub messages_failed: u64,
    /// Deduplicated recipient count, set once contacts are resolved.
    pub total_recipients: u64,
    /// Batching/pacing knobs.
    pub batching: BatchingConfig,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Campaign {
    /// Create a pending campaign with default pacing.
    pub fn new(name: &str, template: &str, contact_source: &str, session_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            template: template.to_string(),
            attachment: None,
            contact_source: contact_source.to_string(),
            session_id: session_id.to_string(),
            status: CampaignStatus::Pending,
            messages_sent: 0,
            messages_failed: 0,
            total_recipients: 0,
            batching: BatchingConfig::default(),
            created_at: now,
            started_at: None,
            updated_at: now,
            completed_at: None,
        }
    }
}

/// Campaign lifecycle status.
///
/// `Running` implies exactly one active worker owns the campaign; the
/// watchdog is the only path from `Running` back to `Pending`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Pending => "pending",
            CampaignStatus::Running => "running",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Completed => "completed",
            CampaignStatus::Failed => "failed",
            CampaignStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CampaignStatus::Pending),
            "running" => Some(CampaignStatus::Running),
            "paused" => Some(CampaignStatus::Paused),
            "completed" => Some(CampaignStatus::Completed),
            "failed" => Some(CampaignStatus::Failed),
            "cancelled" => Some(CampaignStatus::Cancelled),
            _ => None,
        }
    }

    /// Whether a worker may claim a campaign in this state.
    pub fn is_claimable(&self) -> bool {
        matches!(self, CampaignStatus::Pending | CampaignStatus::Paused)
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Batching and pacing configuration.
///
/// Randomized sizes and waits make bulk traffic resemble human sending;
/// the uniform-draw bounds are contractual, not cosmetic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchingConfig {
    /// When false the whole contact set is one batch.
    #[serde(default = "default_true")]
    pub use_batching: bool,
    /// Inclusive batch size bounds.
    #[serde(default = "default_batch_min")]
    pub batch_size_min: u32,
    #[serde(default = "default_batch_max")]
    pub batch_size_max: u32,
    /// Inter-batch cooldown bounds in fractional minutes.
    #[serde(default = "default_cooldown_min")]
    pub cooldown_min: f64,
    #[serde(default = "default_cooldown_max")]
    pub cooldown_max: f64,
    /// Per-message delay bounds in seconds.
    #[serde(default = "default_delay_min")]
    pub per_message_delay_min: f64,
    #[serde(default = "default_delay_max")]
    pub per_message_delay_max: f64,
}

fn default_true() -> bool {
    true
}
fn default_batch_min() -> u32 {
    5
}
fn default_batch_max() -> u32 {
    15
}
fn default_cooldown_min() -> f64 {
    2.0
}
fn default_cooldown_max() -> f64 {
    5.0
}
fn default_delay_min() -> f64 {
    3.0
}
fn default_delay_max() -> f64 {
    9.0
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            use_batching: default_true(),
            batch_size_min: default_batch_min(),
            batch_size_max: default_batch_max(),
            cooldown_min: default_cooldown_min(),
            cooldown_max: default_cooldown_max(),
            per_message_delay_min: default_delay_min(),
            per_message_delay_max: default_delay_max(),
        }
    }
}

/// Media attachment reference carried by a campaign.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    /// Local path or already-durable URL.
    pub location: String,
    pub kind: AttachmentKind,
    /// Filename presented to recipients (required for documents).
    pub filename: Option<String>,
    /// Mime type (required for documents).
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Video,
    Document,
    Audio,
}

impl AttachmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentKind::Image => "image",
            AttachmentKind::Video => "video",
            AttachmentKind::Document => "document",
            AttachmentKind::Audio => "audio",
        }
    }
}

/// A recipient contact. Read-only from the engine's perspective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    /// Raw phone string as entered/imported.
    pub phone: String,
    /// Personalization fields used by template rendering.
    #[serde(default)]
    pub fields: std::collections::HashMap<String, String>,
    /// Whether the transport platform confirmed an active chat account.
    #[serde(default)]
    pub verified: bool,
}

/// One recorded send attempt, the unit of the duplicate ledger.
/// Records are append-only; a retry inserts a new row, never overwrites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRecord {
    pub campaign_id: String,
    /// Canonical recipient address (ledger/dedup key).
    pub recipient: String,
    pub session_id: String,
    pub status: SendStatus,
    /// Provider message id when the transport accepted the message.
    pub message_id: Option<String>,
    /// Error detail for failed attempts.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Free-form metadata; always carries a `campaign_id` tag.
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    Sent,
    Failed,
    Queued,
}

impl SendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SendStatus::Sent => "sent",
            SendStatus::Failed => "failed",
            SendStatus::Queued => "queued",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(SendStatus::Sent),
            "failed" => Some(SendStatus::Failed),
            "queued" => Some(SendStatus::Queued),
            _ => None,
        }
    }
}

/// What the control probe tells the worker at each iteration boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunSignal {
    /// Keep going.
    Continue,
    /// Halt immediately, persist partial counters, leave status as paused.
    Pause,
    /// Terminal stop; no further processing.
    Cancel,
}
