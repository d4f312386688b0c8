//! Error taxonomy for the campaign engine.
//!
//! Setup-fatal, per-recipient and race conditions are distinct variants so
//! the dispatch worker can route each to the right terminal state instead
//! of guessing from error text.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, BlastlineError>;

#[derive(Debug, Error)]
pub enum BlastlineError {
    /// Configuration load/parse failure.
    #[error("config error: {0}")]
    Config(String),

    /// SQLite storage failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Outbound HTTP failure (transport or classifier).
    #[error("http error: {0}")]
    Http(String),

    /// Transport API rejected the request or the session is unusable.
    #[error("transport error: {0}")]
    Transport(String),

    /// Moderation classifier failure. The gate converts this into the
    /// fail-closed verdict; it never escapes `evaluate()`.
    #[error("moderation error: {0}")]
    Moderation(String),

    /// Attachment upload/materialization failure. Campaign-fatal.
    #[error("media error: {0}")]
    Media(String),

    /// Phone input that cannot be normalized into a canonical address.
    #[error("invalid phone number: {0}")]
    InvalidPhone(String),

    /// Campaign id not present in storage.
    #[error("campaign not found: {0}")]
    CampaignNotFound(String),

    /// The campaign's recipient source resolved to nothing. Setup-fatal.
    #[error("contact source empty: {0}")]
    EmptyContactSource(String),

    /// Another worker already owns this campaign. Not an error for the
    /// caller; the losing claimant exits without side effects.
    #[error("campaign already running: {0}")]
    AlreadyRunning(String),

    /// Campaign in a state that cannot be claimed (completed/cancelled).
    #[error("campaign not claimable: {0} is {1}")]
    NotClaimable(String, String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
