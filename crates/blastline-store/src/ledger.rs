//! Duplicate ledger: append-only send history, the at-most-once guarantee.
//!
//! Each attempt inserts exactly one row; nothing is ever overwritten. A
//! recipient is retried only while no `sent` row exists for the
//! (campaign, recipient, session) triple, which is what makes a
//! watchdog-triggered resume safe against double delivery.

use blastline_core::error::{BlastlineError, Result};
use blastline_core::types::{SendRecord, SendStatus};
use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::Store;

impl Store {
    /// Has this exact (campaign, recipient, session) triple already been
    /// delivered? Consulted immediately before every send attempt.
    pub fn already_sent(&self, campaign_id: &str, recipient: &str, session_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM send_records
                 WHERE campaign_id = ?1 AND recipient = ?2 AND session_id = ?3
                   AND status = 'sent'",
                params![campaign_id, recipient, session_id],
                |r| r.get(0),
            )
            .map_err(|e| BlastlineError::Storage(format!("Ledger query: {e}")))?;
        Ok(count > 0)
    }

    /// Append one attempt record. The metadata blob always carries the
    /// `campaign_id` tag, even if the caller forgot it.
    pub fn record_attempt(&self, record: &SendRecord) -> Result<()> {
        let mut metadata = record.metadata.clone();
        if let Some(map) = metadata.as_object_mut() {
            map.entry("campaign_id")
                .or_insert_with(|| serde_json::Value::String(record.campaign_id.clone()));
        } else {
            metadata = serde_json::json!({ "campaign_id": record.campaign_id });
        }

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO send_records
             (campaign_id, recipient, session_id, status, message_id, error, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.campaign_id,
                record.recipient,
                record.session_id,
                record.status.as_str(),
                record.message_id,
                record.error,
                metadata.to_string(),
                record.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| BlastlineError::Storage(format!("Ledger insert: {e}")))?;
        Ok(())
    }

    /// All attempt records for a campaign, oldest first.
    pub fn records_for_campaign(&self, campaign_id: &str) -> Result<Vec<SendRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT campaign_id, recipient, session_id, status, message_id, error,
                        metadata, created_at
                 FROM send_records WHERE campaign_id = ?1 ORDER BY id",
            )
            .map_err(|e| BlastlineError::Storage(format!("Ledger scan: {e}")))?;
        let rows = stmt
            .query_map(params![campaign_id], |row| {
                let status_str: String = row.get(3)?;
                let metadata_str: String = row.get(6)?;
                let created_str: String = row.get(7)?;
                Ok(SendRecord {
                    campaign_id: row.get(0)?,
                    recipient: row.get(1)?,
                    session_id: row.get(2)?,
                    status: SendStatus::parse(&status_str).unwrap_or(SendStatus::Failed),
                    message_id: row.get(4)?,
                    error: row.get(5)?,
                    metadata: serde_json::from_str(&metadata_str).unwrap_or_default(),
                    created_at: DateTime::parse_from_rfc3339(&created_str)
                        .map(|d| d.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                })
            })
            .map_err(|e| BlastlineError::Storage(format!("Ledger scan: {e}")))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Count of delivered rows for (campaign, recipient) across sessions.
    /// Used by tests to assert the at-most-once invariant.
    pub fn sent_count(&self, campaign_id: &str, recipient: &str) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM send_records
                 WHERE campaign_id = ?1 AND recipient = ?2 AND status = 'sent'",
                params![campaign_id, recipient],
                |r| r.get(0),
            )
            .map_err(|e| BlastlineError::Storage(format!("Ledger count: {e}")))?;
        Ok(count as u64)
    }
}
