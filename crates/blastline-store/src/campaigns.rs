//! Campaign rows: atomic claim, status transitions, live counters.

use blastline_core::error::{BlastlineError, Result};
use blastline_core::types::{Campaign, CampaignStatus, RunSignal};
use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::Store;

impl Store {
    /// Insert a new campaign row.
    pub fn insert_campaign(&self, campaign: &Campaign) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO campaigns
             (id, name, template, attachment, contact_source, session_id, status,
              messages_sent, messages_failed, total_recipients, batching,
              created_at, started_at, updated_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                campaign.id,
                campaign.name,
                campaign.template,
                campaign
                    .attachment
                    .as_ref()
                    .map(|a| serde_json::to_string(a).unwrap_or_default()),
                campaign.contact_source,
                campaign.session_id,
                campaign.status.as_str(),
                campaign.messages_sent as i64,
                campaign.messages_failed as i64,
                campaign.total_recipients as i64,
                serde_json::to_string(&campaign.batching).unwrap_or_default(),
                campaign.created_at.to_rfc3339(),
                campaign.started_at.map(|t| t.to_rfc3339()),
                campaign.updated_at.to_rfc3339(),
                campaign.completed_at.map(|t| t.to_rfc3339()),
            ],
        )
        .map_err(|e| BlastlineError::Storage(format!("Insert campaign: {e}")))?;
        Ok(())
    }

    /// Fetch a campaign by id.
    pub fn get_campaign(&self, id: &str) -> Result<Campaign> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, template, attachment, contact_source, session_id, status,
                        messages_sent, messages_failed, total_recipients, batching,
                        created_at, started_at, updated_at, completed_at
                 FROM campaigns WHERE id = ?1",
            )
            .map_err(|e| BlastlineError::Storage(format!("Get campaign: {e}")))?;

        stmt.query_row(params![id], row_to_campaign)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    BlastlineError::CampaignNotFound(id.to_string())
                }
                other => BlastlineError::Storage(format!("Get campaign: {other}")),
            })
    }

    /// Atomically claim a campaign for a worker: compare-and-swap the
    /// status from pending/paused to running. Exactly one of two racing
    /// claimants wins; the loser sees `AlreadyRunning` and must exit
    /// without side effects.
    pub fn try_claim(&self, id: &str) -> Result<Campaign> {
        let now = Utc::now().to_rfc3339();
        {
            let conn = self.lock()?;
            let changed = conn
                .execute(
                    "UPDATE campaigns
                     SET status = 'running', started_at = ?1, updated_at = ?1
                     WHERE id = ?2 AND status IN ('pending', 'paused')",
                    params![now, id],
                )
                .map_err(|e| BlastlineError::Storage(format!("Claim campaign: {e}")))?;

            if changed == 0 {
                // Lost the swap. Find out why.
                let status: Option<String> = conn
                    .query_row(
                        "SELECT status FROM campaigns WHERE id = ?1",
                        params![id],
                        |r| r.get(0),
                    )
                    .ok();
                return match status.as_deref() {
                    None => Err(BlastlineError::CampaignNotFound(id.to_string())),
                    Some("running") => Err(BlastlineError::AlreadyRunning(id.to_string())),
                    Some(other) => {
                        Err(BlastlineError::NotClaimable(id.to_string(), other.to_string()))
                    }
                };
            }
        }
        self.get_campaign(id)
    }

    /// Terminal transition guarded on the row still being `running`, so a
    /// pause or cancel that lands just before completion is never
    /// overwritten. Returns whether the transition happened.
    pub fn finish_if_running(&self, id: &str, status: CampaignStatus) -> Result<bool> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        let changed = conn
            .execute(
                "UPDATE campaigns
                 SET status = ?1, updated_at = ?2, completed_at = ?2
                 WHERE id = ?3 AND status = 'running'",
                params![status.as_str(), now, id],
            )
            .map_err(|e| BlastlineError::Storage(format!("Finish: {e}")))?;
        Ok(changed > 0)
    }

    /// Request a cooperative pause. Only meaningful while pending/running.
    pub fn pause_campaign(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE campaigns SET status = 'paused', updated_at = ?1
                 WHERE id = ?2 AND status IN ('pending', 'running')",
                params![Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| BlastlineError::Storage(format!("Pause: {e}")))?;
        Ok(changed > 0)
    }

    /// Resume a paused campaign back to pending (the queue re-dispatches it).
    pub fn resume_campaign(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE campaigns SET status = 'pending', updated_at = ?1
                 WHERE id = ?2 AND status = 'paused'",
                params![Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| BlastlineError::Storage(format!("Resume: {e}")))?;
        Ok(changed > 0)
    }

    /// Cancel a campaign. Terminal; only non-terminal rows transition, so
    /// a finished run's record is never rewritten. Already-delivered
    /// messages stay recorded in the ledger.
    pub fn cancel_campaign(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        let changed = conn
            .execute(
                "UPDATE campaigns SET status = 'cancelled', updated_at = ?1, completed_at = ?1
                 WHERE id = ?2 AND status IN ('pending', 'running', 'paused')",
                params![now, id],
            )
            .map_err(|e| BlastlineError::Storage(format!("Cancel: {e}")))?;
        Ok(changed > 0)
    }

    /// Record one attempt outcome on the live counters. Called per attempt,
    /// not batched, so external readers observe progress mid-run.
    pub fn bump_counters(&self, id: &str, sent: u64, failed: u64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE campaigns
             SET messages_sent = messages_sent + ?1,
                 messages_failed = messages_failed + ?2,
                 updated_at = ?3
             WHERE id = ?4",
            params![sent as i64, failed as i64, Utc::now().to_rfc3339(), id],
        )
        .map_err(|e| BlastlineError::Storage(format!("Bump counters: {e}")))?;
        Ok(())
    }

    /// Set the deduplicated recipient total once contacts are resolved.
    pub fn set_total_recipients(&self, id: &str, total: u64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE campaigns SET total_recipients = ?1, updated_at = ?2 WHERE id = ?3",
            params![total as i64, Utc::now().to_rfc3339(), id],
        )
        .map_err(|e| BlastlineError::Storage(format!("Set total: {e}")))?;
        Ok(())
    }

    /// Re-derive counters from the ledger at the start of a run: sent is
    /// the distinct delivered recipients, failed starts at zero because
    /// every not-yet-delivered recipient is about to be retried. Keeps
    /// `sent + failed <= total` across crash-and-resume.
    pub fn sync_counters_with_ledger(&self, id: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE campaigns
             SET messages_sent = (
                     SELECT COUNT(DISTINCT recipient) FROM send_records
                     WHERE campaign_id = ?1 AND status = 'sent'
                 ),
                 messages_failed = 0,
                 updated_at = ?2
             WHERE id = ?1",
            params![id, Utc::now().to_rfc3339()],
        )
        .map_err(|e| BlastlineError::Storage(format!("Sync counters: {e}")))?;
        Ok(())
    }

    /// Heartbeat: bump `updated_at` so the watchdog sees the run is alive.
    pub fn touch_campaign(&self, id: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE campaigns SET updated_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), id],
        )
        .map_err(|e| BlastlineError::Storage(format!("Touch: {e}")))?;
        Ok(())
    }

    /// The control probe read: what should an in-flight worker do now?
    pub fn control_signal(&self, id: &str) -> Result<RunSignal> {
        let campaign = self.get_campaign(id)?;
        Ok(match campaign.status {
            CampaignStatus::Paused => RunSignal::Pause,
            CampaignStatus::Cancelled | CampaignStatus::Failed => RunSignal::Cancel,
            _ => RunSignal::Continue,
        })
    }

    /// Campaigns stuck in `running` with no update since `cutoff`.
    pub fn stale_running(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id FROM campaigns WHERE status = 'running' AND updated_at < ?1")
            .map_err(|e| BlastlineError::Storage(format!("Stale scan: {e}")))?;
        let rows = stmt
            .query_map(params![cutoff.to_rfc3339()], |r| r.get::<_, String>(0))
            .map_err(|e| BlastlineError::Storage(format!("Stale scan: {e}")))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Watchdog recovery: reset a stuck campaign back to pending. Guarded
    /// on the row still being `running` so a worker that woke up in the
    /// meantime is not clobbered.
    pub fn reset_stale_campaign(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE campaigns SET status = 'pending', updated_at = ?1
                 WHERE id = ?2 AND status = 'running'",
                params![Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| BlastlineError::Storage(format!("Reset stale: {e}")))?;
        Ok(changed > 0)
    }
}

fn row_to_campaign(row: &rusqlite::Row<'_>) -> rusqlite::Result<Campaign> {
    let status_str: String = row.get(6)?;
    let attachment_str: Option<String> = row.get(3)?;
    let batching_str: String = row.get(10)?;
    Ok(Campaign {
        id: row.get(0)?,
        name: row.get(1)?,
        template: row.get(2)?,
        attachment: attachment_str.and_then(|s| serde_json::from_str(&s).ok()),
        contact_source: row.get(4)?,
        session_id: row.get(5)?,
        status: CampaignStatus::parse(&status_str).unwrap_or(CampaignStatus::Pending),
        messages_sent: row.get::<_, i64>(7)? as u64,
        messages_failed: row.get::<_, i64>(8)? as u64,
        total_recipients: row.get::<_, i64>(9)? as u64,
        batching: serde_json::from_str(&batching_str).unwrap_or_default(),
        created_at: parse_ts(row.get::<_, String>(11)?),
        started_at: row.get::<_, Option<String>>(12)?.map(parse_ts),
        updated_at: parse_ts(row.get::<_, String>(13)?),
        completed_at: row.get::<_, Option<String>>(14)?.map(parse_ts),
    })
}

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
