//! Moderation incident audit rows: every block/review decision that
//! stopped a campaign, kept for operator inspection.

use blastline_core::error::{BlastlineError, Result};
use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::Store;

/// One audited gate decision.
#[derive(Debug, Clone)]
pub struct ModerationIncident {
    pub content_hash: String,
    pub risk_score: u8,
    pub blocked: bool,
    pub requires_review: bool,
    pub reasons: Vec<String>,
    pub allowed: bool,
    pub created_at: DateTime<Utc>,
}

impl Store {
    /// Persist an incident row.
    pub fn record_incident(&self, incident: &ModerationIncident) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO moderation_incidents
             (content_hash, risk_score, blocked, requires_review, reasons, allowed, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                incident.content_hash,
                incident.risk_score as i64,
                incident.blocked as i32,
                incident.requires_review as i32,
                serde_json::to_string(&incident.reasons).unwrap_or_else(|_| "[]".into()),
                incident.allowed as i32,
                incident.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| BlastlineError::Storage(format!("Record incident: {e}")))?;
        Ok(())
    }

    /// Most recent incidents, newest first.
    pub fn recent_incidents(&self, limit: usize) -> Result<Vec<ModerationIncident>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT content_hash, risk_score, blocked, requires_review, reasons, allowed, created_at
                 FROM moderation_incidents ORDER BY id DESC LIMIT ?1",
            )
            .map_err(|e| BlastlineError::Storage(format!("Incidents query: {e}")))?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                let reasons_str: String = row.get(4)?;
                let created_str: String = row.get(6)?;
                Ok(ModerationIncident {
                    content_hash: row.get(0)?,
                    risk_score: row.get::<_, i64>(1)? as u8,
                    blocked: row.get::<_, i32>(2)? != 0,
                    requires_review: row.get::<_, i32>(3)? != 0,
                    reasons: serde_json::from_str(&reasons_str).unwrap_or_default(),
                    allowed: row.get::<_, i32>(5)? != 0,
                    created_at: DateTime::parse_from_rfc3339(&created_str)
                        .map(|d| d.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                })
            })
            .map_err(|e| BlastlineError::Storage(format!("Incidents query: {e}")))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_list() {
        let store = Store::open_in_memory().unwrap();
        store
            .record_incident(&ModerationIncident {
                content_hash: "abc123".into(),
                risk_score: 85,
                blocked: true,
                requires_review: false,
                reasons: vec!["drug_trade".into()],
                allowed: false,
                created_at: Utc::now(),
            })
            .unwrap();

        let incidents = store.recent_incidents(10).unwrap();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].risk_score, 85);
        assert!(incidents[0].blocked);
        assert_eq!(incidents[0].reasons, vec!["drug_trade".to_string()]);
    }
}
