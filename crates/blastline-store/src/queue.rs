//! Dispatch job queue: crash-safe campaign hand-off to the worker pool.
//!
//! Dequeue is a transaction: select the oldest pending job, flip it to
//! `processing` with a lock deadline, commit. A worker that dies mid-job
//! leaves the row locked; `release_expired` returns those to pending so
//! the campaign (idempotent via the ledger) can be picked up again.

use blastline_core::error::{BlastlineError, Result};
use rusqlite::params;

use crate::Store;

/// A claimed queue entry.
#[derive(Debug, Clone)]
pub struct DispatchJob {
    pub id: i64,
    pub campaign_id: String,
    pub attempts: u32,
}

impl Store {
    /// Enqueue a campaign for dispatch. Duplicate entries are tolerated;
    /// the atomic campaign claim makes redundant pickups no-ops.
    pub fn enqueue(&self, campaign_id: &str) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO dispatch_jobs (campaign_id) VALUES (?1)",
            params![campaign_id],
        )
        .map_err(|e| BlastlineError::Storage(format!("Enqueue: {e}")))?;
        Ok(conn.last_insert_rowid())
    }

    /// Atomically pop the next pending job, marking it processing with a
    /// lock deadline. Returns `None` when the queue is empty.
    pub fn dequeue(&self, lock_secs: u64) -> Result<Option<DispatchJob>> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| BlastlineError::Storage(format!("Dequeue tx: {e}")))?;

        let found = {
            let mut stmt = tx
                .prepare(
                    "SELECT id, campaign_id, attempts FROM dispatch_jobs
                     WHERE status = 'pending'
                     ORDER BY id ASC LIMIT 1",
                )
                .map_err(|e| BlastlineError::Storage(format!("Dequeue: {e}")))?;
            stmt.query_row([], |row| {
                Ok(DispatchJob {
                    id: row.get(0)?,
                    campaign_id: row.get(1)?,
                    attempts: row.get::<_, i64>(2)? as u32,
                })
            })
        };

        match found {
            Ok(job) => {
                tx.execute(
                    "UPDATE dispatch_jobs
                     SET status = 'processing',
                         attempts = attempts + 1,
                         locked_until = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?1),
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?2",
                    params![format!("+{lock_secs} seconds"), job.id],
                )
                .map_err(|e| BlastlineError::Storage(format!("Dequeue lock: {e}")))?;
                tx.commit()
                    .map_err(|e| BlastlineError::Storage(format!("Dequeue commit: {e}")))?;
                Ok(Some(DispatchJob { attempts: job.attempts + 1, ..job }))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(BlastlineError::Storage(format!("Dequeue: {e}"))),
        }
    }

    /// Acknowledge a finished job (regardless of campaign outcome).
    pub fn ack_job(&self, id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE dispatch_jobs
             SET status = 'done', updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE id = ?1",
            params![id],
        )
        .map_err(|e| BlastlineError::Storage(format!("Ack: {e}")))?;
        Ok(())
    }

    /// Return jobs whose processing lock expired back to pending.
    /// Called from the watchdog pass. Returns how many were released.
    pub fn release_expired_jobs(&self) -> Result<usize> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE dispatch_jobs
                 SET status = 'pending', locked_until = NULL,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE status = 'processing'
                   AND locked_until < strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                [],
            )
            .map_err(|e| BlastlineError::Storage(format!("Release expired: {e}")))?;
        Ok(changed)
    }

    /// Pending jobs count (operator visibility).
    pub fn pending_jobs(&self) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM dispatch_jobs WHERE status = 'pending'",
                [],
                |r| r.get(0),
            )
            .map_err(|e| BlastlineError::Storage(format!("Pending count: {e}")))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let store = Store::open_in_memory().unwrap();
        store.enqueue("c1").unwrap();
        store.enqueue("c2").unwrap();

        let first = store.dequeue(300).unwrap().unwrap();
        assert_eq!(first.campaign_id, "c1");
        assert_eq!(first.attempts, 1);
        let second = store.dequeue(300).unwrap().unwrap();
        assert_eq!(second.campaign_id, "c2");
        assert!(store.dequeue(300).unwrap().is_none());
    }

    #[test]
    fn test_ack_removes_from_rotation() {
        let store = Store::open_in_memory().unwrap();
        store.enqueue("c1").unwrap();
        let job = store.dequeue(300).unwrap().unwrap();
        store.ack_job(job.id).unwrap();
        assert!(store.dequeue(300).unwrap().is_none());
        assert_eq!(store.pending_jobs().unwrap(), 0);
    }

    #[test]
    fn test_expired_lock_released() {
        let store = Store::open_in_memory().unwrap();
        store.enqueue("c1").unwrap();

        // Zero-second lock expires immediately.
        let job = store.dequeue(0).unwrap().unwrap();
        assert!(store.dequeue(0).unwrap().is_none(), "locked job must not re-dequeue");

        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(store.release_expired_jobs().unwrap(), 1);

        let retried = store.dequeue(300).unwrap().unwrap();
        assert_eq!(retried.id, job.id);
        assert_eq!(retried.attempts, 2);
    }
}
