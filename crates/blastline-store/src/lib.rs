//! # Blastline Store
//!
//! SQLite-backed persistence: campaigns with atomic claim, the
//! append-only duplicate ledger, the dispatch job queue, contact sources
//! and moderation incident audit rows. Survives restarts, supports
//! concurrent workers through row-state transitions inside transactions.

pub mod campaigns;
pub mod contacts;
pub mod incidents;
pub mod ledger;
pub mod queue;

use std::path::Path;
use std::sync::Mutex;

use blastline_core::error::{BlastlineError, Result};
use rusqlite::Connection;

/// The persistence handle shared by workers, the watchdog and the CLI.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| BlastlineError::Storage(format!("DB open: {e}")))?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| BlastlineError::Storage(format!("DB open: {e}")))?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            -- Campaigns: one row per bulk-send job
            CREATE TABLE IF NOT EXISTS campaigns (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                template TEXT NOT NULL,
                attachment TEXT,                 -- JSON, nullable
                contact_source TEXT NOT NULL,
                session_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                messages_sent INTEGER NOT NULL DEFAULT 0,
                messages_failed INTEGER NOT NULL DEFAULT 0,
                total_recipients INTEGER NOT NULL DEFAULT 0,
                batching TEXT NOT NULL,          -- JSON pacing config
                created_at TEXT NOT NULL,
                started_at TEXT,
                updated_at TEXT NOT NULL,
                completed_at TEXT
            );

            -- Duplicate ledger: append-only send attempts
            CREATE TABLE IF NOT EXISTS send_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                campaign_id TEXT NOT NULL,
                recipient TEXT NOT NULL,
                session_id TEXT NOT NULL,
                status TEXT NOT NULL,            -- 'sent', 'failed', 'queued'
                message_id TEXT,
                error TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_send_records_triple
                ON send_records (campaign_id, recipient, session_id, status);

            -- Dispatch job queue
            CREATE TABLE IF NOT EXISTS dispatch_jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                campaign_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',  -- pending, processing, done
                attempts INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                locked_until TEXT
            );

            -- Contact sources (rows imported elsewhere; read-only here)
            CREATE TABLE IF NOT EXISTS contacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_id TEXT NOT NULL,
                phone TEXT NOT NULL,
                fields TEXT NOT NULL DEFAULT '{}',
                verified INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_contacts_source ON contacts (source_id);

            -- Moderation incident audit trail
            CREATE TABLE IF NOT EXISTS moderation_incidents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content_hash TEXT NOT NULL,
                risk_score INTEGER NOT NULL,
                blocked INTEGER NOT NULL,
                requires_review INTEGER NOT NULL,
                reasons TEXT NOT NULL DEFAULT '[]',
                allowed INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            ",
        )
        .map_err(|e| BlastlineError::Storage(format!("Migration: {e}")))?;
        Ok(())
    }

    pub(crate) fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| BlastlineError::Storage(format!("DB lock poisoned: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_and_migrate() {
        let store = Store::open_in_memory().unwrap();
        // Re-running migrations must be harmless.
        store.migrate().unwrap();
    }

    #[test]
    fn test_open_on_disk() {
        let dir = std::env::temp_dir().join("blastline-store-open-test");
        std::fs::create_dir_all(&dir).ok();
        let store = Store::open(&dir.join("test.db")).unwrap();
        drop(store);
        std::fs::remove_dir_all(&dir).ok();
    }
}
