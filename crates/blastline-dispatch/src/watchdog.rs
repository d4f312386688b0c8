//! Watchdog: recovers campaigns orphaned by a crashed worker.
//!
//! A `running` campaign whose `updated_at` stopped moving past the
//! staleness threshold is reset to `pending` and re-enqueued. The reset
//! is guarded on the row still being `running`, and the resumed run
//! consults the duplicate ledger per recipient, so recovery can race a
//! not-yet-dead worker without double delivery.

use std::sync::Arc;

use blastline_core::config::WatchdogConfig;
use blastline_core::error::Result;
use blastline_store::Store;
use chrono::Utc;

/// One watchdog pass. Returns how many campaigns were re-queued.
pub fn scan_once(store: &Store, config: &WatchdogConfig) -> Result<usize> {
    // Expired queue locks first, so re-queued campaigns have workers free.
    let released = store.release_expired_jobs()?;
    if released > 0 {
        tracing::info!("🔁 watchdog released {released} expired queue locks");
    }

    let cutoff = Utc::now() - chrono::Duration::seconds(config.staleness_secs as i64);
    let stale = store.stale_running(cutoff)?;

    let mut recovered = 0;
    for campaign_id in stale {
        // Guarded reset: a worker that woke up in the meantime keeps
        // ownership and this pass skips the campaign.
        if store.reset_stale_campaign(&campaign_id)? {
            store.enqueue(&campaign_id)?;
            recovered += 1;
            tracing::warn!("🩺 watchdog re-queued stuck campaign {campaign_id}");
        }
    }
    Ok(recovered)
}

/// Spawn the periodic watchdog loop.
pub fn spawn_watchdog(store: Arc<Store>, config: WatchdogConfig) -> tokio::task::JoinHandle<()> {
    tracing::info!(
        "🩺 watchdog started (every {}s, staleness {}s)",
        config.interval_secs,
        config.staleness_secs
    );
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(config.interval_secs.max(1)));
        loop {
            interval.tick().await;
            match scan_once(&store, &config) {
                Ok(0) => {}
                Ok(n) => tracing::info!("🩺 watchdog recovered {n} campaigns"),
                Err(e) => tracing::warn!("⚠️ watchdog pass failed: {e}"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use blastline_core::types::{Campaign, CampaignStatus};

    fn config(staleness_secs: u64) -> WatchdogConfig {
        WatchdogConfig { interval_secs: 300, staleness_secs }
    }

    #[test]
    fn test_fresh_running_campaign_untouched() {
        let store = Store::open_in_memory().unwrap();
        let campaign = Campaign::new("c", "hi", "list-1", "sess-1");
        store.insert_campaign(&campaign).unwrap();
        store.try_claim(&campaign.id).unwrap();

        let recovered = scan_once(&store, &config(900)).unwrap();
        assert_eq!(recovered, 0);
        assert_eq!(
            store.get_campaign(&campaign.id).unwrap().status,
            CampaignStatus::Running
        );
    }

    #[test]
    fn test_stale_campaign_requeued() {
        let store = Store::open_in_memory().unwrap();
        let campaign = Campaign::new("c", "hi", "list-1", "sess-1");
        store.insert_campaign(&campaign).unwrap();
        store.try_claim(&campaign.id).unwrap();

        // Zero staleness: the claim heartbeat is already "too old".
        std::thread::sleep(std::time::Duration::from_millis(20));
        let recovered = scan_once(&store, &config(0)).unwrap();
        assert_eq!(recovered, 1);

        let c = store.get_campaign(&campaign.id).unwrap();
        assert_eq!(c.status, CampaignStatus::Pending);
        assert_eq!(store.pending_jobs().unwrap(), 1, "re-enqueued for dispatch");
    }

    #[test]
    fn test_terminal_states_ignored() {
        let store = Store::open_in_memory().unwrap();
        let campaign = Campaign::new("c", "hi", "list-1", "sess-1");
        store.insert_campaign(&campaign).unwrap();
        store.try_claim(&campaign.id).unwrap();
        store
            .finish_if_running(&campaign.id, CampaignStatus::Completed)
            .unwrap();

        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(scan_once(&store, &config(0)).unwrap(), 0);
        assert_eq!(
            store.get_campaign(&campaign.id).unwrap().status,
            CampaignStatus::Completed
        );
    }
}
