//! Batch scheduler: unit-of-work ordering and timing, independent of
//! transport mechanics.
//!
//! Sizes and waits are uniform draws within configured bounds. The
//! randomness is contractual: it makes bulk traffic resemble human
//! sending, so tests assert bounds, never exact values. All sleeps are
//! polled so a pause request lands within one tick, not at the end of a
//! ten-minute cooldown.

use std::time::Duration;

use blastline_core::phone::CanonicalAddress;
use blastline_core::types::{BatchingConfig, Contact, RunSignal};
use rand::Rng;

use crate::ControlProbe;

/// A contact whose raw phone already normalized into a ledger key.
#[derive(Debug, Clone)]
pub struct ResolvedContact {
    pub address: CanonicalAddress,
    pub contact: Contact,
}

/// Deduplicate by canonical address, first occurrence wins. This alone
/// prevents redundant sends within a single run, before the ledger is
/// even consulted.
pub fn dedup_recipients(resolved: Vec<ResolvedContact>) -> Vec<ResolvedContact> {
    let mut seen = std::collections::HashSet::new();
    resolved
        .into_iter()
        .filter(|r| seen.insert(r.address.clone()))
        .collect()
}

/// Partition `total` recipients into batch sizes. Disabled batching means
/// one batch; otherwise sizes draw uniformly from the configured range
/// until nothing remains. The sizes always sum to exactly `total`.
pub fn plan_batches<R: Rng>(total: usize, config: &BatchingConfig, rng: &mut R) -> Vec<usize> {
    if total == 0 {
        return Vec::new();
    }
    if !config.use_batching {
        return vec![total];
    }

    let lo = config.batch_size_min.max(1) as usize;
    let hi = (config.batch_size_max as usize).max(lo);

    let mut sizes = Vec::new();
    let mut remaining = total;
    while remaining > 0 {
        let drawn = rng.gen_range(lo..=hi);
        let take = drawn.min(remaining);
        sizes.push(take);
        remaining -= take;
    }
    sizes
}

/// Per-message delay: uniform seconds within the configured range.
pub fn message_delay<R: Rng>(config: &BatchingConfig, rng: &mut R) -> Duration {
    uniform_duration(config.per_message_delay_min, config.per_message_delay_max, rng)
}

/// Inter-batch cooldown: uniform fractional minutes, converted to seconds.
pub fn cooldown<R: Rng>(config: &BatchingConfig, rng: &mut R) -> Duration {
    let d = uniform_duration(config.cooldown_min, config.cooldown_max, rng);
    Duration::from_secs_f64(d.as_secs_f64() * 60.0)
}

fn uniform_duration<R: Rng>(min: f64, max: f64, rng: &mut R) -> Duration {
    let lo = min.max(0.0);
    let hi = max.max(lo);
    let secs = if hi > lo { rng.gen_range(lo..=hi) } else { lo };
    Duration::from_secs_f64(secs)
}

/// Sleep `total`, waking every `tick` to consult the control probe. A
/// pause or cancel is returned within one tick of being issued.
pub async fn interruptible_sleep(
    total: Duration,
    tick: Duration,
    probe: &dyn ControlProbe,
) -> RunSignal {
    let tick = tick.max(Duration::from_secs(1));
    let mut remaining = total;
    while remaining > Duration::ZERO {
        match probe.check().await {
            RunSignal::Continue => {}
            signal => return signal,
        }
        let chunk = remaining.min(tick);
        tokio::time::sleep(chunk).await;
        remaining = remaining.saturating_sub(chunk);
    }
    probe.check().await
}
