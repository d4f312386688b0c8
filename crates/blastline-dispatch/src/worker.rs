//! Dispatch worker: claims a campaign job and drives it end to end.
//!
//! Claim is an atomic compare-and-swap on the campaign row. Setup failures
//! (dead session, blocked template, missing contacts, attachment upload)
//! are campaign-fatal; a single recipient failing never aborts the run.
//! The ledger is consulted immediately before every send, which is what
//! makes a watchdog-triggered resume safe against double delivery.

use std::sync::Arc;
use std::time::Duration;

use blastline_core::config::BlastlineConfig;
use blastline_core::error::{BlastlineError, Result};
use blastline_core::phone;
use blastline_core::phone::CanonicalAddress;
use blastline_core::types::{
    Campaign, CampaignStatus, Contact, RunSignal, SendRecord, SendStatus,
};
use blastline_moderation::{ModerationGate, ModerationVerdict};
use blastline_store::Store;
use blastline_store::incidents::ModerationIncident;
use blastline_transport::media::{MediaStore, materialize};
use blastline_transport::{MediaPayload, SendOutcome, SessionState, Transport};
use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::batch::{
    ResolvedContact, cooldown, dedup_recipients, interruptible_sleep, message_delay, plan_batches,
};
use crate::{ControlProbe, StoreProbe};

/// Queue lock horizon for one campaign run. An orphaned job re-enters the
/// queue after this; the ledger keeps the re-run idempotent.
pub const JOB_LOCK_SECS: u64 = 1800;

/// How one `claim_and_run` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Paused,
    Cancelled,
    /// Another worker owns the campaign; this call had no side effects.
    AlreadyRunning,
}

pub struct DispatchWorker {
    store: Arc<Store>,
    transport: Arc<dyn Transport>,
    gate: Arc<ModerationGate>,
    media: Arc<dyn MediaStore>,
    country_code: String,
    control_tick: Duration,
}

impl DispatchWorker {
    pub fn new(
        store: Arc<Store>,
        transport: Arc<dyn Transport>,
        gate: Arc<ModerationGate>,
        media: Arc<dyn MediaStore>,
        config: &BlastlineConfig,
    ) -> Self {
        Self {
            store,
            transport,
            gate,
            media,
            country_code: config.default_country_code.clone(),
            control_tick: Duration::from_secs(config.dispatch.control_tick_secs.clamp(1, 15)),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Claim and execute a campaign. The losing side of a claim race
    /// returns `AlreadyRunning` without side effects. Setup errors leave
    /// the campaign `failed`, never `running`.
    pub async fn claim_and_run(&self, campaign_id: &str) -> Result<RunOutcome> {
        let campaign = match self.store.try_claim(campaign_id) {
            Ok(c) => c,
            Err(BlastlineError::AlreadyRunning(id)) => {
                tracing::info!("🔒 campaign {id} already owned by another worker");
                return Ok(RunOutcome::AlreadyRunning);
            }
            Err(e) => return Err(e),
        };
        tracing::info!("🏁 claimed campaign '{}' ({})", campaign.name, campaign.id);

        match self.run(&campaign).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::warn!("❌ campaign {} setup failed: {e}", campaign.id);
                if let Err(mark) = self.store.finish_if_running(&campaign.id, CampaignStatus::Failed)
                {
                    tracing::warn!("⚠️ could not mark campaign {} failed: {mark}", campaign.id);
                }
                Err(e)
            }
        }
    }

    async fn run(&self, campaign: &Campaign) -> Result<RunOutcome> {
        // ─── Setup phase: every failure here is campaign-fatal ───

        match self.transport.session_status(&campaign.session_id).await? {
            SessionState::Connected => {}
            state => {
                return Err(BlastlineError::Transport(format!(
                    "session {} is {state:?}, not connected",
                    campaign.session_id
                )));
            }
        }

        // The template is shared by every recipient, so the gate runs once
        // per campaign, not per contact.
        let verdict = self.gate.evaluate(&campaign.template).await;
        if verdict.blocked || verdict.requires_review {
            self.audit_verdict(&verdict);
        }
        if !verdict.allowed {
            return Err(BlastlineError::Moderation(format!(
                "template rejected ({})",
                verdict.reasons.join(", ")
            )));
        }

        let payload = match &campaign.attachment {
            Some(attachment) => Some(materialize(attachment, self.media.as_ref()).await?),
            None => None,
        };

        let contacts = self.store.contacts_for_source(&campaign.contact_source)?;
        if contacts.is_empty() {
            return Err(BlastlineError::EmptyContactSource(
                campaign.contact_source.clone(),
            ));
        }

        let (resolved, invalid) = self.resolve_contacts(contacts);
        let recipients = dedup_recipients(resolved);
        let total = (recipients.len() + invalid.len()) as u64;
        self.store.set_total_recipients(&campaign.id, total)?;
        self.store.sync_counters_with_ledger(&campaign.id)?;

        // Structurally bad numbers are per-recipient failures, not fatal.
        for (raw, error) in &invalid {
            self.record_outcome(
                campaign,
                raw,
                &SendOutcome::Failed { error: error.clone() },
            )?;
        }

        // ─── Batch execution ───

        let probe = StoreProbe::new(self.store.clone(), &campaign.id);
        let mut rng = StdRng::from_entropy();
        let sizes = plan_batches(recipients.len(), &campaign.batching, &mut rng);
        tracing::info!(
            "📦 campaign {}: {} recipients in {} batches ({} invalid)",
            campaign.id,
            recipients.len(),
            sizes.len(),
            invalid.len()
        );

        // Termination guard: 2x the deduplicated count, in case ledger
        // anomalies ever make a unit repeat.
        let max_units = recipients.len().saturating_mul(2).max(1);
        let mut units = 0usize;
        let mut queue = recipients.iter();

        'batches: for (batch_no, &size) in sizes.iter().enumerate() {
            for slot in 0..size {
                units += 1;
                if units > max_units {
                    tracing::error!(
                        "🛑 campaign {}: unit guard tripped after {units} iterations",
                        campaign.id
                    );
                    break 'batches;
                }

                match probe.check().await {
                    RunSignal::Continue => {}
                    RunSignal::Pause => {
                        tracing::info!("⏸️ campaign {} paused mid-batch", campaign.id);
                        return Ok(RunOutcome::Paused);
                    }
                    RunSignal::Cancel => {
                        tracing::info!("🛑 campaign {} cancelled mid-batch", campaign.id);
                        return Ok(RunOutcome::Cancelled);
                    }
                }

                let Some(recipient) = queue.next() else { break 'batches };

                // Consulted right before the send so an overlapping resume
                // cannot double-deliver.
                if self.store.already_sent(
                    &campaign.id,
                    recipient.address.digits(),
                    &campaign.session_id,
                )? {
                    tracing::debug!(
                        "↩️ {} already delivered for campaign {}, skipping",
                        recipient.address,
                        campaign.id
                    );
                    continue;
                }

                let text = render_template(&campaign.template, &recipient.contact, &recipient.address);
                let outcome = self.send_one(campaign, recipient, payload.as_ref(), &text).await;
                self.record_outcome(campaign, recipient.address.digits(), &outcome)?;

                // Human pacing between messages, skipped after the final
                // slot of a batch (the cooldown takes over there).
                let last_in_batch = slot + 1 == size;
                if !last_in_batch {
                    let delay = message_delay(&campaign.batching, &mut rng);
                    match interruptible_sleep(delay, self.control_tick, &probe).await {
                        RunSignal::Continue => {}
                        RunSignal::Pause => return Ok(RunOutcome::Paused),
                        RunSignal::Cancel => return Ok(RunOutcome::Cancelled),
                    }
                }
            }

            let last_batch = batch_no + 1 == sizes.len();
            if !last_batch {
                let wait = cooldown(&campaign.batching, &mut rng);
                tracing::info!(
                    "😴 campaign {}: cooldown {:.1}s before batch {}",
                    campaign.id,
                    wait.as_secs_f64(),
                    batch_no + 2
                );
                self.store.touch_campaign(&campaign.id)?;
                match interruptible_sleep(wait, self.control_tick, &probe).await {
                    RunSignal::Continue => {}
                    RunSignal::Pause => return Ok(RunOutcome::Paused),
                    RunSignal::Cancel => return Ok(RunOutcome::Cancelled),
                }
            }
        }

        if self.store.finish_if_running(&campaign.id, CampaignStatus::Completed)? {
            tracing::info!("✅ campaign {} completed", campaign.id);
            Ok(RunOutcome::Completed)
        } else {
            // A pause/cancel landed between the last unit and the finish
            // line; the external state wins.
            match probe.check().await {
                RunSignal::Pause => Ok(RunOutcome::Paused),
                _ => Ok(RunOutcome::Cancelled),
            }
        }
    }

    /// Split raw contacts into normalized recipients and rejects.
    fn resolve_contacts(&self, contacts: Vec<Contact>) -> (Vec<ResolvedContact>, Vec<(String, String)>) {
        let mut resolved = Vec::with_capacity(contacts.len());
        let mut invalid = Vec::new();
        for contact in contacts {
            match phone::normalize(&contact.phone, &self.country_code) {
                Ok(address) => resolved.push(ResolvedContact { address, contact }),
                Err(e) => invalid.push((contact.phone.clone(), e.to_string())),
            }
        }
        (resolved, invalid)
    }

    async fn send_one(
        &self,
        campaign: &Campaign,
        recipient: &ResolvedContact,
        payload: Option<&MediaPayload>,
        text: &str,
    ) -> SendOutcome {
        let chat_id = recipient.address.chat_id();
        let result = match payload {
            Some(media) => {
                self.transport
                    .send_media(&campaign.session_id, &chat_id, media, Some(text))
                    .await
            }
            None => self.transport.send_text(&campaign.session_id, &chat_id, text).await,
        };
        match result {
            Ok(outcome) => outcome,
            // Exhausted retries and hard transport errors are still just
            // one failed recipient.
            Err(e) => SendOutcome::Failed { error: e.to_string() },
        }
    }

    /// Exactly one ledger row per attempt, counters bumped immediately so
    /// progress is observable mid-run.
    fn record_outcome(&self, campaign: &Campaign, recipient: &str, outcome: &SendOutcome) -> Result<()> {
        let (status, message_id, error) = match outcome {
            SendOutcome::Sent { message_id } => {
                (SendStatus::Sent, Some(message_id.clone()), None)
            }
            SendOutcome::Failed { error } => (SendStatus::Failed, None, Some(error.clone())),
        };
        self.store.record_attempt(&SendRecord {
            campaign_id: campaign.id.clone(),
            recipient: recipient.to_string(),
            session_id: campaign.session_id.clone(),
            status,
            message_id,
            error,
            created_at: Utc::now(),
            metadata: serde_json::json!({ "campaign_id": campaign.id }),
        })?;
        match status {
            SendStatus::Sent => self.store.bump_counters(&campaign.id, 1, 0),
            _ => self.store.bump_counters(&campaign.id, 0, 1),
        }
    }

    fn audit_verdict(&self, verdict: &ModerationVerdict) {
        let incident = ModerationIncident {
            content_hash: verdict.content_hash.clone(),
            risk_score: verdict.risk_score,
            blocked: verdict.blocked,
            requires_review: verdict.requires_review,
            reasons: verdict.reasons.clone(),
            allowed: verdict.allowed,
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.record_incident(&incident) {
            tracing::warn!("⚠️ failed to audit moderation incident: {e}");
        }
    }
}

/// Fill `{field}` placeholders from the contact's personalization fields.
/// `{phone}` is built in; unknown fields render empty.
fn render_template(template: &str, contact: &Contact, address: &CanonicalAddress) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c != '{' {
            out.push(c);
            continue;
        }
        let mut key = String::new();
        let mut closed = false;
        for k in chars.by_ref() {
            if k == '}' {
                closed = true;
                break;
            }
            key.push(k);
        }
        if !closed {
            out.push('{');
            out.push_str(&key);
        } else if key == "phone" {
            out.push_str(address.digits());
        } else if let Some(value) = contact.fields.get(&key) {
            out.push_str(value);
        }
    }
    out
}
