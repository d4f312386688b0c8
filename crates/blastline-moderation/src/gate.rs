//! The moderation gate: the ordered decision pipeline callers see.
//!
//! `evaluate()` is a pure function of the text plus cached classifier
//! calls. It is safe to call concurrently and never raises: classifier
//! outages collapse into the fail-closed verdict. Availability is never
//! interpreted as permission.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use blastline_core::config::ModerationConfig;

use crate::cache::VerdictCache;
use crate::classifier::{
    HttpModerationClassifier, HttpTradeClassifier, ModerationClassifier, TradeClassifier,
};
use crate::content_hash;
use crate::context::ContextSignals;
use crate::normalize::normalize;

/// Risk score reported when the classifier is unreachable.
const FAIL_CLOSED_RISK: u8 = 75;

/// Residual score kept on banking-notice allows for audit purposes.
const BANKING_RESIDUAL_RISK: u8 = 10;

/// Trade categories that block outright at high confidence.
const HARD_BLOCK_CATEGORIES: &[&str] = &[
    "weapons_trade",
    "drug_trade",
    "fraud",
    "counterfeit",
    "sexual_exploitation_minors",
    "hate_speech",
    "extremism",
    "human_trafficking",
    "organ_trade",
    "wildlife_trade",
];

/// Trade categories that only mark the content for review.
const REVIEW_CATEGORIES: &[&str] =
    &["gambling", "alcohol", "tobacco", "misleading_information"];

/// The structured decision returned to callers.
#[derive(Debug, Clone, PartialEq)]
pub struct ModerationVerdict {
    /// Hash of the normalized input, the cache key.
    pub content_hash: String,
    /// 0-100 risk estimate.
    pub risk_score: u8,
    pub blocked: bool,
    pub requires_review: bool,
    /// Short ordered reason tags.
    pub reasons: Vec<String>,
    /// Final binary decision after gate policy.
    pub allowed: bool,
}

/// Gate policy knobs, lifted from [`ModerationConfig`].
#[derive(Debug, Clone)]
pub struct GatePolicy {
    /// Strict gate: review counts as denied.
    pub ai_only_gate: bool,
    /// Downgrade violence-only blocks when a non-violence disclaimer is
    /// present.
    pub disclaimer_downgrade: bool,
    pub hard_block_confidence: f32,
    pub review_confidence: f32,
}

impl From<&ModerationConfig> for GatePolicy {
    fn from(config: &ModerationConfig) -> Self {
        Self {
            ai_only_gate: config.ai_only_gate,
            disclaimer_downgrade: config.disclaimer_downgrade,
            hard_block_confidence: config.hard_block_confidence,
            review_confidence: config.review_confidence,
        }
    }
}

/// The moderation gate. Owns its cache (injected at construction) and the
/// classifier clients behind provider-agnostic traits.
pub struct ModerationGate {
    policy: GatePolicy,
    cache: Mutex<VerdictCache>,
    coarse: Arc<dyn ModerationClassifier>,
    fine: Option<Arc<dyn TradeClassifier>>,
}

impl ModerationGate {
    pub fn new(
        policy: GatePolicy,
        cache: VerdictCache,
        coarse: Arc<dyn ModerationClassifier>,
        fine: Option<Arc<dyn TradeClassifier>>,
    ) -> Self {
        Self { policy, cache: Mutex::new(cache), coarse, fine }
    }

    /// Build the gate with HTTP classifiers from configuration.
    pub fn from_config(config: &ModerationConfig) -> Self {
        let cache = VerdictCache::new(
            Duration::from_secs(config.cache_ttl_secs),
            config.cache_capacity,
        );
        let coarse: Arc<dyn ModerationClassifier> =
            Arc::new(HttpModerationClassifier::new(config));
        let fine: Option<Arc<dyn TradeClassifier>> =
            (config.trade_classifier && !config.trade_endpoint.is_empty()).then(|| {
                Arc::new(HttpTradeClassifier::new(&config.trade_endpoint, config))
                    as Arc<dyn TradeClassifier>
            });
        Self::new(GatePolicy::from(config), cache, coarse, fine)
    }

    /// Evaluate a message body. Never fails; cache hits skip all network
    /// calls entirely.
    pub async fn evaluate(&self, text: &str) -> ModerationVerdict {
        let normalized = normalize(text);
        let hash = content_hash(&normalized);

        if let Ok(mut cache) = self.cache.lock()
            && let Some(hit) = cache.get(&hash)
        {
            tracing::debug!("🗃️ moderation cache hit for {}", &hash[..12]);
            return hit;
        }

        let signals = ContextSignals::detect(&normalized);

        // A legitimate transactional banking notice allows immediately,
        // bypassing AI scoring. The residual score stays non-zero for the
        // audit trail.
        if signals.banking_notice {
            let verdict = ModerationVerdict {
                content_hash: hash.clone(),
                risk_score: BANKING_RESIDUAL_RISK,
                blocked: false,
                requires_review: false,
                reasons: vec!["transactional_banking_notice".to_string()],
                allowed: true,
            };
            self.store(&hash, &verdict);
            return verdict;
        }

        // Primary classification. Outage means block, not pass. Outage
        // verdicts are not cached so recovery is observed promptly.
        let coarse = match self.coarse.classify(&normalized).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("🚫 moderation classifier unavailable, failing closed: {e}");
                return fail_closed(hash);
            }
        };

        let mut risk_score = coarse.risk_score;
        let mut blocked = coarse.flagged;
        let mut requires_review = false;
        let mut reasons = coarse.categories.clone();

        // Disclaimer downgrade: a violence-only block with an explicit
        // non-violence disclaimer becomes a review, never a clean allow.
        if self.policy.disclaimer_downgrade
            && blocked
            && signals.nonviolence_disclaimer
            && !reasons.is_empty()
            && reasons.iter().all(|r| r.contains("violence"))
        {
            blocked = false;
            requires_review = true;
            reasons.push("disclaimer_downgrade".to_string());
        }

        // Fine-grained illegal-trade pass, only when the primary stage
        // did not already block.
        if !blocked && let Some(fine) = &self.fine {
            match fine.classify_trade(&normalized).await {
                Ok(trade) if trade.illegal_trade => {
                    let category = trade.category.as_str();
                    if HARD_BLOCK_CATEGORIES.contains(&category)
                        && trade.confidence >= self.policy.hard_block_confidence
                        && !signals.reporting_context
                    {
                        blocked = true;
                        reasons.push(trade.category.clone());
                        risk_score = risk_score.max((trade.confidence * 100.0) as u8);
                    } else if REVIEW_CATEGORIES.contains(&category)
                        && trade.confidence >= self.policy.review_confidence
                    {
                        requires_review = true;
                        reasons.push(trade.category.clone());
                        risk_score = risk_score.max((trade.confidence * 100.0) as u8);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("🚫 trade classifier unavailable, failing closed: {e}");
                    return fail_closed(hash);
                }
            }
        }

        let allowed = !blocked && !(requires_review && self.policy.ai_only_gate);
        let verdict = ModerationVerdict {
            content_hash: hash.clone(),
            risk_score,
            blocked,
            requires_review,
            reasons,
            allowed,
        };
        self.store(&hash, &verdict);
        verdict
    }

    fn store(&self, hash: &str, verdict: &ModerationVerdict) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.set(hash, verdict.clone());
        }
    }
}

fn fail_closed(content_hash: String) -> ModerationVerdict {
    ModerationVerdict {
        content_hash,
        risk_score: FAIL_CLOSED_RISK,
        blocked: true,
        requires_review: false,
        reasons: vec!["ai_unavailable".to_string()],
        allowed: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{CoarseVerdict, TradeVerdict};
    use async_trait::async_trait;
    use blastline_core::error::{BlastlineError, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticCoarse {
        verdict: CoarseVerdict,
        calls: AtomicUsize,
    }

    impl StaticCoarse {
        fn clean() -> Self {
            Self {
                verdict: CoarseVerdict { flagged: false, categories: vec![], risk_score: 4 },
                calls: AtomicUsize::new(0),
            }
        }

        fn flagged(categories: &[&str], risk: u8) -> Self {
            Self {
                verdict: CoarseVerdict {
                    flagged: true,
                    categories: categories.iter().map(|s| s.to_string()).collect(),
                    risk_score: risk,
                },
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ModerationClassifier for StaticCoarse {
        fn name(&self) -> &str {
            "static"
        }
        async fn classify(&self, _text: &str) -> Result<CoarseVerdict> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.verdict.clone())
        }
    }

    struct DownCoarse {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ModerationClassifier for DownCoarse {
        fn name(&self) -> &str {
            "down"
        }
        async fn classify(&self, _text: &str) -> Result<CoarseVerdict> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BlastlineError::Http("connection refused".into()))
        }
    }

    struct StaticTrade {
        verdict: TradeVerdict,
    }

    #[async_trait]
    impl TradeClassifier for StaticTrade {
        fn name(&self) -> &str {
            "static-trade"
        }
        async fn classify_trade(&self, _text: &str) -> Result<TradeVerdict> {
            Ok(self.verdict.clone())
        }
    }

    fn policy() -> GatePolicy {
        GatePolicy {
            ai_only_gate: true,
            disclaimer_downgrade: false,
            hard_block_confidence: 0.70,
            review_confidence: 0.60,
        }
    }

    fn gate_with(
        policy: GatePolicy,
        coarse: Arc<dyn ModerationClassifier>,
        fine: Option<Arc<dyn TradeClassifier>>,
    ) -> ModerationGate {
        ModerationGate::new(
            policy,
            VerdictCache::new(Duration::from_secs(60), 16),
            coarse,
            fine,
        )
    }

    #[tokio::test]
    async fn test_clean_text_allowed() {
        let gate = gate_with(policy(), Arc::new(StaticCoarse::clean()), None);
        let verdict = gate.evaluate("Hello! Your order has shipped.").await;
        assert!(verdict.allowed);
        assert!(!verdict.blocked);
        assert!(verdict.reasons.is_empty());
    }

    #[tokio::test]
    async fn test_fail_closed_on_outage() {
        let coarse = Arc::new(DownCoarse { calls: AtomicUsize::new(0) });
        let gate = gate_with(policy(), coarse.clone(), None);

        let verdict = gate.evaluate("anything at all").await;
        assert!(verdict.blocked);
        assert!(!verdict.allowed);
        assert_eq!(verdict.risk_score, 75);
        assert_eq!(verdict.reasons, vec!["ai_unavailable".to_string()]);

        // Outage results are not cached: the next call tries again.
        let _ = gate.evaluate("anything at all").await;
        assert_eq!(coarse.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_banking_notice_bypasses_classifier() {
        let coarse = Arc::new(StaticCoarse::clean());
        let gate = gate_with(policy(), coarse.clone(), None);

        let verdict = gate
            .evaluate(
                "Your personal loan of ₹500,000 has been approved by SBI Bank. \
                 Funds will be disbursed within 24 hours.",
            )
            .await;
        assert!(verdict.allowed);
        assert!(!verdict.blocked);
        assert!(verdict.risk_score > 0, "residual risk stays non-zero");
        assert_eq!(verdict.reasons, vec!["transactional_banking_notice".to_string()]);
        assert_eq!(coarse.calls.load(Ordering::SeqCst), 0, "AI scoring bypassed");
    }

    #[tokio::test]
    async fn test_hard_block_category() {
        let fine = Arc::new(StaticTrade {
            verdict: TradeVerdict {
                illegal_trade: true,
                category: "drug_trade".into(),
                confidence: 0.88,
            },
        });
        let gate = gate_with(policy(), Arc::new(StaticCoarse::clean()), Some(fine));

        let verdict = gate
            .evaluate("Cocaine for sale, high quality, contact via Telegram +123456")
            .await;
        assert!(verdict.blocked);
        assert!(!verdict.allowed);
        assert!(verdict.reasons.contains(&"drug_trade".to_string()));
        assert!(verdict.risk_score >= 70);
    }

    #[tokio::test]
    async fn test_reporting_context_suppresses_hard_block() {
        let fine = Arc::new(StaticTrade {
            verdict: TradeVerdict {
                illegal_trade: true,
                category: "drug_trade".into(),
                confidence: 0.92,
            },
        });
        let gate = gate_with(policy(), Arc::new(StaticCoarse::clean()), Some(fine));

        let verdict = gate
            .evaluate("According to police said reports, 40kg of cocaine was seized at the port.")
            .await;
        assert!(!verdict.blocked, "reporting context overrides escalation");
        assert!(verdict.allowed);
    }

    #[tokio::test]
    async fn test_review_category_and_gate_policy() {
        let fine = Arc::new(StaticTrade {
            verdict: TradeVerdict {
                illegal_trade: true,
                category: "gambling".into(),
                confidence: 0.65,
            },
        });

        // Strict gate: review is denied.
        let gate = gate_with(policy(), Arc::new(StaticCoarse::clean()), Some(fine.clone()));
        let verdict = gate.evaluate("Place your bets tonight, big jackpot").await;
        assert!(verdict.requires_review);
        assert!(!verdict.blocked);
        assert!(!verdict.allowed);

        // Relaxed gate: review passes through.
        let relaxed = GatePolicy { ai_only_gate: false, ..policy() };
        let gate = gate_with(relaxed, Arc::new(StaticCoarse::clean()), Some(fine));
        let verdict = gate.evaluate("Place your bets tonight, big jackpot").await;
        assert!(verdict.requires_review);
        assert!(verdict.allowed);
    }

    #[tokio::test]
    async fn test_disclaimer_downgrade() {
        let coarse = Arc::new(StaticCoarse::flagged(&["violence"], 81));
        let downgrading = GatePolicy { disclaimer_downgrade: true, ..policy() };
        let gate = gate_with(downgrading, coarse, None);

        let verdict = gate
            .evaluate("Join the rally. No violence, this is a peaceful protest.")
            .await;
        assert!(!verdict.blocked, "block downgraded to review");
        assert!(verdict.requires_review);
        assert!(verdict.reasons.contains(&"disclaimer_downgrade".to_string()));

        // Without the disclaimer the block stands.
        let coarse = Arc::new(StaticCoarse::flagged(&["violence"], 81));
        let downgrading = GatePolicy { disclaimer_downgrade: true, ..policy() };
        let gate = gate_with(downgrading, coarse, None);
        let verdict = gate.evaluate("Join the rally and smash everything.").await;
        assert!(verdict.blocked);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_classifier() {
        let coarse = Arc::new(StaticCoarse::clean());
        let gate = gate_with(policy(), coarse.clone(), None);

        let first = gate.evaluate("hello there friend").await;
        let second = gate.evaluate("hello there friend").await;
        assert_eq!(first, second);
        assert_eq!(coarse.calls.load(Ordering::SeqCst), 1, "second call was a cache hit");
    }

    #[tokio::test]
    async fn test_trade_outage_fails_closed() {
        struct DownTrade;
        #[async_trait]
        impl TradeClassifier for DownTrade {
            fn name(&self) -> &str {
                "down-trade"
            }
            async fn classify_trade(&self, _text: &str) -> Result<TradeVerdict> {
                Err(BlastlineError::Http("timeout".into()))
            }
        }

        let gate = gate_with(policy(), Arc::new(StaticCoarse::clean()), Some(Arc::new(DownTrade)));
        let verdict = gate.evaluate("some borderline text").await;
        assert!(verdict.blocked);
        assert_eq!(verdict.reasons, vec!["ai_unavailable".to_string()]);
    }
}
