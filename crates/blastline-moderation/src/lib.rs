//! # Blastline Moderation
//!
//! The content moderation gate that every campaign template passes before
//! any sending begins. A short-circuiting pipeline: deterministic text
//! normalization, context-override heuristics, a coarse AI classifier
//! (cached, fail-closed), an optional disclaimer downgrade and an optional
//! fine-grained illegal-trade classifier. The gate never raises: when a
//! classifier is unreachable the answer is a block, not a pass.

pub mod cache;
pub mod classifier;
pub mod context;
pub mod gate;
pub mod normalize;

pub use cache::VerdictCache;
pub use classifier::{
    CoarseVerdict, HttpModerationClassifier, HttpTradeClassifier, ModerationClassifier,
    TradeClassifier, TradeVerdict,
};
pub use gate::{GatePolicy, ModerationGate, ModerationVerdict};

use sha2::{Digest, Sha256};

/// Cache key for a message body: SHA-256 of the normalized text.
pub fn content_hash(normalized_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_stable() {
        let a = content_hash("hello world");
        let b = content_hash("hello world");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, content_hash("hello worlds"));
    }
}
