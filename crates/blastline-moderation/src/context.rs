//! Context-override heuristics, stage two of the gate.
//!
//! Three independent signals computed on the normalized text: an explicit
//! non-violence disclaimer, reporting/educational framing, and the
//! legitimate transactional banking notice. The banking signal allows
//! immediately; the other two soften later stages but never allow on
//! their own.

/// Explicit safety/non-violence disclaimers.
const NONVIOLENCE_MARKERS: &[&str] = &[
    "no violence",
    "non-violent",
    "nonviolent",
    "without violence",
    "peaceful protest",
    "no harm intended",
    "violence is not",
];

/// Reporting, investigative, medical, educational, journalistic or
/// historical framing.
const REPORTING_MARKERS: &[&str] = &[
    "according to",
    "police said",
    "police have",
    "news report",
    "breaking news",
    "journalist",
    "investigation",
    "investigative",
    "was arrested",
    "seized",
    "court ruled",
    "research shows",
    "study finds",
    "medical advice",
    "doctor",
    "treatment for",
    "awareness campaign",
    "in history",
    "historical",
    "documentary",
    "educational",
];

/// Bank entities recognized in transactional notices.
const BANK_ENTITIES: &[&str] = &[
    "sbi",
    "state bank",
    "hdfc",
    "icici",
    "axis bank",
    "kotak",
    "punjab national bank",
    "pnb",
    "bank of baroda",
    "canara bank",
    "union bank",
    "idfc",
    "indusind",
    "yes bank",
    "federal bank",
    "bank",
];

const LOAN_TERMS: &[&str] = &[
    "loan",
    "emi",
    "credit limit",
    "overdraft",
    "disbursal",
    "disbursement",
    "installment",
    "instalment",
];

const STATUS_TERMS: &[&str] = &[
    "approved",
    "sanctioned",
    "disbursed",
    "credited",
    "processed",
    "due on",
    "overdue",
    "payment received",
];

const AMOUNT_TERMS: &[&str] = &["₹", "rs.", "rs ", "inr", "amount", "lakh", "crore", "$", "usd"];

/// Promotional/scam phrasing that disqualifies the banking override.
const PROMO_MARKERS: &[&str] = &[
    "lottery",
    "winner",
    "congratulations",
    "click here",
    "limited time",
    "act now",
    "claim now",
    "earn money",
    "work from home",
    "guaranteed returns",
    "double your",
    "investment opportunity",
    "crypto",
    "free gift",
    "share your otp",
    "lucky draw",
];

/// Domains a banking notice may link to.
const ALLOWED_LINK_DOMAINS: &[&str] = &[
    "sbi.co.in",
    "onlinesbi.sbi",
    "hdfcbank.com",
    "icicibank.com",
    "axisbank.com",
    "kotak.com",
    "pnbindia.in",
    "bankofbaroda.in",
    "canarabank.com",
    "unionbankofindia.co.in",
    "idfcfirstbank.com",
    "indusind.com",
    "yesbank.in",
    "federalbank.co.in",
    "rbi.org.in",
];

/// Shortener and messaging-redirect hosts, never acceptable in a notice.
const REDIRECT_HOSTS: &[&str] = &[
    "bit.ly",
    "tinyurl.com",
    "goo.gl",
    "cutt.ly",
    "rb.gy",
    "is.gd",
    "t.co",
    "t.me",
    "telegram.me",
    "wa.me",
    "chat.whatsapp.com",
];

/// The stage-two signals for one normalized message body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextSignals {
    pub nonviolence_disclaimer: bool,
    pub reporting_context: bool,
    pub banking_notice: bool,
}

impl ContextSignals {
    /// Compute all signals. Input must already be normalized.
    pub fn detect(text: &str) -> Self {
        Self {
            nonviolence_disclaimer: contains_any(text, NONVIOLENCE_MARKERS),
            reporting_context: contains_any(text, REPORTING_MARKERS),
            banking_notice: is_banking_notice(text),
        }
    }
}

fn contains_any(text: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| text.contains(m))
}

/// Legitimate transactional banking notice: at least two of the four term
/// categories present, no promotional phrasing, and every link restricted
/// to the bank allowlist with no shortener hosts.
fn is_banking_notice(text: &str) -> bool {
    let categories = [
        contains_any(text, BANK_ENTITIES),
        contains_any(text, LOAN_TERMS),
        contains_any(text, STATUS_TERMS),
        contains_any(text, AMOUNT_TERMS),
    ];
    let present = categories.iter().filter(|&&c| c).count();
    if present < 2 {
        return false;
    }
    if contains_any(text, PROMO_MARKERS) {
        return false;
    }

    for host in link_hosts(text) {
        if REDIRECT_HOSTS.iter().any(|r| host == *r || host.ends_with(&format!(".{r}"))) {
            return false;
        }
        let allowed = ALLOWED_LINK_DOMAINS
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{d}")));
        if !allowed {
            return false;
        }
    }
    true
}

/// Extract hostnames of every URL-looking token.
fn link_hosts(text: &str) -> Vec<String> {
    let mut hosts = Vec::new();
    for token in text.split_whitespace() {
        let rest = if let Some(r) = token.strip_prefix("https://") {
            r
        } else if let Some(r) = token.strip_prefix("http://") {
            r
        } else if token.starts_with("www.") {
            token
        } else {
            continue;
        };
        let host = rest
            .split(['/', '?', '#'])
            .next()
            .unwrap_or("")
            .trim_start_matches("www.")
            .trim_end_matches(['.', ',', ';', ')']);
        if !host.is_empty() {
            hosts.push(host.to_string());
        }
    }
    hosts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;

    #[test]
    fn test_banking_notice_allows() {
        let text = normalize(
            "Your personal loan of ₹500,000 has been approved by SBI Bank. \
             Funds will be disbursed within 24 hours.",
        );
        let signals = ContextSignals::detect(&text);
        assert!(signals.banking_notice);
    }

    #[test]
    fn test_banking_notice_with_allowed_link() {
        let text = normalize("Your EMI of Rs. 4,500 is due on 5 Aug. Pay at https://onlinesbi.sbi/pay");
        assert!(ContextSignals::detect(&text).banking_notice);
    }

    #[test]
    fn test_promo_phrasing_disqualifies() {
        let text = normalize("Congratulations! Your loan of ₹500,000 is approved, click here now");
        assert!(!ContextSignals::detect(&text).banking_notice);
    }

    #[test]
    fn test_shortener_link_disqualifies() {
        let text = normalize("Your loan of ₹500,000 has been approved. Details: https://bit.ly/3xyz");
        assert!(!ContextSignals::detect(&text).banking_notice);
    }

    #[test]
    fn test_unknown_domain_disqualifies() {
        let text = normalize("Your loan of ₹500,000 has been approved. Visit http://sbi-verify.xyz/now");
        assert!(!ContextSignals::detect(&text).banking_notice);
    }

    #[test]
    fn test_single_category_not_enough() {
        let text = normalize("Great deals at our bank today");
        assert!(!ContextSignals::detect(&text).banking_notice);
    }

    #[test]
    fn test_disclaimer_and_reporting_markers() {
        let s = ContextSignals::detect(&normalize(
            "According to police said reports, the protest was non-violent.",
        ));
        assert!(s.nonviolence_disclaimer);
        assert!(s.reporting_context);

        let s = ContextSignals::detect(&normalize("buy now cheap"));
        assert!(!s.nonviolence_disclaimer);
        assert!(!s.reporting_context);
    }

    #[test]
    fn test_link_hosts_extraction() {
        let hosts = link_hosts("pay https://www.hdfcbank.com/x and www.bit.ly/q or plain text");
        assert_eq!(hosts, vec!["hdfcbank.com".to_string(), "bit.ly".to_string()]);
    }
}
