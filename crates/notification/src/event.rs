//! Events the reconciliation loops emit toward the (out-of-scope)
//! notification channels. The core never renders a template or chooses a
//! transport — it only describes what happened.

use uuid::Uuid;

/// The dedup key: same subscriber, same rule, same period never fires the
/// same event type twice (§4.3.l).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub subscriber_id: Uuid,
    pub rule_id: Uuid,
    /// `YYYY-MM-DD` for a daily rule, `YYYY-MM` for a monthly one.
    pub period: String,
}

#[derive(Debug, Clone)]
pub enum NotificationEvent {
    FupApplied {
        subscriber_id: Uuid,
        level: u8,
        download_kbps: u32,
        upload_kbps: u32,
    },
    QuotaWarning {
        subscriber_id: Uuid,
        rule_id: Uuid,
        percent_used: u8,
        period: String,
    },
    Expiry {
        subscriber_id: Uuid,
        days_remaining: i64,
    },
}

impl NotificationEvent {
    /// The dedup key this event should be checked/recorded against, or
    /// `None` for events that are never deduplicated (e.g. expiry, which
    /// the external scheduler already debounces).
    pub fn dedup_key(&self) -> Option<DedupKey> {
        match self {
            NotificationEvent::QuotaWarning {
                subscriber_id,
                rule_id,
                period,
                ..
            } => Some(DedupKey {
                subscriber_id: *subscriber_id,
                rule_id: *rule_id,
                period: period.clone(),
            }),
            _ => None,
        }
    }
}
