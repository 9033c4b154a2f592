//! The sink contract plus a deduplicating wrapper around it.

use async_trait::async_trait;
use dashmap::DashSet;

use crate::error::NotificationError;
use crate::event::NotificationEvent;

/// Implemented by the out-of-scope notification channel (SMS/WhatsApp/
/// email); the core only ever holds a `dyn NotificationSink`.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, event: NotificationEvent) -> Result<(), NotificationError>;
}

/// Logs every event instead of delivering it. Useful as the default sink
/// in environments with no configured channel, and in tests.
pub struct LoggingSink;

#[async_trait]
impl NotificationSink for LoggingSink {
    async fn send(&self, event: NotificationEvent) -> Result<(), NotificationError> {
        log::info!("notification event: {event:?}");
        Ok(())
    }
}

/// Wraps any [`NotificationSink`] and suppresses repeat deliveries that
/// share a dedup key, keyed per (subscriber, rule, day-or-month) as §4.3.l
/// requires. The seen-set is process-local and grows monotonically; it is
/// small (bounded by online-subscriber count × rule count per period) and
/// is rebuilt on restart, like the other in-memory scheduler state (§9).
pub struct DedupingDispatcher<S: NotificationSink> {
    inner: S,
    seen: DashSet<crate::event::DedupKey>,
}

impl<S: NotificationSink> DedupingDispatcher<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            seen: DashSet::new(),
        }
    }

    pub async fn dispatch(&self, event: NotificationEvent) -> Result<(), NotificationError> {
        if let Some(key) = event.dedup_key() {
            if !self.seen.insert(key) {
                log::debug!("suppressing duplicate notification for this period");
                return Ok(());
            }
        }
        match self.inner.send(event.clone()).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_retryable() => {
                log::warn!("notification sink hit a retryable error, retrying once: {e}");
                self.inner.send(event).await
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::NotificationEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    struct CountingSink(Arc<AtomicUsize>);

    #[async_trait]
    impl NotificationSink for CountingSink {
        async fn send(&self, _event: NotificationEvent) -> Result<(), NotificationError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn same_period_quota_warning_sent_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let dispatcher = DedupingDispatcher::new(CountingSink(count.clone()));
        let subscriber_id = Uuid::new_v4();
        let rule_id = Uuid::new_v4();

        for _ in 0..3 {
            dispatcher
                .dispatch(NotificationEvent::QuotaWarning {
                    subscriber_id,
                    rule_id,
                    percent_used: 80,
                    period: "2026-07".to_string(),
                })
                .await
                .unwrap();
        }

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_period_sends_again() {
        let count = Arc::new(AtomicUsize::new(0));
        let dispatcher = DedupingDispatcher::new(CountingSink(count.clone()));
        let subscriber_id = Uuid::new_v4();
        let rule_id = Uuid::new_v4();

        dispatcher
            .dispatch(NotificationEvent::QuotaWarning {
                subscriber_id,
                rule_id,
                percent_used: 80,
                period: "2026-07".to_string(),
            })
            .await
            .unwrap();
        dispatcher
            .dispatch(NotificationEvent::QuotaWarning {
                subscriber_id,
                rule_id,
                percent_used: 95,
                period: "2026-08".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fup_applied_is_never_deduplicated() {
        let count = Arc::new(AtomicUsize::new(0));
        let dispatcher = DedupingDispatcher::new(CountingSink(count.clone()));
        for _ in 0..2 {
            dispatcher
                .dispatch(NotificationEvent::FupApplied {
                    subscriber_id: Uuid::new_v4(),
                    level: 1,
                    download_kbps: 2000,
                    upload_kbps: 2000,
                })
                .await
                .unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
