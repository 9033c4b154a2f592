//! The per-subscriber reconciliation contract (§4.3 steps a–l).

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use dashmap::{DashMap, DashSet};
use ispctl_coa_client::CoAClient;
use ispctl_core_model::{BandwidthRule, Nas, RateLimit, RuleType, Subscriber};
use ispctl_notification::{DedupingDispatcher, NotificationEvent, NotificationSink};
use ispctl_persistence::{PersistenceGateway, SubscriberSessionPatch};
use ispctl_rate_cascade::apply_rate_change;
use ispctl_router_client::RouterOps;
use uuid::Uuid;

use crate::accumulate::{accumulate_daily, accumulate_monthly, Counters};
use crate::bypass::bypass_delta;
use crate::delta::{apply_free_percent, wrapping_delta};
use crate::error::ReconcilerError;
use crate::fup::evaluate_fup;
use crate::notifications::quota_warning_event;
use crate::reset_check::{daily_reset_crossed, month_changed};

/// Process-local state the reconciler rebuilds from scratch on restart
/// (§9): which subscribers currently have a time-boost applied, and to
/// which session id, plus which currently hold a CDN-override queue.
#[derive(Default)]
pub struct ReconcilerState {
    pub boost_applied: DashMap<Uuid, String>,
    pub cdn_override_active: DashSet<Uuid>,
}

/// The instant plus the timezone/reset-time config the per-subscriber
/// reset checks need, bundled so call sites don't thread five scalars.
#[derive(Clone, Copy)]
pub struct TickClock {
    pub instant: DateTime<Utc>,
    pub tz: Tz,
    pub reset_hour: u8,
    pub reset_minute: u8,
}

pub struct TickContext<'a> {
    pub gateway: &'a dyn PersistenceGateway,
    pub coa: &'a CoAClient,
    pub nas: &'a Nas,
    pub clock: TickClock,
    pub active_global_rules: &'a [BandwidthRule],
    pub state: &'a ReconcilerState,
}

pub async fn reconcile_subscriber<S: NotificationSink>(
    ctx: &TickContext<'_>,
    router: &mut dyn RouterOps,
    notifications: &DedupingDispatcher<S>,
    listed: &Subscriber,
) -> Result<(), ReconcilerError> {
    let gateway = ctx.gateway;

    // a. read the live session; no session means the subscriber dropped
    // off the NAS without the reaper catching it yet.
    let session = match router.get_active_session(&listed.username).await {
        Ok(s) => s,
        Err(_) => {
            gateway
                .apply_subscriber_patch(
                    listed.id,
                    SubscriberSessionPatch {
                        is_online: Some(false),
                        ip_address: Some(None),
                        last_bypass_cdn_bytes: Some(0),
                        ..Default::default()
                    },
                )
                .await?;
            router.remove_subscriber_cdn_override(&listed.username).await.ok();
            ctx.state.cdn_override_active.remove(&listed.id);
            ctx.state.boost_applied.remove(&listed.id);
            return Ok(());
        }
    };

    // b. re-read to pick up a concurrent external reset.
    let fresh = gateway.get_subscriber(listed.id).await?;
    let old_effective = fresh.effective_fup_level();
    let was_reset = match (fresh.last_daily_reset, fresh.last_quota_sync) {
        (Some(reset), Some(sync)) => reset > sync,
        (Some(_), None) => true,
        _ => false,
    };

    let service = gateway.get_service(fresh.service_id).await?;

    // c. delta. Convention pinned at §4.1/§4.3: tx = client download, rx =
    // client upload.
    let mut delta_dl = wrapping_delta(session.tx_bytes, fresh.last_session_download);
    let delta_ul = wrapping_delta(session.rx_bytes, fresh.last_session_upload);

    // d. bypass-CDN subtraction.
    let (cur_bypass, bypass_consumed) = match &fresh.ip_address {
        Some(ip) => {
            let (delta, cur) =
                bypass_delta(gateway, router, fresh.service_id, ip, fresh.last_bypass_cdn_bytes).await?;
            (cur, delta)
        }
        None => (fresh.last_bypass_cdn_bytes, 0),
    };
    delta_dl = (delta_dl - bypass_consumed).max(0);

    // e. free-hour discount.
    let local_time = ctx.clock.instant.with_timezone(&ctx.clock.tz).time();
    let free_percent = service
        .free_hour_window()
        .filter(|w| w.contains(local_time))
        .map(|_| service.time_download_ratio.min(100))
        .unwrap_or(0);
    let counted_dl = apply_free_percent(delta_dl, free_percent);
    let counted_ul = apply_free_percent(delta_ul, free_percent);

    // f. daily accumulation.
    let reset_crossed = daily_reset_crossed(
        fresh.last_daily_reset,
        ctx.clock.instant,
        ctx.clock.reset_hour,
        ctx.clock.reset_minute,
        ctx.clock.tz,
    );
    let daily = accumulate_daily(
        Counters {
            download: fresh.daily_download_used,
            upload: fresh.daily_upload_used,
        },
        Counters {
            download: counted_dl,
            upload: counted_ul,
        },
        reset_crossed,
        was_reset,
    );

    // g. monthly accumulation.
    let month_rolled = month_changed(fresh.last_monthly_reset, ctx.clock.instant);
    let monthly = accumulate_monthly(
        Counters {
            download: fresh.monthly_download_used,
            upload: fresh.monthly_upload_used,
        },
        Counters {
            download: counted_dl,
            upload: counted_ul,
        },
        month_rolled,
        free_percent,
    );

    // i (levels computed ahead of the atomic write so they land in the
    // same transaction as the counters that produced them).
    let fup_outcome = evaluate_fup(
        &service,
        daily.download + daily.upload,
        monthly.download + monthly.upload,
    );

    // h. atomic write.
    let mut patch = SubscriberSessionPatch {
        is_online: Some(true),
        last_session_download: Some(session.tx_bytes),
        last_session_upload: Some(session.rx_bytes),
        daily_download_used: Some(daily.download),
        daily_upload_used: Some(daily.upload),
        monthly_download_used: Some(monthly.download),
        monthly_upload_used: Some(monthly.upload),
        last_bypass_cdn_bytes: Some(cur_bypass),
        last_quota_sync: Some(ctx.clock.instant),
        fup_level: Some(fup_outcome.daily_level),
        monthly_fup_level: Some(fup_outcome.monthly_level),
        ..Default::default()
    };
    if reset_crossed {
        patch.last_daily_reset = Some(ctx.clock.instant);
    }
    if month_rolled {
        patch.last_monthly_reset = Some(ctx.clock.instant);
    }
    gateway.apply_subscriber_patch(fresh.id, patch).await?;

    let subscriber_rule = gateway
        .active_subscriber_bandwidth_rule(fresh.id, RuleType::Internet)
        .await?;

    // i. FUP speed cascade. A per-subscriber internet rule always wins, so
    // FUP changes are tracked but not pushed to the router while one is
    // active (§4.4 owns the rate in that case).
    if subscriber_rule.is_none() && fup_outcome.level != old_effective {
        if fup_outcome.level > 0 {
            let daily_governs = fup_outcome.daily_level == fup_outcome.level;
            let monthly_governs = fup_outcome.monthly_level == fup_outcome.level;
            let blocked = (daily_governs && service.block_on_daily_quota_exceeded)
                || (monthly_governs && service.block_on_monthly_quota_exceeded);

            let rate = if blocked {
                RateLimit::new(1, 1)
            } else {
                let (upload, download) = fup_outcome
                    .speed_kbps
                    .unwrap_or((service.upload_speed_kbps, service.download_speed_kbps));
                RateLimit::new(upload, download)
            };

            if let Some(ip) = &fresh.ip_address {
                apply_rate_change(
                    gateway,
                    router,
                    ctx.coa,
                    ctx.nas,
                    &fresh.username,
                    ip,
                    &session.session_id,
                    rate,
                )
                .await?;
            }

            notifications
                .dispatch(NotificationEvent::FupApplied {
                    subscriber_id: fresh.id,
                    level: fup_outcome.level,
                    download_kbps: rate.download_kbps,
                    upload_kbps: rate.upload_kbps,
                })
                .await
                .ok();
        } else if let Some(ip) = &fresh.ip_address {
            let rate = RateLimit::new(service.upload_speed_kbps, service.download_speed_kbps);
            apply_rate_change(
                gateway,
                router,
                ctx.coa,
                ctx.nas,
                &fresh.username,
                ip,
                &session.session_id,
                rate,
            )
            .await?;
        }
    }

    // j. time-based boost.
    if let (Some(window), Some(ip)) = (service.free_hour_window(), fresh.ip_address.as_ref()) {
        let window_active = window.contains(local_time);
        let global_rule_active = ctx
            .active_global_rules
            .iter()
            .any(|r| r.is_active_at(ctx.clock.instant) && r.applies_to_service(fresh.service_id));

        if window_active {
            if subscriber_rule.is_some() && global_rule_active {
                // the global multiplier already boosted the subscriber
                // rule's rate; boosting again here would double it.
            } else {
                let base = subscriber_rule
                    .as_ref()
                    .map(|r| (r.upload_speed_kbps, r.download_speed_kbps))
                    .or(fup_outcome.speed_kbps)
                    .unwrap_or((service.upload_speed_kbps, service.download_speed_kbps));
                let boosted =
                    RateLimit::new(base.0, base.1).scaled(100 + service.time_upload_ratio as u32);

                let already_applied = ctx
                    .state
                    .boost_applied
                    .get(&fresh.id)
                    .map(|s| *s == session.session_id)
                    .unwrap_or(false);
                if !already_applied {
                    apply_rate_change(
                        gateway,
                        router,
                        ctx.coa,
                        ctx.nas,
                        &fresh.username,
                        ip,
                        &session.session_id,
                        boosted,
                    )
                    .await?;
                    ctx.state
                        .boost_applied
                        .insert(fresh.id, session.session_id.clone());
                }
            }
        } else if ctx.state.boost_applied.remove(&fresh.id).is_some() {
            let base = subscriber_rule
                .as_ref()
                .map(|r| (r.upload_speed_kbps, r.download_speed_kbps))
                .or(fup_outcome.speed_kbps)
                .unwrap_or((service.upload_speed_kbps, service.download_speed_kbps));
            apply_rate_change(
                gateway,
                router,
                ctx.coa,
                ctx.nas,
                &fresh.username,
                ip,
                &session.session_id,
                RateLimit::new(base.0, base.1),
            )
            .await?;
        }
    }

    // k. per-subscriber CDN override queue.
    let cdn_rule = gateway
        .active_subscriber_bandwidth_rule(fresh.id, RuleType::Cdn)
        .await?;
    match (&cdn_rule, &fresh.ip_address) {
        (Some(rule), Some(ip)) => {
            if let Some(cdn_id) = rule.cdn_id {
                let cdn = gateway.get_cdn(cdn_id).await?;
                let speed_mbps = if rule.download_speed_kbps > 0 {
                    (rule.download_speed_kbps / 1000).max(1)
                } else {
                    fallback_cdn_speed_mbps(gateway, fresh.service_id, cdn_id).await?
                };
                router
                    .create_subscriber_cdn_override(&fresh.username, &cdn.name, speed_mbps, ip)
                    .await?;
                ctx.state.cdn_override_active.insert(fresh.id);
            }
        }
        _ => {
            if ctx.state.cdn_override_active.remove(&fresh.id).is_some() {
                router.remove_subscriber_cdn_override(&fresh.username).await?;
            }
        }
    }

    // l. quota-warning notification.
    if counted_dl + counted_ul > 0 {
        if let Some(event) =
            quota_warning_event(fresh.id, &service, daily.download + daily.upload, ctx.clock.instant)
        {
            notifications.dispatch(event).await.ok();
        }
    }

    Ok(())
}

async fn fallback_cdn_speed_mbps(
    gateway: &dyn PersistenceGateway,
    service_id: Uuid,
    cdn_id: Uuid,
) -> Result<u32, ReconcilerError> {
    let service_cdns = gateway.service_cdns_for_service(service_id).await?;
    Ok(service_cdns
        .into_iter()
        .find(|sc| sc.cdn_id == cdn_id)
        .map(|sc| sc.speed_limit_mbps)
        .unwrap_or(1))
}
