//! The global bandwidth-rule activation/deactivation loop (§4.4).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::{DashMap, DashSet};
use ispctl_coa_client::CoAClient;
use ispctl_core_model::{BandwidthRule, RateLimit, Subscriber};
use ispctl_persistence::PersistenceGateway;
use ispctl_rate_cascade::apply_rate_change;
use ispctl_router_client::{RouterClient, RouterOps};
use ispctl_utils::{HealthRegistry, HealthStatus};
use log::{info, warn};
use tokio::sync::watch;
use uuid::Uuid;

use crate::base_rate::base_rate_for_subscriber;
use crate::error::SchedulerError;

const ROUTER_TIMEOUT: Duration = Duration::from_secs(5);
const COMPONENT: &str = "bandwidth_scheduler";

#[derive(Debug, Clone, Copy)]
struct AppliedRule {
    rule_id: Uuid,
    priority: i32,
}

pub struct BandwidthRuleScheduler {
    gateway: Arc<dyn PersistenceGateway>,
    coa: Arc<CoAClient>,
    active_rules: DashSet<Uuid>,
    applied_to_users: DashMap<Uuid, AppliedRule>,
    /// Subscribers seen online as of the last tick, used to detect a
    /// fresh connect so `apply_new_subscriber` runs exactly once per
    /// login rather than every tick the subscriber stays online.
    known_online: DashSet<Uuid>,
    tick_interval: Duration,
    health: Option<Arc<HealthRegistry>>,
}

impl BandwidthRuleScheduler {
    pub fn new(gateway: Arc<dyn PersistenceGateway>, coa: Arc<CoAClient>, tick_interval: Duration) -> Self {
        Self {
            gateway,
            coa,
            active_rules: DashSet::new(),
            applied_to_users: DashMap::new(),
            known_online: DashSet::new(),
            tick_interval,
            health: None,
        }
    }

    pub fn with_health(mut self, health: Arc<HealthRegistry>) -> Self {
        self.health = Some(health);
        self
    }

    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        info!("bandwidth rule scheduler started");
        let mut ticker = tokio::time::interval(self.tick_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(()) => {
                            if let Some(h) = &self.health {
                                h.report(COMPONENT, HealthStatus::Healthy, None);
                            }
                        }
                        Err(e) => {
                            warn!("bandwidth rule scheduler tick failed: {e}");
                            if let Some(h) = &self.health {
                                h.report(COMPONENT, HealthStatus::Degraded, Some(e.to_string()));
                            }
                        }
                    }
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        info!("bandwidth rule scheduler stopping");
                        return;
                    }
                }
            }
        }
    }

    async fn tick(&self) -> Result<(), SchedulerError> {
        let rules: Vec<BandwidthRule> = self
            .gateway
            .enabled_bandwidth_rules()
            .await?
            .into_iter()
            .filter(|r| r.auto_apply)
            .collect();
        let now = Utc::now();

        let mut newly_active = Vec::new();
        let mut newly_inactive = Vec::new();
        for rule in &rules {
            let is_active = rule.is_active_at(now);
            let was_active = self.active_rules.contains(&rule.id);
            if is_active && !was_active {
                self.active_rules.insert(rule.id);
                newly_active.push(rule.clone());
            } else if !is_active && was_active {
                self.active_rules.remove(&rule.id);
                newly_inactive.push(rule.clone());
            }
        }

        let online = self.gateway.online_subscribers_grouped_by_nas().await?;

        let mut seen_now = std::collections::HashSet::new();
        let mut newly_connected = Vec::new();
        for subs in online.values() {
            for sub in subs {
                seen_now.insert(sub.id);
                if self.known_online.insert(sub.id) {
                    newly_connected.push(sub.clone());
                }
            }
        }
        self.known_online.retain(|id| seen_now.contains(id));

        let mut routers: HashMap<Uuid, RouterClient> = HashMap::new();

        for rule in &newly_active {
            self.activate_rule(rule, &online, &mut routers).await?;
        }
        for rule in &newly_inactive {
            self.deactivate_rule(rule, &online, &mut routers).await?;
        }
        for sub in &newly_connected {
            if let Err(e) = self.apply_new_subscriber(sub).await {
                warn!("apply_new_subscriber failed for {}: {e}", sub.username);
            }
        }
        Ok(())
    }

    /// Manual trigger used by an admin action; applies the rule's
    /// multiplier to every currently-online subscriber it matches,
    /// regardless of edge-transition state.
    pub async fn apply_rule_now(&self, rule: &BandwidthRule) -> Result<(), SchedulerError> {
        let online = self.gateway.online_subscribers_grouped_by_nas().await?;
        let mut routers = HashMap::new();
        self.activate_rule(rule, &online, &mut routers).await
    }

    /// `ApplyNewSubscriber(sub)` (§4.4): on login, checks the rules
    /// currently active and applies the highest-priority one (lowest
    /// `priority` value) matching the subscriber's service, if any.
    pub async fn apply_new_subscriber(&self, sub: &Subscriber) -> Result<(), SchedulerError> {
        let Some(nas_id) = sub.nas_id else {
            return Ok(());
        };
        let rules = self.gateway.enabled_bandwidth_rules().await?;
        let matching = rules
            .into_iter()
            .filter(|r| r.auto_apply && self.active_rules.contains(&r.id) && r.applies_to_service(sub.service_id))
            .min_by_key(|r| r.priority);

        let Some(rule) = matching else {
            return Ok(());
        };

        let online = HashMap::from([(nas_id, vec![sub.clone()])]);
        let mut routers = HashMap::new();
        self.activate_rule(&rule, &online, &mut routers).await
    }

    async fn router_for(
        &self,
        nas_id: Uuid,
        routers: &mut HashMap<Uuid, RouterClient>,
    ) -> Result<(), SchedulerError> {
        if routers.contains_key(&nas_id) {
            return Ok(());
        }
        let nas = self.gateway.get_nas(nas_id).await?;
        let mut client = RouterClient::connect(&nas.api_addr(), ROUTER_TIMEOUT).await?;
        client.login(&nas.api_username, &nas.api_password).await?;
        routers.insert(nas_id, client);
        Ok(())
    }

    async fn activate_rule(
        &self,
        rule: &BandwidthRule,
        online: &HashMap<Uuid, Vec<Subscriber>>,
        routers: &mut HashMap<Uuid, RouterClient>,
    ) -> Result<(), SchedulerError> {
        for (&nas_id, subscribers) in online {
            for sub in subscribers
                .iter()
                .filter(|s| rule.applies_to_service(s.service_id))
            {
                if let Some(existing) = self.applied_to_users.get(&sub.id) {
                    if existing.priority <= rule.priority {
                        continue;
                    }
                }

                let Some(ip) = sub.ip_address.clone() else {
                    continue;
                };
                let service = self.gateway.get_service(sub.service_id).await?;
                let base = base_rate_for_subscriber(self.gateway.as_ref(), sub, &service).await?;
                let new_rate = RateLimit::new(
                    base.upload_kbps * rule.upload_multiplier / 100,
                    base.download_kbps * rule.download_multiplier / 100,
                );

                if self.router_for(nas_id, routers).await.is_err() {
                    continue;
                }
                let router = routers.get_mut(&nas_id).unwrap();
                let session = match router.get_active_session(&sub.username).await {
                    Ok(s) => s,
                    Err(_) => continue,
                };
                let nas = self.gateway.get_nas(nas_id).await?;

                if let Err(e) = apply_rate_change(
                    self.gateway.as_ref(),
                    router,
                    &self.coa,
                    &nas,
                    &sub.username,
                    &ip,
                    &session.session_id,
                    new_rate,
                )
                .await
                {
                    if e.is_retryable() {
                        warn!("rate change for {} hit a retryable error, retrying once: {e}", sub.username);
                        if let Err(e2) = apply_rate_change(
                            self.gateway.as_ref(),
                            router,
                            &self.coa,
                            &nas,
                            &sub.username,
                            &ip,
                            &session.session_id,
                            new_rate,
                        )
                        .await
                        {
                            warn!("retry for {} also failed, skipping: {e2}", sub.username);
                            continue;
                        }
                    } else {
                        warn!("rate change failed for {} (not retryable): {e}", sub.username);
                        continue;
                    }
                }

                self.applied_to_users.insert(
                    sub.id,
                    AppliedRule {
                        rule_id: rule.id,
                        priority: rule.priority,
                    },
                );
            }
        }
        Ok(())
    }

    async fn deactivate_rule(
        &self,
        rule: &BandwidthRule,
        online: &HashMap<Uuid, Vec<Subscriber>>,
        routers: &mut HashMap<Uuid, RouterClient>,
    ) -> Result<(), SchedulerError> {
        let affected: Vec<Uuid> = self
            .applied_to_users
            .iter()
            .filter(|entry| entry.value().rule_id == rule.id)
            .map(|entry| *entry.key())
            .collect();

        for (&nas_id, subscribers) in online {
            for sub in subscribers.iter().filter(|s| affected.contains(&s.id)) {
                let Some(ip) = sub.ip_address.clone() else {
                    self.applied_to_users.remove(&sub.id);
                    continue;
                };
                let service = self.gateway.get_service(sub.service_id).await?;
                let base = base_rate_for_subscriber(self.gateway.as_ref(), sub, &service).await?;

                if self.router_for(nas_id, routers).await.is_err() {
                    self.applied_to_users.remove(&sub.id);
                    continue;
                }
                let router = routers.get_mut(&nas_id).unwrap();
                let session = match router.get_active_session(&sub.username).await {
                    Ok(s) => s,
                    Err(_) => {
                        self.applied_to_users.remove(&sub.id);
                        continue;
                    }
                };
                let nas = self.gateway.get_nas(nas_id).await?;

                if let Err(e) = apply_rate_change(
                    self.gateway.as_ref(),
                    router,
                    &self.coa,
                    &nas,
                    &sub.username,
                    &ip,
                    &session.session_id,
                    base,
                )
                .await
                {
                    if e.is_retryable() {
                        warn!("base rate restore for {} hit a retryable error, retrying once: {e}", sub.username);
                        if let Err(e2) = apply_rate_change(
                            self.gateway.as_ref(),
                            router,
                            &self.coa,
                            &nas,
                            &sub.username,
                            &ip,
                            &session.session_id,
                            base,
                        )
                        .await
                        {
                            warn!("retry for {} also failed: {e2}", sub.username);
                        }
                    } else {
                        warn!("base rate restore failed for {} (not retryable): {e}", sub.username);
                    }
                }

                self.applied_to_users.remove(&sub.id);
            }
        }
        Ok(())
    }
}
