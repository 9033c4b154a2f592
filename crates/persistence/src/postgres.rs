//! Postgres-backed [`PersistenceGateway`]. Every query is a manual
//! `sqlx::query(...).fetch_*` call mapped through `row.get(...)`, matching
//! the teacher's `tmf620_catalog::db` style rather than the `query!`
//! macro (no compile-time DB connection is assumed to exist).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use ispctl_core_model::{
    BandwidthRule, Cdn, ClusterConfig, ClusterEvent, ClusterNode, ClusterRole, FupTier, Nas,
    RadReply, RuleType, Service, ServiceCdn, Subscriber, SubscriberBandwidthRule,
};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::gateway::{PersistenceGateway, SubscriberSessionPatch};

pub struct PgPersistenceGateway {
    pool: Pool<Postgres>,
}

impl PgPersistenceGateway {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn subscriber_from_row(row: &sqlx::postgres::PgRow) -> Subscriber {
    Subscriber {
        id: row.get("id"),
        username: row.get("username"),
        full_name: row.get("full_name"),
        email: row.get("email"),
        phone: row.get("phone"),
        service_id: row.get("service_id"),
        price: row.get("price"),
        expiry_date: row.get("expiry_date"),
        reseller_id: row.get("reseller_id"),
        is_online: row.get("is_online"),
        ip_address: row.get("ip_address"),
        static_ip: row.get("static_ip"),
        nas_id: row.get("nas_id"),
        last_session_download: row.get("last_session_download"),
        last_session_upload: row.get("last_session_upload"),
        daily_download_used: row.get("daily_download_used"),
        daily_upload_used: row.get("daily_upload_used"),
        monthly_download_used: row.get("monthly_download_used"),
        monthly_upload_used: row.get("monthly_upload_used"),
        last_daily_reset: row.get("last_daily_reset"),
        last_monthly_reset: row.get("last_monthly_reset"),
        last_quota_sync: row.get("last_quota_sync"),
        last_bypass_cdn_bytes: row.get("last_bypass_cdn_bytes"),
        fup_level: row.get::<i16, _>("fup_level") as u8,
        monthly_fup_level: row.get::<i16, _>("monthly_fup_level") as u8,
    }
}

fn fup_tier_triplet(
    t1: i64,
    t1_dl: i64,
    t1_ul: i64,
    t2: i64,
    t2_dl: i64,
    t2_ul: i64,
    t3: i64,
    t3_dl: i64,
    t3_ul: i64,
) -> [FupTier; 3] {
    [
        FupTier {
            threshold_bytes: t1,
            download_kbps: t1_dl as u32,
            upload_kbps: t1_ul as u32,
        },
        FupTier {
            threshold_bytes: t2,
            download_kbps: t2_dl as u32,
            upload_kbps: t2_ul as u32,
        },
        FupTier {
            threshold_bytes: t3,
            download_kbps: t3_dl as u32,
            upload_kbps: t3_ul as u32,
        },
    ]
}

fn service_from_row(row: &sqlx::postgres::PgRow) -> Service {
    Service {
        id: row.get("id"),
        name: row.get("name"),
        download_speed_kbps: row.get::<i32, _>("download_speed") as u32,
        upload_speed_kbps: row.get::<i32, _>("upload_speed") as u32,
        daily_fup: fup_tier_triplet(
            row.get("fup1_threshold"),
            row.get("fup1_download_speed"),
            row.get("fup1_upload_speed"),
            row.get("fup2_threshold"),
            row.get("fup2_download_speed"),
            row.get("fup2_upload_speed"),
            row.get("fup3_threshold"),
            row.get("fup3_download_speed"),
            row.get("fup3_upload_speed"),
        ),
        monthly_fup: fup_tier_triplet(
            row.get("monthly_fup1_threshold"),
            row.get("monthly_fup1_download_speed"),
            row.get("monthly_fup1_upload_speed"),
            row.get("monthly_fup2_threshold"),
            row.get("monthly_fup2_download_speed"),
            row.get("monthly_fup2_upload_speed"),
            row.get("monthly_fup3_threshold"),
            row.get("monthly_fup3_download_speed"),
            row.get("monthly_fup3_upload_speed"),
        ),
        time_based_speed_enabled: row.get("time_based_speed_enabled"),
        time_from_hour: row.get::<i16, _>("time_from_hour") as u8,
        time_from_minute: row.get::<i16, _>("time_from_minute") as u8,
        time_to_hour: row.get::<i16, _>("time_to_hour") as u8,
        time_to_minute: row.get::<i16, _>("time_to_minute") as u8,
        time_download_ratio: row.get::<i16, _>("time_download_ratio") as u8,
        time_upload_ratio: row.get::<i16, _>("time_upload_ratio") as u8,
        block_on_daily_quota_exceeded: row.get("block_on_daily_quota_exceeded"),
        block_on_monthly_quota_exceeded: row.get("block_on_monthly_quota_exceeded"),
    }
}

fn nas_from_row(row: &sqlx::postgres::PgRow) -> Nas {
    Nas {
        id: row.get("id"),
        name: row.get("name"),
        ip_address: row.get("ip_address"),
        api_port: row.get::<i32, _>("api_port") as u16,
        auth_port: row.get::<i32, _>("auth_port") as u16,
        acct_port: row.get::<i32, _>("acct_port") as u16,
        coa_port: row.get::<i32, _>("coa_port") as u16,
        api_username: row.get("api_username"),
        api_password: row.get("api_password"),
        radius_shared_secret: row.get("radius_shared_secret"),
        is_active: row.get("is_active"),
    }
}

fn service_cdn_from_row(row: &sqlx::postgres::PgRow) -> ServiceCdn {
    ServiceCdn {
        id: row.get("id"),
        service_id: row.get("service_id"),
        cdn_id: row.get("cdn_id"),
        speed_limit_mbps: row.get::<i32, _>("speed_limit") as u32,
        pcq_enabled: row.get("pcq_enabled"),
        pcq_nas_id: row.get("pcq_nas_id"),
        pcq_limit_kib: row.get::<Option<i32>, _>("pcq_limit").map(|v| v as u32),
        pcq_total_limit_kib: row
            .get::<Option<i32>, _>("pcq_total_limit")
            .map(|v| v as u32),
        pcq_target_pools: row.get("pcq_target_pools"),
        bypass_quota: row.get("bypass_quota"),
        is_active: row.get("is_active"),
        time_window_override: row.get("time_window_override"),
        time_speed_ratio: row.get::<i16, _>("time_speed_ratio") as u8,
    }
}

fn bandwidth_rule_from_row(row: &sqlx::postgres::PgRow) -> BandwidthRule {
    BandwidthRule {
        id: row.get("id"),
        service_ids: row.get("service_ids"),
        days_of_week: row
            .get::<Vec<i16>, _>("days_of_week")
            .into_iter()
            .map(|d| d as u8)
            .collect(),
        start_hour: row.get::<i16, _>("start_hour") as u8,
        start_minute: row.get::<i16, _>("start_minute") as u8,
        end_hour: row.get::<i16, _>("end_hour") as u8,
        end_minute: row.get::<i16, _>("end_minute") as u8,
        download_multiplier: row.get::<i32, _>("download_multiplier") as u32,
        upload_multiplier: row.get::<i32, _>("upload_multiplier") as u32,
        priority: row.get("priority"),
        enabled: row.get("enabled"),
        auto_apply: row.get("auto_apply"),
    }
}

fn subscriber_bandwidth_rule_from_row(row: &sqlx::postgres::PgRow) -> SubscriberBandwidthRule {
    let rule_type: String = row.get("rule_type");
    SubscriberBandwidthRule {
        id: row.get("id"),
        subscriber_id: row.get("subscriber_id"),
        rule_type: if rule_type == "cdn" {
            RuleType::Cdn
        } else {
            RuleType::Internet
        },
        cdn_id: row.get("cdn_id"),
        download_speed_kbps: row.get::<i32, _>("download_speed") as u32,
        upload_speed_kbps: row.get::<i32, _>("upload_speed") as u32,
        start_hour: row.get::<i16, _>("start_hour") as u8,
        start_minute: row.get::<i16, _>("start_minute") as u8,
        end_hour: row.get::<i16, _>("end_hour") as u8,
        end_minute: row.get::<i16, _>("end_minute") as u8,
        enabled: row.get("enabled"),
        priority: row.get("priority"),
    }
}

fn cluster_role_from_str(s: &str) -> ClusterRole {
    match s {
        "main" => ClusterRole::Main,
        "secondary" => ClusterRole::Secondary,
        _ => ClusterRole::Standalone,
    }
}

fn cluster_role_to_str(role: ClusterRole) -> &'static str {
    match role {
        ClusterRole::Main => "main",
        ClusterRole::Secondary => "secondary",
        ClusterRole::Standalone => "standalone",
    }
}

#[async_trait]
impl PersistenceGateway for PgPersistenceGateway {
    async fn online_subscribers_grouped_by_nas(
        &self,
    ) -> crate::error::PersistenceResult<HashMap<Uuid, Vec<Subscriber>>> {
        let rows = sqlx::query(
            "SELECT * FROM subscribers WHERE is_online = true AND nas_id IS NOT NULL ORDER BY nas_id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<Subscriber>> = HashMap::new();
        for row in rows {
            let sub = subscriber_from_row(&row);
            if let Some(nas_id) = sub.nas_id {
                grouped.entry(nas_id).or_default().push(sub);
            }
        }
        Ok(grouped)
    }

    async fn get_subscriber(&self, id: Uuid) -> crate::error::PersistenceResult<Subscriber> {
        let row = sqlx::query("SELECT * FROM subscribers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| PersistenceError::NotFound(format!("subscriber {id}")))?;
        Ok(subscriber_from_row(&row))
    }

    async fn get_subscriber_by_username(
        &self,
        username: &str,
    ) -> crate::error::PersistenceResult<Subscriber> {
        let row = sqlx::query("SELECT * FROM subscribers WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| PersistenceError::NotFound(format!("subscriber {username}")))?;
        Ok(subscriber_from_row(&row))
    }

    async fn static_ip_owners(&self) -> crate::error::PersistenceResult<HashMap<String, Uuid>> {
        let rows = sqlx::query(
            "SELECT id, static_ip FROM subscribers WHERE static_ip IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get::<String, _>("static_ip"), row.get::<Uuid, _>("id")))
            .collect())
    }

    async fn apply_subscriber_patch(
        &self,
        id: Uuid,
        patch: SubscriberSessionPatch,
    ) -> crate::error::PersistenceResult<()> {
        sqlx::query(
            "UPDATE subscribers SET
                is_online = COALESCE($2, is_online),
                ip_address = CASE WHEN $3 THEN $4 ELSE ip_address END,
                last_session_download = COALESCE($5, last_session_download),
                last_session_upload = COALESCE($6, last_session_upload),
                daily_download_used = COALESCE($7, daily_download_used),
                daily_upload_used = COALESCE($8, daily_upload_used),
                monthly_download_used = COALESCE($9, monthly_download_used),
                monthly_upload_used = COALESCE($10, monthly_upload_used),
                last_daily_reset = COALESCE($11, last_daily_reset),
                last_monthly_reset = COALESCE($12, last_monthly_reset),
                last_quota_sync = COALESCE($13, last_quota_sync),
                last_bypass_cdn_bytes = COALESCE($14, last_bypass_cdn_bytes),
                fup_level = COALESCE($15, fup_level),
                monthly_fup_level = COALESCE($16, monthly_fup_level)
             WHERE id = $1",
        )
        .bind(id)
        .bind(patch.is_online)
        .bind(patch.ip_address.is_some())
        .bind(patch.ip_address.flatten())
        .bind(patch.last_session_download)
        .bind(patch.last_session_upload)
        .bind(patch.daily_download_used)
        .bind(patch.daily_upload_used)
        .bind(patch.monthly_download_used)
        .bind(patch.monthly_upload_used)
        .bind(patch.last_daily_reset)
        .bind(patch.last_monthly_reset)
        .bind(patch.last_quota_sync)
        .bind(patch.last_bypass_cdn_bytes)
        .bind(patch.fup_level.map(|v| v as i16))
        .bind(patch.monthly_fup_level.map(|v| v as i16))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn snapshot_and_reset_daily_usage(
        &self,
        yesterday: NaiveDate,
    ) -> crate::error::PersistenceResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO daily_usage_history (subscriber_id, usage_date, download_bytes, upload_bytes)
             SELECT id, $1, daily_download_used, daily_upload_used FROM subscribers
             WHERE daily_download_used > 0 OR daily_upload_used > 0
             ON CONFLICT (subscriber_id, usage_date)
             DO UPDATE SET download_bytes = EXCLUDED.download_bytes, upload_bytes = EXCLUDED.upload_bytes",
        )
        .bind(yesterday)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE subscribers SET
                daily_download_used = 0,
                daily_upload_used = 0,
                fup_level = 0,
                last_daily_reset = now()
             WHERE deleted_at IS NULL",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_service(&self, id: Uuid) -> crate::error::PersistenceResult<Service> {
        let row = sqlx::query("SELECT * FROM services WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| PersistenceError::NotFound(format!("service {id}")))?;
        Ok(service_from_row(&row))
    }

    async fn get_nas(&self, id: Uuid) -> crate::error::PersistenceResult<Nas> {
        let row = sqlx::query("SELECT * FROM nas_devices WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| PersistenceError::NotFound(format!("nas {id}")))?;
        Ok(nas_from_row(&row))
    }

    async fn active_nas_list(&self) -> crate::error::PersistenceResult<Vec<Nas>> {
        let rows = sqlx::query("SELECT * FROM nas_devices WHERE is_active = true")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(nas_from_row).collect())
    }

    async fn service_cdns_for_service(
        &self,
        service_id: Uuid,
    ) -> crate::error::PersistenceResult<Vec<ServiceCdn>> {
        let rows = sqlx::query("SELECT * FROM service_cdns WHERE service_id = $1 AND is_active = true")
            .bind(service_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(service_cdn_from_row).collect())
    }

    async fn get_cdn(&self, id: Uuid) -> crate::error::PersistenceResult<Cdn> {
        let row = sqlx::query("SELECT id, name, subnets AS subnets_raw FROM cdns WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| PersistenceError::NotFound(format!("cdn {id}")))?;
        Ok(Cdn {
            id: row.get("id"),
            name: row.get("name"),
            subnets_raw: row.get("subnets_raw"),
        })
    }

    async fn pcq_enabled_service_cdns(
        &self,
    ) -> crate::error::PersistenceResult<Vec<(ServiceCdn, Uuid)>> {
        let rows = sqlx::query(
            "SELECT * FROM service_cdns WHERE pcq_enabled = true AND is_active = true AND pcq_nas_id IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| (service_cdn_from_row(row), row.get::<Uuid, _>("pcq_nas_id")))
            .collect())
    }

    async fn upsert_rate_limit_reply(&self, reply: &RadReply) -> crate::error::PersistenceResult<()> {
        sqlx::query(
            "INSERT INTO radreply (username, attribute, value) VALUES ($1, $2, $3)
             ON CONFLICT (username, attribute) DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(&reply.username)
        .bind(&reply.attribute)
        .bind(&reply.value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn enabled_bandwidth_rules(&self) -> crate::error::PersistenceResult<Vec<BandwidthRule>> {
        let rows = sqlx::query("SELECT * FROM bandwidth_rules WHERE enabled = true ORDER BY priority")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(bandwidth_rule_from_row).collect())
    }

    async fn active_subscriber_bandwidth_rule(
        &self,
        subscriber_id: Uuid,
        rule_type: RuleType,
    ) -> crate::error::PersistenceResult<Option<SubscriberBandwidthRule>> {
        let type_str = match rule_type {
            RuleType::Internet => "internet",
            RuleType::Cdn => "cdn",
        };
        let rows = sqlx::query(
            "SELECT * FROM subscriber_bandwidth_rules
             WHERE subscriber_id = $1 AND rule_type = $2 AND enabled = true
             ORDER BY priority",
        )
        .bind(subscriber_id)
        .bind(type_str)
        .fetch_all(&self.pool)
        .await?;

        let now = Utc::now();
        Ok(rows
            .iter()
            .map(subscriber_bandwidth_rule_from_row)
            .find(|rule| rule.is_active_at(now)))
    }

    async fn close_stale_radacct_sessions(
        &self,
        threshold: Duration,
    ) -> crate::error::PersistenceResult<u64> {
        let seconds = threshold.as_secs() as i64;
        let result = sqlx::query(
            "UPDATE radacct SET acctstoptime = now(), acctterminatecause = 'Stale-Session-Cleanup'
             WHERE acctstoptime IS NULL
               AND acctupdatetime < now() - ($1 || ' seconds')::interval
               AND acctstarttime < now() - ($1 || ' seconds')::interval",
        )
        .bind(seconds.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn subscribers_without_live_session(
        &self,
        staleness: Duration,
    ) -> crate::error::PersistenceResult<Vec<Uuid>> {
        let seconds = staleness.as_secs() as i64;
        let rows = sqlx::query(
            "SELECT s.id FROM subscribers s
             WHERE (s.last_quota_sync IS NULL OR s.last_quota_sync < now() - ($1 || ' seconds')::interval)
               AND NOT EXISTS (
                   SELECT 1 FROM radacct r
                   WHERE r.username = s.username AND r.acctstoptime IS NULL
               )",
        )
        .bind(seconds.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|row| row.get("id")).collect())
    }

    async fn get_cluster_config(&self) -> crate::error::PersistenceResult<ClusterConfig> {
        let row = sqlx::query("SELECT * FROM cluster_config LIMIT 1")
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| PersistenceError::NotFound("cluster_config".into()))?;
        Ok(ClusterConfig {
            cluster_id: row.get("cluster_id"),
            cluster_secret: row.get("cluster_secret"),
            role: cluster_role_from_str(&row.get::<String, _>("role")),
        })
    }

    async fn cluster_nodes(&self) -> crate::error::PersistenceResult<Vec<ClusterNode>> {
        let rows = sqlx::query("SELECT * FROM cluster_nodes")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| ClusterNode {
                hardware_id: row.get("hardware_id"),
                name: row.get("name"),
                ip_address: row.get("ip_address"),
                role: cluster_role_from_str(&row.get::<String, _>("role")),
                version: row.get("version"),
                last_heartbeat: row.get("last_heartbeat"),
                is_online: row.get("is_online"),
                db_replication_lag_sec: row.get("db_replication_lag_sec"),
                cpu_percent: row.get("cpu_percent"),
                mem_percent: row.get("mem_percent"),
                disk_percent: row.get("disk_percent"),
                subscriber_count: row.get("subscriber_count"),
            })
            .collect())
    }

    async fn upsert_cluster_node_heartbeat(
        &self,
        node: &ClusterNode,
    ) -> crate::error::PersistenceResult<()> {
        sqlx::query(
            "INSERT INTO cluster_nodes
                (hardware_id, name, ip_address, role, version, last_heartbeat, is_online,
                 db_replication_lag_sec, cpu_percent, mem_percent, disk_percent, subscriber_count)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             ON CONFLICT (hardware_id) DO UPDATE SET
                name = EXCLUDED.name,
                ip_address = EXCLUDED.ip_address,
                role = EXCLUDED.role,
                version = EXCLUDED.version,
                last_heartbeat = EXCLUDED.last_heartbeat,
                is_online = EXCLUDED.is_online,
                db_replication_lag_sec = EXCLUDED.db_replication_lag_sec,
                cpu_percent = EXCLUDED.cpu_percent,
                mem_percent = EXCLUDED.mem_percent,
                disk_percent = EXCLUDED.disk_percent,
                subscriber_count = EXCLUDED.subscriber_count",
        )
        .bind(&node.hardware_id)
        .bind(&node.name)
        .bind(&node.ip_address)
        .bind(cluster_role_to_str(node.role))
        .bind(&node.version)
        .bind(node.last_heartbeat)
        .bind(node.is_online)
        .bind(node.db_replication_lag_sec)
        .bind(node.cpu_percent)
        .bind(node.mem_percent)
        .bind(node.disk_percent)
        .bind(node.subscriber_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_cluster_event(&self, event: &ClusterEvent) -> crate::error::PersistenceResult<()> {
        sqlx::query(
            "INSERT INTO cluster_events (id, cluster_id, hardware_id, kind, detail, occurred_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(event.id)
        .bind(event.cluster_id)
        .bind(&event.hardware_id)
        .bind(serde_json::to_string(&event.kind)?.trim_matches('"').to_string())
        .bind(&event.detail)
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_in_recovery(&self) -> crate::error::PersistenceResult<bool> {
        let row = sqlx::query("SELECT pg_is_in_recovery() AS in_recovery")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("in_recovery"))
    }

    async fn get_preference(&self, key: &str) -> crate::error::PersistenceResult<Option<String>> {
        let row = sqlx::query("SELECT value FROM system_preferences WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.get("value")))
    }
}
