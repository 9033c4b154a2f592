//! Observability helpers for monitoring and tracing

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request trace information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceContext {
    pub trace_id: Uuid,
    pub span_id: Uuid,
    pub parent_span_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

impl TraceContext {
    /// Create a new trace context
    pub fn new() -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            span_id: Uuid::new_v4(),
            parent_span_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a child span
    pub fn child_span(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: Uuid::new_v4(),
            parent_span_id: Some(self.span_id),
            timestamp: Utc::now(),
        }
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics for API operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMetrics {
    pub endpoint: String,
    pub method: String,
    pub status_code: u16,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<Vec<ComponentCheck>>,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthCheck {
    /// Create a healthy health check
    pub fn healthy(version: String) -> Self {
        Self {
            status: HealthStatus::Healthy,
            version,
            timestamp: Utc::now(),
            checks: None,
        }
    }

    /// One `ComponentCheck` per running loop, rolled up to the worst
    /// status among them (Unhealthy > Degraded > Healthy).
    pub fn from_components(version: String, checks: Vec<ComponentCheck>) -> Self {
        let status = checks
            .iter()
            .map(|c| &c.status)
            .max_by_key(|s| match s {
                HealthStatus::Healthy => 0,
                HealthStatus::Degraded => 1,
                HealthStatus::Unhealthy => 2,
            })
            .cloned()
            .unwrap_or(HealthStatus::Healthy);

        Self {
            status,
            version,
            timestamp: Utc::now(),
            checks: Some(checks),
        }
    }
}

/// Shared, in-process health snapshot. Every background loop reports its
/// own result after each tick via [`HealthRegistry::report`]; anything
/// inside the process (the heartbeat server, a future admin surface) can
/// call [`HealthRegistry::snapshot`] to read the latest rollup without
/// waiting on the loops themselves.
#[derive(Debug, Default)]
pub struct HealthRegistry {
    components: DashMap<String, ComponentCheck>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, name: impl Into<String>, status: HealthStatus, message: Option<String>) {
        let name = name.into();
        self.components.insert(name.clone(), ComponentCheck { name, status, message });
    }

    pub fn snapshot(&self, version: &str) -> HealthCheck {
        let checks: Vec<ComponentCheck> = self.components.iter().map(|e| e.value().clone()).collect();
        HealthCheck::from_components(version.to_string(), checks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_reports_roll_up_to_worst_status() {
        let registry = HealthRegistry::new();
        registry.report("quota_reconciler", HealthStatus::Healthy, None);
        registry.report("cluster_agent", HealthStatus::Degraded, Some("update pending".to_string()));
        let snapshot = registry.snapshot("0.3.0");
        assert_eq!(snapshot.status, HealthStatus::Degraded);
        assert_eq!(snapshot.checks.unwrap().len(), 2);
    }

    #[test]
    fn registry_report_overwrites_previous_tick_for_same_component() {
        let registry = HealthRegistry::new();
        registry.report("pcq_manager", HealthStatus::Unhealthy, Some("nas unreachable".to_string()));
        registry.report("pcq_manager", HealthStatus::Healthy, None);
        let snapshot = registry.snapshot("0.3.0");
        assert_eq!(snapshot.status, HealthStatus::Healthy);
        assert_eq!(snapshot.checks.unwrap().len(), 1);
    }

    #[test]
    fn rolls_up_to_the_worst_component_status() {
        let check = HealthCheck::from_components(
            "0.3.0".to_string(),
            vec![
                ComponentCheck {
                    name: "quota_reconciler".to_string(),
                    status: HealthStatus::Healthy,
                    message: None,
                },
                ComponentCheck {
                    name: "cluster_agent".to_string(),
                    status: HealthStatus::Degraded,
                    message: Some("update pending".to_string()),
                },
            ],
        );
        assert_eq!(check.status, HealthStatus::Degraded);
    }
}
