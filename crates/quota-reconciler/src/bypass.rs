//! Bypass-CDN download-byte attribution (§4.3.d): traffic to CIDRs owned
//! by a `bypass_quota=true` CDN doesn't count against the subscriber's
//! plan quota.

use ispctl_persistence::PersistenceGateway;
use ispctl_router_client::RouterOps;
use uuid::Uuid;

use crate::cidr::ip_in_cidr;
use crate::delta::wrapping_delta;
use crate::error::ReconcilerError;

/// Returns `(delta_since_last_tick, cumulative_total)` of download bytes
/// attributable to bypass CDNs, both already clamped to the wrap-safe
/// delta rule used everywhere else in the tick.
pub async fn bypass_delta(
    gateway: &dyn PersistenceGateway,
    router: &mut dyn RouterOps,
    service_id: Uuid,
    subscriber_ip: &str,
    last_bypass_cdn_bytes: i64,
) -> Result<(i64, i64), ReconcilerError> {
    let service_cdns = gateway.service_cdns_for_service(service_id).await?;
    let bypass_cdns: Vec<_> = service_cdns.into_iter().filter(|sc| sc.bypass_quota).collect();
    if bypass_cdns.is_empty() {
        return Ok((0, 0));
    }

    let mut cidrs = Vec::new();
    for sc in &bypass_cdns {
        let cdn = gateway.get_cdn(sc.cdn_id).await?;
        cidrs.extend(cdn.subnets().into_iter().map(str::to_string));
    }

    let connections = router.firewall_connections(subscriber_ip).await?;
    let cur_bypass: i64 = connections
        .iter()
        .filter(|c| cidrs.iter().any(|cidr| ip_in_cidr(&c.remote_ip, cidr)))
        .map(|c| c.download_bytes)
        .sum();

    Ok((wrapping_delta(cur_bypass, last_bypass_cdn_bytes), cur_bypass))
}
