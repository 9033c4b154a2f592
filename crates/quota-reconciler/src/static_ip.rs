//! Static-IP squatter sweep (§4.3 step 2): an online subscriber using an
//! IP statically reserved for somebody else gets disconnected and its
//! `ip_address` cleared so the reconciler's NAS grouping below re-reads
//! a clean session on the next pass.

use std::collections::HashMap;

use ispctl_coa_client::CoAClient;
use ispctl_core_model::Subscriber;
use ispctl_persistence::{PersistenceGateway, SubscriberSessionPatch};
use ispctl_router_client::RouterClient;
use log::warn;
use uuid::Uuid;

use crate::error::ReconcilerError;
use crate::router_pool::get_or_connect;

pub async fn sweep_static_ip_conflicts(
    gateway: &dyn PersistenceGateway,
    coa: &CoAClient,
    online: &HashMap<Uuid, Vec<Subscriber>>,
    routers: &mut HashMap<Uuid, RouterClient>,
) -> Result<(), ReconcilerError> {
    let owners = gateway.static_ip_owners().await?;

    for (&nas_id, subs) in online {
        for sub in subs {
            let Some(ip) = &sub.ip_address else { continue };
            let Some(&owner_id) = owners.get(ip) else { continue };
            if owner_id == sub.id {
                continue;
            }

            warn!(
                "{} is using {ip}, a static IP reserved for another subscriber; disconnecting",
                sub.username
            );

            if let Err(e) = disconnect_squatter(gateway, coa, nas_id, sub, routers).await {
                warn!("failed to disconnect squatter {}: {e}", sub.username);
            }

            gateway
                .apply_subscriber_patch(
                    sub.id,
                    SubscriberSessionPatch {
                        ip_address: Some(None),
                        ..Default::default()
                    },
                )
                .await?;
        }
    }
    Ok(())
}

async fn disconnect_squatter(
    gateway: &dyn PersistenceGateway,
    coa: &CoAClient,
    nas_id: Uuid,
    sub: &Subscriber,
    routers: &mut HashMap<Uuid, RouterClient>,
) -> Result<(), ReconcilerError> {
    use ispctl_router_client::RouterOps;

    let nas = gateway.get_nas(nas_id).await?;
    let router = get_or_connect(nas_id, gateway, routers).await?;
    let session_id = router
        .get_active_session(&sub.username)
        .await
        .map(|s| s.session_id)
        .unwrap_or_default();

    let coa_ok = match coa.disconnect(&nas, &sub.username, &session_id).await {
        Ok(()) => true,
        Err(e) if e.is_retryable() => coa.disconnect(&nas, &sub.username, &session_id).await.is_ok(),
        Err(_) => false,
    };
    if !coa_ok {
        router.disconnect_user(&sub.username).await?;
    }
    Ok(())
}
