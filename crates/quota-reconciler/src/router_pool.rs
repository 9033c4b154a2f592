//! One `RouterClient` connection per NAS per tick (§4.1's concurrency
//! note), shared across every step that needs to talk to that router.

use std::collections::HashMap;
use std::time::Duration;

use ispctl_persistence::PersistenceGateway;
use ispctl_router_client::RouterClient;
use uuid::Uuid;

use crate::error::ReconcilerError;

const ROUTER_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn get_or_connect<'a>(
    nas_id: Uuid,
    gateway: &dyn PersistenceGateway,
    routers: &'a mut HashMap<Uuid, RouterClient>,
) -> Result<&'a mut RouterClient, ReconcilerError> {
    if !routers.contains_key(&nas_id) {
        let nas = gateway.get_nas(nas_id).await?;
        let mut client = RouterClient::connect(&nas.api_addr(), ROUTER_TIMEOUT).await?;
        client.login(&nas.api_username, &nas.api_password).await?;
        routers.insert(nas_id, client);
    }
    Ok(routers.get_mut(&nas_id).unwrap())
}
