//! Edge router (NAS) connection parameters.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A RouterOS-speaking edge device terminating PPPoE sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nas {
    pub id: Uuid,
    pub name: String,
    pub ip_address: String,

    pub api_port: u16,
    pub auth_port: u16,
    pub acct_port: u16,
    pub coa_port: u16,

    pub api_username: String,
    pub api_password: String,
    pub radius_shared_secret: String,

    pub is_active: bool,
}

impl Nas {
    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.ip_address, self.api_port)
    }

    pub fn coa_addr(&self) -> String {
        format!("{}:{}", self.ip_address, self.coa_port)
    }
}
