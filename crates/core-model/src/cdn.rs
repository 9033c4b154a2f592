//! CDN shaping configuration: the global CDN record and its per-service
//! override (`ServiceCDN`).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A CDN definition: a name (used to derive RouterOS object names like
/// `CDN-<name>`) and its free-form subnet list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cdn {
    pub id: Uuid,
    pub name: String,
    /// CIDR list, separated in storage by comma/newline/semicolon/space.
    pub subnets_raw: String,
}

impl Cdn {
    /// Splits `subnets_raw` on the four separators the admin UI accepts.
    pub fn subnets(&self) -> Vec<&str> {
        self.subnets_raw
            .split([',', '\n', ';', ' '])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn address_list_name(&self) -> String {
        format!("CDN-{}", self.name)
    }
}

/// Per-(service, CDN) override: speed cap, optional PCQ setup and
/// bypass-quota/time-window behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCdn {
    pub id: Uuid,
    pub service_id: Uuid,
    pub cdn_id: Uuid,

    pub speed_limit_mbps: u32,

    pub pcq_enabled: bool,
    pub pcq_nas_id: Option<Uuid>,
    pub pcq_limit_kib: Option<u32>,
    pub pcq_total_limit_kib: Option<u32>,
    pub pcq_target_pools: Option<String>,

    pub bypass_quota: bool,
    pub is_active: bool,

    pub time_window_override: bool,
    pub time_speed_ratio: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subnets_split_on_every_separator() {
        let cdn = Cdn {
            id: Uuid::new_v4(),
            name: "netflix".into(),
            subnets_raw: "1.2.3.0/24,4.5.6.0/24\n7.8.9.0/24; 10.0.0.0/8 11.0.0.0/8".into(),
        };
        assert_eq!(
            cdn.subnets(),
            vec![
                "1.2.3.0/24",
                "4.5.6.0/24",
                "7.8.9.0/24",
                "10.0.0.0/8",
                "11.0.0.0/8",
            ]
        );
    }

    #[test]
    fn address_list_name_is_branded() {
        let cdn = Cdn {
            id: Uuid::new_v4(),
            name: "netflix".into(),
            subnets_raw: String::new(),
        };
        assert_eq!(cdn.address_list_name(), "CDN-netflix");
    }
}
