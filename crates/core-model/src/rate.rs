//! Rate-limit formatting shared by every crate that writes a RadReply row
//! or a RouterOS `max-limit` argument.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An upload/download pair expressed in kbps, in RouterOS's own word order
/// (upload first). `RadReply.value` and `max-limit=` arguments are both
/// `"UPk/DLk"` strings built from this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RateLimit {
    pub upload_kbps: u32,
    pub download_kbps: u32,
}

impl RateLimit {
    pub fn new(upload_kbps: u32, download_kbps: u32) -> Self {
        Self {
            upload_kbps,
            download_kbps,
        }
    }

    /// Applies a percentage multiplier to both legs (100 = identity).
    /// Used by FUP tier application, time-of-day boosts and global
    /// bandwidth-rule multipliers alike.
    pub fn scaled(&self, percent: u32) -> Self {
        Self {
            upload_kbps: (self.upload_kbps as u64 * percent as u64 / 100) as u32,
            download_kbps: (self.download_kbps as u64 * percent as u64 / 100) as u32,
        }
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}k/{}k", self.upload_kbps, self.download_kbps)
    }
}

/// Parses a `"UPk/DLk"` string as stored in `radreply.value`. Returns `None`
/// for anything that does not round-trip through [`RateLimit::to_string`]'s
/// shape.
pub fn parse_rate_limit(value: &str) -> Option<RateLimit> {
    let (up, dl) = value.split_once('/')?;
    let upload_kbps = up.strip_suffix('k')?.parse().ok()?;
    let download_kbps = dl.strip_suffix('k')?.parse().ok()?;
    Some(RateLimit {
        upload_kbps,
        download_kbps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_in_upload_download_order() {
        let rl = RateLimit::new(2000, 5000);
        assert_eq!(rl.to_string(), "2000k/5000k");
    }

    #[test]
    fn parses_round_trip() {
        let rl = RateLimit::new(500, 500);
        assert_eq!(parse_rate_limit(&rl.to_string()), Some(rl));
    }

    #[test]
    fn rejects_malformed_values() {
        assert_eq!(parse_rate_limit("500k"), None);
        assert_eq!(parse_rate_limit("500/500"), None);
    }

    #[test]
    fn scales_both_legs() {
        let rl = RateLimit::new(1000, 2000).scaled(150);
        assert_eq!(rl, RateLimit::new(1500, 3000));
    }

    #[test]
    fn serializes_as_a_plain_json_object() {
        let rl = RateLimit::new(2000, 5000);
        let json = serde_json::to_value(rl).unwrap();
        assert_eq!(json["upload_kbps"], 2000);
        assert_eq!(json["download_kbps"], 5000);
    }
}
