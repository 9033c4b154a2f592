//! IPv4 CIDR membership check used by the bypass-CDN byte attribution
//! (§4.3.d). CDN subnets are plain CIDR strings here, unlike the
//! PCQ manager's coarse range→CIDR conversion.

use std::net::Ipv4Addr;

pub fn ip_in_cidr(ip: &str, cidr: &str) -> bool {
    let Ok(ip) = ip.parse::<Ipv4Addr>() else { return false };
    let Some((network, prefix)) = cidr.split_once('/') else {
        return cidr.parse::<Ipv4Addr>().map(|n| n == ip).unwrap_or(false);
    };
    let Ok(network) = network.parse::<Ipv4Addr>() else { return false };
    let Ok(prefix) = prefix.parse::<u32>() else { return false };
    if prefix > 32 {
        return false;
    }
    let mask = if prefix == 0 { 0 } else { !0u32 << (32 - prefix) };
    (u32::from(ip) & mask) == (u32::from(network) & mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_inside_the_block() {
        assert!(ip_in_cidr("10.0.0.42", "10.0.0.0/24"));
    }

    #[test]
    fn rejects_outside_the_block() {
        assert!(!ip_in_cidr("10.0.1.42", "10.0.0.0/24"));
    }

    #[test]
    fn slash_zero_matches_everything() {
        assert!(ip_in_cidr("8.8.8.8", "0.0.0.0/0"));
    }

    #[test]
    fn bare_address_is_host_match() {
        assert!(ip_in_cidr("8.8.8.8", "8.8.8.8"));
        assert!(!ip_in_cidr("8.8.8.9", "8.8.8.8"));
    }
}
