//! Minimal RFC 5176 CoA-Request / Disconnect-Request packet construction.
//!
//! Only the attributes the reconciler actually sends are implemented:
//! `User-Name`, `Acct-Session-Id`, and the MikroTik vendor-specific
//! `Mikrotik-Rate-Limit` attribute (vendor id 14988, vendor-type 2).

use md5::{Digest, Md5};

pub const CODE_DISCONNECT_REQUEST: u8 = 40;
pub const CODE_DISCONNECT_ACK: u8 = 41;
pub const CODE_DISCONNECT_NAK: u8 = 42;
pub const CODE_COA_REQUEST: u8 = 43;
pub const CODE_COA_ACK: u8 = 44;
pub const CODE_COA_NAK: u8 = 45;

const ATTR_USER_NAME: u8 = 1;
const ATTR_ACCT_SESSION_ID: u8 = 44;
const ATTR_VENDOR_SPECIFIC: u8 = 26;
const MIKROTIK_VENDOR_ID: u32 = 14988;
const MIKROTIK_RATE_LIMIT_VENDOR_TYPE: u8 = 2;

fn encode_attr(attr_type: u8, value: &[u8]) -> Vec<u8> {
    let mut out = vec![attr_type, (value.len() + 2) as u8];
    out.extend_from_slice(value);
    out
}

fn encode_vendor_attr(vendor_id: u32, vendor_type: u8, value: &[u8]) -> Vec<u8> {
    let mut vsa = vendor_id.to_be_bytes().to_vec();
    vsa.push(vendor_type);
    vsa.push((value.len() + 2) as u8);
    vsa.extend_from_slice(value);
    encode_attr(ATTR_VENDOR_SPECIFIC, &vsa)
}

/// Builds the attribute block shared by CoA-Request (rate-limit change)
/// and Disconnect-Request (session carries no rate-limit attribute).
pub fn build_attributes(username: &str, session_id: &str, rate_limit: Option<&str>) -> Vec<u8> {
    let mut attrs = Vec::new();
    attrs.extend(encode_attr(ATTR_USER_NAME, username.as_bytes()));
    attrs.extend(encode_attr(ATTR_ACCT_SESSION_ID, session_id.as_bytes()));
    if let Some(rate_limit) = rate_limit {
        attrs.extend(encode_vendor_attr(
            MIKROTIK_VENDOR_ID,
            MIKROTIK_RATE_LIMIT_VENDOR_TYPE,
            rate_limit.as_bytes(),
        ));
    }
    attrs
}

/// Builds a complete request packet with its request authenticator:
/// `MD5(code || identifier || length || 16 zero octets || attributes || secret)`.
pub fn build_request(code: u8, identifier: u8, attributes: &[u8], secret: &str) -> Vec<u8> {
    let length = (20 + attributes.len()) as u16;

    let mut hasher = Md5::new();
    hasher.update([code, identifier]);
    hasher.update(length.to_be_bytes());
    hasher.update([0u8; 16]);
    hasher.update(attributes);
    hasher.update(secret.as_bytes());
    let authenticator = hasher.finalize();

    let mut packet = Vec::with_capacity(length as usize);
    packet.push(code);
    packet.push(identifier);
    packet.extend_from_slice(&length.to_be_bytes());
    packet.extend_from_slice(&authenticator);
    packet.extend_from_slice(attributes);
    packet
}

/// Validates a reply's response authenticator:
/// `MD5(code || identifier || length || request_authenticator || attributes || secret)`.
pub fn verify_reply(reply: &[u8], request_authenticator: &[u8; 16], secret: &str) -> bool {
    if reply.len() < 20 {
        return false;
    }
    let code = reply[0];
    let identifier = reply[1];
    let length = &reply[2..4];
    let received_authenticator = &reply[4..20];
    let attributes = &reply[20..];

    let mut hasher = Md5::new();
    hasher.update([code, identifier]);
    hasher.update(length);
    hasher.update(request_authenticator);
    hasher.update(attributes);
    hasher.update(secret.as_bytes());
    let expected = hasher.finalize();

    expected.as_slice() == received_authenticator
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_packet_has_correct_length_prefix() {
        let attrs = build_attributes("alice", "sess-1", Some("2000k/2000k"));
        let packet = build_request(CODE_COA_REQUEST, 7, &attrs, "secret");
        let declared_len = u16::from_be_bytes([packet[2], packet[3]]) as usize;
        assert_eq!(declared_len, packet.len());
        assert_eq!(packet[0], CODE_COA_REQUEST);
        assert_eq!(packet[1], 7);
    }

    #[test]
    fn disconnect_packet_omits_rate_limit_attribute() {
        let attrs = build_attributes("alice", "sess-1", None);
        // User-Name(5+2) + Acct-Session-Id(6+2) = 15, no vendor-specific attribute.
        assert_eq!(attrs.len(), 15);
    }

    #[test]
    fn reply_authenticator_round_trips() {
        let attrs = build_attributes("alice", "sess-1", Some("500k/500k"));
        let request = build_request(CODE_COA_REQUEST, 1, &attrs, "secret");
        let mut request_authenticator = [0u8; 16];
        request_authenticator.copy_from_slice(&request[4..20]);

        let reply_attrs: Vec<u8> = Vec::new();
        let reply_length = (20 + reply_attrs.len()) as u16;
        let mut hasher = Md5::new();
        hasher.update([CODE_COA_ACK, 1]);
        hasher.update(reply_length.to_be_bytes());
        hasher.update(request_authenticator);
        hasher.update(&reply_attrs);
        hasher.update(b"secret");
        let authenticator = hasher.finalize();

        let mut reply = vec![CODE_COA_ACK, 1];
        reply.extend_from_slice(&reply_length.to_be_bytes());
        reply.extend_from_slice(&authenticator);

        assert!(verify_reply(&reply, &request_authenticator, "secret"));
        assert!(!verify_reply(&reply, &request_authenticator, "wrong-secret"));
    }
}
