//! Plain and MD5-challenge login response computation (§4.1, §8).

use md5::{Digest, Md5};

use crate::error::RouterClientError;

/// Computes the `=response=` word value for a challenge-based login:
/// `"00" + hex(md5(0x00 || password || challenge_bytes))`.
pub fn md5_challenge_response(
    password: &str,
    challenge_hex: &str,
) -> Result<String, RouterClientError> {
    let challenge = hex::decode(challenge_hex)
        .map_err(|e| RouterClientError::Protocol(format!("invalid challenge hex: {e}")))?;

    let mut hasher = Md5::new();
    hasher.update([0u8]);
    hasher.update(password.as_bytes());
    hasher.update(&challenge);
    let digest = hasher.finalize();

    Ok(format!("00{}", hex::encode(digest)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_is_deterministic_for_a_fixed_vector() {
        let a = md5_challenge_response("admin", "a1b2c3d4e5f60718").unwrap();
        let b = md5_challenge_response("admin", "a1b2c3d4e5f60718").unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("00"));
        assert_eq!(a.len(), 2 + 32);
    }

    #[test]
    fn different_challenges_give_different_responses() {
        let a = md5_challenge_response("admin", "a1b2c3d4e5f60718").unwrap();
        let b = md5_challenge_response("admin", "0000000000000000").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_non_hex_challenge() {
        assert!(md5_challenge_response("admin", "not-hex").is_err());
    }
}
