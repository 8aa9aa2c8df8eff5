//! MD5 helpers for the NextPVR login handshake
//!
//! NextPVR authenticates a session with `md5(":" + md5(pin) + ":" + salt)`.
//! MD5 is kept for wire compatibility with the backend only.

use md5::{Digest, Md5};

/// Lowercase hexadecimal MD5 of the UTF-8 bytes of `input`
pub fn md5_hex(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Computes the `session.login` digest for a PIN and the salt returned by
/// `session.initiate`
///
/// # Example
///
/// ```
/// use pmonextpvr::api::signing::login_digest;
/// assert_eq!(login_digest("0000", "abc123"), "adfb8686a9902f9566fc5e9bced38da7");
/// ```
pub fn login_digest(pin: &str, salt: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(b":");
    hasher.update(md5_hex(pin).as_bytes());
    hasher.update(b":");
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_hex_known_values() {
        assert_eq!(md5_hex(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex("0000"), "4a7d1ed414474e4033ac29ccb8653d9b");
    }

    #[test]
    fn test_login_digest_matches_two_stage_composition() {
        let digest = login_digest("0000", "abc123");
        assert_eq!(digest, "adfb8686a9902f9566fc5e9bced38da7");
        assert_eq!(
            digest,
            md5_hex(&format!(":{}:{}", md5_hex("0000"), "abc123"))
        );
    }

    #[test]
    fn test_login_digest_is_deterministic_and_lowercase() {
        let a = login_digest("1234", "SALT");
        let b = login_digest("1234", "SALT");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_ne!(a, login_digest("1234", "salt"));
    }
}
