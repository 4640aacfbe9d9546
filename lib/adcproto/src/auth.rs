use crate::base32;
use crate::cid::Cid;
use rand::Rng;
use tiger::{Digest, Tiger};

/// Size of the password challenge salt: 192 random bits.
pub const SALT_SIZE: usize = 24;

/// Fresh random salt for one challenge.
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    rand::thread_rng().fill(&mut salt[..]);
    salt
}

/// The response a peer must produce: `Tiger(cid || password || salt)` in
/// base32.
pub fn client_response(cid: &Cid, password: &str, salt: &[u8]) -> String {
    let mut hasher = Tiger::new();
    hasher.update(&cid.to_bytes());
    hasher.update(password.as_bytes());
    hasher.update(salt);
    base32::encode(hasher.finalize().as_slice())
}

/// The response a federated hub must produce: `Tiger(password || salt)` in
/// base32. Hubs are named by their hub sid, not a cid.
pub fn hub_response(password: &str, salt: &[u8]) -> String {
    let mut hasher = Tiger::new();
    hasher.update(password.as_bytes());
    hasher.update(salt);
    base32::encode(hasher.finalize().as_slice())
}

#[inline]
pub fn verify_client(cid: &Cid, password: &str, salt: &[u8], response: &str) -> bool {
    client_response(cid, password, salt) == response
}

#[inline]
pub fn verify_hub(password: &str, salt: &[u8], response: &str) -> bool {
    hub_response(password, salt) == response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid() -> Cid {
        Cid::parse("SQTJZVH5VDZC4").unwrap()
    }

    #[test]
    fn test_salt_size_and_variability() {
        let first = generate_salt();
        let second = generate_salt();

        assert_eq!(first.len(), SALT_SIZE);
        // 192 random bits colliding would be a broken generator.
        assert_ne!(first[..], second[..]);
    }

    #[test]
    fn test_client_challenge_roundtrip() {
        let salt = [7u8; SALT_SIZE];
        let response = client_response(&cid(), "secret", &salt);

        // 192 hash bits render as 39 base32 characters.
        assert_eq!(response.len(), 39);
        assert!(verify_client(&cid(), "secret", &salt, &response));
        assert!(!verify_client(&cid(), "wrong", &salt, &response));
    }

    #[test]
    fn test_response_depends_on_every_input() {
        let salt = [7u8; SALT_SIZE];
        let other_salt = [8u8; SALT_SIZE];
        let other_cid = Cid::parse("AAAAAAAAAAAAA").unwrap();

        let base = client_response(&cid(), "secret", &salt);

        assert_ne!(base, client_response(&cid(), "secret", &other_salt));
        assert_ne!(base, client_response(&cid(), "secre", &salt));
        assert_ne!(base, client_response(&other_cid, "secret", &salt));
    }

    #[test]
    fn test_hub_challenge_roundtrip() {
        let salt = [9u8; SALT_SIZE];
        let response = hub_response("linkpass", &salt);

        assert!(verify_hub("linkpass", &salt, &response));
        assert!(!verify_hub("linkpss", &salt, &response));
    }
}
