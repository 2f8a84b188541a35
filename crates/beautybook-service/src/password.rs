//! Password hashing for the HTTP edge. `CredentialStore` only ever compares
//! opaque digests (see its doc comment); this is the one place that turns a
//! plaintext password into one, using the same `sha2` crate the domain core
//! already depends on for webhook HMACs rather than pulling in a dedicated
//! password-hashing crate.

use sha2::{Digest, Sha256};

pub fn hash_password(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_input_hashes_identically() {
        assert_eq!(hash_password("correct horse"), hash_password("correct horse"));
    }

    #[test]
    fn different_input_hashes_differently() {
        assert_ne!(hash_password("a"), hash_password("b"));
    }
}
