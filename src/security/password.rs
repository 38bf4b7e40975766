//! Salted, memory-hard password hashing.
//!
//! Credentials are stored as two unpadded base64 strings: the Argon2id output
//! and the random salt it was derived with. Parameters are fixed per process,
//! so verification re-derives with the same cost settings.

use argon2::password_hash::rand_core::{OsRng, RngCore};
use argon2::password_hash::Output;
use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use thiserror::Error;

/// Argon2 memory cost in KiB (64 MiB).
pub const MEMORY_KIB: u32 = 64 * 1024;
/// Argon2 passes over memory.
pub const ITERATIONS: u32 = 1;
/// Argon2 lanes.
pub const LANES: u32 = 4;
/// Derived key length in bytes.
pub const OUTPUT_LEN: usize = 32;
/// Salt length of the [`placeholder`](CredentialHasher::placeholder) credential.
pub const PLACEHOLDER_SALT_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CredentialError {
    /// The operating system could not supply random bytes.
    #[error("entropy source failure: {0}")]
    Entropy(String),

    /// Argon2 rejected the parameters or inputs (e.g. salt too short).
    #[error("key derivation failed: {0}")]
    Kdf(String),
}

/// Stored form of a credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCredential {
    pub hash: String,
    pub salt: String,
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub lanes: u32,
    pub output_len: usize,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            memory_kib: MEMORY_KIB,
            iterations: ITERATIONS,
            lanes: LANES,
            output_len: OUTPUT_LEN,
        }
    }
}

/// Derives and verifies password hashes.
#[derive(Debug, Clone)]
pub struct CredentialHasher {
    params: HashParams,
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self::new(HashParams::default())
    }
}

impl CredentialHasher {
    pub fn new(params: HashParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> HashParams {
        self.params
    }

    /// Hash `password` with a fresh `salt_size`-byte salt.
    pub fn hash(
        &self,
        password: &str,
        salt_size: usize,
    ) -> Result<EncodedCredential, CredentialError> {
        let mut salt = vec![0u8; salt_size];
        OsRng
            .try_fill_bytes(&mut salt)
            .map_err(|e| CredentialError::Entropy(e.to_string()))?;

        let hash = self.derive(password, &salt)?;

        Ok(EncodedCredential {
            hash: STANDARD_NO_PAD.encode(hash),
            salt: STANDARD_NO_PAD.encode(&salt),
        })
    }

    /// A well-formed credential no password matches.
    ///
    /// Verifying against it costs one full derivation, the same as a real
    /// credential.
    pub fn placeholder(&self) -> EncodedCredential {
        EncodedCredential {
            hash: STANDARD_NO_PAD.encode(vec![0u8; self.params.output_len]),
            salt: STANDARD_NO_PAD.encode([0u8; PLACEHOLDER_SALT_LEN]),
        }
    }

    /// Check `password` against a stored credential.
    ///
    /// Malformed stored values verify as `false` so a corrupted record is
    /// indistinguishable from a wrong password.
    pub fn verify(&self, password: &str, encoded_hash: &str, encoded_salt: &str) -> bool {
        let Ok(salt) = STANDARD_NO_PAD.decode(encoded_salt) else {
            return false;
        };
        let Ok(stored) = STANDARD_NO_PAD.decode(encoded_hash) else {
            return false;
        };
        let Ok(derived) = self.derive(password, &salt) else {
            return false;
        };

        // `Output` equality is constant-time over the full value.
        match (Output::new(&stored), Output::new(&derived)) {
            (Ok(stored), Ok(derived)) => stored == derived,
            _ => false,
        }
    }

    fn derive(&self, password: &str, salt: &[u8]) -> Result<Vec<u8>, CredentialError> {
        let params = Params::new(
            self.params.memory_kib,
            self.params.iterations,
            self.params.lanes,
            Some(self.params.output_len),
        )
        .map_err(|e| CredentialError::Kdf(e.to_string()))?;

        let mut out = vec![0u8; self.params.output_len];
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password_into(password.as_bytes(), salt, &mut out)
            .map_err(|e| CredentialError::Kdf(e.to_string()))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> CredentialHasher {
        CredentialHasher::new(HashParams {
            memory_kib: 1024,
            iterations: 1,
            lanes: 1,
            output_len: OUTPUT_LEN,
        })
    }

    #[test]
    fn test_hash_then_verify() {
        let hasher = cheap();
        let cred = hasher.hash("correct horse", 16).unwrap();

        assert!(hasher.verify("correct horse", &cred.hash, &cred.salt));
        assert!(!hasher.verify("correct horsf", &cred.hash, &cred.salt));
        assert!(!hasher.verify("", &cred.hash, &cred.salt));
    }

    #[test]
    fn test_default_parameters_round_trip() {
        let hasher = CredentialHasher::default();
        let cred = hasher.hash("testpassword", 16).unwrap();
        assert!(hasher.verify("testpassword", &cred.hash, &cred.salt));
        assert!(!hasher.verify("testpassworD", &cred.hash, &cred.salt));
    }

    #[test]
    fn test_salt_is_fresh() {
        let hasher = cheap();
        let a = hasher.hash("same", 16).unwrap();
        let b = hasher.hash("same", 16).unwrap();

        assert_ne!(a.salt, b.salt);
        assert_ne!(a.hash, b.hash);
        // Each still verifies against its own salt only.
        assert!(hasher.verify("same", &a.hash, &a.salt));
        assert!(!hasher.verify("same", &a.hash, &b.salt));
    }

    #[test]
    fn test_encoding_is_unpadded_base64() {
        let cred = cheap().hash("pw", 16).unwrap();
        assert!(!cred.hash.contains('='));
        assert!(!cred.salt.contains('='));
        assert_eq!(STANDARD_NO_PAD.decode(&cred.hash).unwrap().len(), OUTPUT_LEN);
        assert_eq!(STANDARD_NO_PAD.decode(&cred.salt).unwrap().len(), 16);
    }

    #[test]
    fn test_comparison_covers_every_byte() {
        let hasher = cheap();
        let cred = hasher.hash("pw", 16).unwrap();
        let raw = STANDARD_NO_PAD.decode(&cred.hash).unwrap();

        for idx in [0, raw.len() / 2, raw.len() - 1] {
            let mut tampered = raw.clone();
            tampered[idx] ^= 0x01;
            let tampered = STANDARD_NO_PAD.encode(tampered);
            assert!(!hasher.verify("pw", &tampered, &cred.salt), "byte {} ignored", idx);
        }

        // A prefix of the right hash is not a match either.
        let prefix = STANDARD_NO_PAD.encode(&raw[..16]);
        assert!(!hasher.verify("pw", &prefix, &cred.salt));
    }

    #[test]
    fn test_malformed_encodings_are_false() {
        let hasher = cheap();
        let cred = hasher.hash("pw", 16).unwrap();

        assert!(!hasher.verify("pw", "not base64!!", &cred.salt));
        assert!(!hasher.verify("pw", &cred.hash, "%%%"));
        assert!(!hasher.verify("pw", "", ""));
        // Salt too short for Argon2 is still just `false`.
        assert!(!hasher.verify("pw", &cred.hash, &STANDARD_NO_PAD.encode([1u8; 4])));
    }

    #[test]
    fn test_short_salt_is_an_error() {
        let err = cheap().hash("pw", 4).unwrap_err();
        assert!(matches!(err, CredentialError::Kdf(_)));
    }

    #[test]
    fn test_placeholder_costs_a_derivation() {
        let hasher = cheap();
        let placeholder = hasher.placeholder();
        let salt = STANDARD_NO_PAD.decode(&placeholder.salt).unwrap();
        let hash = STANDARD_NO_PAD.decode(&placeholder.hash).unwrap();

        assert_eq!(salt.len(), PLACEHOLDER_SALT_LEN);
        assert_eq!(hash.len(), OUTPUT_LEN);
        // The salt is accepted, so verification runs Argon2 rather than bailing early.
        assert!(hasher.derive("whatever", &salt).is_ok());
        assert!(!hasher.verify("whatever", &placeholder.hash, &placeholder.salt));
        assert!(!hasher.verify("", &placeholder.hash, &placeholder.salt));
    }

    #[test]
    fn test_kdf_is_memory_hard() {
        let params = HashParams::default();
        assert_eq!(params.memory_kib, 65536);
        assert_eq!(params.iterations, 1);
        assert_eq!(params.lanes, 4);
        assert_eq!(params.output_len, 32);
        assert_eq!(CredentialHasher::default().params(), params);
    }
}
