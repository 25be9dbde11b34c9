//! Transaction signing.
//!
//! The ledger's own signature scheme lives behind [`TransactionSigner`].
//! [`SeedSigner`] is the bundled implementation: an ed25519 key derived from
//! `SHA-256(seed)`.

use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use sha2::{Digest, Sha256};

use crate::config::is_valid_seed;
use crate::error::SignError;

pub const SIGNATURE_BYTES: usize = 64;

#[async_trait]
pub trait TransactionSigner: Send + Sync {
    fn public_key(&self) -> [u8; 32];

    async fn sign(&self, message: &[u8]) -> Result<[u8; SIGNATURE_BYTES], SignError>;
}

pub struct SeedSigner {
    signing_key: SigningKey,
}

impl SeedSigner {
    /// Derive the key from a 55-letter lowercase seed.
    pub fn from_seed(seed: &str) -> Result<Self, SignError> {
        if !is_valid_seed(seed) {
            return Err(SignError::InvalidSeed(
                "expected 55 lowercase letters".to_string(),
            ));
        }
        let secret: [u8; 32] = Sha256::digest(seed.as_bytes()).into();
        Ok(SeedSigner {
            signing_key: SigningKey::from_bytes(&secret),
        })
    }
}

impl std::fmt::Debug for SeedSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedSigner")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TransactionSigner for SeedSigner {
    fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    async fn sign(&self, message: &[u8]) -> Result<[u8; SIGNATURE_BYTES], SignError> {
        Ok(self.signing_key.sign(message).to_bytes())
    }
}
