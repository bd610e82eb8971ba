//! Signing collaborator contract. The concrete algorithm lives outside
//! this crate; managers only sign and verify canonical bytes.
use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(&self, canonical_bytes: &[u8]) -> Result<Vec<u8>>;
    async fn verify(&self, canonical_bytes: &[u8], signature: &[u8]) -> Result<bool>;
}

/// Keyed-hash signer for local mode and tests: signature is
/// sha256(key || bytes). Not a real cryptographic signature scheme.
pub struct KeyedHashSigner {
    key: Vec<u8>,
}

impl KeyedHashSigner {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    fn digest(&self, bytes: &[u8]) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(&self.key);
        hasher.update(bytes);
        hasher.finalize().to_vec()
    }
}

#[async_trait]
impl Signer for KeyedHashSigner {
    async fn sign(&self, canonical_bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(self.digest(canonical_bytes))
    }

    async fn verify(&self, canonical_bytes: &[u8], signature: &[u8]) -> Result<bool> {
        Ok(self.digest(canonical_bytes) == signature)
    }
}
