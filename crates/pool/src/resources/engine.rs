//! Pooled AES-GCM encryption engine.

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::{Latency, simulate};
use crate::error::{Error, Result};
use crate::kind::{EngineSpec, ResourceKind};
use crate::pool::Identify;
use crate::resource::PooledResource;

/// Length of the random nonce prefixed to every ciphertext.
const NONCE_LEN: usize = 12;

/// Supported AES key sizes in bits.
const KEY_SIZES: [u32; 2] = [128, 256];

/// An encryption engine for one algorithm and key size.
///
/// Keys are derived from a passphrase with SHA-256 (truncated for 128-bit
/// keys). Ciphertexts are base64 of `nonce || AES-GCM(plaintext)`.
#[derive(Debug)]
pub struct EncryptionEngine {
    id: Uuid,
    kind: ResourceKind,
    spec: EngineSpec,
    active: bool,
    latency: Latency,
    operations: u64,
}

impl EncryptionEngine {
    /// Cipher family (`AES`).
    #[must_use]
    pub fn algorithm(&self) -> &str {
        &self.spec.algorithm
    }

    /// Key size in bits.
    #[must_use]
    pub fn key_size(&self) -> u32 {
        self.spec.key_size
    }

    /// The spec this engine was built from.
    #[must_use]
    pub fn spec(&self) -> &EngineSpec {
        &self.spec
    }

    /// Encrypt, decrypt and key-generation calls served so far.
    #[must_use]
    pub fn operation_count(&self) -> u64 {
        self.operations
    }

    /// Encrypt `plaintext` with a key derived from `passphrase`.
    pub async fn encrypt(&mut self, plaintext: &str, passphrase: &str) -> Result<String> {
        self.begin().await?;
        let key = derive_key(passphrase);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = match self.spec.key_size {
            128 => Aes128Gcm::new_from_slice(&key[..16])
                .map_err(|e| self.crypto(e))?
                .encrypt(&nonce, plaintext.as_bytes()),
            _ => Aes256Gcm::new_from_slice(&key)
                .map_err(|e| self.crypto(e))?
                .encrypt(&nonce, plaintext.as_bytes()),
        }
        .map_err(|e| self.crypto(e))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(STANDARD.encode(out))
    }

    /// Decrypt a value produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    /// Returns [`Error::Crypto`] for malformed input or a wrong passphrase.
    pub async fn decrypt(&mut self, ciphertext: &str, passphrase: &str) -> Result<String> {
        self.begin().await?;
        let raw = STANDARD.decode(ciphertext).map_err(|e| self.crypto(e))?;
        if raw.len() < NONCE_LEN {
            return Err(self.crypto("ciphertext shorter than nonce"));
        }
        let (nonce, sealed) = raw.split_at(NONCE_LEN);
        let nonce = GenericArray::from_slice(nonce);
        let key = derive_key(passphrase);
        let opened = match self.spec.key_size {
            128 => Aes128Gcm::new_from_slice(&key[..16])
                .map_err(|e| self.crypto(e))?
                .decrypt(nonce, sealed),
            _ => Aes256Gcm::new_from_slice(&key)
                .map_err(|e| self.crypto(e))?
                .decrypt(nonce, sealed),
        }
        .map_err(|_| self.crypto("authentication failed"))?;

        String::from_utf8(opened).map_err(|e| self.crypto(e))
    }

    /// Generate a random key of this engine's size, base64 encoded.
    pub async fn generate_key(&mut self) -> Result<String> {
        self.begin().await?;
        let key = match self.spec.key_size {
            128 => Aes128Gcm::generate_key(OsRng).to_vec(),
            _ => Aes256Gcm::generate_key(OsRng).to_vec(),
        };
        Ok(STANDARD.encode(key))
    }

    async fn begin(&mut self) -> Result<()> {
        if !self.active {
            return Err(Error::not_active(self.id));
        }
        simulate(self.latency.transfer()).await;
        self.operations += 1;
        Ok(())
    }

    fn crypto(&self, reason: impl std::fmt::Display) -> Error {
        Error::Crypto {
            resource_id: self.id.to_string(),
            reason: reason.to_string(),
        }
    }
}

fn derive_key(passphrase: &str) -> [u8; 32] {
    Sha256::digest(passphrase.as_bytes()).into()
}

impl Identify for EncryptionEngine {
    type Id = Uuid;

    fn id(&self) -> Uuid {
        self.id
    }
}

#[async_trait]
impl PooledResource for EncryptionEngine {
    type Spec = EngineSpec;

    fn kind_of(spec: &EngineSpec) -> ResourceKind {
        ResourceKind::Engine(spec.clone())
    }

    fn validate(spec: &EngineSpec) -> Result<()> {
        if spec.algorithm != "AES" {
            return Err(Error::configuration(format!(
                "unsupported algorithm '{}' (only AES is available)",
                spec.algorithm
            )));
        }
        if !KEY_SIZES.contains(&spec.key_size) {
            return Err(Error::configuration(format!(
                "unsupported AES key size {} (expected one of {KEY_SIZES:?})",
                spec.key_size
            )));
        }
        Ok(())
    }

    async fn create(spec: EngineSpec, latency: Latency) -> Result<Self> {
        Self::validate(&spec)?;
        let id = Uuid::new_v4();
        tracing::debug!(resource_id = %id, kind = %spec, "Initializing encryption engine");
        simulate(latency.construct()).await;
        Ok(Self {
            id,
            kind: ResourceKind::Engine(spec.clone()),
            spec,
            active: false,
            latency,
            operations: 0,
        })
    }

    fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    fn is_active(&self) -> bool {
        self.active
    }

    async fn open(&mut self) -> Result<()> {
        if !self.active {
            simulate(self.latency.open()).await;
            self.active = true;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.active {
            simulate(self.latency.close()).await;
            self.active = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    async fn engine(key_size: u32) -> EncryptionEngine {
        let mut engine = EncryptionEngine::create(EngineSpec::new("aes", key_size), Latency::NONE)
            .await
            .unwrap();
        engine.open().await.unwrap();
        engine
    }

    #[rstest]
    #[case(128)]
    #[case(256)]
    #[tokio::test]
    async fn encrypt_then_decrypt_recovers_plaintext(#[case] key_size: u32) {
        let mut engine = engine(key_size).await;
        let sealed = engine.encrypt("hunter2", "master passphrase").await.unwrap();
        assert_ne!(sealed, "hunter2");
        let opened = engine.decrypt(&sealed, "master passphrase").await.unwrap();
        assert_eq!(opened, "hunter2");
        assert_eq!(engine.operation_count(), 2);
    }

    #[tokio::test]
    async fn same_plaintext_encrypts_differently() {
        let mut engine = engine(256).await;
        let a = engine.encrypt("same", "key").await.unwrap();
        let b = engine.encrypt("same", "key").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn wrong_passphrase_fails_authentication() {
        let mut engine = engine(256).await;
        let sealed = engine.encrypt("secret", "right").await.unwrap();
        let err = engine.decrypt(&sealed, "wrong").await.unwrap_err();
        assert!(matches!(err, Error::Crypto { .. }));
    }

    #[tokio::test]
    async fn truncated_ciphertext_is_rejected() {
        let mut engine = engine(128).await;
        let err = engine.decrypt("AAAA", "key").await.unwrap_err();
        assert!(matches!(err, Error::Crypto { .. }));
    }

    #[rstest]
    #[case(128, 16)]
    #[case(256, 32)]
    #[tokio::test]
    async fn generated_keys_match_key_size(#[case] key_size: u32, #[case] bytes: usize) {
        let mut engine = engine(key_size).await;
        let key = STANDARD.decode(engine.generate_key().await.unwrap()).unwrap();
        assert_eq!(key.len(), bytes);
    }

    #[tokio::test]
    async fn inactive_engine_refuses_work() {
        let mut engine = engine(256).await;
        engine.close().await.unwrap();
        assert!(matches!(
            engine.encrypt("x", "k").await,
            Err(Error::NotActive { .. })
        ));
        assert_eq!(engine.operation_count(), 0);
    }

    #[rstest]
    #[case(EngineSpec::new("DES", 56))]
    #[case(EngineSpec::new("AES", 192))]
    fn unsupported_specs_are_rejected(#[case] spec: EngineSpec) {
        assert!(matches!(
            EncryptionEngine::validate(&spec),
            Err(Error::Configuration { .. })
        ));
    }
}
