//! Key derivation: password + salt → container key (PBKDF2-HMAC-SHA256)

use ciph_core::{CiphError, CiphResult};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::KEY_SIZE;

/// Fixed protocol constant. Every reader must re-derive the same key.
pub const PBKDF2_ITERATIONS: u32 = 10_000;

/// A 256-bit container key derived from the container password.
///
/// Encrypts the head block and feeds the private container ID.
/// Zeroized on drop.
#[derive(Clone)]
pub struct ContainerKey {
    bytes: [u8; KEY_SIZE],
}

impl ContainerKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for ContainerKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for ContainerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive the container key from a password and the container salt.
///
/// An empty password is rejected before any derivation work is done.
pub fn derive_key(password: &SecretString, salt: &[u8]) -> CiphResult<ContainerKey> {
    let secret = password.expose_secret().as_bytes();
    if secret.is_empty() {
        return Err(CiphError::MissingKey);
    }

    let mut key = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(secret, salt, PBKDF2_ITERATIONS, &mut key);
    Ok(ContainerKey::from_bytes(key))
}
