//! Random secrets, salts, chat keys and per-block keys

use rand::RngCore;
use secrecy::SecretString;
use zeroize::Zeroize;

use crate::digest::sha256;
use crate::{IV_SIZE, KEY_SIZE, SALT_SIZE};

/// SHA-256 of 64 fresh random bytes.
fn random_digest() -> [u8; 32] {
    let mut seed = [0u8; 64];
    rand::thread_rng().fill_bytes(&mut seed);
    let digest = sha256(&seed);
    seed.zeroize();
    digest
}

/// Default container password: 64 lowercase hex chars.
pub fn new_random_secret() -> SecretString {
    SecretString::from(hex::encode(random_digest()))
}

pub fn new_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    salt.copy_from_slice(&random_digest()[..SALT_SIZE]);
    salt
}

/// Per-container key handed to chat/comment services. Not secret to readers.
pub fn new_chat_key() -> [u8; KEY_SIZE] {
    random_digest()
}

/// A per-block 256-bit key, stored in the head next to the block reference.
/// Zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct BlockKey {
    bytes: [u8; KEY_SIZE],
}

impl BlockKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    pub fn iv(&self) -> [u8; IV_SIZE] {
        derive_block_iv(&self.bytes)
    }
}

impl Drop for BlockKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for BlockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

pub fn generate_block_key() -> BlockKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    BlockKey::from_bytes(bytes)
}

/// IV for a data block: the first 16 bytes of SHA-256 of its key.
pub fn derive_block_iv(key: &[u8; KEY_SIZE]) -> [u8; IV_SIZE] {
    let mut iv = [0u8; IV_SIZE];
    iv.copy_from_slice(&sha256(key)[..IV_SIZE]);
    iv
}
