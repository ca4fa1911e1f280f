//! ciph-crypto: block-level cryptography for ciph containers
//!
//! ```text
//! password + salt ──PBKDF2-SHA256 (10 000)──▶ container key ──AES-256-CTR, IV = salt──▶ head block
//! random block key ──SHA-256[0..16]──▶ IV ──AES-256-CTR──▶ data block
//! ciphertext ⊕ cover block ──▶ published block, ID = SHA-256[0..16]
//! ```
//!
//! CTR carries no tag. Integrity comes from the digests stored in the head
//! (one over the head itself, one per file).

pub mod cipher;
pub mod digest;
pub mod kdf;
pub mod keys;
pub mod xor;

pub use cipher::{decrypt, encrypt, encrypt_padded};
pub use digest::{block_id, sha256, sha256_parts, short_digest};
pub use kdf::{derive_key, ContainerKey, PBKDF2_ITERATIONS};
pub use keys::{
    derive_block_iv, generate_block_key, new_chat_key, new_random_secret, new_salt, BlockKey,
};
pub use xor::{xor, xor_in_place};

/// Size of every symmetric key in bytes (AES-256)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-CTR initial counter block
pub const IV_SIZE: usize = 16;

/// Size of the per-container salt
pub const SALT_SIZE: usize = 16;
