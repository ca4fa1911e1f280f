//! AES-256-CTR block encryption with random tail padding
//!
//! CTR is a stream cipher: ciphertext length equals plaintext length. Payloads
//! shorter than their block size get random tail bytes appended before
//! encryption so the on-wire block is always exactly a table size.

use aes::Aes256;
use ciph_core::{BlockSize, CiphError, CiphResult};
use ctr::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;

use crate::{IV_SIZE, KEY_SIZE};

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// XOR the AES-256-CTR keystream into `buf`. Encrypts and decrypts.
pub fn apply_keystream(key: &[u8; KEY_SIZE], iv: &[u8; IV_SIZE], buf: &mut [u8]) {
    let mut cipher = Aes256Ctr::new(key.into(), iv.into());
    cipher.apply_keystream(buf);
}

pub fn encrypt(plaintext: &[u8], key: &[u8; KEY_SIZE], iv: &[u8; IV_SIZE]) -> Vec<u8> {
    let mut buf = plaintext.to_vec();
    apply_keystream(key, iv, &mut buf);
    buf
}

pub fn decrypt(ciphertext: &[u8], key: &[u8; KEY_SIZE], iv: &[u8; IV_SIZE]) -> Vec<u8> {
    let mut buf = ciphertext.to_vec();
    apply_keystream(key, iv, &mut buf);
    buf
}

/// Append `len` cryptographically random bytes to `buf`.
pub fn append_random_padding(buf: &mut Vec<u8>, len: usize) {
    let start = buf.len();
    buf.resize(start + len, 0);
    rand::thread_rng().fill_bytes(&mut buf[start..]);
}

/// Pad `plaintext` with random bytes to exactly `size` and encrypt the whole
/// block.
pub fn encrypt_padded(
    plaintext: &[u8],
    key: &[u8; KEY_SIZE],
    iv: &[u8; IV_SIZE],
    size: BlockSize,
) -> CiphResult<Vec<u8>> {
    let block_len = size.byte_len();
    if plaintext.len() > block_len {
        return Err(CiphError::Oversize(plaintext.len() as u64));
    }

    let mut buf = Vec::with_capacity(block_len);
    buf.extend_from_slice(plaintext);
    append_random_padding(&mut buf, block_len - plaintext.len());
    apply_keystream(key, iv, &mut buf);
    Ok(buf)
}
