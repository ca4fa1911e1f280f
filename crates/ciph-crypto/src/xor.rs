//! Byte-wise XOR of equal-length blocks

use ciph_core::{CiphError, CiphResult};

pub fn xor(a: &[u8], b: &[u8]) -> CiphResult<Vec<u8>> {
    let mut out = a.to_vec();
    xor_in_place(&mut out, b)?;
    Ok(out)
}

pub fn xor_in_place(dst: &mut [u8], src: &[u8]) -> CiphResult<()> {
    if dst.len() != src.len() {
        return Err(CiphError::LengthMismatch {
            left: dst.len(),
            right: src.len(),
        });
    }
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= s;
    }
    Ok(())
}
