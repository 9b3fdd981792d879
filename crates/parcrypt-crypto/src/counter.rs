//! Counter arithmetic for counter-style modes
//!
//! A chunk starting at byte `offset` of the payload must start its keystream
//! where sequential processing would be after `offset / block_size` blocks.
//! The IV is treated as one big-endian integer spanning its full width, the
//! same way `ctr::Ctr128BE` increments it.

use crate::error::CipherError;

/// IV for a chunk starting at `byte_offset`.
///
/// `byte_offset` must be a multiple of `block_size`. Overflow of the IV width
/// wraps silently.
pub fn derive_chunk_iv(
    base_iv: &[u8],
    block_size: usize,
    byte_offset: u64,
) -> Result<Vec<u8>, CipherError> {
    if block_size == 0 || byte_offset % block_size as u64 != 0 {
        return Err(CipherError::UnalignedOffset {
            offset: byte_offset,
            block_size,
        });
    }
    let mut iv = base_iv.to_vec();
    add_big_endian(&mut iv, byte_offset / block_size as u64);
    Ok(iv)
}

fn add_big_endian(bytes: &mut [u8], mut addend: u64) {
    let mut carry = 0u16;
    for byte in bytes.iter_mut().rev() {
        if addend == 0 && carry == 0 {
            break;
        }
        let sum = u16::from(*byte) + (addend & 0xff) as u16 + carry;
        *byte = sum as u8;
        carry = sum >> 8;
        addend >>= 8;
    }
}
