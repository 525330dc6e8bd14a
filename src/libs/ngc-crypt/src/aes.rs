//! AES-128 operations
//!
//! Single-block encryption and CTR mode with a 128-bit big-endian counter,
//! on top of the `aes` crate.

use ::aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use ::aes::Aes128;

/// AES block size in bytes
pub const AES_BLOCK_SIZE: usize = 16;

/// Encrypt one block under a 128-bit key
pub fn encrypt_block(key: &[u8; 16], input: &[u8; 16]) -> [u8; 16] {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut block = GenericArray::clone_from_slice(input);
    cipher.encrypt_block(&mut block);
    let mut out = [0u8; 16];
    out.copy_from_slice(&block);
    out
}

fn ctr128_inc(counter: &mut [u8; 16]) {
    for byte in counter.iter_mut().rev() {
        *byte = byte.wrapping_add(1);
        if *byte != 0 {
            break;
        }
    }
}

/// AES-CTR128 keystream applied in place; encryption and decryption are
/// the same operation.
pub fn ctr128_apply(key: &[u8; 16], iv: &[u8; 16], data: &mut [u8]) {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut counter = *iv;
    for chunk in data.chunks_mut(AES_BLOCK_SIZE) {
        let mut keystream = GenericArray::clone_from_slice(&counter);
        cipher.encrypt_block(&mut keystream);
        for (b, k) in chunk.iter_mut().zip(keystream.iter()) {
            *b ^= k;
        }
        ctr128_inc(&mut counter);
    }
}
