//! OpenSSL `EVP_BytesToKey`-compatible key derivation.
//!
//! Grounded on `examples/original_source/protocol/ss/ss.go`'s `CreateKey`:
//! a salt-less, single-iteration, repeated-MD5 chain. This is the one piece
//! of this codebase that must NOT be modernized — Shadowsocks
//! interoperability depends on reproducing this exact, weak construction.

use md5::{Digest, Md5};

/// Derives `key_size` bytes of key material from `password`.
///
/// `block_0` is empty; `block_i = MD5(block_{i-1} || password)`. The blocks
/// are concatenated and truncated to `key_size` bytes. Deterministic and
/// prefix-stable: `create_key(pw, n)` is a prefix of `create_key(pw, m)` for
/// any `n <= m`.
pub fn create_key(password: &[u8], key_size: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(key_size + Md5::output_size());
    let mut prev: Vec<u8> = Vec::new();
    while key.len() < key_size {
        let mut hasher = Md5::new();
        hasher.update(&prev);
        hasher.update(password);
        let digest = hasher.finalize();
        prev = digest.to_vec();
        key.extend_from_slice(&prev);
    }
    key.truncate(key_size);
    key
}
