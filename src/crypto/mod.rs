//! Cipher registry: method name -> {key size, IV size, stream cipher}.
//!
//! Grounded on the teacher's `crypto::CipherType`/`cipher.rs` method table
//! and `examples/original_source/cipher/cipher.go`'s `cipherInfos` map,
//! which is where the exact key/IV sizes below come from.

pub mod kdf;
pub mod stream;

use rand::RngCore;

use crate::error::{Error, Result};
use stream::{Direction, StreamCipher};

/// Static parameters for one cipher method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherSpec {
    pub name: &'static str,
    pub key_size: usize,
    pub iv_size: usize,
}

const CIPHER_TABLE: &[CipherSpec] = &[
    CipherSpec { name: "aes-128-cfb", key_size: 16, iv_size: 16 },
    CipherSpec { name: "aes-192-cfb", key_size: 24, iv_size: 16 },
    CipherSpec { name: "aes-256-cfb", key_size: 32, iv_size: 16 },
    CipherSpec { name: "rc4-md5", key_size: 16, iv_size: 16 },
    CipherSpec { name: "salsa20", key_size: 32, iv_size: 8 },
    CipherSpec { name: "chacha20", key_size: 32, iv_size: 8 },
    CipherSpec { name: "none", key_size: 0, iv_size: 0 },
    CipherSpec { name: "not", key_size: 0, iv_size: 0 },
];

/// Looks up a cipher method by name, failing fast if it's unknown.
///
/// Method lookup happens once, at session construction; an unrecognized
/// name is a configuration error, never a mid-session surprise.
pub fn lookup(method: &str) -> Result<CipherSpec> {
    let lower = method.to_ascii_lowercase();
    CIPHER_TABLE
        .iter()
        .copied()
        .find(|spec| spec.name == lower)
        .ok_or_else(|| Error::CipherUnknown(method.to_owned()))
}

/// Derives a key for `spec` from `password` using the Shadowsocks KDF.
pub fn derive_key(spec: CipherSpec, password: &str) -> Vec<u8> {
    kdf::create_key(password.as_bytes(), spec.key_size)
}

/// Draws a fresh random IV of `spec.iv_size` bytes.
pub fn random_iv(spec: CipherSpec) -> Vec<u8> {
    let mut iv = vec![0u8; spec.iv_size];
    rand::thread_rng().fill_bytes(&mut iv);
    iv
}

/// Builds the encrypting half of `spec`'s stream cipher.
pub fn new_encrypter(spec: CipherSpec, key: &[u8], iv: &[u8]) -> Result<Box<dyn StreamCipher>> {
    stream::build(spec.name, key, iv, Direction::Encrypt)
}

/// Builds the decrypting half of `spec`'s stream cipher.
///
/// Most supported methods are symmetric stream XORs, but AES-CFB's decrypt
/// keystream differs from its encrypt keystream, so direction is threaded
/// through rather than assuming `new_encrypter` works for both.
pub fn new_decrypter(spec: CipherSpec, key: &[u8], iv: &[u8]) -> Result<Box<dyn StreamCipher>> {
    stream::build(spec.name, key, iv, Direction::Decrypt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(lookup("AES-256-CFB").unwrap().key_size, 32);
    }

    #[test]
    fn lookup_rejects_unknown_method() {
        assert!(lookup("aes-999-gcm").is_err());
    }

    #[test]
    fn every_table_entry_round_trips_through_lookup() {
        for spec in CIPHER_TABLE {
            assert_eq!(lookup(spec.name).unwrap(), *spec);
        }
    }
}
