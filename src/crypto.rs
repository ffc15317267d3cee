// AeroBridge Cryptographic Primitives
// Argon2id key derivation + AES-256-GCM authenticated encryption
// Used by the config store to open and seal configuration blobs

use aes_gcm::{Aes256Gcm, KeyInit, aead::Aead};
use aes_gcm::aead::generic_array::GenericArray;
use argon2::Argon2;
use secrecy::zeroize::Zeroizing;

pub const ARGON2_MEM_COST: u32 = 65536; // 64MB
pub const ARGON2_TIME_COST: u32 = 3;
pub const ARGON2_PARALLELISM: u32 = 4;

pub const SALT_SIZE: usize = 16;
pub const NONCE_SIZE: usize = 12;

/// Argon2id cost parameters, stored alongside the salt so a blob can be
/// opened with whatever parameters sealed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub mem_cost: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_cost: ARGON2_MEM_COST,
            time_cost: ARGON2_TIME_COST,
            parallelism: ARGON2_PARALLELISM,
        }
    }
}

impl KdfParams {
    /// Minimum parameters accepted by argon2; only meant for tests and fixtures
    pub fn interactive_min() -> Self {
        Self {
            mem_cost: argon2::Params::MIN_M_COST.max(8),
            time_cost: 1,
            parallelism: 1,
        }
    }
}

/// Derive a 256-bit key from password + salt using Argon2id.
/// The key is wiped when the returned buffer drops.
pub fn derive_key(password: &str, salt: &[u8], kdf: &KdfParams) -> Result<Zeroizing<[u8; 32]>, String> {
    let params = argon2::Params::new(
        kdf.mem_cost,
        kdf.time_cost,
        kdf.parallelism,
        Some(32),
    ).map_err(|e| format!("Argon2 params: {}", e))?;

    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; 32]);
    argon2.hash_password_into(password.as_bytes(), salt, &mut *key)
        .map_err(|e| format!("Argon2 derive: {}", e))?;
    Ok(key)
}

/// Encrypt plaintext using AES-256-GCM
pub fn encrypt_aes_gcm(key: &[u8; 32], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, String> {
    let cipher = Aes256Gcm::new(GenericArray::from_slice(key));
    let nonce = GenericArray::from_slice(nonce);
    cipher.encrypt(nonce, plaintext)
        .map_err(|e| format!("AES-GCM encrypt: {}", e))
}

/// Decrypt ciphertext using AES-256-GCM
pub fn decrypt_aes_gcm(key: &[u8; 32], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, String> {
    let cipher = Aes256Gcm::new(GenericArray::from_slice(key));
    let nonce = GenericArray::from_slice(nonce);
    cipher.decrypt(nonce, ciphertext)
        .map_err(|e| format!("AES-GCM decrypt: {}", e))
}

/// Generate cryptographically secure random bytes using OS entropy
pub fn random_bytes(len: usize) -> Vec<u8> {
    use rand::rngs::OsRng;
    use rand::RngCore;
    let mut buf = vec![0u8; len];
    OsRng.fill_bytes(&mut buf);
    buf
}
