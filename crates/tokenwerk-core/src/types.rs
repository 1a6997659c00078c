// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Tokenwerk device layer.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// GCM nonce length accepted by every device (96-bit IV).
pub const GCM_NONCE_LEN: usize = 12;

/// GCM authentication tag length produced and verified by every device.
pub const GCM_TAG_LEN: usize = 16;

/// Small integer selecting a registered crypto device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// PKCS#11 slot identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotId(pub u64);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user PIN, zeroed when dropped. Never printed.
pub struct Credential(Zeroizing<Vec<u8>>);

impl Credential {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(secret.into()))
    }

    pub fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl From<String> for Credential {
    fn from(secret: String) -> Self {
        Self::new(secret.into_bytes())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// AEAD algorithms understood by the dispatch layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    Aes128Gcm,
    Aes192Gcm,
    Aes256Gcm,
}

impl Algorithm {
    /// Required raw key length in bytes.
    pub fn key_len(self) -> usize {
        match self {
            Algorithm::Aes128Gcm => 16,
            Algorithm::Aes192Gcm => 24,
            Algorithm::Aes256Gcm => 32,
        }
    }

    /// Pick the AES-GCM variant for a raw key of `len` bytes.
    pub fn for_key_len(len: usize) -> Option<Self> {
        match len {
            16 => Some(Algorithm::Aes128Gcm),
            24 => Some(Algorithm::Aes192Gcm),
            32 => Some(Algorithm::Aes256Gcm),
            _ => None,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Algorithm::Aes128Gcm => "AES128-GCM",
            Algorithm::Aes192Gcm => "AES192-GCM",
            Algorithm::Aes256Gcm => "AES256-GCM",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

/// How a module-resident key object is found.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyLocator {
    /// `CKA_LABEL`
    Label(String),
    /// `CKA_ID`
    Id(Vec<u8>),
}

impl fmt::Display for KeyLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyLocator::Label(label) => write!(f, "label={label}"),
            KeyLocator::Id(id) => write!(f, "id={}", hex::encode(id)),
        }
    }
}

/// Key carried by a request: a reference into the module, or raw bytes for
/// the software path.
#[derive(Clone, Copy)]
pub enum KeyRef<'a> {
    ByReference(&'a KeyLocator),
    ByValue(&'a [u8]),
}

impl fmt::Debug for KeyRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyRef::ByReference(locator) => write!(f, "ByReference({locator})"),
            KeyRef::ByValue(bytes) => write!(f, "ByValue({} bytes)", bytes.len()),
        }
    }
}

/// One AEAD operation routed through the dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct CryptoRequest<'a> {
    pub algorithm: Algorithm,
    pub direction: Direction,
    pub key: KeyRef<'a>,
    /// Plaintext on encrypt, ciphertext (without tag) on decrypt.
    pub input: &'a [u8],
    pub aad: &'a [u8],
    pub nonce: &'a [u8],
    /// Must be `None` on encrypt and `Some` on decrypt.
    pub tag: Option<&'a [u8]>,
}

impl<'a> CryptoRequest<'a> {
    pub fn encrypt(
        algorithm: Algorithm,
        key: KeyRef<'a>,
        plaintext: &'a [u8],
        nonce: &'a [u8],
        aad: &'a [u8],
    ) -> Self {
        Self {
            algorithm,
            direction: Direction::Encrypt,
            key,
            input: plaintext,
            aad,
            nonce,
            tag: None,
        }
    }

    pub fn decrypt(
        algorithm: Algorithm,
        key: KeyRef<'a>,
        ciphertext: &'a [u8],
        nonce: &'a [u8],
        aad: &'a [u8],
        tag: &'a [u8],
    ) -> Self {
        Self {
            algorithm,
            direction: Direction::Decrypt,
            key,
            input: ciphertext,
            aad,
            nonce,
            tag: Some(tag),
        }
    }
}

/// Output of a serviced request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoResult {
    Sealed { ciphertext: Vec<u8>, tag: Vec<u8> },
    Opened { plaintext: Vec<u8> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_debug_is_redacted() {
        let pin = Credential::from("1234".to_string());
        assert_eq!(format!("{pin:?}"), "Credential(***)");
        assert_eq!(pin.expose(), b"1234");
    }

    #[test]
    fn by_value_debug_hides_key_bytes() {
        let key = [0x41u8; 16];
        let rendered = format!("{:?}", KeyRef::ByValue(&key));
        assert_eq!(rendered, "ByValue(16 bytes)");
    }

    #[test]
    fn algorithm_from_key_length() {
        assert_eq!(Algorithm::for_key_len(16), Some(Algorithm::Aes128Gcm));
        assert_eq!(Algorithm::for_key_len(24), Some(Algorithm::Aes192Gcm));
        assert_eq!(Algorithm::for_key_len(32), Some(Algorithm::Aes256Gcm));
        assert_eq!(Algorithm::for_key_len(20), None);
        for algorithm in [Algorithm::Aes128Gcm, Algorithm::Aes192Gcm, Algorithm::Aes256Gcm] {
            assert_eq!(Algorithm::for_key_len(algorithm.key_len()), Some(algorithm));
        }
    }

    #[test]
    fn key_locator_display() {
        assert_eq!(KeyLocator::Label("aes".into()).to_string(), "label=aes");
        assert_eq!(KeyLocator::Id(vec![0xde, 0xad]).to_string(), "id=dead");
    }
}
