// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Provider-agnostic trait definitions for token modules.
//
// A provider is the external component that owns key material: a PKCS#11
// library, or the built-in software token. Sessions in `tokenwerk-device`
// talk to it only through this trait.

use std::fmt;

use tokenwerk_core::config::ProviderConfig;
use tokenwerk_core::rv::ProviderResult;
use tokenwerk_core::types::{Algorithm, Credential, KeyLocator, SlotId};

/// Provider-side handle of an authenticated session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(pub u64);

/// Provider-side handle of a key object usable within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyHandle(pub u64);

/// Key to resolve for an operation.
#[derive(Clone, Copy)]
pub enum KeyMaterial<'a> {
    /// A key object already stored on the token.
    Stored(&'a KeyLocator),
    /// Raw key bytes to import as a temporary session object.
    Import { algorithm: Algorithm, value: &'a [u8] },
}

impl fmt::Debug for KeyMaterial<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMaterial::Stored(locator) => write!(f, "Stored({locator})"),
            KeyMaterial::Import { algorithm, .. } => write!(f, "Import({algorithm})"),
        }
    }
}

/// AES-GCM parameters for one encrypt or decrypt call.
#[derive(Debug, Clone, Copy)]
pub struct GcmParams<'a> {
    pub algorithm: Algorithm,
    pub nonce: &'a [u8],
    pub aad: &'a [u8],
    pub tag_len: usize,
}

/// The operations Tokenwerk needs from a token module.
///
/// Every method reports failure as a PKCS#11 return code. Implementations
/// are not required to be reentrant; callers serialise access.
pub trait TokenProvider: Send {
    /// Human-readable provider name for logs.
    fn name(&self) -> &str;

    /// Load and initialise the module.
    fn open_provider(&mut self, config: &ProviderConfig) -> ProviderResult<()>;

    /// Finalise the module. All sessions are implicitly closed.
    fn close_provider(&mut self) -> ProviderResult<()>;

    /// Open a session on `slot` and log the user in.
    ///
    /// A non-empty `token_name` must match the token label in that slot.
    fn login(
        &mut self,
        slot: SlotId,
        token_name: &str,
        pin: &Credential,
    ) -> ProviderResult<SessionHandle>;

    /// Log out and close the session.
    fn logout(&mut self, session: SessionHandle) -> ProviderResult<()>;

    /// AEAD algorithms usable in this session.
    fn mechanisms(&self, session: SessionHandle) -> ProviderResult<Vec<Algorithm>>;

    /// Resolve a stored key or import raw bytes as a session object.
    fn find_or_import_key(
        &mut self,
        session: SessionHandle,
        key: KeyMaterial<'_>,
    ) -> ProviderResult<KeyHandle>;

    /// Drop a key handle obtained from `find_or_import_key`. Imported
    /// session objects are destroyed; stored objects are left alone.
    fn release_key(&mut self, session: SessionHandle, key: KeyHandle) -> ProviderResult<()>;

    /// Encrypt, returning ciphertext with the tag appended.
    fn encrypt(
        &mut self,
        session: SessionHandle,
        key: KeyHandle,
        params: &GcmParams<'_>,
        plaintext: &[u8],
    ) -> ProviderResult<Vec<u8>>;

    /// Decrypt ciphertext with the tag appended. Fails closed when the tag
    /// does not verify.
    fn decrypt(
        &mut self,
        session: SessionHandle,
        key: KeyHandle,
        params: &GcmParams<'_>,
        ciphertext_and_tag: &[u8],
    ) -> ProviderResult<Vec<u8>>;
}
