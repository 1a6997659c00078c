// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-process software token.
//
// Behaves like a minimal PKCS#11 module: slots with labelled tokens, a user
// PIN per token, persistent AES keys from configuration, and per-session
// key objects. AES-GCM is done with `ring`, which supports 128- and 256-bit
// keys only.

use std::collections::HashMap;

use ring::aead::{AES_128_GCM, AES_256_GCM, Aad, LessSafeKey, Nonce, UnboundKey};
use tokenwerk_core::config::ProviderConfig;
use tokenwerk_core::rv::{ProviderError, ProviderOp, ProviderResult, ReturnCode};
use tokenwerk_core::types::{
    Algorithm, Credential, GCM_NONCE_LEN, GCM_TAG_LEN, KeyLocator, SlotId,
};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::traits::*;

fn fail<T>(op: ProviderOp, code: ReturnCode) -> ProviderResult<T> {
    Err(ProviderError::new(op, code))
}

struct StoredKey {
    label: String,
    id: Vec<u8>,
    value: Zeroizing<Vec<u8>>,
}

struct SoftToken {
    slot: SlotId,
    label: String,
    pin: Zeroizing<Vec<u8>>,
    keys: Vec<StoredKey>,
}

struct SessionObject {
    value: Zeroizing<Vec<u8>>,
    imported: bool,
}

struct SoftSession {
    slot: SlotId,
    objects: HashMap<u64, SessionObject>,
}

/// Software token provider selected by the `soft` locator.
pub struct SoftProvider {
    name: String,
    initialized: bool,
    tokens: Vec<SoftToken>,
    sessions: HashMap<u64, SoftSession>,
    next_handle: u64,
}

impl SoftProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initialized: false,
            tokens: Vec::new(),
            sessions: HashMap::new(),
            next_handle: 1,
        }
    }

    fn allocate_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn ensure_initialized(&self, op: ProviderOp) -> ProviderResult<()> {
        if self.initialized {
            Ok(())
        } else {
            fail(op, ReturnCode::CRYPTOKI_NOT_INITIALIZED)
        }
    }

    fn session_mut(
        &mut self,
        op: ProviderOp,
        handle: SessionHandle,
    ) -> ProviderResult<&mut SoftSession> {
        self.ensure_initialized(op)?;
        self.sessions
            .get_mut(&handle.0)
            .ok_or(ProviderError::new(op, ReturnCode::SESSION_HANDLE_INVALID))
    }

    /// Build the `ring` key for `key` under `params`, checking that the
    /// nonce, tag and key sizes fit the mechanism.
    fn gcm_key(
        &self,
        op: ProviderOp,
        session: SessionHandle,
        key: KeyHandle,
        params: &GcmParams<'_>,
    ) -> ProviderResult<(LessSafeKey, Nonce)> {
        self.ensure_initialized(op)?;
        let session = self
            .sessions
            .get(&session.0)
            .ok_or(ProviderError::new(op, ReturnCode::SESSION_HANDLE_INVALID))?;
        let object = session
            .objects
            .get(&key.0)
            .ok_or(ProviderError::new(op, ReturnCode::KEY_HANDLE_INVALID))?;

        let aead = match params.algorithm {
            Algorithm::Aes128Gcm => &AES_128_GCM,
            Algorithm::Aes256Gcm => &AES_256_GCM,
            Algorithm::Aes192Gcm => return fail(op, ReturnCode::MECHANISM_INVALID),
        };
        if object.value.len() != params.algorithm.key_len() {
            return fail(op, ReturnCode::KEY_TYPE_INCONSISTENT);
        }
        if params.nonce.len() != GCM_NONCE_LEN || params.tag_len != GCM_TAG_LEN {
            return fail(op, ReturnCode::MECHANISM_PARAM_INVALID);
        }

        let unbound = UnboundKey::new(aead, &object.value)
            .map_err(|_| ProviderError::new(op, ReturnCode::KEY_SIZE_RANGE))?;
        let nonce = Nonce::try_assume_unique_for_key(params.nonce)
            .map_err(|_| ProviderError::new(op, ReturnCode::MECHANISM_PARAM_INVALID))?;
        Ok((LessSafeKey::new(unbound), nonce))
    }
}

impl TokenProvider for SoftProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn open_provider(&mut self, config: &ProviderConfig) -> ProviderResult<()> {
        let op = ProviderOp::OpenProvider;
        if self.initialized {
            return fail(op, ReturnCode::CRYPTOKI_ALREADY_INITIALIZED);
        }

        let mut tokens = Vec::with_capacity(config.soft_tokens.len());
        for token in &config.soft_tokens {
            let mut keys = Vec::with_capacity(token.keys.len());
            for key in &token.keys {
                let id = key
                    .decode_id()
                    .map_err(|_| ProviderError::new(op, ReturnCode::ARGUMENTS_BAD))?;
                let value = key
                    .decode_value()
                    .map_err(|_| ProviderError::new(op, ReturnCode::ARGUMENTS_BAD))?;
                keys.push(StoredKey {
                    label: key.label.clone(),
                    id,
                    value,
                });
            }
            tokens.push(SoftToken {
                slot: token.slot,
                label: token.label.clone(),
                pin: Zeroizing::new(token.user_pin.as_bytes().to_vec()),
                keys,
            });
        }

        debug!(provider = %self.name, tokens = tokens.len(), "software token initialised");
        self.tokens = tokens;
        self.initialized = true;
        Ok(())
    }

    fn close_provider(&mut self) -> ProviderResult<()> {
        self.ensure_initialized(ProviderOp::CloseProvider)?;
        if !self.sessions.is_empty() {
            warn!(open = self.sessions.len(), "closing software token with open sessions");
        }
        self.sessions.clear();
        self.tokens.clear();
        self.initialized = false;
        Ok(())
    }

    fn login(
        &mut self,
        slot: SlotId,
        token_name: &str,
        pin: &Credential,
    ) -> ProviderResult<SessionHandle> {
        let op = ProviderOp::Login;
        self.ensure_initialized(op)?;

        let token = self
            .tokens
            .iter()
            .find(|t| t.slot == slot)
            .ok_or(ProviderError::new(op, ReturnCode::SLOT_ID_INVALID))?;
        if !token_name.is_empty() && token.label != token_name {
            return fail(op, ReturnCode::TOKEN_NOT_PRESENT);
        }
        if pin.expose().is_empty() {
            return fail(op, ReturnCode::PIN_LEN_RANGE);
        }
        #[allow(deprecated)]
        let pin_ok =
            ring::constant_time::verify_slices_are_equal(pin.expose(), &token.pin).is_ok();
        if !pin_ok {
            return fail(op, ReturnCode::PIN_INCORRECT);
        }

        let handle = self.allocate_handle();
        self.sessions.insert(
            handle,
            SoftSession {
                slot,
                objects: HashMap::new(),
            },
        );
        debug!(%slot, session = handle, "software token login");
        Ok(SessionHandle(handle))
    }

    fn logout(&mut self, session: SessionHandle) -> ProviderResult<()> {
        let op = ProviderOp::Logout;
        self.ensure_initialized(op)?;
        match self.sessions.remove(&session.0) {
            Some(_) => Ok(()),
            None => fail(op, ReturnCode::SESSION_HANDLE_INVALID),
        }
    }

    fn mechanisms(&self, session: SessionHandle) -> ProviderResult<Vec<Algorithm>> {
        let op = ProviderOp::FindOrImportKey;
        self.ensure_initialized(op)?;
        if !self.sessions.contains_key(&session.0) {
            return fail(op, ReturnCode::SESSION_HANDLE_INVALID);
        }
        Ok(vec![Algorithm::Aes128Gcm, Algorithm::Aes256Gcm])
    }

    fn find_or_import_key(
        &mut self,
        session: SessionHandle,
        key: KeyMaterial<'_>,
    ) -> ProviderResult<KeyHandle> {
        let op = ProviderOp::FindOrImportKey;
        let slot = self.session_mut(op, session)?.slot;

        let object = match key {
            KeyMaterial::Stored(locator) => {
                let token = self
                    .tokens
                    .iter()
                    .find(|t| t.slot == slot)
                    .ok_or(ProviderError::new(op, ReturnCode::TOKEN_NOT_PRESENT))?;
                let stored = token
                    .keys
                    .iter()
                    .find(|k| match locator {
                        KeyLocator::Label(label) => k.label == *label,
                        KeyLocator::Id(id) => !k.id.is_empty() && k.id == *id,
                    })
                    .ok_or(ProviderError::new(op, ReturnCode::KEY_HANDLE_INVALID))?;
                SessionObject {
                    value: stored.value.clone(),
                    imported: false,
                }
            }
            KeyMaterial::Import { algorithm, value } => {
                if value.len() != algorithm.key_len() {
                    return fail(op, ReturnCode::KEY_SIZE_RANGE);
                }
                SessionObject {
                    value: Zeroizing::new(value.to_vec()),
                    imported: true,
                }
            }
        };

        let handle = self.allocate_handle();
        self.session_mut(op, session)?.objects.insert(handle, object);
        Ok(KeyHandle(handle))
    }

    fn release_key(&mut self, session: SessionHandle, key: KeyHandle) -> ProviderResult<()> {
        let op = ProviderOp::ReleaseKey;
        match self.session_mut(op, session)?.objects.remove(&key.0) {
            Some(object) => {
                debug!(key = key.0, imported = object.imported, "key handle released");
                Ok(())
            }
            None => fail(op, ReturnCode::OBJECT_HANDLE_INVALID),
        }
    }

    fn encrypt(
        &mut self,
        session: SessionHandle,
        key: KeyHandle,
        params: &GcmParams<'_>,
        plaintext: &[u8],
    ) -> ProviderResult<Vec<u8>> {
        let op = ProviderOp::Encrypt;
        let (key, nonce) = self.gcm_key(op, session, key, params)?;

        let mut in_out = plaintext.to_vec();
        let tag = key
            .seal_in_place_separate_tag(nonce, Aad::from(params.aad), &mut in_out)
            .map_err(|_| ProviderError::new(op, ReturnCode::FUNCTION_FAILED))?;
        in_out.extend_from_slice(tag.as_ref());
        Ok(in_out)
    }

    fn decrypt(
        &mut self,
        session: SessionHandle,
        key: KeyHandle,
        params: &GcmParams<'_>,
        ciphertext_and_tag: &[u8],
    ) -> ProviderResult<Vec<u8>> {
        let op = ProviderOp::Decrypt;
        let (key, nonce) = self.gcm_key(op, session, key, params)?;
        if ciphertext_and_tag.len() < GCM_TAG_LEN {
            return fail(op, ReturnCode::ENCRYPTED_DATA_LEN_RANGE);
        }

        let mut in_out = ciphertext_and_tag.to_vec();
        let plaintext_len = key
            .open_in_place(nonce, Aad::from(params.aad), &mut in_out)
            .map_err(|_| ProviderError::new(op, ReturnCode::ENCRYPTED_DATA_INVALID))?
            .len();
        in_out.truncate(plaintext_len);
        Ok(in_out)
    }
}
