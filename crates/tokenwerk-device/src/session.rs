// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Authenticated token session and its crypto device implementation.
//
// Lock order is session state first, then the module's provider lock. Every
// path that needs both takes them in that order.

use std::sync::{Arc, Mutex};

use tokenwerk_core::error::{Result, TokenwerkError};
use tokenwerk_core::rv::{ProviderError, ProviderOp, ProviderResult, ReturnCode};
use tokenwerk_core::types::{
    Algorithm, Credential, CryptoRequest, CryptoResult, Direction, GCM_TAG_LEN, KeyRef, SlotId,
};
use tokenwerk_provider::{GcmParams, KeyMaterial, SessionHandle};
use tracing::{debug, info, instrument, warn};

use crate::module::{ModuleHandle, ModuleShared};
use crate::registry::CryptoDevice;

/// A logged-in session on one token.
///
/// The session can be shared with the device registry; logout through any
/// clone of the `Arc` ends it for all holders.
pub struct Session {
    module: Arc<ModuleShared>,
    slot: SlotId,
    token_name: String,
    mechanisms: Vec<Algorithm>,
    handle: Mutex<Option<SessionHandle>>,
}

impl Session {
    /// Open a session on `slot` and authenticate as the user.
    ///
    /// `token_name` is checked against the token label when non-empty. The
    /// credential is consumed and wiped once the provider has seen it.
    #[instrument(skip_all, fields(locator = %module.locator(), %slot, token = %token_name))]
    pub fn login(
        module: &ModuleHandle,
        slot: SlotId,
        token_name: &str,
        credential: Credential,
    ) -> Result<Self> {
        let shared = module.shared();
        let handle = shared
            .with_provider(ProviderOp::Login, |p| p.login(slot, token_name, &credential))
            .map_err(TokenwerkError::from)?;
        drop(credential);

        let mechanisms = match shared.with_provider(ProviderOp::Login, |p| p.mechanisms(handle)) {
            Ok(mechanisms) => mechanisms,
            Err(err) => {
                if let Err(e) = shared.with_provider(ProviderOp::Logout, |p| p.logout(handle)) {
                    warn!(error = %e, "logout after failed mechanism query failed");
                }
                return Err(err.into());
            }
        };

        shared.session_opened();
        info!(?mechanisms, "session logged in");
        Ok(Self {
            module: shared,
            slot,
            token_name: token_name.to_owned(),
            mechanisms,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// End the session. Logging out twice is a no-op.
    #[instrument(skip(self), fields(slot = %self.slot))]
    pub fn logout(&self) -> Result<()> {
        let mut state = self
            .handle
            .lock()
            .map_err(|_| TokenwerkError::InvalidState("session lock poisoned".into()))?;
        let Some(handle) = state.take() else {
            debug!("session already logged out");
            return Ok(());
        };
        self.module.session_closed();

        self.module
            .with_provider(ProviderOp::Logout, |p| p.logout(handle))
            .map_err(TokenwerkError::from)?;
        info!("session logged out");
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.handle.lock().map(|h| h.is_some()).unwrap_or(false)
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn token_name(&self) -> &str {
        &self.token_name
    }

    /// AEAD algorithms the token advertised at login.
    pub fn mechanisms(&self) -> &[Algorithm] {
        &self.mechanisms
    }

    fn run(
        &self,
        handle: SessionHandle,
        request: &CryptoRequest<'_>,
    ) -> ProviderResult<CryptoResult> {
        let material = match request.key {
            KeyRef::ByReference(locator) => KeyMaterial::Stored(locator),
            KeyRef::ByValue(value) => KeyMaterial::Import {
                algorithm: request.algorithm,
                value,
            },
        };
        let params = GcmParams {
            algorithm: request.algorithm,
            nonce: request.nonce,
            aad: request.aad,
            tag_len: GCM_TAG_LEN,
        };

        self.module.with_provider(ProviderOp::FindOrImportKey, |provider| {
            let key = provider.find_or_import_key(handle, material)?;

            let outcome = match request.direction {
                Direction::Encrypt => provider
                    .encrypt(handle, key, &params, request.input)
                    .and_then(split_tag),
                Direction::Decrypt => match request.tag {
                    Some(tag) => {
                        let mut joined = Vec::with_capacity(request.input.len() + tag.len());
                        joined.extend_from_slice(request.input);
                        joined.extend_from_slice(tag);
                        provider
                            .decrypt(handle, key, &params, &joined)
                            .map(|plaintext| CryptoResult::Opened { plaintext })
                    }
                    None => Err(ProviderError::new(
                        ProviderOp::Decrypt,
                        ReturnCode::ARGUMENTS_BAD,
                    )),
                },
            };

            if let Err(err) = provider.release_key(handle, key) {
                warn!(error = %err, "key release failed");
            }
            outcome
        })
    }
}

fn split_tag(mut sealed: Vec<u8>) -> ProviderResult<CryptoResult> {
    if sealed.len() < GCM_TAG_LEN {
        return Err(ProviderError::new(
            ProviderOp::Encrypt,
            ReturnCode::FUNCTION_FAILED,
        ));
    }
    let tag = sealed.split_off(sealed.len() - GCM_TAG_LEN);
    Ok(CryptoResult::Sealed {
        ciphertext: sealed,
        tag,
    })
}

impl CryptoDevice for Session {
    fn describe(&self) -> String {
        format!("{} slot {}", self.module.locator(), self.slot)
    }

    fn supports(&self, algorithm: Algorithm) -> bool {
        self.mechanisms.contains(&algorithm)
    }

    fn service_request(&self, request: &CryptoRequest<'_>) -> ProviderResult<CryptoResult> {
        let op = match request.direction {
            Direction::Encrypt => ProviderOp::Encrypt,
            Direction::Decrypt => ProviderOp::Decrypt,
        };
        let state = self
            .handle
            .lock()
            .map_err(|_| ProviderError::new(op, ReturnCode::SESSION_CLOSED))?;
        let handle = (*state).ok_or(ProviderError::new(op, ReturnCode::USER_NOT_LOGGED_IN))?;
        self.run(handle, request)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.is_authenticated() {
            if let Err(e) = self.logout() {
                warn!(error = %e, "logout on drop failed");
            }
        }
    }
}
