// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Placeholder provider for builds without the `pkcs11` feature.
//
// Opening always fails with a library-load error; every other method reports
// the provider as uninitialised.

use tokenwerk_core::config::ProviderConfig;
use tokenwerk_core::rv::{ProviderError, ProviderOp, ProviderResult, ReturnCode};
use tokenwerk_core::types::{Algorithm, Credential, SlotId};

use crate::traits::*;

/// Stands in for a PKCS#11 library that this build cannot load.
pub struct UnavailableProvider {
    locator: String,
}

impl UnavailableProvider {
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
        }
    }
}

fn not_initialized<T>(op: ProviderOp) -> ProviderResult<T> {
    Err(ProviderError::new(op, ReturnCode::CRYPTOKI_NOT_INITIALIZED))
}

impl TokenProvider for UnavailableProvider {
    fn name(&self) -> &str {
        &self.locator
    }

    fn open_provider(&mut self, _config: &ProviderConfig) -> ProviderResult<()> {
        tracing::warn!(
            locator = %self.locator,
            "PKCS#11 support not compiled in (enable the `pkcs11` feature)"
        );
        Err(ProviderError::new(
            ProviderOp::OpenProvider,
            ReturnCode::LIBRARY_LOAD_FAILED,
        ))
    }

    fn close_provider(&mut self) -> ProviderResult<()> {
        not_initialized(ProviderOp::CloseProvider)
    }

    fn login(
        &mut self,
        _slot: SlotId,
        _token_name: &str,
        _pin: &Credential,
    ) -> ProviderResult<SessionHandle> {
        not_initialized(ProviderOp::Login)
    }

    fn logout(&mut self, _session: SessionHandle) -> ProviderResult<()> {
        not_initialized(ProviderOp::Logout)
    }

    fn mechanisms(&self, _session: SessionHandle) -> ProviderResult<Vec<Algorithm>> {
        not_initialized(ProviderOp::FindOrImportKey)
    }

    fn find_or_import_key(
        &mut self,
        _session: SessionHandle,
        _key: KeyMaterial<'_>,
    ) -> ProviderResult<KeyHandle> {
        not_initialized(ProviderOp::FindOrImportKey)
    }

    fn release_key(&mut self, _session: SessionHandle, _key: KeyHandle) -> ProviderResult<()> {
        not_initialized(ProviderOp::ReleaseKey)
    }

    fn encrypt(
        &mut self,
        _session: SessionHandle,
        _key: KeyHandle,
        _params: &GcmParams<'_>,
        _plaintext: &[u8],
    ) -> ProviderResult<Vec<u8>> {
        not_initialized(ProviderOp::Encrypt)
    }

    fn decrypt(
        &mut self,
        _session: SessionHandle,
        _key: KeyHandle,
        _params: &GcmParams<'_>,
        _ciphertext_and_tag: &[u8],
    ) -> ProviderResult<Vec<u8>> {
        not_initialized(ProviderOp::Decrypt)
    }
}
