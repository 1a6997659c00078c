// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// AES-GCM context bound to a device id.
//
// Holds the key (raw bytes or a reference to a token object) and turns
// buffer-oriented encrypt/decrypt calls into dispatcher requests.

use tokenwerk_core::error::{Result, TokenwerkError};
use tokenwerk_core::types::{
    Algorithm, CryptoRequest, CryptoResult, DeviceId, GCM_TAG_LEN, KeyLocator, KeyRef,
};
use tracing::instrument;
use zeroize::Zeroizing;

use crate::dispatch::Dispatcher;

enum KeySource {
    Value(Zeroizing<Vec<u8>>),
    Reference(KeyLocator),
}

/// AES-GCM cipher whose operations run on a registered device.
pub struct AesGcm {
    dispatcher: Dispatcher,
    device: DeviceId,
    key: Option<(Algorithm, KeySource)>,
}

impl AesGcm {
    pub fn new(dispatcher: &Dispatcher, device: DeviceId) -> Self {
        Self {
            dispatcher: dispatcher.clone(),
            device,
            key: None,
        }
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Algorithm implied by the current key, if any.
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.key.as_ref().map(|(algorithm, _)| *algorithm)
    }

    /// Use raw key bytes. The length picks AES-128, -192 or -256.
    pub fn set_key(&mut self, key: &[u8]) -> Result<()> {
        let algorithm = Algorithm::for_key_len(key.len()).ok_or_else(|| {
            TokenwerkError::InvalidRequest(format!("unsupported AES key length {}", key.len()))
        })?;
        self.key = Some((algorithm, KeySource::Value(Zeroizing::new(key.to_vec()))));
        Ok(())
    }

    /// Use a key object that already lives on the token.
    pub fn set_key_reference(&mut self, locator: KeyLocator, algorithm: Algorithm) {
        self.key = Some((algorithm, KeySource::Reference(locator)));
    }

    fn key_ref(&self) -> Result<(Algorithm, KeyRef<'_>)> {
        match &self.key {
            Some((algorithm, KeySource::Value(bytes))) => {
                Ok((*algorithm, KeyRef::ByValue(bytes.as_slice())))
            }
            Some((algorithm, KeySource::Reference(locator))) => {
                Ok((*algorithm, KeyRef::ByReference(locator)))
            }
            None => Err(TokenwerkError::InvalidState("no key set".into())),
        }
    }

    /// Encrypt `input` into `out` and write the tag into `tag_out`.
    ///
    /// `out` must be exactly as long as `input`; `tag_out` must be 16 bytes.
    #[instrument(skip_all, fields(device = %self.device, len = input.len()))]
    pub fn encrypt(
        &self,
        out: &mut [u8],
        input: &[u8],
        nonce: &[u8],
        tag_out: &mut [u8],
        aad: &[u8],
    ) -> Result<()> {
        let (algorithm, key) = self.key_ref()?;
        check_buffers(out.len(), input.len(), tag_out.len())?;

        let request = CryptoRequest::encrypt(algorithm, key, input, nonce, aad);
        match self.dispatcher.dispatch(self.device, &request)? {
            CryptoResult::Sealed { ciphertext, tag } => {
                out.copy_from_slice(&ciphertext);
                tag_out.copy_from_slice(&tag);
                Ok(())
            }
            CryptoResult::Opened { .. } => Err(TokenwerkError::CryptoOperationFailed(
                "encrypt returned plaintext".into(),
            )),
        }
    }

    /// Verify `tag` and decrypt `input` into `out`.
    ///
    /// On failure `out` is left untouched.
    #[instrument(skip_all, fields(device = %self.device, len = input.len()))]
    pub fn decrypt(
        &self,
        out: &mut [u8],
        input: &[u8],
        nonce: &[u8],
        tag: &[u8],
        aad: &[u8],
    ) -> Result<()> {
        let (algorithm, key) = self.key_ref()?;
        check_buffers(out.len(), input.len(), tag.len())?;

        let request = CryptoRequest::decrypt(algorithm, key, input, nonce, aad, tag);
        match self.dispatcher.dispatch(self.device, &request)? {
            CryptoResult::Opened { plaintext } => {
                out.copy_from_slice(&plaintext);
                Ok(())
            }
            CryptoResult::Sealed { .. } => Err(TokenwerkError::CryptoOperationFailed(
                "decrypt returned ciphertext".into(),
            )),
        }
    }
}

fn check_buffers(out_len: usize, input_len: usize, tag_len: usize) -> Result<()> {
    if out_len != input_len {
        return Err(TokenwerkError::InvalidRequest(format!(
            "output buffer is {out_len} bytes, input is {input_len}"
        )));
    }
    if tag_len != GCM_TAG_LEN {
        return Err(TokenwerkError::InvalidRequest(format!(
            "tag must be {GCM_TAG_LEN} bytes, got {tag_len}"
        )));
    }
    Ok(())
}
