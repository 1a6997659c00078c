// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Crypto request dispatcher.
//
// Routes a request to the device registered under its id, checks the request
// shape, and folds provider return codes into `TokenwerkError`. A request for
// an unregistered id never reaches any device.

use std::sync::Arc;

use tokenwerk_core::error::{Result, TokenwerkError};
use tokenwerk_core::types::{
    CryptoRequest, CryptoResult, DeviceId, Direction, GCM_NONCE_LEN, GCM_TAG_LEN, KeyRef,
};
use tracing::{debug, instrument};

use crate::registry::DeviceRegistry;

/// Front door for crypto operations. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<DeviceRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Service `request` on device `id`.
    #[instrument(
        skip_all,
        fields(
            device = %id,
            algorithm = %request.algorithm,
            direction = ?request.direction,
            len = request.input.len()
        )
    )]
    pub fn dispatch(&self, id: DeviceId, request: &CryptoRequest<'_>) -> Result<CryptoResult> {
        let device = self.registry.lookup(id)?;
        validate(request)?;
        if !device.supports(request.algorithm) {
            return Err(TokenwerkError::InvalidRequest(format!(
                "{} is not supported by device {id}",
                request.algorithm
            )));
        }

        let result = device.service_request(request).map_err(|err| {
            debug!(op = %err.op, code = %err.code, "device reported failure");
            TokenwerkError::from(err)
        })?;
        check_result(request, &result)?;
        Ok(result)
    }
}

/// Check sizes and direction-specific fields of `request`.
pub fn validate(request: &CryptoRequest<'_>) -> Result<()> {
    if request.nonce.len() != GCM_NONCE_LEN {
        return Err(TokenwerkError::InvalidRequest(format!(
            "nonce must be {GCM_NONCE_LEN} bytes, got {}",
            request.nonce.len()
        )));
    }
    if let KeyRef::ByValue(key) = request.key {
        if key.len() != request.algorithm.key_len() {
            return Err(TokenwerkError::InvalidRequest(format!(
                "{} needs a {}-byte key, got {}",
                request.algorithm,
                request.algorithm.key_len(),
                key.len()
            )));
        }
    }
    match (request.direction, request.tag) {
        (Direction::Encrypt, None) => Ok(()),
        (Direction::Encrypt, Some(_)) => Err(TokenwerkError::InvalidRequest(
            "encrypt requests carry no tag".into(),
        )),
        (Direction::Decrypt, Some(tag)) if tag.len() == GCM_TAG_LEN => Ok(()),
        (Direction::Decrypt, Some(tag)) => Err(TokenwerkError::InvalidRequest(format!(
            "tag must be {GCM_TAG_LEN} bytes, got {}",
            tag.len()
        ))),
        (Direction::Decrypt, None) => Err(TokenwerkError::InvalidRequest(
            "decrypt requests need a tag".into(),
        )),
    }
}

fn check_result(request: &CryptoRequest<'_>, result: &CryptoResult) -> Result<()> {
    let ok = match (request.direction, result) {
        (Direction::Encrypt, CryptoResult::Sealed { ciphertext, tag }) => {
            ciphertext.len() == request.input.len() && tag.len() == GCM_TAG_LEN
        }
        (Direction::Decrypt, CryptoResult::Opened { plaintext }) => {
            plaintext.len() == request.input.len()
        }
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(TokenwerkError::CryptoOperationFailed(
            "device returned a result of the wrong shape".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokenwerk_core::error::ErrorKind;
    use tokenwerk_core::rv::{ProviderError, ProviderOp, ProviderResult, ReturnCode};
    use tokenwerk_core::types::Algorithm;

    use super::*;
    use crate::registry::CryptoDevice;

    /// Echo device that counts how often it is asked to do work.
    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
        fail_with: Option<ReturnCode>,
    }

    impl CryptoDevice for Counting {
        fn describe(&self) -> String {
            "counting".into()
        }

        fn supports(&self, algorithm: Algorithm) -> bool {
            algorithm != Algorithm::Aes192Gcm
        }

        fn service_request(&self, request: &CryptoRequest<'_>) -> ProviderResult<CryptoResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(code) = self.fail_with {
                return Err(ProviderError::new(ProviderOp::Decrypt, code));
            }
            Ok(match request.direction {
                Direction::Encrypt => CryptoResult::Sealed {
                    ciphertext: request.input.to_vec(),
                    tag: vec![0; GCM_TAG_LEN],
                },
                Direction::Decrypt => CryptoResult::Opened {
                    plaintext: request.input.to_vec(),
                },
            })
        }
    }

    fn dispatcher_with(device: Arc<Counting>) -> Dispatcher {
        let registry = Arc::new(DeviceRegistry::new());
        registry.register(DeviceId(1), device).unwrap();
        Dispatcher::new(registry)
    }

    const KEY: [u8; 16] = [9; 16];
    const NONCE: [u8; GCM_NONCE_LEN] = [9; GCM_NONCE_LEN];

    #[test]
    fn unregistered_id_never_reaches_a_device() {
        let device = Arc::new(Counting::default());
        let dispatcher = dispatcher_with(Arc::clone(&device));

        let request = CryptoRequest::encrypt(
            Algorithm::Aes128Gcm,
            KeyRef::ByValue(&KEY),
            b"data",
            &NONCE,
            b"",
        );
        let err = dispatcher.dispatch(DeviceId(2), &request).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceNotFound);
        assert_eq!(device.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unregistered_id_wins_over_malformed_request() {
        let dispatcher = dispatcher_with(Arc::new(Counting::default()));
        let request = CryptoRequest::encrypt(
            Algorithm::Aes128Gcm,
            KeyRef::ByValue(&KEY),
            b"data",
            &[0; 3],
            b"",
        );
        let err = dispatcher.dispatch(DeviceId(5), &request).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceNotFound);
    }

    #[test]
    fn malformed_requests_are_rejected_before_the_device() {
        let device = Arc::new(Counting::default());
        let dispatcher = dispatcher_with(Arc::clone(&device));
        let short_key = [1u8; 10];
        let short_tag = [0u8; 8];

        let cases = [
            CryptoRequest::encrypt(
                Algorithm::Aes128Gcm,
                KeyRef::ByValue(&KEY),
                b"x",
                &[0; 8],
                b"",
            ),
            CryptoRequest::encrypt(
                Algorithm::Aes128Gcm,
                KeyRef::ByValue(&short_key),
                b"x",
                &NONCE,
                b"",
            ),
            CryptoRequest::encrypt(
                Algorithm::Aes256Gcm,
                KeyRef::ByValue(&KEY),
                b"x",
                &NONCE,
                b"",
            ),
            CryptoRequest::decrypt(
                Algorithm::Aes128Gcm,
                KeyRef::ByValue(&KEY),
                b"x",
                &NONCE,
                b"",
                &short_tag,
            ),
            CryptoRequest {
                tag: None,
                ..CryptoRequest::decrypt(
                    Algorithm::Aes128Gcm,
                    KeyRef::ByValue(&KEY),
                    b"x",
                    &NONCE,
                    b"",
                    &[0; GCM_TAG_LEN],
                )
            },
        ];
        for request in &cases {
            let err = dispatcher.dispatch(DeviceId(1), request).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidRequest, "{request:?}");
        }
        assert_eq!(device.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsupported_algorithm_is_invalid_request() {
        let device = Arc::new(Counting::default());
        let dispatcher = dispatcher_with(Arc::clone(&device));
        let key = [1u8; 24];
        let request = CryptoRequest::encrypt(
            Algorithm::Aes192Gcm,
            KeyRef::ByValue(&key),
            b"x",
            &NONCE,
            b"",
        );
        let err = dispatcher.dispatch(DeviceId(1), &request).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(device.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn provider_codes_are_translated() {
        let device = Arc::new(Counting {
            fail_with: Some(ReturnCode::ENCRYPTED_DATA_INVALID),
            ..Counting::default()
        });
        let dispatcher = dispatcher_with(Arc::clone(&device));
        let tag = [0u8; GCM_TAG_LEN];
        let request = CryptoRequest::decrypt(
            Algorithm::Aes128Gcm,
            KeyRef::ByValue(&KEY),
            b"x",
            &NONCE,
            b"",
            &tag,
        );
        let err = dispatcher.dispatch(DeviceId(1), &request).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CryptoOperationFailed);
        assert_eq!(device.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn well_formed_request_is_serviced() {
        let dispatcher = dispatcher_with(Arc::new(Counting::default()));
        let request = CryptoRequest::encrypt(
            Algorithm::Aes128Gcm,
            KeyRef::ByValue(&KEY),
            b"data",
            &NONCE,
            b"",
        );
        let result = dispatcher.dispatch(DeviceId(1), &request).unwrap();
        assert!(matches!(
            result,
            CryptoResult::Sealed { ref tag, .. } if tag.len() == GCM_TAG_LEN
        ));
    }
}
