// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// AES-GCM round trip against a registered device.

use tokenwerk_core::error::{Result, TokenwerkError};
use tokenwerk_core::types::{DeviceId, GCM_NONCE_LEN, GCM_TAG_LEN};
use tracing::{debug, info, instrument};

use crate::aead::AesGcm;
use crate::dispatch::Dispatcher;

/// Fill byte for the fixed key, nonce and plaintext.
pub const FILL_BYTE: u8 = 0x09;
pub const KEY_LEN: usize = 16;
pub const PLAINTEXT_LEN: usize = 33;

/// Sizes observed during a successful round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundTripReport {
    pub plaintext_len: usize,
    pub ciphertext_len: usize,
    pub tag_len: usize,
}

/// Encrypt a fixed 33-byte message with AES-128-GCM on `device`, then decrypt
/// it with a second, independent context and compare.
#[instrument(skip_all, fields(%device))]
pub fn aes_gcm_round_trip(dispatcher: &Dispatcher, device: DeviceId) -> Result<RoundTripReport> {
    let key = [FILL_BYTE; KEY_LEN];
    let nonce = [FILL_BYTE; GCM_NONCE_LEN];
    let plaintext = [FILL_BYTE; PLAINTEXT_LEN];

    info!("Encrypt with AES128-GCM");
    let mut sealer = AesGcm::new(dispatcher, device);
    sealer.set_key(&key)?;
    let mut ciphertext = [0u8; PLAINTEXT_LEN];
    let mut tag = [0u8; GCM_TAG_LEN];
    sealer.encrypt(&mut ciphertext, &plaintext, &nonce, &mut tag, &[])?;
    debug!(tag = %hex::encode(&tag[..4]), "sealed");

    info!("Decrypt with AES128-GCM");
    let mut opener = AesGcm::new(dispatcher, device);
    opener.set_key(&key)?;
    let mut decrypted = [0u8; PLAINTEXT_LEN];
    opener.decrypt(&mut decrypted, &ciphertext, &nonce, &tag, &[])?;

    if decrypted != plaintext {
        return Err(TokenwerkError::CryptoOperationFailed(
            "decrypted text does not match the original".into(),
        ));
    }

    Ok(RoundTripReport {
        plaintext_len: plaintext.len(),
        ciphertext_len: ciphertext.len(),
        tag_len: tag.len(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokenwerk_core::config::{ProviderConfig, SoftTokenConfig};
    use tokenwerk_core::error::ErrorKind;
    use tokenwerk_core::types::SlotId;

    use super::*;
    use crate::module::ModuleHandle;
    use crate::registry::DeviceRegistry;
    use crate::session::Session;

    fn config() -> ProviderConfig {
        ProviderConfig {
            read_write_sessions: true,
            soft_tokens: vec![SoftTokenConfig {
                slot: SlotId(0),
                label: "demo".into(),
                user_pin: "1234".into(),
                keys: Vec::new(),
            }],
        }
    }

    #[test]
    fn full_scenario_with_teardown() {
        let module = ModuleHandle::open("soft", &config()).unwrap();
        let session = Arc::new(
            Session::login(&module, SlotId(0), "demo", "1234".to_string().into()).unwrap(),
        );
        let registry = Arc::new(DeviceRegistry::new());
        registry.register(DeviceId(1), session.clone()).unwrap();
        let dispatcher = Dispatcher::new(Arc::clone(&registry));

        let report = aes_gcm_round_trip(&dispatcher, DeviceId(1)).unwrap();
        assert_eq!(
            report,
            RoundTripReport {
                plaintext_len: 33,
                ciphertext_len: 33,
                tag_len: 16,
            }
        );

        assert!(registry.unregister(DeviceId(1)).unwrap());
        session.logout().unwrap();
        module.close().unwrap();

        let err = aes_gcm_round_trip(&dispatcher, DeviceId(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceNotFound);
    }

    #[test]
    fn unregistered_device_fails_before_any_crypto() {
        let dispatcher = Dispatcher::new(Arc::new(DeviceRegistry::new()));
        let err = aes_gcm_round_trip(&dispatcher, DeviceId(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceNotFound);
    }
}
