// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PKCS#11 provider backed by a dynamically loaded Cryptoki library.
//
// The library is loaded in `open_provider`, not at construction, so a bad
// path surfaces as an open failure. Raw key imports become non-token
// (session) objects and are destroyed again in `release_key`.

use std::collections::HashMap;
use std::path::PathBuf;

use cryptoki::context::{CInitializeArgs, Pkcs11};
use cryptoki::error::{Error as CryptokiError, RvError};
use cryptoki::mechanism::aead::GcmParams as CkGcmParams;
use cryptoki::mechanism::{Mechanism, MechanismType};
use cryptoki::object::{Attribute, KeyType, ObjectClass, ObjectHandle};
use cryptoki::session::{Session, UserType};
use cryptoki::slot::Slot;
use cryptoki::types::{AuthPin, Ulong};
use tokenwerk_core::config::ProviderConfig;
use tokenwerk_core::rv::{ProviderError, ProviderOp, ProviderResult, ReturnCode};
use tokenwerk_core::types::{Algorithm, Credential, KeyLocator, SlotId};
use tracing::{debug, warn};
use zeroize::Zeroize;

use crate::traits::*;

/// Map a Cryptoki error onto a return code.
fn return_code(err: &CryptokiError) -> ReturnCode {
    let rv = match err {
        CryptokiError::LibraryLoading(_) => return ReturnCode::LIBRARY_LOAD_FAILED,
        CryptokiError::Pkcs11(rv, _) => rv,
        _ => return ReturnCode::GENERAL_ERROR,
    };
    match rv {
        RvError::HostMemory => ReturnCode::HOST_MEMORY,
        RvError::SlotIdInvalid => ReturnCode::SLOT_ID_INVALID,
        RvError::FunctionFailed => ReturnCode::FUNCTION_FAILED,
        RvError::ArgumentsBad => ReturnCode::ARGUMENTS_BAD,
        RvError::DataInvalid => ReturnCode::DATA_INVALID,
        RvError::DataLenRange => ReturnCode::DATA_LEN_RANGE,
        RvError::DeviceError => ReturnCode::DEVICE_ERROR,
        RvError::DeviceRemoved => ReturnCode::DEVICE_REMOVED,
        RvError::EncryptedDataInvalid => ReturnCode::ENCRYPTED_DATA_INVALID,
        RvError::EncryptedDataLenRange => ReturnCode::ENCRYPTED_DATA_LEN_RANGE,
        RvError::FunctionNotSupported => ReturnCode::FUNCTION_NOT_SUPPORTED,
        RvError::KeyHandleInvalid => ReturnCode::KEY_HANDLE_INVALID,
        RvError::KeySizeRange => ReturnCode::KEY_SIZE_RANGE,
        RvError::KeyTypeInconsistent => ReturnCode::KEY_TYPE_INCONSISTENT,
        RvError::MechanismInvalid => ReturnCode::MECHANISM_INVALID,
        RvError::MechanismParamInvalid => ReturnCode::MECHANISM_PARAM_INVALID,
        RvError::ObjectHandleInvalid => ReturnCode::OBJECT_HANDLE_INVALID,
        RvError::PinIncorrect => ReturnCode::PIN_INCORRECT,
        RvError::PinInvalid => ReturnCode::PIN_INVALID,
        RvError::PinLenRange => ReturnCode::PIN_LEN_RANGE,
        RvError::PinExpired => ReturnCode::PIN_EXPIRED,
        RvError::PinLocked => ReturnCode::PIN_LOCKED,
        RvError::SessionClosed => ReturnCode::SESSION_CLOSED,
        RvError::SessionHandleInvalid => ReturnCode::SESSION_HANDLE_INVALID,
        RvError::TokenNotPresent => ReturnCode::TOKEN_NOT_PRESENT,
        RvError::TokenNotRecognized => ReturnCode::TOKEN_NOT_RECOGNIZED,
        RvError::UserAlreadyLoggedIn => ReturnCode::USER_ALREADY_LOGGED_IN,
        RvError::UserNotLoggedIn => ReturnCode::USER_NOT_LOGGED_IN,
        RvError::UserPinNotInitialized => ReturnCode::USER_PIN_NOT_INITIALIZED,
        RvError::CryptokiNotInitialized => ReturnCode::CRYPTOKI_NOT_INITIALIZED,
        RvError::CryptokiAlreadyInitialized => ReturnCode::CRYPTOKI_ALREADY_INITIALIZED,
        _ => ReturnCode::GENERAL_ERROR,
    }
}

/// Build a `map_err` adaptor for `op` that logs the library's own error.
fn ck(op: ProviderOp) -> impl Fn(CryptokiError) -> ProviderError {
    move |err| {
        let code = return_code(&err);
        debug!(%op, %code, error = %err, "PKCS#11 call failed");
        ProviderError::new(op, code)
    }
}

struct KeyObject {
    object: ObjectHandle,
    imported: bool,
}

struct OpenSession {
    session: Session,
    slot: Slot,
    keys: HashMap<u64, KeyObject>,
}

/// Provider for a PKCS#11 shared library.
pub struct Pkcs11Provider {
    library: PathBuf,
    name: String,
    context: Option<Pkcs11>,
    read_write: bool,
    sessions: HashMap<u64, OpenSession>,
    next_handle: u64,
}

impl Pkcs11Provider {
    pub fn new(library: impl Into<PathBuf>) -> Self {
        let library = library.into();
        Self {
            name: library.display().to_string(),
            library,
            context: None,
            read_write: true,
            sessions: HashMap::new(),
            next_handle: 1,
        }
    }

    fn context(&self, op: ProviderOp) -> ProviderResult<&Pkcs11> {
        self.context
            .as_ref()
            .ok_or(ProviderError::new(op, ReturnCode::CRYPTOKI_NOT_INITIALIZED))
    }

    fn open_session(&self, op: ProviderOp, handle: SessionHandle) -> ProviderResult<&OpenSession> {
        self.context(op)?;
        self.sessions
            .get(&handle.0)
            .ok_or(ProviderError::new(op, ReturnCode::SESSION_HANDLE_INVALID))
    }

    fn key_object(
        &self,
        op: ProviderOp,
        session: SessionHandle,
        key: KeyHandle,
    ) -> ProviderResult<(&Session, ObjectHandle)> {
        let open = self.open_session(op, session)?;
        let object = open
            .keys
            .get(&key.0)
            .ok_or(ProviderError::new(op, ReturnCode::KEY_HANDLE_INVALID))?;
        Ok((&open.session, object.object))
    }

    fn allocate_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }
}

impl TokenProvider for Pkcs11Provider {
    fn name(&self) -> &str {
        &self.name
    }

    fn open_provider(&mut self, config: &ProviderConfig) -> ProviderResult<()> {
        let op = ProviderOp::OpenProvider;
        if self.context.is_some() {
            return Err(ProviderError::new(op, ReturnCode::CRYPTOKI_ALREADY_INITIALIZED));
        }
        let context = Pkcs11::new(&self.library).map_err(ck(op))?;
        context
            .initialize(CInitializeArgs::OsThreads)
            .map_err(ck(op))?;

        self.read_write = config.read_write_sessions;
        self.context = Some(context);
        debug!(library = %self.name, "PKCS#11 library initialised");
        Ok(())
    }

    fn close_provider(&mut self) -> ProviderResult<()> {
        let context = self.context.take().ok_or(ProviderError::new(
            ProviderOp::CloseProvider,
            ReturnCode::CRYPTOKI_NOT_INITIALIZED,
        ))?;
        if !self.sessions.is_empty() {
            warn!(open = self.sessions.len(), "finalising PKCS#11 library with open sessions");
        }
        // Sessions close on drop and must go before C_Finalize.
        self.sessions.clear();
        drop(context);
        debug!(library = %self.name, "PKCS#11 library finalised");
        Ok(())
    }

    fn login(
        &mut self,
        slot: SlotId,
        token_name: &str,
        pin: &Credential,
    ) -> ProviderResult<SessionHandle> {
        let op = ProviderOp::Login;
        let context = self.context(op)?;

        let found = context
            .get_slots_with_token()
            .map_err(ck(op))?
            .into_iter()
            .find(|s| u64::from(s.id()) == slot.0)
            .ok_or(ProviderError::new(op, ReturnCode::SLOT_ID_INVALID))?;

        if !token_name.is_empty() {
            let info = context.get_token_info(found).map_err(ck(op))?;
            if info.label().trim_end() != token_name {
                debug!(%slot, label = info.label(), "token label mismatch");
                return Err(ProviderError::new(op, ReturnCode::TOKEN_NOT_PRESENT));
            }
        }

        let opened = if self.read_write {
            context.open_rw_session(found)
        } else {
            context.open_ro_session(found)
        };
        let session = opened.map_err(ck(op))?;

        let pin = String::from_utf8(pin.expose().to_vec())
            .map_err(|_| ProviderError::new(op, ReturnCode::PIN_INVALID))?;
        session
            .login(UserType::User, Some(&AuthPin::new(pin)))
            .map_err(ck(op))?;

        let handle = self.allocate_handle();
        self.sessions.insert(
            handle,
            OpenSession {
                session,
                slot: found,
                keys: HashMap::new(),
            },
        );
        Ok(SessionHandle(handle))
    }

    fn logout(&mut self, session: SessionHandle) -> ProviderResult<()> {
        let op = ProviderOp::Logout;
        self.context(op)?;
        let open = self
            .sessions
            .remove(&session.0)
            .ok_or(ProviderError::new(op, ReturnCode::SESSION_HANDLE_INVALID))?;
        for key in open.keys.values().filter(|k| k.imported) {
            if let Err(err) = open.session.destroy_object(key.object) {
                debug!(error = %err, "could not destroy imported key at logout");
            }
        }
        // C_CloseSession runs when `open.session` drops.
        open.session.logout().map_err(ck(op))
    }

    fn mechanisms(&self, session: SessionHandle) -> ProviderResult<Vec<Algorithm>> {
        let op = ProviderOp::FindOrImportKey;
        let open = self.open_session(op, session)?;
        let list = self
            .context(op)?
            .get_mechanism_list(open.slot)
            .map_err(ck(op))?;
        if list.contains(&MechanismType::AES_GCM) {
            Ok(vec![Algorithm::Aes128Gcm, Algorithm::Aes192Gcm, Algorithm::Aes256Gcm])
        } else {
            Ok(Vec::new())
        }
    }

    fn find_or_import_key(
        &mut self,
        session: SessionHandle,
        key: KeyMaterial<'_>,
    ) -> ProviderResult<KeyHandle> {
        let op = ProviderOp::FindOrImportKey;
        let open = self.open_session(op, session)?;

        let entry = match key {
            KeyMaterial::Stored(locator) => {
                let by = match locator {
                    KeyLocator::Label(label) => Attribute::Label(label.as_bytes().to_vec()),
                    KeyLocator::Id(id) => Attribute::Id(id.clone()),
                };
                let template = [Attribute::Class(ObjectClass::SECRET_KEY), by];
                let object = open
                    .session
                    .find_objects(&template)
                    .map_err(ck(op))?
                    .into_iter()
                    .next()
                    .ok_or(ProviderError::new(op, ReturnCode::KEY_HANDLE_INVALID))?;
                KeyObject {
                    object,
                    imported: false,
                }
            }
            KeyMaterial::Import { algorithm, value } => {
                if value.len() != algorithm.key_len() {
                    return Err(ProviderError::new(op, ReturnCode::KEY_SIZE_RANGE));
                }
                let mut template = vec![
                    Attribute::Class(ObjectClass::SECRET_KEY),
                    Attribute::KeyType(KeyType::AES),
                    Attribute::Token(false),
                    Attribute::Private(true),
                    Attribute::Sensitive(true),
                    Attribute::Encrypt(true),
                    Attribute::Decrypt(true),
                    Attribute::Value(value.to_vec()),
                ];
                let created = open.session.create_object(&template);
                for attribute in &mut template {
                    if let Attribute::Value(bytes) = attribute {
                        bytes.zeroize();
                    }
                }
                KeyObject {
                    object: created.map_err(ck(op))?,
                    imported: true,
                }
            }
        };

        let handle = self.allocate_handle();
        if let Some(open) = self.sessions.get_mut(&session.0) {
            open.keys.insert(handle, entry);
        }
        Ok(KeyHandle(handle))
    }

    fn release_key(&mut self, session: SessionHandle, key: KeyHandle) -> ProviderResult<()> {
        let op = ProviderOp::ReleaseKey;
        self.context(op)?;
        let open = self
            .sessions
            .get_mut(&session.0)
            .ok_or(ProviderError::new(op, ReturnCode::SESSION_HANDLE_INVALID))?;
        let entry = open
            .keys
            .remove(&key.0)
            .ok_or(ProviderError::new(op, ReturnCode::OBJECT_HANDLE_INVALID))?;
        if entry.imported {
            open.session.destroy_object(entry.object).map_err(ck(op))?;
        }
        Ok(())
    }

    fn encrypt(
        &mut self,
        session: SessionHandle,
        key: KeyHandle,
        params: &GcmParams<'_>,
        plaintext: &[u8],
    ) -> ProviderResult<Vec<u8>> {
        let op = ProviderOp::Encrypt;
        let (session, object) = self.key_object(op, session, key)?;
        let mut iv = params.nonce.to_vec();
        let tag_bits = Ulong::from((params.tag_len * 8) as u64);
        let gcm = CkGcmParams::new(&mut iv, params.aad, tag_bits);
        session
            .encrypt(&Mechanism::AesGcm(gcm), object, plaintext)
            .map_err(ck(op))
    }

    fn decrypt(
        &mut self,
        session: SessionHandle,
        key: KeyHandle,
        params: &GcmParams<'_>,
        ciphertext_and_tag: &[u8],
    ) -> ProviderResult<Vec<u8>> {
        let op = ProviderOp::Decrypt;
        let (session, object) = self.key_object(op, session, key)?;
        let mut iv = params.nonce.to_vec();
        let tag_bits = Ulong::from((params.tag_len * 8) as u64);
        let gcm = CkGcmParams::new(&mut iv, params.aad, tag_bits);
        session
            .decrypt(&Mechanism::AesGcm(gcm), object, ciphertext_and_tag)
            .map_err(ck(op))
    }
}
