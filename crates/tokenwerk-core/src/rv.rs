// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Provider return codes and their translation into `ErrorKind`.
//
// Providers report failures as PKCS#11 style `CKR_*` values. Only the
// dispatch and session layers look at these; callers above them see
// `TokenwerkError` exclusively.

use std::fmt;

use crate::error::{ErrorKind, TokenwerkError};

/// A PKCS#11 `CK_RV` value as reported by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReturnCode(pub u64);

impl ReturnCode {
    pub const OK: Self = Self(0x0000_0000);
    pub const HOST_MEMORY: Self = Self(0x0000_0002);
    pub const SLOT_ID_INVALID: Self = Self(0x0000_0003);
    pub const GENERAL_ERROR: Self = Self(0x0000_0005);
    pub const FUNCTION_FAILED: Self = Self(0x0000_0006);
    pub const ARGUMENTS_BAD: Self = Self(0x0000_0007);
    pub const DATA_INVALID: Self = Self(0x0000_0020);
    pub const DATA_LEN_RANGE: Self = Self(0x0000_0021);
    pub const DEVICE_ERROR: Self = Self(0x0000_0030);
    pub const DEVICE_REMOVED: Self = Self(0x0000_0032);
    pub const ENCRYPTED_DATA_INVALID: Self = Self(0x0000_0040);
    pub const ENCRYPTED_DATA_LEN_RANGE: Self = Self(0x0000_0041);
    pub const FUNCTION_NOT_SUPPORTED: Self = Self(0x0000_0054);
    pub const KEY_HANDLE_INVALID: Self = Self(0x0000_0060);
    pub const KEY_SIZE_RANGE: Self = Self(0x0000_0062);
    pub const KEY_TYPE_INCONSISTENT: Self = Self(0x0000_0063);
    pub const MECHANISM_INVALID: Self = Self(0x0000_0070);
    pub const MECHANISM_PARAM_INVALID: Self = Self(0x0000_0071);
    pub const OBJECT_HANDLE_INVALID: Self = Self(0x0000_0082);
    pub const PIN_INCORRECT: Self = Self(0x0000_00A0);
    pub const PIN_INVALID: Self = Self(0x0000_00A1);
    pub const PIN_LEN_RANGE: Self = Self(0x0000_00A2);
    pub const PIN_EXPIRED: Self = Self(0x0000_00A3);
    pub const PIN_LOCKED: Self = Self(0x0000_00A4);
    pub const SESSION_CLOSED: Self = Self(0x0000_00B0);
    pub const SESSION_HANDLE_INVALID: Self = Self(0x0000_00B3);
    pub const TOKEN_NOT_PRESENT: Self = Self(0x0000_00E0);
    pub const TOKEN_NOT_RECOGNIZED: Self = Self(0x0000_00E1);
    pub const USER_ALREADY_LOGGED_IN: Self = Self(0x0000_0100);
    pub const USER_NOT_LOGGED_IN: Self = Self(0x0000_0101);
    pub const USER_PIN_NOT_INITIALIZED: Self = Self(0x0000_0102);
    pub const CRYPTOKI_NOT_INITIALIZED: Self = Self(0x0000_0190);
    pub const CRYPTOKI_ALREADY_INITIALIZED: Self = Self(0x0000_0191);
    /// Vendor range: the provider library could not be loaded at all.
    pub const LIBRARY_LOAD_FAILED: Self = Self(0x8000_0001);

    /// Symbolic `CKR_*` name, for debug logging.
    pub fn name(self) -> &'static str {
        match self {
            Self::OK => "CKR_OK",
            Self::HOST_MEMORY => "CKR_HOST_MEMORY",
            Self::SLOT_ID_INVALID => "CKR_SLOT_ID_INVALID",
            Self::GENERAL_ERROR => "CKR_GENERAL_ERROR",
            Self::FUNCTION_FAILED => "CKR_FUNCTION_FAILED",
            Self::ARGUMENTS_BAD => "CKR_ARGUMENTS_BAD",
            Self::DATA_INVALID => "CKR_DATA_INVALID",
            Self::DATA_LEN_RANGE => "CKR_DATA_LEN_RANGE",
            Self::DEVICE_ERROR => "CKR_DEVICE_ERROR",
            Self::DEVICE_REMOVED => "CKR_DEVICE_REMOVED",
            Self::ENCRYPTED_DATA_INVALID => "CKR_ENCRYPTED_DATA_INVALID",
            Self::ENCRYPTED_DATA_LEN_RANGE => "CKR_ENCRYPTED_DATA_LEN_RANGE",
            Self::FUNCTION_NOT_SUPPORTED => "CKR_FUNCTION_NOT_SUPPORTED",
            Self::KEY_HANDLE_INVALID => "CKR_KEY_HANDLE_INVALID",
            Self::KEY_SIZE_RANGE => "CKR_KEY_SIZE_RANGE",
            Self::KEY_TYPE_INCONSISTENT => "CKR_KEY_TYPE_INCONSISTENT",
            Self::MECHANISM_INVALID => "CKR_MECHANISM_INVALID",
            Self::MECHANISM_PARAM_INVALID => "CKR_MECHANISM_PARAM_INVALID",
            Self::OBJECT_HANDLE_INVALID => "CKR_OBJECT_HANDLE_INVALID",
            Self::PIN_INCORRECT => "CKR_PIN_INCORRECT",
            Self::PIN_INVALID => "CKR_PIN_INVALID",
            Self::PIN_LEN_RANGE => "CKR_PIN_LEN_RANGE",
            Self::PIN_EXPIRED => "CKR_PIN_EXPIRED",
            Self::PIN_LOCKED => "CKR_PIN_LOCKED",
            Self::SESSION_CLOSED => "CKR_SESSION_CLOSED",
            Self::SESSION_HANDLE_INVALID => "CKR_SESSION_HANDLE_INVALID",
            Self::TOKEN_NOT_PRESENT => "CKR_TOKEN_NOT_PRESENT",
            Self::TOKEN_NOT_RECOGNIZED => "CKR_TOKEN_NOT_RECOGNIZED",
            Self::USER_ALREADY_LOGGED_IN => "CKR_USER_ALREADY_LOGGED_IN",
            Self::USER_NOT_LOGGED_IN => "CKR_USER_NOT_LOGGED_IN",
            Self::USER_PIN_NOT_INITIALIZED => "CKR_USER_PIN_NOT_INITIALIZED",
            Self::CRYPTOKI_NOT_INITIALIZED => "CKR_CRYPTOKI_NOT_INITIALIZED",
            Self::CRYPTOKI_ALREADY_INITIALIZED => "CKR_CRYPTOKI_ALREADY_INITIALIZED",
            Self::LIBRARY_LOAD_FAILED => "library load failed",
            _ => "CKR_VENDOR_DEFINED",
        }
    }

    /// Plain description without the numeric value.
    fn describe(self) -> &'static str {
        match self {
            Self::SLOT_ID_INVALID => "no such slot",
            Self::TOKEN_NOT_PRESENT | Self::TOKEN_NOT_RECOGNIZED => "token not present",
            Self::PIN_INCORRECT | Self::PIN_INVALID | Self::PIN_LEN_RANGE => "credential rejected",
            Self::PIN_EXPIRED => "credential expired",
            Self::PIN_LOCKED => "credential locked",
            Self::USER_PIN_NOT_INITIALIZED => "user credential not initialised",
            Self::USER_ALREADY_LOGGED_IN => "user already logged in",
            Self::USER_NOT_LOGGED_IN => "not logged in",
            Self::SESSION_CLOSED | Self::SESSION_HANDLE_INVALID => "session is closed",
            Self::CRYPTOKI_NOT_INITIALIZED => "provider is not initialised",
            Self::CRYPTOKI_ALREADY_INITIALIZED => "provider already initialised",
            Self::ENCRYPTED_DATA_INVALID | Self::ENCRYPTED_DATA_LEN_RANGE => {
                "authentication tag did not verify"
            }
            Self::KEY_HANDLE_INVALID | Self::OBJECT_HANDLE_INVALID => "key object not found",
            Self::KEY_SIZE_RANGE | Self::KEY_TYPE_INCONSISTENT => "key unsuitable for mechanism",
            Self::MECHANISM_INVALID | Self::MECHANISM_PARAM_INVALID => "mechanism not supported",
            Self::DATA_INVALID | Self::DATA_LEN_RANGE | Self::ARGUMENTS_BAD => {
                "request rejected by provider"
            }
            Self::DEVICE_ERROR | Self::DEVICE_REMOVED => "device failure",
            Self::HOST_MEMORY => "out of memory",
            Self::FUNCTION_NOT_SUPPORTED => "function not supported",
            Self::LIBRARY_LOAD_FAILED => "library could not be loaded",
            _ => "provider failure",
        }
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.name(), self.0)
    }
}

/// The provider entry point that produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderOp {
    OpenProvider,
    CloseProvider,
    Login,
    Logout,
    FindOrImportKey,
    ReleaseKey,
    Encrypt,
    Decrypt,
}

impl fmt::Display for ProviderOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderOp::OpenProvider => "open provider",
            ProviderOp::CloseProvider => "close provider",
            ProviderOp::Login => "login",
            ProviderOp::Logout => "logout",
            ProviderOp::FindOrImportKey => "key lookup",
            ProviderOp::ReleaseKey => "key release",
            ProviderOp::Encrypt => "encrypt",
            ProviderOp::Decrypt => "decrypt",
        };
        f.write_str(name)
    }
}

/// A raw provider failure: which call failed and with what code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderError {
    pub op: ProviderOp,
    pub code: ReturnCode,
}

impl ProviderError {
    pub fn new(op: ProviderOp, code: ReturnCode) -> Self {
        Self { op, code }
    }

    /// Classify this failure. The same code means different things at
    /// different stages, so the table is keyed on the operation first.
    pub fn kind(&self) -> ErrorKind {
        let code = self.code;
        match self.op {
            ProviderOp::OpenProvider => ErrorKind::ProviderUnavailable,

            ProviderOp::Login => match code {
                ReturnCode::SLOT_ID_INVALID
                | ReturnCode::TOKEN_NOT_PRESENT
                | ReturnCode::TOKEN_NOT_RECOGNIZED => ErrorKind::SlotNotFound,
                ReturnCode::CRYPTOKI_NOT_INITIALIZED => ErrorKind::InvalidState,
                ReturnCode::DEVICE_ERROR
                | ReturnCode::DEVICE_REMOVED
                | ReturnCode::LIBRARY_LOAD_FAILED => ErrorKind::ProviderUnavailable,
                _ => ErrorKind::AuthenticationFailed,
            },

            ProviderOp::FindOrImportKey
            | ProviderOp::ReleaseKey
            | ProviderOp::Encrypt
            | ProviderOp::Decrypt => match code {
                ReturnCode::CRYPTOKI_NOT_INITIALIZED
                | ReturnCode::SESSION_CLOSED
                | ReturnCode::SESSION_HANDLE_INVALID
                | ReturnCode::USER_NOT_LOGGED_IN => ErrorKind::InvalidState,
                _ => ErrorKind::CryptoOperationFailed,
            },

            ProviderOp::Logout | ProviderOp::CloseProvider => ErrorKind::InvalidState,
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.op, self.code.describe())
    }
}

impl std::error::Error for ProviderError {}

/// Fold a provider failure into the unified taxonomy. The message keeps the
/// operation and a plain description; the numeric code is dropped.
impl From<ProviderError> for TokenwerkError {
    fn from(err: ProviderError) -> Self {
        TokenwerkError::from_kind(err.kind(), err.to_string())
    }
}

/// Alias for provider-facing results.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;
