// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Tokenwerk.

use thiserror::Error;

use crate::types::DeviceId;

/// Coarse classification of every failure Tokenwerk can report.
///
/// Provider-specific return codes are folded into one of these before they
/// leave the dispatch layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ProviderUnavailable,
    AuthenticationFailed,
    SlotNotFound,
    /// Operation on a closed module, logged-out session, or unset key.
    InvalidState,
    DeviceAlreadyRegistered,
    DeviceNotFound,
    /// Malformed buffer sizes or an algorithm the device cannot serve.
    InvalidRequest,
    /// Module-reported encrypt/decrypt/tag-verification failure.
    CryptoOperationFailed,
    UsageError,
}

/// Top-level error type for all Tokenwerk operations.
#[derive(Debug, Error)]
pub enum TokenwerkError {
    // -- Module / session lifecycle --
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("slot not found: {0}")]
    SlotNotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    // -- Device registry --
    #[error("device {0} is already registered")]
    DeviceAlreadyRegistered(DeviceId),

    #[error("device {0} is not registered")]
    DeviceNotFound(DeviceId),

    // -- Requests --
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("crypto operation failed: {0}")]
    CryptoOperationFailed(String),

    // -- Invocation / configuration --
    #[error("usage: {0}")]
    Usage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TokenwerkError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TokenwerkError::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            TokenwerkError::AuthenticationFailed(_) => ErrorKind::AuthenticationFailed,
            TokenwerkError::SlotNotFound(_) => ErrorKind::SlotNotFound,
            TokenwerkError::InvalidState(_) => ErrorKind::InvalidState,
            TokenwerkError::DeviceAlreadyRegistered(_) => ErrorKind::DeviceAlreadyRegistered,
            TokenwerkError::DeviceNotFound(_) => ErrorKind::DeviceNotFound,
            TokenwerkError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            TokenwerkError::CryptoOperationFailed(_) => ErrorKind::CryptoOperationFailed,
            TokenwerkError::Usage(_)
            | TokenwerkError::Config(_)
            | TokenwerkError::Serialization(_) => ErrorKind::UsageError,
        }
    }

    /// Build an error of the given kind carrying `detail`.
    ///
    /// Registry kinds have no free-form detail and cannot be built here;
    /// they fall back to `InvalidState`.
    pub fn from_kind(kind: ErrorKind, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        match kind {
            ErrorKind::ProviderUnavailable => TokenwerkError::ProviderUnavailable(detail),
            ErrorKind::AuthenticationFailed => TokenwerkError::AuthenticationFailed(detail),
            ErrorKind::SlotNotFound => TokenwerkError::SlotNotFound(detail),
            ErrorKind::InvalidRequest => TokenwerkError::InvalidRequest(detail),
            ErrorKind::CryptoOperationFailed => TokenwerkError::CryptoOperationFailed(detail),
            ErrorKind::UsageError => TokenwerkError::Usage(detail),
            ErrorKind::InvalidState
            | ErrorKind::DeviceAlreadyRegistered
            | ErrorKind::DeviceNotFound => TokenwerkError::InvalidState(detail),
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TokenwerkError>;
