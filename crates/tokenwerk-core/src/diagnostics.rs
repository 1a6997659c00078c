// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Operator-facing diagnostics and process exit statuses.
//
// Each error kind maps to a short statement of what went wrong plus what to
// check next. The exit status separates bad invocations from failed
// operations.

use crate::error::{ErrorKind, TokenwerkError};

/// Exit status for a successful run.
pub const EXIT_SUCCESS: u8 = 0;
/// Exit status for a malformed invocation or configuration.
pub const EXIT_USAGE: u8 = 1;
/// Exit status for any module, session, registry or crypto failure.
pub const EXIT_RUNTIME: u8 = 2;

impl ErrorKind {
    pub fn exit_status(self) -> u8 {
        match self {
            ErrorKind::UsageError => EXIT_USAGE,
            _ => EXIT_RUNTIME,
        }
    }
}

/// A diagnostic ready to print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub suggestion: String,
    pub exit_status: u8,
}

/// Describe `err` for the operator.
pub fn diagnose(err: &TokenwerkError) -> Diagnostic {
    let kind = err.kind();
    let (message, suggestion) = match kind {
        ErrorKind::ProviderUnavailable => (
            "Failed to initialize the PKCS#11 library.",
            "Check the library path and that the module's own configuration is in place.",
        ),
        ErrorKind::AuthenticationFailed => (
            "Failed to log in to the token.",
            "Check the user PIN. Repeated failures may lock the token.",
        ),
        ErrorKind::SlotNotFound => (
            "Failed to find the PKCS#11 token.",
            "Check the slot number and token label against the module's slot list.",
        ),
        ErrorKind::InvalidState => (
            "The module or session was used after it was closed.",
            "Make sure teardown happens only after all operations finish.",
        ),
        ErrorKind::DeviceAlreadyRegistered => (
            "Failed to register the PKCS#11 token.",
            "Another device already uses this device id; pick a different one.",
        ),
        ErrorKind::DeviceNotFound => (
            "No device is registered under this id.",
            "Register the session before issuing operations.",
        ),
        ErrorKind::InvalidRequest => (
            "The request was malformed.",
            "Key, nonce and tag sizes must match the algorithm.",
        ),
        ErrorKind::CryptoOperationFailed => (
            "The cryptographic operation failed.",
            "The token rejected the operation or the data did not authenticate.",
        ),
        ErrorKind::UsageError => (
            "Invalid invocation.",
            "Usage: tokenwerk <libname> <slot> <tokenname> <userpin>",
        ),
    };

    Diagnostic {
        message: format!("{message} ({err})"),
        suggestion: suggestion.to_owned(),
        exit_status: kind.exit_status(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeviceId;

    #[test]
    fn usage_and_runtime_statuses_differ() {
        assert_eq!(ErrorKind::UsageError.exit_status(), EXIT_USAGE);
        for kind in [
            ErrorKind::ProviderUnavailable,
            ErrorKind::AuthenticationFailed,
            ErrorKind::SlotNotFound,
            ErrorKind::InvalidState,
            ErrorKind::DeviceAlreadyRegistered,
            ErrorKind::DeviceNotFound,
            ErrorKind::InvalidRequest,
            ErrorKind::CryptoOperationFailed,
        ] {
            assert_eq!(kind.exit_status(), EXIT_RUNTIME, "{kind:?}");
        }
        assert_ne!(EXIT_USAGE, EXIT_SUCCESS);
        assert_ne!(EXIT_RUNTIME, EXIT_SUCCESS);
    }

    #[test]
    fn registration_collision_mentions_register() {
        let diag = diagnose(&TokenwerkError::DeviceAlreadyRegistered(DeviceId(1)));
        assert!(diag.message.starts_with("Failed to register"));
        assert!(diag.message.contains("device 1"));
        assert_eq!(diag.exit_status, EXIT_RUNTIME);
    }

    #[test]
    fn usage_diagnostic_carries_usage_line() {
        let diag = diagnose(&TokenwerkError::Usage("expected 4 arguments".into()));
        assert!(diag.suggestion.contains("<libname> <slot> <tokenname> <userpin>"));
        assert_eq!(diag.exit_status, EXIT_USAGE);
    }
}
