// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Tokenwerk — token provider backends.
//!
//! This crate defines the `TokenProvider` trait that sessions drive, and the
//! backends that implement it: a dynamically loaded PKCS#11 library (behind
//! the `pkcs11` feature) and an in-process software token.

pub mod soft;
pub mod traits;

#[cfg(feature = "pkcs11")]
pub mod pkcs11;

#[cfg(not(feature = "pkcs11"))]
pub mod unavailable;

pub use soft::SoftProvider;
pub use traits::{GcmParams, KeyHandle, KeyMaterial, SessionHandle, TokenProvider};

/// Locator prefix selecting the software token.
pub const SOFT_LOCATOR: &str = "soft";

/// Whether `locator` names the built-in software token (`soft` or
/// `soft:<name>`).
pub fn is_soft_locator(locator: &str) -> bool {
    locator == SOFT_LOCATOR
        || locator
            .strip_prefix(SOFT_LOCATOR)
            .is_some_and(|rest| rest.starts_with(':'))
}

/// Select the provider backend for `locator`.
///
/// The provider is returned unopened; `open_provider` does the loading.
pub fn provider_for(locator: &str) -> Box<dyn TokenProvider> {
    if is_soft_locator(locator) {
        return Box::new(SoftProvider::new(locator));
    }

    #[cfg(feature = "pkcs11")]
    {
        Box::new(pkcs11::Pkcs11Provider::new(locator))
    }
    #[cfg(not(feature = "pkcs11"))]
    {
        Box::new(unavailable::UnavailableProvider::new(locator))
    }
}
