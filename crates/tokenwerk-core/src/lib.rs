// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tokenwerk — Core types and error definitions shared across all crates.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod rv;
pub mod types;

pub use config::{ProviderConfig, SoftKeyConfig, SoftTokenConfig, TokenwerkConfig};
pub use diagnostics::{Diagnostic, diagnose};
pub use error::{ErrorKind, Result, TokenwerkError};
pub use rv::{ProviderError, ProviderOp, ProviderResult, ReturnCode};
pub use types::*;
