// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// tokenwerk-device — Token sessions exposed as crypto devices.
//
// A `ModuleHandle` loads a provider, a `Session` authenticates to one token
// on it, and the `DeviceRegistry` binds that session to a device id. All
// crypto flows through the `Dispatcher`, usually via an `AesGcm` context.

pub mod aead;
pub mod dispatch;
pub mod harness;
pub mod module;
pub mod registry;
pub mod session;

pub use aead::AesGcm;
pub use dispatch::{Dispatcher, validate};
pub use harness::{RoundTripReport, aes_gcm_round_trip};
pub use module::ModuleHandle;
pub use registry::{CryptoDevice, DeviceRegistry};
pub use session::Session;
