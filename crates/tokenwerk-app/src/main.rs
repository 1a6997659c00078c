// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tokenwerk — command-line entry point.
//
// `tokenwerk <libname> <slot> <tokenname> <userpin>` opens the provider,
// logs in to the token, registers the session as a crypto device, runs one
// AES-128-GCM round trip through it, and tears everything down again.

use std::process::ExitCode;
use std::sync::Arc;

use tokenwerk_core::diagnostics::EXIT_SUCCESS;
use tokenwerk_core::{Credential, Result, SlotId, TokenwerkConfig, TokenwerkError, diagnose};
use tokenwerk_device::{
    DeviceRegistry, Dispatcher, ModuleHandle, RoundTripReport, Session, aes_gcm_round_trip,
};
use zeroize::Zeroizing;

/// Parsed positional arguments.
struct Invocation {
    library: String,
    slot: SlotId,
    token_name: String,
    pin: Credential,
}

impl Invocation {
    /// Consume the raw arguments. Every argument is wiped on drop and the PIN
    /// buffer moves into the credential without being copied.
    fn parse(args: Vec<String>) -> Result<Self> {
        let mut args: Vec<Zeroizing<String>> = args.into_iter().map(Zeroizing::new).collect();
        if args.len() != 4 {
            return Err(TokenwerkError::Usage(format!(
                "expected 4 arguments, got {}",
                args.len()
            )));
        }
        let slot = args[1].parse::<u64>().map(SlotId).map_err(|_| {
            TokenwerkError::Usage(format!("slot must be an integer, got {:?}", args[1].as_str()))
        })?;
        Ok(Self {
            library: args[0].as_str().to_owned(),
            slot,
            token_name: args[2].as_str().to_owned(),
            pin: take_pin(&mut args[3]),
        })
    }
}

/// Move the PIN out of `arg`, leaving it empty.
fn take_pin(arg: &mut Zeroizing<String>) -> Credential {
    Credential::new(std::mem::take(&mut **arg).into_bytes())
}

fn main() -> ExitCode {
    let invocation = match Invocation::parse(std::env::args().skip(1).collect()) {
        Ok(invocation) => invocation,
        Err(e) => return fail(&e),
    };
    let config = match TokenwerkConfig::from_env() {
        Ok(config) => config,
        Err(e) => return fail(&e),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(library = %invocation.library, slot = %invocation.slot, "Tokenwerk starting");

    match run(invocation, &config) {
        Ok(report) => {
            println!(
                "AES128-GCM round trip ok: {} bytes in, {} bytes out, {}-byte tag",
                report.plaintext_len, report.ciphertext_len, report.tag_len
            );
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => fail(&e),
    }
}

/// Open, log in, register, round-trip, then tear down in reverse.
///
/// Early returns leave teardown to `Drop`. The session is declared after the
/// module, so it is dropped first.
fn run(invocation: Invocation, config: &TokenwerkConfig) -> Result<RoundTripReport> {
    let Invocation {
        library,
        slot,
        token_name,
        pin,
    } = invocation;

    let module = ModuleHandle::open(&library, &config.provider)?;
    let session = Arc::new(Session::login(&module, slot, &token_name, pin)?);

    let registry = Arc::new(DeviceRegistry::new());
    registry.register(config.device_id, session.clone())?;
    let dispatcher = Dispatcher::new(Arc::clone(&registry));

    let outcome = aes_gcm_round_trip(&dispatcher, config.device_id);

    let teardown = registry
        .unregister(config.device_id)
        .and_then(|_| session.logout())
        .and_then(|_| module.close());

    let report = outcome?;
    teardown?;
    Ok(report)
}

fn fail(err: &TokenwerkError) -> ExitCode {
    let diagnostic = diagnose(err);
    tracing::debug!(kind = ?err.kind(), "exiting with status {}", diagnostic.exit_status);
    eprintln!("{}", diagnostic.message);
    eprintln!("{}", diagnostic.suggestion);
    ExitCode::from(diagnostic.exit_status)
}
