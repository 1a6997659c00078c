// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// End-to-end tests for the `tokenwerk` binary against the software token.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

const PIN: &str = "s3cret-pin-4711";

fn tokenwerk() -> Command {
    let mut cmd = Command::cargo_bin("tokenwerk").expect("binary built");
    cmd.env_remove("TOKENWERK_CONFIG").env_remove("RUST_LOG");
    cmd
}

/// Config with one software token labelled `demo` in slot 0.
fn soft_config() -> NamedTempFile {
    let config = serde_json::json!({
        "device_id": 1,
        "log_filter": "debug",
        "provider": {
            "soft_tokens": [
                { "slot": 0, "label": "demo", "user_pin": PIN }
            ]
        }
    });
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(config.to_string().as_bytes())
        .expect("write config");
    file
}

#[test]
fn no_arguments_is_usage_error() {
    tokenwerk()
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "Usage: tokenwerk <libname> <slot> <tokenname> <userpin>",
        ));
}

#[test]
fn three_arguments_is_usage_error() {
    tokenwerk()
        .args(["soft", "0", "demo"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("expected 4 arguments, got 3"));
}

#[test]
fn non_integer_slot_is_usage_error() {
    tokenwerk()
        .args(["soft", "first", "demo", PIN])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("slot must be an integer"));
}

#[test]
fn round_trip_succeeds_on_soft_token() {
    let config = soft_config();
    tokenwerk()
        .env("TOKENWERK_CONFIG", config.path())
        .args(["soft", "0", "demo", PIN])
        .assert()
        .success()
        .stdout(predicate::str::contains("round trip ok"))
        .stdout(predicate::str::contains("33 bytes out, 16-byte tag"))
        .stderr(predicate::str::contains("Encrypt with AES128-GCM"))
        .stderr(predicate::str::contains("Decrypt with AES128-GCM"));
}

#[test]
fn pin_never_appears_in_output() {
    let config = soft_config();
    tokenwerk()
        .env("TOKENWERK_CONFIG", config.path())
        .args(["soft", "0", "demo", PIN])
        .assert()
        .success()
        .stdout(predicate::str::contains(PIN).not())
        .stderr(predicate::str::contains(PIN).not());
}

#[test]
fn unconfigured_soft_slot_is_runtime_error() {
    tokenwerk()
        .args(["soft", "0", "demo", PIN])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to find the PKCS#11 token."));
}

#[test]
fn wrong_pin_is_runtime_error() {
    let config = soft_config();
    tokenwerk()
        .env("TOKENWERK_CONFIG", config.path())
        .args(["soft", "0", "demo", "0000"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to log in to the token."));
}

#[test]
fn wrong_token_label_is_runtime_error() {
    let config = soft_config();
    tokenwerk()
        .env("TOKENWERK_CONFIG", config.path())
        .args(["soft", "0", "other", PIN])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to find the PKCS#11 token."));
}

#[test]
fn missing_library_is_runtime_error() {
    tokenwerk()
        .args(["/nonexistent/libpkcs11.so", "0", "demo", PIN])
        .assert()
        .code(2)
        .stderr(predicate::str::contains(
            "Failed to initialize the PKCS#11 library.",
        ));
}

#[test]
fn unreadable_config_is_usage_error() {
    tokenwerk()
        .env("TOKENWERK_CONFIG", "/nonexistent/tokenwerk.json")
        .args(["soft", "0", "demo", PIN])
        .assert()
        .code(1);
}
