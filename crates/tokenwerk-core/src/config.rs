// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Runtime configuration.
//
// Everything has a default so the binary runs without a config file. When
// `TOKENWERK_CONFIG` names a JSON file, it is loaded instead.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{Result, TokenwerkError};
use crate::types::{DeviceId, SlotId};

/// Environment variable naming the JSON config file.
pub const CONFIG_ENV: &str = "TOKENWERK_CONFIG";

/// Process-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenwerkConfig {
    /// Device id the session is registered under.
    pub device_id: DeviceId,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Settings handed to the provider when the module is opened.
    pub provider: ProviderConfig,
}

impl Default for TokenwerkConfig {
    fn default() -> Self {
        Self {
            device_id: DeviceId(1),
            log_filter: "info".to_owned(),
            provider: ProviderConfig::default(),
        }
    }
}

impl TokenwerkConfig {
    /// Read a config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| TokenwerkError::Config(format!("{}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&raw)?;
        config.provider.validate()?;
        Ok(config)
    }

    /// Load from `TOKENWERK_CONFIG` if set, otherwise defaults.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_path(path),
            None => Ok(Self::default()),
        }
    }
}

/// Provider-specific options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Open read/write sessions. Some modules refuse to create session key
    /// objects in read-only sessions.
    pub read_write_sessions: bool,
    /// Tokens exposed by the built-in software provider.
    pub soft_tokens: Vec<SoftTokenConfig>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            read_write_sessions: true,
            soft_tokens: Vec::new(),
        }
    }
}

impl ProviderConfig {
    /// Check that soft token slots are unique and key material decodes.
    pub fn validate(&self) -> Result<()> {
        for (i, token) in self.soft_tokens.iter().enumerate() {
            if self.soft_tokens[..i].iter().any(|t| t.slot == token.slot) {
                return Err(TokenwerkError::Config(format!(
                    "soft token slot {} configured twice",
                    token.slot
                )));
            }
            for key in &token.keys {
                key.decode_id()?;
                let value = key.decode_value()?;
                if !matches!(value.len(), 16 | 24 | 32) {
                    return Err(TokenwerkError::Config(format!(
                        "soft key '{}' must be 16, 24 or 32 bytes, got {}",
                        key.label,
                        value.len()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// One token in the software provider.
#[derive(Clone, Serialize, Deserialize)]
pub struct SoftTokenConfig {
    pub slot: SlotId,
    pub label: String,
    pub user_pin: String,
    #[serde(default)]
    pub keys: Vec<SoftKeyConfig>,
}

impl fmt::Debug for SoftTokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftTokenConfig")
            .field("slot", &self.slot)
            .field("label", &self.label)
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

/// A persistent AES key stored on a software token.
#[derive(Clone, Serialize, Deserialize)]
pub struct SoftKeyConfig {
    pub label: String,
    /// Hex `CKA_ID`, empty when unset.
    #[serde(default)]
    pub id: String,
    /// Hex key value.
    pub value: String,
}

impl SoftKeyConfig {
    pub fn decode_id(&self) -> Result<Vec<u8>> {
        hex::decode(&self.id)
            .map_err(|e| TokenwerkError::Config(format!("soft key '{}' id: {e}", self.label)))
    }

    pub fn decode_value(&self) -> Result<Zeroizing<Vec<u8>>> {
        hex::decode(&self.value)
            .map(Zeroizing::new)
            .map_err(|e| TokenwerkError::Config(format!("soft key '{}' value: {e}", self.label)))
    }
}

impl fmt::Debug for SoftKeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftKeyConfig")
            .field("label", &self.label)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::error::ErrorKind;

    const SAMPLE: &str = r#"{
        "device_id": 3,
        "provider": {
            "soft_tokens": [{
                "slot": 0,
                "label": "demo",
                "user_pin": "1234",
                "keys": [{
                    "label": "aes",
                    "id": "01",
                    "value": "000102030405060708090a0b0c0d0e0f"
                }]
            }]
        }
    }"#;

    #[test]
    fn defaults_without_file() {
        let config = TokenwerkConfig::default();
        assert_eq!(config.device_id, DeviceId(1));
        assert_eq!(config.log_filter, "info");
        assert!(config.provider.read_write_sessions);
        assert!(config.provider.soft_tokens.is_empty());
    }

    #[test]
    fn loads_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = TokenwerkConfig::from_path(file.path()).unwrap();
        assert_eq!(config.device_id, DeviceId(3));
        assert_eq!(config.log_filter, "info");
        let token = &config.provider.soft_tokens[0];
        assert_eq!(token.slot, SlotId(0));
        assert_eq!(token.keys[0].decode_id().unwrap(), vec![1]);
        assert_eq!(token.keys[0].decode_value().unwrap().len(), 16);
    }

    #[test]
    fn missing_file_is_usage_error() {
        let err = TokenwerkConfig::from_path("/nonexistent/tokenwerk.json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UsageError);
    }

    #[test]
    fn rejects_bad_key_length() {
        let config = ProviderConfig {
            read_write_sessions: true,
            soft_tokens: vec![SoftTokenConfig {
                slot: SlotId(0),
                label: "demo".into(),
                user_pin: "1234".into(),
                keys: vec![SoftKeyConfig {
                    label: "short".into(),
                    id: String::new(),
                    value: "0011".into(),
                }],
            }],
        };
        assert!(matches!(config.validate(), Err(TokenwerkError::Config(_))));
    }

    #[test]
    fn rejects_duplicate_slots() {
        let token = SoftTokenConfig {
            slot: SlotId(4),
            label: "a".into(),
            user_pin: "1".into(),
            keys: Vec::new(),
        };
        let config = ProviderConfig {
            read_write_sessions: true,
            soft_tokens: vec![token.clone(), token],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_hides_pin_and_key_value() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = TokenwerkConfig::from_path(file.path()).unwrap();

        let rendered = format!("{config:?}");
        assert!(!rendered.contains("1234"));
        assert!(!rendered.contains("000102030405"));
    }

    #[test]
    fn demo_config_is_valid() {
        let raw = include_str!("../../../demos/soft-token.json");
        let config: TokenwerkConfig = serde_json::from_str(raw).unwrap();
        config.provider.validate().unwrap();
        assert_eq!(config.provider.soft_tokens[0].keys.len(), 2);
    }
}
