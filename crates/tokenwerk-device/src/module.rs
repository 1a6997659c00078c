// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Module handle — the loaded connection to one token provider.
//
// The provider sits behind a mutex shared with every session opened on this
// module. Closing takes the provider out of the mutex, so sessions that
// outlive the close see an uninitialised provider instead of a dangling one.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokenwerk_core::config::ProviderConfig;
use tokenwerk_core::error::{Result, TokenwerkError};
use tokenwerk_core::rv::{ProviderError, ProviderOp, ProviderResult, ReturnCode};
use tokenwerk_provider::{TokenProvider, provider_for};
use tracing::{debug, info, instrument, warn};

/// State shared between a module handle and its sessions.
pub(crate) struct ModuleShared {
    locator: String,
    provider_name: String,
    provider: Mutex<Option<Box<dyn TokenProvider>>>,
    open_sessions: AtomicUsize,
}

impl ModuleShared {
    pub(crate) fn locator(&self) -> &str {
        &self.locator
    }

    /// Run `f` against the provider while holding the module lock.
    ///
    /// A closed module or a poisoned lock reports `CRYPTOKI_NOT_INITIALIZED`
    /// for `op`.
    pub(crate) fn with_provider<T>(
        &self,
        op: ProviderOp,
        f: impl FnOnce(&mut dyn TokenProvider) -> ProviderResult<T>,
    ) -> ProviderResult<T> {
        let mut guard = self
            .provider
            .lock()
            .map_err(|_| ProviderError::new(op, ReturnCode::CRYPTOKI_NOT_INITIALIZED))?;
        match guard.as_mut() {
            Some(provider) => f(provider.as_mut()),
            None => Err(ProviderError::new(op, ReturnCode::CRYPTOKI_NOT_INITIALIZED)),
        }
    }

    pub(crate) fn session_opened(&self) {
        self.open_sessions.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn session_closed(&self) {
        self.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.provider.lock().map(|p| p.is_some()).unwrap_or(false)
    }

    /// Finalise the provider. Returns `false` if it was already closed.
    fn shutdown(&self) -> Result<bool> {
        let mut guard = self
            .provider
            .lock()
            .map_err(|_| TokenwerkError::InvalidState("module lock poisoned".into()))?;
        let Some(mut provider) = guard.take() else {
            return Ok(false);
        };
        provider.close_provider().map_err(TokenwerkError::from)?;
        Ok(true)
    }
}

/// An opened token provider.
///
/// Exclusively owned by the caller. Sessions hold a shared reference to the
/// provider, not to the handle, and must be logged out before `close`.
pub struct ModuleHandle {
    shared: Arc<ModuleShared>,
}

impl ModuleHandle {
    /// Load and initialise the provider named by `locator`.
    #[instrument(skip_all, fields(%locator))]
    pub fn open(locator: &str, config: &ProviderConfig) -> Result<Self> {
        Self::open_with(locator, provider_for(locator), config)
    }

    /// Open an already constructed provider under `locator`.
    pub(crate) fn open_with(
        locator: &str,
        mut provider: Box<dyn TokenProvider>,
        config: &ProviderConfig,
    ) -> Result<Self> {
        provider.open_provider(config).map_err(|err| {
            warn!(code = %err.code, "provider open failed");
            TokenwerkError::ProviderUnavailable(format!("{locator}: {err}"))
        })?;

        let provider_name = provider.name().to_owned();
        info!(provider = %provider_name, "module opened");
        Ok(Self {
            shared: Arc::new(ModuleShared {
                locator: locator.to_owned(),
                provider_name,
                provider: Mutex::new(Some(provider)),
                open_sessions: AtomicUsize::new(0),
            }),
        })
    }

    /// Finalise the provider.
    ///
    /// Fails with `InvalidState` while sessions are still logged in. Closing
    /// an already closed module is a no-op.
    #[instrument(skip(self), fields(locator = %self.shared.locator))]
    pub fn close(&self) -> Result<()> {
        let live = self.open_sessions();
        if live > 0 && self.is_open() {
            return Err(TokenwerkError::InvalidState(format!(
                "{live} session(s) still logged in"
            )));
        }
        if self.shared.shutdown()? {
            info!("module closed");
        } else {
            debug!("module already closed");
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    /// Number of sessions currently logged in through this module.
    pub fn open_sessions(&self) -> usize {
        self.shared.open_sessions.load(Ordering::SeqCst)
    }

    pub fn locator(&self) -> &str {
        &self.shared.locator
    }

    pub fn provider_name(&self) -> &str {
        &self.shared.provider_name
    }

    pub(crate) fn shared(&self) -> Arc<ModuleShared> {
        Arc::clone(&self.shared)
    }
}

impl Drop for ModuleHandle {
    fn drop(&mut self) {
        if !self.is_open() {
            return;
        }
        let live = self.open_sessions();
        if live > 0 {
            warn!(locator = %self.shared.locator, live, "module dropped with sessions logged in");
        }
        if let Err(e) = self.shared.shutdown() {
            warn!(error = %e, "module close on drop failed");
        }
    }
}
