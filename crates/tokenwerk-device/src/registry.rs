// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Device registry — maps device ids to the handlers that service them.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokenwerk_core::error::{Result, TokenwerkError};
use tokenwerk_core::rv::ProviderResult;
use tokenwerk_core::types::{Algorithm, CryptoRequest, CryptoResult, DeviceId};
use tracing::{debug, info, instrument};

/// Anything that can service a crypto request on behalf of the dispatcher.
///
/// Implementations report raw provider failures; the dispatcher translates
/// them into the crate's error taxonomy.
pub trait CryptoDevice: Send + Sync {
    /// Short label for logs.
    fn describe(&self) -> String;

    /// Whether this device can serve `algorithm` at all.
    fn supports(&self, algorithm: Algorithm) -> bool;

    fn service_request(&self, request: &CryptoRequest<'_>) -> ProviderResult<CryptoResult>;
}

/// Process-wide table of registered devices.
///
/// Ids are unique: registering an id that is already bound fails rather
/// than replacing the existing handler.
#[derive(Default)]
pub struct DeviceRegistry {
    entries: RwLock<HashMap<DeviceId, Arc<dyn CryptoDevice>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<DeviceId, Arc<dyn CryptoDevice>>>> {
        self.entries
            .read()
            .map_err(|_| TokenwerkError::InvalidState("device registry lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<DeviceId, Arc<dyn CryptoDevice>>>> {
        self.entries
            .write()
            .map_err(|_| TokenwerkError::InvalidState("device registry lock poisoned".into()))
    }

    /// Bind `id` to `device`.
    #[instrument(skip_all, fields(%id))]
    pub fn register(&self, id: DeviceId, device: Arc<dyn CryptoDevice>) -> Result<()> {
        let mut entries = self.write()?;
        if entries.contains_key(&id) {
            return Err(TokenwerkError::DeviceAlreadyRegistered(id));
        }
        info!(device = %device.describe(), "device registered");
        entries.insert(id, device);
        Ok(())
    }

    /// Remove the binding for `id`. Returns `false` if nothing was bound.
    #[instrument(skip_all, fields(%id))]
    pub fn unregister(&self, id: DeviceId) -> Result<bool> {
        let removed = self.write()?.remove(&id).is_some();
        if removed {
            info!("device unregistered");
        } else {
            debug!("device was not registered");
        }
        Ok(removed)
    }

    pub fn lookup(&self, id: DeviceId) -> Result<Arc<dyn CryptoDevice>> {
        self.read()?
            .get(&id)
            .cloned()
            .ok_or(TokenwerkError::DeviceNotFound(id))
    }

    pub fn is_registered(&self, id: DeviceId) -> bool {
        self.read().map(|e| e.contains_key(&id)).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered ids in ascending order.
    pub fn device_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self
            .read()
            .map(|e| e.keys().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use tokenwerk_core::error::ErrorKind;
    use tokenwerk_core::rv::{ProviderError, ProviderOp, ReturnCode};

    use super::*;

    struct Named(&'static str);

    impl CryptoDevice for Named {
        fn describe(&self) -> String {
            self.0.to_owned()
        }

        fn supports(&self, _algorithm: Algorithm) -> bool {
            false
        }

        fn service_request(&self, _request: &CryptoRequest<'_>) -> ProviderResult<CryptoResult> {
            Err(ProviderError::new(ProviderOp::Encrypt, ReturnCode::FUNCTION_FAILED))
        }
    }

    #[test]
    fn register_lookup_unregister() {
        let registry = DeviceRegistry::new();
        assert!(registry.is_empty());

        registry.register(DeviceId(1), Arc::new(Named("first"))).unwrap();
        assert!(registry.is_registered(DeviceId(1)));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup(DeviceId(1)).unwrap().describe(), "first");

        assert!(registry.unregister(DeviceId(1)).unwrap());
        assert!(!registry.is_registered(DeviceId(1)));
        assert!(!registry.unregister(DeviceId(1)).unwrap());
    }

    #[test]
    fn duplicate_id_keeps_first_binding() {
        let registry = DeviceRegistry::new();
        registry.register(DeviceId(7), Arc::new(Named("first"))).unwrap();

        for name in ["second", "third", "fourth"] {
            let err = registry
                .register(DeviceId(7), Arc::new(Named(name)))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::DeviceAlreadyRegistered);
            assert_eq!(registry.lookup(DeviceId(7)).unwrap().describe(), "first");
            assert_eq!(registry.len(), 1);
        }

        assert!(registry.unregister(DeviceId(7)).unwrap());
        registry.register(DeviceId(7), Arc::new(Named("fresh"))).unwrap();
        assert_eq!(registry.lookup(DeviceId(7)).unwrap().describe(), "fresh");

        let err = registry
            .register(DeviceId(7), Arc::new(Named("late")))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceAlreadyRegistered);
        assert_eq!(registry.lookup(DeviceId(7)).unwrap().describe(), "fresh");
        assert_eq!(registry.device_ids(), vec![DeviceId(7)]);
    }

    #[test]
    fn lookup_of_unknown_id() {
        let registry = DeviceRegistry::new();
        let err = registry.lookup(DeviceId(3)).err().expect("lookup must fail");
        assert_eq!(err.kind(), ErrorKind::DeviceNotFound);
    }

    #[test]
    fn ids_are_sorted() {
        let registry = DeviceRegistry::new();
        for id in [5, 1, 3] {
            registry.register(DeviceId(id), Arc::new(Named("x"))).unwrap();
        }
        assert_eq!(
            registry.device_ids(),
            vec![DeviceId(1), DeviceId(3), DeviceId(5)]
        );
    }
}
