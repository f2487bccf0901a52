use std::collections::HashMap;
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::Mutex;
use wasm_bindgen::prelude::*;

use crate::error::MeshError;

#[derive(Clone, Debug)]
pub struct CancellationToken {
    pub id: String,
    is_cancelled: Arc<Mutex<bool>>,
}

impl CancellationToken {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_cancelled: Arc::new(Mutex::new(false)),
        }
    }

    pub fn cancel(&self) {
        *self.is_cancelled.lock() = true;
    }

    pub fn is_cancelled(&self) -> bool {
        *self.is_cancelled.lock()
    }

    /// True when both handles come from the same `create_token` call.
    pub fn same_token(&self, other: &CancellationToken) -> bool {
        Arc::ptr_eq(&self.is_cancelled, &other.is_cancelled)
    }

    /// Fails with `MeshError::Cancelled` once `cancel` was called on any clone.
    pub fn check(&self) -> Result<(), MeshError> {
        if self.is_cancelled() {
            Err(MeshError::Cancelled(self.id.clone()))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
pub struct CancellationManager {
    tokens: HashMap<String, CancellationToken>,
}

impl CancellationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_token(&mut self, id: &str) -> CancellationToken {
        // A new request under a reused id supersedes the old one
        if let Some(existing) = self.tokens.get(id) {
            existing.cancel();
        }

        let token = CancellationToken::new(id);
        self.tokens.insert(id.to_string(), token.clone());
        token
    }

    pub fn cancel_token(&mut self, id: &str) -> bool {
        match self.tokens.get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn get_token(&self, id: &str) -> Option<&CancellationToken> {
        self.tokens.get(id)
    }

    pub fn cleanup_token(&mut self, id: &str) -> bool {
        self.tokens.remove(id).is_some()
    }

    /// Remove the entry for `token.id` only while it still holds `token`.
    /// A newer request that reused the id keeps its registration.
    pub fn cleanup_token_if(&mut self, token: &CancellationToken) -> bool {
        match self.tokens.get(&token.id) {
            Some(current) if current.same_token(token) => {
                self.tokens.remove(&token.id);
                true
            }
            _ => false,
        }
    }
}

lazy_static! {
    static ref GLOBAL_CANCELLATION_MANAGER: Mutex<CancellationManager> =
        Mutex::new(CancellationManager::new());
}

pub fn register_cancellation_token(id: &str) -> CancellationToken {
    GLOBAL_CANCELLATION_MANAGER.lock().create_token(id)
}

pub fn get_cancellation_token(id: &str) -> Option<CancellationToken> {
    GLOBAL_CANCELLATION_MANAGER.lock().get_token(id).cloned()
}

pub fn release_cancellation_token(token: &CancellationToken) -> bool {
    GLOBAL_CANCELLATION_MANAGER.lock().cleanup_token_if(token)
}

#[wasm_bindgen]
pub fn create_cancellation_token(id: &str) -> String {
    register_cancellation_token(id).id
}

/// Returns false when no operation with this id is registered.
#[wasm_bindgen]
pub fn cancel_operation(id: &str) -> bool {
    GLOBAL_CANCELLATION_MANAGER.lock().cancel_token(id)
}

#[wasm_bindgen]
pub fn cleanup_cancellation_token(id: &str) -> bool {
    GLOBAL_CANCELLATION_MANAGER.lock().cleanup_token(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancellationToken::new("job");
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert!(matches!(token.check(), Err(MeshError::Cancelled(id)) if id == "job"));
    }

    #[test]
    fn reusing_an_id_cancels_the_previous_token() {
        let mut manager = CancellationManager::new();
        let first = manager.create_token("export");
        let second = manager.create_token("export");
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert!(manager.cancel_token("export"));
        assert!(second.is_cancelled());
        assert!(manager.cleanup_token("export"));
        assert!(!manager.cancel_token("export"));
    }

    #[test]
    fn superseded_token_does_not_release_its_successor() {
        let mut manager = CancellationManager::new();
        let first = manager.create_token("export");
        let second = manager.create_token("export");
        assert!(!first.same_token(&second));

        assert!(!manager.cleanup_token_if(&first));
        assert!(manager.get_token("export").is_some());
        assert!(manager.cancel_token("export"));
        assert!(second.is_cancelled());

        assert!(manager.cleanup_token_if(&second));
        assert!(manager.get_token("export").is_none());
    }

    #[test]
    fn global_exports_reach_registered_tokens() {
        let token = register_cancellation_token("global-test-op");
        assert!(cancel_operation("global-test-op"));
        assert!(token.is_cancelled());
        assert!(get_cancellation_token("global-test-op").is_some());
        assert!(cleanup_cancellation_token("global-test-op"));
        assert!(get_cancellation_token("global-test-op").is_none());
    }
}
