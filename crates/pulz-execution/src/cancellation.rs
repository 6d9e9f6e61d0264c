use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Maps execution id -> cancel token. Guarded by its own lock so cancel
/// lookups and task spawn never contend with the store lock (`spec` §5
/// "Shared resources").
#[derive(Clone, Default)]
pub struct CancellationRegistry {
    tokens: Arc<RwLock<HashMap<String, CancellationToken>>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, execution_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens
            .write()
            .await
            .insert(execution_id.to_string(), token.clone());
        token
    }

    /// Fires the token for `execution_id` if one is registered. Returns
    /// `true` if a live token was found and cancelled, `false` if the
    /// execution was never registered or already finished (cancel is
    /// idempotent either way — `spec` §5).
    pub async fn cancel(&self, execution_id: &str) -> bool {
        if let Some(token) = self.tokens.read().await.get(execution_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    pub async fn remove(&self, execution_id: &str) {
        self.tokens.write().await.remove(execution_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_fires_registered_token() {
        let registry = CancellationRegistry::new();
        let token = registry.register("exec-1").await;
        assert!(!token.is_cancelled());
        assert!(registry.cancel("exec-1").await);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_unknown_execution_returns_false() {
        let registry = CancellationRegistry::new();
        assert!(!registry.cancel("missing").await);
    }

    #[tokio::test]
    async fn remove_drops_the_token() {
        let registry = CancellationRegistry::new();
        registry.register("exec-2").await;
        registry.remove("exec-2").await;
        assert!(!registry.cancel("exec-2").await);
    }
}
