use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::scope::Authorization;

/// Registry of issued bearer tokens.
///
/// Entries live until the process exits; nothing is evicted or persisted.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert(&self, authorization: Authorization);

    async fn lookup(&self, bearer_token: &str) -> Option<Authorization>;
}

#[derive(Clone, Default)]
pub struct InMemoryTokenStore {
    authorizations: Arc<RwLock<HashMap<String, Authorization>>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn insert(&self, authorization: Authorization) {
        self.authorizations
            .write()
            .await
            .insert(authorization.bearer_token.clone(), authorization);
    }

    async fn lookup(&self, bearer_token: &str) -> Option<Authorization> {
        self.authorizations.read().await.get(bearer_token).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Scope;

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let store = InMemoryTokenStore::new();
        let authorization = Authorization {
            username: "alice".into(),
            client_id: "notes.example".into(),
            scopes: vec![Scope::new("documents", true)],
            bearer_token: "abcdefghij".into(),
        };

        assert_eq!(store.lookup("abcdefghij").await, None);

        store.insert(authorization.clone()).await;
        assert_eq!(store.lookup("abcdefghij").await, Some(authorization));
        assert_eq!(store.lookup("ABCDEFGHIJ").await, None);
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let store = InMemoryTokenStore::new();
        let shared = store.clone();

        store
            .insert(Authorization {
                username: "bob".into(),
                client_id: "c".into(),
                scopes: Vec::new(),
                bearer_token: "t0k3n".into(),
            })
            .await;

        assert!(shared.lookup("t0k3n").await.is_some());
    }
}
