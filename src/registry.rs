//! The subscription registry: a mutex-guarded id -> runner map enforcing uniqueness and the
//! live-subscription cap. Mutation slots live here too, so that an `unsubscribe` for a mutation's
//! id cancels it mid-flight.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;

use crate::{collaborators::Rerunner, error::ConnectionError};

/// Per-connection map from client-chosen id to live runner.
pub struct SubscriptionRegistry {
    entries: Mutex<HashMap<String, Arc<dyn Rerunner>>>,
    max_subscriptions: usize,
}

impl SubscriptionRegistry {
    /// Creates an empty registry capped at `max_subscriptions` live entries.
    pub fn new(max_subscriptions: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_subscriptions,
        }
    }

    /// Checks whether `id` could be inserted right now, without inserting it. Used to fail fast
    /// before parsing, preparing, or spawning a runner that would otherwise have to be torn down
    /// immediately if the later real [`Self::insert`] lost a race.
    pub async fn check_capacity(&self, id: &str) -> Result<(), ConnectionError> {
        let entries = self.entries.lock().await;
        if entries.contains_key(id) {
            return Err(ConnectionError::DuplicateSubscription);
        }
        if entries.len() >= self.max_subscriptions {
            return Err(ConnectionError::TooManySubscriptions);
        }
        Ok(())
    }

    /// Inserts `runner` under `id`. Fails if `id` is already live, or if the registry is already
    /// at capacity.
    pub async fn insert(&self, id: String, runner: Arc<dyn Rerunner>) -> Result<(), ConnectionError> {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(&id) {
            return Err(ConnectionError::DuplicateSubscription);
        }
        if entries.len() >= self.max_subscriptions {
            return Err(ConnectionError::TooManySubscriptions);
        }
        entries.insert(id, runner);
        Ok(())
    }

    /// Removes and stops the runner for `id`, if any. Never fails: `unsubscribe` is always a
    /// success, whether or not `id` was live.
    pub async fn remove(&self, id: &str) {
        let runner = self.entries.lock().await.remove(id);
        if let Some(runner) = runner {
            runner.stop().await;
        }
    }

    /// Stops every runner and empties the map. Used on connection teardown.
    pub async fn remove_all(&self) {
        let runners: Vec<_> = self.entries.lock().await.drain().map(|(_, r)| r).collect();
        for runner in runners {
            runner.stop().await;
        }
    }

    /// Forces an immediate rerun of every live runner.
    pub async fn rerun_all_immediately(&self) {
        let runners: Vec<_> = self.entries.lock().await.values().cloned().collect();
        for runner in runners {
            runner.rerun_immediately().await;
        }
    }

    /// The number of live entries.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// `true` when the registry holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[cfg(test)]
mod test {
    use futures::future::BoxFuture;

    use super::*;

    struct NoopRunner;

    impl Rerunner for NoopRunner {
        fn rerun_immediately<'a>(&'a self) -> BoxFuture<'a, ()> {
            Box::pin(async {})
        }

        fn stop<'a>(&'a self) -> BoxFuture<'a, ()> {
            Box::pin(async {})
        }
    }

    #[tokio::test]
    async fn rejects_duplicate_ids() {
        let registry = SubscriptionRegistry::new(200);
        registry.insert("a".into(), Arc::new(NoopRunner)).await.unwrap();
        let err = registry.insert("a".into(), Arc::new(NoopRunner)).await.unwrap_err();
        assert!(matches!(err, ConnectionError::DuplicateSubscription));
    }

    #[tokio::test]
    async fn enforces_the_cap() {
        let registry = SubscriptionRegistry::new(1);
        registry.insert("a".into(), Arc::new(NoopRunner)).await.unwrap();
        let err = registry.insert("b".into(), Arc::new(NoopRunner)).await.unwrap_err();
        assert!(matches!(err, ConnectionError::TooManySubscriptions));
    }

    #[tokio::test]
    async fn remove_all_empties_the_map() {
        let registry = SubscriptionRegistry::new(200);
        registry.insert("a".into(), Arc::new(NoopRunner)).await.unwrap();
        registry.insert("b".into(), Arc::new(NoopRunner)).await.unwrap();
        registry.remove_all().await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let registry = SubscriptionRegistry::new(200);
        registry.insert("a".into(), Arc::new(NoopRunner)).await.unwrap();
        registry.remove("a").await;
        registry.remove("a").await;
        assert_eq!(registry.len().await, 0);
    }
}
