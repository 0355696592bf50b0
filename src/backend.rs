//! Boundary to the system that actually provisions load balancers.

use std::{error::Error, future::Future};

use crate::resource::{LoadBalancerSpec, ResourceKey};

/// A load balancer as reported by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadBalancerState {
    /// Backend identifier, e.g. an ARN.
    pub id: String,
    pub spec: LoadBalancerSpec,
}

/// Create, update and delete operations on load balancers, addressed by [`ResourceKey`].
///
/// Retries and timeouts of individual calls are the implementation's concern.
pub trait Backend: Send + Sync {
    type Error: Error + Send + Sync + 'static;

    /// Looks up the load balancer named by `key`.
    fn describe(
        &self,
        key: &ResourceKey,
    ) -> impl Future<Output = Result<Option<LoadBalancerState>, Self::Error>> + Send;

    fn create(
        &self,
        key: &ResourceKey,
        spec: &LoadBalancerSpec,
    ) -> impl Future<Output = Result<LoadBalancerState, Self::Error>> + Send;

    /// Brings the load balancer identified by `id` to `spec`.
    fn update(
        &self,
        id: &str,
        spec: &LoadBalancerSpec,
    ) -> impl Future<Output = Result<LoadBalancerState, Self::Error>> + Send;

    /// Deletes the load balancer named by `key`.
    ///
    /// Returns `false` if it did not exist.
    fn delete(&self, key: &ResourceKey) -> impl Future<Output = Result<bool, Self::Error>> + Send;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{
        collections::{BTreeMap, BTreeSet},
        sync::atomic::{AtomicUsize, Ordering},
    };

    use parking_lot::Mutex;
    use tokio::sync::{RwLock, RwLockWriteGuard};

    use super::{Backend, LoadBalancerState};
    use crate::resource::{LoadBalancerSpec, ResourceKey};

    #[derive(Debug, thiserror::Error)]
    #[error("injected failure for {0}")]
    pub(crate) struct FakeError(String);

    /// In-memory backend recording every call.
    #[derive(Default)]
    pub(crate) struct FakeBackend {
        lbs: Mutex<BTreeMap<ResourceKey, LoadBalancerState>>,
        failing: Mutex<BTreeSet<ResourceKey>>,
        calls: Mutex<Vec<String>>,
        hold: RwLock<()>,
        mutations: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl FakeBackend {
        pub(crate) fn seed(&self, key: &ResourceKey, spec: LoadBalancerSpec) {
            self.lbs.lock().insert(
                key.clone(),
                LoadBalancerState {
                    id: format!("arn:{key}"),
                    spec,
                },
            );
        }

        pub(crate) fn fail_on(&self, key: &ResourceKey) {
            self.failing.lock().insert(key.clone());
        }

        pub(crate) fn recover(&self, key: &ResourceKey) {
            self.failing.lock().remove(key);
        }

        /// Blocks every call after it was recorded until the guard is dropped.
        pub(crate) async fn pause(&self) -> RwLockWriteGuard<'_, ()> {
            self.hold.write().await
        }

        /// Calls in the form `"{operation} {key}"`, oldest first.
        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        pub(crate) fn keys(&self) -> Vec<ResourceKey> {
            self.lbs.lock().keys().cloned().collect()
        }

        /// Successful calls that changed a load balancer.
        pub(crate) fn mutations(&self) -> usize {
            self.mutations.load(Ordering::SeqCst)
        }

        /// The highest number of calls that were ever running at once.
        pub(crate) fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }

        async fn enter(&self, operation: &str, key: &ResourceKey) -> Result<(), FakeError> {
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);
            self.calls.lock().push(format!("{operation} {key}"));
            drop(self.hold.read().await);
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.lock().contains(key) {
                return Err(FakeError(key.to_string()));
            }
            Ok(())
        }
    }

    impl Backend for FakeBackend {
        type Error = FakeError;

        async fn describe(&self, key: &ResourceKey) -> Result<Option<LoadBalancerState>, FakeError> {
            self.enter("describe", key).await?;
            Ok(self.lbs.lock().get(key).cloned())
        }

        async fn create(
            &self,
            key: &ResourceKey,
            spec: &LoadBalancerSpec,
        ) -> Result<LoadBalancerState, FakeError> {
            self.enter("create", key).await?;
            let state = LoadBalancerState {
                id: format!("arn:{key}"),
                spec: spec.clone(),
            };
            self.lbs.lock().insert(key.clone(), state.clone());
            self.mutations.fetch_add(1, Ordering::SeqCst);
            Ok(state)
        }

        async fn update(
            &self,
            id: &str,
            spec: &LoadBalancerSpec,
        ) -> Result<LoadBalancerState, FakeError> {
            let key = ResourceKey::from(id.trim_start_matches("arn:"));
            self.enter("update", &key).await?;
            let mut lbs = self.lbs.lock();
            let state = lbs
                .get_mut(&key)
                .ok_or_else(|| FakeError(format!("{key} does not exist")))?;
            state.spec = spec.clone();
            self.mutations.fetch_add(1, Ordering::SeqCst);
            Ok(state.clone())
        }

        async fn delete(&self, key: &ResourceKey) -> Result<bool, FakeError> {
            self.enter("delete", key).await?;
            let deleted = self.lbs.lock().remove(key).is_some();
            if deleted {
                self.mutations.fetch_add(1, Ordering::SeqCst);
            }
            Ok(deleted)
        }
    }
}
