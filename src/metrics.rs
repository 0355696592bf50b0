use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex;

/// Receives the counters published by the sync loop.
pub trait Metrics: Send + Sync {
    /// A pass was admitted and is about to build the desired state.
    fn inc_reconcile_count(&self);

    /// A pass returned an error.
    fn inc_reconcile_error_count(&self);

    /// Number of managed ingresses per namespace after a committed pass.
    fn set_managed_ingresses(&self, _by_namespace: &BTreeMap<String, usize>) {}
}

/// In-process [`Metrics`] sink.
#[derive(Debug, Default)]
pub struct Counters {
    reconcile: AtomicU64,
    reconcile_errors: AtomicU64,
    managed: Mutex<BTreeMap<String, usize>>,
}

impl Counters {
    pub fn reconcile_count(&self) -> u64 {
        self.reconcile.load(Ordering::Relaxed)
    }

    pub fn reconcile_error_count(&self) -> u64 {
        self.reconcile_errors.load(Ordering::Relaxed)
    }

    pub fn managed_ingresses(&self) -> BTreeMap<String, usize> {
        self.managed.lock().clone()
    }
}

impl Metrics for Counters {
    fn inc_reconcile_count(&self) {
        self.reconcile.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_reconcile_error_count(&self) {
        self.reconcile_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn set_managed_ingresses(&self, by_namespace: &BTreeMap<String, usize>) {
        *self.managed.lock() = by_namespace.clone();
    }
}

impl<M: Metrics + ?Sized> Metrics for std::sync::Arc<M> {
    fn inc_reconcile_count(&self) {
        (**self).inc_reconcile_count();
    }

    fn inc_reconcile_error_count(&self) {
        (**self).inc_reconcile_error_count();
    }

    fn set_managed_ingresses(&self, by_namespace: &BTreeMap<String, usize>) {
        (**self).set_managed_ingresses(by_namespace);
    }
}
