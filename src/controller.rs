use log::{debug, error, info, warn};
use tokio::sync::Mutex;

use crate::{
    backend::Backend,
    config::Configuration,
    desired::{self, BuildError},
    limiter::RateLimiter,
    metrics::{Counters, Metrics},
    reconcile::{Outcome, ReconcileError, ReconcileErrors},
    resource::{ManagedResource, ResourceSet},
    shutdown::ShutdownSignal,
    subscriber::IngressStore,
};

/// Keeps the load balancers of the backend in line with the ingresses of the store.
///
/// Each call to [`sync`](Self::sync) performs one pass:
/// wait for the rate limiter, bail out if shutting down, take the controller lock,
/// build the desired set, delete what disappeared and reconcile everything else.
/// At most one pass runs at a time, no matter how many callers there are.
pub struct Controller<S, B, M = Counters> {
    cfg: Configuration,
    store: S,
    backend: B,
    metrics: M,
    limiter: RateLimiter,
    shutdown: ShutdownSignal,
    /// The set committed by the last pass. Only touched while locked.
    running: Mutex<ResourceSet>,
}

impl<S, B, M> Controller<S, B, M>
where
    S: IngressStore,
    B: Backend,
    M: Metrics,
{
    pub fn new(
        cfg: Configuration,
        store: S,
        backend: B,
        metrics: M,
        shutdown: ShutdownSignal,
    ) -> Self {
        let limiter = RateLimiter::new(cfg.sync_rate_limit());
        Self {
            cfg,
            store,
            backend,
            metrics,
            limiter,
            shutdown,
            running: Mutex::new(ResourceSet::new()),
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.cfg
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn metrics(&self) -> &M {
        &self.metrics
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// A copy of the running set. Waits for an ongoing pass to finish.
    pub async fn running(&self) -> ResourceSet {
        self.running.lock().await.clone()
    }

    /// Runs one pass.
    ///
    /// Returns [`PassOutcome::Aborted`] without doing anything once shutdown has started.
    /// A pass that got past that check always runs to completion.
    ///
    /// A failing member does not stop the others from being reconciled;
    /// all failures of the pass are reported together.
    /// The running set is replaced by the desired set before any member is reconciled,
    /// so it reflects the new desired state even if reconciling fails.
    pub async fn sync(&self) -> Result<PassOutcome, SyncError> {
        let admitted = self.limiter.accept_or_cancelled(self.shutdown.token()).await;
        if !admitted || self.shutdown.is_shutting_down() {
            debug!("Shutting down, skipping sync");
            return Ok(PassOutcome::Aborted);
        }

        let mut running = self.running.lock().await;
        self.metrics.inc_reconcile_count();

        let result = self.pass(&mut running).await;
        match &result {
            Ok(PassOutcome::Committed(summary)) => debug!("Sync pass committed: {summary:?}"),
            Ok(PassOutcome::Aborted) => {}
            Err(err) => {
                self.metrics.inc_reconcile_error_count();
                error!("Sync pass failed: {err}");
            }
        }
        result
    }

    async fn pass(&self, running: &mut ResourceSet) -> Result<PassOutcome, SyncError> {
        let snapshot = self.store.snapshot();
        let desired = desired::build(&snapshot, &self.cfg, running)?;

        let mut removed = running.removed(&desired);
        *running = desired;
        self.metrics.set_managed_ingresses(&running.managed_by_namespace());

        let mut summary = PassSummary {
            removed: removed.len(),
            ..PassSummary::default()
        };
        let mut errors = Vec::new();

        for resource in removed.iter_mut() {
            info!(
                "Removing load balancer {} of ingress {}",
                resource.key(),
                resource.source()
            );
            self.reconcile_member(resource, &mut summary, &mut errors).await;
        }
        for resource in running.iter_mut() {
            resource.expire_applied(self.cfg.aws_sync_period());
            self.reconcile_member(resource, &mut summary, &mut errors).await;
        }

        match ReconcileErrors::new(errors) {
            Some(errors) => Err(SyncError::Reconcile(errors)),
            None => Ok(PassOutcome::Committed(summary)),
        }
    }

    async fn reconcile_member(
        &self,
        resource: &mut ManagedResource,
        summary: &mut PassSummary,
        errors: &mut Vec<ReconcileError>,
    ) {
        match resource.reconcile(&self.backend).await {
            Ok(outcome) => {
                if outcome != Outcome::Unchanged {
                    info!(
                        "Load balancer {} of ingress {} {outcome}",
                        resource.key(),
                        resource.source()
                    );
                }
                summary.record(outcome);
            }
            Err(err) => {
                warn!("Failed to reconcile ingress {}: {err}", resource.source());
                summary.failed += 1;
                errors.push(err);
            }
        }
    }
}

/// How a pass that returned successfully ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Shutdown had started; nothing was done.
    Aborted,
    Committed(PassSummary),
}

/// Counts of reconcile outcomes in one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Members that disappeared from the desired set.
    pub removed: usize,
    pub created: usize,
    pub adopted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub already_absent: usize,
    pub failed: usize,
}

impl PassSummary {
    fn record(&mut self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Unchanged => &mut self.unchanged,
            Outcome::Created => &mut self.created,
            Outcome::Adopted => &mut self.adopted,
            Outcome::Updated => &mut self.updated,
            Outcome::Deleted => &mut self.deleted,
            Outcome::AlreadyAbsent => &mut self.already_absent,
        };
        *counter += 1;
    }
}

/// The error type returned by [`Controller::sync`].
///
/// In either case the pass can simply be retried.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The desired set could not be built; the running set was left untouched.
    #[error("failed to build desired state")]
    Build(#[from] BuildError),
    /// Some members failed to reconcile; the running set was still replaced.
    #[error(transparent)]
    Reconcile(#[from] ReconcileErrors),
}
