//! Drives a single managed resource toward its desired state.

use std::{error::Error, fmt, time::Duration};

use tokio::time::Instant;

use crate::{
    backend::{Backend, LoadBalancerState},
    resource::{AppliedState, LoadBalancerSpec, ManagedResource, ResourceKey},
};

/// What a reconcile did to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The applied state already matched; no backend call was made.
    Unchanged,
    Created,
    /// An existing load balancer already matched and was taken over.
    Adopted,
    Updated,
    Deleted,
    /// Deletion found nothing to delete.
    AlreadyAbsent,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unchanged => "unchanged",
            Self::Created => "created",
            Self::Adopted => "adopted",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::AlreadyAbsent => "already absent",
        })
    }
}

/// The backend operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Describe,
    Create,
    Update,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Describe => "describe",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

impl ManagedResource {
    /// Applies the difference between the desired and the last applied state.
    ///
    /// Calling this again after success is a no-op on the backend.
    /// Members marked for deletion are deleted, and a load balancer that is already gone counts as deleted.
    pub async fn reconcile<B: Backend>(&mut self, backend: &B) -> Result<Outcome, ReconcileError> {
        let Some(desired) = &self.desired else {
            let deleted = backend
                .delete(self.key())
                .await
                .map_err(failed(self.key(), Action::Delete))?;
            self.applied = None;
            return Ok(if deleted {
                Outcome::Deleted
            } else {
                Outcome::AlreadyAbsent
            });
        };

        let (state, outcome) = match &self.applied {
            Some(applied) if applied.spec == *desired => return Ok(Outcome::Unchanged),
            Some(applied) => (
                update(backend, self.key(), &applied.id, desired).await?,
                Outcome::Updated,
            ),
            None => {
                let existing = backend
                    .describe(self.key())
                    .await
                    .map_err(failed(self.key(), Action::Describe))?;
                match existing {
                    Some(state) if state.spec == *desired => (state, Outcome::Adopted),
                    Some(state) => (
                        update(backend, self.key(), &state.id, desired).await?,
                        Outcome::Updated,
                    ),
                    None => (
                        backend
                            .create(self.key(), desired)
                            .await
                            .map_err(failed(self.key(), Action::Create))?,
                        Outcome::Created,
                    ),
                }
            }
        };

        self.applied = Some(AppliedState {
            id: state.id,
            spec: desired.clone(),
            observed_at: Instant::now(),
        });
        Ok(outcome)
    }

    /// Forgets the applied state once the backend last confirmed it `max_age` ago or earlier,
    /// so that the next [`reconcile`](Self::reconcile) describes the load balancer again
    /// and repairs any drift.
    pub fn expire_applied(&mut self, max_age: Duration) {
        if self
            .applied
            .as_ref()
            .is_some_and(|applied| applied.observed_at.elapsed() >= max_age)
        {
            self.applied = None;
        }
    }
}

async fn update<B: Backend>(
    backend: &B,
    key: &ResourceKey,
    id: &str,
    spec: &LoadBalancerSpec,
) -> Result<LoadBalancerState, ReconcileError> {
    backend
        .update(id, spec)
        .await
        .map_err(failed(key, Action::Update))
}

fn failed<E: Error + Send + Sync + 'static>(
    key: &ResourceKey,
    action: Action,
) -> impl FnOnce(E) -> ReconcileError + '_ {
    move |err| ReconcileError {
        key: key.clone(),
        action,
        source: Box::new(err),
    }
}

/// A backend failure while reconciling one load balancer.
#[derive(Debug, thiserror::Error)]
#[error("failed to {action} load balancer {key}")]
pub struct ReconcileError {
    pub key: ResourceKey,
    pub action: Action,
    #[source]
    pub source: Box<dyn Error + Send + Sync>,
}

/// Every reconcile failure of one pass, in the order the members were attempted.
#[derive(Debug)]
pub struct ReconcileErrors(Vec<ReconcileError>);

impl ReconcileErrors {
    /// Returns `None` if there is nothing to report.
    pub fn new(errors: Vec<ReconcileError>) -> Option<Self> {
        (!errors.is_empty()).then_some(Self(errors))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReconcileError> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Vec<ReconcileError> {
        self.0
    }
}

impl fmt::Display for ReconcileErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} load balancer(s) failed to reconcile", self.0.len())?;
        for err in &self.0 {
            write!(f, "; {err}")?;
            if let Some(source) = err.source() {
                write!(f, ": {source}")?;
            }
        }
        Ok(())
    }
}

impl Error for ReconcileErrors {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.0.first().map(|err| err as &(dyn Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Action, Outcome, ReconcileErrors};
    use crate::{
        backend::{testing::FakeBackend, Backend},
        resource::{LoadBalancerSpec, ManagedResource, ResourceKey, ResourceSet},
        subscriber::QualifiedName,
    };

    fn resource(key: &str, port: u16) -> ManagedResource {
        ManagedResource::new(
            ResourceKey::from(key),
            QualifiedName {
                namespace: Some("default".into()),
                name: key.into(),
            },
            LoadBalancerSpec::test_http(port),
        )
    }

    fn removed(resource: ManagedResource) -> ManagedResource {
        let mut previous = ResourceSet::new();
        previous.insert(resource).unwrap();
        previous.removed(&ResourceSet::new()).iter().next().unwrap().clone()
    }

    #[tokio::test]
    async fn creates_then_stays_unchanged() {
        let backend = FakeBackend::default();
        let mut lb = resource("a", 80);

        assert_eq!(lb.reconcile(&backend).await.unwrap(), Outcome::Created);
        assert_eq!(lb.reconcile(&backend).await.unwrap(), Outcome::Unchanged);

        assert_eq!(backend.mutations(), 1);
        assert_eq!(
            backend.describe(lb.key()).await.unwrap().unwrap().spec,
            LoadBalancerSpec::test_http(80)
        );
        assert_eq!(lb.applied().unwrap().spec, LoadBalancerSpec::test_http(80));
    }

    #[tokio::test]
    async fn updates_changed_spec_in_place() {
        let backend = FakeBackend::default();
        let mut lb = resource("a", 80);
        lb.reconcile(&backend).await.unwrap();
        let id = lb.applied().unwrap().id.clone();

        let mut changed = resource("a", 8080).with_applied(lb.applied().cloned());
        assert_eq!(changed.reconcile(&backend).await.unwrap(), Outcome::Updated);

        let state = backend.describe(changed.key()).await.unwrap().unwrap();
        assert_eq!(state.id, id);
        assert_eq!(state.spec, LoadBalancerSpec::test_http(8080));
        assert_eq!(backend.mutations(), 2);
    }

    #[tokio::test]
    async fn adopts_or_corrects_existing_load_balancer() {
        let backend = FakeBackend::default();
        backend.seed(&ResourceKey::from("a"), LoadBalancerSpec::test_http(80));
        backend.seed(&ResourceKey::from("b"), LoadBalancerSpec::test_http(80));

        let mut same = resource("a", 80);
        assert_eq!(same.reconcile(&backend).await.unwrap(), Outcome::Adopted);

        let mut drifted = resource("b", 443);
        assert_eq!(drifted.reconcile(&backend).await.unwrap(), Outcome::Updated);
        assert_eq!(backend.mutations(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_applied_state_is_described_again() {
        let backend = FakeBackend::default();
        let mut lb = resource("a", 80);
        lb.reconcile(&backend).await.unwrap();
        backend.delete(lb.key()).await.unwrap();

        lb.expire_applied(Duration::from_secs(60));
        assert_eq!(lb.reconcile(&backend).await.unwrap(), Outcome::Unchanged);

        tokio::time::sleep(Duration::from_secs(60)).await;
        lb.expire_applied(Duration::from_secs(60));
        assert!(lb.applied().is_none());
        assert_eq!(lb.reconcile(&backend).await.unwrap(), Outcome::Created);
        assert_eq!(lb.reconcile(&backend).await.unwrap(), Outcome::Unchanged);
    }

    #[tokio::test]
    async fn deletion_tolerates_absence() {
        let backend = FakeBackend::default();
        let mut lb = resource("a", 80);
        lb.reconcile(&backend).await.unwrap();

        let mut gone = removed(lb);
        assert_eq!(gone.reconcile(&backend).await.unwrap(), Outcome::Deleted);
        assert!(gone.applied().is_none());
        assert_eq!(gone.reconcile(&backend).await.unwrap(), Outcome::AlreadyAbsent);
        assert!(backend.describe(gone.key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn propagates_backend_errors() {
        let backend = FakeBackend::default();
        backend.fail_on(&ResourceKey::from("a"));

        let mut lb = resource("a", 80);
        let err = lb.reconcile(&backend).await.unwrap_err();
        assert_eq!(err.key, ResourceKey::from("a"));
        assert_eq!(err.action, Action::Describe);
        assert!(lb.applied().is_none());

        let mut gone = removed(resource("a", 80));
        let err = gone.reconcile(&backend).await.unwrap_err();
        assert_eq!(err.action, Action::Delete);
    }

    #[tokio::test]
    async fn collects_errors() {
        assert!(ReconcileErrors::new(Vec::new()).is_none());

        let backend = FakeBackend::default();
        backend.fail_on(&ResourceKey::from("a"));
        backend.fail_on(&ResourceKey::from("b"));
        let mut errors = Vec::new();
        for key in ["a", "b"] {
            errors.push(resource(key, 80).reconcile(&backend).await.unwrap_err());
        }

        let errors = ReconcileErrors::new(errors).unwrap();
        assert_eq!(errors.len(), 2);
        let message = errors.to_string();
        assert!(message.starts_with("2 load balancer(s) failed to reconcile"), "{message}");
        assert!(message.contains("failed to describe load balancer a"), "{message}");
        assert!(message.contains("failed to describe load balancer b"), "{message}");
    }
}
