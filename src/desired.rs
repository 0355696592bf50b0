//! Computes the load balancers that should exist for the current ingresses.

use std::sync::Arc;

use k8s_openapi::api::networking::v1::Ingress;

use crate::{
    config::Configuration,
    resource::{InvalidIngress, LoadBalancerSpec, ManagedResource, ResourceKey, ResourceSet},
    subscriber::QualifiedName,
};

/// Builds the desired [`ResourceSet`] from an ingress snapshot.
///
/// Ingresses outside the configured namespace or rejected by the class filter are skipped.
/// Members that also exist in `running` inherit its applied state so that
/// unchanged load balancers reconcile without touching the backend.
///
/// The result depends only on the arguments, not on the order of `snapshot`.
pub fn build(
    snapshot: &[Arc<Ingress>],
    cfg: &Configuration,
    running: &ResourceSet,
) -> Result<ResourceSet, BuildError> {
    let mut ingresses: Vec<_> = snapshot
        .iter()
        .map(|ingress| (QualifiedName::from_resource(&**ingress), ingress))
        .filter(|(name, _)| {
            cfg.namespace()
                .map_or(true, |ns| name.namespace_or_default() == ns)
        })
        .filter(|(_, ingress)| cfg.class_filter().matches(ingress))
        .collect();
    ingresses.sort_by(|(a, _), (b, _)| a.cmp(b));

    let mut desired = ResourceSet::new();
    for (name, ingress) in ingresses {
        let spec = LoadBalancerSpec::from_ingress(ingress, cfg).map_err(|reason| {
            BuildError::Invalid {
                ingress: name.clone(),
                reason,
            }
        })?;
        let key = ResourceKey::generate(cfg, &name);
        let applied = running.get(&key).and_then(|prev| prev.applied().cloned());

        desired
            .insert(ManagedResource::new(key, name, spec).with_applied(applied))
            .map_err(|rejected| BuildError::DuplicateKey {
                key: rejected.key().clone(),
                ingress: rejected.source().clone(),
            })?;
    }

    Ok(desired)
}

/// The error type returned by [`build`].
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("ingress {ingress} is invalid")]
    Invalid {
        ingress: QualifiedName,
        #[source]
        reason: InvalidIngress,
    },
    #[error("ingress {ingress} maps to load balancer {key}, which is already taken")]
    DuplicateKey {
        key: ResourceKey,
        ingress: QualifiedName,
    },
}
