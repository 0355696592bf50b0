//! In-memory model of the load balancers managed by the controller.

use std::{
    collections::{btree_map, BTreeMap},
    fmt,
};

use sha2::{Digest, Sha256};
use tokio::time::Instant;

use crate::{config::Configuration, subscriber::QualifiedName};

pub mod spec;
pub use spec::{InvalidIngress, LoadBalancerSpec};

/// Stable identity of a managed load balancer, also used as its external name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey(String);

const MAX_NAME_LEN: usize = 32;

impl ResourceKey {
    /// Derives the key of the load balancer serving `ingress` in the configured cluster.
    ///
    /// The result has the shape `{prefix}-{namespace}-{name}-{hash}`, where each readable
    /// part is truncated so that the name fits the 32-character limit of the backend.
    pub fn generate(cfg: &Configuration, ingress: &QualifiedName) -> Self {
        let namespace = ingress.namespace_or_default();

        let mut hasher = Sha256::new();
        hasher.update(cfg.cluster_name().as_bytes());
        hasher.update(b"/");
        hasher.update(namespace.as_bytes());
        hasher.update(b"/");
        hasher.update(ingress.name.as_bytes());
        let hash: String = hasher
            .finalize()
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect();

        let name = format!(
            "{}-{}-{}-{}",
            sanitize(cfg.name_prefix(), 12),
            sanitize(namespace, 5),
            sanitize(&ingress.name, 5),
            &hash[..7],
        );
        debug_assert!(name.len() <= MAX_NAME_LEN);
        Self(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceKey {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercases `part`, maps other characters to `-` and trims it to `max` characters.
/// Never returns an empty part or one with a leading or trailing `-`.
fn sanitize(part: &str, max: usize) -> String {
    let part = part
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .take(max)
        .collect::<String>();
    match part.trim_matches('-') {
        "" => "x".to_owned(),
        trimmed => trimmed.to_owned(),
    }
}

/// State of a load balancer as last written to or observed on the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedState {
    /// Backend identifier of the load balancer.
    pub id: String,
    pub spec: LoadBalancerSpec,
    /// When the backend last confirmed `spec`.
    pub observed_at: Instant,
}

/// One load balancer managed by the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedResource {
    key: ResourceKey,
    source: QualifiedName,
    pub(crate) desired: Option<LoadBalancerSpec>,
    pub(crate) applied: Option<AppliedState>,
}

impl ManagedResource {
    pub fn new(key: ResourceKey, source: QualifiedName, desired: LoadBalancerSpec) -> Self {
        Self {
            key,
            source,
            desired: Some(desired),
            applied: None,
        }
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// The ingress this load balancer is derived from.
    pub fn source(&self) -> &QualifiedName {
        &self.source
    }

    /// The target state, or `None` if the load balancer is to be deleted.
    pub fn desired(&self) -> Option<&LoadBalancerSpec> {
        self.desired.as_ref()
    }

    pub fn applied(&self) -> Option<&AppliedState> {
        self.applied.as_ref()
    }

    pub fn is_marked_for_deletion(&self) -> bool {
        self.desired.is_none()
    }

    /// Seeds the last applied state, e.g. carried over from a previous generation.
    pub fn with_applied(mut self, applied: Option<AppliedState>) -> Self {
        self.applied = applied;
        self
    }

    fn mark_for_deletion(&mut self) {
        self.desired = None;
    }
}

/// Managed resources keyed by [`ResourceKey`], iterated in key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceSet {
    members: BTreeMap<ResourceKey, ManagedResource>,
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a member. Fails with the rejected member if its key is already taken.
    pub fn insert(&mut self, resource: ManagedResource) -> Result<(), ManagedResource> {
        match self.members.entry(resource.key.clone()) {
            btree_map::Entry::Vacant(entry) => {
                entry.insert(resource);
                Ok(())
            }
            btree_map::Entry::Occupied(_) => Err(resource),
        }
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&ManagedResource> {
        self.members.get(key)
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.members.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ResourceKey> {
        self.members.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManagedResource> {
        self.members.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ManagedResource> {
        self.members.values_mut()
    }

    /// Returns the members of `self` whose keys are absent from `current`,
    /// each marked for deletion.
    ///
    /// Members present in both sets are never included, even if their specs differ;
    /// those are updated in place when `current` is reconciled.
    pub fn removed(&self, current: &ResourceSet) -> ResourceSet {
        let members = self
            .members
            .iter()
            .filter(|(key, _)| !current.contains(key))
            .map(|(key, resource)| {
                let mut resource = resource.clone();
                resource.mark_for_deletion();
                (key.clone(), resource)
            })
            .collect();
        ResourceSet { members }
    }

    /// Counts the members per source namespace.
    pub fn managed_by_namespace(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for resource in self.iter() {
            *counts
                .entry(resource.source.namespace_or_default().to_owned())
                .or_insert(0) += 1;
        }
        counts
    }
}

impl<'a> IntoIterator for &'a ResourceSet {
    type Item = &'a ManagedResource;
    type IntoIter = btree_map::Values<'a, ResourceKey, ManagedResource>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.values()
    }
}
