//! Input side of the controller: the ingress snapshot and the triggers that request a sync.

use std::{fmt, sync::Arc};

use k8s_openapi::api::networking::v1::Ingress;
use kube_core::{Resource, ResourceExt};
use kube_runtime::reflector;

/// Uniquely identifies an object of a known type by namespace and name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QualifiedName {
    /// The object namespace, if any
    pub namespace: Option<String>,
    /// The object name
    pub name: String,
}

impl QualifiedName {
    pub fn from_resource<K: Resource>(resource: &K) -> Self {
        Self {
            namespace: resource.meta().namespace.clone(),
            name: resource.name_any(),
        }
    }

    /// The namespace, with cluster-scoped objects reported as `default`.
    pub fn namespace_or_default(&self) -> &str {
        self.namespace.as_deref().unwrap_or("default")
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// A request for a sync pass.
///
/// Passes always rebuild the full desired state, so the payload only feeds logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// The periodic resync fired.
    Resync,
    /// An ingress was created, changed or deleted.
    Changed(QualifiedName),
}

/// Read-only view of the ingresses currently declared in the cluster.
pub trait IngressStore: Send + Sync {
    /// Returns the current ingresses. The view may lag behind the apiserver.
    fn snapshot(&self) -> Vec<Arc<Ingress>>;
}

impl IngressStore for reflector::Store<Ingress> {
    fn snapshot(&self) -> Vec<Arc<Ingress>> {
        self.state()
    }
}

pub mod ingresses;
pub use ingresses::ingresses;

#[cfg(test)]
mod tests {
    use k8s_openapi::api::networking::v1::Ingress;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kube_runtime::{reflector, watcher};

    use super::{IngressStore, QualifiedName};

    fn ingress(namespace: &str, name: &str) -> Ingress {
        Ingress {
            metadata: ObjectMeta {
                namespace: Some(namespace.into()),
                name: Some(name.into()),
                ..ObjectMeta::default()
            },
            ..Ingress::default()
        }
    }

    #[test]
    fn qualified_name_display() {
        let name = QualifiedName::from_resource(&ingress("team", "web"));
        assert_eq!(name.to_string(), "team/web");
        assert_eq!(name.namespace_or_default(), "team");

        let cluster_scoped = QualifiedName {
            namespace: None,
            name: "web".into(),
        };
        assert_eq!(cluster_scoped.to_string(), "web");
        assert_eq!(cluster_scoped.namespace_or_default(), "default");
    }

    #[test]
    fn reflector_store_snapshot() {
        let mut writer = reflector::store::Writer::<Ingress>::default();
        let store = writer.as_reader();
        assert!(store.snapshot().is_empty());

        writer.apply_watcher_event(&watcher::Event::Applied(ingress("team", "web")));
        writer.apply_watcher_event(&watcher::Event::Applied(ingress("team", "api")));
        writer.apply_watcher_event(&watcher::Event::Deleted(ingress("team", "web")));

        let names: Vec<_> = store
            .snapshot()
            .iter()
            .map(|ing| QualifiedName::from_resource(&**ing))
            .collect();
        assert_eq!(
            names,
            vec![QualifiedName {
                namespace: Some("team".into()),
                name: "api".into(),
            }]
        );
    }
}
