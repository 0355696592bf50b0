use futures::{Stream, TryStreamExt};
use k8s_openapi::api::networking::v1::Ingress;
use kube_client::Api;
use kube_runtime::{reflector, watcher, WatchStreamExt};

use super::{QualifiedName, Trigger};

/// Watches ingresses through a reflector.
///
/// Returns the store filled by the watch along with a stream yielding a trigger for
/// every touched ingress. The store only advances while the stream is polled.
pub fn ingresses(
    api: Api<Ingress>,
    watcher_config: watcher::Config,
) -> (
    reflector::Store<Ingress>,
    impl Stream<Item = Result<Trigger, watcher::Error>>,
) {
    let writer = reflector::store::Writer::default();
    let store = writer.as_reader();

    let triggers = reflector(writer, watcher(api, watcher_config))
        .touched_objects()
        .map_ok(|ingress| Trigger::Changed(QualifiedName::from_resource(&ingress)));

    (store, triggers)
}
