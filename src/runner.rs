use std::{error::Error, pin::pin};

use futures::{Stream, TryStreamExt};
use log::{debug, info, warn};
use tokio::time::{self, MissedTickBehavior};

use crate::{
    backend::Backend,
    controller::{Controller, PassOutcome},
    metrics::Metrics,
    subscriber::{IngressStore, Trigger},
};

/// Drives `controller` until shutdown or until `triggers` ends.
///
/// A pass runs for every trigger, and a resync pass runs every
/// [resync period](crate::Configuration::resync_period), starting immediately.
/// Failed passes are logged and left to the next trigger to retry.
pub async fn run<S, B, M, T, E>(
    controller: &Controller<S, B, M>,
    triggers: T,
) -> Result<(), RunError<E>>
where
    S: IngressStore,
    B: Backend,
    M: Metrics,
    T: Stream<Item = Result<Trigger, E>>,
    E: Error + 'static,
{
    let shutdown = controller.shutdown_signal();
    let mut resync = time::interval(controller.config().resync_period());
    resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut triggers = pin!(triggers);

    loop {
        let trigger = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            _ = resync.tick() => Trigger::Resync,
            event = triggers.try_next() => match event.map_err(RunError::Subscribe)? {
                Some(trigger) => trigger,
                None => {
                    info!("Trigger stream ended, stopping");
                    return Ok(());
                }
            },
        };

        debug!("Sync triggered by {trigger:?}");
        match controller.sync().await {
            Ok(PassOutcome::Aborted) => break,
            Ok(PassOutcome::Committed(_)) => {}
            Err(err) => warn!("Sync failed, retrying on next trigger: {err}"),
        }
    }

    info!("Shutting down, stopping");
    Ok(())
}

/// The error type returned by [`run`].
#[derive(Debug, thiserror::Error)]
pub enum RunError<E: Error + 'static> {
    #[error("trigger stream failed")]
    Subscribe(#[source] E),
}
