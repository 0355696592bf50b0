use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// Token bucket with a burst of one.
///
/// Callers are admitted one at a time, at most `qps` times per second.
/// Waiting callers queue in the order they reserved their slot.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Option<Duration>,
    next_slot: Mutex<Option<Instant>>,
}

/// The longest wait between two admissions.
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

impl RateLimiter {
    /// A non-positive or non-finite `qps` disables limiting.
    /// Rates slower than one per [`MAX_INTERVAL`] are clamped to it.
    pub fn new(qps: f32) -> Self {
        let interval = (qps.is_finite() && qps > 0.0).then(|| {
            Duration::try_from_secs_f64(1.0 / f64::from(qps))
                .map_or(MAX_INTERVAL, |interval| interval.min(MAX_INTERVAL))
        });
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0.0)
    }

    /// Whether `qps` is zero or a finite rate of at least one admission per [`MAX_INTERVAL`].
    pub fn supports(qps: f32) -> bool {
        qps == 0.0
            || (qps.is_finite()
                && qps > 0.0
                && 1.0 / f64::from(qps) <= MAX_INTERVAL.as_secs_f64())
    }

    /// Waits until the caller is permitted to proceed.
    pub async fn accept(&self) {
        if let Some(slot) = self.reserve() {
            time::sleep_until(slot).await;
        }
    }

    /// Like [`accept`](Self::accept), but gives up once `token` is cancelled.
    ///
    /// Returns whether the caller was admitted.
    pub async fn accept_or_cancelled(&self, token: &CancellationToken) -> bool {
        if token.is_cancelled() {
            return false;
        }
        let Some(slot) = self.reserve() else {
            return true;
        };

        tokio::select! {
            () = token.cancelled() => false,
            () = time::sleep_until(slot) => true,
        }
    }

    /// Claims the next free slot, returning it if it lies in the future.
    fn reserve(&self) -> Option<Instant> {
        let interval = self.interval?;
        let now = Instant::now();

        let mut next_slot = self.next_slot.lock();
        let slot = next_slot.map_or(now, |next| next.max(now));
        *next_slot = Some(slot + interval);

        (slot > now).then_some(slot)
    }
}
