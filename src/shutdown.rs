use tokio_util::sync::CancellationToken;

/// Tells the controller it is draining and must not start new passes.
///
/// Clones observe the same signal.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Starts draining. Idempotent.
    pub fn shut_down(&self) {
        self.token.cancel();
    }

    /// Completes once shutdown has started.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl From<CancellationToken> for ShutdownSignal {
    fn from(token: CancellationToken) -> Self {
        Self { token }
    }
}
