use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::KeycloakError;

/// Cancellation and deadline attached to a single logical request.
///
/// A context with neither set never finishes on its own.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancellation: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Why this context is done, or `None` while it is still live.
    /// Cancellation wins over an expired deadline.
    pub fn err(&self) -> Option<KeycloakError> {
        if self
            .cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            return Some(KeycloakError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(KeycloakError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> KeycloakError {
        let cancelled = async {
            match &self.cancellation {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => KeycloakError::Cancelled,
            _ = expired => KeycloakError::DeadlineExceeded,
        }
    }

    /// Runs `fut` unless the context finishes first.
    /// A context that is already done never polls `fut`.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, KeycloakError> {
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            output = fut => Ok(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_context_is_live() {
        assert!(RequestContext::background().err().is_none());
    }

    #[test]
    fn cancelled_token_reports_cancelled() {
        let token = CancellationToken::new();
        let ctx = RequestContext::background().with_cancellation(token.clone());
        assert!(ctx.err().is_none());

        token.cancel();
        assert!(matches!(ctx.err(), Some(KeycloakError::Cancelled)));
    }

    #[tokio::test]
    async fn expired_deadline_reports_deadline_exceeded() {
        let ctx = RequestContext::background().with_deadline(Instant::now());
        assert!(matches!(ctx.err(), Some(KeycloakError::DeadlineExceeded)));
        assert!(matches!(ctx.done().await, KeycloakError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn run_skips_future_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = RequestContext::background().with_cancellation(token);

        let result = ctx.run(async { 42 }).await;
        assert!(matches!(result, Err(KeycloakError::Cancelled)));
    }

    #[tokio::test]
    async fn run_returns_output_for_live_context() {
        let ctx = RequestContext::background().with_timeout(Duration::from_secs(5));
        assert_eq!(ctx.run(async { 42 }).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn run_times_out_slow_future() {
        let ctx = RequestContext::background().with_timeout(Duration::from_millis(10));
        let result = ctx
            .run(tokio::time::sleep(Duration::from_secs(5)))
            .await;
        assert!(matches!(result, Err(KeycloakError::DeadlineExceeded)));
    }
}
