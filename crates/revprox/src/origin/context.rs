use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::OriginError;

/// Cancellation and deadline of one inbound request, threaded through to the
/// origin call.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Copy of this context whose deadline is at most `timeout` from now.
    /// A zero timeout leaves the deadline unchanged.
    pub fn bounded_by(&self, timeout: Duration) -> Self {
        if timeout.is_zero() {
            return self.clone();
        }
        let limit = Instant::now() + timeout;
        Self {
            cancel: self.cancel.clone(),
            deadline: Some(self.deadline.map_or(limit, |d| d.min(limit))),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drive `fut` until it completes, the context is cancelled or the
    /// deadline passes, whichever comes first.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, OriginError>
    where
        F: Future<Output = Result<T, OriginError>>,
    {
        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(OriginError::Cancelled),
            _ = deadline => Err(OriginError::DeadlineExceeded),
            result = fut => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_when_not_interrupted() {
        let ctx = RequestContext::default().with_timeout(Duration::from_secs(5));
        let result = ctx.run(async { Ok::<_, OriginError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_cancelled_context_aborts() {
        let token = CancellationToken::new();
        let ctx = RequestContext::new(token.child_token());
        token.cancel();

        let result = ctx.run(std::future::pending::<Result<(), OriginError>>()).await;
        assert!(matches!(result, Err(OriginError::Cancelled)));
        assert!(ctx.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_by_keeps_earliest_deadline() {
        let now = Instant::now();
        let ctx = RequestContext::default().with_deadline(now + Duration::from_secs(1));
        assert_eq!(
            ctx.bounded_by(Duration::from_secs(30)).deadline(),
            Some(now + Duration::from_secs(1))
        );
        assert_eq!(
            RequestContext::default()
                .bounded_by(Duration::from_secs(2))
                .deadline(),
            Some(now + Duration::from_secs(2))
        );
        assert_eq!(RequestContext::default().bounded_by(Duration::ZERO).deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_aborts() {
        let ctx = RequestContext::default().with_timeout(Duration::from_millis(50));
        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, OriginError>(())
            })
            .await;
        assert!(matches!(result, Err(OriginError::DeadlineExceeded)));
    }
}
