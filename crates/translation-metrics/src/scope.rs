//! Cancellation and deadlines for multi-day queries.
//!
//! Aggregations that walk a date range day by day (weekly/monthly
//! statistics, cost reports, quality reports) call [`QueryScope::check`]
//! before every day so an interactive caller can abandon them.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{MetricsError, MetricsResult};

#[derive(Debug, Clone)]
pub struct QueryScope {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl QueryScope {
    /// A scope that never cancels and has no deadline.
    pub fn unbounded() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// A timeout too large to represent leaves the scope without a deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Instant::now().checked_add(timeout);
        self
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn check(&self) -> MetricsResult<()> {
        if self.token.is_cancelled() {
            return Err(MetricsError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(MetricsError::DeadlineExceeded);
            }
        }
        Ok(())
    }
}

impl Default for QueryScope {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_scope_always_passes() {
        assert!(QueryScope::unbounded().check().is_ok());
    }

    #[test]
    fn cancelled_token_fails_the_check() {
        let scope = QueryScope::unbounded();
        let child = scope.clone();
        scope.cancel();
        assert!(matches!(child.check(), Err(MetricsError::Cancelled)));
    }

    #[tokio::test]
    async fn elapsed_deadline_fails_the_check() {
        let scope = QueryScope::unbounded().with_timeout(Duration::from_millis(1));
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(matches!(scope.check(), Err(MetricsError::DeadlineExceeded)));
    }

    #[test]
    fn unrepresentable_timeout_means_no_deadline() {
        let scope = QueryScope::unbounded().with_timeout(Duration::MAX);
        assert!(scope.check().is_ok());
    }
}
