use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Result, SortError};

/// Cooperative cancellation shared between the caller and a running sort.
///
/// The sort checks the token at every partition boundary and before every merge step. A
/// cancelled sort still deletes all of its spill files before returning
/// [SortError::Cancelled].
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    pub fn new() -> CancellationToken {
        CancellationToken::default()
    }

    /// Cancel automatically once `deadline` has passed.
    pub fn with_deadline(mut self, deadline: Instant) -> CancellationToken {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> CancellationToken {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
            || self.deadline.map_or(false, |deadline| Instant::now() >= deadline)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SortError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::cancel::CancellationToken;
    use crate::error::SortError;

    #[test]
    fn test_cancel_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert!(matches!(token.check(), Err(SortError::Cancelled)));
    }

    #[test]
    fn test_expired_deadline() {
        let token = CancellationToken::new().with_timeout(Duration::from_secs(0));
        assert!(token.is_cancelled());
    }
}
