//! Cooperative cancellation

use tokio::sync::watch;

/// Raises the stop flag for one run
#[derive(Debug)]
pub struct Canceller {
    tx: watch::Sender<bool>,
}

impl Canceller {
    /// Create a fresh, unraised flag
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Token observing this flag
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }

    /// Ask the run to stop; idempotent
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether `cancel` was called
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Canceller {
    fn default() -> Self {
        Self::new()
    }
}

/// Read side of the stop flag, held by the running sampler
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Whether stop was requested
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once stop is requested
    ///
    /// Never resolves if the [`Canceller`] is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_waiter() {
        let canceller = Canceller::new();
        let mut token = canceller.token();
        assert!(!token.is_cancelled());

        let waiter = tokio::spawn(async move {
            token.cancelled().await;
            token.is_cancelled()
        });
        canceller.cancel();
        assert!(waiter.await.unwrap());
        assert!(canceller.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_canceller_never_fires() {
        let canceller = Canceller::new();
        let mut token = canceller.token();
        drop(canceller);

        let waited = tokio::time::timeout(Duration::from_secs(60), token.cancelled()).await;
        assert!(waited.is_err());
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_token_created_after_cancel_sees_it() {
        let canceller = Canceller::new();
        canceller.cancel();
        canceller.cancel();
        assert!(canceller.token().is_cancelled());
    }
}
