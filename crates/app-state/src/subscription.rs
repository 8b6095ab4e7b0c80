//! Handle for the background auth-state listener

use std::future::Future;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Handle for a running auth listener
///
/// When dropped, the listener task is stopped. Whoever owns the handle
/// decides how long the listener lives; normally that is the
/// [`SessionContext`](crate::session::SessionContext).
pub struct AuthSubscription {
    stop_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl AuthSubscription {
    /// Run `listener` on the runtime until it finishes or the handle goes away
    pub fn spawn<F>(listener: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (stop_tx, stop_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = listener => {
                    tracing::debug!("auth listener finished");
                }
                _ = stop_rx => {
                    tracing::debug!("auth listener stopped");
                }
            }
        });

        Self { stop_tx: Some(stop_tx), handle }
    }

    /// Whether the listener task has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the listener
    pub fn stop(mut self) {
        self.signal_stop();
    }

    fn signal_stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        self.handle.abort();
    }
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        self.signal_stop();
    }
}

impl std::fmt::Debug for AuthSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSubscription").field("finished", &self.is_finished()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_drop_stops_listener() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ticks);

        let subscription = AuthSubscription::spawn(async move {
            loop {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(subscription);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let after_drop = ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), after_drop);
        assert!(after_drop > 0);
    }

    #[tokio::test]
    async fn test_finished_listener() {
        let subscription = AuthSubscription::spawn(async {});
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(subscription.is_finished());
    }
}
