use super::shutdown::{ShutdownHandle, ShutdownReason};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, trace};

/// A single resettable deferred shutdown.
///
/// Each [`IdleTimer::reset`] restarts the countdown. If `ttl` passes with no
/// reset the timer requests [`ShutdownReason::Idle`] and finishes.
pub struct IdleTimer {
    ttl: Duration,
    activity: Arc<Notify>,
    task: JoinHandle<()>,
}

impl IdleTimer {
    pub fn spawn(ttl: Duration, shutdown: ShutdownHandle) -> Self {
        let activity = Arc::new(Notify::new());
        let task = tokio::spawn({
            let activity = Arc::clone(&activity);
            async move {
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(ttl) => {
                            info!(?ttl, "Idle timeout reached");
                            shutdown.shutdown(ShutdownReason::Idle);
                            return;
                        }
                        _ = activity.notified() => {
                            trace!("Idle timer reset");
                        }
                    }
                }
            }
        });

        Self { ttl, activity, task }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Restart the countdown.
    pub fn reset(&self) {
        self.activity.notify_one();
    }

    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for IdleTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::shutdown::ShutdownCoordinator;

    #[tokio::test]
    async fn fires_after_ttl_without_activity() {
        let coordinator = ShutdownCoordinator::new();
        let _timer = IdleTimer::spawn(Duration::from_millis(100), coordinator.handle());

        let reason = tokio::time::timeout(Duration::from_secs(2), coordinator.wait())
            .await
            .expect("idle timer should fire");
        assert_eq!(reason, ShutdownReason::Idle);
    }

    #[tokio::test]
    async fn activity_postpones_shutdown() {
        let coordinator = ShutdownCoordinator::new();
        let timer = IdleTimer::spawn(Duration::from_millis(300), coordinator.handle());

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            timer.reset();
        }
        assert_eq!(coordinator.reason(), None);

        let reason = tokio::time::timeout(Duration::from_secs(2), coordinator.wait())
            .await
            .expect("idle timer should eventually fire");
        assert_eq!(reason, ShutdownReason::Idle);
    }

    #[tokio::test]
    async fn cancelled_timer_never_fires() {
        let coordinator = ShutdownCoordinator::new();
        let timer = IdleTimer::spawn(Duration::from_millis(50), coordinator.handle());
        timer.cancel();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(coordinator.reason(), None);
    }
}
