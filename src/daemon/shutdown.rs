use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// Why the daemon is shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal(&'static str),
    Idle,
    Requested,
}

/// One-shot shutdown broadcast. Every trigger path (signals, the idle timer,
/// an explicit close) goes through a [`ShutdownHandle`]; the first one wins.
pub struct ShutdownCoordinator {
    tx: Arc<watch::Sender<Option<ShutdownReason>>>,
    rx: watch::Receiver<Option<ShutdownReason>>,
}

#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(None);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.tx),
        }
    }

    /// Resolves once any handle has requested shutdown.
    pub fn wait(&self) -> impl Future<Output = ShutdownReason> + Send + 'static {
        let mut rx = self.rx.clone();
        async move {
            let reason = match rx.wait_for(Option::is_some).await {
                Ok(reason) => *reason,
                // Every handle is gone; nobody is left to keep us running.
                Err(_) => None,
            };
            reason.unwrap_or(ShutdownReason::Requested)
        }
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.rx.borrow()
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    /// Request shutdown. Later requests keep the first reason.
    pub fn shutdown(&self, reason: ShutdownReason) {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }
}
