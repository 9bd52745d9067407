//! Process lifecycle.
//!
//! A [`Lifecycle`] is created once by the process and handed to every
//! long-running component. Components watch its [`CancellationToken`];
//! shutdown hooks run in registration order after the token is cancelled.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::future::Future;
use tokio_util::sync::CancellationToken;

type ShutdownHook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

#[derive(Default)]
pub struct Lifecycle {
    token: CancellationToken,
    hooks: Mutex<Vec<ShutdownHook>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// A child of the process token, cancelled when the process shuts down.
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown has begun.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Registers `hook` to run during [`Lifecycle::shutdown`].
    pub fn add_shutdown_hook<F, Fut>(&self, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks
            .lock()
            .push(Box::new(move || Box::pin(hook()) as BoxFuture<'static, ()>));
    }

    /// Cancels the token, then runs every registered hook once, in order.
    pub async fn shutdown(&self) {
        self.token.cancel();
        let hooks = std::mem::take(&mut *self.hooks.lock());
        tracing::info!("shutting down, running {} hook(s)", hooks.len());
        for hook in hooks {
            hook().await;
        }
    }

    /// Waits for Ctrl-C (or an earlier shutdown), then shuts down.
    pub async fn wait_for_signal(&self) {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    tracing::warn!("failed to listen for ctrl-c: {}", e);
                }
            }
            _ = self.token.cancelled() => {}
        }
        self.shutdown().await;
    }
}
