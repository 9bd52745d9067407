//! Interceptor pipeline.
//!
//! Interceptors wrap the dispatch of a call. Each one receives the call
//! context, the decoded request and a [`Next`] handle; calling
//! [`Next::run`] hands the call to the next interceptor (or, from the last
//! one, to the method handler). Not calling it short-circuits the call.
//! `Next::run` consumes the handle, so it can run at most once.
//!
//! # Ordering
//!
//! A [`Chain`] built from `[A, B]` around handler `H` runs A, then B, then
//! H: the first interceptor is the outermost.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once};

use minirpc_common::{AbortCall, CallContext, Result, RpcError};

/// Type-erased request or response travelling through the pipeline
pub type AnyMessage = Box<dyn Any + Send>;

/// Innermost handler of a pipeline
pub type ServerHandler =
    Arc<dyn Fn(CallContext, AnyMessage) -> BoxFuture<'static, Result<AnyMessage>> + Send + Sync>;

/// Wraps an async function as a [`ServerHandler`].
pub fn server_handler<F, Fut>(f: F) -> ServerHandler
where
    F: Fn(CallContext, AnyMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<AnyMessage>> + Send + 'static,
{
    Arc::new(
        move |ctx: CallContext, req: AnyMessage| -> BoxFuture<'static, Result<AnyMessage>> {
            Box::pin(f(ctx, req))
        },
    )
}

#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(&self, ctx: CallContext, req: AnyMessage, next: Next<'_>)
        -> Result<AnyMessage>;
}

/// The rest of a pipeline, as seen from one interceptor
pub struct Next<'a> {
    rest: &'a [Arc<dyn Interceptor>],
    handler: &'a ServerHandler,
}

impl<'a> Next<'a> {
    /// Runs the remaining interceptors and then the handler.
    pub async fn run(self, ctx: CallContext, req: AnyMessage) -> Result<AnyMessage> {
        match self.rest.split_first() {
            Some((first, rest)) => {
                let next = Next {
                    rest,
                    handler: self.handler,
                };
                first.intercept(ctx, req, next).await
            }
            None => (self.handler)(ctx, req).await,
        }
    }
}

/// Ordered composition of interceptors
#[derive(Clone, Default)]
pub struct Chain {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
}

impl Chain {
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Self {
            interceptors: interceptors.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Runs the chain around `handler`.
    pub async fn run(
        &self,
        ctx: CallContext,
        req: AnyMessage,
        handler: &ServerHandler,
    ) -> Result<AnyMessage> {
        Next {
            rest: &self.interceptors,
            handler,
        }
        .run(ctx, req)
        .await
    }

    /// Folds the chain and `handler` into a single handler.
    pub fn then(&self, handler: ServerHandler) -> ServerHandler {
        let chain = self.clone();
        server_handler(move |ctx, req| {
            let chain = chain.clone();
            let handler = handler.clone();
            async move { chain.run(ctx, req, &handler).await }
        })
    }
}

/// Renders a panic payload as text.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Where a panic was raised, recorded before the stack unwinds.
pub(crate) struct PanicSite {
    pub(crate) location: String,
    pub(crate) backtrace: Backtrace,
}

thread_local! {
    static LAST_PANIC: RefCell<Option<PanicSite>> = const { RefCell::new(None) };
}

/// Chains a panic hook that records the site of every panic on the
/// panicking thread. The previous hook still runs.
pub(crate) fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let site = PanicSite {
                location: info
                    .location()
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| "unknown location".to_string()),
                backtrace: Backtrace::force_capture(),
            };
            LAST_PANIC.with(|last| *last.borrow_mut() = Some(site));
            previous(info);
        }));
    });
}

/// Takes the site of the last panic raised on this thread.
///
/// `catch_unwind` returns on the thread that panicked, so calling this right
/// after it yields the matching site.
pub(crate) fn take_panic_site() -> Option<PanicSite> {
    LAST_PANIC.with(|last| last.borrow_mut().take())
}

/// Logs a recovered panic with the location and stack of the panic site.
pub(crate) fn log_recovered_panic(what: &str, msg: &str) {
    match take_panic_site() {
        Some(site) => tracing::error!(
            location = %site.location,
            "{}: {}\n{}",
            what,
            msg,
            site.backtrace
        ),
        None => tracing::error!("{}: {} (panic site not recorded)", what, msg),
    }
}

/// Turns panics further down the pipeline into `RpcError::Panic`.
///
/// A panic carrying [`AbortCall`] is raised again untouched. The log line
/// of a recovered panic carries the panic's location and backtrace.
#[derive(Debug, Clone, Copy, Default)]
pub struct Recover;

#[async_trait]
impl Interceptor for Recover {
    async fn intercept(
        &self,
        ctx: CallContext,
        req: AnyMessage,
        next: Next<'_>,
    ) -> Result<AnyMessage> {
        install_panic_hook();
        match AssertUnwindSafe(next.run(ctx, req)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                if payload.is::<AbortCall>() {
                    take_panic_site();
                    std::panic::resume_unwind(payload);
                }
                let msg = panic_message(payload.as_ref());
                log_recovered_panic("recovered from panic", &msg);
                Err(RpcError::Panic(msg))
            }
        }
    }
}
