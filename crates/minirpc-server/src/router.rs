//! Path router.
//!
//! Maps exact paths (`/{Service}/{Method}`) to handlers. Only `POST` is
//! served; any other verb and any unknown path go to the not-found handler,
//! which can be replaced.
//!
//! The table is filled during registration and only read afterwards, so the
//! serving path needs no locking.

use futures::future::BoxFuture;
use hyper::body::Bytes;
use hyper::{Method, Request, StatusCode};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::reply::{HttpResponse, Reply};
use minirpc_common::{code, CallContext, Result, RpcError};

/// A fully read request
pub type HttpRequest = Request<Bytes>;

/// Handler bound to one path
pub type RouteHandler =
    Arc<dyn Fn(CallContext, HttpRequest) -> BoxFuture<'static, HttpResponse> + Send + Sync>;

/// Wraps an async function as a [`RouteHandler`].
pub fn route_handler<F, Fut>(f: F) -> RouteHandler
where
    F: Fn(CallContext, HttpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HttpResponse> + Send + 'static,
{
    Arc::new(
        move |ctx: CallContext, req: HttpRequest| -> BoxFuture<'static, HttpResponse> {
            Box::pin(f(ctx, req))
        },
    )
}

fn default_not_found() -> RouteHandler {
    route_handler(|_ctx, req: HttpRequest| async move {
        tracing::warn!("no route for {} {}", req.method(), req.uri().path());
        Reply {
            status: StatusCode::NOT_FOUND,
            code: code::NOT_FOUND,
            msg: "not found".to_string(),
            body: Bytes::new(),
        }
        .into_response("application/json")
    })
}

pub struct Router {
    routes: HashMap<String, RouteHandler>,
    not_found: RouteHandler,
}

impl Default for Router {
    fn default() -> Self {
        Self {
            routes: HashMap::new(),
            not_found: default_not_found(),
        }
    }
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for the exact `path`.
    ///
    /// Registering the same path twice fails with `DuplicateRoute`; the
    /// first handler stays in place.
    pub fn handle(&mut self, path: impl Into<String>, handler: RouteHandler) -> Result<&mut Self> {
        let path = path.into();
        if self.routes.contains_key(&path) {
            return Err(RpcError::DuplicateRoute(path));
        }
        tracing::debug!("registered route {}", path);
        self.routes.insert(path, handler);
        Ok(self)
    }

    /// Replaces the fallback for unknown paths and wrong verbs.
    pub fn handle_not_found(&mut self, handler: RouteHandler) -> &mut Self {
        self.not_found = handler;
        self
    }

    pub fn contains(&self, path: &str) -> bool {
        self.routes.contains_key(path)
    }

    /// Registered paths, sorted.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    /// Routes one request.
    pub fn dispatch(&self, ctx: CallContext, req: HttpRequest) -> BoxFuture<'static, HttpResponse> {
        let handler = match self.routes.get(req.uri().path()) {
            Some(handler) if req.method() == Method::POST => handler,
            _ => &self.not_found,
        };
        handler(ctx, req)
    }
}
