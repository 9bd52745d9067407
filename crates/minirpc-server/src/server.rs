use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::http_server::HttpServer;
use crate::interceptor::{AnyMessage, Chain, Interceptor, Recover};
use crate::router::{route_handler, HttpRequest, RouteHandler, Router};
use crate::service::{MethodDesc, ServiceDesc};
use minirpc_common::{CallContext, Codec, JsonCodec, Lifecycle, Result, RpcError};

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on
    pub addr: String,
    /// Time a call may spend in its handler (in milliseconds)
    pub handler_timeout_ms: u64,
    /// Time `stop` waits for in-flight calls (in milliseconds)
    pub shutdown_grace_ms: u64,
    /// Largest accepted request body
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
            handler_timeout_ms: 30_000,
            shutdown_grace_ms: 10_000,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    pub fn with_handler_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.handler_timeout_ms = timeout_ms;
        self
    }

    pub fn with_shutdown_grace_ms(mut self, grace_ms: u64) -> Self {
        self.shutdown_grace_ms = grace_ms;
        self
    }

    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Server-wide collaborators
#[derive(Clone)]
pub struct ServerOptions {
    pub(crate) codec: Arc<dyn Codec>,
    pub(crate) interceptors: Vec<Arc<dyn Interceptor>>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            codec: Arc::new(JsonCodec),
            interceptors: vec![Arc::new(Recover)],
        }
    }
}

impl ServerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Appends a default interceptor, run for every registered method.
    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Replaces the default interceptors, dropping [`Recover`] unless it is
    /// listed again.
    pub fn with_interceptors(mut self, interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        self.interceptors = interceptors;
        self
    }
}

/// minirpc server
///
/// Services are registered first; [`Server::start`] then freezes the route
/// table and serves it.
pub struct Server {
    config: ServerConfig,
    options: ServerOptions,
    router: Router,
}

impl Server {
    pub fn new(config: ServerConfig, options: ServerOptions) -> Self {
        Self {
            config,
            options,
            router: Router::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Registers every method of `desc` with the default interceptors.
    pub fn register_service(&mut self, desc: ServiceDesc) -> Result<&mut Self> {
        self.register_service_with(desc, Vec::new())
    }

    /// Registers every method of `desc`.
    ///
    /// Each method runs behind the server defaults, then the service's own
    /// interceptor, then `interceptors`. Nothing is registered when the
    /// descriptor is invalid or one of its paths is already taken.
    ///
    /// # Arguments
    ///
    /// * `desc` - The service to register
    /// * `interceptors` - Extra interceptors for this registration only
    pub fn register_service_with(
        &mut self,
        desc: ServiceDesc,
        interceptors: Vec<Arc<dyn Interceptor>>,
    ) -> Result<&mut Self> {
        desc.validate()?;
        let paths = desc.paths();
        for (i, path) in paths.iter().enumerate() {
            if self.router.contains(path) || paths[..i].contains(path) {
                return Err(RpcError::DuplicateRoute(path.clone()));
            }
        }

        let mut stack = self.options.interceptors.clone();
        stack.extend(desc.interceptor.clone());
        stack.extend(interceptors);
        let chain = Chain::new(stack);

        for (path, method) in paths.into_iter().zip(desc.methods) {
            let route = self.method_route(path.clone(), method, chain.clone());
            self.router.handle(path, route)?;
        }
        tracing::info!(
            "registered service {} ({} interceptor(s))",
            desc.name,
            chain.len()
        );
        Ok(self)
    }

    fn method_route(&self, path: String, method: MethodDesc, chain: Chain) -> RouteHandler {
        let codec = self.options.codec.clone();
        let method = Arc::new(method);
        route_handler(move |ctx: CallContext, req: HttpRequest| {
            let codec = codec.clone();
            let method = method.clone();
            let chain = chain.clone();
            let path = path.clone();
            async move {
                let result = match method.decode(codec.as_ref(), req.body()) {
                    Ok(msg) => run_with_deadline(&chain, &method, ctx, msg, &path).await,
                    Err(e) => Err(e),
                };
                method
                    .encode(codec.as_ref(), result)
                    .into_response(codec.content_type())
            }
        })
    }

    /// Registers a raw route.
    pub fn handle(&mut self, path: impl Into<String>, handler: RouteHandler) -> Result<&mut Self> {
        self.router.handle(path, handler)?;
        Ok(self)
    }

    pub fn handle_not_found(&mut self, handler: RouteHandler) -> &mut Self {
        self.router.handle_not_found(handler);
        self
    }

    /// Binds the listener and serves in the background.
    pub async fn start(self) -> Result<ServerHandle> {
        let listener = TcpListener::bind(&self.config.addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!("minirpc server listening on {}", local_addr);

        let stop = CancellationToken::new();
        let http = HttpServer::new(Arc::new(self.router), &self.config);
        let task = tokio::spawn(http.run(listener, stop.clone()));

        Ok(ServerHandle {
            local_addr,
            stop,
            task,
        })
    }

    /// Serves until `lifecycle` shuts down, then drains.
    ///
    /// Registers a shutdown hook, so [`Lifecycle::shutdown`] returns only
    /// after the drain has finished.
    pub async fn run(self, lifecycle: &Lifecycle) -> Result<()> {
        let handle = self.start().await?;
        let (drained_tx, drained_rx) = oneshot::channel::<()>();
        lifecycle.add_shutdown_hook(move || async move {
            let _ = drained_rx.await;
        });

        lifecycle.cancelled().await;
        handle.stop().await;
        let _ = drained_tx.send(());
        Ok(())
    }
}

async fn run_with_deadline(
    chain: &Chain,
    method: &MethodDesc,
    ctx: CallContext,
    msg: AnyMessage,
    path: &str,
) -> Result<AnyMessage> {
    let Some(timeout) = ctx.remaining() else {
        return chain.run(ctx, msg, &method.handler).await;
    };
    match tokio::time::timeout(timeout, chain.run(ctx, msg, &method.handler)).await {
        Ok(result) => result,
        Err(_) => Err(RpcError::DeadlineExceeded {
            url: path.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

/// Handle to a running server
pub struct ServerHandle {
    local_addr: SocketAddr,
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting, then waits for in-flight calls up to the grace period.
    pub async fn stop(self) {
        self.stop.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!("serve loop ended abnormally: {}", e);
        }
    }
}
