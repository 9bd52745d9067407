//! HTTP serving loop
//!
//! Accepts connections, serves each one on its own task with hyper's HTTP/1
//! connection driver and hands every request to the [`Router`].
//!
//! # Per request
//!
//! - the body is read up to `max_body_bytes` (413 beyond that)
//! - a [`CallContext`] is built from the headers: incoming metadata, trace
//!   id (adopted or generated) and a deadline of `handler_timeout`
//! - the router dispatches the call inside a panic guard; a panic carrying
//!   [`AbortCall`] is raised again, which drops the connection without a
//!   response
//! - the trace id is echoed on the response
//!
//! # Shutdown
//!
//! Cancelling the stop token closes the listener, then in-flight
//! connections are drained for at most `shutdown_grace`.

use futures::FutureExt;
use http_body_util::{BodyExt, Limited};
use hyper::body::Incoming;
use hyper::header::HeaderValue;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::interceptor::{
    install_panic_hook, log_recovered_panic, panic_message, take_panic_site,
};
use crate::reply::{HttpResponse, Reply};
use crate::router::{HttpRequest, Router};
use crate::server::ServerConfig;
use minirpc_common::{
    generate_trace_id, AbortCall, CallContext, Metadata, RpcError, STATUS_CODE_HEADER,
    TRACE_ID_HEADER,
};

#[derive(Clone)]
struct ServeState {
    router: Arc<Router>,
    handler_timeout: Duration,
    max_body_bytes: usize,
}

pub(crate) struct HttpServer {
    state: ServeState,
    shutdown_grace: Duration,
}

impl HttpServer {
    pub(crate) fn new(router: Arc<Router>, config: &ServerConfig) -> Self {
        Self {
            state: ServeState {
                router,
                handler_timeout: config.handler_timeout(),
                max_body_bytes: config.max_body_bytes,
            },
            shutdown_grace: config.shutdown_grace(),
        }
    }

    /// Serves `listener` until `stop` is cancelled, then drains.
    pub(crate) async fn run(self, listener: TcpListener, stop: CancellationToken) {
        let graceful = GracefulShutdown::new();
        let builder = http1::Builder::new();

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = stop.cancelled() => break,
            };
            let (stream, peer) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::error!("failed to accept connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
            };

            let state = self.state.clone();
            let service = service_fn(move |req| {
                let state = state.clone();
                async move { Ok::<_, Infallible>(handle_request(state, req).await) }
            });
            let conn = graceful.watch(builder.serve_connection(TokioIo::new(stream), service));

            tokio::spawn(async move {
                if let Err(err) = conn.await {
                    tracing::debug!("error serving connection from {}: {}", peer, err);
                }
            });
        }

        drop(listener);
        tokio::select! {
            _ = graceful.shutdown() => tracing::info!("all connections drained"),
            _ = tokio::time::sleep(self.shutdown_grace) => {
                tracing::warn!("grace period elapsed with calls still in flight");
            }
        }
    }
}

async fn handle_request(state: ServeState, req: Request<Incoming>) -> HttpResponse {
    let started = Instant::now();
    let (parts, body) = req.into_parts();
    let path = parts.uri.path().to_string();
    let trace_id = parts
        .headers
        .get(TRACE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(generate_trace_id);

    let span = tracing::info_span!("serve", path = %path, trace_id = %trace_id);
    async move {
        tracing::info!(method = %parts.method, "recv req");

        let mut response = match Limited::new(body, state.max_body_bytes).collect().await {
            Ok(collected) => {
                let ctx = CallContext::new()
                    .with_incoming(Metadata::from_headers(&parts.headers))
                    .with_trace_id(trace_id.clone())
                    .with_timeout(state.handler_timeout);
                let request = Request::from_parts(parts, collected.to_bytes());
                dispatch_guarded(&state.router, ctx, request).await
            }
            Err(e) => {
                let err = if e.is::<http_body_util::LengthLimitError>() {
                    RpcError::BodyTooLarge(state.max_body_bytes)
                } else {
                    RpcError::Transport {
                        method: parts.method.to_string(),
                        url: path.clone(),
                        source: e,
                    }
                };
                tracing::warn!("failed to read request body: {}", err);
                Reply::error(&err).into_response("application/json")
            }
        };

        if let Ok(value) = HeaderValue::from_str(&trace_id) {
            response.headers_mut().insert(TRACE_ID_HEADER, value);
        }
        let code = response
            .headers()
            .get(STATUS_CODE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();
        tracing::info!(
            status = response.status().as_u16(),
            code = %code,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "finish req"
        );
        response
    }
    .instrument(span)
    .await
}

async fn dispatch_guarded(
    router: &Router,
    ctx: CallContext,
    request: HttpRequest,
) -> HttpResponse {
    install_panic_hook();
    match AssertUnwindSafe(router.dispatch(ctx, request))
        .catch_unwind()
        .await
    {
        Ok(response) => response,
        Err(payload) => {
            if payload.is::<AbortCall>() {
                take_panic_site();
                tracing::warn!("call aborted, dropping connection");
                std::panic::resume_unwind(payload);
            }
            let msg = panic_message(payload.as_ref());
            log_recovered_panic("panic outside the interceptor chain", &msg);
            Reply::error(&RpcError::Panic(msg)).into_response("application/json")
        }
    }
}
