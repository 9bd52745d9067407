//! minirpc server
//!
//! Dispatches incoming calls to registered method handlers through a
//! composable interceptor pipeline.
//!
//! # Architecture
//!
//! - [`Router`] - exact-path route table, `POST` only, overridable not-found
//! - [`Chain`] / [`Interceptor`] - ordered call-wrapping middleware, with
//!   [`Recover`] installed by default
//! - [`ServiceDesc`] / [`MethodDesc`] - typed method glue: decode, dispatch,
//!   envelope or error translation, encode
//! - [`Server`] - registration, then serving with a per-call deadline and a
//!   bounded graceful drain
//!
//! # Example
//!
//! ```no_run
//! use minirpc_common::{Enveloped, Lifecycle};
//! use minirpc_server::{MethodDesc, Server, ServerConfig, ServerOptions, ServiceDesc};
//! use serde_json::Value;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> minirpc_common::Result<()> {
//!     let mut server = Server::new(ServerConfig::default(), ServerOptions::default());
//!     server.register_service(
//!         ServiceDesc::new("Echo").method(MethodDesc::new("Say", |_ctx, req: Value| async move {
//!             Ok(Enveloped(req))
//!         })),
//!     )?;
//!
//!     let lifecycle = Arc::new(Lifecycle::new());
//!     let signals = lifecycle.clone();
//!     tokio::spawn(async move { signals.wait_for_signal().await });
//!     server.run(&lifecycle).await
//! }
//! ```

mod http_server;
pub mod interceptor;
pub mod reply;
pub mod router;
pub mod server;
pub mod service;

pub use interceptor::{
    panic_message, server_handler, AnyMessage, Chain, Interceptor, Next, Recover, ServerHandler,
};
pub use reply::{HttpResponse, Reply};
pub use router::{route_handler, HttpRequest, RouteHandler, Router};
pub use server::{Server, ServerConfig, ServerHandle, ServerOptions};
pub use service::{MethodDesc, ServiceDesc};
