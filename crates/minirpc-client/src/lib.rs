//! minirpc client
//!
//! Resolves a logical service address to live endpoints, balances calls over
//! them and runs the client call path: encode, pick, send, decode, unwrap.
//!
//! # Components
//!
//! - [`Resolver`] - static or registry-watch endpoint discovery
//! - [`Balancer`] - the live endpoint set, random choice per call
//! - [`ServiceRegistry`] - external membership source, [`MemoryRegistry`] in-process
//! - [`Transport`] - HTTP round trips, [`HyperTransport`] by default
//! - [`Client`] - ties the above together behind [`Client::invoke`]
//!
//! # Example
//!
//! ```no_run
//! use minirpc_client::{Client, ClientOptions, InvokeOption};
//! use minirpc_common::{CallContext, Enveloped};
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> minirpc_common::Result<()> {
//!     let client = Client::new("echo", "127.0.0.1:8080", ClientOptions::new()).await?;
//!
//!     let reply: Enveloped<Value> = client
//!         .invoke(&CallContext::new(), "/Echo/Say", Some(&json!({"text": "hi"})), &[])
//!         .await?;
//!     println!("{}", reply.0);
//!     Ok(())
//! }
//! ```

pub mod balancer;
pub mod client;
pub mod options;
pub mod registry;
pub mod resolver;
pub mod transport;

pub use balancer::{Balancer, RandomBalancer};
pub use client::Client;
pub use options::{ClientConfig, ClientOptions, InvokeOption, InvokeOptions};
pub use registry::{EndpointSet, EndpointSubset, MemoryRegistry, RegistryEvent, ServiceRegistry};
pub use resolver::{EndpointCallback, RegistryResolver, Resolver, StaticResolver};
pub use transport::{HyperTransport, Transport};
