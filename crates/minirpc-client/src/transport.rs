//! HTTP transport.
//!
//! The client only needs one primitive from the network: send a request and
//! get the full response back. [`Transport`] is that primitive and
//! [`HyperTransport`] implements it with a pooled hyper client; connection
//! reuse lives there, not in the call path.

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Request, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;

use minirpc_common::BoxError;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs one request and drains the response body.
    async fn round_trip(&self, req: Request<Full<Bytes>>) -> Result<Response<Bytes>, BoxError>;
}

/// [`Transport`] backed by a pooled hyper HTTP/1 client
#[derive(Clone)]
pub struct HyperTransport {
    client: HyperClient<HttpConnector, Full<Bytes>>,
}

impl HyperTransport {
    pub fn new() -> Self {
        let client = HyperClient::builder(TokioExecutor::new()).build_http();
        Self { client }
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn round_trip(&self, req: Request<Full<Bytes>>) -> Result<Response<Bytes>, BoxError> {
        let response = self.client.request(req).await?;
        let (parts, body) = response.into_parts();
        let body = body.collect().await?.to_bytes();
        Ok(Response::from_parts(parts, body))
    }
}
