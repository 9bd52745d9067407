use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::DropGuard;
use tracing::Instrument;

use crate::balancer::{Balancer, RandomBalancer};
use crate::options::{ClientOptions, InvokeOption, InvokeOptions};
use crate::resolver::{RegistryResolver, Resolver, StaticResolver};
use crate::transport::Transport;
use minirpc_common::{
    codec, generate_trace_id, CallContext, Envelope, Payload, Result, RpcError, STATUS_CODE_HEADER,
    STATUS_MSG_HEADER, TRACE_ID_HEADER,
};

/// minirpc client for one logical service
///
/// The client resolves its address once at construction and keeps the
/// resulting endpoints in a balancer that the resolver updates in the
/// background. Every call picks one endpoint; clones share that state.
/// A registry watch ends when its shutdown token fires or when the last
/// clone is dropped.
#[derive(Clone)]
pub struct Client {
    name: String,
    target: String,
    balancer: Arc<dyn Balancer>,
    transport: Arc<dyn Transport>,
    options: InvokeOptions,
    default_timeout: Duration,
    _watch: Option<Arc<DropGuard>>,
}

impl Client {
    /// Creates a client for the service at `addr`.
    ///
    /// The address is replaced by `config.target` when one is set. With a
    /// registry and a namespace configured, the address is the name of the
    /// endpoint set to watch; otherwise it is used as a single `host:port`.
    /// Returns once the initial endpoints are known.
    ///
    /// # Arguments
    ///
    /// * `name` - Name used in logs and spans
    /// * `addr` - The service address
    /// * `options` - Collaborators and call defaults
    ///
    /// # Returns
    ///
    /// A ready client, or a `Discovery` error if resolution failed
    pub async fn new(
        name: impl Into<String>,
        addr: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self> {
        let name = name.into();
        let ClientOptions {
            balancer,
            transport,
            resolver,
            registry,
            config,
            invoke,
        } = options;

        let target = config.target.clone().unwrap_or_else(|| addr.into());
        let mut watch = None;
        let resolver: Arc<dyn Resolver> = match (resolver, registry, config.namespace.as_deref()) {
            (Some(resolver), _, _) => resolver,
            (None, Some((registry, shutdown)), Some(namespace)) if !namespace.is_empty() => {
                let token = shutdown.child_token();
                watch = Some(Arc::new(token.clone().drop_guard()));
                Arc::new(RegistryResolver::new(
                    registry,
                    namespace,
                    target.clone(),
                    token,
                ))
            }
            _ => Arc::new(StaticResolver::new(target.clone())),
        };

        let balancer = balancer.unwrap_or_else(|| Arc::new(RandomBalancer::new()));
        let on_add = balancer.clone();
        resolver.on_add(Arc::new(move |ep| on_add.add(ep)));
        let on_del = balancer.clone();
        resolver.on_del(Arc::new(move |ep| on_del.del(ep)));
        resolver.start().await?;

        tracing::info!(
            "client {} resolved {} endpoint(s) for {}",
            name,
            balancer.len(),
            target
        );

        Ok(Self {
            name,
            target,
            balancer,
            transport,
            options: invoke,
            default_timeout: Duration::from_millis(config.timeout_ms),
            _watch: watch,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Number of endpoints currently live.
    pub fn endpoints(&self) -> usize {
        self.balancer.len()
    }

    /// Calls `path` on one endpoint of the service.
    ///
    /// The call is bounded by the earliest of the context deadline and the
    /// per-call timeout, falling back to the client default when neither is
    /// set. Outgoing metadata of `ctx` is unioned with the call's metadata
    /// and sent as headers. When `Resp` is unwrap-capable the response is
    /// decoded through an envelope whose code must equal the expected code.
    ///
    /// # Arguments
    ///
    /// * `ctx` - Call context (deadline, outgoing metadata, trace id)
    /// * `path` - `/{Service}/{Method}`
    /// * `req` - Request payload, `None` to send an empty body
    /// * `opts` - Overrides applied to a copy of the client defaults
    pub async fn invoke<Req, Resp>(
        &self,
        ctx: &CallContext,
        path: &str,
        req: Option<&Req>,
        opts: &[InvokeOption],
    ) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: Payload,
    {
        let mut options = self.options.clone();
        options.apply(opts);

        let endpoint = self.balancer.pick()?;
        let span = if options.tracing {
            tracing::info_span!("invoke", client = %self.name, path, endpoint = %endpoint)
        } else {
            tracing::Span::none()
        };

        self.invoke_endpoint(ctx, &endpoint, path, req, &options)
            .instrument(span)
            .await
    }

    async fn invoke_endpoint<Req, Resp>(
        &self,
        ctx: &CallContext,
        endpoint: &str,
        path: &str,
        req: Option<&Req>,
        options: &InvokeOptions,
    ) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: Payload,
    {
        let url = format!("http://{}{}", endpoint, path);
        let codec = options.codec.as_ref();

        let body = match req {
            Some(req) => codec::encode(codec, req)?,
            None => Bytes::new(),
        };

        let trace_id = ctx
            .trace_id()
            .map(str::to_string)
            .unwrap_or_else(generate_trace_id);
        let mut request = Request::builder()
            .method(Method::POST)
            .uri(&url)
            .header(CONTENT_TYPE, codec.content_type())
            .header(TRACE_ID_HEADER, trace_id.as_str())
            .body(Full::new(body))
            .map_err(|e| RpcError::Transport {
                method: Method::POST.to_string(),
                url: url.clone(),
                source: Box::new(e),
            })?;
        ctx.outgoing()
            .merge(&options.metadata)
            .write_headers(request.headers_mut())?;

        let timeout = [ctx.remaining(), options.timeout]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(self.default_timeout);

        tracing::debug!(url = %url, trace_id = %trace_id, "start invoke");
        let started = Instant::now();
        let response = match tokio::time::timeout(timeout, self.transport.round_trip(request)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(source)) => {
                return Err(RpcError::Transport {
                    method: Method::POST.to_string(),
                    url,
                    source,
                })
            }
            Err(_) => {
                return Err(RpcError::DeadlineExceeded {
                    url,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        };
        tracing::debug!(
            url = %url,
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "invoke finish"
        );

        check_status(path, &response)?;
        decode_response(options, response.body())
    }
}

/// Maps non-2xx responses to errors.
fn check_status(path: &str, response: &Response<Bytes>) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::NOT_FOUND {
        return Err(RpcError::NotFound {
            path: path.to_string(),
        });
    }

    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
    };
    let code = header(STATUS_CODE_HEADER)
        .and_then(|c| c.parse().ok())
        .unwrap_or(status.as_u16() as i32);
    let message = header(STATUS_MSG_HEADER)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string());
    Err(RpcError::status(code, message))
}

fn decode_response<Resp: Payload>(options: &InvokeOptions, body: &[u8]) -> Result<Resp> {
    let codec = options.codec.as_ref();
    if !Resp::UNWRAP {
        return codec::decode(codec, body);
    }

    let envelope: Envelope<Value> = codec::decode(codec, body)?;
    if envelope.code != options.expected_code {
        return Err(RpcError::UnexpectedCode {
            expected: options.expected_code,
            actual: envelope.code,
            message: envelope.msg,
        });
    }
    match envelope.data {
        Some(data) => Ok(serde_json::from_value(data)?),
        None => serde_json::from_value(Value::Null).map_err(|_| RpcError::MissingData),
    }
}
