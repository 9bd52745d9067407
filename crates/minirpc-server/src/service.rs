//! Service descriptors.
//!
//! A [`ServiceDesc`] names a service and lists its methods. Each
//! [`MethodDesc`] is built from a typed async function and carries the glue
//! the server needs to run it without knowing its types: decode the request,
//! dispatch through the interceptor chain and translate the result (or
//! error) into a [`Reply`] following the response type's envelope
//! capability.

use hyper::StatusCode;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;

use crate::interceptor::{server_handler, AnyMessage, Interceptor, ServerHandler};
use crate::reply::Reply;
use minirpc_common::{codec, code, CallContext, Codec, Envelope, Payload, Result, RpcError};

type DecodeFn = fn(&dyn Codec, &[u8]) -> Result<AnyMessage>;
type EncodeFn = fn(&dyn Codec, Result<AnyMessage>) -> Reply;

/// One method of a service
#[derive(Clone)]
pub struct MethodDesc {
    pub(crate) name: String,
    pub(crate) handler: ServerHandler,
    decode: DecodeFn,
    encode: EncodeFn,
    wraps: bool,
}

impl MethodDesc {
    /// Describes method `name` served by `f`.
    ///
    /// Whether results and errors are enveloped follows `Resp::WRAP`.
    pub fn new<Req, Resp, F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Payload,
        F: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp>> + Send + 'static,
    {
        let handler = server_handler(move |ctx, req: AnyMessage| {
            let call = req.downcast::<Req>().map(|req| f(ctx, *req));
            async move {
                let call = call.map_err(|_| mismatched("request"))?;
                Ok(Box::new(call.await?) as AnyMessage)
            }
        });

        Self {
            name: name.into(),
            handler,
            decode: decode_as::<Req>,
            encode: encode_as::<Resp>,
            wraps: Resp::WRAP,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this method answers with envelopes.
    pub fn wraps(&self) -> bool {
        self.wraps
    }

    pub(crate) fn decode(&self, codec: &dyn Codec, body: &[u8]) -> Result<AnyMessage> {
        (self.decode)(codec, body)
    }

    pub(crate) fn encode(&self, codec: &dyn Codec, result: Result<AnyMessage>) -> Reply {
        (self.encode)(codec, result)
    }
}

/// A service and its methods
#[derive(Clone)]
pub struct ServiceDesc {
    pub(crate) name: String,
    pub(crate) methods: Vec<MethodDesc>,
    pub(crate) interceptor: Option<Arc<dyn Interceptor>>,
}

impl ServiceDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
            interceptor: None,
        }
    }

    pub fn method(mut self, method: MethodDesc) -> Self {
        self.methods.push(method);
        self
    }

    /// Interceptor of the service itself, run before any interceptor given
    /// at registration.
    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `/{Service}/{Method}` for every method, in declaration order.
    pub fn paths(&self) -> Vec<String> {
        self.methods
            .iter()
            .map(|m| format!("/{}/{}", self.name, m.name))
            .collect()
    }

    /// Rejects descriptors that cannot be routed.
    pub fn validate(&self) -> Result<()> {
        let valid = |s: &str| !s.is_empty() && !s.contains('/');
        if !valid(&self.name) {
            return Err(RpcError::InvalidDescriptor(format!(
                "invalid service name {:?}",
                self.name
            )));
        }
        if self.methods.is_empty() {
            return Err(RpcError::InvalidDescriptor(format!(
                "service {} has no methods",
                self.name
            )));
        }
        if let Some(m) = self.methods.iter().find(|m| !valid(&m.name)) {
            return Err(RpcError::InvalidDescriptor(format!(
                "invalid method name {:?} in service {}",
                m.name, self.name
            )));
        }
        Ok(())
    }
}

fn mismatched(what: &str) -> RpcError {
    RpcError::status(
        code::INTERNAL,
        format!("{} type changed inside the interceptor chain", what),
    )
}

fn decode_as<Req: DeserializeOwned + Send + 'static>(
    codec: &dyn Codec,
    body: &[u8],
) -> Result<AnyMessage> {
    let req: Req = codec::decode(codec, body)?;
    Ok(Box::new(req))
}

fn encode_as<Resp: Payload>(codec: &dyn Codec, result: Result<AnyMessage>) -> Reply {
    let result = result.and_then(|msg| {
        msg.downcast::<Resp>()
            .map(|resp| *resp)
            .map_err(|_| mismatched("response"))
    });
    if let Err(e) = &result {
        tracing::error!(code = e.code(), "call failed: {}", e);
    }

    if !Resp::WRAP {
        return match result.and_then(|resp| codec::encode(codec, &resp)) {
            Ok(body) => Reply::success(body),
            Err(e) => Reply::error(&e),
        };
    }

    let envelope = match result {
        Ok(resp) => Envelope::success(resp),
        Err(e) => Envelope::error(e.code(), e.to_string()),
    };
    match codec::encode(codec, &envelope) {
        Ok(body) => Reply {
            status: StatusCode::OK,
            code: envelope.code,
            msg: envelope.msg,
            body,
        },
        Err(e) => Reply::error(&e),
    }
}
