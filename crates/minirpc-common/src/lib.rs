//! minirpc common types
//!
//! Types shared by the minirpc client and server:
//!
//! - [`error`] - the [`RpcError`] taxonomy and application status codes
//! - [`codec`] - the pluggable [`Codec`] interface and its JSON default
//! - [`metadata`] - multi-valued call [`Metadata`] with union merge
//! - [`envelope`] - the `{code, msg, data}` [`Envelope`] and the static
//!   wrap/unwrap capability on [`Payload`]
//! - [`context`] - the per-call [`CallContext`] and reserved header names
//! - [`lifecycle`] - the injected process [`Lifecycle`]
//!
//! # Wire format
//!
//! A call is an HTTP `POST /{Service}/{Method}` whose body is the encoded
//! request. Metadata travels as headers, next to a `traceid` header. Errors
//! that are not enveloped carry `statuscode`/`statusmsg` headers.
//!
//! # Example
//!
//! ```
//! use minirpc_common::{CallContext, Metadata};
//! use std::time::Duration;
//!
//! let mut ctx = CallContext::new().with_timeout(Duration::from_secs(5));
//! ctx.append_outgoing(&Metadata::new().with("token", "secret"));
//! assert_eq!(ctx.outgoing_token(), Some("secret"));
//! ```

pub mod codec;
pub mod context;
pub mod envelope;
pub mod error;
pub mod lifecycle;
pub mod metadata;

pub use codec::{Codec, JsonCodec};
pub use context::{
    generate_trace_id, CallContext, STATUS_CODE_HEADER, STATUS_MSG_HEADER, TRACE_ID_HEADER,
};
pub use envelope::{Envelope, Enveloped, Payload};
pub use error::{code, BoxError, Result, RpcError};
pub use lifecycle::Lifecycle;
pub use metadata::Metadata;

/// Panic payload that asks the serving layer to abort the current call.
///
/// Interceptors that recover panics re-raise this marker instead of turning it
/// into an error; the connection serving the call is then dropped without a
/// response.
#[derive(Debug, Clone, Copy)]
pub struct AbortCall;
