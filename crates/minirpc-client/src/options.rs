//! Client configuration and per-call options.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::balancer::Balancer;
use crate::registry::ServiceRegistry;
use crate::resolver::Resolver;
use crate::transport::{HyperTransport, Transport};
use minirpc_common::{code, Codec, JsonCodec, Metadata};

/// Environment variable overriding the service address given to a client
pub const TARGET_ENV: &str = "MINIRPC_TARGET";
/// Environment variable selecting the registry namespace
pub const NAMESPACE_ENV: &str = "MINIRPC_NAMESPACE";

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Replaces the address passed to `Client::new` when set
    pub target: Option<String>,
    /// Registry namespace; without one the address is used as-is
    pub namespace: Option<String>,
    /// Deadline applied to calls that carry none (in milliseconds)
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            target: None,
            namespace: None,
            timeout_ms: 30_000,
        }
    }
}

impl ClientConfig {
    /// Reads `MINIRPC_TARGET` and `MINIRPC_NAMESPACE`. Empty values are
    /// treated as unset.
    pub fn from_env() -> Self {
        let read = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        Self {
            target: read(TARGET_ENV),
            namespace: read(NAMESPACE_ENV),
            ..Self::default()
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// Settings for one call.
///
/// A client keeps a default set; every call clones it and applies its own
/// [`InvokeOption`]s on the copy.
#[derive(Debug, Clone)]
pub struct InvokeOptions {
    pub metadata: Metadata,
    pub expected_code: i32,
    pub codec: Arc<dyn Codec>,
    pub timeout: Option<Duration>,
    pub tracing: bool,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self {
            metadata: Metadata::new(),
            expected_code: code::OK,
            codec: Arc::new(JsonCodec),
            timeout: None,
            tracing: true,
        }
    }
}

impl InvokeOptions {
    pub fn apply(&mut self, opts: &[InvokeOption]) {
        for opt in opts {
            match opt {
                InvokeOption::Metadata(md) => self.metadata = self.metadata.merge(md),
                InvokeOption::ExpectedCode(code) => self.expected_code = *code,
                InvokeOption::Codec(codec) => self.codec = codec.clone(),
                InvokeOption::Timeout(timeout) => self.timeout = Some(*timeout),
                InvokeOption::Tracing(on) => self.tracing = *on,
            }
        }
    }
}

/// Per-call override
#[derive(Debug, Clone)]
pub enum InvokeOption {
    /// Extra metadata, unioned with the outgoing metadata of the call
    Metadata(Metadata),
    /// Envelope code that counts as success
    ExpectedCode(i32),
    Codec(Arc<dyn Codec>),
    Timeout(Duration),
    Tracing(bool),
}

impl InvokeOption {
    pub fn metadata(md: Metadata) -> Self {
        InvokeOption::Metadata(md)
    }

    pub fn expected_code(code: i32) -> Self {
        InvokeOption::ExpectedCode(code)
    }

    pub fn codec(codec: impl Codec + 'static) -> Self {
        InvokeOption::Codec(Arc::new(codec))
    }

    pub fn timeout(timeout: Duration) -> Self {
        InvokeOption::Timeout(timeout)
    }

    pub fn tracing(on: bool) -> Self {
        InvokeOption::Tracing(on)
    }
}

/// Collaborators and defaults used to build a client
#[derive(Clone)]
pub struct ClientOptions {
    pub(crate) balancer: Option<Arc<dyn Balancer>>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) resolver: Option<Arc<dyn Resolver>>,
    pub(crate) registry: Option<(Arc<dyn ServiceRegistry>, CancellationToken)>,
    pub(crate) config: ClientConfig,
    pub(crate) invoke: InvokeOptions,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            balancer: None,
            transport: Arc::new(HyperTransport::new()),
            resolver: None,
            registry: None,
            config: ClientConfig::default(),
            invoke: InvokeOptions::default(),
        }
    }
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `balancer` instead of a fresh random balancer.
    pub fn with_balancer(mut self, balancer: Arc<dyn Balancer>) -> Self {
        self.balancer = Some(balancer);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Uses `resolver` instead of deriving one from the address.
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Registry used when the config names a namespace.
    ///
    /// The endpoint watch stops when `shutdown` is cancelled (pass
    /// `Lifecycle::token()`) or when the last clone of the client is dropped.
    pub fn with_registry(
        mut self,
        registry: Arc<dyn ServiceRegistry>,
        shutdown: CancellationToken,
    ) -> Self {
        self.registry = Some((registry, shutdown));
        self
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.invoke.codec = codec;
        self
    }

    /// Metadata attached to every call of the client.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.invoke.metadata = metadata;
        self
    }

    pub fn with_expected_code(mut self, code: i32) -> Self {
        self.invoke.expected_code = code;
        self
    }

    pub fn with_tracing(mut self, on: bool) -> Self {
        self.invoke.tracing = on;
        self
    }
}
