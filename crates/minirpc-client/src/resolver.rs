//! Endpoint resolution.
//!
//! A [`Resolver`] turns a logical service address into live endpoints and
//! reports membership changes to its subscribers. The client wires those
//! callbacks to its balancer.
//!
//! Two strategies are provided:
//!
//! - [`StaticResolver`]: one fixed address, announced once by `start`
//! - [`RegistryResolver`]: watches a [`ServiceRegistry`]; `start` returns
//!   once the initial snapshot has been applied and a background task then
//!   follows changes until the lifecycle token is cancelled
//!
//! Subscribers should be registered before `start`. A subscriber registered
//! later only sees events that happen after its registration.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::registry::{RegistryEvent, ServiceRegistry};
use minirpc_common::{Result, RpcError};

/// Callback receiving one endpoint
pub type EndpointCallback = Arc<dyn Fn(&str) + Send + Sync>;

#[async_trait]
pub trait Resolver: Send + Sync {
    /// Subscribes to endpoint additions.
    fn on_add(&self, cb: EndpointCallback);

    /// Subscribes to endpoint removals.
    fn on_del(&self, cb: EndpointCallback);

    /// Starts discovery. Returns once the initial endpoints were announced.
    async fn start(&self) -> Result<()>;
}

#[derive(Default)]
struct Subscribers {
    add: RwLock<Vec<EndpointCallback>>,
    del: RwLock<Vec<EndpointCallback>>,
}

impl Subscribers {
    fn added(&self, endpoint: &str) {
        tracing::debug!(endpoint, "endpoint added");
        // callbacks run outside the lock so they may subscribe in turn
        let callbacks = self.add.read().clone();
        for cb in callbacks {
            cb(endpoint);
        }
    }

    fn deleted(&self, endpoint: &str) {
        tracing::debug!(endpoint, "endpoint removed");
        let callbacks = self.del.read().clone();
        for cb in callbacks {
            cb(endpoint);
        }
    }
}

/// Resolves to a single fixed address
pub struct StaticResolver {
    addr: String,
    subscribers: Subscribers,
}

impl StaticResolver {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            subscribers: Subscribers::default(),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    fn on_add(&self, cb: EndpointCallback) {
        self.subscribers.add.write().push(cb);
    }

    fn on_del(&self, cb: EndpointCallback) {
        self.subscribers.del.write().push(cb);
    }

    async fn start(&self) -> Result<()> {
        self.subscribers.added(&self.addr);
        Ok(())
    }
}

/// Resolves a service through a [`ServiceRegistry`] watch
pub struct RegistryResolver {
    registry: Arc<dyn ServiceRegistry>,
    namespace: String,
    service: String,
    shutdown: CancellationToken,
    subscribers: Arc<Subscribers>,
}

impl RegistryResolver {
    /// Creates a resolver for `service` in `namespace`.
    ///
    /// # Arguments
    ///
    /// * `registry` - The registry to watch
    /// * `namespace` - Namespace the service is published in
    /// * `service` - Name of the endpoint set to follow
    /// * `shutdown` - Cancelling this token stops the background watch
    pub fn new(
        registry: Arc<dyn ServiceRegistry>,
        namespace: impl Into<String>,
        service: impl Into<String>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            namespace: namespace.into(),
            service: service.into(),
            shutdown,
            subscribers: Arc::new(Subscribers::default()),
        }
    }

    fn discovery_error(&self, reason: &str) -> RpcError {
        RpcError::discovery(
            format!("{}/{}", self.namespace, self.service),
            reason.to_string(),
        )
    }

    async fn follow(
        mut events: mpsc::UnboundedReceiver<RegistryEvent>,
        service: String,
        subscribers: Arc<Subscribers>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("stop watching endpoints of {}", service);
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => apply(&service, &subscribers, event),
                    None => {
                        tracing::warn!("endpoint watch of {} closed by the registry", service);
                        break;
                    }
                }
            }
        }
    }
}

fn apply(service: &str, subscribers: &Subscribers, event: RegistryEvent) {
    match event {
        RegistryEvent::Added(set) if set.name == service => {
            for ep in set.endpoints() {
                subscribers.added(&ep);
            }
        }
        RegistryEvent::Updated { old, new } if new.name == service => {
            for ep in old.endpoints() {
                subscribers.deleted(&ep);
            }
            for ep in new.endpoints() {
                subscribers.added(&ep);
            }
        }
        RegistryEvent::Deleted(set) if set.name == service => {
            for ep in set.endpoints() {
                subscribers.deleted(&ep);
            }
        }
        _ => {}
    }
}

#[async_trait]
impl Resolver for RegistryResolver {
    fn on_add(&self, cb: EndpointCallback) {
        self.subscribers.add.write().push(cb);
    }

    fn on_del(&self, cb: EndpointCallback) {
        self.subscribers.del.write().push(cb);
    }

    async fn start(&self) -> Result<()> {
        let mut events = self
            .registry
            .watch(&self.namespace, &self.service)
            .await
            .map_err(|e| match e {
                e @ RpcError::Discovery { .. } => e,
                e => RpcError::discovery(format!("{}/{}", self.namespace, self.service), e),
            })?;

        loop {
            let event = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Err(self.discovery_error("cancelled before initial sync"));
                }
                event = events.recv() => event,
            };
            match event {
                Some(RegistryEvent::Synced) => break,
                Some(event) => apply(&self.service, &self.subscribers, event),
                None => return Err(self.discovery_error("watch closed before initial sync")),
            }
        }

        tracing::info!(
            "resolved {}/{}, following changes",
            self.namespace,
            self.service
        );
        tokio::spawn(Self::follow(
            events,
            self.service.clone(),
            self.subscribers.clone(),
            self.shutdown.clone(),
        ));
        Ok(())
    }
}
