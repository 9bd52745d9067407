//! Service registry interface.
//!
//! A [`ServiceRegistry`] is the external source of truth for which instances
//! of a service are alive. Registries publish membership as [`EndpointSet`]s
//! (one per service name) and stream changes as [`RegistryEvent`]s. The
//! registry resolver consumes that stream; [`MemoryRegistry`] is an
//! in-process implementation for tests, demos and single-binary deployments.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;

use minirpc_common::Result;

/// Addresses that share a set of ports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointSubset {
    pub addresses: Vec<String>,
    pub ports: Vec<u16>,
}

/// Published membership of one service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointSet {
    pub name: String,
    pub subsets: Vec<EndpointSubset>,
}

impl EndpointSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subsets: Vec::new(),
        }
    }

    /// Adds a subset of `addresses` served on `ports`.
    pub fn with_subset<A, S>(mut self, addresses: A, ports: &[u16]) -> Self
    where
        A: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subsets.push(EndpointSubset {
            addresses: addresses.into_iter().map(Into::into).collect(),
            ports: ports.to_vec(),
        });
        self
    }

    /// Flattens the set into `ip:port` endpoints.
    ///
    /// Each address is paired with the first port of its subset; subsets
    /// without ports contribute nothing.
    pub fn endpoints(&self) -> Vec<String> {
        self.subsets
            .iter()
            .filter_map(|subset| subset.ports.first().map(|port| (subset, *port)))
            .flat_map(|(subset, port)| {
                subset
                    .addresses
                    .iter()
                    .map(move |ip| format!("{}:{}", ip, port))
            })
            .collect()
    }
}

/// A membership change seen by a watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Added(EndpointSet),
    Updated { old: EndpointSet, new: EndpointSet },
    Deleted(EndpointSet),
    /// Everything that existed when the watch opened has been delivered
    Synced,
}

#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Opens a watch on `namespace`.
    ///
    /// The stream starts with an `Added` event per existing set followed by
    /// `Synced`, then carries live changes. `service` is a hint; consumers
    /// must ignore events for other names.
    async fn watch(
        &self,
        namespace: &str,
        service: &str,
    ) -> Result<mpsc::UnboundedReceiver<RegistryEvent>>;
}

struct Watcher {
    namespace: String,
    tx: mpsc::UnboundedSender<RegistryEvent>,
}

#[derive(Default)]
struct RegistryState {
    sets: HashMap<String, HashMap<String, EndpointSet>>,
    watchers: Vec<Watcher>,
}

impl RegistryState {
    fn publish(&mut self, namespace: &str, event: RegistryEvent) {
        self.watchers.retain(|w| {
            w.namespace != namespace || w.tx.send(event.clone()).is_ok()
        });
    }
}

/// In-process registry
#[derive(Default)]
pub struct MemoryRegistry {
    state: Mutex<RegistryState>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `set`, replacing any previous set with the same name.
    pub fn upsert(&self, namespace: &str, set: EndpointSet) {
        let mut state = self.state.lock();
        let previous = state
            .sets
            .entry(namespace.to_string())
            .or_default()
            .insert(set.name.clone(), set.clone());
        let event = match previous {
            Some(old) => RegistryEvent::Updated { old, new: set },
            None => RegistryEvent::Added(set),
        };
        state.publish(namespace, event);
    }

    /// Withdraws the set called `name`. Returns whether it existed.
    pub fn remove(&self, namespace: &str, name: &str) -> bool {
        let mut state = self.state.lock();
        let removed = state
            .sets
            .get_mut(namespace)
            .and_then(|sets| sets.remove(name));
        match removed {
            Some(set) => {
                state.publish(namespace, RegistryEvent::Deleted(set));
                true
            }
            None => false,
        }
    }

    /// Number of open watches.
    pub fn watchers(&self) -> usize {
        let mut state = self.state.lock();
        state.watchers.retain(|w| !w.tx.is_closed());
        state.watchers.len()
    }
}

#[async_trait]
impl ServiceRegistry for MemoryRegistry {
    async fn watch(
        &self,
        namespace: &str,
        _service: &str,
    ) -> Result<mpsc::UnboundedReceiver<RegistryEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();

        if let Some(sets) = state.sets.get(namespace) {
            for set in sets.values() {
                let _ = tx.send(RegistryEvent::Added(set.clone()));
            }
        }
        let _ = tx.send(RegistryEvent::Synced);

        state.watchers.push(Watcher {
            namespace: namespace.to_string(),
            tx,
        });
        Ok(rx)
    }
}
