//! Namespace of published statistics nodes
//!
//! A flat registry mapping names to live nodes, playing the role of the
//! attribute tree external tooling polls. Publication hands back an owning
//! guard; dropping the guard retracts the node from the namespace while any
//! poller that already looked the node up keeps a usable handle until it
//! drops it.

use std::ops::Deref;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::stats::node::StatsNode;

/// Capacity of the namespace event channel; laggy observers lose events,
/// never block publishers.
const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("a node named '{name}' is already published")]
    AlreadyPublished { name: String },
}

/// Namespace change notifications delivered to subscribed observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceEvent {
    Added(String),
    Removed(String),
}

/// The root collection under which every statistics node is published.
#[derive(Debug)]
pub struct StatsRegistry {
    nodes: DashMap<String, Arc<StatsNode>>,
    events: broadcast::Sender<NamespaceEvent>,
}

impl StatsRegistry {
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            nodes: DashMap::new(),
            events,
        })
    }

    /// Publish a fresh node under `name` and notify observers.
    ///
    /// The returned guard owns the publication: dropping it retracts the
    /// node. Name collisions leave the namespace exactly as it was.
    pub fn publish(self: &Arc<Self>, name: &str) -> Result<Publication, PublishError> {
        let node = match self.nodes.entry(name.to_string()) {
            Entry::Occupied(_) => {
                return Err(PublishError::AlreadyPublished {
                    name: name.to_string(),
                })
            }
            Entry::Vacant(slot) => {
                let node = Arc::new(StatsNode::new(name));
                slot.insert(Arc::clone(&node));
                node
            }
        };

        debug!(node = name, "published statistics node");
        // Nobody listening is fine.
        let _ = self.events.send(NamespaceEvent::Added(name.to_string()));

        Ok(Publication {
            registry: Arc::clone(self),
            node,
        })
    }

    /// Look up a live node by name. The returned handle stays readable even
    /// if the node is retracted afterwards.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<StatsNode>> {
        self.nodes.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Names of all currently published nodes, sorted for stable output.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.nodes.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Subscribe to namespace change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<NamespaceEvent> {
        self.events.subscribe()
    }

    fn retract(&self, name: &str) {
        if self.nodes.remove(name).is_some() {
            debug!(node = name, "retracted statistics node");
            let _ = self.events.send(NamespaceEvent::Removed(name.to_string()));
        } else {
            // Retraction runs on teardown paths; never propagate from here.
            warn!(node = name, "retract of a node that is not published");
        }
    }
}

/// Owning handle to one published node.
///
/// Holds the publication reference; dropping it removes the node from the
/// namespace. The node itself is freed when the last outstanding handle
/// (publication, owner or poller) goes away.
#[derive(Debug)]
pub struct Publication {
    registry: Arc<StatsRegistry>,
    node: Arc<StatsNode>,
}

impl Publication {
    /// Clone a plain handle to the node, as a poller lookup would.
    #[must_use]
    pub fn node(&self) -> Arc<StatsNode> {
        Arc::clone(&self.node)
    }
}

impl Deref for Publication {
    type Target = StatsNode;

    fn deref(&self) -> &Self::Target {
        &self.node
    }
}

impl Drop for Publication {
    fn drop(&mut self) {
        self.registry.retract(self.node.name());
    }
}
