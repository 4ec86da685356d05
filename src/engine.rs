//! Engine lifecycle: namespace root, aggregate node, target registration
//!
//! The engine replaces what would otherwise be ambient global state: it is
//! created once at startup, injected wherever proxies are built, and torn
//! down once. Everything it owns unwinds in the reverse of the order it
//! was acquired.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::device::DeviceResolver;
use crate::proxy::ProxyTargetFactory;
use crate::stack::{StackError, StackRegistry, TargetRegistration};
use crate::stats::{Publication, PublishError, StatsNode, StatsRegistry};

/// Name of the node aggregating statistics across all proxied devices.
pub const AGGREGATE_NODE_NAME: &str = "all_devs";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to create the aggregate statistics node: {0}")]
    Publish(#[from] PublishError),

    #[error("target registration failed: {0}")]
    Register(#[from] StackError),
}

/// Process-wide proxy engine.
///
/// Drop order is teardown order: unregister the target type first, then
/// retract the aggregate node, then release the namespace root.
#[derive(Debug)]
pub struct ProxyEngine {
    _registration: TargetRegistration,
    aggregate: Publication,
    namespace: Arc<StatsRegistry>,
}

impl ProxyEngine {
    /// Bring the engine up: namespace root, then the aggregate node under
    /// it, then the target registration. A failure at any step unwinds the
    /// earlier steps in reverse before the error is returned.
    pub fn new(
        stack: &Arc<StackRegistry>,
        resolver: Arc<dyn DeviceResolver>,
    ) -> Result<Self, EngineError> {
        let namespace = StatsRegistry::new();
        let aggregate = namespace.publish(AGGREGATE_NODE_NAME)?;

        let factory =
            ProxyTargetFactory::new(Arc::clone(&namespace), aggregate.node(), resolver);
        let registration = stack.register(Arc::new(factory))?;

        info!("proxy engine up, aggregating under '{AGGREGATE_NODE_NAME}'");
        Ok(Self {
            _registration: registration,
            aggregate,
            namespace,
        })
    }

    /// The namespace external tooling polls.
    #[must_use]
    pub fn namespace(&self) -> Arc<StatsRegistry> {
        Arc::clone(&self.namespace)
    }

    /// Handle of the aggregate statistics node.
    #[must_use]
    pub fn aggregate(&self) -> Arc<StatsNode> {
        self.aggregate.node()
    }

    /// Tear the engine down. Underlying teardown problems are logged by
    /// the owning layers, never propagated; there is nobody left to
    /// receive them here.
    pub fn shutdown(self) {
        info!("shutting down proxy engine");
        // Ordered field drops do the actual work.
    }
}
