//! The proxy target: forwards requests unchanged, counts them on the way
//!
//! One [`ProxyTarget`] exists per proxied device. It exclusively owns the
//! resolved underlying device and the published statistics node for that
//! device, and shares the engine-wide aggregate node with every other
//! proxy instance.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::device::{AccessMode, BlockDevice, DeviceLookupError, DeviceResolver};
use crate::stack::{MapDisposition, Target, TargetFactory, TargetVersion};
use crate::stats::{Publication, PublishError, StatsNode, StatsRegistry};
use crate::types::IoRequest;

/// Name this target type registers under.
pub const TARGET_NAME: &str = "dmp";

/// Version advertised alongside the target name.
pub const TARGET_VERSION: TargetVersion = TargetVersion(1, 0, 0);

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("invalid argument count: expected exactly one underlying device, got {got}")]
    InvalidArgumentCount { got: usize },

    #[error("device lookup failed: {0}")]
    DeviceLookup(#[from] DeviceLookupError),

    #[error("failed to publish statistics node: {0}")]
    Publish(#[from] PublishError),
}

/// Per-device proxy context.
///
/// Field order fixes teardown: the device handle is released before the
/// statistics node is retracted.
#[derive(Debug)]
pub struct ProxyTarget {
    device: Arc<dyn BlockDevice>,
    stats: Publication,
    aggregate: Arc<StatsNode>,
}

impl ProxyTarget {
    /// Build a proxy from its table arguments: exactly one positional
    /// argument naming the underlying device.
    ///
    /// Construction either fully succeeds or unwinds every resource it
    /// already acquired, in reverse order, and leaves the namespace
    /// untouched.
    pub fn construct(
        namespace: &Arc<StatsRegistry>,
        aggregate: Arc<StatsNode>,
        resolver: &dyn DeviceResolver,
        mode: AccessMode,
        args: &[String],
    ) -> Result<Self, TargetError> {
        let [identifier] = args else {
            return Err(TargetError::InvalidArgumentCount { got: args.len() });
        };

        let device = resolver.resolve(identifier, mode)?;
        let stats = namespace.publish(identifier)?;

        info!(
            device = %device.name(),
            capacity = device.capacity_bytes(),
            "proxying device"
        );

        Ok(Self {
            device,
            stats,
            aggregate,
        })
    }

    /// Handle of the published per-device statistics node.
    #[must_use]
    pub fn stats(&self) -> Arc<StatsNode> {
        self.stats.node()
    }

    #[must_use]
    pub fn device_name(&self) -> &str {
        self.device.name()
    }
}

impl Target for ProxyTarget {
    /// Forward the request to the underlying device unchanged.
    ///
    /// Statistics recording happens after the routing decision and can
    /// never alter it; anomalies are logged, not propagated.
    fn map(&self, request: &IoRequest) -> MapDisposition {
        let destination = Arc::clone(&self.device);

        if request.size == 0 {
            warn!(device = %self.device.name(), class = %request.class, "zero-size request");
        }

        self.stats.record(request.class, request.size);
        self.aggregate.record(request.class, request.size);

        MapDisposition::Remapped(destination)
    }

    fn capacity_bytes(&self) -> u64 {
        self.device.capacity_bytes()
    }
}

/// Factory the engine registers with the storage stack.
#[derive(Debug)]
pub struct ProxyTargetFactory {
    namespace: Arc<StatsRegistry>,
    aggregate: Arc<StatsNode>,
    resolver: Arc<dyn DeviceResolver>,
}

impl ProxyTargetFactory {
    #[must_use]
    pub fn new(
        namespace: Arc<StatsRegistry>,
        aggregate: Arc<StatsNode>,
        resolver: Arc<dyn DeviceResolver>,
    ) -> Self {
        Self {
            namespace,
            aggregate,
            resolver,
        }
    }
}

impl TargetFactory for ProxyTargetFactory {
    fn target_name(&self) -> &str {
        TARGET_NAME
    }

    fn version(&self) -> TargetVersion {
        TARGET_VERSION
    }

    fn create(
        &self,
        device_name: &str,
        args: &[String],
        mode: AccessMode,
    ) -> anyhow::Result<Box<dyn Target>> {
        info!(device = device_name, ?args, "constructing proxy target");
        let target = ProxyTarget::construct(
            &self.namespace,
            Arc::clone(&self.aggregate),
            self.resolver.as_ref(),
            mode,
            args,
        )?;
        Ok(Box::new(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemDeviceResolver;
    use crate::types::IoClass;

    fn fixture() -> (Arc<StatsRegistry>, Publication, MemDeviceResolver) {
        let namespace = StatsRegistry::new();
        let aggregate = namespace.publish("all_devs").unwrap();
        let mut resolver = MemDeviceResolver::new();
        resolver.add_new("dev0", 1 << 20);
        (namespace, aggregate, resolver)
    }

    #[test]
    fn test_construct_rejects_bad_argument_counts() {
        let (namespace, aggregate, resolver) = fixture();

        for args in [vec![], vec!["dev0".to_string(), "extra".to_string()]] {
            let err = ProxyTarget::construct(
                &namespace,
                aggregate.node(),
                &resolver,
                AccessMode::ReadWrite,
                &args,
            )
            .unwrap_err();
            assert!(matches!(
                err,
                TargetError::InvalidArgumentCount { got } if got == args.len()
            ));
        }

        // Nothing was published besides the aggregate.
        assert_eq!(namespace.len(), 1);
    }

    #[test]
    fn test_failed_lookup_leaves_namespace_unchanged() {
        let (namespace, aggregate, resolver) = fixture();

        let err = ProxyTarget::construct(
            &namespace,
            aggregate.node(),
            &resolver,
            AccessMode::ReadWrite,
            &["ghost".to_string()],
        )
        .unwrap_err();

        assert!(matches!(err, TargetError::DeviceLookup(_)));
        assert_eq!(namespace.names(), vec!["all_devs".to_string()]);
    }

    #[test]
    fn test_construct_publishes_under_device_identifier() {
        let (namespace, aggregate, resolver) = fixture();

        let target = ProxyTarget::construct(
            &namespace,
            aggregate.node(),
            &resolver,
            AccessMode::ReadWrite,
            &["dev0".to_string()],
        )
        .unwrap();

        assert!(namespace.lookup("dev0").is_some());
        assert_eq!(target.device_name(), "dev0");

        drop(target);
        assert!(namespace.lookup("dev0").is_none());
    }

    #[test]
    fn test_map_counts_into_both_nodes() {
        let (namespace, aggregate, resolver) = fixture();
        let target = ProxyTarget::construct(
            &namespace,
            aggregate.node(),
            &resolver,
            AccessMode::ReadWrite,
            &["dev0".to_string()],
        )
        .unwrap();

        let disposition = target.map(&IoRequest::new(IoClass::Read, 0, 4096));
        assert!(matches!(disposition, MapDisposition::Remapped(_)));

        assert_eq!(target.stats().reads().count, 1);
        assert_eq!(aggregate.reads().count, 1);
    }

    #[test]
    fn test_map_ignores_uncounted_classes() {
        let (namespace, aggregate, resolver) = fixture();
        let target = ProxyTarget::construct(
            &namespace,
            aggregate.node(),
            &resolver,
            AccessMode::ReadWrite,
            &["dev0".to_string()],
        )
        .unwrap();

        let disposition = target.map(&IoRequest::new(IoClass::Other, 0, 0));
        assert!(matches!(disposition, MapDisposition::Remapped(_)));
        assert_eq!(target.stats().summary().total.count, 0);
    }
}
