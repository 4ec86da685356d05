//! Transparent block device proxy with live I/O statistics
//!
//! dmproxy interposes on a block I/O path: every request submitted to a
//! proxied device is forwarded unchanged to the underlying device, and on
//! the way through it is counted into a per-device statistics node and
//! into an aggregate node spanning all proxied devices. The resulting
//! counters and averages are published as read-only named attributes that
//! external tooling polls, concurrently with update traffic.
//!
//! The [`engine::ProxyEngine`] owns the publication namespace and the
//! aggregate node and registers the proxy target type with the
//! [`stack::StackRegistry`]; virtual devices built from that target carry
//! the actual request flow.

pub mod args;
pub mod config;
pub mod device;
pub mod engine;
pub mod logging;
pub mod proxy;
pub mod server;
pub mod stack;
pub mod stats;
pub mod types;

pub use config::{create_default_config, load_config, Config, DeviceConfig};
pub use engine::{ProxyEngine, AGGREGATE_NODE_NAME};
pub use proxy::{ProxyTarget, TARGET_NAME};
pub use stack::{StackRegistry, VirtualDevice};
