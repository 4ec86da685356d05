//! Live I/O statistics: counters, published nodes and the namespace
//!
//! Updates come in concurrently from every I/O submission path; the module
//! keeps the read and write families behind separate locks so the hot path
//! never contends across families, and publishes the results through
//! read-only named attributes that external tooling polls at any time.

mod counters;
mod node;
mod registry;

pub use counters::{FamilySnapshot, IoStats, StatsSummary};
pub use node::{Attribute, StatsNode};
pub use registry::{NamespaceEvent, Publication, PublishError, StatsRegistry};
