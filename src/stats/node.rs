//! Published statistics node: a named set of read-only attributes
//!
//! A node wraps one [`IoStats`] and renders it through a fixed attribute
//! set. Nodes are handed out as `Arc`s: the namespace holds one reference
//! for publication, the owning proxy holds one, and external pollers clone
//! more. The counters are freed together with the node when the last
//! reference drops, so a poller that grabbed a handle just before teardown
//! still reads safely.

use std::io;
use std::str::FromStr;

use crate::stats::counters::{FamilySnapshot, IoStats, StatsSummary};
use crate::types::IoClass;

/// The fixed set of attributes every node publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    ReadCount,
    WriteCount,
    TotalCount,
    ReadAvgSize,
    WriteAvgSize,
    TotalAvgSize,
    Summary,
}

impl Attribute {
    pub const ALL: [Attribute; 7] = [
        Attribute::ReadCount,
        Attribute::WriteCount,
        Attribute::TotalCount,
        Attribute::ReadAvgSize,
        Attribute::WriteAvgSize,
        Attribute::TotalAvgSize,
        Attribute::Summary,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ReadCount => "read_count",
            Self::WriteCount => "write_count",
            Self::TotalCount => "total_count",
            Self::ReadAvgSize => "read_avg_size",
            Self::WriteAvgSize => "write_avg_size",
            Self::TotalAvgSize => "total_avg_size",
            Self::Summary => "summary",
        }
    }
}

impl FromStr for Attribute {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|a| a.name() == s)
            .ok_or(())
    }
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One published statistics object, named after the device it describes.
#[derive(Debug)]
pub struct StatsNode {
    name: String,
    counters: IoStats,
}

impl StatsNode {
    #[must_use]
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            counters: IoStats::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Count one request into the owned counters.
    #[inline]
    pub fn record(&self, class: IoClass, size: u32) {
        self.counters.record(class, size);
    }

    #[must_use]
    pub fn reads(&self) -> FamilySnapshot {
        self.counters.reads()
    }

    #[must_use]
    pub fn writes(&self) -> FamilySnapshot {
        self.counters.writes()
    }

    #[must_use]
    pub fn summary(&self) -> StatsSummary {
        self.counters.combined()
    }

    /// Render one attribute as its textual value.
    ///
    /// Scalar attributes are a single decimal followed by a newline. The
    /// `summary` attribute renders all six values from one combined
    /// snapshot so the lines can never contradict each other.
    #[must_use]
    pub fn render(&self, attr: Attribute) -> String {
        match attr {
            Attribute::ReadCount => format!("{}\n", self.counters.reads().count),
            Attribute::ReadAvgSize => format!("{}\n", self.counters.reads().avg_size),
            Attribute::WriteCount => format!("{}\n", self.counters.writes().count),
            Attribute::WriteAvgSize => format!("{}\n", self.counters.writes().avg_size),
            Attribute::TotalCount => format!("{}\n", self.counters.combined().total.count),
            Attribute::TotalAvgSize => format!("{}\n", self.counters.combined().total.avg_size),
            Attribute::Summary => {
                let s = self.counters.combined();
                format!(
                    "read:\n\treqs: {}\n\tavg size: {}\nwrite:\n\treqs: {}\n\tavg size: {}\ntotal:\n\treqs: {}\n\tavg size: {}\n",
                    s.read.count,
                    s.read.avg_size,
                    s.write.count,
                    s.write.avg_size,
                    s.total.count,
                    s.total.avg_size,
                )
            }
        }
    }

    /// Attributes are read-only; every store attempt fails the same way.
    pub fn store(&self, _attr: Attribute, _value: &str) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "statistics attributes are read-only",
        ))
    }
}
