//! Fixed-size scan counters.
//!
//! Every class source owns one [`ScanCounters`] and bumps it while it walks
//! its entries or reads its index. Aggregates merge the per-child deltas into
//! their own counters after each child scan.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanCount {
    /// Every visited entry, whatever branch it took.
    Entry,
    Container,
    RootContainer,
    NonRootContainer,
    /// Container entries that could not be adapted into a nested container.
    FailedContainer,
    Resource,
    NonClassResource,
    ClassResource,
    /// Reserved names (`META-INF` prefix, `module-info`) that are never streamed.
    UnsupportedClass,
    IncludedClass,
    DuplicateClass,
    ProcessedClass,
    UnprocessedClass,
}

impl ScanCount {
    pub const COUNT: usize = 13;

    pub const ALL: [ScanCount; Self::COUNT] = [
        ScanCount::Entry,
        ScanCount::Container,
        ScanCount::RootContainer,
        ScanCount::NonRootContainer,
        ScanCount::FailedContainer,
        ScanCount::Resource,
        ScanCount::NonClassResource,
        ScanCount::ClassResource,
        ScanCount::UnsupportedClass,
        ScanCount::IncludedClass,
        ScanCount::DuplicateClass,
        ScanCount::ProcessedClass,
        ScanCount::UnprocessedClass,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ScanCount::Entry => "entries",
            ScanCount::Container => "containers",
            ScanCount::RootContainer => "root_containers",
            ScanCount::NonRootContainer => "non_root_containers",
            ScanCount::FailedContainer => "failed_containers",
            ScanCount::Resource => "resources",
            ScanCount::NonClassResource => "non_class_resources",
            ScanCount::ClassResource => "class_resources",
            ScanCount::UnsupportedClass => "unsupported_classes",
            ScanCount::IncludedClass => "included_classes",
            ScanCount::DuplicateClass => "duplicate_classes",
            ScanCount::ProcessedClass => "processed_classes",
            ScanCount::UnprocessedClass => "unprocessed_classes",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanCounters {
    values: [u64; ScanCount::COUNT],
}

impl ScanCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: ScanCount) -> u64 {
        self.values[kind.slot()]
    }

    pub fn add(&mut self, kind: ScanCount) {
        self.add_n(kind, 1);
    }

    pub fn add_n(&mut self, kind: ScanCount, n: u64) {
        let slot = &mut self.values[kind.slot()];
        *slot = slot.saturating_add(n);
    }

    pub fn merge(&mut self, other: &ScanCounters) {
        for (mine, theirs) in self.values.iter_mut().zip(other.values.iter()) {
            *mine = mine.saturating_add(*theirs);
        }
    }

    /// Counts accumulated since `earlier` was snapshotted from these counters.
    pub fn since(&self, earlier: &ScanCounters) -> ScanCounters {
        let mut delta = ScanCounters::new();
        for (slot, (now, then)) in self.values.iter().zip(earlier.values.iter()).enumerate() {
            delta.values[slot] = now.saturating_sub(*then);
        }
        delta
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(|v| *v == 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ScanCount, u64)> + '_ {
        ScanCount::ALL.iter().map(|kind| (*kind, self.get(*kind)))
    }
}

impl Serialize for ScanCounters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(ScanCount::COUNT))?;
        for (kind, value) in self.iter() {
            map.serialize_entry(kind.name(), &value)?;
        }
        map.end()
    }
}

impl fmt::Display for ScanCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (kind, value) in self.iter().filter(|(_, v)| *v > 0) {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{}={value}", kind.name())?;
            first = false;
        }
        if first {
            f.write_str("empty")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_follow_declaration_order() {
        for (idx, kind) in ScanCount::ALL.iter().enumerate() {
            assert_eq!(kind.slot(), idx);
        }
    }

    #[test]
    fn merge_and_since_are_inverse() {
        let mut base = ScanCounters::new();
        base.add(ScanCount::Entry);
        base.add_n(ScanCount::IncludedClass, 3);

        let before = base.clone();
        let mut child = ScanCounters::new();
        child.add_n(ScanCount::Entry, 4);
        child.add(ScanCount::DuplicateClass);
        base.merge(&child);

        assert_eq!(base.get(ScanCount::Entry), 5);
        assert_eq!(base.get(ScanCount::IncludedClass), 3);
        assert_eq!(base.since(&before), child);
    }

    #[test]
    fn serializes_as_named_map() {
        let mut counters = ScanCounters::new();
        counters.add(ScanCount::RootContainer);
        let json = serde_json::to_value(&counters).unwrap();
        assert_eq!(json["root_containers"], 1);
        assert_eq!(json["entries"], 0);
        assert_eq!(json.as_object().unwrap().len(), ScanCount::COUNT);
    }

    #[test]
    fn display_lists_non_zero_counts() {
        let mut counters = ScanCounters::new();
        assert_eq!(counters.to_string(), "empty");
        counters.add(ScanCount::Entry);
        counters.add_n(ScanCount::ProcessedClass, 2);
        assert_eq!(counters.to_string(), "entries=1, processed_classes=2");
    }
}
