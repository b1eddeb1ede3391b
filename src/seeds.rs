//! The class-name accumulator threaded through one scan.
//!
//! A single [`SeedSet`] is owned by whoever starts a scan and is handed down
//! as `&mut` through every aggregate and leaf it visits. Whichever source adds
//! a name first owns that class for the rest of the scan; later sources see
//! the add fail and count a duplicate instead.

use lasso::Rodeo;

#[derive(Debug, Default)]
pub struct SeedSet {
    names: Rodeo,
}

impl SeedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `class_name`, returning `false` when an earlier source already
    /// claimed it.
    pub fn add(&mut self, class_name: &str) -> bool {
        if self.names.contains(class_name) {
            return false;
        }
        self.names.get_or_intern(class_name);
        true
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.names.contains(class_name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Class names in the order they were first claimed.
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.names.strings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_add_wins() {
        let mut seeds = SeedSet::new();
        assert!(seeds.add("a.B"));
        assert!(seeds.add("a.C"));
        assert!(!seeds.add("a.B"));
        assert_eq!(seeds.len(), 2);
        assert!(seeds.contains("a.C"));
        assert!(!seeds.contains("x.Y"));
    }

    #[test]
    fn iterates_in_claim_order() {
        let mut seeds = SeedSet::new();
        for name in ["z.Z", "a.A", "m.M", "a.A"] {
            seeds.add(name);
        }
        assert_eq!(seeds.iter().collect::<Vec<_>>(), vec!["z.Z", "a.A", "m.M"]);
    }
}
