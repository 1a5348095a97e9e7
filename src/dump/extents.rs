//! Extent set: which block addresses have been captured
//!
//! Stored as disjoint half-open ranges keyed by start address. Ranges that
//! overlap or touch are merged on insert, so the map is always canonical.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::ops::Range;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtentSet {
    /// start -> end (exclusive)
    ranges: BTreeMap<u64, u64>,
}

impl ExtentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Number of disjoint ranges.
    pub fn range_count(&self) -> usize {
        self.ranges.len()
    }

    /// Total number of covered blocks.
    pub fn block_count(&self) -> u64 {
        self.ranges.iter().map(|(start, end)| end - start).sum()
    }

    pub fn contains(&self, address: u64) -> bool {
        match self.ranges.range(..=address).next_back() {
            Some((_, &end)) => address < end,
            None => false,
        }
    }

    /// True when every address of `range` is covered.
    pub fn contains_range(&self, range: Range<u64>) -> bool {
        if range.is_empty() {
            return true;
        }
        match self.ranges.range(..=range.start).next_back() {
            Some((_, &end)) => range.end <= end,
            None => false,
        }
    }

    /// Union `[start, start + length)` into the set.
    pub fn insert(&mut self, start: u64, length: u64) {
        if length == 0 {
            return;
        }
        let mut new_start = start;
        let mut new_end = start.saturating_add(length);

        // A predecessor that overlaps or touches absorbs into the new range
        if let Some((&prev_start, &prev_end)) = self.ranges.range(..=new_start).next_back() {
            if prev_end >= new_start {
                new_start = prev_start;
                new_end = new_end.max(prev_end);
            }
        }

        let absorbed: Vec<u64> = self
            .ranges
            .range(new_start..=new_end)
            .map(|(&s, _)| s)
            .collect();
        for s in absorbed {
            if let Some(e) = self.ranges.remove(&s) {
                new_end = new_end.max(e);
            }
        }

        self.ranges.insert(new_start, new_end);
    }

    /// One past the highest covered address.
    pub fn end(&self) -> Option<u64> {
        self.ranges.values().next_back().copied()
    }

    pub fn insert_one(&mut self, address: u64) {
        self.insert(address, 1);
    }

    pub fn insert_range(&mut self, range: Range<u64>) {
        if range.end > range.start {
            self.insert(range.start, range.end - range.start);
        }
    }

    pub fn union(&mut self, other: &ExtentSet) {
        for range in other.iter() {
            self.insert_range(range);
        }
    }

    /// Half-open ranges in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = Range<u64>> + '_ {
        self.ranges.iter().map(|(&start, &end)| start..end)
    }

    /// Inclusive `[start, end]` pairs, the persisted form.
    pub fn to_inclusive_pairs(&self) -> Vec<[u64; 2]> {
        self.ranges
            .iter()
            .map(|(&start, &end)| [start, end - 1])
            .collect()
    }

    pub fn from_inclusive_pairs(pairs: &[[u64; 2]]) -> Result<Self, String> {
        let mut set = Self::new();
        for &[start, end] in pairs {
            if end < start {
                return Err(format!("extent [{}, {}] ends before it starts", start, end));
            }
            let exclusive = end
                .checked_add(1)
                .ok_or_else(|| format!("extent [{}, {}] ends past the address space", start, end))?;
            set.insert(start, exclusive - start);
        }
        Ok(set)
    }

    /// Addresses inside `range` that are not covered.
    pub fn gaps(&self, range: Range<u64>) -> Vec<Range<u64>> {
        let mut gaps = Vec::new();
        let mut cursor = range.start;
        for covered in self.iter() {
            if covered.end <= cursor {
                continue;
            }
            if covered.start >= range.end {
                break;
            }
            if covered.start > cursor {
                gaps.push(cursor..covered.start.min(range.end));
            }
            cursor = cursor.max(covered.end);
            if cursor >= range.end {
                break;
            }
        }
        if cursor < range.end {
            gaps.push(cursor..range.end);
        }
        gaps
    }
}

impl Serialize for ExtentSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_inclusive_pairs().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ExtentSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pairs = Vec::<[u64; 2]>::deserialize(deserializer)?;
        ExtentSet::from_inclusive_pairs(&pairs).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(set: &ExtentSet) -> Vec<Range<u64>> {
        set.iter().collect()
    }

    #[test]
    fn adjacent_ranges_merge() {
        let mut set = ExtentSet::new();
        set.insert(0, 10);
        set.insert(10, 5);
        assert_eq!(ranges(&set), vec![0..15]);

        set.insert(20, 5);
        assert_eq!(ranges(&set), vec![0..15, 20..25]);

        // bridging insert swallows both neighbours
        set.insert(12, 9);
        assert_eq!(ranges(&set), vec![0..25]);
        assert_eq!(set.block_count(), 25);
    }

    #[test]
    fn insert_inside_and_over_existing_ranges() {
        let mut set = ExtentSet::new();
        set.insert(10, 10);
        set.insert(12, 2);
        assert_eq!(ranges(&set), vec![10..20]);

        set.insert(30, 2);
        set.insert(40, 2);
        set.insert(5, 50);
        assert_eq!(ranges(&set), vec![5..55]);
    }

    #[test]
    fn membership() {
        let mut set = ExtentSet::new();
        set.insert(100, 4);
        set.insert_one(200);
        assert!(!set.contains(99));
        assert!(set.contains(100));
        assert!(set.contains(103));
        assert!(!set.contains(104));
        assert!(set.contains(200));
        assert!(set.contains_range(100..104));
        assert!(!set.contains_range(100..105));
    }

    #[test]
    fn gaps_report_missing_addresses() {
        let mut set = ExtentSet::new();
        set.insert(0, 50);
        set.insert(53, 147);
        assert_eq!(set.gaps(0..200), vec![50..53]);
        assert_eq!(set.gaps(0..250), vec![50..53, 200..250]);
        assert!(ExtentSet::new().gaps(5..5).is_empty());
    }

    #[test]
    fn persisted_form_is_inclusive_pairs() {
        let mut set = ExtentSet::new();
        set.insert(0, 50);
        set.insert(53, 147);

        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, "[[0,49],[53,199]]");

        let back: ExtentSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);

        assert!(serde_json::from_str::<ExtentSet>("[[5,4]]").is_err());
    }

    #[test]
    fn pairs_reaching_the_top_of_the_address_space_are_rejected() {
        assert!(ExtentSet::from_inclusive_pairs(&[[5, u64::MAX]]).is_err());

        let set = ExtentSet::from_inclusive_pairs(&[[5, u64::MAX - 1]]).unwrap();
        assert_eq!(set.end(), Some(u64::MAX));

        let mut set = ExtentSet::new();
        set.insert(u64::MAX - 2, 10);
        assert_eq!(ranges(&set), vec![u64::MAX - 2..u64::MAX]);
        assert_eq!(ExtentSet::new().end(), None);
    }
}
