//! Per-contig interval sets with coalescing insertion and set algebra.

use crate::contig::ContigSet;
use crate::error::ValidationError;
use crate::interval::{parse_literals, GenomicInterval};
use coitrees::{BasicCOITree, Interval, IntervalTree};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::cmp::{max, min};

/// Sorted, non-overlapping half-open ranges on a single contig.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortedRanges {
    pub ranges: Vec<(i64, i64)>,
}

impl SortedRanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (i64, i64)> {
        self.ranges.iter()
    }

    /// Inserts `[start, end)`, coalescing with overlapping or touching ranges.
    pub fn insert(&mut self, start: i64, end: i64) {
        if start >= end {
            return;
        }
        let pos = match self.ranges.binary_search_by_key(&start, |&(s, _)| s) {
            Ok(pos) | Err(pos) => pos,
        };
        if pos > 0 && self.ranges[pos - 1].1 >= start {
            self.ranges[pos - 1].1 = max(self.ranges[pos - 1].1, end);
            self.merge_forward_from(pos - 1);
        } else if pos < self.ranges.len() && end >= self.ranges[pos].0 {
            self.ranges[pos].0 = min(start, self.ranges[pos].0);
            self.ranges[pos].1 = max(end, self.ranges[pos].1);
            self.merge_forward_from(pos);
        } else {
            self.ranges.insert(pos, (start, end));
        }
    }

    fn merge_forward_from(&mut self, start_idx: usize) {
        let mut write = start_idx;
        let mut read = start_idx + 1;
        while read < self.ranges.len() {
            if self.ranges[write].1 >= self.ranges[read].0 {
                self.ranges[write].1 = max(self.ranges[write].1, self.ranges[read].1);
            } else {
                write += 1;
                self.ranges.swap(write, read);
            }
            read += 1;
        }
        self.ranges.truncate(write + 1);
    }

    pub fn total_bases(&self) -> i64 {
        self.ranges.iter().map(|(s, e)| e - s).sum()
    }

    /// Two-pointer sweep over both lists.
    pub fn intersect(&self, other: &SortedRanges) -> SortedRanges {
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.ranges.len() && j < other.ranges.len() {
            let (a_start, a_end) = self.ranges[i];
            let (b_start, b_end) = other.ranges[j];
            let start = max(a_start, b_start);
            let end = min(a_end, b_end);
            if start < end {
                out.push((start, end));
            }
            if a_end < b_end {
                i += 1;
            } else {
                j += 1;
            }
        }
        SortedRanges { ranges: out }
    }

    pub fn subtract(&self, other: &SortedRanges) -> SortedRanges {
        let mut out = Vec::new();
        let mut j = 0;
        for &(start, end) in &self.ranges {
            let mut current = start;
            while j < other.ranges.len() && other.ranges[j].1 <= current {
                j += 1;
            }
            let mut k = j;
            while k < other.ranges.len() && other.ranges[k].0 < end {
                let (cut_start, cut_end) = other.ranges[k];
                if current < cut_start {
                    out.push((current, cut_start));
                }
                current = max(current, cut_end);
                if current >= end {
                    break;
                }
                k += 1;
            }
            if current < end {
                out.push((current, end));
            }
        }
        SortedRanges { ranges: out }
    }

    pub fn union(&self, other: &SortedRanges) -> SortedRanges {
        let mut out = self.clone();
        for &(start, end) in &other.ranges {
            out.insert(start, end);
        }
        out
    }

    /// Index of the range containing `pos`, if any.
    fn find(&self, pos: i64) -> Option<usize> {
        let idx = self.ranges.partition_point(|&(s, _)| s <= pos);
        (idx > 0 && self.ranges[idx - 1].1 > pos).then(|| idx - 1)
    }
}

/// A set of genomic intervals keyed by contig name. Touching or overlapping
/// intervals on the same contig are coalesced on insertion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalSet {
    by_contig: FxHashMap<String, SortedRanges>,
}

impl IntervalSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_intervals<'a, I>(intervals: I) -> Self
    where
        I: IntoIterator<Item = &'a GenomicInterval>,
    {
        let mut set = Self::new();
        for interval in intervals {
            set.insert(interval);
        }
        set
    }

    /// Full spans of every contig.
    pub fn from_contigs(contigs: &ContigSet) -> Self {
        let mut set = Self::new();
        for contig in contigs {
            set.insert_range(&contig.name, 0, contig.length);
        }
        set
    }

    /// Parses region literals (`chr:1-10`, `chr:15`, `chr`) into a set.
    pub fn from_literals<I, S>(literals: I, contigs: &ContigSet) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let intervals = parse_literals(literals, Some(contigs))?;
        Ok(Self::from_intervals(&intervals))
    }

    pub fn insert(&mut self, interval: &GenomicInterval) {
        self.insert_range(&interval.contig, interval.start, interval.end);
    }

    pub fn insert_range(&mut self, contig: &str, start: i64, end: i64) {
        if start >= end {
            return;
        }
        self.by_contig
            .entry(contig.to_string())
            .or_default()
            .insert(start, end);
    }

    pub fn is_empty(&self) -> bool {
        self.by_contig.values().all(|r| r.is_empty())
    }

    /// Number of disjoint intervals.
    pub fn len(&self) -> usize {
        self.by_contig.values().map(|r| r.len()).sum()
    }

    pub fn total_bases(&self) -> i64 {
        self.by_contig.values().map(|r| r.total_bases()).sum()
    }

    pub fn contig_ranges(&self, contig: &str) -> Option<&SortedRanges> {
        self.by_contig.get(contig)
    }

    pub fn union(&self, other: &IntervalSet) -> IntervalSet {
        let mut out = self.clone();
        for (contig, ranges) in &other.by_contig {
            let merged = match out.by_contig.get(contig) {
                Some(existing) => existing.union(ranges),
                None => ranges.clone(),
            };
            out.by_contig.insert(contig.clone(), merged);
        }
        out
    }

    pub fn intersect(&self, other: &IntervalSet) -> IntervalSet {
        let by_contig = self
            .by_contig
            .par_iter()
            .filter_map(|(contig, ranges)| {
                let other_ranges = other.by_contig.get(contig)?;
                let shared = ranges.intersect(other_ranges);
                (!shared.is_empty()).then(|| (contig.clone(), shared))
            })
            .collect();
        IntervalSet { by_contig }
    }

    pub fn subtract(&self, other: &IntervalSet) -> IntervalSet {
        let by_contig = self
            .by_contig
            .par_iter()
            .filter_map(|(contig, ranges)| {
                let remaining = match other.by_contig.get(contig) {
                    Some(cut) => ranges.subtract(cut),
                    None => ranges.clone(),
                };
                (!remaining.is_empty()).then(|| (contig.clone(), remaining))
            })
            .collect();
        IntervalSet { by_contig }
    }

    /// True when any base of `interval` is in the set.
    pub fn overlaps(&self, interval: &GenomicInterval) -> bool {
        let Some(ranges) = self.by_contig.get(&interval.contig) else {
            return false;
        };
        let idx = ranges.ranges.partition_point(|&(_, e)| e <= interval.start);
        idx < ranges.len() && ranges.ranges[idx].0 < interval.end
    }

    /// True when every base of `interval` is in the set.
    pub fn contains(&self, interval: &GenomicInterval) -> bool {
        let Some(ranges) = self.by_contig.get(&interval.contig) else {
            return false;
        };
        match ranges.find(interval.start) {
            Some(idx) => ranges.ranges[idx].1 >= interval.end,
            None => false,
        }
    }

    /// Fails on the first interval whose contig is unknown or that falls
    /// outside its contig.
    pub fn validate(&self, contigs: &ContigSet) -> Result<(), ValidationError> {
        for interval in self.iter() {
            interval.validate(contigs)?;
        }
        Ok(())
    }

    /// Intervals in canonical genome order. Intervals on contigs that are
    /// not in `contigs` are skipped.
    pub fn iter_sorted<'a>(
        &'a self,
        contigs: &'a ContigSet,
    ) -> impl Iterator<Item = GenomicInterval> + 'a {
        contigs.iter().flat_map(move |contig| {
            self.by_contig
                .get(&contig.name)
                .into_iter()
                .flat_map(|ranges| ranges.iter())
                .map(move |&(start, end)| GenomicInterval::new(contig.name.clone(), start, end))
        })
    }

    /// Intervals with contigs in natural name order, for use without a
    /// reference.
    pub fn iter(&self) -> impl Iterator<Item = GenomicInterval> + '_ {
        let mut names: Vec<&String> = self.by_contig.keys().collect();
        names.sort_by(|a, b| natord::compare(a, b));
        names.into_iter().flat_map(move |name| {
            self.by_contig[name]
                .iter()
                .map(move |&(start, end)| GenomicInterval::new(name.clone(), start, end))
        })
    }
}

/// Interval index over truth-confident regions, queried per candidate
/// when labeling examples.
pub struct ConfidentRegions {
    trees: FxHashMap<String, BasicCOITree<(), u32>>,
}

fn to_index_coord(contig: &str, position: i64) -> Result<i32, ValidationError> {
    i32::try_from(position).map_err(|_| ValidationError::CoordinateOverflow {
        contig: contig.to_string(),
        position,
    })
}

// Inclusive query bounds clamped to the index range. `None` when the query
// starts past every indexable position.
fn query_bounds(start: i64, end: i64) -> Option<(i32, i32)> {
    let last = max(start, end - 1);
    if start > i32::MAX as i64 || last < i32::MIN as i64 {
        return None;
    }
    let clamp = |v: i64| v.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
    Some((clamp(start), clamp(last)))
}

impl ConfidentRegions {
    pub fn new(regions: &IntervalSet) -> Result<Self, ValidationError> {
        let mut trees = FxHashMap::default();
        for (contig, ranges) in &regions.by_contig {
            let mut nodes: Vec<Interval<()>> = Vec::with_capacity(ranges.len());
            for &(start, end) in ranges.iter() {
                nodes.push(Interval {
                    first: to_index_coord(contig, start)?,
                    last: to_index_coord(contig, end - 1)?,
                    metadata: (),
                });
            }
            trees.insert(contig.clone(), BasicCOITree::new(nodes.as_slice()));
        }
        Ok(Self { trees })
    }

    /// True when `[start, end)` lies entirely inside a single confident interval.
    pub fn variant_is_confident(&self, contig: &str, start: i64, end: i64) -> bool {
        let (Some(tree), Some((first, last))) = (self.trees.get(contig), query_bounds(start, end)) else {
            return false;
        };
        let last_base = max(start, end - 1);
        let mut covered = false;
        tree.query(first, last, |node| {
            if node.first as i64 <= start && node.last as i64 >= last_base {
                covered = true;
            }
        });
        covered
    }

    pub fn overlap_count(&self, contig: &str, start: i64, end: i64) -> usize {
        match (self.trees.get(contig), query_bounds(start, end)) {
            (Some(tree), Some((first, last))) => tree.query_count(first, last),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(intervals: &[(&str, i64, i64)]) -> IntervalSet {
        let intervals: Vec<GenomicInterval> = intervals
            .iter()
            .map(|&(c, s, e)| GenomicInterval::new(c, s, e))
            .collect();
        IntervalSet::from_intervals(&intervals)
    }

    fn ranges(set: &IntervalSet) -> Vec<(String, i64, i64)> {
        set.iter().map(|i| (i.contig, i.start, i.end)).collect()
    }

    #[test]
    fn test_insert_coalesces_touching_and_overlapping() {
        let s = set(&[("1", 10, 20), ("1", 20, 30), ("1", 40, 50), ("1", 45, 60), ("1", 0, 5)]);
        assert_eq!(
            ranges(&s),
            vec![
                ("1".to_string(), 0, 5),
                ("1".to_string(), 10, 30),
                ("1".to_string(), 40, 60)
            ]
        );
        assert_eq!(s.total_bases(), 5 + 20 + 20);
    }

    #[test]
    fn test_insert_spanning_several_ranges() {
        let s = set(&[("1", 0, 5), ("1", 10, 15), ("1", 20, 25), ("1", 3, 22)]);
        assert_eq!(ranges(&s), vec![("1".to_string(), 0, 25)]);
    }

    #[test]
    fn test_intersect_and_subtract() {
        let a = set(&[("1", 0, 100), ("2", 0, 50)]);
        let b = set(&[("1", 10, 20), ("1", 90, 120), ("3", 0, 10)]);
        assert_eq!(
            ranges(&a.intersect(&b)),
            vec![("1".to_string(), 10, 20), ("1".to_string(), 90, 100)]
        );
        assert_eq!(
            ranges(&a.subtract(&b)),
            vec![
                ("1".to_string(), 0, 10),
                ("1".to_string(), 20, 90),
                ("2".to_string(), 0, 50)
            ]
        );
        assert_eq!(a.union(&b).total_bases(), 120 + 50 + 10);
    }

    #[test]
    fn test_inputs_are_not_mutated() {
        let a = set(&[("1", 0, 100)]);
        let b = set(&[("1", 10, 20)]);
        let before = a.clone();
        let _ = a.subtract(&b);
        let _ = a.intersect(&b);
        let _ = a.union(&b);
        assert_eq!(a, before);
    }

    #[test]
    fn test_overlaps_and_contains() {
        let s = set(&[("1", 10, 20), ("1", 30, 40)]);
        assert!(s.overlaps(&GenomicInterval::new("1", 19, 25)));
        assert!(!s.overlaps(&GenomicInterval::new("1", 20, 30)));
        assert!(s.contains(&GenomicInterval::new("1", 12, 20)));
        assert!(!s.contains(&GenomicInterval::new("1", 15, 35)));
        assert!(!s.contains(&GenomicInterval::new("2", 15, 16)));
    }

    #[test]
    fn test_iter_sorted_follows_contig_order_and_skips_unknown() {
        let contigs = ContigSet::from_name_lengths([("z", 100), ("a", 100)]);
        let s = set(&[("a", 5, 6), ("z", 50, 60), ("z", 1, 2), ("q", 0, 1)]);
        let sorted: Vec<String> = s.iter_sorted(&contigs).map(|i| i.to_string()).collect();
        assert_eq!(sorted, vec!["z:2-2", "z:51-60", "a:6-6"]);
    }

    #[test]
    fn test_validate_reports_out_of_bounds() {
        let contigs = ContigSet::from_name_lengths([("1", 100)]);
        assert!(set(&[("1", 0, 100)]).validate(&contigs).is_ok());
        assert!(set(&[("1", 90, 101)]).validate(&contigs).is_err());
        assert!(matches!(
            set(&[("9", 0, 1)]).validate(&contigs),
            Err(ValidationError::UnknownContig(_))
        ));
    }

    #[test]
    fn test_confident_regions_require_full_containment() {
        let confident = ConfidentRegions::new(&set(&[("1", 10, 20), ("1", 20, 30)])).unwrap();
        assert!(confident.variant_is_confident("1", 10, 11));
        assert!(confident.variant_is_confident("1", 15, 25));
        assert!(!confident.variant_is_confident("1", 25, 31));
        assert!(!confident.variant_is_confident("2", 15, 16));
        assert_eq!(confident.overlap_count("1", 0, 100), 1);
    }

    #[test]
    fn test_confident_regions_beyond_index_range() {
        let too_long = set(&[("1", 0, i32::MAX as i64 + 10)]);
        assert!(matches!(
            ConfidentRegions::new(&too_long),
            Err(ValidationError::CoordinateOverflow { .. })
        ));

        let confident = ConfidentRegions::new(&set(&[("1", 100, 200)])).unwrap();
        let far = i32::MAX as i64 + 5;
        assert!(!confident.variant_is_confident("1", far, far + 1));
        assert!(!confident.variant_is_confident("1", 150, far));
        assert_eq!(confident.overlap_count("1", far, far + 1), 0);
        assert_eq!(confident.overlap_count("1", 150, far), 1);
    }
}
