use crate::contig::ContigSet;
use crate::error::ValidationError;
use crate::interval::{parse_literals, GenomicInterval};
use crate::ranges::IntervalSet;
use log::{debug, info};
use rayon::prelude::*;
use std::cmp::min;

/// One unit of work: an interval and its position in the unsharded
/// emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub interval: GenomicInterval,
    pub index: usize,
}

impl Region {
    pub fn partition_key(&self, contigs: &ContigSet) -> Option<(usize, i64)> {
        contigs
            .order_of(&self.interval.contig)
            .map(|order| (order, self.interval.start))
    }
}

#[derive(Debug, Clone)]
pub struct PartitionConfig {
    pub max_partition_size: i64,
    pub task_id: Option<i64>,
    pub num_shards: Option<i64>,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            max_partition_size: 1000,
            task_id: None,
            num_shards: None,
        }
    }
}

/// Checks the shard arguments and returns `(task_id, num_shards)` when the
/// output should be sharded. `(0, 0)` means unsharded.
pub fn validate_shard_args(
    task_id: Option<i64>,
    num_shards: Option<i64>,
) -> Result<Option<(usize, usize)>, ValidationError> {
    let fail = |reason| ValidationError::ShardArguments {
        task_id,
        num_shards,
        reason,
    };
    match (task_id, num_shards) {
        (None, None) => Ok(None),
        (Some(_), None) | (None, Some(_)) => Err(fail("must specify both or neither")),
        (Some(task), Some(shards)) => {
            if task < 0 || shards < 0 {
                Err(fail("task_id and num_shards must be non-negative"))
            } else if shards == 0 && task != 0 {
                Err(fail("task_id must be 0 when num_shards is 0"))
            } else if shards > 0 && task >= shards {
                Err(fail("task_id must be less than num_shards"))
            } else if shards == 0 {
                Ok(None)
            } else {
                Ok(Some((task as usize, shards as usize)))
            }
        }
    }
}

/// Splits the working set into regions of at most `max_partition_size`
/// bases in canonical genome order, then keeps this task's shard.
///
/// Without `calling_regions` the working set is every contig's full span.
/// Calling regions on contigs that are not in `contigs` are dropped.
pub fn partition_regions(
    contigs: &ContigSet,
    max_partition_size: i64,
    calling_regions: Option<&IntervalSet>,
    task_id: Option<i64>,
    num_shards: Option<i64>,
) -> Result<Vec<Region>, ValidationError> {
    if max_partition_size <= 0 {
        return Err(ValidationError::PartitionSize(max_partition_size));
    }
    let shard = validate_shard_args(task_id, num_shards)?;

    let spans = IntervalSet::from_contigs(contigs);
    let working = match calling_regions {
        Some(regions) => regions.intersect(&spans),
        None => spans,
    };

    // Chunk each contig independently; collect keeps contig order.
    let per_contig: Vec<Vec<GenomicInterval>> = contigs
        .iter()
        .collect::<Vec<_>>()
        .par_iter()
        .map(|contig| {
            let mut windows = Vec::new();
            let Some(ranges) = working.contig_ranges(&contig.name) else {
                return windows;
            };
            for &(start, end) in ranges.iter() {
                let mut pos = start;
                while pos < end {
                    let window_end = min(pos + max_partition_size, end);
                    windows.push(GenomicInterval::new(contig.name.clone(), pos, window_end));
                    pos = window_end;
                }
            }
            windows
        })
        .collect();

    let regions: Vec<Region> = per_contig
        .into_iter()
        .flatten()
        .enumerate()
        .filter(|(index, _)| match shard {
            Some((task, shards)) => index % shards == task,
            None => true,
        })
        .map(|(index, interval)| Region { interval, index })
        .collect();

    debug!(
        "Partitioned {} bp into {} regions (max size {}, shard {:?})",
        working.total_bases(),
        regions.len(),
        max_partition_size,
        shard
    );
    Ok(regions)
}

impl PartitionConfig {
    pub fn partition(
        &self,
        contigs: &ContigSet,
        calling_regions: Option<&IntervalSet>,
    ) -> Result<Vec<Region>, ValidationError> {
        partition_regions(
            contigs,
            self.max_partition_size,
            calling_regions,
            self.task_id,
            self.num_shards,
        )
    }
}

/// Resolves include and exclude literals into calling regions restricted to
/// `contigs`. No includes means every contig.
pub fn build_calling_regions<S: AsRef<str>>(
    contigs: &ContigSet,
    includes: &[S],
    excludes: &[S],
) -> Result<IntervalSet, ValidationError> {
    let includes = parse_literals(includes.iter().map(|s| s.as_ref()), Some(contigs))?;
    let excludes = parse_literals(excludes.iter().map(|s| s.as_ref()), Some(contigs))?;
    Ok(calling_regions_from_intervals(contigs, &includes, &excludes))
}

/// Same as [`build_calling_regions`] for already parsed intervals.
pub fn calling_regions_from_intervals(
    contigs: &ContigSet,
    includes: &[GenomicInterval],
    excludes: &[GenomicInterval],
) -> IntervalSet {
    let spans = IntervalSet::from_contigs(contigs);
    let included = if includes.is_empty() {
        spans
    } else {
        IntervalSet::from_intervals(includes).intersect(&spans)
    };
    if excludes.is_empty() {
        included
    } else {
        included.subtract(&IntervalSet::from_intervals(excludes))
    }
}

/// Calling regions, optionally narrowed to confident regions. Fails when
/// nothing is left to call.
pub fn processing_regions<S: AsRef<str>>(
    contigs: &ContigSet,
    includes: &[S],
    excludes: &[S],
    confident: Option<&IntervalSet>,
) -> Result<IntervalSet, ValidationError> {
    let regions = build_calling_regions(contigs, includes, excludes)?;
    narrow_to_confident(regions, confident)
}

/// Intersects `regions` with `confident` when given. Fails when nothing is
/// left to call.
pub fn narrow_to_confident(
    mut regions: IntervalSet,
    confident: Option<&IntervalSet>,
) -> Result<IntervalSet, ValidationError> {
    if let Some(confident) = confident {
        regions = regions.intersect(confident);
    }
    if regions.is_empty() {
        return Err(ValidationError::EmptyRegions);
    }
    info!(
        "Processing {} regions covering {} bp",
        regions.len(),
        regions.total_bases()
    );
    Ok(regions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contigs(specs: &[(&str, i64)]) -> ContigSet {
        ContigSet::from_name_lengths(specs.iter().map(|&(n, l)| (n, l)))
    }

    fn literals(contigs: &ContigSet, lits: &[&str]) -> IntervalSet {
        IntervalSet::from_literals(lits.iter(), contigs).unwrap()
    }

    // 1-based inclusive tuples, like region literals.
    fn spans(regions: &[Region]) -> Vec<(String, i64, i64)> {
        regions
            .iter()
            .map(|r| (r.interval.contig.clone(), r.interval.start + 1, r.interval.end))
            .collect()
    }

    fn expect(items: &[(&str, i64, i64)]) -> Vec<(String, i64, i64)> {
        items.iter().map(|&(c, s, e)| (c.to_string(), s, e)).collect()
    }

    #[test]
    fn test_calling_regions_are_clipped_to_contigs() {
        let c = contigs(&[("1", 100), ("2", 200)]);
        let regions = partition_regions(&c, 1000, Some(&literals(&c, &["1:50-150"])), None, None).unwrap();
        assert_eq!(spans(&regions), expect(&[("1", 50, 100)]));
    }

    #[test]
    fn test_no_calling_regions_uses_whole_contigs() {
        let c = contigs(&[("1", 100), ("2", 200)]);
        let regions = partition_regions(&c, 1000, None, None, None).unwrap();
        assert_eq!(spans(&regions), expect(&[("1", 1, 100), ("2", 1, 200)]));
    }

    #[test]
    fn test_regions_on_unknown_contigs_are_dropped() {
        let c = contigs(&[("1", 100), ("2", 200)]);
        let calling = IntervalSet::from_intervals(&[
            GenomicInterval::new("1", 19, 30),
            GenomicInterval::new("1", 39, 60),
            GenomicInterval::new("3", 9, 50),
        ]);
        let regions = partition_regions(&c, 1000, Some(&calling), None, None).unwrap();
        assert_eq!(spans(&regions), expect(&[("1", 20, 30), ("1", 40, 60)]));
    }

    #[test]
    fn test_overlapping_calling_regions_merge() {
        let c = contigs(&[("1", 100), ("2", 200)]);
        let regions =
            partition_regions(&c, 1000, Some(&literals(&c, &["1:25-30", "1:20-40"])), None, None).unwrap();
        assert_eq!(spans(&regions), expect(&[("1", 20, 40)]));
    }

    #[test]
    fn test_whole_contigs_are_chunked() {
        let c = contigs(&[("1", 100), ("2", 76), ("3", 121)]);
        let regions = partition_regions(&c, 50, None, None, None).unwrap();
        assert_eq!(
            spans(&regions),
            expect(&[
                ("1", 1, 50),
                ("1", 51, 100),
                ("2", 1, 50),
                ("2", 51, 76),
                ("3", 1, 50),
                ("3", 51, 100),
                ("3", 101, 121),
            ])
        );
        let regions = partition_regions(&c, 120, None, None, None).unwrap();
        assert_eq!(
            spans(&regions)[2..],
            expect(&[("3", 1, 120), ("3", 121, 121)])[..]
        );
    }

    #[test]
    fn test_calling_regions_are_chunked_from_their_start() {
        let c = contigs(&[("1", 100)]);
        let calling = literals(&c, &["1:1-20", "1:30-35"]);
        let regions = partition_regions(&c, 10, Some(&calling), None, None).unwrap();
        assert_eq!(
            spans(&regions),
            expect(&[("1", 1, 10), ("1", 11, 20), ("1", 30, 35)])
        );
        let regions = partition_regions(&c, 8, Some(&calling), None, None).unwrap();
        assert_eq!(
            spans(&regions),
            expect(&[("1", 1, 8), ("1", 9, 16), ("1", 17, 20), ("1", 30, 35)])
        );
    }

    #[test]
    fn test_output_follows_contig_order_not_literal_order() {
        let c = contigs(&[("z", 100), ("a", 100), ("n", 100)]);
        let calling = literals(&c, &["a:10", "n:1", "z:20", "z:5"]);
        let regions = partition_regions(&c, 1000, Some(&calling), None, None).unwrap();
        assert_eq!(
            spans(&regions),
            expect(&[("z", 5, 5), ("z", 20, 20), ("a", 10, 10), ("n", 1, 1)])
        );
        let indices: Vec<usize> = regions.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_shards_partition_the_unsharded_output() {
        let c = contigs(&[("1", 100), ("2", 76), ("3", 121)]);
        let calling = literals(&c, &["1:1-20", "1:30-35", "2", "3:50-99"]);
        let all = partition_regions(&c, 5, Some(&calling), Some(0), Some(0)).unwrap();
        assert_eq!(all, partition_regions(&c, 5, Some(&calling), None, None).unwrap());

        for num_shards in [2, 3, 4, 5, 50] {
            let mut combined = Vec::new();
            for task_id in 0..num_shards {
                let shard =
                    partition_regions(&c, 5, Some(&calling), Some(task_id), Some(num_shards)).unwrap();
                assert!(shard
                    .iter()
                    .all(|r| r.index % num_shards as usize == task_id as usize));
                combined.extend(shard);
            }
            combined.sort_by_key(|r| r.index);
            assert_eq!(combined, all);
        }
    }

    #[test]
    fn test_bad_shard_arguments() {
        let c = contigs(&[("1", 100)]);
        for (task_id, num_shards) in [
            (None, Some(0)),
            (None, Some(2)),
            (Some(2), None),
            (Some(0), None),
            (Some(-1), Some(2)),
            (Some(0), Some(-2)),
            (Some(2), Some(2)),
            (Some(3), Some(2)),
        ] {
            assert!(
                matches!(
                    partition_regions(&c, 10, None, task_id, num_shards),
                    Err(ValidationError::ShardArguments { .. })
                ),
                "expected failure for {task_id:?}/{num_shards:?}"
            );
        }
    }

    #[test]
    fn test_zero_partition_size_fails() {
        let c = contigs(&[("1", 100)]);
        assert_eq!(
            partition_regions(&c, 0, None, None, None),
            Err(ValidationError::PartitionSize(0))
        );
    }

    #[test]
    fn test_build_calling_regions() {
        let c = contigs(&[("1", 100), ("2", 200)]);
        let regions = build_calling_regions(&c, &["1"], &["1:1-10"]).unwrap();
        assert_eq!(
            regions.iter_sorted(&c).collect::<Vec<_>>(),
            vec![GenomicInterval::new("1", 10, 100)]
        );

        let regions = build_calling_regions(
            &c,
            &["1:10-20", "2:50-60", "2:70-80"],
            &["1:1-13", "1:19-50", "2:10-65"],
        )
        .unwrap();
        assert_eq!(
            regions.iter_sorted(&c).collect::<Vec<_>>(),
            vec![GenomicInterval::new("1", 13, 18), GenomicInterval::new("2", 69, 80)]
        );

        let empty: [&str; 0] = [];
        assert_eq!(build_calling_regions(&c, &empty, &empty).unwrap().total_bases(), 300);
    }

    #[test]
    fn test_processing_regions_fail_when_empty() {
        let c = contigs(&[("1", 100)]);
        let confident = IntervalSet::from_intervals(&[GenomicInterval::new("1", 50, 60)]);
        let regions = processing_regions(&c, &["1:1-55"], &[], Some(&confident)).unwrap();
        assert_eq!(regions.total_bases(), 5);

        assert_eq!(
            processing_regions(&c, &["1"], &["1"], None),
            Err(ValidationError::EmptyRegions)
        );
    }
}
