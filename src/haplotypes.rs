//! Resolution of overlapping calls whose genotypes cannot all be true on a
//! diploid genome.
//!
//! Calls are grouped by overlapping reference spans. Within a group every
//! reference base can carry at most two non-reference alleles. When the
//! called genotypes break that, each call is re-genotyped to the most
//! likely combination that respects it, scored by the calls' genotype
//! likelihoods.

use crate::variant::{genotype_ordering, Variant};
use log::{debug, warn};
use std::collections::VecDeque;
use std::io;

pub const PLOIDY: usize = 2;

/// Larger groups are written unchanged.
pub const MAX_OVERLAPPING_VARIANTS_TO_RESOLVE: usize = 20;

/// Non-reference allele count of a genotype. Missing alleles count as reference.
pub fn nonref_count(genotype: &[i32]) -> usize {
    genotype.iter().filter(|&&g| g > 0).count()
}

/// True when no reference base of the group is covered by more than
/// [`PLOIDY`] non-reference alleles. `variants` must be sorted by start and
/// `counts` gives each variant's non-reference allele count.
pub fn counts_are_compatible(variants: &[Variant], counts: &[usize]) -> bool {
    (0..variants.len()).all(|i| coverage_at_start(variants, counts, i) <= PLOIDY)
}

// Non-reference alleles over the start of variant `i` from variants 0..=i.
// The maximum coverage of a sorted group is always reached at a start.
fn coverage_at_start(variants: &[Variant], counts: &[usize], i: usize) -> usize {
    let position = variants[i].start;
    variants[..=i]
        .iter()
        .zip(counts)
        .filter(|(v, _)| v.end > position)
        .map(|(_, &count)| count)
        .sum()
}

// Genotype choices of one call: per non-reference count, the most likely
// genotype and its log10 likelihood.
struct GenotypeOption {
    genotype: Vec<i32>,
    count: usize,
    score: f64,
}

fn genotype_options(variant: &Variant) -> Vec<GenotypeOption> {
    let Some(call) = variant.calls.first() else {
        return Vec::new();
    };
    let ordering = genotype_ordering(variant.n_alleles());
    let uncalled = call.genotype.len() != PLOIDY || call.genotype.iter().any(|&g| g < 0);
    if uncalled || call.genotype_likelihoods.len() != ordering.len() {
        return vec![GenotypeOption {
            genotype: call.genotype.clone(),
            count: nonref_count(&call.genotype),
            score: 0.0,
        }];
    }

    let mut best: Vec<Option<GenotypeOption>> = (0..=PLOIDY).map(|_| None).collect();
    for (&(a, b), &gl) in ordering.iter().zip(&call.genotype_likelihoods) {
        let genotype = vec![a as i32, b as i32];
        let count = nonref_count(&genotype);
        if best[count].as_ref().map_or(true, |current| gl > current.score) {
            best[count] = Some(GenotypeOption {
                genotype,
                count,
                score: gl,
            });
        }
    }
    best.into_iter().flatten().collect()
}

// Depth-first search over genotype options, pruning incompatible prefixes.
fn search(
    variants: &[Variant],
    options: &[Vec<GenotypeOption>],
    chosen: &mut Vec<usize>,
    counts: &mut Vec<usize>,
    score: f64,
    best: &mut Option<(f64, Vec<usize>)>,
) {
    let i = chosen.len();
    if i == variants.len() {
        if best.as_ref().map_or(true, |(best_score, _)| score > *best_score) {
            *best = Some((score, chosen.clone()));
        }
        return;
    }
    for (k, option) in options[i].iter().enumerate() {
        counts.push(option.count);
        if coverage_at_start(variants, counts, i) <= PLOIDY {
            chosen.push(k);
            search(variants, options, chosen, counts, score + option.score, best);
            chosen.pop();
        }
        counts.pop();
    }
}

/// Re-genotypes a group of overlapping calls, sorted by start, so that
/// their genotypes are jointly possible. Compatible groups, oversized
/// groups and groups without a compatible assignment are returned as is.
pub fn resolve_overlapping_variants(mut group: Vec<Variant>) -> Vec<Variant> {
    if group.len() < 2 || group.iter().any(|v| v.calls.len() != 1) {
        return group;
    }
    let counts: Vec<usize> = group
        .iter()
        .map(|v| nonref_count(&v.calls[0].genotype))
        .collect();
    if counts_are_compatible(&group, &counts) {
        return group;
    }
    if group.len() > MAX_OVERLAPPING_VARIANTS_TO_RESOLVE {
        warn!(
            "Not resolving {} conflicting overlapping variants starting at {}",
            group.len(),
            group[0]
        );
        return group;
    }

    let options: Vec<Vec<GenotypeOption>> = group.iter().map(genotype_options).collect();
    let mut best = None;
    search(&group, &options, &mut Vec::new(), &mut Vec::new(), 0.0, &mut best);
    let Some((_, chosen)) = best else {
        warn!(
            "No compatible genotypes for {} overlapping variants starting at {}",
            group.len(),
            group[0]
        );
        return group;
    };

    for (variant, (choice, variant_options)) in group.iter_mut().zip(chosen.iter().zip(&options)) {
        let genotype = &variant_options[*choice].genotype;
        if &variant.calls[0].genotype != genotype {
            debug!(
                "Changing genotype of {variant} from {:?} to {:?} to resolve overlapping calls",
                variant.calls[0].genotype, genotype
            );
            variant.calls[0].genotype = genotype.clone();
        }
    }
    group
}

/// Adapter over sorted variants that resolves each group of overlapping
/// calls with [`resolve_overlapping_variants`].
pub struct ResolveConflicts<I> {
    inner: I,
    group: Vec<Variant>,
    group_end: i64,
    ready: VecDeque<Variant>,
    exhausted: bool,
}

impl<I> ResolveConflicts<I> {
    fn flush(&mut self) {
        let group = std::mem::take(&mut self.group);
        self.ready.extend(resolve_overlapping_variants(group));
    }
}

impl<I: Iterator<Item = io::Result<Variant>>> Iterator for ResolveConflicts<I> {
    type Item = io::Result<Variant>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(variant) = self.ready.pop_front() {
                return Some(Ok(variant));
            }
            if self.exhausted {
                return None;
            }
            match self.inner.next() {
                Some(Err(e)) => return Some(Err(e)),
                Some(Ok(variant)) => {
                    let overlaps = self
                        .group
                        .first()
                        .is_some_and(|first| first.contig == variant.contig && variant.start < self.group_end);
                    if overlaps {
                        self.group_end = self.group_end.max(variant.end);
                    } else {
                        self.flush();
                        self.group_end = variant.end;
                    }
                    self.group.push(variant);
                }
                None => {
                    self.exhausted = true;
                    self.flush();
                }
            }
        }
    }
}

pub fn resolve_conflicting_variants<I>(variants: I) -> ResolveConflicts<I::IntoIter>
where
    I: IntoIterator<Item = io::Result<Variant>>,
{
    ResolveConflicts {
        inner: variants.into_iter(),
        group: Vec::new(),
        group_end: 0,
        ready: VecDeque::new(),
        exhausted: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::VariantCall;

    fn called(start: i64, reference: &str, alts: &[&str], genotype: [i32; 2], gls: &[f64]) -> Variant {
        Variant::new("chr1", start, reference, alts).with_call(VariantCall {
            sample: "sample".to_string(),
            genotype: genotype.to_vec(),
            genotype_likelihoods: gls.to_vec(),
            ..Default::default()
        })
    }

    fn genotypes(variants: &[Variant]) -> Vec<Vec<i32>> {
        variants.iter().map(|v| v.calls[0].genotype.clone()).collect()
    }

    fn resolve_all(variants: Vec<Variant>) -> Vec<Variant> {
        resolve_conflicting_variants(variants.into_iter().map(Ok))
            .collect::<io::Result<_>>()
            .unwrap()
    }

    #[test]
    fn test_compatibility_counts_alleles_per_base() {
        let deletion = called(10, "ACGT", &["A"], [0, 1], &[]);
        let snp = called(12, "G", &["T"], [0, 1], &[]);
        let after = called(14, "A", &["C"], [1, 1], &[]);
        let group = vec![deletion, snp, after];
        assert!(counts_are_compatible(&group, &[1, 1, 2]));
        assert!(!counts_are_compatible(&group, &[2, 1, 0]));
        assert!(!counts_are_compatible(&group, &[1, 2, 0]));
    }

    #[test]
    fn test_conflicting_calls_take_most_likely_compatible_genotypes() {
        // Both homozygous alt on the same base; the SNP's hom-alt call is far
        // more likely than any deletion genotype.
        let deletion = called(10, "ACG", &["A"], [1, 1], &[-0.5, -0.4, -0.3]);
        let snp = called(11, "C", &["T"], [1, 1], &[-6.0, -3.0, -0.01]);
        let resolved = resolve_overlapping_variants(vec![deletion, snp]);
        assert_eq!(genotypes(&resolved), vec![vec![0, 0], vec![1, 1]]);
    }

    #[test]
    fn test_compatible_groups_are_unchanged() {
        let a = called(10, "ACG", &["A"], [0, 1], &[-1.0, -0.1, -2.0]);
        let b = called(11, "C", &["T"], [0, 1], &[-1.0, -0.1, -2.0]);
        let resolved = resolve_all(vec![a.clone(), b.clone()]);
        assert_eq!(resolved, vec![a, b]);
    }

    #[test]
    fn test_multiallelic_options_pick_best_genotype_per_count() {
        let site = called(
            10,
            "AC",
            &["A", "T"],
            [1, 2],
            // 0/0, 0/1, 1/1, 0/2, 1/2, 2/2
            &[-4.0, -2.0, -3.0, -0.5, -0.1, -3.0],
        );
        let snp = called(11, "C", &["G"], [1, 1], &[-9.0, -0.3, -0.01]);
        let resolved = resolve_overlapping_variants(vec![site, snp]);
        assert_eq!(genotypes(&resolved), vec![vec![0, 2], vec![0, 1]]);
    }

    #[test]
    fn test_uncalled_and_unscored_calls_keep_their_genotype() {
        let nocall = called(10, "ACG", &["A"], [-1, -1], &[]);
        let a = called(11, "C", &["T"], [1, 1], &[-3.0, -1.0, -0.01]);
        let b = called(11, "C", &["G"], [1, 1], &[-0.2, -0.3, -0.25]);
        let resolved = resolve_overlapping_variants(vec![nocall, a, b]);
        assert_eq!(
            genotypes(&resolved),
            vec![vec![-1, -1], vec![1, 1], vec![0, 0]]
        );
    }

    #[test]
    fn test_groups_split_on_gaps_and_contigs() {
        let a = called(10, "AC", &["A"], [1, 1], &[-0.5, -0.4, -0.3]);
        let b = called(11, "C", &["T"], [1, 1], &[-6.0, -3.0, -0.01]);
        // Starts where the first group ends, so it is not part of it.
        let c = called(12, "G", &["T"], [1, 1], &[-6.0, -3.0, -0.01]);
        let mut d = called(11, "C", &["T"], [1, 1], &[-6.0, -3.0, -0.01]);
        d.contig = "chr2".to_string();
        let resolved = resolve_all(vec![a, b, c, d]);
        assert_eq!(
            genotypes(&resolved),
            vec![vec![0, 0], vec![1, 1], vec![1, 1], vec![1, 1]]
        );
        assert_eq!(resolved[3].contig, "chr2");
    }

    #[test]
    fn test_errors_pass_through() {
        let a = called(10, "A", &["C"], [0, 1], &[]);
        let items = vec![Ok(a), Err(io::Error::other("broken"))];
        let results: Vec<io::Result<Variant>> = resolve_conflicting_variants(items).collect();
        assert!(results[0].is_err());
        assert!(results[1].is_ok());
    }
}
