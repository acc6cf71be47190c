//! Merging per-allele-subset genotype predictions into one call per site.
//!
//! A site with N alt alleles is scored once per subset of one or two alt
//! alleles. Each score is a ploidy-2 distribution over
//! `[ref/ref, ref/alt, alt/alt]` where "alt" is the subset. This module
//! folds those distributions into a single distribution over every genotype
//! of the site, after dropping low quality alt alleles.

use crate::error::ValidationError;
use crate::genomics_math::{ptrue_to_bounded_phred, round_to};
use crate::variant::{genotype_ordering, Variant, VariantCall};
use log::{debug, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// Stand-in probability for genotypes involving a filtered alt allele
/// when all candidates are kept as ALTs.
pub const FILTERED_ALT_PROB: f64 = -9.0;

pub const QUAL_PRECISION: i32 = 7;

pub const CANDIDATES_INFO_KEY: &str = "CANDIDATES";

/// Model output for one subset of alt alleles at a site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlleleSubsetPrediction {
    pub variant: Variant,
    /// 0-based indices into `variant.alternate_bases`.
    pub alt_allele_indices: Vec<usize>,
    /// `[p(ref/ref), p(ref/alt), p(alt/alt)]`
    pub probabilities: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DebugCandidates {
    /// Keep filtered alleles as ALTs with zero probability genotypes.
    #[value(name = "ALT")]
    Alt,
    /// Record all candidate alleles in the CANDIDATES INFO field.
    #[value(name = "INFO")]
    Info,
}

#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Alt alleles whose single-allele QUAL is below this are dropped.
    /// Zero disables pruning.
    pub qual_filter: f64,
    pub debug_output_all_candidates: Option<DebugCandidates>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            qual_filter: 1.0,
            debug_output_all_candidates: None,
        }
    }
}

/// Resolves genotypes of sites with exactly two alt alleles from the three
/// subset distributions `alt1 ++ alt2 ++ alt1+alt2` (9 values) into the
/// 6 ploidy-2 genotype probabilities.
pub trait MultiAllelicModel {
    fn predict(&self, distributions: &[f64]) -> Vec<f64>;
}

/// Sorted 0-based alt index subsets expected for a site with
/// `num_alternate_bases` alts: every single alt and every pair.
pub fn expected_alt_allele_indices(num_alternate_bases: usize) -> Vec<Vec<usize>> {
    let num_alleles = num_alternate_bases + 1;
    let mut expected = Vec::new();
    for i in 0..num_alleles {
        for j in (i + 1)..num_alleles {
            let subset: Vec<usize> = [i, j]
                .into_iter()
                .filter(|&a| a != 0)
                .map(|a| a - 1)
                .collect();
            expected.push(subset);
        }
    }
    expected.sort();
    expected
}

pub fn validate_predictions(predictions: &[AlleleSubsetPrediction]) -> Result<(), ValidationError> {
    let first = predictions.first().ok_or(ValidationError::EmptyPredictions)?;

    let mut found: Vec<Vec<usize>> = predictions
        .iter()
        .map(|p| p.alt_allele_indices.clone())
        .collect();
    found.sort();
    let expected = expected_alt_allele_indices(first.variant.alternate_bases.len());
    if found != expected {
        return Err(ValidationError::InvalidAlleleSubsets {
            site: first.variant.to_string(),
            found,
            expected,
        });
    }

    if let Some(other) = predictions[1..].iter().find(|p| p.variant != first.variant) {
        return Err(ValidationError::MismatchedVariants {
            first: first.variant.to_string(),
            other: other.variant.to_string(),
        });
    }

    if let Some(bad) = predictions.iter().find(|p| p.probabilities.len() != 3) {
        return Err(ValidationError::InvalidProbabilities {
            site: bad.variant.to_string(),
            alt_allele_indices: bad.alt_allele_indices.clone(),
            found: bad.probabilities.len(),
        });
    }
    Ok(())
}

/// `(gq, qual)` for the genotype at `prediction_index`. QUAL is the
/// probability of any non-reference genotype, rounded to 7 decimals; GQ is
/// rounded half to even.
pub fn compute_quals(probabilities: &[f64], prediction_index: usize) -> (i32, f64) {
    let gq = ptrue_to_bounded_phred(probabilities[prediction_index]).round_ties_even() as i32;
    let non_ref: f64 = probabilities.iter().skip(1).sum();
    let qual = ptrue_to_bounded_phred(non_ref.min(1.0));
    (gq, round_to(qual, QUAL_PRECISION))
}

/// 0-based alt indices whose single-allele QUAL is below `qual_filter`.
/// Never returns every alt: the best scoring alt is kept.
pub fn alt_alleles_to_remove(
    predictions: &[AlleleSubsetPrediction],
    qual_filter: f64,
) -> FxHashSet<usize> {
    let mut to_remove = FxHashSet::default();
    if qual_filter == 0.0 || predictions.is_empty() {
        return to_remove;
    }

    let mut best: Option<(f64, usize)> = None;
    for prediction in predictions {
        let [alt_index] = prediction.alt_allele_indices[..] else {
            continue;
        };
        let (_, qual) = compute_quals(&prediction.probabilities, 0);
        if best.map_or(true, |(max_qual, _)| max_qual < qual) {
            best = Some((qual, alt_index));
        }
        if qual < qual_filter {
            to_remove.insert(alt_index);
        }
    }

    if to_remove.len() == predictions[0].variant.alternate_bases.len() {
        if let Some((_, keep)) = best {
            to_remove.remove(&keep);
        }
    }
    to_remove
}

/// Unordered allele pair (VCF allele indices, ref = 0) to the probabilities
/// contributed by each subset covering it.
pub type PairProbabilities = FxHashMap<(usize, usize), Vec<f64>>;

pub fn allele_pair_probabilities(
    predictions: &[AlleleSubsetPrediction],
    removed: &FxHashSet<usize>,
    debug_mode: Option<DebugCandidates>,
) -> PairProbabilities {
    let mut pairs: PairProbabilities = FxHashMap::default();
    for prediction in predictions {
        let alleles: Vec<usize> = prediction.alt_allele_indices.iter().map(|&i| i + 1).collect();
        let has_removed = prediction
            .alt_allele_indices
            .iter()
            .any(|i| removed.contains(i));
        let (p11, p12, p22) = match (has_removed, debug_mode) {
            (true, Some(DebugCandidates::Alt)) => {
                (FILTERED_ALT_PROB, FILTERED_ALT_PROB, FILTERED_ALT_PROB)
            }
            (true, _) => continue,
            (false, _) => match prediction.probabilities[..] {
                [p11, p12, p22] => (p11, p12, p22),
                _ => continue,
            },
        };

        pairs.entry((0, 0)).or_default().push(p11);
        for &a in &alleles {
            pairs.entry((0, a)).or_default().push(p12);
        }
        for (i, &a) in alleles.iter().enumerate() {
            for &b in &alleles[i..] {
                let key = if a <= b { (a, b) } else { (b, a) };
                pairs.entry(key).or_default().push(p22);
            }
        }
    }
    pairs
}

/// Keeps or drops allele-indexed values after alt alleles are removed.
pub struct AlleleRemapper {
    original_alts: Vec<String>,
    removed: FxHashSet<usize>,
}

impl AlleleRemapper {
    pub fn new(original_alts: &[String], removed: &FxHashSet<usize>) -> Self {
        Self {
            original_alts: original_alts.to_vec(),
            removed: removed.clone(),
        }
    }

    /// With `ref_is_zero`, index 0 is the reference and always kept.
    pub fn keep_index(&self, index: usize, ref_is_zero: bool) -> bool {
        if ref_is_zero {
            index == 0 || self.keep_index(index - 1, false)
        } else {
            index < self.original_alts.len() && !self.removed.contains(&index)
        }
    }

    pub fn retained_alt_alleles(&self) -> Vec<String> {
        self.original_alts
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.removed.contains(i))
            .map(|(_, alt)| alt.clone())
            .collect()
    }

    /// Original VCF allele indices (ref = 0) of the alleles that remain.
    pub fn retained_allele_indices(&self) -> Vec<usize> {
        std::iter::once(0)
            .chain(
                (0..self.original_alts.len())
                    .filter(|i| !self.removed.contains(i))
                    .map(|i| i + 1),
            )
            .collect()
    }

    pub fn reindex_call(&self, call: &mut VariantCall) {
        if let Some(ad) = call.ad.as_mut() {
            *ad = self.filter_values(ad, true);
        }
        if let Some(vaf) = call.vaf.as_mut() {
            *vaf = self.filter_values(vaf, false);
        }
    }

    fn filter_values<T: Copy>(&self, values: &[T], ref_is_zero: bool) -> Vec<T> {
        values
            .iter()
            .enumerate()
            .filter(|&(i, _)| self.keep_index(i, ref_is_zero))
            .map(|(_, &v)| v)
            .collect()
    }
}

/// Copy of `variant` without the removed alt alleles.
pub fn prune_alleles(variant: &Variant, removed: &FxHashSet<usize>) -> Variant {
    if removed.is_empty() {
        return variant.clone();
    }
    let remapper = AlleleRemapper::new(&variant.alternate_bases, removed);
    let mut pruned = variant.clone();
    for call in &mut pruned.calls {
        remapper.reindex_call(call);
    }
    pruned.alternate_bases = remapper.retained_alt_alleles();
    pruned
}

/// The 9 inputs of the two-alt model: the alt1, alt2 and alt1+alt2 subset
/// distributions, ignoring subsets with removed alleles.
pub fn multiallelic_distributions(
    predictions: &[AlleleSubsetPrediction],
    removed: &FxHashSet<usize>,
) -> Result<Vec<f64>, ValidationError> {
    let site = || predictions.first().map(|p| p.variant.to_string()).unwrap_or_default();
    let pair = predictions
        .iter()
        .find(|p| {
            p.alt_allele_indices.len() == 2
                && !p.alt_allele_indices.iter().any(|i| removed.contains(i))
        })
        .ok_or_else(|| {
            ValidationError::UnsupportedGenotype(format!("no two-alt subset retained at {}", site()))
        })?;
    let first_alt = pair.alt_allele_indices.iter().copied().min().unwrap_or(0);
    let second_alt = pair.alt_allele_indices.iter().copied().max().unwrap_or(0);

    let single = |alt: usize| {
        predictions
            .iter()
            .find(|p| p.alt_allele_indices == [alt])
            .ok_or_else(|| {
                ValidationError::UnsupportedGenotype(format!(
                    "missing single-alt subset {alt} at {}",
                    site()
                ))
            })
    };

    let mut distributions = Vec::with_capacity(9);
    distributions.extend_from_slice(&single(first_alt)?.probabilities);
    distributions.extend_from_slice(&single(second_alt)?.probabilities);
    distributions.extend_from_slice(&pair.probabilities);
    Ok(distributions)
}

/// Replaces an all-zero vector with a uniform one, then normalizes to sum
/// to 1. `FILTERED_ALT_PROB` entries count as zero.
pub fn normalize_predictions(predictions: &[f64]) -> Vec<f64> {
    let mut predictions = predictions.to_vec();
    if predictions.iter().sum::<f64>() == 0.0 {
        warn!("All genotype probabilities are zero, using a uniform distribution");
        predictions.iter_mut().for_each(|p| *p = 1.0);
    }
    let denominator: f64 = predictions
        .iter()
        .map(|&p| if p == FILTERED_ALT_PROB { 0.0 } else { p })
        .sum();
    let denominator = if denominator == 0.0 { 1.0 } else { denominator };
    predictions
        .iter()
        .map(|&p| if p == FILTERED_ALT_PROB { 0.0 } else { p / denominator })
        .collect()
}

/// Combines the subset predictions of one site into a simplified variant and
/// its normalized genotype distribution.
pub fn merge_predictions(
    predictions: &[AlleleSubsetPrediction],
    options: &MergeOptions,
    multiallelic_model: Option<&dyn MultiAllelicModel>,
) -> Result<(Variant, Vec<f64>), ValidationError> {
    validate_predictions(predictions)?;

    let first = &predictions[0];
    if predictions.len() == 1 {
        return Ok((first.variant.simplified(), first.probabilities.clone()));
    }

    let debug_mode = options.debug_output_all_candidates;
    let removed = alt_alleles_to_remove(predictions, options.qual_filter);
    let pairs = allele_pair_probabilities(predictions, &removed, debug_mode);
    if !removed.is_empty() {
        debug!(
            "Removing {} of {} alt alleles at {}",
            removed.len(),
            first.variant.alternate_bases.len(),
            first.variant
        );
    }

    let mut variant = first.variant.clone();
    if debug_mode == Some(DebugCandidates::Info) {
        variant.info.insert(
            CANDIDATES_INFO_KEY.to_string(),
            variant.alternate_bases.join("|"),
        );
    }
    let keep_all = debug_mode == Some(DebugCandidates::Alt);
    let (variant, allele_indices) = if keep_all {
        let indices = (0..variant.n_alleles()).collect::<Vec<_>>();
        (variant, indices)
    } else {
        let remapper = AlleleRemapper::new(&variant.alternate_bases, &removed);
        (prune_alleles(&variant, &removed), remapper.retained_allele_indices())
    };

    let probabilities = match multiallelic_model {
        Some(model) if variant.alternate_bases.len() == 2 => {
            let distributions = multiallelic_distributions(predictions, &removed)?;
            let probabilities = model.predict(&distributions);
            if probabilities.len() != 6 {
                return Err(ValidationError::UnsupportedGenotype(format!(
                    "two-alt model returned {} values for {}",
                    probabilities.len(),
                    variant
                )));
            }
            probabilities
        }
        _ => {
            let predictions: Vec<f64> = genotype_ordering(allele_indices.len())
                .into_iter()
                .map(|(a, b)| {
                    let key = (allele_indices[a], allele_indices[b]);
                    pairs
                        .get(&key)
                        .into_iter()
                        .flatten()
                        .copied()
                        .filter(|&p| p != FILTERED_ALT_PROB)
                        .reduce(f64::min)
                        .unwrap_or(0.0)
                })
                .collect();
            normalize_predictions(&predictions)
        }
    };

    // Simplification can change allele identity, so it comes last.
    Ok((variant.simplified(), probabilities))
}
