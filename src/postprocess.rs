//! From per-subset predictions to VCF and gVCF records.

use crate::calling::{add_call_to_variant, CallOptions};
use crate::contig::ContigSet;
use crate::error::ValidationError;
use crate::gvcf::{GvcfMergeStats, GvcfMerger};
use crate::merge::{merge_predictions, AlleleSubsetPrediction, DebugCandidates, MergeOptions, MultiAllelicModel};
use crate::reference::ReferenceSource;
use crate::sample::{SampleId, DEFAULT_SAMPLE_NAME};
use crate::variant::{Variant, FILTER_PASS};
use crate::vcf_writer::RecordSink;
use itertools::Itertools;
use log::{info, warn};
use std::io;
use std::vec::IntoIter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ErrorPolicy {
    /// Abort on the first site that cannot be merged.
    #[default]
    Strict,
    /// Log the site and skip it.
    Tolerant,
}

#[derive(Debug, Clone)]
pub struct PostprocessConfig {
    pub merge: MergeOptions,
    pub call: CallOptions,
    /// Merge predictions sharing a site into one record.
    pub group_variants: bool,
    pub error_policy: ErrorPolicy,
    pub only_keep_pass: bool,
    pub sample_name: Option<String>,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            merge: MergeOptions::default(),
            call: CallOptions::default(),
            group_variants: true,
            error_policy: ErrorPolicy::Strict,
            only_keep_pass: false,
            sample_name: None,
        }
    }
}

impl PostprocessConfig {
    pub fn validate(
        &self,
        use_multiallelic_model: bool,
        has_nonvariant_input: bool,
        has_gvcf_output: bool,
    ) -> Result<(), ValidationError> {
        if has_nonvariant_input != has_gvcf_output {
            return Err(ValidationError::IncompatibleOptions(
                "non-variant site input and gVCF output must be given together".to_string(),
            ));
        }
        if use_multiallelic_model
            && self.merge.debug_output_all_candidates == Some(DebugCandidates::Alt)
        {
            return Err(ValidationError::IncompatibleOptions(
                "debug output of all candidates as ALT alleles cannot be used with the multiallelic model"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Sorts predictions by (contig order, start, end), keeping input order on ties.
pub fn sort_predictions(
    predictions: &mut [AlleleSubsetPrediction],
    contigs: &ContigSet,
) -> Result<(), ValidationError> {
    if let Some(unknown) = predictions
        .iter()
        .find(|p| !contigs.contains(&p.variant.contig))
    {
        return Err(ValidationError::UnknownContig(unknown.variant.contig.clone()));
    }
    predictions.sort_by_cached_key(|p| p.variant.interval().sort_key(contigs));
    Ok(())
}

/// Splits sorted predictions into sites. Within a site predictions are
/// ordered by their alt allele indices.
pub fn group_predictions(
    predictions: Vec<AlleleSubsetPrediction>,
    group_variants: bool,
) -> Vec<Vec<AlleleSubsetPrediction>> {
    let mut groups: Vec<Vec<AlleleSubsetPrediction>> = if group_variants {
        predictions
            .into_iter()
            .chunk_by(|p| (p.variant.contig.clone(), p.variant.start, p.variant.end))
            .into_iter()
            .map(|(_, group)| group.collect())
            .collect()
    } else {
        predictions.into_iter().map(|p| vec![p]).collect()
    };
    for group in &mut groups {
        group.sort_by_cached_key(|p| {
            let mut indices = p.alt_allele_indices.clone();
            indices.sort_unstable();
            indices
        });
    }
    groups
}

/// First available of: the first prediction's call sample, the first
/// non-variant record's sample, the configured name, `default`.
pub fn resolve_sample_name(
    first_prediction: Option<&AlleleSubsetPrediction>,
    first_nonvariant: Option<&Variant>,
    configured: Option<&str>,
) -> Result<SampleId, ValidationError> {
    if let Some(prediction) = first_prediction {
        let name = prediction.variant.only_call()?.sample.clone();
        info!("Using sample name from predictions: {name}");
        return Ok(SampleId::new(name));
    }
    if let Some(call) = first_nonvariant.and_then(|v| v.calls.first()) {
        info!(
            "No predictions, using sample name from non-variant records: {}",
            call.sample
        );
        return Ok(SampleId::new(call.sample.clone()));
    }
    let name = configured.unwrap_or(DEFAULT_SAMPLE_NAME);
    info!("Using sample name {name}");
    Ok(SampleId::new(name))
}

/// Iterator of called variants, one per site, in genome order.
pub struct Postprocess<'a> {
    groups: IntoIter<Vec<AlleleSubsetPrediction>>,
    config: &'a PostprocessConfig,
    sample: SampleId,
    model: Option<&'a dyn MultiAllelicModel>,
    skipped: usize,
}

impl Postprocess<'_> {
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn call_site(&self, group: &[AlleleSubsetPrediction]) -> Result<Variant, ValidationError> {
        let (variant, probabilities) = merge_predictions(group, &self.config.merge, self.model)?;
        add_call_to_variant(variant, &probabilities, &self.config.call, &self.sample)
    }
}

impl Iterator for Postprocess<'_> {
    type Item = io::Result<Variant>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let group = self.groups.next()?;
            match self.call_site(&group) {
                Ok(variant) => return Some(Ok(variant)),
                Err(e) => match self.config.error_policy {
                    ErrorPolicy::Strict => return Some(Err(e.into())),
                    ErrorPolicy::Tolerant => {
                        let site = group
                            .first()
                            .map_or_else(|| "<empty>".to_string(), |p| p.variant.to_string());
                        warn!("Skipping site {site}: {e}");
                        self.skipped += 1;
                    }
                },
            }
        }
    }
}

/// Sorts and groups `predictions` and lazily merges and calls each site.
pub fn postprocess<'a>(
    mut predictions: Vec<AlleleSubsetPrediction>,
    contigs: &ContigSet,
    sample: SampleId,
    config: &'a PostprocessConfig,
    model: Option<&'a dyn MultiAllelicModel>,
) -> Result<Postprocess<'a>, ValidationError> {
    sort_predictions(&mut predictions, contigs)?;
    let groups = group_predictions(predictions, config.group_variants);
    info!("Merging predictions for {} sites", groups.len());
    Ok(Postprocess {
        groups: groups.into_iter(),
        config,
        sample,
        model,
        skipped: 0,
    })
}

/// Where non-variant reference blocks come from and where the gVCF goes.
pub struct GvcfOutput<'a, N> {
    pub nonvariants: N,
    pub sink: &'a mut dyn RecordSink,
}

/// Writes called variants to `vcf` (only PASS ones with `only_keep_pass`).
/// With `gvcf`, variants and reference blocks are also merged into the gVCF.
pub fn write_postprocessed<V, N, R>(
    variants: V,
    gvcf: Option<GvcfOutput<'_, N>>,
    contigs: &ContigSet,
    reference: &R,
    only_keep_pass: bool,
    vcf: &mut dyn RecordSink,
) -> io::Result<GvcfMergeStats>
where
    V: IntoIterator<Item = io::Result<Variant>>,
    N: IntoIterator<Item = io::Result<Variant>>,
    R: ReferenceSource + ?Sized,
{
    match gvcf {
        Some(GvcfOutput { nonvariants, sink }) => {
            GvcfMerger::new(contigs, reference, only_keep_pass).merge(variants, nonvariants, vcf, sink)
        }
        None => {
            let mut stats = GvcfMergeStats::default();
            for variant in variants {
                let variant = variant?;
                if !only_keep_pass || variant.filters == [FILTER_PASS] {
                    vcf.write(&variant)?;
                    stats.vcf_records += 1;
                }
            }
            Ok(stats)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::InMemoryReference;
    use crate::variant::{VariantCall, GVCF_ALT_ALLELE};

    fn contigs() -> ContigSet {
        ContigSet::from_name_lengths([("chr1", 100), ("chr2", 100)])
    }

    fn site(contig: &str, start: i64, alts: &[&str]) -> Variant {
        Variant::new(contig, start, "A", alts).with_call(VariantCall {
            sample: "NA12878".to_string(),
            ad: Some(vec![5; alts.len() + 1]),
            ..Default::default()
        })
    }

    fn prediction(variant: &Variant, indices: &[usize], probs: [f64; 3]) -> AlleleSubsetPrediction {
        AlleleSubsetPrediction {
            variant: variant.clone(),
            alt_allele_indices: indices.to_vec(),
            probabilities: probs.to_vec(),
        }
    }

    #[test]
    fn test_sort_and_group() {
        let contigs = contigs();
        let a = site("chr2", 10, &["C"]);
        let b = site("chr1", 50, &["C", "G"]);
        let mut predictions = vec![
            prediction(&a, &[0], [0.1, 0.8, 0.1]),
            prediction(&b, &[1], [0.1, 0.8, 0.1]),
            prediction(&b, &[1, 0], [0.1, 0.8, 0.1]),
            prediction(&b, &[0], [0.1, 0.8, 0.1]),
        ];
        sort_predictions(&mut predictions, &contigs).unwrap();
        let groups = group_predictions(predictions.clone(), true);
        assert_eq!(groups.len(), 2);
        let indices: Vec<Vec<usize>> = groups[0].iter().map(|p| p.alt_allele_indices.clone()).collect();
        assert_eq!(indices, vec![vec![0], vec![1, 0], vec![1]]);
        assert_eq!(groups[1][0].variant.contig, "chr2");

        assert_eq!(group_predictions(predictions, false).len(), 4);

        let mut unknown = vec![prediction(&site("chrUn", 0, &["C"]), &[0], [1.0, 0.0, 0.0])];
        assert!(matches!(
            sort_predictions(&mut unknown, &contigs),
            Err(ValidationError::UnknownContig(_))
        ));
    }

    #[test]
    fn test_postprocess_calls_sites() {
        let contigs = contigs();
        let config = PostprocessConfig::default();
        let b = site("chr1", 50, &["C", "G"]);
        let predictions = vec![
            prediction(&site("chr2", 10, &["C"]), &[0], [0.01, 0.98, 0.01]),
            prediction(&b, &[0], [0.01, 0.98, 0.01]),
            prediction(&b, &[1], [0.9, 0.09, 0.01]),
            prediction(&b, &[0, 1], [0.01, 0.98, 0.01]),
        ];
        let variants: Vec<Variant> = postprocess(predictions, &contigs, SampleId::new("NA12878"), &config, None)
            .unwrap()
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].contig, "chr1");
        // The low quality G allele is pruned.
        assert_eq!(variants[0].alternate_bases, vec!["C"]);
        assert_eq!(variants[0].only_call().unwrap().genotype, vec![0, 1]);
        assert_eq!(variants[1].filters, vec![FILTER_PASS]);
    }

    #[test]
    fn test_error_policy() {
        let contigs = contigs();
        let bad = site("chr1", 10, &["C", "G"]);
        let predictions = vec![
            // Missing the [1] and [0, 1] subsets.
            prediction(&bad, &[0], [0.1, 0.8, 0.1]),
            prediction(&site("chr1", 20, &["T"]), &[0], [0.01, 0.98, 0.01]),
        ];

        let strict = PostprocessConfig::default();
        let results: Vec<io::Result<Variant>> =
            postprocess(predictions.clone(), &contigs, SampleId::default(), &strict, None)
                .unwrap()
                .collect();
        assert!(results[0].is_err());

        let tolerant = PostprocessConfig {
            error_policy: ErrorPolicy::Tolerant,
            ..PostprocessConfig::default()
        };
        let mut iter = postprocess(predictions, &contigs, SampleId::default(), &tolerant, None).unwrap();
        let variants: Vec<Variant> = iter.by_ref().collect::<io::Result<_>>().unwrap();
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].start, 20);
        assert_eq!(iter.skipped(), 1);
    }

    #[test]
    fn test_resolve_sample_name() {
        let p = prediction(&site("chr1", 0, &["C"]), &[0], [1.0, 0.0, 0.0]);
        let mut block = Variant::new("chr1", 0, "A", &[GVCF_ALT_ALLELE]);
        block.calls.push(VariantCall {
            sample: "from_blocks".to_string(),
            ..Default::default()
        });
        assert_eq!(
            resolve_sample_name(Some(&p), Some(&block), Some("flag")).unwrap().as_str(),
            "NA12878"
        );
        assert_eq!(
            resolve_sample_name(None, Some(&block), Some("flag")).unwrap().as_str(),
            "from_blocks"
        );
        assert_eq!(resolve_sample_name(None, None, Some("flag")).unwrap().as_str(), "flag");
        assert_eq!(resolve_sample_name(None, None, None).unwrap().as_str(), DEFAULT_SAMPLE_NAME);
    }

    #[test]
    fn test_validate_options() {
        let config = PostprocessConfig::default();
        assert!(config.validate(false, true, true).is_ok());
        assert!(config.validate(false, false, false).is_ok());
        assert!(config.validate(false, true, false).is_err());
        assert!(config.validate(false, false, true).is_err());

        let alt_debug = PostprocessConfig {
            merge: MergeOptions {
                debug_output_all_candidates: Some(DebugCandidates::Alt),
                ..MergeOptions::default()
            },
            ..PostprocessConfig::default()
        };
        assert!(matches!(
            alt_debug.validate(true, false, false),
            Err(ValidationError::IncompatibleOptions(_))
        ));
        assert!(alt_debug.validate(false, false, false).is_ok());
    }

    #[test]
    fn test_write_vcf_only_keeps_pass() {
        let contigs = contigs();
        let reference = InMemoryReference::new([("chr1", "A".repeat(100).as_str())]);
        let mut pass = site("chr1", 5, &["C"]);
        pass.filters = vec![FILTER_PASS.to_string()];
        let mut ref_call = site("chr1", 9, &["C"]);
        ref_call.filters = vec!["RefCall".to_string()];

        let mut vcf: Vec<Variant> = Vec::new();
        let stats = write_postprocessed(
            vec![Ok(pass.clone()), Ok(ref_call)],
            None::<GvcfOutput<'_, Vec<io::Result<Variant>>>>,
            &contigs,
            &reference,
            true,
            &mut vcf,
        )
        .unwrap();
        assert_eq!(vcf, vec![pass]);
        assert_eq!(stats.vcf_records, 1);
    }
}
