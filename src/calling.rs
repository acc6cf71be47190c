use crate::error::ValidationError;
use crate::genomics_math::perror_to_bounded_log10_perror;
use crate::merge::compute_quals;
use crate::sample::SampleId;
use crate::variant::{
    GenotypeType, Variant, FILTER_LOW_QUAL, FILTER_NO_CALL, FILTER_PASS, FILTER_REF_CALL, NO_CALL,
};

#[derive(Debug, Clone)]
pub struct CallOptions {
    /// Variant calls with QUAL below this are marked LowQual.
    pub qual_filter: f64,
    /// RefCalls with GQ below this are reported as `./.`.
    pub cnn_homref_call_min_gq: f64,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            qual_filter: 1.0,
            cnn_homref_call_min_gq: 20.0,
        }
    }
}

/// Index of the most likely genotype and its alleles, for ploidy 2.
pub fn most_likely_genotype(
    probabilities: &[f64],
    n_alleles: usize,
) -> Result<(usize, [i32; 2]), ValidationError> {
    if n_alleles < 2 {
        return Err(ValidationError::UnsupportedGenotype(format!(
            "n_alleles must be >= 2 but got {n_alleles}"
        )));
    }
    // First maximum wins on ties
    let index_of_max = probabilities
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &p)| match best {
            Some((_, max)) if max >= p => best,
            _ => Some((i, p)),
        })
        .map(|(i, _)| i)
        .ok_or_else(|| ValidationError::UnsupportedGenotype("empty probabilities".to_string()))?;

    let mut index = 0;
    for b in 0..n_alleles {
        for a in 0..=b {
            if index == index_of_max {
                return Ok((index, [a as i32, b as i32]));
            }
            index += 1;
        }
    }
    Err(ValidationError::UnsupportedGenotype(format!(
        "{} probabilities for {} alleles",
        probabilities.len(),
        n_alleles
    )))
}

pub fn compute_filter_fields(variant: &Variant, min_quality: f64) -> Result<Vec<String>, ValidationError> {
    let filter = match variant.only_call()?.genotype_type() {
        GenotypeType::NoCall => FILTER_NO_CALL,
        GenotypeType::HomRef => FILTER_REF_CALL,
        _ if variant.quality < min_quality => FILTER_LOW_QUAL,
        _ => FILTER_PASS,
    };
    Ok(vec![filter.to_string()])
}

/// Sets GT to `./.`, GL to `[0, 0]` and GQ to 0 when the call has no reads.
pub fn uncall_gt_if_no_ad(variant: &mut Variant) -> Result<(), ValidationError> {
    let call = variant.only_call_mut()?;
    if call.total_ad() == 0 {
        call.genotype = vec![NO_CALL, NO_CALL];
        call.genotype_likelihoods = vec![0.0, 0.0];
        call.gq = Some(0);
    }
    Ok(())
}

pub fn uncall_homref_gt_if_lowqual(variant: &mut Variant, min_homref_gq: f64) -> Result<(), ValidationError> {
    let is_ref_call = variant.filters == [FILTER_REF_CALL];
    let call = variant.only_call_mut()?;
    if is_ref_call && (call.gq.unwrap_or(0) as f64) < min_homref_gq {
        call.genotype = vec![NO_CALL, NO_CALL];
    }
    Ok(())
}

/// Fills the single call of `variant` from its genotype probabilities:
/// genotype, GQ, GL, QUAL and FILTER.
pub fn add_call_to_variant(
    mut variant: Variant,
    probabilities: &[f64],
    options: &CallOptions,
    sample: &SampleId,
) -> Result<Variant, ValidationError> {
    let n_alleles = variant.n_alleles();
    let (index, genotype) = most_likely_genotype(probabilities, n_alleles)?;
    let (gq, qual) = compute_quals(probabilities, index);
    variant.quality = qual;

    let call = variant.only_call_mut()?;
    call.sample = sample.to_string();
    call.genotype = genotype.to_vec();
    call.gq = Some(gq);
    call.genotype_likelihoods = probabilities
        .iter()
        .map(|&p| perror_to_bounded_log10_perror(p))
        .collect();

    uncall_gt_if_no_ad(&mut variant)?;
    variant.filters = compute_filter_fields(&variant, options.qual_filter)?;
    uncall_homref_gt_if_lowqual(&mut variant, options.cnn_homref_call_min_gq)?;
    Ok(variant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::VariantCall;

    fn variant_with_ad(ad: Option<Vec<i32>>) -> Variant {
        Variant::new("chr1", 10, "A", &["C"]).with_call(VariantCall {
            ad,
            ..Default::default()
        })
    }

    #[test]
    fn test_most_likely_genotype() {
        assert_eq!(most_likely_genotype(&[0.2, 0.5, 0.3], 2).unwrap(), (1, [0, 1]));
        assert_eq!(most_likely_genotype(&[0.1, 0.1, 0.8], 2).unwrap(), (2, [1, 1]));
        assert_eq!(
            most_likely_genotype(&[0.0, 0.1, 0.1, 0.0, 0.7, 0.1], 3).unwrap(),
            (4, [1, 2])
        );
        // Ties resolve to the first maximum.
        assert_eq!(most_likely_genotype(&[0.5, 0.5, 0.0], 2).unwrap(), (0, [0, 0]));
        assert!(most_likely_genotype(&[1.0], 1).is_err());
    }

    #[test]
    fn test_add_call_sets_genotype_and_pass() {
        let variant = variant_with_ad(Some(vec![5, 7]));
        let called = add_call_to_variant(
            variant,
            &[0.01, 0.98, 0.01],
            &CallOptions::default(),
            &SampleId::new("NA12878"),
        )
        .unwrap();
        let call = called.only_call().unwrap();
        assert_eq!(call.sample, "NA12878");
        assert_eq!(call.genotype, vec![0, 1]);
        assert_eq!(call.gq, Some(17));
        assert_eq!(call.genotype_likelihoods.len(), 3);
        assert!((call.genotype_likelihoods[0] + 2.0).abs() < 1e-9);
        assert!((called.quality - 20.0).abs() < 1e-6);
        assert_eq!(called.filters, vec![FILTER_PASS]);
    }

    #[test]
    fn test_low_quality_variant_is_filtered() {
        let called = add_call_to_variant(
            variant_with_ad(Some(vec![5, 7])),
            &[0.4, 0.5, 0.1],
            &CallOptions {
                qual_filter: 10.0,
                ..CallOptions::default()
            },
            &SampleId::default(),
        )
        .unwrap();
        assert_eq!(called.filters, vec![FILTER_LOW_QUAL]);
    }

    #[test]
    fn test_no_depth_uncalls() {
        for ad in [None, Some(vec![0, 0])] {
            let called = add_call_to_variant(
                variant_with_ad(ad),
                &[0.01, 0.98, 0.01],
                &CallOptions::default(),
                &SampleId::default(),
            )
            .unwrap();
            let call = called.only_call().unwrap();
            assert_eq!(call.genotype, vec![-1, -1]);
            assert_eq!(call.genotype_likelihoods, vec![0.0, 0.0]);
            assert_eq!(call.gq, Some(0));
            assert_eq!(called.filters, vec![FILTER_NO_CALL]);
        }
    }

    #[test]
    fn test_low_gq_ref_call_is_uncalled() {
        let called = add_call_to_variant(
            variant_with_ad(Some(vec![5, 1])),
            &[0.9, 0.08, 0.02],
            &CallOptions::default(),
            &SampleId::default(),
        )
        .unwrap();
        assert_eq!(called.filters, vec![FILTER_REF_CALL]);
        assert_eq!(called.only_call().unwrap().genotype, vec![-1, -1]);

        let confident = add_call_to_variant(
            variant_with_ad(Some(vec![5, 1])),
            &[0.999, 0.0009, 0.0001],
            &CallOptions::default(),
            &SampleId::default(),
        )
        .unwrap();
        assert_eq!(confident.filters, vec![FILTER_REF_CALL]);
        assert_eq!(confident.only_call().unwrap().genotype, vec![0, 0]);
    }
}
