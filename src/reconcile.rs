use crate::contig::{Contig, ContigSet};
use crate::error::ValidationError;
use log::{info, warn};
use rustc_hash::FxHashSet;

/// Contigs present, with the same length, in every set. Order and records
/// come from the first set.
pub fn common_contigs(sets: &[&ContigSet]) -> ContigSet {
    let Some((first, rest)) = sets.split_first() else {
        return ContigSet::new();
    };
    let shared: Vec<Contig> = first
        .iter()
        .filter(|contig| {
            rest.iter().all(|other| {
                other
                    .get(&contig.name)
                    .is_some_and(|c| c.length == contig.length)
            })
        })
        .cloned()
        .collect();
    ContigSet::from_contigs(shared)
}

/// Fails when `common` covers less than `min_fraction` of `reference`.
/// Exactly reaching the fraction passes.
pub fn validate_coverage(
    reference: &ContigSet,
    common: &ContigSet,
    min_fraction: f64,
) -> Result<(), ValidationError> {
    let reference_span = reference.total_span();
    let covered_span = common.total_span();
    let fraction = if reference_span > 0 {
        covered_span as f64 / reference_span as f64
    } else {
        0.0
    };
    if covered_span == 0 || fraction < min_fraction {
        return Err(ValidationError::InsufficientContigCoverage {
            reference_span,
            covered_span,
            percent: 100.0 * fraction,
            min_fraction,
        });
    }
    Ok(())
}

/// Reference contigs that every present, non-empty other source agrees on.
///
/// Names in `exclude_names` are removed from the reference first, so both
/// spans in the coverage check are over the remaining reference contigs.
pub fn reconcile_contigs(
    reference: &ContigSet,
    others: &[(&str, Option<&ContigSet>)],
    exclude_names: &[String],
    min_coverage_fraction: f64,
) -> Result<ContigSet, ValidationError> {
    let excluded: FxHashSet<&str> = exclude_names.iter().map(String::as_str).collect();
    let kept_reference = ContigSet::from_contigs(
        reference
            .iter()
            .filter(|c| !excluded.contains(c.name.as_str()))
            .cloned()
            .collect(),
    );
    if kept_reference.len() < reference.len() {
        info!(
            "Excluding {} reference contigs by name",
            reference.len() - kept_reference.len()
        );
    }

    let mut sets = vec![&kept_reference];
    for &(source, contigs) in others {
        match contigs {
            Some(contigs) if !contigs.is_empty() => sets.push(contigs),
            _ => info!("No contigs from {source}, skipping it for contig reconciliation"),
        }
    }
    let common = common_contigs(&sets);

    let dropped: Vec<&str> = kept_reference
        .names()
        .filter(|name| !common.contains(name))
        .collect();
    if !dropped.is_empty() {
        warn!(
            "Dropping {} reference contigs not shared by all inputs: {}",
            dropped.len(),
            dropped.join(", ")
        );
    }

    validate_coverage(&kept_reference, &common, min_coverage_fraction)?;
    Ok(common)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make(specs: &[(&str, i64)]) -> ContigSet {
        ContigSet::from_name_lengths(specs.iter().map(|&(n, l)| (n, l)))
    }

    fn hundreds(names: &[&str]) -> ContigSet {
        ContigSet::from_name_lengths(names.iter().map(|&n| (n, 100)))
    }

    fn pairs(set: &ContigSet) -> Vec<(String, i64, usize)> {
        set.iter()
            .map(|c| (c.name.clone(), c.length, c.order_index))
            .collect()
    }

    #[test]
    fn test_common_contigs() {
        let shared = common_contigs(&[&make(&[("chrM", 10)]), &make(&[("chrM", 10)])]);
        assert_eq!(pairs(&shared), vec![("chrM".to_string(), 10, 0)]);

        assert!(common_contigs(&[&make(&[("chrM", 10)]), &make(&[("chr1", 10)])]).is_empty());
        assert!(common_contigs(&[&make(&[("chrM", 10)]), &make(&[("chrM", 20)])]).is_empty());

        // The first set's order index is kept.
        let shared = common_contigs(&[
            &make(&[("chr1", 20), ("chrM", 10)]),
            &make(&[("chrM", 10), ("chr2", 30)]),
        ]);
        assert_eq!(pairs(&shared), vec![("chrM".to_string(), 10, 1)]);

        let three_way = common_contigs(&[
            &make(&[("chr1", 20), ("chrM", 10)]),
            &make(&[("chrM", 10), ("chr2", 30)]),
            &make(&[("chr2", 30), ("chr3", 30)]),
        ]);
        assert!(three_way.is_empty());
    }

    #[test]
    fn test_validate_coverage_thresholds() {
        let reference = make(&[("1", 100), ("2", 100)]);
        for threshold in [0.5, 0.9, 1.0] {
            assert!(validate_coverage(&reference, &reference, threshold).is_ok());
        }
        for threshold in [0.0, 0.1, 0.5, 0.9, 1.0] {
            let err = validate_coverage(&reference, &ContigSet::new(), threshold).unwrap_err();
            assert!(err.to_string().contains("span 200"));
        }
        assert!(validate_coverage(&reference, &make(&[("1", 100)]), 0.9).is_err());
        assert!(validate_coverage(&reference, &make(&[("2", 100)]), 0.6).is_err());
        assert!(validate_coverage(&reference, &make(&[("2", 100)]), 0.4).is_ok());
        assert!(validate_coverage(&reference, &make(&[("2", 100)]), 0.5).is_ok());
    }

    fn names(set: &ContigSet) -> Vec<&str> {
        set.names().collect()
    }

    #[test]
    fn test_reconcile_consistent_contigs() {
        let ref_contigs = hundreds(&["1", "2", "3"]);
        let sam = hundreds(&["1", "2", "3"]);
        let result = reconcile_contigs(&ref_contigs, &[("reads", Some(&sam)), ("truth", None)], &[], 1.0).unwrap();
        assert_eq!(names(&result), vec!["1", "2", "3"]);

        let sam = hundreds(&["1", "2"]);
        let result = reconcile_contigs(&ref_contigs, &[("reads", Some(&sam)), ("truth", None)], &[], 0.66).unwrap();
        assert_eq!(names(&result), vec!["1", "2"]);

        let vcf = hundreds(&["1", "3"]);
        let result =
            reconcile_contigs(&ref_contigs, &[("reads", Some(&sam)), ("truth", Some(&vcf))], &[], 0.33).unwrap();
        assert_eq!(names(&result), vec!["1"]);

        let ref_contigs = hundreds(&["1", "2", "3", "4", "5"]);
        let sam = hundreds(&["1", "2", "3"]);
        let excludes = vec!["4".to_string(), "5".to_string()];
        let result = reconcile_contigs(&ref_contigs, &[("reads", Some(&sam))], &excludes, 1.0).unwrap();
        assert_eq!(names(&result), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_reconcile_inconsistent_contigs() {
        let ref_contigs = hundreds(&["1", "2", "3"]);
        let sam = hundreds(&["1", "2"]);
        let err = reconcile_contigs(&ref_contigs, &[("reads", Some(&sam))], &[], 0.67).unwrap_err();
        assert!(err.to_string().contains("Reference contigs span"));

        let vcf = hundreds(&["1", "3"]);
        let err = reconcile_contigs(&ref_contigs, &[("reads", Some(&sam)), ("truth", Some(&vcf))], &[], 0.34)
            .unwrap_err();
        assert!(err.to_string().contains("Reference contigs span 300"));
    }

    #[test]
    fn test_empty_sources_impose_no_constraint() {
        let ref_contigs = hundreds(&["1", "2"]);
        let empty = ContigSet::new();
        let result = reconcile_contigs(&ref_contigs, &[("reads", Some(&empty))], &[], 1.0).unwrap();
        assert_eq!(names(&result), vec!["1", "2"]);
    }
}
