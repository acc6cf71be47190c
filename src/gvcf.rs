//! Merging called variants with non-variant reference blocks into one
//! sorted gVCF stream.
//!
//! Both inputs are sorted by (contig order, start). A variant always wins
//! over the reference blocks it overlaps: blocks are clipped to the bases
//! before and after the variant, with their reference base re-read from
//! the genome.

use crate::contig::ContigSet;
use crate::error::ValidationError;
use crate::interval::GenomicInterval;
use crate::reference::ReferenceSource;
use crate::variant::{Variant, FILTER_PASS, GVCF_ALT_ALLELE};
use crate::vcf_writer::RecordSink;
use log::debug;
use std::io;

/// Likelihood given to every genotype involving the `<*>` allele.
pub const GVCF_ALT_ALLELE_GL: f64 = -99.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeState {
    /// The current variant ends before the current reference block starts.
    AdvanceVariant,
    /// The current reference block ends before the current variant starts.
    AdvanceNonVariant,
    /// Both are on the same contig and overlap.
    OverlapSplit,
    Done,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GvcfMergeStats {
    pub vcf_records: usize,
    pub gvcf_records: usize,
    pub split_blocks: usize,
    pub dropped_blocks: usize,
}

fn contig_index(variant: &Variant, contigs: &ContigSet) -> Result<usize, ValidationError> {
    contigs
        .order_of(&variant.contig)
        .ok_or_else(|| ValidationError::UnknownContig(variant.contig.clone()))
}

/// True when `a` lies entirely before `b`: on an earlier contig, or on the
/// same contig with `a.end <= b.start`. An exhausted stream (`None`) never
/// comes first and always comes last.
pub fn is_before(
    a: Option<&Variant>,
    b: Option<&Variant>,
    contigs: &ContigSet,
) -> Result<bool, ValidationError> {
    let (a, b) = match (a, b) {
        (None, _) => return Ok(false),
        (Some(_), None) => return Ok(true),
        (Some(a), Some(b)) => (a, b),
    };
    let (contig_a, contig_b) = (contig_index(a, contigs)?, contig_index(b, contigs)?);
    Ok(contig_a < contig_b || (contig_a == contig_b && a.end <= b.start))
}

pub fn next_state(
    variant: Option<&Variant>,
    nonvariant: Option<&Variant>,
    contigs: &ContigSet,
) -> Result<MergeState, ValidationError> {
    Ok(if variant.is_none() && nonvariant.is_none() {
        MergeState::Done
    } else if is_before(variant, nonvariant, contigs)? {
        MergeState::AdvanceVariant
    } else if is_before(nonvariant, variant, contigs)? {
        MergeState::AdvanceNonVariant
    } else {
        MergeState::OverlapSplit
    })
}

/// Shifts GLs so the most likely genotype is 0, as a GL -> PL -> GL round
/// trip through a VCF file would.
pub fn zero_scale_gl(mut variant: Variant) -> Variant {
    for call in &mut variant.calls {
        let max_gl = call
            .genotype_likelihoods
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        for gl in &mut call.genotype_likelihoods {
            *gl -= max_gl;
        }
    }
    variant
}

/// Adds the `<*>` allele with placeholder likelihoods for the new genotypes
/// and zero depth/fraction entries. Records already carrying `<*>` are
/// returned unchanged.
pub fn to_gvcf_record(mut variant: Variant) -> Result<Variant, ValidationError> {
    if variant.alternate_bases.iter().any(|a| a == GVCF_ALT_ALLELE) {
        return Ok(variant);
    }
    variant.alternate_bases.push(GVCF_ALT_ALLELE.to_string());
    // One het genotype with each existing allele plus the <*>/<*> genotype.
    let num_new_gls = variant.alternate_bases.len() + 1;
    let call = variant.only_call_mut()?;
    call.genotype_likelihoods
        .extend(std::iter::repeat(GVCF_ALT_ALLELE_GL).take(num_new_gls));
    if let Some(ad) = call.ad.as_mut() {
        ad.push(0);
    }
    if let Some(vaf) = call.vaf.as_mut() {
        vaf.push(0.0);
    }
    Ok(variant)
}

/// Copy of `template` moved to `[start, end)`. A moved start gets the
/// reference base at the new start.
pub fn record_from_template<R: ReferenceSource + ?Sized>(
    template: &Variant,
    start: i64,
    end: i64,
    reference: &R,
) -> io::Result<Variant> {
    let mut record = template.clone();
    record.start = start;
    record.end = end;
    if start != template.start {
        let base = reference.fetch_bases(&GenomicInterval::new(
            template.contig.clone(),
            start,
            start + 1,
        ))?;
        record.reference_bases = String::from_utf8_lossy(&base).into_owned();
    }
    Ok(record)
}

pub struct GvcfMerger<'a, R: ReferenceSource + ?Sized> {
    contigs: &'a ContigSet,
    reference: &'a R,
    only_keep_pass: bool,
}

impl<'a, R: ReferenceSource + ?Sized> GvcfMerger<'a, R> {
    pub fn new(contigs: &'a ContigSet, reference: &'a R, only_keep_pass: bool) -> Self {
        Self {
            contigs,
            reference,
            only_keep_pass,
        }
    }

    /// Writes variants to `vcf` and the merge of variants and reference
    /// blocks to `gvcf`. Both inputs must be sorted in contig order.
    pub fn merge<V, N>(
        &self,
        variants: V,
        nonvariants: N,
        vcf: &mut dyn RecordSink,
        gvcf: &mut dyn RecordSink,
    ) -> io::Result<GvcfMergeStats>
    where
        V: IntoIterator<Item = io::Result<Variant>>,
        N: IntoIterator<Item = io::Result<Variant>>,
    {
        let mut variants = variants.into_iter();
        let mut nonvariants = nonvariants.into_iter();
        let mut stats = GvcfMergeStats::default();

        let mut variant = variants.next().transpose()?;
        let mut nonvariant = nonvariants.next().transpose()?;

        loop {
            match next_state(variant.as_ref(), nonvariant.as_ref(), self.contigs)? {
                MergeState::Done => break,
                MergeState::AdvanceVariant => {
                    if let Some(v) = variant.take() {
                        if !self.only_keep_pass || v.filters == [FILTER_PASS] {
                            vcf.write(&v)?;
                            stats.vcf_records += 1;
                        }
                        gvcf.write(&to_gvcf_record(zero_scale_gl(v))?)?;
                        stats.gvcf_records += 1;
                    }
                    variant = variants.next().transpose()?;
                }
                MergeState::AdvanceNonVariant => {
                    if let Some(nv) = nonvariant.take() {
                        gvcf.write(&nv)?;
                        stats.gvcf_records += 1;
                    }
                    nonvariant = nonvariants.next().transpose()?;
                }
                MergeState::OverlapSplit => {
                    // Neither stream is exhausted in this state.
                    let (Some(v), Some(nv)) = (variant.as_ref(), nonvariant.as_ref()) else {
                        unreachable!("overlap requires both records");
                    };
                    assert!(
                        v.start.max(nv.start) < v.end.min(nv.end),
                        "{v} and {nv} neither overlap nor are ordered"
                    );
                    if nv.start < v.start {
                        let leading = record_from_template(nv, nv.start, v.start, self.reference)?;
                        gvcf.write(&leading)?;
                        stats.gvcf_records += 1;
                        stats.split_blocks += 1;
                    }
                    if nv.end > v.end {
                        debug!("Clipping reference block {nv} to start after {v}");
                        nonvariant = Some(record_from_template(nv, v.end, nv.end, self.reference)?);
                    } else {
                        stats.dropped_blocks += 1;
                        nonvariant = nonvariants.next().transpose()?;
                    }
                }
            }
        }
        Ok(stats)
    }
}

/// Merges sorted variants and non-variant blocks with a [`GvcfMerger`].
pub fn merge_variants_and_nonvariants<V, N, R>(
    variants: V,
    nonvariants: N,
    contigs: &ContigSet,
    reference: &R,
    only_keep_pass: bool,
    vcf: &mut dyn RecordSink,
    gvcf: &mut dyn RecordSink,
) -> io::Result<GvcfMergeStats>
where
    V: IntoIterator<Item = io::Result<Variant>>,
    N: IntoIterator<Item = io::Result<Variant>>,
    R: ReferenceSource + ?Sized,
{
    GvcfMerger::new(contigs, reference, only_keep_pass).merge(variants, nonvariants, vcf, gvcf)
}
