use crate::error::ValidationError;
use crate::interval::GenomicInterval;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Symbolic alt allele of reference-block records.
pub const GVCF_ALT_ALLELE: &str = "<*>";
pub const NO_CALL: i32 = -1;

pub const FILTER_PASS: &str = "PASS";
pub const FILTER_REF_CALL: &str = "RefCall";
pub const FILTER_LOW_QUAL: &str = "LowQual";
pub const FILTER_NO_CALL: &str = "NoCall";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VariantCall {
    pub sample: String,
    pub genotype: Vec<i32>,
    /// log10 genotype likelihoods in VCF genotype order.
    pub genotype_likelihoods: Vec<f64>,
    pub gq: Option<i32>,
    /// Allelic depths, reference first.
    pub ad: Option<Vec<i32>>,
    pub dp: Option<i32>,
    pub min_dp: Option<i32>,
    /// Variant allele fractions, one per alt allele.
    pub vaf: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenotypeType {
    NoCall,
    HomRef,
    Het,
    HomVar,
}

impl VariantCall {
    pub fn genotype_type(&self) -> GenotypeType {
        if self.genotype.is_empty() || self.genotype.iter().any(|&g| g < 0) {
            GenotypeType::NoCall
        } else if self.genotype.iter().all(|&g| g == 0) {
            GenotypeType::HomRef
        } else if self.genotype.windows(2).all(|w| w[0] == w[1]) {
            GenotypeType::HomVar
        } else {
            GenotypeType::Het
        }
    }

    /// Total allelic depth. A missing AD counts as zero depth.
    pub fn total_ad(&self) -> i64 {
        self.ad
            .as_ref()
            .map_or(0, |ad| ad.iter().map(|&d| d as i64).sum())
    }
}

/// A site with its reference and alternate alleles. Coordinates are 0-based
/// half-open; `end - start` is the reference allele length.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Variant {
    pub contig: String,
    pub start: i64,
    pub end: i64,
    pub reference_bases: String,
    pub alternate_bases: Vec<String>,
    pub quality: f64,
    pub filters: Vec<String>,
    pub info: BTreeMap<String, String>,
    pub calls: Vec<VariantCall>,
}

impl Variant {
    pub fn new(
        contig: impl Into<String>,
        start: i64,
        reference_bases: impl Into<String>,
        alternate_bases: &[&str],
    ) -> Self {
        let reference_bases = reference_bases.into();
        Variant {
            contig: contig.into(),
            start,
            end: start + reference_bases.len() as i64,
            reference_bases,
            alternate_bases: alternate_bases.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_call(mut self, call: VariantCall) -> Self {
        self.calls.push(call);
        self
    }

    pub fn interval(&self) -> GenomicInterval {
        GenomicInterval::new(self.contig.clone(), self.start, self.end)
    }

    /// Grouping key for predictions of the same site.
    pub fn site_key(&self) -> (&str, i64, i64) {
        (self.contig.as_str(), self.start, self.end)
    }

    pub fn n_alleles(&self) -> usize {
        self.alternate_bases.len() + 1
    }

    /// Allele by VCF index, 0 being the reference.
    pub fn allele(&self, index: usize) -> Option<&str> {
        if index == 0 {
            Some(&self.reference_bases)
        } else {
            self.alternate_bases.get(index - 1).map(String::as_str)
        }
    }

    pub fn is_gvcf(&self) -> bool {
        self.alternate_bases.len() == 1 && self.alternate_bases[0] == GVCF_ALT_ALLELE
    }

    pub fn only_call(&self) -> Result<&VariantCall, ValidationError> {
        match self.calls.as_slice() {
            [call] => Ok(call),
            calls => Err(ValidationError::CallCount {
                site: self.to_string(),
                count: calls.len(),
            }),
        }
    }

    pub fn only_call_mut(&mut self) -> Result<&mut VariantCall, ValidationError> {
        if self.calls.len() != 1 {
            return Err(ValidationError::CallCount {
                site: self.to_string(),
                count: self.calls.len(),
            });
        }
        Ok(&mut self.calls[0])
    }

    /// Trims the suffix shared by every allele, keeping at least one base
    /// in the shortest allele, and moves `end` to match the new reference.
    pub fn simplified(&self) -> Variant {
        let mut out = self.clone();
        let alleles: Vec<&[u8]> = std::iter::once(self.reference_bases.as_bytes())
            .chain(self.alternate_bases.iter().map(|a| a.as_bytes()))
            .collect();
        let shortest = alleles.iter().map(|a| a.len()).min().unwrap_or(0);
        let mut common_suffix = 0;
        for i in 1..shortest {
            let base = alleles[0][alleles[0].len() - i];
            if alleles.iter().any(|a| a[a.len() - i] != base) {
                break;
            }
            common_suffix = i;
        }
        if common_suffix > 0 {
            let trim = |s: &String| s[..s.len() - common_suffix].to_string();
            out.reference_bases = trim(&self.reference_bases);
            out.alternate_bases = self.alternate_bases.iter().map(trim).collect();
            out.end = out.start + out.reference_bases.len() as i64;
        }
        out
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} {}->{}",
            self.contig,
            self.start + 1,
            self.reference_bases,
            self.alternate_bases.join(",")
        )
    }
}

/// Unordered allele pairs `(a, b)`, `a <= b`, in VCF likelihood order for
/// ploidy 2: 0/0, 0/1, 1/1, 0/2, 1/2, 2/2, ...
pub fn genotype_ordering(n_alleles: usize) -> Vec<(usize, usize)> {
    let mut ordering = Vec::with_capacity(n_alleles * (n_alleles + 1) / 2);
    for b in 0..n_alleles {
        for a in 0..=b {
            ordering.push((a, b));
        }
    }
    ordering
}

/// Position of genotype `a/b` in the VCF ordering.
pub fn genotype_index(a: usize, b: usize) -> usize {
    let (a, b) = if a <= b { (a, b) } else { (b, a) };
    b * (b + 1) / 2 + a
}
