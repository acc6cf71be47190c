//! htslib-backed readers: contigs from BAM and VCF headers, indexed variant
//! positions and aligned reads.

use crate::contig::ContigSet;
use crate::interval::GenomicInterval;
use crate::region_processor::{AlignedRead, ReadSource};
use crate::vcf_positions::VariantSource;
use log::debug;
use rust_htslib::bam::{self, Read as BamRead};
use rust_htslib::bcf::{self, header::HeaderRecord, Read as BcfRead};
use std::io;

fn htslib_error(context: String, e: rust_htslib::errors::Error) -> io::Error {
    io::Error::other(format!("{context}: {e}"))
}

/// Contigs declared in a BAM/CRAM header, in header order.
pub fn bam_header_contigs(path: &str) -> io::Result<ContigSet> {
    let reader = bam::Reader::from_path(path)
        .map_err(|e| htslib_error(format!("Failed to open alignment file '{path}'"), e))?;
    let header = reader.header();
    let mut contigs = ContigSet::new();
    for (tid, name) in header.target_names().into_iter().enumerate() {
        let length = header.target_len(tid as u32).unwrap_or(0);
        contigs.push(String::from_utf8_lossy(name), length as i64);
    }
    Ok(contigs)
}

/// Contigs declared by `##contig` lines of a VCF/BCF header. Contigs
/// without a length are skipped.
pub fn vcf_header_contigs(path: &str) -> io::Result<ContigSet> {
    let reader = bcf::Reader::from_path(path)
        .map_err(|e| htslib_error(format!("Failed to open VCF '{path}'"), e))?;
    let mut contigs = ContigSet::new();
    for record in reader.header().header_records() {
        let HeaderRecord::Contig { values, .. } = record else {
            continue;
        };
        let (Some(id), Some(length)) = (values.get("ID"), values.get("length")) else {
            continue;
        };
        match length.parse::<i64>() {
            Ok(length) => {
                contigs.push(id.clone(), length);
            }
            Err(_) => debug!("Skipping contig '{id}' with non-numeric length '{length}'"),
        }
    }
    Ok(contigs)
}

/// Indexed VCF/BCF queried by region.
pub struct IndexedVcf {
    path: String,
    reader: bcf::IndexedReader,
}

impl IndexedVcf {
    pub fn from_path(path: &str) -> io::Result<Self> {
        let reader = bcf::IndexedReader::from_path(path)
            .map_err(|e| htslib_error(format!("Failed to open indexed VCF '{path}'"), e))?;
        Ok(Self {
            path: path.to_string(),
            reader,
        })
    }
}

impl VariantSource for IndexedVcf {
    fn query(&mut self, interval: &GenomicInterval) -> io::Result<Vec<GenomicInterval>> {
        // Contigs absent from the index have no variants.
        let rid = match self.reader.header().name2rid(interval.contig.as_bytes()) {
            Ok(rid) => rid,
            Err(_) => return Ok(Vec::new()),
        };
        if interval.is_empty() {
            return Ok(Vec::new());
        }
        self.reader
            .fetch(rid, interval.start as u64, Some((interval.end - 1) as u64))
            .map_err(|e| htslib_error(format!("Failed to query {interval} in '{}'", self.path), e))?;

        let mut spans = Vec::new();
        for record in self.reader.records() {
            let record = record
                .map_err(|e| htslib_error(format!("Failed to read record from '{}'", self.path), e))?;
            spans.push(GenomicInterval::new(
                interval.contig.clone(),
                record.pos(),
                record.end(),
            ));
        }
        Ok(spans)
    }
}

/// Indexed BAM/CRAM reader for one sample. Unmapped, secondary and
/// duplicate reads are skipped.
pub struct IndexedBam {
    path: String,
    reader: bam::IndexedReader,
}

impl IndexedBam {
    pub fn from_path(path: &str) -> io::Result<Self> {
        let reader = bam::IndexedReader::from_path(path)
            .map_err(|e| htslib_error(format!("Failed to open indexed alignment file '{path}'"), e))?;
        Ok(Self {
            path: path.to_string(),
            reader,
        })
    }
}

impl ReadSource for IndexedBam {
    fn query(&mut self, region: &GenomicInterval) -> io::Result<Vec<AlignedRead>> {
        self.reader
            .fetch((region.contig.as_str(), region.start, region.end))
            .map_err(|e| htslib_error(format!("Failed to query {region} in '{}'", self.path), e))?;

        let mut reads = Vec::new();
        for record in self.reader.records() {
            let record = record
                .map_err(|e| htslib_error(format!("Failed to read record from '{}'", self.path), e))?;
            if record.is_unmapped() || record.is_secondary() || record.is_duplicate() {
                continue;
            }
            reads.push(AlignedRead {
                name: String::from_utf8_lossy(record.qname()).into_owned(),
                contig: region.contig.clone(),
                start: record.pos(),
                cigar: record.cigar().to_string(),
                sequence: record.seq().as_bytes(),
                qualities: record.qual().to_vec(),
                mapping_quality: record.mapq(),
            });
        }
        Ok(reads)
    }
}
