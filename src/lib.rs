// lib.rs
pub mod bgzf_io;
pub mod calling;
pub mod commands;
pub mod contig;
pub mod error;
pub mod faidx;
pub mod genomics_math;
pub mod gvcf;
pub mod haplotypes;
pub mod hts;
pub mod interval;
pub mod merge;
pub mod partition;
pub mod postprocess;
pub mod ranges;
pub mod reconcile;
pub mod records;
pub mod reference;
pub mod region_processor;
pub mod sample;
pub mod variant;
pub mod vcf_positions;
pub mod vcf_writer;
