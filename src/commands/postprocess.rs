use crate::faidx::FastaIndex;
use crate::haplotypes::resolve_conflicting_variants;
use crate::merge::AlleleSubsetPrediction;
use crate::postprocess::{postprocess, resolve_sample_name, write_postprocessed, GvcfOutput, PostprocessConfig};
use crate::records::{read_records, RecordReader};
use crate::variant::Variant;
use crate::vcf_writer::VcfWriter;
use log::{info, warn};
use std::io;
use std::path::PathBuf;

pub struct PostprocessRunConfig {
    pub ref_path: String,
    /// Record file of `AlleleSubsetPrediction`s.
    pub infile: PathBuf,
    pub outfile: PathBuf,
    /// Record file of non-variant `Variant` blocks, sorted.
    pub nonvariant_site_records: Option<PathBuf>,
    pub gvcf_outfile: Option<PathBuf>,
    pub postprocess: PostprocessConfig,
}

/// Number of VCF and gVCF records written.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PostprocessSummary {
    pub vcf_records: usize,
    pub gvcf_records: usize,
    pub skipped_sites: usize,
}

pub fn run_postprocess(config: &PostprocessRunConfig) -> io::Result<PostprocessSummary> {
    config.postprocess.validate(
        false,
        config.nonvariant_site_records.is_some(),
        config.gvcf_outfile.is_some(),
    )?;

    let reference = FastaIndex::from_path(&config.ref_path)?;
    let contigs = reference.contigs();

    let predictions: Vec<AlleleSubsetPrediction> = read_records(&config.infile)?;
    info!(
        "Read {} predictions from {}",
        predictions.len(),
        config.infile.display()
    );
    if predictions.is_empty() {
        warn!("No predictions found in {}, writing header-only output", config.infile.display());
    }

    let first_nonvariant: Option<Variant> = match &config.nonvariant_site_records {
        Some(path) => RecordReader::<Variant>::open(path)?.next().transpose()?,
        None => None,
    };
    let sample = resolve_sample_name(
        predictions.first(),
        first_nonvariant.as_ref(),
        config.postprocess.sample_name.as_deref(),
    )?;

    let mut variants = postprocess(predictions, contigs, sample.clone(), &config.postprocess, None)?;
    let mut vcf = VcfWriter::create(&config.outfile, contigs, sample.as_str())?;

    let stats = match (&config.nonvariant_site_records, &config.gvcf_outfile) {
        (Some(nonvariant_path), Some(gvcf_path)) => {
            let mut gvcf = VcfWriter::create(gvcf_path, contigs, sample.as_str())?;
            let stats = write_postprocessed(
                resolve_conflicting_variants(variants.by_ref()),
                Some(GvcfOutput {
                    nonvariants: RecordReader::<Variant>::open(nonvariant_path)?,
                    sink: &mut gvcf,
                }),
                contigs,
                &reference,
                config.postprocess.only_keep_pass,
                &mut vcf,
            )?;
            gvcf.finish()?;
            stats
        }
        _ => write_postprocessed(
            resolve_conflicting_variants(variants.by_ref()),
            None::<GvcfOutput<'_, RecordReader<Variant>>>,
            contigs,
            &reference,
            config.postprocess.only_keep_pass,
            &mut vcf,
        )?,
    };
    vcf.finish()?;

    let summary = PostprocessSummary {
        vcf_records: stats.vcf_records,
        gvcf_records: stats.gvcf_records,
        skipped_sites: variants.skipped(),
    };
    info!(
        "Wrote {} VCF records and {} gVCF records ({} sites skipped)",
        summary.vcf_records, summary.gvcf_records, summary.skipped_sites
    );
    Ok(summary)
}
