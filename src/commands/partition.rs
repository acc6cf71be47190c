use crate::contig::ContigSet;
use crate::faidx::FastaIndex;
use crate::hts::{bam_header_contigs, vcf_header_contigs, IndexedVcf};
use crate::interval::{parse_bed_file, parse_region_arg, GenomicInterval};
use crate::partition::{calling_regions_from_intervals, narrow_to_confident, PartitionConfig, Region};
use crate::ranges::IntervalSet;
use crate::reconcile::reconcile_contigs;
use crate::vcf_positions::{fetch_variant_positions, filter_regions_by_positions};
use log::info;
use std::io::{self, Write};

/// Inputs that decide which regions a shard processes.
pub struct RegionsConfig {
    pub ref_path: String,
    pub reads: Vec<String>,
    /// Indexed VCF whose contigs must agree with the reference.
    pub variants: Option<String>,
    /// Keep only regions containing a record of `variants`.
    pub only_regions_with_variants: bool,
    pub regions: Vec<String>,
    pub exclude_regions: Vec<String>,
    pub confident_regions: Option<String>,
    pub exclude_contigs: Vec<String>,
    pub min_shared_contigs_fraction: f64,
    pub partition: PartitionConfig,
}

fn parse_region_args(args: &[String], contigs: &ContigSet) -> io::Result<Vec<GenomicInterval>> {
    let mut intervals = Vec::new();
    for arg in args {
        intervals.extend(parse_region_arg(arg, contigs)?);
    }
    Ok(intervals)
}

/// The regions of this shard, in processing order, and the contigs they
/// were computed against.
pub fn regions_to_process(config: &RegionsConfig) -> io::Result<(ContigSet, Vec<Region>)> {
    let reference = FastaIndex::from_path(&config.ref_path)?;

    let mut sources: Vec<(String, ContigSet)> = Vec::new();
    for reads in &config.reads {
        sources.push((format!("reads {reads}"), bam_header_contigs(reads)?));
    }
    if let Some(variants) = &config.variants {
        sources.push((format!("variants {variants}"), vcf_header_contigs(variants)?));
    }
    let others: Vec<(&str, Option<&ContigSet>)> = sources
        .iter()
        .map(|(name, contigs)| (name.as_str(), Some(contigs)))
        .collect();
    let contigs = reconcile_contigs(
        reference.contigs(),
        &others,
        &config.exclude_contigs,
        config.min_shared_contigs_fraction,
    )?;
    info!("Using {} contigs shared by all inputs", contigs.len());

    let includes = parse_region_args(&config.regions, &contigs)?;
    let excludes = parse_region_args(&config.exclude_regions, &contigs)?;
    let confident = config
        .confident_regions
        .as_deref()
        .map(parse_bed_file)
        .transpose()?
        .map(|intervals| IntervalSet::from_intervals(&intervals));
    let calling_regions = narrow_to_confident(
        calling_regions_from_intervals(&contigs, &includes, &excludes),
        confident.as_ref(),
    )?;

    let mut regions = config.partition.partition(&contigs, Some(&calling_regions))?;

    if config.only_regions_with_variants {
        let Some(path) = &config.variants else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Filtering regions by variants requires a variants file",
            ));
        };
        let mut source = IndexedVcf::from_path(path)?;
        let positions = fetch_variant_positions(&mut source, &calling_regions, &contigs)?;
        let before = regions.len();
        let kept: Vec<GenomicInterval> = filter_regions_by_positions(
            regions.iter().map(|r| r.interval.clone()),
            positions,
            &contigs,
        )
        .collect();
        // Filtering keeps region order, so indices can be matched in one pass.
        let mut kept = kept.into_iter().peekable();
        regions.retain(|region| {
            if kept.peek() == Some(&region.interval) {
                kept.next();
                true
            } else {
                false
            }
        });
        info!("Kept {} of {} regions containing variants", regions.len(), before);
    }

    Ok((contigs, regions))
}

/// Writes regions as BED lines with the region index as name.
pub fn write_regions_bed<W: Write>(regions: &[Region], out: &mut W) -> io::Result<()> {
    for region in regions {
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            region.interval.contig, region.interval.start, region.interval.end, region.index
        )?;
    }
    Ok(())
}
