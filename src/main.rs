use clap::Parser;
use log::info;
use rayon::ThreadPoolBuilder;
use shardcall::calling::CallOptions;
use shardcall::commands::partition::{regions_to_process, write_regions_bed, RegionsConfig};
use shardcall::commands::postprocess::{run_postprocess, PostprocessRunConfig};
use shardcall::merge::{DebugCandidates, MergeOptions};
use shardcall::partition::PartitionConfig;
use shardcall::postprocess::{ErrorPolicy, PostprocessConfig};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Common options shared between all commands
#[derive(Parser, Debug)]
struct CommonOpts {
    /// Number of threads for parallel processing.
    #[clap(short = 't', long, value_parser, default_value_t = NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN))]
    num_threads: NonZeroUsize,

    /// Verbosity level (0 = error, 1 = info, 2 = debug)
    #[clap(short, long, default_value = "0")]
    verbose: u8,
}

/// Sharded variant calling region planning and prediction postprocessing.
#[derive(Parser, Debug)]
#[command(author, version, about, disable_help_subcommand = true)]
enum Args {
    /// Compute the regions processed by one shard and write them as BED
    Partition {
        #[clap(flatten)]
        common: CommonOpts,

        /// Indexed reference FASTA
        #[clap(short = 'r', long = "ref", value_parser)]
        ref_path: String,

        /// Indexed BAM/CRAM files whose contigs must agree with the reference
        #[clap(long, value_parser)]
        reads: Vec<String>,

        /// Indexed VCF/BCF whose contigs must agree with the reference
        #[clap(long, value_parser)]
        variants: Option<String>,

        /// Keep only regions containing at least one record of --variants
        #[clap(long, action)]
        only_regions_with_variants: bool,

        /// Regions to process: chr, chr:start-end or a BED file. Repeatable
        #[clap(long, value_parser)]
        regions: Vec<String>,

        /// Regions to skip, same formats as --regions. Repeatable
        #[clap(long, value_parser)]
        exclude_regions: Vec<String>,

        /// BED file of confident regions. Processing is restricted to them
        #[clap(long, value_parser)]
        confident_regions: Option<String>,

        /// Contigs to drop before reconciling inputs
        #[clap(long, value_parser, value_delimiter = ',')]
        exclude_contigs: Vec<String>,

        /// Minimum fraction of reference bases on contigs shared by all inputs
        #[clap(long, value_parser, default_value_t = 0.9)]
        min_shared_contigs_fraction: f64,

        /// Maximum size of a region in bases
        #[clap(short = 'w', long, value_parser, default_value_t = 1000)]
        max_partition_size: i64,

        /// Index of this shard
        #[clap(long, value_parser)]
        task_id: Option<i64>,

        /// Total number of shards (0 means unsharded)
        #[clap(long, value_parser)]
        num_shards: Option<i64>,

        /// Output BED file (stdout if not given)
        #[clap(short = 'o', long, value_parser)]
        output: Option<PathBuf>,
    },
    /// Merge per-subset predictions into calls and write VCF and gVCF
    Postprocess {
        #[clap(flatten)]
        common: CommonOpts,

        /// Indexed reference FASTA
        #[clap(short = 'r', long = "ref", value_parser)]
        ref_path: String,

        /// Prediction record file
        #[clap(short = 'i', long, value_parser)]
        infile: PathBuf,

        /// Output VCF (.gz or .bgz for BGZF)
        #[clap(short = 'o', long, value_parser)]
        outfile: PathBuf,

        /// Record file of non-variant reference blocks
        #[clap(long, value_parser, requires = "gvcf_outfile")]
        nonvariant_site_records: Option<PathBuf>,

        /// Output gVCF (.gz or .bgz for BGZF)
        #[clap(long, value_parser, requires = "nonvariant_site_records")]
        gvcf_outfile: Option<PathBuf>,

        /// Minimum QUAL of a variant to be marked PASS
        #[clap(long, value_parser, default_value_t = 1.0)]
        qual_filter: f64,

        /// Alt alleles with a lower single-allele QUAL are removed from multi-allelic sites
        #[clap(long, value_parser, default_value_t = 1.0)]
        multi_allelic_qual_filter: f64,

        /// Hom-ref calls with a lower GQ are written as no-calls
        #[clap(long, value_parser, default_value_t = 20.0)]
        cnn_homref_call_min_gq: f64,

        /// Only write PASS variants to the VCF
        #[clap(long, action)]
        only_keep_pass: bool,

        /// Sample name used when predictions and non-variant records are empty
        #[clap(long, value_parser)]
        sample_name: Option<String>,

        /// Keep every candidate allele, either as ALT alleles or in INFO
        #[clap(long, value_enum)]
        debug_output_all_candidates: Option<DebugCandidates>,

        /// Write one record per prediction instead of merging sites
        #[clap(long, action)]
        no_group_variants: bool,

        /// How sites that cannot be merged are handled
        #[clap(long, value_enum, default_value_t = ErrorPolicy::Strict)]
        error_policy: ErrorPolicy,
    },
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    match args {
        Args::Partition {
            common,
            ref_path,
            reads,
            variants,
            only_regions_with_variants,
            regions,
            exclude_regions,
            confident_regions,
            exclude_contigs,
            min_shared_contigs_fraction,
            max_partition_size,
            task_id,
            num_shards,
            output,
        } => {
            initialize(&common)?;

            let config = RegionsConfig {
                ref_path,
                reads,
                variants,
                only_regions_with_variants,
                regions,
                exclude_regions,
                confident_regions,
                exclude_contigs,
                min_shared_contigs_fraction,
                partition: PartitionConfig {
                    max_partition_size,
                    task_id,
                    num_shards,
                },
            };
            let (_, regions) = regions_to_process(&config)?;

            match output {
                Some(path) => {
                    let mut out = BufWriter::new(File::create(&path)?);
                    write_regions_bed(&regions, &mut out)?;
                    out.flush()?;
                    info!("Wrote {} regions to {}", regions.len(), path.display());
                }
                None => {
                    let stdout = io::stdout();
                    let mut out = BufWriter::new(stdout.lock());
                    write_regions_bed(&regions, &mut out)?;
                    out.flush()?;
                }
            }
        }
        Args::Postprocess {
            common,
            ref_path,
            infile,
            outfile,
            nonvariant_site_records,
            gvcf_outfile,
            qual_filter,
            multi_allelic_qual_filter,
            cnn_homref_call_min_gq,
            only_keep_pass,
            sample_name,
            debug_output_all_candidates,
            no_group_variants,
            error_policy,
        } => {
            initialize(&common)?;

            let config = PostprocessRunConfig {
                ref_path,
                infile,
                outfile,
                nonvariant_site_records,
                gvcf_outfile,
                postprocess: PostprocessConfig {
                    merge: MergeOptions {
                        qual_filter: multi_allelic_qual_filter,
                        debug_output_all_candidates,
                    },
                    call: CallOptions {
                        qual_filter,
                        cnn_homref_call_min_gq,
                    },
                    group_variants: !no_group_variants,
                    error_policy,
                    only_keep_pass,
                    sample_name,
                },
            };
            run_postprocess(&config)?;
        }
    }

    Ok(())
}

/// Initialize logger and thread pool based on common options
fn initialize(common: &CommonOpts) -> io::Result<()> {
    env_logger::Builder::new()
        .filter_level(match common.verbose {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();

    ThreadPoolBuilder::new()
        .num_threads(common.num_threads.into())
        .build_global()
        .map_err(io::Error::other)
}
