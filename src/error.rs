use std::io;
use thiserror::Error;

/// Precondition failures raised by partitioning, contig reconciliation and
/// prediction merging. These abort the current operation; callers decide
/// whether that aborts the run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid shard arguments (task_id={task_id:?}, num_shards={num_shards:?}): {reason}")]
    ShardArguments {
        task_id: Option<i64>,
        num_shards: Option<i64>,
        reason: &'static str,
    },

    #[error("Partition size must be greater than 0, got {0}")]
    PartitionSize(i64),

    #[error(
        "Reference contigs span {reference_span} bases but only {covered_span} bases \
         ({percent:.2}%) were found in common among our input files. Check that the \
         sources were created on a reference genome that matches the one provided \
         ({min_fraction} fraction required)."
    )]
    InsufficientContigCoverage {
        reference_span: i64,
        covered_span: i64,
        percent: f64,
        min_fraction: f64,
    },

    #[error("Unknown contig '{0}'")]
    UnknownContig(String),

    #[error("Interval {contig}:{start}-{end} is outside contig bounds [0, {length})")]
    IntervalOutOfBounds {
        contig: String,
        start: i64,
        end: i64,
        length: i64,
    },

    #[error("Invalid interval {contig}:{start}-{end}: start must be >= 0 and less than end")]
    InvalidInterval { contig: String, start: i64, end: i64 },

    #[error("Position {position} on {contig} does not fit the interval index")]
    CoordinateOverflow { contig: String, position: i64 },

    #[error("Cannot parse region literal '{0}'")]
    InvalidLiteral(String),

    #[error("The regions to call is empty. Check your regions and exclude regions against the reference contigs")]
    EmptyRegions,

    #[error("Expected 1 or more predictions to merge")]
    EmptyPredictions,

    #[error("Expected all predictions for site {first} to share one variant, but found {other}")]
    MismatchedVariants { first: String, other: String },

    #[error("Alt allele indices {found:?} for site {site} do not match the expected {expected:?}")]
    InvalidAlleleSubsets {
        site: String,
        found: Vec<Vec<usize>>,
        expected: Vec<Vec<usize>>,
    },

    #[error("Prediction for {site} (alt indices {alt_allele_indices:?}) has {found} probabilities, expected 3")]
    InvalidProbabilities {
        site: String,
        alt_allele_indices: Vec<usize>,
        found: usize,
    },

    #[error("Labeler returned {labels} labels for {candidates} candidates in {region}")]
    LabelCount {
        region: String,
        candidates: usize,
        labels: usize,
    },

    #[error("Cannot add a non-confident label to an example for {0}")]
    NonConfidentLabel(String),

    #[error("Expected exactly one call for {site}, found {count}")]
    CallCount { site: String, count: usize },

    #[error("Unsupported genotype space: {0}")]
    UnsupportedGenotype(String),

    #[error("Incompatible options: {0}")]
    IncompatibleOptions(String),
}

impl From<ValidationError> for io::Error {
    fn from(err: ValidationError) -> Self {
        io::Error::new(io::ErrorKind::InvalidInput, err)
    }
}
