//! Genomic intervals and region literal parsing.
//!
//! Intervals are 0-based and half-open. Region literals follow the samtools
//! convention of 1-based inclusive coordinates, so `chr20:1-10` covers the
//! first ten bases, `[0, 10)`.

use crate::contig::ContigSet;
use crate::error::ValidationError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::{max, min, Ordering};
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenomicInterval {
    pub contig: String,
    pub start: i64,
    pub end: i64,
}

impl GenomicInterval {
    pub fn new(contig: impl Into<String>, start: i64, end: i64) -> Self {
        Self {
            contig: contig.into(),
            start,
            end,
        }
    }

    /// Creates an interval, rejecting negative starts and empty spans.
    pub fn try_new(contig: impl Into<String>, start: i64, end: i64) -> Result<Self, ValidationError> {
        let contig = contig.into();
        if start < 0 || start >= end {
            return Err(ValidationError::InvalidInterval { contig, start, end });
        }
        Ok(Self { contig, start, end })
    }

    pub fn len(&self) -> i64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn overlaps(&self, other: &GenomicInterval) -> bool {
        self.contig == other.contig && self.start < other.end && other.start < self.end
    }

    pub fn contains_position(&self, contig: &str, pos: i64) -> bool {
        self.contig == contig && self.start <= pos && pos < self.end
    }

    /// Overlapping part of two intervals on the same contig.
    pub fn intersection(&self, other: &GenomicInterval) -> Option<GenomicInterval> {
        if !self.overlaps(other) {
            return None;
        }
        Some(GenomicInterval::new(
            self.contig.clone(),
            max(self.start, other.start),
            min(self.end, other.end),
        ))
    }

    /// Checks the interval against its contig's bounds.
    pub fn validate(&self, contigs: &ContigSet) -> Result<(), ValidationError> {
        let contig = contigs
            .get(&self.contig)
            .ok_or_else(|| ValidationError::UnknownContig(self.contig.clone()))?;
        if self.start < 0 || self.start >= self.end || self.end > contig.length {
            return Err(ValidationError::IntervalOutOfBounds {
                contig: self.contig.clone(),
                start: self.start,
                end: self.end,
                length: contig.length,
            });
        }
        Ok(())
    }

    /// Sort key in canonical genome order, or `None` for an unknown contig.
    pub fn sort_key(&self, contigs: &ContigSet) -> Option<(usize, i64, i64)> {
        contigs
            .order_of(&self.contig)
            .map(|order| (order, self.start, self.end))
    }
}

impl fmt::Display for GenomicInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.contig, self.start + 1, self.end)
    }
}

/// Compares two intervals by contig order, then start, then end.
/// Unknown contigs sort after every known one.
pub fn compare_in_genome_order(
    a: &GenomicInterval,
    b: &GenomicInterval,
    contigs: &ContigSet,
) -> Ordering {
    let key = |i: &GenomicInterval| {
        (
            contigs.order_of(&i.contig).unwrap_or(usize::MAX),
            i.start,
            i.end,
        )
    };
    key(a).cmp(&key(b))
}

fn range_literal_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<contig>\S+):(?P<start>[0-9,]+)-(?P<end>[0-9,]+)$")
            .expect("static regex is valid")
    })
}

fn position_literal_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<contig>\S+):(?P<pos>[0-9,]+)$").expect("static regex is valid")
    })
}

fn parse_coordinate(text: &str, literal: &str) -> Result<i64, ValidationError> {
    text.replace(',', "")
        .parse::<i64>()
        .map_err(|_| ValidationError::InvalidLiteral(literal.to_string()))
}

/// Parses `contig:start-end`, `contig:pos` or a bare contig name.
///
/// A bare name needs `contigs` to resolve its length.
pub fn parse_literal(
    literal: &str,
    contigs: Option<&ContigSet>,
) -> Result<GenomicInterval, ValidationError> {
    let literal = literal.trim();
    if let Some(caps) = range_literal_regex().captures(literal) {
        let start = parse_coordinate(&caps["start"], literal)?;
        let end = parse_coordinate(&caps["end"], literal)?;
        if start < 1 || end < start {
            return Err(ValidationError::InvalidLiteral(literal.to_string()));
        }
        return Ok(GenomicInterval::new(&caps["contig"], start - 1, end));
    }
    if let Some(caps) = position_literal_regex().captures(literal) {
        let pos = parse_coordinate(&caps["pos"], literal)?;
        if pos < 1 {
            return Err(ValidationError::InvalidLiteral(literal.to_string()));
        }
        return Ok(GenomicInterval::new(&caps["contig"], pos - 1, pos));
    }
    match contigs.and_then(|c| c.get(literal)) {
        Some(contig) => Ok(GenomicInterval::new(contig.name.clone(), 0, contig.length)),
        None => Err(ValidationError::InvalidLiteral(literal.to_string())),
    }
}

pub fn parse_literals<I, S>(
    literals: I,
    contigs: Option<&ContigSet>,
) -> Result<Vec<GenomicInterval>, ValidationError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    literals
        .into_iter()
        .map(|l| parse_literal(l.as_ref(), contigs))
        .collect()
}

/// Reads the first three columns of a BED file. Header, track and comment
/// lines are skipped.
pub fn parse_bed_file(bed_file: &str) -> io::Result<Vec<GenomicInterval>> {
    let file = File::open(bed_file)?;
    let reader = BufReader::new(file);
    let mut intervals = Vec::new();

    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty()
            || trimmed.starts_with('#')
            || trimmed.starts_with("track")
            || trimmed.starts_with("browser")
        {
            continue;
        }
        let parts: Vec<&str> = trimmed.split('\t').collect();
        if parts.len() < 3 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Invalid BED line in '{bed_file}': {trimmed}"),
            ));
        }
        let start = parts[1]
            .parse::<i64>()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "Invalid start value"))?;
        let end = parts[2]
            .parse::<i64>()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "Invalid end value"))?;
        intervals.push(GenomicInterval::try_new(parts[0], start, end)?);
    }

    Ok(intervals)
}

/// Resolves one region argument: a BED file path when it ends in `.bed`,
/// otherwise a whitespace-separated list of literals.
pub fn parse_region_arg(arg: &str, contigs: &ContigSet) -> io::Result<Vec<GenomicInterval>> {
    if arg.ends_with(".bed") || arg.ends_with(".BED") {
        return parse_bed_file(arg);
    }
    Ok(parse_literals(arg.split_whitespace(), Some(contigs))?)
}
