//! Restricting regions to those that contain known variant positions.

use crate::contig::ContigSet;
use crate::interval::GenomicInterval;
use crate::ranges::IntervalSet;
use log::debug;
use std::io;
use std::iter::Peekable;

/// Source of variant positions, such as an indexed truth VCF.
pub trait VariantSource {
    /// Variant spans overlapping `interval`, sorted by start.
    fn query(&mut self, interval: &GenomicInterval) -> io::Result<Vec<GenomicInterval>>;
}

/// Sorted, de-duplicated positions of all variants in the calling regions.
pub fn fetch_variant_positions<V: VariantSource + ?Sized>(
    source: &mut V,
    calling_regions: &IntervalSet,
    contigs: &ContigSet,
) -> io::Result<Vec<GenomicInterval>> {
    let mut positions = Vec::new();
    for interval in calling_regions.iter_sorted(contigs) {
        positions.extend(source.query(&interval)?);
    }
    positions.retain(|p| contigs.contains(&p.contig));
    positions.sort_by_key(|p| p.sort_key(contigs));
    positions.dedup();
    debug!(
        "Fetched {} variant positions in {} calling regions",
        positions.len(),
        calling_regions.len()
    );
    Ok(positions)
}

/// Lazily yields the regions that contain the start of at least one
/// position. Both inputs must be sorted in genome order.
pub struct RegionsWithPositions<'a, R, P>
where
    R: Iterator<Item = GenomicInterval>,
    P: Iterator<Item = GenomicInterval>,
{
    regions: R,
    positions: Peekable<P>,
    contigs: &'a ContigSet,
}

pub fn filter_regions_by_positions<'a, R, P>(
    regions: R,
    positions: P,
    contigs: &'a ContigSet,
) -> RegionsWithPositions<'a, R::IntoIter, P::IntoIter>
where
    R: IntoIterator<Item = GenomicInterval>,
    P: IntoIterator<Item = GenomicInterval>,
{
    RegionsWithPositions {
        regions: regions.into_iter(),
        positions: positions.into_iter().peekable(),
        contigs,
    }
}

impl<R, P> Iterator for RegionsWithPositions<'_, R, P>
where
    R: Iterator<Item = GenomicInterval>,
    P: Iterator<Item = GenomicInterval>,
{
    type Item = GenomicInterval;

    fn next(&mut self) -> Option<GenomicInterval> {
        for region in self.regions.by_ref() {
            let Some(region_order) = self.contigs.order_of(&region.contig) else {
                continue;
            };

            // Skip positions that start before this region
            while let Some(pos) = self.positions.peek() {
                match self.contigs.order_of(&pos.contig) {
                    Some(order) if (order, pos.start) >= (region_order, region.start) => break,
                    _ => {
                        self.positions.next();
                    }
                }
            }

            if let Some(pos) = self.positions.peek() {
                if pos.contig == region.contig && pos.start < region.end {
                    return Some(region);
                }
            } else {
                // Positions exhausted, nothing further can match
                return None;
            }
        }
        None
    }
}
