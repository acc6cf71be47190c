use crate::contig::ContigSet;
use crate::interval::GenomicInterval;
use rustc_hash::FxHashMap;
use std::io;

// Reference bases for an interval, uppercased.
pub trait ReferenceSource {
    fn fetch_bases(&self, interval: &GenomicInterval) -> io::Result<Vec<u8>>;
}

impl<T: ReferenceSource + ?Sized> ReferenceSource for &T {
    fn fetch_bases(&self, interval: &GenomicInterval) -> io::Result<Vec<u8>> {
        (**self).fetch_bases(interval)
    }
}

/// Reference held in memory, used for small inputs and tests.
#[derive(Debug, Default, Clone)]
pub struct InMemoryReference {
    contigs: ContigSet,
    sequences: FxHashMap<String, Vec<u8>>,
}

impl InMemoryReference {
    pub fn new<I, S>(sequences: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let mut reference = Self::default();
        for (name, bases) in sequences {
            let name = name.into();
            let bases = bases.into().into_bytes().to_ascii_uppercase();
            reference.contigs.push(name.clone(), bases.len() as i64);
            reference.sequences.insert(name, bases);
        }
        reference
    }

    pub fn contigs(&self) -> &ContigSet {
        &self.contigs
    }
}

impl ReferenceSource for InMemoryReference {
    fn fetch_bases(&self, interval: &GenomicInterval) -> io::Result<Vec<u8>> {
        let bases = self.sequences.get(&interval.contig).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("Sequence '{}' not found in reference", interval.contig),
            )
        })?;
        if interval.start < 0 || interval.end as usize > bases.len() || interval.start > interval.end {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Interval {interval} is outside the reference sequence"),
            ));
        }
        Ok(bases[interval.start as usize..interval.end as usize].to_vec())
    }
}
