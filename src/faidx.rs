use crate::contig::ContigSet;
use crate::interval::GenomicInterval;
use crate::reference::ReferenceSource;
use rust_htslib::faidx;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io;

// Per-thread cache of open FASTA handles, keyed by path
struct FaidxCache {
    capacity: usize,
    readers: HashMap<String, faidx::Reader>,
}

impl FaidxCache {
    fn new(capacity: usize) -> Self {
        FaidxCache {
            capacity,
            readers: HashMap::with_capacity(capacity),
        }
    }

    fn get_or_open(&mut self, path: &str) -> io::Result<&mut faidx::Reader> {
        if !self.readers.contains_key(path) {
            if self.readers.len() >= self.capacity {
                if let Some(key_to_remove) = self.readers.keys().next().cloned() {
                    self.readers.remove(&key_to_remove);
                }
            }
            let reader = faidx::Reader::from_path(path).map_err(|e| {
                io::Error::other(format!("Failed to open FASTA file '{path}': {e}"))
            })?;
            self.readers.insert(path.to_string(), reader);
        }
        self.readers
            .get_mut(path)
            .ok_or_else(|| io::Error::other(format!("FASTA reader for '{path}' was evicted")))
    }
}

thread_local! {
    static FAIDX_CACHE: RefCell<FaidxCache> = RefCell::new(FaidxCache::new(4));
}

/// Indexed reference FASTA. Contig order is the line order of the `.fai`
/// file, which defines the canonical genome order.
#[derive(Debug)]
pub struct FastaIndex {
    pub fasta_path: String,
    contigs: ContigSet,
}

impl FastaIndex {
    pub fn from_path(fasta_path: &str) -> io::Result<Self> {
        let fai_path = format!("{fasta_path}.fai");

        // Build the index with htslib when it is missing
        let fai_content = match std::fs::read_to_string(&fai_path) {
            Ok(content) => content,
            Err(_) => match faidx::Reader::from_path(fasta_path) {
                Ok(_) => std::fs::read_to_string(&fai_path)?,
                Err(e) => {
                    return Err(io::Error::other(format!(
                        "Failed to create FASTA index for '{fasta_path}': {e}"
                    )));
                }
            },
        };

        Ok(FastaIndex {
            fasta_path: fasta_path.to_string(),
            contigs: parse_fai(&fai_content)?,
        })
    }

    pub fn contigs(&self) -> &ContigSet {
        &self.contigs
    }

    pub fn fetch_sequence(&self, seq_name: &str, start: i64, end: i64) -> io::Result<Vec<u8>> {
        if !self.contigs.contains(seq_name) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Sequence '{seq_name}' not found in '{}'", self.fasta_path),
            ));
        }
        if start < 0 || start >= end {
            return Ok(Vec::new());
        }

        FAIDX_CACHE.with(|cache_cell| -> io::Result<Vec<u8>> {
            let mut cache = cache_cell.borrow_mut();
            let reader = cache.get_or_open(&self.fasta_path)?;

            // fetch_seq takes a 0-based inclusive end
            match reader.fetch_seq(seq_name, start as usize, (end - 1) as usize) {
                Ok(seq) => {
                    let mut seq_vec = seq.to_vec();
                    // htslib allocates the buffer, see rust-htslib#401
                    unsafe { libc::free(seq.as_ptr() as *mut std::ffi::c_void) };
                    seq_vec.make_ascii_uppercase();
                    Ok(seq_vec)
                }
                Err(e) => Err(io::Error::other(format!(
                    "Failed to fetch sequence for {seq_name}:{start}-{end}: {e}"
                ))),
            }
        })
    }
}

impl ReferenceSource for FastaIndex {
    fn fetch_bases(&self, interval: &GenomicInterval) -> io::Result<Vec<u8>> {
        self.fetch_sequence(&interval.contig, interval.start, interval.end)
    }
}

/// Parses the name and length columns of a `.fai` file.
pub fn parse_fai(content: &str) -> io::Result<ContigSet> {
    let mut contigs = ContigSet::new();
    for line in content.lines() {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 2 || fields[0].is_empty() {
            continue;
        }
        let length = fields[1].parse::<i64>().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid sequence length in .fai line: {line}"),
            )
        })?;
        contigs.push(fields[0], length);
    }
    Ok(contigs)
}
