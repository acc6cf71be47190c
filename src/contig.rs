use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// A named reference sequence. `order_index` is the position the contig had
/// when the reference was loaded and defines the canonical sort order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contig {
    pub name: String,
    pub length: i64,
    pub order_index: usize,
}

impl Contig {
    pub fn new(name: impl Into<String>, length: i64, order_index: usize) -> Self {
        Self {
            name: name.into(),
            length,
            order_index,
        }
    }
}

/// Ordered, immutable-after-load collection of contigs with name lookup.
#[derive(Debug, Clone, Default)]
pub struct ContigSet {
    contigs: Vec<Contig>,
    name_to_pos: FxHashMap<String, usize>,
}

impl PartialEq for ContigSet {
    fn eq(&self, other: &Self) -> bool {
        self.contigs == other.contigs
    }
}

impl ContigSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from `(name, length)` pairs, assigning `order_index` by position.
    pub fn from_name_lengths<I, S>(specs: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for (name, length) in specs {
            set.push(name, length);
        }
        set
    }

    /// Builds a set from existing contig records, keeping their `order_index`.
    pub fn from_contigs(mut contigs: Vec<Contig>) -> Self {
        contigs.sort_by_key(|c| c.order_index);
        let mut set = Self::new();
        for contig in contigs {
            if set.name_to_pos.contains_key(&contig.name) {
                continue;
            }
            set.name_to_pos.insert(contig.name.clone(), set.contigs.len());
            set.contigs.push(contig);
        }
        set
    }

    /// Appends a contig and returns its order index. A name that is already
    /// present keeps its original record.
    pub fn push(&mut self, name: impl Into<String>, length: i64) -> usize {
        let name = name.into();
        if let Some(&pos) = self.name_to_pos.get(&name) {
            return self.contigs[pos].order_index;
        }
        let order_index = self
            .contigs
            .last()
            .map_or(0, |last| last.order_index + 1);
        self.name_to_pos.insert(name.clone(), self.contigs.len());
        self.contigs.push(Contig::new(name, length, order_index));
        order_index
    }

    pub fn get(&self, name: &str) -> Option<&Contig> {
        self.name_to_pos.get(name).map(|&pos| &self.contigs[pos])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.name_to_pos.contains_key(name)
    }

    /// Canonical order index of a contig, or `None` when it is unknown.
    pub fn order_of(&self, name: &str) -> Option<usize> {
        self.get(name).map(|c| c.order_index)
    }

    pub fn len(&self) -> usize {
        self.contigs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contigs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Contig> {
        self.contigs.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.contigs.iter().map(|c| c.name.as_str())
    }

    /// Sum of all contig lengths.
    pub fn total_span(&self) -> i64 {
        self.contigs.iter().map(|c| c.length).sum()
    }

    pub fn into_vec(self) -> Vec<Contig> {
        self.contigs
    }
}

impl<'a> IntoIterator for &'a ContigSet {
    type Item = &'a Contig;
    type IntoIter = std::slice::Iter<'a, Contig>;

    fn into_iter(self) -> Self::IntoIter {
        self.contigs.iter()
    }
}
