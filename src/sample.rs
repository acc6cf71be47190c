use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_SAMPLE_NAME: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SampleId(pub String);

impl SampleId {
    pub fn new(name: impl Into<String>) -> Self {
        SampleId(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Default for SampleId {
    fn default() -> Self {
        SampleId(DEFAULT_SAMPLE_NAME.to_string())
    }
}

/// Per-sample values kept in sample order.
#[derive(Debug, Clone, PartialEq)]
pub struct PerSample<T> {
    entries: Vec<(SampleId, T)>,
}

impl<T> Default for PerSample<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> PerSample<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the value for `sample`. New samples go last.
    pub fn insert(&mut self, sample: SampleId, value: T) {
        match self.entries.iter_mut().find(|(id, _)| *id == sample) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((sample, value)),
        }
    }

    pub fn get(&self, sample: &SampleId) -> Option<&T> {
        self.entries
            .iter()
            .find(|(id, _)| id == sample)
            .map(|(_, value)| value)
    }

    pub fn get_mut(&mut self, sample: &SampleId) -> Option<&mut T> {
        self.entries
            .iter_mut()
            .find(|(id, _)| id == sample)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SampleId, &T)> {
        self.entries.iter().map(|(id, value)| (id, value))
    }

    pub fn samples(&self) -> impl Iterator<Item = &SampleId> {
        self.entries.iter().map(|(id, _)| id)
    }
}

impl<T> FromIterator<(SampleId, T)> for PerSample<T> {
    fn from_iter<I: IntoIterator<Item = (SampleId, T)>>(iter: I) -> Self {
        let mut out = PerSample::new();
        for (id, value) in iter {
            out.insert(id, value);
        }
        out
    }
}
