//! Per-region orchestration of candidate discovery and example creation.
//!
//! Collaborators (read access, realignment, candidate calling, encoding,
//! labeling and scoring) are traits so the orchestration can be driven by
//! real readers or by test fakes.

use crate::error::ValidationError;
use crate::interval::GenomicInterval;
use crate::merge::AlleleSubsetPrediction;
use crate::partition::Region;
use crate::ranges::ConfidentRegions;
use crate::sample::{PerSample, SampleId};
use crate::variant::{Variant, VariantCall};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::io;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AlignedRead {
    pub name: String,
    pub contig: String,
    /// 0-based start of the alignment on the reference.
    pub start: i64,
    pub cigar: String,
    pub sequence: Vec<u8>,
    pub qualities: Vec<u8>,
    pub mapping_quality: u8,
}

pub trait ReadSource {
    fn query(&mut self, region: &GenomicInterval) -> io::Result<Vec<AlignedRead>>;
}

pub trait Realigner {
    fn realign(&mut self, reads: Vec<AlignedRead>, region: &GenomicInterval) -> io::Result<Vec<AlignedRead>>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateOutput {
    pub candidates: Vec<Variant>,
    pub gvcf_records: Vec<Variant>,
}

pub trait CandidateCaller {
    fn call(&mut self, region: &GenomicInterval, reads: &[AlignedRead]) -> io::Result<CandidateOutput>;
}

/// Encodes one candidate into one tensor per alt allele subset.
pub trait ExampleEncoder {
    /// `reads_for_samples` holds every sample's reads, in sample order.
    /// Returns `(alt_allele_indices, encoded)` pairs.
    fn encode(
        &mut self,
        candidate: &Variant,
        reads_for_samples: &[&[AlignedRead]],
    ) -> io::Result<Vec<(Vec<usize>, Vec<u8>)>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariantLabel {
    pub is_confident: bool,
    /// Truth variant matched to the candidate.
    pub variant: Variant,
    pub genotype: Vec<i32>,
}

pub trait VariantLabeler {
    /// One label per candidate, in candidate order.
    fn label_variants(&mut self, candidates: &[Variant], region: &GenomicInterval) -> io::Result<Vec<VariantLabel>>;
}

/// Scores an example into `[p(ref/ref), p(ref/alt), p(alt/alt)]`.
pub trait GenotypeModel {
    fn predict(&self, example: &Example) -> io::Result<Vec<f64>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub variant: Variant,
    pub alt_allele_indices: Vec<usize>,
    pub encoded: Vec<u8>,
    /// Truth genotype class in training mode.
    pub label: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Calling,
    Training,
}

#[derive(Debug, Clone)]
pub struct SampleOptions {
    pub id: SampleId,
    /// Only these samples get examples; the others contribute reads.
    pub produce_examples: bool,
}

#[derive(Debug, Clone)]
pub struct ProcessorOptions {
    pub mode: Mode,
    pub realign_reads: bool,
    pub samples: Vec<SampleOptions>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RegionRuntimes {
    pub get_reads: Duration,
    pub realign: Duration,
    pub find_candidates: Duration,
    pub make_examples: Duration,
    pub label: Duration,
    pub predict: Duration,
}

impl RegionRuntimes {
    pub fn total(&self) -> Duration {
        self.get_reads + self.realign + self.find_candidates + self.make_examples + self.label + self.predict
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegionOutput {
    pub candidates: PerSample<Vec<Variant>>,
    pub examples: PerSample<Vec<Example>>,
    pub gvcf_records: PerSample<Vec<Variant>>,
    pub predictions: PerSample<Vec<AlleleSubsetPrediction>>,
    pub runtimes: RegionRuntimes,
}

/// Number of genotype alleles that are among the example's alt alleles.
pub fn label_for_alt_alleles(genotype: &[i32], alt_allele_indices: &[usize]) -> i32 {
    genotype
        .iter()
        .filter(|&&g| g > 0 && alt_allele_indices.contains(&((g - 1) as usize)))
        .count() as i32
}

/// Sets the truth variant, genotype and class label on `example`.
pub fn add_label_to_example(mut example: Example, label: &VariantLabel) -> Result<Example, ValidationError> {
    if !label.is_confident {
        return Err(ValidationError::NonConfidentLabel(label.variant.to_string()));
    }
    let mut variant = label.variant.clone();
    match variant.calls.first_mut() {
        Some(call) => call.genotype = label.genotype.clone(),
        None => variant.calls.push(VariantCall {
            genotype: label.genotype.clone(),
            ..Default::default()
        }),
    }
    example.label = Some(label_for_alt_alleles(&label.genotype, &example.alt_allele_indices));
    example.variant = variant;
    Ok(example)
}

pub struct RegionProcessor<'a> {
    options: ProcessorOptions,
    readers: Vec<Box<dyn ReadSource + 'a>>,
    callers: Vec<Box<dyn CandidateCaller + 'a>>,
    encoder: Box<dyn ExampleEncoder + 'a>,
    realigner: Option<Box<dyn Realigner + 'a>>,
    labeler: Option<Box<dyn VariantLabeler + 'a>>,
    model: Option<Box<dyn GenotypeModel + 'a>>,
    confident_regions: Option<ConfidentRegions>,
}

impl<'a> RegionProcessor<'a> {
    /// `readers` and `callers` are given in the order of `options.samples`.
    pub fn new(
        options: ProcessorOptions,
        readers: Vec<Box<dyn ReadSource + 'a>>,
        callers: Vec<Box<dyn CandidateCaller + 'a>>,
        encoder: Box<dyn ExampleEncoder + 'a>,
    ) -> Result<Self, ValidationError> {
        if readers.len() != options.samples.len() || callers.len() != options.samples.len() {
            return Err(ValidationError::IncompatibleOptions(format!(
                "{} samples need as many read sources and candidate callers, got {} and {}",
                options.samples.len(),
                readers.len(),
                callers.len()
            )));
        }
        Ok(Self {
            options,
            readers,
            callers,
            encoder,
            realigner: None,
            labeler: None,
            model: None,
            confident_regions: None,
        })
    }

    pub fn with_realigner(mut self, realigner: Box<dyn Realigner + 'a>) -> Self {
        self.realigner = Some(realigner);
        self
    }

    pub fn with_labeler(mut self, labeler: Box<dyn VariantLabeler + 'a>) -> Self {
        self.labeler = Some(labeler);
        self
    }

    pub fn with_model(mut self, model: Box<dyn GenotypeModel + 'a>) -> Self {
        self.model = Some(model);
        self
    }

    /// Restricts training examples to candidates lying entirely inside
    /// `confident_regions`.
    pub fn with_confident_regions(mut self, confident_regions: ConfidentRegions) -> Self {
        self.confident_regions = Some(confident_regions);
        self
    }

    pub fn options(&self) -> &ProcessorOptions {
        &self.options
    }

    pub fn process(&mut self, region: &Region) -> io::Result<RegionOutput> {
        let interval = &region.interval;
        let mut output = RegionOutput::default();

        // Reads for every sample, in sample order.
        let mut reads: Vec<Vec<AlignedRead>> = Vec::with_capacity(self.readers.len());
        for reader in self.readers.iter_mut() {
            let start = Instant::now();
            let sample_reads = reader.query(interval)?;
            output.runtimes.get_reads += start.elapsed();

            let sample_reads = match self.realigner.as_mut() {
                Some(realigner) if self.options.realign_reads => {
                    let start = Instant::now();
                    let realigned = realigner.realign(sample_reads, interval)?;
                    output.runtimes.realign += start.elapsed();
                    realigned
                }
                _ => sample_reads,
            };
            reads.push(sample_reads);
        }

        let start = Instant::now();
        for (i, sample) in self.options.samples.iter().enumerate() {
            let found = if reads[i].is_empty() {
                CandidateOutput::default()
            } else {
                self.callers[i].call(interval, &reads[i])?
            };
            output.candidates.insert(sample.id.clone(), found.candidates);
            output.gvcf_records.insert(sample.id.clone(), found.gvcf_records);
        }
        output.runtimes.find_candidates += start.elapsed();

        let reads_for_samples: Vec<&[AlignedRead]> = reads.iter().map(Vec::as_slice).collect();
        let example_samples: Vec<SampleId> = self
            .options
            .samples
            .iter()
            .filter(|s| s.produce_examples)
            .map(|s| s.id.clone())
            .collect();
        for sample in example_samples {
            let candidates = output.candidates.get(&sample).cloned().unwrap_or_default();
            let examples = match self.options.mode {
                Mode::Calling => {
                    let start = Instant::now();
                    let mut examples = Vec::new();
                    for candidate in &candidates {
                        examples.extend(self.create_examples(candidate, &reads_for_samples)?);
                    }
                    output.runtimes.make_examples += start.elapsed();
                    examples
                }
                Mode::Training => {
                    let Some(labeler) = self.labeler.as_mut() else {
                        return Err(ValidationError::IncompatibleOptions(
                            "training mode requires a variant labeler".to_string(),
                        )
                        .into());
                    };
                    let mut candidates = candidates;
                    if let Some(confident) = &self.confident_regions {
                        let before = candidates.len();
                        candidates.retain(|c| confident.variant_is_confident(&c.contig, c.start, c.end));
                        debug!(
                            "Region {}: {} of {} candidates in confident regions",
                            interval,
                            candidates.len(),
                            before
                        );
                    }
                    let start = Instant::now();
                    let labels = labeler.label_variants(&candidates, interval)?;
                    output.runtimes.label += start.elapsed();
                    if labels.len() != candidates.len() {
                        return Err(ValidationError::LabelCount {
                            region: interval.to_string(),
                            candidates: candidates.len(),
                            labels: labels.len(),
                        }
                        .into());
                    }

                    let start = Instant::now();
                    let mut examples = Vec::new();
                    for (candidate, label) in candidates.iter().zip(labels.iter()) {
                        if !label.is_confident {
                            continue;
                        }
                        for example in self.create_examples(candidate, &reads_for_samples)? {
                            examples.push(add_label_to_example(example, label)?);
                        }
                    }
                    output.runtimes.make_examples += start.elapsed();
                    examples
                }
            };

            if let (Mode::Calling, Some(model)) = (self.options.mode, self.model.as_ref()) {
                let start = Instant::now();
                let mut predictions = Vec::with_capacity(examples.len());
                for example in &examples {
                    predictions.push(AlleleSubsetPrediction {
                        variant: example.variant.clone(),
                        alt_allele_indices: example.alt_allele_indices.clone(),
                        probabilities: model.predict(example)?,
                    });
                }
                output.runtimes.predict += start.elapsed();
                output.predictions.insert(sample.clone(), predictions);
            }
            output.examples.insert(sample, examples);
        }

        debug!(
            "Region {}: {} reads, {} candidates, {} examples in {:?}",
            interval,
            reads.iter().map(Vec::len).sum::<usize>(),
            output.candidates.iter().map(|(_, c)| c.len()).sum::<usize>(),
            output.examples.iter().map(|(_, e)| e.len()).sum::<usize>(),
            output.runtimes.total()
        );
        Ok(output)
    }

    fn create_examples(&mut self, candidate: &Variant, reads_for_samples: &[&[AlignedRead]]) -> io::Result<Vec<Example>> {
        Ok(self
            .encoder
            .encode(candidate, reads_for_samples)?
            .into_iter()
            .map(|(alt_allele_indices, encoded)| Example {
                variant: candidate.clone(),
                alt_allele_indices,
                encoded,
                label: None,
            })
            .collect())
    }

    /// Processes `regions` in order, handing each output to `sink`.
    pub fn process_all<F>(&mut self, regions: &[Region], mut sink: F) -> io::Result<usize>
    where
        F: FnMut(&Region, RegionOutput) -> io::Result<()>,
    {
        let started = Instant::now();
        for (n, region) in regions.iter().enumerate() {
            let output = self.process(region)?;
            sink(region, output)?;
            if (n + 1) % 1000 == 0 {
                info!(
                    "Processed {} of {} regions in {:.2?}",
                    n + 1,
                    regions.len(),
                    started.elapsed()
                );
            }
        }
        info!("Processed {} regions in {:.2?}", regions.len(), started.elapsed());
        Ok(regions.len())
    }
}
