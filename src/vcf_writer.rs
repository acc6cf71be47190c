use crate::bgzf_io::OutputHandle;
use crate::contig::ContigSet;
use crate::merge::CANDIDATES_INFO_KEY;
use crate::variant::{
    Variant, VariantCall, FILTER_LOW_QUAL, FILTER_NO_CALL, FILTER_PASS, FILTER_REF_CALL,
};
use std::fmt::Write as _;
use std::io::{self, Write};
use std::path::Path;

/// Destination for finished records, VCF or gVCF.
pub trait RecordSink {
    fn write(&mut self, variant: &Variant) -> io::Result<()>;
}

impl RecordSink for Vec<Variant> {
    fn write(&mut self, variant: &Variant) -> io::Result<()> {
        self.push(variant.clone());
        Ok(())
    }
}

impl<S: RecordSink + ?Sized> RecordSink for &mut S {
    fn write(&mut self, variant: &Variant) -> io::Result<()> {
        (**self).write(variant)
    }
}

/// Text VCF writer for a single sample.
pub struct VcfWriter<W: Write = OutputHandle> {
    writer: W,
    records: usize,
}

impl VcfWriter<OutputHandle> {
    /// Creates `path` (BGZF when it ends in `.gz`/`.bgz`) and writes the header.
    pub fn create(path: &Path, contigs: &ContigSet, sample: &str) -> io::Result<Self> {
        Self::new(OutputHandle::create(path)?, contigs, sample)
    }

    pub fn finish(mut self) -> io::Result<usize> {
        self.writer.flush()?;
        self.writer.finish()?;
        Ok(self.records)
    }
}

impl<W: Write> VcfWriter<W> {
    pub fn new(mut writer: W, contigs: &ContigSet, sample: &str) -> io::Result<Self> {
        write_header(&mut writer, contigs, sample)?;
        Ok(Self { writer, records: 0 })
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn into_inner(mut self) -> io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> RecordSink for VcfWriter<W> {
    fn write(&mut self, variant: &Variant) -> io::Result<()> {
        writeln!(self.writer, "{}", format_record(variant))?;
        self.records += 1;
        Ok(())
    }
}

fn write_header<W: Write>(writer: &mut W, contigs: &ContigSet, sample: &str) -> io::Result<()> {
    writeln!(writer, "##fileformat=VCFv4.2")?;
    for (id, description) in [
        (FILTER_PASS, "All filters passed"),
        (FILTER_REF_CALL, "Genotyping model thinks this site is reference."),
        (FILTER_LOW_QUAL, "Confidence in this variant being real is below calling threshold."),
        (FILTER_NO_CALL, "Site has depth=0 resulting in no call."),
    ] {
        writeln!(writer, "##FILTER=<ID={id},Description=\"{description}\">")?;
    }
    writeln!(
        writer,
        "##INFO=<ID=END,Number=1,Type=Integer,Description=\"End position (for use with symbolic alleles)\">"
    )?;
    writeln!(
        writer,
        "##INFO=<ID={CANDIDATES_INFO_KEY},Number=1,Type=String,Description=\"pipe-delimited candidate alleles.\">"
    )?;
    for (id, number, kind, description) in [
        ("GT", "1", "String", "Genotype"),
        ("GQ", "1", "Integer", "Conditional genotype quality"),
        ("DP", "1", "Integer", "Read depth"),
        ("MIN_DP", "1", "Integer", "Minimum DP observed within the GVCF block."),
        ("AD", "R", "Integer", "Read depth for each allele"),
        ("VAF", "A", "Float", "Variant allele fractions."),
        ("PL", "G", "Integer", "Phred-scaled genotype likelihoods rounded to the closest integer"),
    ] {
        writeln!(
            writer,
            "##FORMAT=<ID={id},Number={number},Type={kind},Description=\"{description}\">"
        )?;
    }
    for contig in contigs {
        writeln!(writer, "##contig=<ID={},length={}>", contig.name, contig.length)?;
    }
    writeln!(
        writer,
        "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\t{sample}"
    )
}

/// Normalized Phred likelihoods from log10 likelihoods; the best genotype is 0.
pub fn genotype_likelihoods_to_pl(genotype_likelihoods: &[f64]) -> Vec<i32> {
    let raw: Vec<i32> = genotype_likelihoods
        .iter()
        .map(|&gl| (-10.0 * gl).round() as i32)
        .collect();
    let min = raw.iter().copied().min().unwrap_or(0);
    raw.into_iter().map(|pl| pl - min).collect()
}

fn join_or_dot<T: ToString>(values: &[T], sep: &str) -> String {
    if values.is_empty() {
        ".".to_string()
    } else {
        values.iter().map(ToString::to_string).collect::<Vec<_>>().join(sep)
    }
}

fn format_genotype(genotype: &[i32]) -> String {
    if genotype.is_empty() {
        return ".".to_string();
    }
    genotype
        .iter()
        .map(|&g| if g < 0 { ".".to_string() } else { g.to_string() })
        .collect::<Vec<_>>()
        .join("/")
}

fn format_call(call: &VariantCall) -> (String, String) {
    let mut keys = vec!["GT"];
    let mut values = vec![format_genotype(&call.genotype)];
    if let Some(gq) = call.gq {
        keys.push("GQ");
        values.push(gq.to_string());
    }
    if let Some(dp) = call.dp {
        keys.push("DP");
        values.push(dp.to_string());
    }
    if let Some(min_dp) = call.min_dp {
        keys.push("MIN_DP");
        values.push(min_dp.to_string());
    }
    if let Some(ad) = &call.ad {
        keys.push("AD");
        values.push(join_or_dot(ad, ","));
    }
    if let Some(vaf) = &call.vaf {
        keys.push("VAF");
        values.push(join_or_dot(vaf, ","));
    }
    if !call.genotype_likelihoods.is_empty() {
        keys.push("PL");
        values.push(join_or_dot(&genotype_likelihoods_to_pl(&call.genotype_likelihoods), ","));
    }
    (keys.join(":"), values.join(":"))
}

/// One tab-separated VCF data line, without the newline.
pub fn format_record(variant: &Variant) -> String {
    let mut info = String::new();
    // Reference blocks carry their span in END.
    if variant.end != variant.start + variant.reference_bases.len() as i64
        && !variant.info.contains_key("END")
    {
        let _ = write!(info, "END={}", variant.end);
    }
    for (key, value) in &variant.info {
        if !info.is_empty() {
            info.push(';');
        }
        let _ = write!(info, "{key}={value}");
    }
    if info.is_empty() {
        info.push('.');
    }

    let mut line = format!(
        "{}\t{}\t.\t{}\t{}\t{}\t{}\t{}",
        variant.contig,
        variant.start + 1,
        variant.reference_bases,
        join_or_dot(&variant.alternate_bases, ","),
        variant.quality,
        join_or_dot(&variant.filters, ";"),
        info
    );
    if let Some(call) = variant.calls.first() {
        let (keys, values) = format_call(call);
        let _ = write!(line, "\t{keys}\t{values}");
    }
    line
}
