use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use std::io::{Read, Write};
use std::path::Path;

use crate::signal::Sample;

/// Read `value,timestamp_ms` rows. A leading header row is skipped when its
/// first field is not numeric.
pub fn read_samples<R: Read>(reader: R) -> Result<Vec<Sample>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .trim(Trim::All)
        .comment(Some(b'#'))
        .from_reader(reader);
    let mut out = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("reading row {}", idx + 1))?;
        if idx == 0 && is_header(&record) {
            continue;
        }
        out.push(parse_sample(&record, idx + 1)?);
    }
    if out.is_empty() {
        anyhow::bail!("no samples found");
    }
    Ok(out)
}

pub fn read_samples_path(path: &Path) -> Result<Vec<Sample>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    read_samples(file).with_context(|| format!("parsing {}", path.display()))
}

/// Write samples with a `value,timestamp_ms` header.
pub fn write_samples<W: Write>(writer: W, samples: &[Sample]) -> Result<()> {
    let mut writer = WriterBuilder::new().from_writer(writer);
    writer.write_record(["value", "timestamp_ms"])?;
    for sample in samples {
        writer.write_record(&[sample.value.to_string(), sample.timestamp_ms.to_string()])?;
    }
    writer.flush().context("flushing samples")?;
    Ok(())
}

pub fn write_samples_path(path: &Path, samples: &[Sample]) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    write_samples(file, samples)
}

fn is_header(record: &StringRecord) -> bool {
    record
        .get(0)
        .map_or(false, |field| field.parse::<f64>().is_err())
}

fn parse_sample(record: &StringRecord, row: usize) -> Result<Sample> {
    let value_str = record
        .get(0)
        .ok_or_else(|| anyhow::anyhow!("row {} has no value column", row))?;
    let ts_str = record
        .get(1)
        .ok_or_else(|| anyhow::anyhow!("row {} has no timestamp column", row))?;
    let value: f64 = value_str
        .parse()
        .with_context(|| format!("row {}: parsing value {}", row, value_str))?;
    let timestamp_ms = parse_timestamp(ts_str)
        .with_context(|| format!("row {}: parsing timestamp {}", row, ts_str))?;
    Ok(Sample::new(value, timestamp_ms))
}

/// Integer milliseconds; fractional values are rounded.
fn parse_timestamp(field: &str) -> Result<i64> {
    if let Ok(ms) = field.parse::<i64>() {
        return Ok(ms);
    }
    let ms: f64 = field.parse()?;
    if !ms.is_finite() {
        anyhow::bail!("timestamp is not finite");
    }
    Ok(ms.round() as i64)
}
