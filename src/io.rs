//! Safetensors and JSON I/O for the back-fitting pipeline.
//!
//! Recording file (`*.safetensors`):
//!
//! | key          | shape    | dtype           | required |
//! |--------------|----------|-----------------|----------|
//! | `data`       | `[D, T]` | F32 / F64       | yes      |
//! | `gfp`        | `[T]`    | F32 / F64       | no (computed) |
//! | `sfreq`      | `[1]`    | F32 / F64       | no (`0` = unknown) |
//! | `epochs`     | `[E, 2]` | I32 / I64       | no (whole file) |
//! | `epoch_maps` | `[E, K]` | U8 / I32 (0/1)  | no (all templates) |
//! | `bad`        | `[B, 2]` | I32 / I64       | no |
//!
//! Template file: `templates` `[K, D]`.  Both files may carry
//! `{"atom": "scalar" | "vector"}` in `__metadata__` (default scalar).
//! Interval bounds are inclusive.
use anyhow::{bail, ensure, Context, Result};
use ndarray::{Array, Array1, Array2, Dimension};
use serde_json::{json, Map, Value};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::label::Assignment;
use crate::markov::MarkovCounts;
use crate::pipeline::{FittedFile, SubjectFit};
use crate::recording::{AtomType, Epoch, Interval, Recording, TemplateSet};
use crate::stats::{FileStatistics, LabelStats, TimeUnit};

// ── Low-level safetensors parser ──────────────────────────────────────────────

fn le<const N: usize>(b: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(b);
    out
}

fn parse_header(bytes: &[u8]) -> Result<(Map<String, Value>, usize)> {
    ensure!(bytes.len() >= 8, "safetensors file too small");
    let n = u64::from_le_bytes(le(&bytes[..8])) as usize;
    let end = 8usize
        .checked_add(n)
        .filter(|&e| e <= bytes.len())
        .context("safetensors header length exceeds file size")?;
    let header = serde_json::from_slice(&bytes[8..end])
        .context("failed to parse safetensors header")?;
    Ok((header, end))
}

fn decode(raw: &[u8], dtype: &str) -> Result<Vec<f64>> {
    Ok(match dtype {
        "F32" => raw.chunks_exact(4).map(|b| f32::from_le_bytes(le(b)) as f64).collect(),
        "F64" => raw.chunks_exact(8).map(|b| f64::from_le_bytes(le(b))).collect(),
        "I32" => raw.chunks_exact(4).map(|b| i32::from_le_bytes(le(b)) as f64).collect(),
        "I64" => raw.chunks_exact(8).map(|b| i64::from_le_bytes(le(b)) as f64).collect(),
        "U8" | "BOOL" => raw.iter().map(|&b| b as f64).collect(),
        other => bail!("unsupported dtype {other}"),
    })
}

/// One decoded tensor, widened to f64.
struct Tensor {
    values: Vec<f64>,
    shape: Vec<usize>,
}

impl Tensor {
    fn matrix(self, name: &str) -> Result<Array2<f64>> {
        ensure!(self.shape.len() == 2, "'{name}' must be 2-D, got shape {:?}", self.shape);
        Ok(Array2::from_shape_vec((self.shape[0], self.shape[1]), self.values)?)
    }

    /// `[N, 2]` inclusive index pairs.
    fn intervals(self, name: &str) -> Result<Vec<Interval>> {
        let m = self.matrix(name)?;
        ensure!(m.ncols() == 2, "'{name}' must have 2 columns");
        m.rows()
            .into_iter()
            .map(|r| Ok(Interval::new(to_index(r[0], name)?, to_index(r[1], name)?)))
            .collect()
    }
}

fn to_index(v: f64, name: &str) -> Result<usize> {
    ensure!(v >= 0.0 && v.fract() == 0.0, "'{name}': {v} is not a sample index");
    Ok(v as usize)
}

/// A parsed safetensors file.
struct StFile {
    bytes: Vec<u8>,
    header: Map<String, Value>,
    data_start: usize,
}

impl StFile {
    fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let (header, data_start) = parse_header(&bytes)?;
        Ok(Self { bytes, header, data_start })
    }

    fn metadata(&self, key: &str) -> Option<&str> {
        self.header.get("__metadata__")?.get(key)?.as_str()
    }

    fn atom(&self) -> Result<AtomType> {
        match self.metadata("atom") {
            None | Some("scalar") => Ok(AtomType::Scalar),
            Some("vector") => Ok(AtomType::Vector),
            Some(other) => bail!("unknown atom type '{other}'"),
        }
    }

    fn tensor(&self, name: &str) -> Result<Option<Tensor>> {
        let Some(entry) = self.header.get(name) else {
            return Ok(None);
        };
        let dtype = entry["dtype"].as_str().with_context(|| format!("'{name}': missing dtype"))?;
        let shape = entry["shape"]
            .as_array()
            .and_then(|a| a.iter().map(|v| v.as_u64().map(|x| x as usize)).collect::<Option<Vec<_>>>())
            .with_context(|| format!("'{name}': bad shape"))?;
        let offsets = entry["data_offsets"]
            .as_array()
            .and_then(|a| Some((a.first()?.as_u64()? as usize, a.get(1)?.as_u64()? as usize)))
            .with_context(|| format!("'{name}': bad data_offsets"))?;
        let raw = self
            .bytes
            .get(self.data_start + offsets.0..self.data_start + offsets.1)
            .with_context(|| format!("'{name}': data offsets out of range"))?;
        let values = decode(raw, dtype).with_context(|| format!("decoding '{name}'"))?;
        ensure!(
            values.len() == shape.iter().product::<usize>(),
            "'{name}': {} values for shape {shape:?}",
            values.len()
        );
        Ok(Some(Tensor { values, shape }))
    }

    fn require(&self, name: &str) -> Result<Tensor> {
        self.tensor(name)?.with_context(|| format!("missing '{name}' key"))
    }
}

// ── Readers ───────────────────────────────────────────────────────────────────

/// Load a template set (`templates`, `[K, D]`).
pub fn load_templates(path: &Path) -> Result<TemplateSet> {
    let st = StFile::open(path)?;
    let maps = st.require("templates")?.matrix("templates")?;
    Ok(TemplateSet::new(maps.mapv(|v| v as f32), st.atom()?))
}

/// Load one recording.  `n_maps` is the size of the template set, used
/// when an epoch comes without an eligibility row.
///
/// The recording is named after the file stem.
pub fn load_recording(path: &Path, n_maps: usize) -> Result<Recording> {
    let st = StFile::open(path)?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let data = st.require("data")?.matrix("data")?.mapv(|v| v as f32);
    let sfreq = match st.tensor("sfreq")? {
        Some(t) => t.values.first().copied().unwrap_or(0.0),
        None => 0.0,
    };
    let mut rec = Recording::new(name, data, sfreq, st.atom()?);

    if let Some(t) = st.tensor("gfp")? {
        rec.gfp = Array1::from(t.values).mapv(|v| v as f32);
    }

    if let Some(t) = st.tensor("epochs")? {
        let bounds = t.intervals("epochs")?;
        let eligibility = st.tensor("epoch_maps")?.map(|m| m.matrix("epoch_maps")).transpose()?;
        if let Some(m) = &eligibility {
            ensure!(m.nrows() == bounds.len(), "'epoch_maps' has {} rows for {} epochs", m.nrows(), bounds.len());
        }
        rec.epochs = bounds
            .iter()
            .enumerate()
            .map(|(e, iv)| {
                let maps = match &eligibility {
                    Some(m) => m.row(e).iter().enumerate().filter(|&(_, &v)| v != 0.0).map(|(k, _)| k).collect(),
                    None => (0..n_maps).collect(),
                };
                Epoch::new(iv.from, iv.to, maps)
            })
            .collect();
    }

    if let Some(t) = st.tensor("bad")? {
        rec.bad_intervals = t.intervals("bad")?;
    }

    log::debug!(
        "loaded {}: {} × {} @ {} Hz, {} epochs, {} bad intervals",
        rec.name,
        rec.data.nrows(),
        rec.n_times(),
        rec.sfreq,
        rec.epochs.len(),
        rec.bad_intervals.len()
    );
    Ok(rec)
}

// ── Generic safetensors builder ───────────────────────────────────────────────

/// Simple safetensors file writer that handles F32, F64, and I32 tensors.
///
/// Usage:
/// ```rust,no_run
/// use backfit::io::StWriter;
/// use std::path::Path;
/// let mut w = StWriter::new();
/// w.add_f32("gfp", &[1.0f32, 2.0, 3.0], &[3]);
/// w.add_i32("labels", &[0, -1, 2], &[3]);
/// w.set_metadata("atom", "scalar");
/// w.write(Path::new("/tmp/out.safetensors")).unwrap();
/// ```
#[derive(Default)]
pub struct StWriter {
    entries: Vec<(String, Vec<u8>, &'static str, Vec<usize>)>,
    metadata: Map<String, Value>,
}

impl StWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_metadata(&mut self, key: &str, value: &str) {
        self.metadata.insert(key.to_string(), Value::String(value.to_string()));
    }

    pub fn add_f32(&mut self, name: &str, data: &[f32], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F32", shape.to_vec()));
    }

    pub fn add_f32_array<D: Dimension>(&mut self, name: &str, arr: &Array<f32, D>) {
        let data: Vec<f32> = arr.iter().copied().collect();
        self.add_f32(name, &data, arr.shape());
    }

    pub fn add_f64(&mut self, name: &str, data: &[f64], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F64", shape.to_vec()));
    }

    pub fn add_f64_array<D: Dimension>(&mut self, name: &str, arr: &Array<f64, D>) {
        let data: Vec<f64> = arr.iter().copied().collect();
        self.add_f64(name, &data, arr.shape());
    }

    pub fn add_i32(&mut self, name: &str, data: &[i32], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "I32", shape.to_vec()));
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut header_map = Map::new();
        if !self.metadata.is_empty() {
            header_map.insert("__metadata__".into(), Value::Object(self.metadata.clone()));
        }
        let mut offset: usize = 0;
        for (name, data, dtype, shape) in &self.entries {
            header_map.insert(name.clone(), json!({
                "dtype": dtype,
                "shape": shape,
                "data_offsets": [offset, offset + data.len()],
            }));
            offset += data.len();
        }
        let hdr_bytes = serde_json::to_vec(&header_map)?;
        let pad = (8 - hdr_bytes.len() % 8) % 8;
        let padded: Vec<u8> = hdr_bytes.into_iter()
            .chain(std::iter::repeat(b' ').take(pad))
            .collect();
        let mut f = BufWriter::new(
            std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?,
        );
        f.write_all(&(padded.len() as u64).to_le_bytes())?;
        f.write_all(&padded)?;
        for (_, data, _, _) in &self.entries {
            f.write_all(data)?;
        }
        f.flush()?;
        Ok(())
    }
}

fn atom_name(atom: AtomType) -> &'static str {
    match atom {
        AtomType::Scalar => "scalar",
        AtomType::Vector => "vector",
    }
}

fn label_code(label: Option<usize>) -> i32 {
    label.map_or(-1, |k| k as i32)
}

// ── Writers ───────────────────────────────────────────────────────────────────

/// Write a recording in the layout [`load_recording`] reads.
pub fn write_recording(rec: &Recording, n_maps: usize, path: &Path) -> Result<()> {
    let mut w = StWriter::new();
    w.set_metadata("atom", atom_name(rec.atom));
    w.add_f32_array("data", &rec.data);
    w.add_f32_array("gfp", &rec.gfp);
    w.add_f64("sfreq", &[rec.sfreq], &[1]);
    if !rec.epochs.is_empty() {
        let bounds: Vec<i32> = rec.epochs.iter().flat_map(|e| [e.from as i32, e.to as i32]).collect();
        w.add_i32("epochs", &bounds, &[rec.epochs.len(), 2]);
        let eligible: Vec<i32> = rec
            .epochs
            .iter()
            .flat_map(|e| (0..n_maps).map(move |k| e.is_eligible(k) as i32))
            .collect();
        w.add_i32("epoch_maps", &eligible, &[rec.epochs.len(), n_maps]);
    }
    if !rec.bad_intervals.is_empty() {
        let bounds: Vec<i32> = rec.bad_intervals.iter().flat_map(|iv| [iv.from as i32, iv.to as i32]).collect();
        w.add_i32("bad", &bounds, &[rec.bad_intervals.len(), 2]);
    }
    w.write(path)
}

/// Write a template set in the layout [`load_templates`] reads.
pub fn write_templates(templates: &TemplateSet, path: &Path) -> Result<()> {
    let mut w = StWriter::new();
    w.set_metadata("atom", atom_name(templates.atom));
    w.add_f32_array("templates", &templates.maps);
    w.write(path)
}

/// Write the labeling of one fitted file.
///
/// Competitive fits store `labels` `[T]` (`-1` = Undefined); non-competitive
/// fits store `activity` `[K, T]` (0/1).  Both store `segments` `[S, 3]`
/// as `(from, to, label)` and the `gfp` track.
pub fn write_fit(file: &FittedFile, path: &Path) -> Result<()> {
    let mut w = StWriter::new();
    match &file.assignment {
        Assignment::Exclusive(labels) => {
            let codes: Vec<i32> = labels.iter().map(|&l| label_code(l)).collect();
            w.add_i32("labels", &codes, &[codes.len()]);
        }
        Assignment::Concurrent(mask) => {
            let codes: Vec<i32> = mask.iter().map(|&a| a as i32).collect();
            w.add_i32("activity", &codes, mask.shape());
        }
    }
    let segs: Vec<i32> = file
        .segments
        .iter()
        .flat_map(|s| [s.from as i32, s.to as i32, label_code(s.label)])
        .collect();
    w.add_i32("segments", &segs, &[file.segments.len(), 3]);
    w.add_f32_array("gfp", &file.gfp);
    w.write(path)
}

/// Write Markov counts and all four probability tables.
pub fn write_markov(counts: &MarkovCounts, path: &Path) -> Result<()> {
    let tables = counts.tables();
    let mut w = StWriter::new();
    w.set_metadata("include_undefined", if counts.include_undefined { "true" } else { "false" });
    w.add_f64_array("transitions", &counts.transitions);
    w.add_f64_array("occurrences", &counts.occurrences);
    w.add_f64_array("observed_joint", &tables.observed_joint);
    w.add_f64_array("expected_joint", &tables.expected_joint);
    w.add_f64_array("observed_transition", &tables.observed_transition);
    w.add_f64_array("expected_transition", &tables.expected_transition);
    w.write(path)
}

// ── Statistics export ─────────────────────────────────────────────────────────

fn label_json(stats: &LabelStats) -> Value {
    let mut obj = Map::new();
    obj.insert("map".into(), json!(stats.label));
    obj.insert("eligible".into(), json!(stats.eligible));
    for (name, value) in stats.table() {
        obj.insert(name.into(), json!(value));
    }
    obj.insert("histogram".into(), json!(stats.histogram));
    Value::Object(obj)
}

fn file_json(stats: &FileStatistics) -> Value {
    let (unit, sfreq) = match stats.time_unit {
        TimeUnit::Milliseconds { sfreq } => ("ms", Some(sfreq)),
        TimeUnit::Samples => ("samples", None),
    };
    json!({
        "name": stats.name,
        "time_unit": unit,
        "sfreq": sfreq,
        "n_samples": stats.n_samples,
        "n_labeled": stats.n_labeled,
        "undefined_ratio": stats.undefined_ratio,
        "maps": stats.maps.iter().map(label_json).collect::<Vec<_>>(),
        "undefined": label_json(&stats.undefined),
    })
}

/// Statistics tables of one subject, keyed by variable name.  Missing
/// values are `null`.
pub fn statistics_json(fit: &SubjectFit) -> Value {
    json!({
        "subject": fit.name,
        "total_gev": fit.total_gev(),
        "files": fit.files.iter().map(|f| file_json(&f.statistics)).collect::<Vec<_>>(),
        "warnings": fit.warnings.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
    })
}

pub fn write_statistics(fit: &SubjectFit, path: &Path) -> Result<()> {
    let f = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut w = BufWriter::new(f);
    serde_json::to_writer_pretty(&mut w, &statistics_json(fit))?;
    w.flush()?;
    Ok(())
}
