use anyhow::{Context, Result};
use backfit::{
    fit_subject, io, FittingConfig, LabelingMode, PolarityMode, Stage, Subject,
};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "backfit", about = "Fit template maps to EEG recordings and export segment statistics")]
struct Args {
    /// Recording .safetensors, one per condition (repeat the flag)
    #[arg(long = "input", required = true)]
    inputs: Vec<PathBuf>,

    /// Template set .safetensors (`templates`, [K, D])
    #[arg(long)]
    templates: PathBuf,

    /// Output directory
    #[arg(long)]
    output: PathBuf,

    /// Subject name used in the statistics export
    #[arg(long, default_value = "subject")]
    subject: String,

    /// FittingConfig as JSON; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keep the sign of correlations (evoked data)
    #[arg(long)]
    direct_polarity: bool,

    /// Evaluate every eligible template on every sample
    #[arg(long)]
    non_competitive: bool,

    /// Minimum correlation for a sample to be labeled
    #[arg(long)]
    min_correlation: Option<f64>,

    /// Smoothing half-window in samples (0 = off)
    #[arg(long)]
    smooth_window: Option<usize>,

    /// Smoothing strength λ
    #[arg(long)]
    smooth_strength: Option<f64>,

    /// Reject segments shorter than this many samples
    #[arg(long)]
    reject_size: Option<usize>,

    /// Also reject short Undefined segments
    #[arg(long)]
    reject_undefined: bool,

    /// Mask bad intervals; segments more than this fraction bad are dropped
    #[arg(long)]
    bad_tolerance: Option<f64>,

    /// Markov step-ahead lags (0 = off)
    #[arg(long)]
    markov_steps: Option<usize>,

    /// Include Undefined segments in Markov tables
    #[arg(long)]
    markov_undefined: bool,

    /// Segment-duration histogram bins (0 = off)
    #[arg(long)]
    histogram_max: Option<usize>,
}

impl Args {
    fn fitting_config(&self) -> Result<FittingConfig> {
        let mut cfg = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&text).context("parsing fitting config")?
            }
            None => FittingConfig::default(),
        };
        if self.direct_polarity {
            cfg.polarity = PolarityMode::Direct;
        }
        if self.non_competitive {
            cfg.mode = LabelingMode::NonCompetitive;
        }
        if self.min_correlation.is_some() {
            cfg.min_correlation = self.min_correlation;
        }
        if let Some(w) = self.smooth_window {
            cfg.smoothing_half_window = w;
        }
        if let Some(l) = self.smooth_strength {
            cfg.smoothing_strength = l;
        }
        if let Some(r) = self.reject_size {
            cfg.reject_size = r;
        }
        cfg.reject_undefined |= self.reject_undefined;
        if self.bad_tolerance.is_some() {
            cfg.bad_interval_tolerance = self.bad_tolerance;
        }
        if let Some(n) = self.markov_steps {
            cfg.markov_steps = n;
        }
        cfg.markov_undefined |= self.markov_undefined;
        if let Some(h) = self.histogram_max {
            cfg.histogram_max = h;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let cfg = args.fitting_config()?;

    let templates = io::load_templates(&args.templates)?;
    log::info!("Loaded {} templates × {} values", templates.n_maps(), templates.dim());

    let conditions = args
        .inputs
        .iter()
        .map(|p| io::load_recording(p, templates.n_maps()))
        .collect::<Result<Vec<_>>>()?;
    for rec in &conditions {
        log::info!("Loaded {}: {} samples @ {} Hz", rec.name, rec.n_times(), rec.sfreq);
    }

    let subject = Subject { name: args.subject.clone(), conditions };
    let progress = |stage: Stage| log::debug!("{stage:?}");
    let fit = fit_subject(&subject, &templates, &cfg, &progress)?;

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;
    for file in &fit.files {
        let path = args.output.join(format!("{}.fit.safetensors", file.fitted.name));
        io::write_fit(&file.fitted, &path)?;
        log::info!("{}: {} segments → {}", file.fitted.name, file.fitted.segments.len(), path.display());
    }
    if let Some(counts) = &fit.markov {
        let path = args.output.join("markov.safetensors");
        io::write_markov(counts, &path)?;
        log::info!("Markov tables → {}", path.display());
    }
    let path = args.output.join("statistics.json");
    io::write_statistics(&fit, &path)?;
    log::info!("Statistics → {}", path.display());

    Ok(())
}
