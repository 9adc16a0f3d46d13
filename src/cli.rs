use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::InterpolatorConfig;
use crate::interpolator::Interpolator;
use crate::point::{PaintPoint, ShaderPaintPoint};
use crate::script_diagnostics::ScriptDiagnostic;
use crate::script_registry::{ScriptInfo, ScriptRegistry};
use crate::stroke::SampleEvent;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a script and report diagnostics as JSON
    Check {
        /// Script file
        script: PathBuf,

        /// Interpolator config (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Replay recorded touch samples through a script
    Interpolate {
        /// Script file (the built-in pass-through script if omitted)
        #[arg(long)]
        script: Option<PathBuf>,

        /// Input JSON file: an array of frames, each an array of sample events
        #[arg(long)]
        input: PathBuf,

        /// Frame width
        #[arg(long, default_value_t = 800)]
        width: u32,

        /// Frame height
        #[arg(long, default_value_t = 600)]
        height: u32,

        /// Interpolator config (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output JSON file (stdout if omitted)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Also write every emitted point as packed 28-byte records
        #[arg(long)]
        raw: Option<PathBuf>,

        /// Write layers in the reduced {pos, time, size} form
        #[arg(long)]
        reduced: bool,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { script, config } => check(&script, config.as_deref()),
        Commands::Interpolate {
            script,
            input,
            width,
            height,
            config,
            out,
            raw,
            reduced,
        } => interpolate(
            script.as_deref(),
            &input,
            width,
            height,
            config.as_deref(),
            out.as_deref(),
            raw.as_deref(),
            reduced,
        ),
    }
}

fn load_config(path: Option<&Path>) -> Result<InterpolatorConfig> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            InterpolatorConfig::from_json(&text)
                .with_context(|| format!("parsing config {}", path.display()))
        }
        None => Ok(InterpolatorConfig::default()),
    }
}

#[derive(Serialize)]
struct CheckReport {
    ok: bool,
    script: Option<ScriptInfo>,
    diagnostics: Vec<ScriptDiagnostic>,
}

fn check(script_path: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let source = fs::read_to_string(script_path)
        .with_context(|| format!("reading script {}", script_path.display()))?;

    let mut registry = ScriptRegistry::new(config.limits);
    let result = registry.compile(&source);
    let report = CheckReport {
        ok: result.is_ok(),
        script: result.as_ref().ok().and_then(|h| registry.info(*h)),
        diagnostics: registry.take_diagnostics(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    result
        .map(|_| ())
        .with_context(|| format!("{} failed to compile", script_path.display()))
}

#[derive(Serialize)]
struct FrameOutput {
    frame: u64,
    pairs_processed: usize,
    pairs_skipped: usize,
    error: Option<ScriptDiagnostic>,
    layers: Layers,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Layers {
    Full(Vec<Vec<ShaderPaintPoint>>),
    Reduced(Vec<Vec<PaintPoint>>),
}

fn interpolate(
    script_path: Option<&Path>,
    input_path: &Path,
    width: u32,
    height: u32,
    config_path: Option<&Path>,
    out_path: Option<&Path>,
    raw_path: Option<&Path>,
    reduced: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let input = fs::read_to_string(input_path)
        .with_context(|| format!("reading input {}", input_path.display()))?;
    let frames: Vec<Vec<SampleEvent>> = serde_json::from_str(&input)
        .context("input must be a JSON array of frames of sample events")?;

    let mut interp = Interpolator::new(config);
    if let Some(path) = script_path {
        let source = fs::read_to_string(path)
            .with_context(|| format!("reading script {}", path.display()))?;
        let handle = interp
            .compile(&source)
            .with_context(|| format!("{} failed to compile", path.display()))?;
        interp.activate(handle)?;
    }

    log::info!("Interpolating {} frames at {}x{}...", frames.len(), width, height);

    let mut outputs = Vec::with_capacity(frames.len());
    let mut raw_bytes = Vec::new();
    for events in frames {
        for event in events {
            interp.push_event(event);
        }
        let report = interp.run_frame(width, height);

        let reduced_layers = reduced.then(|| {
            let output = interp.output();
            let layers: Vec<_> = (0..output.layer_count())
                .map(|i| output.layer_paint_points(i))
                .collect();
            layers
        });
        let layers = interp.take_output();
        if raw_path.is_some() {
            for layer in &layers {
                raw_bytes.extend_from_slice(bytemuck::cast_slice(layer));
            }
        }

        outputs.push(FrameOutput {
            frame: report.frame,
            pairs_processed: report.pairs_processed,
            pairs_skipped: report.pairs_skipped,
            error: report.error.map(|e| e.diagnostic().clone()),
            layers: match reduced_layers {
                Some(reduced) => Layers::Reduced(reduced),
                None => Layers::Full(layers),
            },
        });
    }
    interp.shutdown();

    if let Some(path) = raw_path {
        fs::write(path, &raw_bytes).with_context(|| format!("writing {}", path.display()))?;
        log::info!("Wrote {} bytes to {}", raw_bytes.len(), path.display());
    }

    let json = serde_json::to_string_pretty(&outputs)?;
    match out_path {
        Some(path) => fs::write(path, json).with_context(|| format!("writing {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", json)?;
        }
    }

    Ok(())
}
