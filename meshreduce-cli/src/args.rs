//! Command-line arguments and their mapping onto [`ReductionConfig`]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use meshreduce_simplification::ReductionConfig;

/// Fraction of triangles kept when neither the flags nor the config file name a target
const DEFAULT_RATIO: f32 = 0.5;

#[derive(Debug, Parser)]
#[command(name = "meshreduce", version)]
#[command(about = "Reduce triangle meshes by quadric error edge collapse", long_about = None)]
pub struct Cli {
    /// Input mesh (.obj, .ply or .glb)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output mesh (.obj, .ply or .glb)
    #[arg(short, long)]
    pub output: PathBuf,

    /// Fraction of the input triangles to keep, in (0, 1]
    #[arg(short, long, conflicts_with = "triangles")]
    pub ratio: Option<f32>,

    /// Number of triangles to keep
    #[arg(short, long)]
    pub triangles: Option<usize>,

    /// Stop once the cheapest collapse would cost more than this
    #[arg(long)]
    pub error_ceiling: Option<f64>,

    /// Largest allowed face normal rotation per collapse
    #[arg(long, value_name = "DEGREES")]
    pub normal_angle: Option<f64>,

    /// Triangle quality below which collapses are penalized, in [0, 1]
    #[arg(long)]
    pub quality: Option<f64>,

    /// Weight of the planes that hold open boundaries in place
    #[arg(long)]
    pub boundary_weight: Option<f64>,

    /// Weight of texture coordinate stretch in the collapse cost
    #[arg(long)]
    pub texture_weight: Option<f64>,

    /// Allow collapses that move boundary vertices
    #[arg(long)]
    pub no_preserve_boundary: bool,

    /// Allow collapses that change the surface topology
    #[arg(long)]
    pub no_preserve_topology: bool,

    /// Skip welding and degenerate face removal before reduction
    #[arg(long)]
    pub no_clean: bool,

    /// TOML file with reduction options; flags take precedence
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Build the reduction config from the optional file and the flags.
    pub fn reduction_config(&self) -> Result<ReductionConfig> {
        let file = self
            .config
            .as_deref()
            .map(read_config_file)
            .transpose()?;
        let config = self.apply(file)?;
        config.validate().context("invalid reduction options")?;
        Ok(config)
    }

    fn apply(&self, file: Option<ReductionConfig>) -> Result<ReductionConfig> {
        let mut config = match file {
            Some(config) => config,
            None => ReductionConfig::with_target_ratio(DEFAULT_RATIO).clean_input(true),
        };

        if let Some(ratio) = self.ratio {
            config.target_ratio = Some(ratio);
            config.target_triangle_count = None;
        }
        if let Some(count) = self.triangles {
            config.target_triangle_count = Some(count);
            config.target_ratio = None;
        }
        if config.target_ratio.is_none() && config.target_triangle_count.is_none() {
            config.target_ratio = Some(DEFAULT_RATIO);
        }

        if let Some(ceiling) = self.error_ceiling {
            config = config.error_ceiling(ceiling);
        }
        if let Some(degrees) = self.normal_angle {
            config = config.normal_flip_angle(degrees);
        }
        if let Some(threshold) = self.quality {
            config = config.quality_threshold(threshold);
        }
        if let Some(weight) = self.boundary_weight {
            config = config.boundary_weight(weight);
        }
        if let Some(weight) = self.texture_weight {
            config = config.texture_weight(weight);
        }
        if self.no_preserve_boundary {
            config = config.preserve_boundary_edges(false);
        }
        if self.no_preserve_topology {
            config = config.preserve_topology(false);
        }
        if self.no_clean {
            config = config.clean_input(false);
        }

        Ok(config)
    }
}

fn read_config_file(path: &Path) -> Result<ReductionConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    parse_config(&text).with_context(|| format!("failed to parse config file {}", path.display()))
}

/// Parse a TOML config; the input is cleaned unless the file sets `clean_input = false`.
pub fn parse_config(text: &str) -> Result<ReductionConfig> {
    let table: toml::Table = toml::from_str(text)?;
    let clean = table
        .get("clean_input")
        .and_then(toml::Value::as_bool)
        .unwrap_or(true);
    let config: ReductionConfig = toml::Value::Table(table).try_into()?;
    Ok(config.clean_input(clean))
}
