//! meshreduce command-line driver
//!
//! Loads a mesh, cleans it, reduces it and writes the result:
//!
//! ```text
//! meshreduce -i scan.ply -o scan_lod1.ply -r 0.25 --error-ceiling 1e-4
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use meshreduce_core::{Bounded, TriangleMesh};
use meshreduce_io::{read_mesh, write_mesh};
use meshreduce_simplification::{clean_buffer, reduce_mesh, MeshBuffer, ReductionConfig, ReductionReport};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod args;

use args::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let report = run(&cli)?;
    println!("{report}");
    Ok(())
}

/// `RUST_LOG` wins over `-v` when set.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<ReductionReport> {
    let config = cli.reduction_config()?;

    let mesh = read_mesh(&cli.input)
        .with_context(|| format!("failed to read {}", cli.input.display()))?;
    info!(
        "Loaded {}: {} vertices, {} faces, diagonal {:.4}",
        cli.input.display(),
        mesh.vertex_count(),
        mesh.face_count(),
        mesh.diagonal()
    );

    let (reduced, report) = reduce(&mesh, &config)?;

    write_mesh(&reduced, &cli.output)
        .with_context(|| format!("failed to write {}", cli.output.display()))?;
    info!(
        "Wrote {}: {} vertices, {} faces",
        cli.output.display(),
        reduced.vertex_count(),
        reduced.face_count()
    );

    Ok(report)
}

/// Runs the cleaning pass here, when enabled, so its report can be logged.
fn reduce(mesh: &TriangleMesh, config: &ReductionConfig) -> Result<(TriangleMesh, ReductionReport)> {
    let mut buffer = MeshBuffer::try_from(mesh).context("mesh cannot be imported")?;

    if config.clean_input {
        let (cleaned, report) = clean_buffer(&buffer, config.degenerate_area_epsilon)
            .context("mesh cannot be cleaned")?;
        if report.is_clean() {
            debug!("Input mesh needed no cleaning");
        } else {
            info!("Cleaned input: {report}");
        }
        buffer = cleaned;
    }

    let config = config.clone().clean_input(false);
    let output = reduce_mesh(&buffer, &config).context("reduction failed")?;
    info!(
        termination = %output.report.termination,
        max_error = output.report.max_error,
        rejections = output.report.counters.rejections(),
        "{}",
        output.report
    );

    Ok((output.mesh.to_triangle_mesh(), output.report))
}
