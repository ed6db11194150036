mod demo;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use glam::Vec2;
use mapstream_stream::{MapLoader, SegmentState, StreamConfig};
use tracing_subscriber::EnvFilter;

use crate::demo::{DemoHost, MapLayout};

#[derive(Parser)]
#[command(name = "mapstream-cli", about = "CLI tool for mapstream operations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate versions
    Info,
    /// Write a demo map with one descriptor per segment
    Generate {
        /// Output directory
        #[arg(short, long)]
        out: PathBuf,
        #[arg(long, default_value = "8")]
        cols: i32,
        #[arg(long, default_value = "8")]
        rows: i32,
        /// Segment edge length in world units
        #[arg(long, default_value = "64")]
        segment_size: f32,
        /// Own assets per segment
        #[arg(long, default_value = "16")]
        assets: u64,
        /// Number of shared include files
        #[arg(long, default_value = "4")]
        shared: u64,
    },
    /// Sweep a viewpoint across a map and check memory accounting every tick
    Walk {
        /// Map descriptor
        #[arg(short, long)]
        map: PathBuf,
        /// Memory budget in bytes
        #[arg(short, long, default_value = "4194304")]
        budget: usize,
        /// Window radius in segments
        #[arg(short, long, default_value = "1")]
        radius: i32,
        #[arg(short, long, default_value = "100")]
        steps: usize,
        /// Viewpoint movement per tick in world units
        #[arg(long, default_value = "16")]
        step_size: f32,
    },
    /// Load around one point and list what is resident
    Inspect {
        /// Map descriptor
        #[arg(short, long)]
        map: PathBuf,
        #[arg(short, allow_negative_numbers = true)]
        x: f32,
        #[arg(short, allow_negative_numbers = true)]
        y: f32,
        /// Window radius in segments
        #[arg(short, long, default_value = "1")]
        radius: i32,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("mapstream-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", mapstream_common::crate_info());
            println!("assets: {}", mapstream_assets::crate_info());
            println!("stream: {}", mapstream_stream::crate_info());
        }
        Commands::Generate {
            out,
            cols,
            rows,
            segment_size,
            assets,
            shared,
        } => {
            let layout = MapLayout {
                cols,
                rows,
                segment_size,
                assets,
                shared,
            };
            let map = demo::generate(&out, &layout)?;
            println!(
                "Wrote {cols}x{rows} segments ({assets} assets each, {shared} shared includes) to {}",
                map.display()
            );
        }
        Commands::Walk {
            map,
            budget,
            radius,
            steps,
            step_size,
        } => walk(map, budget, radius, steps, step_size)?,
        Commands::Inspect { map, x, y, radius } => inspect(map, Vec2::new(x, y), radius)?,
    }

    Ok(())
}

fn walk(
    map: PathBuf,
    budget: usize,
    radius: i32,
    steps: usize,
    step_size: f32,
) -> anyhow::Result<()> {
    let config = StreamConfig::default()
        .with_target_memory(budget)
        .with_window_radius(radius);
    let mut loader = MapLoader::new(DemoHost::default(), config);
    loader.parse_map_file(&map)?;

    let bounds = loader.map_boundary()?;
    anyhow::ensure!(bounds.size.x > 0.0, "map boundary has zero width");
    let y = bounds.position.y + bounds.size.y * 0.5;
    println!("Walk: {steps} steps of {step_size} along y={y}, budget={budget}");

    let mut failures = 0;
    for tick in 0..steps {
        let x = bounds.position.x + (tick as f32 * step_size) % bounds.size.x;
        let pos = Vec2::new(x, y);

        let stats = match loader.update(pos).cloned() {
            Ok(stats) => stats,
            Err(err) if !err.is_fatal() => {
                tracing::warn!(tick, error = %err, "segment failed to load");
                failures += 1;
                loader.stats().clone()
            }
            Err(err) => return Err(err.into()),
        };

        let recomputed = loader.recompute_memory_usage()?;
        anyhow::ensure!(
            stats.memory_usage == recomputed,
            "tick {tick}: tracked memory {} != resident sum {recomputed}",
            stats.memory_usage
        );
        anyhow::ensure!(
            !stats.over_budget() || stats.pending_unloads == 0,
            "tick {tick}: over budget with {} segments still pending",
            stats.pending_unloads
        );

        println!(
            "tick {tick:>4} ({:>7.1}, {:>7.1}): resident={} pending={} assets={} memory={}/{} ({:.0}%) (+{} ~{} -{}) {:?}",
            pos.x,
            pos.y,
            stats.resident_segments,
            stats.pending_unloads,
            stats.resident_assets,
            stats.memory_usage,
            stats.target_memory,
            stats.memory_pressure() * 100.0,
            stats.segments_loaded,
            stats.segments_restored,
            stats.segments_evicted,
            stats.update_time,
        );
    }

    let host = loader.host();
    println!(
        "Done: constructed={}, deleted={}, failed ticks={failures}, memory invariant OK",
        host.constructed, host.deleted
    );
    Ok(())
}

fn inspect(map: PathBuf, pos: Vec2, radius: i32) -> anyhow::Result<()> {
    let config = StreamConfig::default().with_window_radius(radius);
    let mut loader = MapLoader::new(DemoHost::default(), config);
    loader.parse_map_file(&map)?;

    let center = loader.index_of(pos)?;
    if let Err(err) = loader.update(pos) {
        if err.is_fatal() {
            return Err(err.into());
        }
        println!("warning: {err}");
    }

    println!(
        "Map {:?}: viewpoint ({}, {}) in segment {center}",
        loader.host().map_name.as_deref().unwrap_or("<unnamed>"),
        pos.x,
        pos.y
    );
    for coord in loader.resident_segments() {
        let Some(segment) = loader.segment(coord) else {
            continue;
        };
        let state = match segment.state() {
            SegmentState::Loaded => "loaded",
            SegmentState::PendingUnload => "pending",
            SegmentState::Unloaded => "unloaded",
        };
        println!(
            "  {coord}: {state}, {} assets from {}",
            segment.asset_ids().len(),
            segment.descriptor().display()
        );
    }

    println!(
        "Memory: {} bytes across {} assets",
        loader.memory_usage()?,
        loader.asset_count()
    );
    if let Some(next) = loader.pending_unloads().front() {
        println!(
            "Next eviction: {next} ({} pending)",
            loader.pending_unloads().len()
        );
    }
    println!("Most shared:");
    for (id, count) in loader.ref_counts().most_shared(5) {
        let kind = loader.asset(id).map_or("?", |a| a.kind.as_str());
        println!("  {id} ({kind}): {count} segments");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inspect_accepts_negative_viewpoints() {
        let cli = Cli::try_parse_from([
            "mapstream-cli",
            "inspect",
            "--map",
            "map.json",
            "-x",
            "-5",
            "-y",
            "-12.5",
        ])
        .unwrap();
        let Commands::Inspect { x, y, radius, .. } = cli.command else {
            panic!("expected inspect");
        };
        assert_eq!((x, y, radius), (-5.0, -12.5, 1));
    }

    #[test]
    fn walk_defaults() {
        let cli = Cli::try_parse_from(["mapstream-cli", "walk", "-m", "map.json"]).unwrap();
        let Commands::Walk { budget, steps, .. } = cli.command else {
            panic!("expected walk");
        };
        assert_eq!((budget, steps), (4 * 1024 * 1024, 100));
    }
}
