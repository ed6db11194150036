use std::hint::black_box;
use std::time::Instant;

use glam::Vec2;
use mapstream_stream::{
    Asset, AssetHost, AssetId, HostError, MapLoader, MemorySource, StreamConfig,
};
use serde_json::{json, Value};

struct Block(usize);

impl Asset for Block {
    fn memory_size(&self) -> usize {
        self.0
    }
}

struct BlockHost;

impl AssetHost for BlockHost {
    type Asset = Block;

    fn construct(&mut self, _id: AssetId, node: &Value) -> Result<Block, HostError> {
        Ok(Block(node["bytes"].as_u64().unwrap_or(1024) as usize))
    }
}

/// `side` x `side` segments of 64 units, each with `per_segment` own assets
/// plus one of eight shared includes.
fn make_source(side: i32, per_segment: u64) -> MemorySource {
    let extent = side as f32 * 64.0;
    let mut source = MemorySource::new().with(
        "map.json",
        json!({
            "segmentSize": [64.0, 64.0],
            "boundary": { "position": [0.0, 0.0], "size": [extent, extent] }
        }),
    );
    for s in 0..8u64 {
        source.insert(
            format!("segments/shared_{s}.json"),
            json!({ "assets": [ { "id": 1_000_000 + s, "bytes": 4096 } ] }),
        );
    }
    let mut next_id = 0u64;
    for y in 0..side {
        for x in 0..side {
            let mut assets: Vec<Value> = (0..per_segment)
                .map(|_| {
                    next_id += 1;
                    json!({ "id": next_id, "bytes": 1024 })
                })
                .collect();
            assets.push(json!({ "include": format!("shared_{}.json", (x + y) % 8) }));
            source.insert(format!("segments/{x}_{y}.json"), json!({ "assets": assets }));
        }
    }
    source
}

fn bench_walk(side: i32, per_segment: u64, radius: i32, budget: usize, iterations: usize) {
    let config = StreamConfig::default()
        .with_window_radius(radius)
        .with_target_memory(budget);
    let mut loader = MapLoader::with_source(BlockHost, make_source(side, per_segment), config);
    if let Err(err) = loader.parse_map_file("map.json") {
        println!("  skipped: {err}");
        return;
    }

    let extent = side as f32 * 64.0;
    let mut evicted = 0;
    let start = Instant::now();
    for i in 0..iterations {
        // Diagonal sweep, wrapping at the far corner.
        let t = (i as f32 * 16.0) % extent;
        match loader.update(black_box(Vec2::new(t, t))) {
            Ok(stats) => evicted += stats.segments_evicted,
            Err(err) => {
                println!("  update failed: {err}");
                return;
            }
        }
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  walk ({side}x{side}, {per_segment} assets/seg, r={radius}, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}, {evicted} evictions"
    );
}

fn bench_hysteresis(iterations: usize) {
    let config = StreamConfig::default().with_window_radius(1);
    let mut loader = MapLoader::with_source(BlockHost, make_source(8, 16), config);
    if loader.parse_map_file("map.json").is_err() {
        return;
    }

    let a = Vec2::new(96.0, 96.0);
    let b = Vec2::new(160.0, 96.0);
    let start = Instant::now();
    for i in 0..iterations {
        let _ = black_box(loader.update(if i % 2 == 0 { a } else { b }).is_ok());
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!("  boundary oscillation ({iterations} iters): {per_iter:?}/iter, total {elapsed:?}");
}

fn main() {
    println!("=== Stream Update Benchmarks ===\n");

    println!("Viewpoint walk:");
    bench_walk(16, 8, 1, 64 * 1024, 1000);
    bench_walk(32, 32, 2, 512 * 1024, 1000);
    bench_walk(64, 32, 3, 1024 * 1024, 500);

    println!("\nTight budget (evicts every tick):");
    bench_walk(32, 32, 1, 0, 1000);

    println!("\nRe-entry without eviction:");
    bench_hysteresis(10000);

    println!("\n=== Done ===");
}
