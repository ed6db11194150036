use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use mapstream_assets::Asset;
use mapstream_common::AssetId;
use mapstream_stream::{AssetHost, HostError};
use serde_json::{json, Value};

/// Stand-in for a renderer/physics resource: a kind tag and a byte size.
#[derive(Debug, Clone)]
pub struct DemoAsset {
    pub kind: String,
    pub bytes: usize,
}

impl Asset for DemoAsset {
    fn memory_size(&self) -> usize {
        self.bytes
    }
}

/// Host that builds [`DemoAsset`]s from `type`/`bytes` attributes and counts
/// lifecycle calls.
#[derive(Debug, Default)]
pub struct DemoHost {
    pub map_name: Option<String>,
    pub constructed: usize,
    pub deleted: usize,
}

impl AssetHost for DemoHost {
    type Asset = DemoAsset;

    fn apply_map_settings(&mut self, root: &Value) -> Result<(), HostError> {
        self.map_name = root.get("name").and_then(Value::as_str).map(str::to_string);
        Ok(())
    }

    fn construct(&mut self, id: AssetId, node: &Value) -> Result<DemoAsset, HostError> {
        let bytes = node
            .get("bytes")
            .and_then(Value::as_u64)
            .ok_or_else(|| format!("asset {id} has no byte size"))?;
        let kind = node.get("type").and_then(Value::as_str).unwrap_or("blob");
        self.constructed += 1;
        Ok(DemoAsset {
            kind: kind.to_string(),
            bytes: bytes as usize,
        })
    }

    fn delete(&mut self, id: AssetId, asset: &DemoAsset) {
        tracing::trace!(%id, kind = %asset.kind, "releasing demo asset");
        self.deleted += 1;
    }
}

/// Shape of a generated demo map.
#[derive(Debug, Clone)]
pub struct MapLayout {
    pub cols: i32,
    pub rows: i32,
    pub segment_size: f32,
    /// Own assets per segment.
    pub assets: u64,
    /// Shared include files; segment (x, y) includes `shared_{(x + y) % shared}`.
    pub shared: u64,
}

const SHARED_ID_BASE: u64 = 1_000_000;
const KINDS: [&str; 3] = ["mesh", "texture", "collider"];

/// Write a map file, one descriptor per segment and the shared includes.
/// Returns the map file path.
pub fn generate(out: &Path, layout: &MapLayout) -> anyhow::Result<PathBuf> {
    anyhow::ensure!(layout.cols > 0 && layout.rows > 0, "map needs at least one segment");
    anyhow::ensure!(layout.segment_size > 0.0, "segment size must be positive");

    let segments_dir = out.join("segments");
    fs::create_dir_all(&segments_dir)
        .with_context(|| format!("creating {}", segments_dir.display()))?;

    let map_path = out.join("map.json");
    let map = json!({
        "name": "demo",
        "segmentSize": [layout.segment_size, layout.segment_size],
        "boundary": {
            "position": [0.0, 0.0],
            "size": [
                layout.cols as f32 * layout.segment_size,
                layout.rows as f32 * layout.segment_size
            ]
        },
        "segments": { "dir": "segments", "pattern": "{x}_{y}.json" }
    });
    write_json(&map_path, &map)?;

    for s in 0..layout.shared {
        let include = json!({ "assets": [
            { "id": SHARED_ID_BASE + s, "type": "texture", "bytes": 64 * 1024 }
        ]});
        write_json(&segments_dir.join(format!("shared_{s}.json")), &include)?;
    }

    let mut next_id = 1u64;
    for y in 0..layout.rows {
        for x in 0..layout.cols {
            let mut assets: Vec<Value> = Vec::with_capacity(layout.assets as usize + 1);
            for i in 0..layout.assets {
                assets.push(json!({
                    "id": next_id,
                    "type": KINDS[(i % KINDS.len() as u64) as usize],
                    "bytes": 4096 * (1 + next_id % 8)
                }));
                next_id += 1;
            }
            if layout.shared > 0 {
                let s = (x + y) as u64 % layout.shared;
                assets.push(json!({ "include": format!("shared_{s}.json") }));
            }
            write_json(
                &segments_dir.join(format!("{x}_{y}.json")),
                &json!({ "assets": assets }),
            )?;
        }
    }

    tracing::info!(
        path = %map_path.display(),
        segments = layout.cols * layout.rows,
        "demo map written"
    );
    Ok(map_path)
}

fn write_json(path: &Path, value: &Value) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}
