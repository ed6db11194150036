//! Map and segment descriptors.
//!
//! Descriptors are JSON or YAML trees. A map descriptor carries the segment
//! size, the map boundary and the scheme used to find each segment's
//! descriptor. A segment descriptor lists asset nodes, any of which may
//! instead include another descriptor file:
//!
//! ```json
//! { "assets": [ { "id": 7, "bytes": 4096 }, { "include": "shared/trees.json" } ] }
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Component, Path, PathBuf};

use glam::Vec2;
use mapstream_common::{AssetId, Range, SegmentCoord};
use serde::Deserialize;
use serde_json::Value;

/// Why a single descriptor file could not be used.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("cannot read descriptor: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("missing required node `{0}`")]
    MissingNode(&'static str),
    #[error("entry {index} is missing attribute `{attribute}`")]
    MissingAttribute {
        index: usize,
        attribute: &'static str,
    },
    #[error("{0}")]
    Malformed(String),
    #[error("include cycle")]
    CyclicInclude,
    #[error("includes nested deeper than {0} levels")]
    IncludeTooDeep(usize),
}

/// Files from the outermost descriptor down to the one that failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludeChain(Vec<PathBuf>);

impl IncludeChain {
    pub fn paths(&self) -> &[PathBuf] {
        &self.0
    }

    /// The file the error was raised in.
    pub fn innermost(&self) -> Option<&Path> {
        self.0.last().map(PathBuf::as_path)
    }
}

impl fmt::Display for IncludeChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, path) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{}", path.display())?;
        }
        Ok(())
    }
}

/// A descriptor error annotated with the inclusion chain that reached it.
#[derive(Debug, thiserror::Error)]
#[error("{chain}: {source}")]
pub struct ParseError {
    pub chain: IncludeChain,
    pub source: DescriptorError,
}

impl ParseError {
    pub fn new(path: &Path, source: impl Into<DescriptorError>) -> Self {
        Self {
            chain: IncludeChain(vec![path.to_path_buf()]),
            source: source.into(),
        }
    }

    /// Prepend the including file as the error unwinds out of a nested descriptor.
    pub fn included_from(mut self, path: &Path) -> Self {
        self.chain.0.insert(0, path.to_path_buf());
        self
    }
}

/// Where segment descriptors live: `dir` joined with `pattern`, where `{x}`
/// and `{y}` are replaced by the segment coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PathScheme {
    pub dir: PathBuf,
    pub pattern: String,
}

impl Default for PathScheme {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("segments"),
            pattern: "{x}_{y}.json".into(),
        }
    }
}

impl PathScheme {
    pub fn new(dir: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            pattern: pattern.into(),
        }
    }

    pub fn path_for(&self, coord: SegmentCoord) -> PathBuf {
        let name = self
            .pattern
            .replace("{x}", &coord.x.to_string())
            .replace("{y}", &coord.y.to_string());
        normalize(&self.dir.join(name))
    }

    /// Resolve `dir` relative to the directory holding the map descriptor.
    pub fn rebased(&self, base: &Path) -> Self {
        Self {
            dir: normalize(&base.join(&self.dir)),
            pattern: self.pattern.clone(),
        }
    }
}

/// Core settings read from the map descriptor root.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapSettings {
    pub segment_size: Vec2,
    pub boundary: Range,
    #[serde(default)]
    pub segments: PathScheme,
}

impl MapSettings {
    fn validate(&self) -> Result<(), DescriptorError> {
        let size = self.segment_size;
        if !(size.is_finite() && size.x > 0.0 && size.y > 0.0) {
            return Err(DescriptorError::Malformed(format!(
                "segmentSize must be positive, got {size}"
            )));
        }
        let extent = self.boundary.size;
        if !(extent.is_finite() && self.boundary.position.is_finite())
            || extent.x < 0.0
            || extent.y < 0.0
        {
            return Err(DescriptorError::Malformed(format!(
                "boundary must be finite with non-negative size, got {:?}",
                self.boundary
            )));
        }
        let pattern = &self.segments.pattern;
        if !(pattern.contains("{x}") && pattern.contains("{y}")) {
            return Err(DescriptorError::Malformed(format!(
                "segment pattern `{pattern}` must contain {{x}} and {{y}}"
            )));
        }
        Ok(())
    }
}

/// Read a map descriptor, returning its parsed settings and the raw root node.
///
/// The segment directory in the returned settings is already resolved
/// relative to the map file.
pub fn read_map_settings<S: DescriptorSource + ?Sized>(
    source: &S,
    path: &Path,
) -> Result<(MapSettings, Value), ParseError> {
    let root = source.read(path).map_err(|e| ParseError::new(path, e))?;
    let mut settings =
        MapSettings::deserialize(&root).map_err(|e| ParseError::new(path, e))?;
    settings.validate().map_err(|e| ParseError::new(path, e))?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    settings.segments = settings.segments.rebased(base);
    Ok((settings, root))
}

/// One asset node from a flattened segment descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetEntry {
    pub id: AssetId,
    /// The full node, handed to the host factory.
    pub node: Value,
}

/// Traverse a segment descriptor and every descriptor it includes,
/// depth-first, returning asset entries in document order.
///
/// A file that includes itself through any chain is rejected, as is nesting
/// deeper than `max_depth`. A file reached again through a second branch
/// (a diamond) is skipped: each file is read at most once per traversal.
pub fn flatten_assets<S: DescriptorSource + ?Sized>(
    source: &S,
    path: &Path,
    max_depth: usize,
) -> Result<Vec<AssetEntry>, ParseError> {
    let mut walk = IncludeWalk {
        source,
        max_depth,
        stack: Vec::new(),
        finished: HashSet::new(),
        out: Vec::new(),
    };
    walk.visit(path)?;
    Ok(walk.out)
}

struct IncludeWalk<'a, S: ?Sized> {
    source: &'a S,
    max_depth: usize,
    /// Files currently being expanded, outermost first.
    stack: Vec<PathBuf>,
    /// Files fully expanded already.
    finished: HashSet<PathBuf>,
    out: Vec<AssetEntry>,
}

impl<S: DescriptorSource + ?Sized> IncludeWalk<'_, S> {
    fn visit(&mut self, path: &Path) -> Result<(), ParseError> {
        if self.stack.iter().any(|p| p == path) {
            return Err(ParseError::new(path, DescriptorError::CyclicInclude));
        }
        if self.finished.contains(path) {
            return Ok(());
        }
        if self.stack.len() > self.max_depth {
            return Err(ParseError::new(
                path,
                DescriptorError::IncludeTooDeep(self.max_depth),
            ));
        }

        let root = self.source.read(path).map_err(|e| ParseError::new(path, e))?;
        let nodes = root
            .get("assets")
            .and_then(Value::as_array)
            .ok_or_else(|| ParseError::new(path, DescriptorError::MissingNode("assets")))?;

        self.stack.push(path.to_path_buf());
        for (index, node) in nodes.iter().enumerate() {
            if let Some(include) = node.get("include") {
                let include = include.as_str().ok_or_else(|| {
                    ParseError::new(
                        path,
                        DescriptorError::Malformed(format!(
                            "entry {index}: `include` must be a string"
                        )),
                    )
                })?;
                let target = self.source.resolve(path, include);
                self.visit(&target).map_err(|e| e.included_from(path))?;
            } else {
                let id = asset_id(node, index).map_err(|e| ParseError::new(path, e))?;
                self.out.push(AssetEntry {
                    id,
                    node: node.clone(),
                });
            }
        }
        self.stack.pop();
        self.finished.insert(path.to_path_buf());
        Ok(())
    }
}

fn asset_id(node: &Value, index: usize) -> Result<AssetId, DescriptorError> {
    let raw = node.get("id").ok_or(DescriptorError::MissingAttribute {
        index,
        attribute: "id",
    })?;
    raw.as_u64().map(AssetId).ok_or_else(|| {
        DescriptorError::Malformed(format!("entry {index}: id must be a non-negative integer"))
    })
}

/// Supplies descriptor trees by path.
pub trait DescriptorSource {
    fn read(&self, path: &Path) -> Result<Value, DescriptorError>;

    /// Path of `include` as referenced from the descriptor at `from`.
    fn resolve(&self, from: &Path, include: &str) -> PathBuf {
        let base = from.parent().unwrap_or_else(|| Path::new(""));
        normalize(&base.join(include))
    }
}

/// Reads descriptors from disk. `.yaml`/`.yml` files are parsed as YAML,
/// everything else as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSource;

impl DescriptorSource for FileSource {
    fn read(&self, path: &Path) -> Result<Value, DescriptorError> {
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Ok(serde_yaml::from_str(&text)?),
            _ => Ok(serde_json::from_str(&text)?),
        }
    }
}

/// Descriptors held in memory, keyed by normalized path.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: HashMap<PathBuf, Value>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl AsRef<Path>, tree: Value) -> Option<Value> {
        self.files.insert(normalize(path.as_ref()), tree)
    }

    pub fn with(mut self, path: impl AsRef<Path>, tree: Value) -> Self {
        self.insert(path, tree);
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl DescriptorSource for MemorySource {
    fn read(&self, path: &Path) -> Result<Value, DescriptorError> {
        self.files.get(&normalize(path)).cloned().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no descriptor at {}", path.display()),
            )
            .into()
        })
    }
}

/// Lexically resolve `.` and `..` components without touching the filesystem.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(entries: &[AssetEntry]) -> Vec<u64> {
        entries.iter().map(|e| e.id.0).collect()
    }

    #[test]
    fn path_scheme_substitutes_coordinates() {
        let scheme = PathScheme::new("maps/one", "seg_{x}.{y}.yaml");
        assert_eq!(
            scheme.path_for(SegmentCoord::new(-2, 5)),
            PathBuf::from("maps/one/seg_-2.5.yaml")
        );
        let rebased = PathScheme::default().rebased(Path::new("world/data"));
        assert_eq!(
            rebased.path_for(SegmentCoord::new(0, 1)),
            PathBuf::from("world/data/segments/0_1.json")
        );
    }

    #[test]
    fn normalize_collapses_parent_components() {
        assert_eq!(normalize(Path::new("a/b/../c/./d.json")), PathBuf::from("a/c/d.json"));
        assert_eq!(normalize(Path::new("../x.json")), PathBuf::from("../x.json"));
    }

    #[test]
    fn map_settings_parse_and_rebase() {
        let source = MemorySource::new().with(
            "worlds/map.json",
            json!({
                "segmentSize": [32.0, 16.0],
                "boundary": { "position": [-64.0, 0.0], "size": [128.0, 64.0] },
                "segments": { "dir": "tiles" },
                "gravity": 9.8
            }),
        );
        let (settings, root) = read_map_settings(&source, Path::new("worlds/map.json")).unwrap();
        assert_eq!(settings.segment_size, Vec2::new(32.0, 16.0));
        assert_eq!(settings.boundary, Range::from_xywh(-64.0, 0.0, 128.0, 64.0));
        assert_eq!(settings.segments.dir, PathBuf::from("worlds/tiles"));
        assert_eq!(settings.segments.pattern, "{x}_{y}.json");
        assert_eq!(root["gravity"], json!(9.8));
    }

    #[test]
    fn map_settings_reject_bad_segment_size() {
        let source = MemorySource::new().with(
            "map.json",
            json!({
                "segmentSize": [0.0, 16.0],
                "boundary": { "position": [0.0, 0.0], "size": [1.0, 1.0] }
            }),
        );
        let err = read_map_settings(&source, Path::new("map.json")).unwrap_err();
        assert!(matches!(err.source, DescriptorError::Malformed(_)));
        assert_eq!(err.chain.paths(), &[PathBuf::from("map.json")]);
    }

    #[test]
    fn map_settings_require_boundary() {
        let source = MemorySource::new().with("map.json", json!({ "segmentSize": [1.0, 1.0] }));
        let err = read_map_settings(&source, Path::new("map.json")).unwrap_err();
        assert!(matches!(err.source, DescriptorError::Json(_)));
    }

    #[test]
    fn flatten_follows_includes_in_document_order() {
        let source = MemorySource::new()
            .with(
                "segments/0_0.json",
                json!({ "assets": [
                    { "id": 1 },
                    { "include": "../shared/trees.json" },
                    { "id": 4 }
                ]}),
            )
            .with(
                "shared/trees.json",
                json!({ "assets": [ { "id": 2 }, { "include": "rocks.json" } ] }),
            )
            .with("shared/rocks.json", json!({ "assets": [ { "id": 3, "kind": "rock" } ] }));

        let entries = flatten_assets(&source, Path::new("segments/0_0.json"), 8).unwrap();
        assert_eq!(ids(&entries), vec![1, 2, 3, 4]);
        assert_eq!(entries[2].node["kind"], json!("rock"));
    }

    #[test]
    fn flatten_allows_diamond_includes() {
        let source = MemorySource::new()
            .with(
                "root.json",
                json!({ "assets": [ { "include": "a.json" }, { "include": "b.json" } ] }),
            )
            .with("a.json", json!({ "assets": [ { "include": "common.json" } ] }))
            .with("b.json", json!({ "assets": [ { "include": "common.json" } ] }))
            .with("common.json", json!({ "assets": [ { "id": 9 } ] }));

        let entries = flatten_assets(&source, Path::new("root.json"), 8).unwrap();
        assert_eq!(ids(&entries), vec![9]);
    }

    /// Counts reads so repeated expansion shows up.
    struct CountingSource {
        inner: MemorySource,
        reads: std::cell::Cell<usize>,
    }

    impl DescriptorSource for CountingSource {
        fn read(&self, path: &Path) -> Result<Value, DescriptorError> {
            self.reads.set(self.reads.get() + 1);
            self.inner.read(path)
        }
    }

    #[test]
    fn flatten_reads_each_file_once() {
        // Each level includes the next one twice: 2^16 paths to the last file.
        let mut inner = MemorySource::new();
        for i in 0..16 {
            let next = format!("{}.json", i + 1);
            inner.insert(
                format!("{i}.json"),
                json!({ "assets": [ { "id": i }, { "include": next }, { "include": next } ] }),
            );
        }
        inner.insert("16.json", json!({ "assets": [ { "id": 16 } ] }));
        let source = CountingSource {
            inner,
            reads: std::cell::Cell::new(0),
        };

        let entries = flatten_assets(&source, Path::new("0.json"), 16).unwrap();
        assert_eq!(source.reads.get(), 17);
        assert_eq!(ids(&entries), (0..=16).collect::<Vec<u64>>());
    }

    #[test]
    fn flatten_rejects_cycles_with_full_chain() {
        let source = MemorySource::new()
            .with("a.json", json!({ "assets": [ { "include": "b.json" } ] }))
            .with("b.json", json!({ "assets": [ { "id": 1 }, { "include": "a.json" } ] }));

        let err = flatten_assets(&source, Path::new("a.json"), 8).unwrap_err();
        assert!(matches!(err.source, DescriptorError::CyclicInclude));
        assert_eq!(err.to_string(), "a.json -> b.json -> a.json: include cycle");
    }

    #[test]
    fn flatten_rejects_self_include() {
        let source =
            MemorySource::new().with("a.json", json!({ "assets": [ { "include": "a.json" } ] }));
        let err = flatten_assets(&source, Path::new("a.json"), 8).unwrap_err();
        assert!(matches!(err.source, DescriptorError::CyclicInclude));
    }

    #[test]
    fn flatten_enforces_depth_limit() {
        let source = MemorySource::new()
            .with("0.json", json!({ "assets": [ { "include": "1.json" } ] }))
            .with("1.json", json!({ "assets": [ { "include": "2.json" } ] }))
            .with("2.json", json!({ "assets": [ { "id": 5 } ] }));

        assert_eq!(ids(&flatten_assets(&source, Path::new("0.json"), 2).unwrap()), vec![5]);

        let err = flatten_assets(&source, Path::new("0.json"), 1).unwrap_err();
        assert!(matches!(err.source, DescriptorError::IncludeTooDeep(1)));
        assert_eq!(err.chain.paths().len(), 3);
    }

    #[test]
    fn missing_include_names_every_level() {
        let source = MemorySource::new()
            .with("seg.json", json!({ "assets": [ { "include": "mid.json" } ] }))
            .with("mid.json", json!({ "assets": [ { "include": "gone.json" } ] }));

        let err = flatten_assets(&source, Path::new("seg.json"), 8).unwrap_err();
        assert!(matches!(err.source, DescriptorError::Io(_)));
        assert_eq!(err.chain.innermost(), Some(Path::new("gone.json")));
        assert!(err.to_string().starts_with("seg.json -> mid.json -> gone.json: "));
    }

    #[test]
    fn malformed_nodes_are_reported() {
        let source = MemorySource::new()
            .with("no_assets.json", json!({ "things": [] }))
            .with("no_id.json", json!({ "assets": [ { "id": 1 }, { "name": "tree" } ] }))
            .with("bad_include.json", json!({ "assets": [ { "include": 3 } ] }));

        let err = flatten_assets(&source, Path::new("no_assets.json"), 8).unwrap_err();
        assert!(matches!(err.source, DescriptorError::MissingNode("assets")));

        let err = flatten_assets(&source, Path::new("no_id.json"), 8).unwrap_err();
        assert!(matches!(
            err.source,
            DescriptorError::MissingAttribute { index: 1, attribute: "id" }
        ));

        let err = flatten_assets(&source, Path::new("bad_include.json"), 8).unwrap_err();
        assert!(matches!(err.source, DescriptorError::Malformed(_)));
    }

    #[test]
    fn negative_or_fractional_ids_are_malformed() {
        let source = MemorySource::new()
            .with("neg.json", json!({ "assets": [ { "id": -4 } ] }))
            .with("frac.json", json!({ "assets": [ { "id": 1 }, { "id": 2.5 } ] }));

        for name in ["neg.json", "frac.json"] {
            let err = flatten_assets(&source, Path::new(name), 8).unwrap_err();
            let DescriptorError::Malformed(message) = &err.source else {
                panic!("expected malformed id, got {err}");
            };
            assert!(message.contains("id must be a non-negative integer"));
        }
    }

    #[test]
    fn file_source_reads_json_and_yaml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("seg.json"),
            r#"{ "assets": [ { "id": 1 }, { "include": "more.yaml" } ] }"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("more.yaml"),
            "assets:\n  - id: 2\n    bytes: 64\n",
        )
        .unwrap();

        let entries = flatten_assets(&FileSource, &dir.path().join("seg.json"), 4).unwrap();
        assert_eq!(ids(&entries), vec![1, 2]);
        assert_eq!(entries[1].node["bytes"], json!(64));
    }

    #[test]
    fn file_source_reports_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = flatten_assets(&FileSource, &path, 4).unwrap_err();
        assert!(matches!(err.source, DescriptorError::Json(_)));
    }
}
