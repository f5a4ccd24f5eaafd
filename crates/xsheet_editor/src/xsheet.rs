// SPDX-License-Identifier: MIT OR Apache-2.0
//! X-sheet persistence.
//!
//! The sheet is stored as JSON next to the document. Cels are written as
//! paths into the layer stack. Two older layouts are still read: a bare
//! list of `[is_key, description, index]` triples, and a first revision whose
//! tracks are lists of `{idx, is_key, description}` records. Their indices
//! count raster layers depth first.

use crate::layers::{LayerPath, LayerStack};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;
use xsheet_timeline::{Frame, FrameList, LayerId, OpacityConfig, TimeLine, DEFAULT_COMPOSITE};

/// Signature name of x-sheet files
pub const XDNA_NAME: &str = "xsheet";

/// Current x-sheet revision
pub const XDNA_REVISION: u32 = 3;

/// Extension of the side-car file
pub const XSHEET_EXTENSION: &str = "xsheet";

/// Application name written in the metadata
pub const APPLICATION_NAME: &str = "xsheet_editor";

/// Frame rate assumed when a file does not carry one
pub const DEFAULT_FRAMERATE: f64 = 24.0;

/// Name of layers created for references that point nowhere
pub const PLACEHOLDER_LAYER_NAME: &str = "missing cel";

/// X-sheet errors
#[derive(Debug, Error)]
pub enum XsheetError {
    /// Malformed JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Valid JSON in an unknown layout
    #[error("Unrecognized x-sheet layout: {0}")]
    Format(String),
}

/// Result type for x-sheet operations
pub type Result<T> = std::result::Result<T, XsheetError>;

/// Layout of an x-sheet file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatRevision {
    /// Bare list of `[is_key, description, index]`
    Legacy,
    /// Signed file with list tracks and flat indices
    Rev1,
    /// Signed file with keyed frames and layer paths
    Current,
}

#[derive(Debug, Serialize, Deserialize)]
struct Metadata {
    application: String,
    version: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Signature {
    name: String,
    revision: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct SheetFile<T> {
    #[serde(default = "default_metadata")]
    metadata: Metadata,
    #[serde(rename = "XDNA")]
    xdna: Signature,
    xsheet: SheetBody<T>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SheetBody<T> {
    #[serde(default = "default_framerate")]
    framerate: f64,
    raster_frame_lists: Vec<T>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TrackRecord {
    #[serde(default)]
    name: String,
    #[serde(default = "default_true")]
    visible: bool,
    #[serde(default = "default_opacity")]
    opacity: f32,
    #[serde(default)]
    locked: bool,
    #[serde(default = "default_composite")]
    composite: String,
    #[serde(default)]
    frames: BTreeMap<i64, FrameRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FrameRecord {
    #[serde(default)]
    path: Option<LayerPath>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    idx: Option<usize>,
    #[serde(default)]
    is_key: bool,
    #[serde(default)]
    description: String,
    #[serde(default)]
    skip_visible: bool,
}

#[derive(Debug, Deserialize)]
struct Rev1Record {
    #[serde(default)]
    idx: Option<usize>,
    #[serde(default)]
    is_key: bool,
    #[serde(default)]
    description: String,
}

type LegacyRecord = (bool, String, Option<usize>);

fn default_metadata() -> Metadata {
    Metadata {
        application: APPLICATION_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

fn default_framerate() -> f64 {
    DEFAULT_FRAMERATE
}

fn default_true() -> bool {
    true
}

fn default_opacity() -> f32 {
    1.0
}

fn default_composite() -> String {
    DEFAULT_COMPOSITE.to_string()
}

/// A sheet read back from disk
#[derive(Debug)]
pub struct LoadedSheet {
    /// Rebuilt timeline
    pub timeline: TimeLine,
    /// Stored frame rate
    pub framerate: f64,
    /// Layout the data was found in
    pub revision: FormatRevision,
    /// Layers created for dangling references
    pub placeholders: Vec<LayerId>,
}

/// Work out which layout `value` uses
pub fn detect_revision(value: &Value) -> Result<FormatRevision> {
    match value {
        Value::Array(_) => Ok(FormatRevision::Legacy),
        Value::Object(map) if map.contains_key("XDNA") => {
            let lists = value
                .pointer("/xsheet/raster_frame_lists")
                .and_then(Value::as_array)
                .ok_or_else(|| XsheetError::Format("missing raster_frame_lists".to_string()))?;
            match lists.first() {
                Some(Value::Array(_)) => Ok(FormatRevision::Rev1),
                _ => Ok(FormatRevision::Current),
            }
        }
        _ => Err(XsheetError::Format("expected a list or a signed object".to_string())),
    }
}

/// Resolves stored references against the stack, creating placeholders
struct CelResolver<'a> {
    stack: &'a mut LayerStack,
    flat: Vec<LayerId>,
    placeholders: HashMap<String, LayerId>,
    created: Vec<LayerId>,
}

impl<'a> CelResolver<'a> {
    fn new(stack: &'a mut LayerStack) -> Self {
        let flat = stack.raster_ids();
        Self {
            stack,
            flat,
            placeholders: HashMap::new(),
            created: Vec::new(),
        }
    }

    fn by_index(&mut self, idx: usize) -> LayerId {
        match self.flat.get(idx) {
            Some(id) => *id,
            None => self.placeholder(format!("index {idx}")),
        }
    }

    fn by_path(&mut self, path: &[usize]) -> LayerId {
        match self.stack.deep_get(path).filter(|node| node.is_raster()) {
            Some(node) => node.id,
            None => self.placeholder(format!("path {path:?}")),
        }
    }

    fn placeholder(&mut self, reference: String) -> LayerId {
        if let Some(id) = self.placeholders.get(&reference) {
            return *id;
        }
        let node = self.stack.new_raster(PLACEHOLDER_LAYER_NAME);
        let id = node.id;
        self.stack.append(node);
        tracing::warn!(%reference, layer = %id, "Dangling cel reference, created a placeholder layer");
        self.placeholders.insert(reference, id);
        self.created.push(id);
        id
    }
}

/// Parse x-sheet JSON, resolving cels against `stack`
pub fn read_xsheet(data: &str, stack: &mut LayerStack, opacity: OpacityConfig) -> Result<LoadedSheet> {
    let value: Value = serde_json::from_str(data)?;
    let revision = detect_revision(&value)?;
    let mut resolver = CelResolver::new(stack);

    let (tracks, framerate) = match revision {
        FormatRevision::Legacy => {
            let records: Vec<LegacyRecord> = serde_json::from_value(value)?;
            let mut track = FrameList::default();
            for (i, (is_key, description, idx)) in records.into_iter().enumerate() {
                let frame = Frame {
                    is_key,
                    skip_visible: false,
                    description,
                    cel: idx.map(|idx| resolver.by_index(idx)),
                };
                track.set(i as i64, frame);
            }
            (vec![track], DEFAULT_FRAMERATE)
        }
        FormatRevision::Rev1 => {
            let file: SheetFile<Vec<Rev1Record>> = serde_json::from_value(value)?;
            let tracks = file
                .xsheet
                .raster_frame_lists
                .into_iter()
                .enumerate()
                .map(|(t, records)| {
                    let mut track = FrameList::new(crate::sort::track_letter(t));
                    for (i, record) in records.into_iter().enumerate() {
                        let frame = Frame {
                            is_key: record.is_key,
                            skip_visible: false,
                            description: record.description,
                            cel: record.idx.map(|idx| resolver.by_index(idx)),
                        };
                        track.set(i as i64, frame);
                    }
                    track
                })
                .collect();
            (tracks, file.xsheet.framerate)
        }
        FormatRevision::Current => {
            let file: SheetFile<TrackRecord> = serde_json::from_value(value)?;
            let tracks = file
                .xsheet
                .raster_frame_lists
                .into_iter()
                .map(|record| {
                    let mut track = FrameList::new(record.name);
                    track.visible = record.visible;
                    track.opacity = record.opacity;
                    track.locked = record.locked;
                    track.composite = record.composite;
                    for (n, frame) in record.frames {
                        let cel = match (frame.path, frame.idx) {
                            (Some(path), _) => Some(resolver.by_path(&path)),
                            (None, Some(idx)) => Some(resolver.by_index(idx)),
                            (None, None) => None,
                        };
                        track.set(
                            n,
                            Frame {
                                is_key: frame.is_key,
                                skip_visible: frame.skip_visible,
                                description: frame.description,
                                cel,
                            },
                        );
                    }
                    track
                })
                .collect();
            (tracks, file.xsheet.framerate)
        }
    };

    let placeholders = resolver.created;
    tracing::info!(
        ?revision,
        tracks = tracks.len(),
        placeholders = placeholders.len(),
        "Loaded x-sheet"
    );
    Ok(LoadedSheet {
        timeline: TimeLine::from_layers(tracks, opacity),
        framerate,
        revision,
        placeholders,
    })
}

/// Serialize `timeline` in the current layout
pub fn write_xsheet(timeline: &TimeLine, framerate: f64, stack: &LayerStack) -> Result<String> {
    let tracks = timeline
        .layers()
        .iter()
        .map(|track| TrackRecord {
            name: track.name.clone(),
            visible: track.visible,
            opacity: track.opacity,
            locked: track.locked,
            composite: track.composite.clone(),
            frames: track
                .iter()
                .map(|(n, frame)| {
                    let path = frame.cel.and_then(|cel| {
                        let path = stack.deep_index(cel);
                        if path.is_none() {
                            tracing::warn!(layer = %cel, frame = n, "Cel missing from the layer stack, not saved");
                        }
                        path
                    });
                    (
                        n,
                        FrameRecord {
                            path,
                            idx: None,
                            is_key: frame.is_key,
                            description: frame.description.clone(),
                            skip_visible: frame.skip_visible,
                        },
                    )
                })
                .collect(),
        })
        .collect();

    let file = SheetFile {
        metadata: default_metadata(),
        xdna: Signature {
            name: XDNA_NAME.to_string(),
            revision: XDNA_REVISION,
        },
        xsheet: SheetBody {
            framerate,
            raster_frame_lists: tracks,
        },
    };
    Ok(serde_json::to_string_pretty(&file)?)
}

/// Side-car path of the x-sheet belonging to `document`
pub fn xsheet_path(document: &Path) -> PathBuf {
    document.with_extension(XSHEET_EXTENSION)
}

/// Read the side-car of `document`; `Ok(None)` when there is none
pub fn load_for_document(
    document: &Path,
    stack: &mut LayerStack,
    opacity: OpacityConfig,
) -> Result<Option<LoadedSheet>> {
    let path = xsheet_path(document);
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No x-sheet next to document");
        return Ok(None);
    }
    let data = std::fs::read_to_string(&path)?;
    read_xsheet(&data, stack, opacity).map(Some)
}

/// Write the side-car of `document`
pub fn save_for_document(document: &Path, timeline: &TimeLine, framerate: f64, stack: &LayerStack) -> Result<PathBuf> {
    let path = xsheet_path(document);
    std::fs::write(&path, write_xsheet(timeline, framerate, stack)?)?;
    tracing::info!(path = %path.display(), "Saved x-sheet");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::LayerNode;

    fn stack_of(count: usize) -> (LayerStack, Vec<LayerId>) {
        let nodes: Vec<LayerNode> = (0..count).map(|i| LayerNode::raster(format!("l{i}"), 2, 2)).collect();
        let ids = nodes.iter().map(|n| n.id).collect();
        (LayerStack::from_nodes(2, 2, nodes), ids)
    }

    #[test]
    fn test_detect_revision() {
        let legacy = serde_json::json!([[true, "", 0]]);
        assert_eq!(detect_revision(&legacy).unwrap(), FormatRevision::Legacy);
        let rev1 = serde_json::json!({"XDNA": {"name": "xsheet", "revision": 1},
            "xsheet": {"raster_frame_lists": [[]]}});
        assert_eq!(detect_revision(&rev1).unwrap(), FormatRevision::Rev1);
        let current = serde_json::json!({"XDNA": {"name": "xsheet", "revision": 3},
            "xsheet": {"raster_frame_lists": [{"frames": {}}]}});
        assert_eq!(detect_revision(&current).unwrap(), FormatRevision::Current);
        assert!(detect_revision(&serde_json::json!(3)).is_err());
    }

    #[test]
    fn test_round_trip() {
        let (mut stack, ids) = stack_of(3);
        let mut first = FrameList::new("Pencil");
        first.opacity = 0.5;
        first.set(0, Frame::with_cel(ids[0]));
        let mut key = Frame::with_cel(ids[1]);
        key.is_key = true;
        key.description = "hit".into();
        first.set(3, key);
        let mut second = FrameList::new("Ink");
        let mut skip = Frame::with_cel(ids[2]);
        skip.skip_visible = true;
        second.set(-1, skip);
        second.set(2, Frame::new());
        let timeline = TimeLine::from_layers(vec![first, second], OpacityConfig::default());

        let json = write_xsheet(&timeline, 12.0, &stack).unwrap();
        let loaded = read_xsheet(&json, &mut stack, OpacityConfig::default()).unwrap();

        assert_eq!(loaded.revision, FormatRevision::Current);
        assert_eq!(loaded.framerate, 12.0);
        assert!(loaded.placeholders.is_empty());
        assert_eq!(loaded.timeline.layers(), timeline.layers());
    }

    #[test]
    fn test_current_layout_keys() {
        let (stack, ids) = stack_of(1);
        let mut track = FrameList::new("A");
        track.set(0, Frame::with_cel(ids[0]));
        let timeline = TimeLine::from_layers(vec![track], OpacityConfig::default());
        let value: Value = serde_json::from_str(&write_xsheet(&timeline, 24.0, &stack).unwrap()).unwrap();
        assert_eq!(value["XDNA"]["name"], "xsheet");
        assert_eq!(value["XDNA"]["revision"], 3);
        assert_eq!(value["metadata"]["application"], APPLICATION_NAME);
        assert_eq!(value["xsheet"]["raster_frame_lists"][0]["frames"]["0"]["path"], serde_json::json!([0]));
    }

    #[test]
    fn test_legacy_with_dangling_index() {
        let (mut stack, ids) = stack_of(2);
        let data = r#"[[true, "start", 1], [false, "", null], [true, "", 7], [false, "", 7]]"#;
        let loaded = read_xsheet(data, &mut stack, OpacityConfig::default()).unwrap();

        assert_eq!(loaded.revision, FormatRevision::Legacy);
        let track = loaded.timeline.layer();
        assert_eq!(track.len(), 4);
        assert_eq!(track.peek(0).unwrap().cel, Some(ids[1]));
        assert!(track.peek(0).unwrap().is_key);
        assert_eq!(track.peek(0).unwrap().description, "start");
        assert_eq!(track.peek(1).unwrap().cel, None);

        assert_eq!(loaded.placeholders.len(), 1);
        let placeholder = loaded.placeholders[0];
        assert_eq!(track.peek(2).unwrap().cel, Some(placeholder));
        assert_eq!(track.peek(3).unwrap().cel, Some(placeholder));
        assert_eq!(stack.get(placeholder).unwrap().name, PLACEHOLDER_LAYER_NAME);
    }

    #[test]
    fn test_rev1_lists() {
        let (mut stack, ids) = stack_of(3);
        let data = r#"{
            "XDNA": {"name": "xsheet", "revision": 1},
            "xsheet": {"framerate": 12, "raster_frame_lists": [
                [{"idx": 0, "is_key": true, "description": "a"}, {"idx": null, "is_key": false, "description": ""}, {"idx": 1, "is_key": false, "description": ""}],
                [{"idx": 2, "is_key": false, "description": ""}, {"idx": null, "is_key": false, "description": ""}, {"idx": null, "is_key": true, "description": ""}]
            ]}
        }"#;
        let loaded = read_xsheet(data, &mut stack, OpacityConfig::default()).unwrap();
        assert_eq!(loaded.revision, FormatRevision::Rev1);
        assert_eq!(loaded.framerate, 12.0);
        assert_eq!(loaded.timeline.layer_count(), 2);
        assert_eq!(loaded.timeline.length(), 3);
        assert_eq!(loaded.timeline.layers()[0].cel_at(1), Some(ids[0]));
        assert_eq!(loaded.timeline.layers()[0].cel_at(2), Some(ids[1]));
        assert_eq!(loaded.timeline.layers()[1].cel_at(2), Some(ids[2]));
        assert!(loaded.timeline.layers()[1].peek(2).unwrap().is_key);
    }

    #[test]
    fn test_rev1_with_dangling_index() {
        let (mut stack, ids) = stack_of(1);
        let data = r#"{
            "XDNA": {"name": "xsheet", "revision": 1},
            "xsheet": {"framerate": 24, "raster_frame_lists": [
                [{"idx": 0, "is_key": true, "description": ""}, {"idx": 9, "is_key": false, "description": "lost"}],
                [{"idx": 9, "is_key": false, "description": ""}]
            ]}
        }"#;
        let loaded = read_xsheet(data, &mut stack, OpacityConfig::default()).unwrap();
        assert_eq!(loaded.revision, FormatRevision::Rev1);
        assert_eq!(loaded.placeholders.len(), 1);
        let placeholder = loaded.placeholders[0];
        assert_eq!(stack.raster_count(), 2);
        assert_eq!(stack.get(placeholder).unwrap().name, PLACEHOLDER_LAYER_NAME);

        let first = &loaded.timeline.layers()[0];
        assert_eq!(first.peek(0).unwrap().cel, Some(ids[0]));
        assert_eq!(first.peek(1).unwrap().cel, Some(placeholder));
        assert_eq!(first.peek(1).unwrap().description, "lost");
        assert_eq!(loaded.timeline.layers()[1].peek(0).unwrap().cel, Some(placeholder));
    }

    #[test]
    fn test_dangling_path() {
        let (mut stack, _) = stack_of(1);
        let data = r#"{
            "metadata": {"application": "x", "version": "0"},
            "XDNA": {"name": "xsheet", "revision": 3},
            "xsheet": {"framerate": 24, "raster_frame_lists": [
                {"name": "A", "visible": true, "opacity": 1, "locked": false, "composite": "svg:src-over",
                 "frames": {"0": {"path": [4, 2], "is_key": true, "description": ""}}}
            ]}
        }"#;
        let loaded = read_xsheet(data, &mut stack, OpacityConfig::default()).unwrap();
        assert_eq!(loaded.placeholders.len(), 1);
        assert_eq!(stack.raster_count(), 2);
        assert_eq!(loaded.timeline.layer().peek(0).unwrap().cel, Some(loaded.placeholders[0]));
    }

    #[test]
    fn test_malformed_input() {
        let (mut stack, _) = stack_of(1);
        assert!(matches!(
            read_xsheet("{not json", &mut stack, OpacityConfig::default()),
            Err(XsheetError::Json(_))
        ));
        assert!(matches!(
            read_xsheet(r#"{"foo": 1}"#, &mut stack, OpacityConfig::default()),
            Err(XsheetError::Format(_))
        ));
    }

    #[test]
    fn test_xsheet_path() {
        assert_eq!(xsheet_path(Path::new("/tmp/scene.ora")), PathBuf::from("/tmp/scene.xsheet"));
    }
}
