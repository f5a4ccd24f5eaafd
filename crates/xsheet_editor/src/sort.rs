// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reorder the layer stack to mirror the timeline.
//!
//! Root slot 0 collects layers no frame refers to (when there are any); each
//! track then gets one root group holding its cels in frame order. Layers
//! are relocated through a placeholder swap until every one sits at its
//! target path.

use crate::layers::{LayerNode, LayerPath, LayerStack, LayerStackError};
use std::collections::HashSet;
use xsheet_timeline::{LayerId, TimeLine};

/// Name of the group holding layers without a frame
pub const UNANIMATED_GROUP_NAME: &str = "unanimated";

const PLACEHOLDER_NAME: &str = "placeholder";

/// What a sort pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortReport {
    /// Layers moved at least once
    pub moved: usize,
    /// Relocation passes run
    pub passes: usize,
    /// Whether every layer reached its target
    pub converged: bool,
    /// Layers and groups renamed
    pub renamed: usize,
    /// Empty groups dropped
    pub pruned: usize,
}

/// Spreadsheet-style column letter: 0 is `A`, 25 is `Z`, 26 is `AA`
pub fn track_letter(track: usize) -> String {
    let mut n = track + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Layer name for the cel first shown at `frame` of `track`: `A001 walk`
pub fn generate_layername(track: usize, frame: i64, description: &str) -> String {
    let mut name = format!("{}{:03}", track_letter(track), frame + 1);
    if !description.is_empty() {
        name.push(' ');
        name.push_str(description);
    }
    name
}

fn group_name(timeline: &TimeLine, track: usize) -> String {
    match timeline.layers().get(track) {
        Some(layer) if !layer.name.is_empty() => layer.name.clone(),
        _ => track_letter(track),
    }
}

#[derive(Debug)]
struct Target {
    id: LayerId,
    path: LayerPath,
    position: Option<(usize, i64)>,
}

fn targets(timeline: &TimeLine, stack: &LayerStack) -> (Vec<Target>, usize) {
    let rasters = stack.raster_ids();
    let mut placed: HashSet<LayerId> = HashSet::new();
    let mut animated = Vec::new();
    for (track, layer) in timeline.layers().iter().enumerate() {
        let mut slot = 0;
        for cel in layer.all_cels() {
            if !rasters.contains(&cel) || !placed.insert(cel) {
                continue;
            }
            let frame = layer.index_of(cel).unwrap_or_default();
            animated.push((cel, track, slot, frame));
            slot += 1;
        }
    }

    let unanimated: Vec<LayerId> = rasters.into_iter().filter(|id| !placed.contains(id)).collect();
    let offset = usize::from(!unanimated.is_empty());

    let mut out: Vec<Target> = unanimated
        .into_iter()
        .enumerate()
        .map(|(j, id)| Target {
            id,
            path: vec![0, j],
            position: None,
        })
        .collect();
    out.extend(animated.into_iter().map(|(id, track, slot, frame)| Target {
        id,
        path: vec![track + offset, slot],
        position: Some((track, frame)),
    }));
    (out, offset)
}

fn relocate(stack: &mut LayerStack, id: LayerId, target: &[usize]) -> bool {
    let Some(from) = stack.deep_index(id) else {
        return false;
    };
    let placeholder = LayerNode::group(PLACEHOLDER_NAME);
    let placeholder_id = placeholder.id;
    let Some(node) = stack.replace(&from, placeholder) else {
        return false;
    };
    let inserted = stack.deep_insert(target, node);
    if let Some(path) = stack.deep_index(placeholder_id) {
        stack.deep_pop(&path);
    }
    inserted.is_ok()
}

/// Regroup and rename the stack after the timeline.
///
/// The selected layer stays selected. When the layout does not settle within
/// `targets + 2` passes the reorder is abandoned with a warning.
pub fn sort_layers(timeline: &TimeLine, stack: &mut LayerStack) -> Result<SortReport, LayerStackError> {
    let selected = stack.current_layer().map(|node| node.id);
    let (targets, offset) = targets(timeline, stack);
    let slots = offset + timeline.layer_count();
    let mut report = SortReport::default();

    let mut managed = Vec::with_capacity(slots);
    for slot in 0..slots {
        let is_group = stack.root().get(slot).map_or(false, LayerNode::is_group);
        if !is_group {
            let name = if slot < offset {
                UNANIMATED_GROUP_NAME.to_string()
            } else {
                group_name(timeline, slot - offset)
            };
            stack.deep_insert(&[slot], LayerNode::group(name))?;
        }
        if let Some(group) = stack.root().get(slot) {
            managed.push(group.id);
        }
    }

    let cap = targets.len() + 2;
    let mut moved: HashSet<LayerId> = HashSet::new();
    while report.passes < cap {
        report.passes += 1;
        let mut changed = false;
        for target in &targets {
            if stack.deep_index(target.id).as_deref() == Some(target.path.as_slice()) {
                continue;
            }
            if relocate(stack, target.id, &target.path) {
                moved.insert(target.id);
                changed = true;
            }
        }
        if !changed {
            report.converged = true;
            break;
        }
    }
    report.moved = moved.len();

    if !report.converged {
        tracing::warn!(passes = report.passes, "Layer sort did not settle, aborting reorder");
        restore_selection(stack, selected);
        return Ok(report);
    }

    for target in &targets {
        let Some((track, frame)) = target.position else {
            continue;
        };
        let description = timeline
            .layers()
            .get(track)
            .and_then(|layer| layer.peek(frame))
            .map(|f| f.description.as_str())
            .unwrap_or_default();
        let name = generate_layername(track, frame, description);
        if let Some(node) = stack.get_mut(target.id) {
            if node.name != name {
                node.name = name;
                report.renamed += 1;
            }
        }
    }
    for slot in 0..slots {
        let name = if slot < offset {
            UNANIMATED_GROUP_NAME.to_string()
        } else {
            group_name(timeline, slot - offset)
        };
        if let Some(group) = stack.deep_get_mut(&[slot]) {
            if group.name != name {
                group.name = name;
                report.renamed += 1;
            }
        }
    }

    report.pruned = stack.prune_empty_groups(&managed);
    restore_selection(stack, selected);
    tracing::debug!(
        moved = report.moved,
        passes = report.passes,
        renamed = report.renamed,
        "Sorted layers"
    );
    Ok(report)
}

fn restore_selection(stack: &mut LayerStack, selected: Option<LayerId>) {
    if let Some(path) = selected.and_then(|id| stack.deep_index(id)) {
        stack.set_current_path(&path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xsheet_timeline::{Frame, FrameList, OpacityConfig};

    #[test]
    fn test_track_letter() {
        assert_eq!(track_letter(0), "A");
        assert_eq!(track_letter(25), "Z");
        assert_eq!(track_letter(26), "AA");
        assert_eq!(track_letter(27), "AB");
        assert_eq!(track_letter(701), "ZZ");
        assert_eq!(track_letter(702), "AAA");
    }

    #[test]
    fn test_generate_layername() {
        assert_eq!(generate_layername(0, 0, ""), "A001");
        assert_eq!(generate_layername(1, 11, "run"), "B012 run");
    }

    fn two_track_sheet() -> (TimeLine, LayerStack, [LayerId; 4]) {
        let nodes: Vec<LayerNode> = ["x", "a1", "b1", "a2"]
            .iter()
            .map(|name| LayerNode::raster(*name, 4, 4))
            .collect();
        let ids = [nodes[0].id, nodes[1].id, nodes[2].id, nodes[3].id];

        let mut first = FrameList::new("");
        first.set(0, Frame::with_cel(ids[1]));
        let mut second = Frame::with_cel(ids[3]);
        second.description = "walk".into();
        first.set(4, second);
        let mut other = FrameList::new("Ink");
        other.set(0, Frame::with_cel(ids[2]));

        let timeline = TimeLine::from_layers(vec![first, other], OpacityConfig::default());
        (timeline, LayerStack::from_nodes(4, 4, nodes), ids)
    }

    #[test]
    fn test_sort_groups_by_track() {
        let (timeline, mut stack, [x, a1, b1, a2]) = two_track_sheet();
        stack.set_current_path(&[2]);

        let report = sort_layers(&timeline, &mut stack).unwrap();
        assert!(report.converged);

        assert_eq!(stack.deep_index(x), Some(vec![0, 0]));
        assert_eq!(stack.deep_index(a1), Some(vec![1, 0]));
        assert_eq!(stack.deep_index(a2), Some(vec![1, 1]));
        assert_eq!(stack.deep_index(b1), Some(vec![2, 0]));
        assert_eq!(stack.root().len(), 3);

        assert_eq!(stack.deep_get(&[0]).unwrap().name, UNANIMATED_GROUP_NAME);
        assert_eq!(stack.deep_get(&[1]).unwrap().name, "A");
        assert_eq!(stack.deep_get(&[2]).unwrap().name, "Ink");
        assert_eq!(stack.get(a1).unwrap().name, "A001");
        assert_eq!(stack.get(a2).unwrap().name, "A005 walk");
        assert_eq!(stack.get(b1).unwrap().name, "B001");

        assert_eq!(stack.current_layer().unwrap().id, b1);
    }

    #[test]
    fn test_sort_is_idempotent() {
        let (timeline, mut stack, _) = two_track_sheet();
        sort_layers(&timeline, &mut stack).unwrap();
        let layout = stack.arrangement();
        let report = sort_layers(&timeline, &mut stack).unwrap();
        assert_eq!(report.moved, 0);
        assert_eq!(report.renamed, 0);
        assert_eq!(stack.arrangement(), layout);
    }

    #[test]
    fn test_sort_without_unanimated_layers() {
        let (mut timeline, mut stack, [x, ..]) = two_track_sheet();
        timeline.get_layer_mut(1).unwrap().set(1, Frame::with_cel(x));
        sort_layers(&timeline, &mut stack).unwrap();
        assert_eq!(stack.root().len(), 2);
        assert_eq!(stack.deep_index(x), Some(vec![1, 1]));
    }

    fn single_track(cels: &[LayerId]) -> TimeLine {
        let mut track = FrameList::new("");
        for (frame, cel) in (0..).zip(cels) {
            track.set(frame, Frame::with_cel(*cel));
        }
        TimeLine::from_layers(vec![track], OpacityConfig::default())
    }

    #[test]
    fn test_sort_reverses_order_within_group() {
        let nodes: Vec<LayerNode> = ["c1", "c2", "c3", "c4"]
            .iter()
            .map(|name| LayerNode::raster(*name, 4, 4))
            .collect();
        let ids: Vec<LayerId> = nodes.iter().map(|node| node.id).collect();
        let mut stack = LayerStack::from_nodes(4, 4, nodes);
        sort_layers(&single_track(&ids), &mut stack).unwrap();
        assert_eq!(stack.deep_index(ids[0]), Some(vec![0, 0]));

        let reversed: Vec<LayerId> = ids.iter().rev().copied().collect();
        let report = sort_layers(&single_track(&reversed), &mut stack).unwrap();
        assert!(report.converged);
        assert!(report.passes <= reversed.len() + 2);
        assert_eq!(report.moved, 3);
        for (idx, id) in reversed.iter().enumerate() {
            assert_eq!(stack.deep_index(*id), Some(vec![0, idx]));
        }
        assert_eq!(stack.get(ids[3]).unwrap().name, "A001");
        assert_eq!(stack.get(ids[0]).unwrap().name, "A004");
    }
}
