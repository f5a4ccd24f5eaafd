// SPDX-License-Identifier: MIT OR Apache-2.0
//! `xsheet` - inspect the exposure sheet stored next to a document.
//!
//! Usage: `xsheet <document> [settings.ron]`
//!
//! Loads the side-car sheet with an empty layer stack of the configured
//! canvas size and prints one row per frame.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use xsheet_editor::{xsheet, Animation, AnimationError, AnimationSettings, LayerStack};
use xsheet_timeline::Frame;

fn main() -> ExitCode {
    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "xsheet_editor=debug".parse() {
        env_filter = env_filter.add_directive(directive);
    }
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args_os().skip(1).map(PathBuf::from);
    let Some(document) = args.next() else {
        eprintln!("usage: xsheet <document> [settings.ron]");
        return ExitCode::from(2);
    };
    let settings_path = args.next();

    match run(&document, settings_path.as_deref()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(document: &Path, settings_path: Option<&Path>) -> Result<(), AnimationError> {
    let settings = match settings_path {
        Some(path) => AnimationSettings::load(path)?,
        None => AnimationSettings::default(),
    };
    let (width, height) = settings.canvas_size;
    let mut animation = Animation::new(LayerStack::from_nodes(width, height, Vec::new()), &settings);

    if !animation.load_xsheet(document)? {
        tracing::info!(path = %xsheet::xsheet_path(document).display(), "No x-sheet found");
        return Ok(());
    }

    let timeline = animation.timeline();
    tracing::info!(
        tracks = timeline.layer_count(),
        frames = timeline.length(),
        framerate = animation.framerate(),
        "X-sheet summary"
    );

    let header: Vec<&str> = timeline.layers().iter().map(|track| track.name.as_str()).collect();
    println!("frame | {}", header.join(" | "));
    for (n, cells) in timeline.exposure_matrix() {
        let row: Vec<String> = cells.into_iter().map(cell_label).collect();
        println!("{:>5} | {}", n + 1, row.join(" | "));
    }
    Ok(())
}

fn cell_label(frame: Option<&Frame>) -> String {
    let Some(frame) = frame else {
        return String::new();
    };
    let mut label = String::new();
    if frame.is_key {
        label.push('K');
    }
    if frame.skip_visible {
        label.push('S');
    }
    if frame.has_cel() {
        label.push('*');
    }
    if !frame.description.is_empty() {
        label.push(' ');
        label.push_str(&frame.description);
    }
    label
}
