//! Best-effort image optimisation
//!
//! Every matched image ends up in the output tree. The optimised bytes are
//! used only when the optimiser succeeded and actually saved space.

use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::command;
use crate::config::IMAGE_EXTENSIONS;
use crate::error::Result;
use crate::task::{BuildContext, Task, TaskOutcome};
use crate::tasks::{build_globset, collect_files, extension_glob, write_file};

pub async fn run(ctx: &BuildContext) -> Result<TaskOutcome> {
    let source = ctx.config.source_path("img");
    let output = ctx.config.output_path("img");
    let globs = build_globset(&[extension_glob(IMAGE_EXTENSIONS)])?;
    let png_level = ctx.config.images.png_level;

    let mut outcome = TaskOutcome::default();
    let mut saved = 0usize;

    for rel in collect_files(&source, &globs) {
        let src_path = source.join(&rel);
        let original = match tokio::fs::read(&src_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                ctx.report(Task::Images, &mut outcome, &src_path, e.to_string());
                continue;
            }
        };

        let optimized = optimize(&src_path, &original, png_level).await;
        let bytes = match optimized {
            Some(smaller) if smaller.len() < original.len() => {
                saved += original.len() - smaller.len();
                smaller
            }
            _ => original,
        };

        match write_file(&output.join(&rel), &bytes).await {
            Ok(()) => outcome.written.push(Path::new("img").join(&rel)),
            Err(e) => ctx.report(Task::Images, &mut outcome, &src_path, e.to_string()),
        }
    }

    tracing::debug!(files = outcome.written.len(), saved_bytes = saved, "images written");
    Ok(outcome)
}

/// Optimised bytes, or `None` when the format's optimiser is unavailable or
/// failed
async fn optimize(path: &Path, data: &[u8], png_level: u8) -> Option<Vec<u8>> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    let result = match ext.as_str() {
        "png" => {
            let data = data.to_vec();
            tokio::task::spawn_blocking(move || optimize_png(&data, png_level))
                .await
                .map_err(|e| e.to_string())
                .and_then(|r| r)
        }
        "jpg" => optimize_jpeg(path).await,
        "svg" => std::str::from_utf8(data)
            .map_err(|e| e.to_string())
            .and_then(optimize_svg)
            .map(String::into_bytes),
        _ => return None,
    };

    match result {
        Ok(bytes) => Some(bytes),
        Err(message) => {
            tracing::debug!(path = %path.display(), %message, "optimisation skipped");
            None
        }
    }
}

/// Lossless PNG recompression
fn optimize_png(data: &[u8], level: u8) -> std::result::Result<Vec<u8>, String> {
    let options = oxipng::Options::from_preset(level);
    oxipng::optimize_from_memory(data, &options).map_err(|e| e.to_string())
}

/// Progressive, metadata-free JPEG via `jpegtran`, when installed
async fn optimize_jpeg(path: &Path) -> std::result::Result<Vec<u8>, String> {
    if command::find_program("jpegtran").is_none() {
        return Err("jpegtran not installed".to_string());
    }

    let file = path.to_string_lossy();
    let cwd = path.parent().unwrap_or(Path::new("."));
    command::run(
        "jpegtran",
        &["-copy", "none", "-optimize", "-progressive", file.as_ref()],
        cwd,
    )
    .await
    .map_err(|e| e.to_string())
}

/// Elements removed together with their children
fn is_dropped_element(name: &[u8]) -> bool {
    name == b"metadata" || is_editor_name(name)
}

fn is_editor_name(name: &[u8]) -> bool {
    const PREFIXES: &[&[u8]] = &[
        b"inkscape:",
        b"sodipodi:",
        b"xmlns:inkscape",
        b"xmlns:sodipodi",
    ];
    PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Copy of a start tag without editor attributes. Other attributes,
/// `viewBox` and colour values included, are written back untouched.
fn strip_editor_attributes(tag: &BytesStart) -> std::result::Result<BytesStart<'static>, String> {
    let name = String::from_utf8_lossy(tag.name().as_ref()).into_owned();
    let mut out = BytesStart::new(name);
    for attr in tag.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        if !is_editor_name(attr.key.as_ref()) {
            out.push_attribute(attr);
        }
    }
    Ok(out)
}

/// Drop comments, declarations, doctype, metadata and editor cruft, and
/// whitespace between tags
pub fn optimize_svg(src: &str) -> std::result::Result<String, String> {
    let mut reader = Reader::from_str(src);
    reader.config_mut().trim_text(true);
    let mut writer = Writer::new(Vec::with_capacity(src.len()));
    let mut skip_depth = 0usize;

    loop {
        let event = reader.read_event().map_err(|e| e.to_string())?;
        let kept = match event {
            Event::Eof => break,
            Event::Comment(_) | Event::DocType(_) | Event::PI(_) | Event::Decl(_) => None,
            Event::Start(tag) => {
                if skip_depth > 0 || is_dropped_element(tag.name().as_ref()) {
                    skip_depth += 1;
                    None
                } else {
                    Some(Event::Start(strip_editor_attributes(&tag)?))
                }
            }
            Event::End(tag) => {
                if skip_depth > 0 {
                    skip_depth -= 1;
                    None
                } else {
                    Some(Event::End(tag))
                }
            }
            Event::Empty(tag) => {
                if skip_depth > 0 || is_dropped_element(tag.name().as_ref()) {
                    None
                } else {
                    Some(Event::Empty(strip_editor_attributes(&tag)?))
                }
            }
            other if skip_depth == 0 => Some(other),
            _ => None,
        };

        if let Some(event) = kept {
            writer.write_event(event).map_err(|e| e.to_string())?;
        }
    }

    String::from_utf8(writer.into_inner()).map_err(|e| e.to_string())
}
