//! Reading and writing YOLO label files.

use log::warn;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

use crate::error::LabelParseError;
use crate::geometry::{clip, is_valid};
use crate::types::AnnotatedBox;

/// Boxes that survived parsing and sanitization, plus the lines that did not parse.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LoadedLabels {
    pub boxes: Vec<AnnotatedBox>,
    pub errors: Vec<LabelParseError>,
}

/// Parse one `<class_id> <cx> <cy> <w> <h>` line. `line` is 1-based, used in errors.
pub fn parse_label_line(line: usize, text: &str) -> Result<AnnotatedBox, LabelParseError> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() != 5 {
        return Err(LabelParseError::WrongTokenCount {
            line,
            found: tokens.len(),
        });
    }

    let class_id = tokens[0]
        .parse::<u32>()
        .map_err(|_| LabelParseError::InvalidClassId {
            line,
            token: tokens[0].to_string(),
        })?;

    let mut coords = [0.0f64; 4];
    for (slot, token) in coords.iter_mut().zip(&tokens[1..]) {
        let value = token
            .parse::<f64>()
            .map_err(|_| LabelParseError::InvalidCoordinate {
                line,
                token: token.to_string(),
            })?;
        if !value.is_finite() {
            return Err(LabelParseError::NonFinite {
                line,
                token: token.to_string(),
            });
        }
        *slot = value;
    }

    Ok(AnnotatedBox::new(
        class_id, coords[0], coords[1], coords[2], coords[3],
    ))
}

/// Parse label file contents, skipping blank and malformed lines.
///
/// Each parsed box is clipped right away; boxes left without area are dropped.
pub fn parse_labels(content: &str) -> LoadedLabels {
    let mut loaded = LoadedLabels::default();

    for (idx, text) in content.lines().enumerate() {
        if text.trim().is_empty() {
            continue;
        }
        match parse_label_line(idx + 1, text) {
            Ok(raw) => {
                let clipped = clip(&raw);
                if is_valid(&clipped) {
                    loaded.boxes.push(clipped);
                }
            }
            Err(e) => loaded.errors.push(e),
        }
    }

    loaded
}

/// Load and sanitize the label file at `path`.
///
/// A missing path or missing file means the image has no boxes.
pub fn load_labels(path: Option<&Path>) -> io::Result<LoadedLabels> {
    let Some(path) = path else {
        return Ok(LoadedLabels::default());
    };

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LoadedLabels::default()),
        Err(e) => return Err(e),
    };

    let loaded = parse_labels(&content);
    for e in &loaded.errors {
        warn!("Skipping malformed label ({}): {}", path.display(), e);
    }
    Ok(loaded)
}

/// Render boxes as label file contents, clipping each one first.
pub fn format_labels(boxes: &[AnnotatedBox]) -> String {
    let mut out = String::with_capacity(boxes.len() * 48);
    for b in boxes.iter().map(clip) {
        // Writing to a String cannot fail
        let _ = writeln!(
            out,
            "{} {:.6} {:.6} {:.6} {:.6}",
            b.class_id, b.cx, b.cy, b.w, b.h
        );
    }
    out
}
