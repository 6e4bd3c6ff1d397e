use glob::{glob_with, MatchOptions, Pattern};
use indicatif::{ProgressBar, ProgressStyle};
use log::warn;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::types::AUG_MARKER;

/// Create a progress bar with the given length and label
pub fn create_progress_bar(len: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar().template(&format!(
        "{{spinner:.green}} [{}] [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} ({{eta}})",
        label
    )) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// List the images directly inside `dir` whose extension is in `extensions`
/// (case-insensitive), sorted by path.
pub fn collect_images(dir: &Path, extensions: &[String], skip_augmented: bool) -> Vec<PathBuf> {
    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::new()
    };

    let escaped = Pattern::escape(&dir.to_string_lossy());
    let mut found = BTreeSet::new();
    for ext in extensions {
        let pattern = format!("{}/*.{}", escaped, ext);
        match glob_with(&pattern, options) {
            Ok(paths) => found.extend(paths.filter_map(|entry| entry.ok())),
            Err(e) => warn!("Invalid image pattern {}: {}", pattern, e),
        }
    }

    found
        .into_iter()
        .filter(|path| path.is_file())
        .filter(|path| !(skip_augmented && is_augmented(path)))
        .collect()
}

/// Whether the file stem carries the `_aug_<i>` suffix of a generated variant.
pub fn is_augmented(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.rsplit_once(AUG_MARKER))
        .is_some_and(|(_, index)| !index.is_empty() && index.bytes().all(|c| c.is_ascii_digit()))
}

/// Deterministic per-variant seed from the run seed and the variant's identity.
///
/// Seeds depend only on names, never on scheduling, so parallel and
/// sequential runs produce the same variants.
pub fn variant_seed(seed: u64, split: &str, stem: &str, index: usize) -> u64 {
    // 64-bit FNV-1a (offset basis 0xcbf29ce484222325, prime 0x100000001b3)
    // over the identifying parts, then the splitmix64 finalizer from
    // Steele, Lea and Flood, "Fast splittable pseudorandom number generators"
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325 ^ seed;
    let sep: &[u8] = &[0xff];
    for part in [split.as_bytes(), sep, stem.as_bytes(), sep] {
        for &byte in part {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
    }
    hash ^= index as u64;
    hash = hash.wrapping_mul(0x0000_0100_0000_01b3);

    let mut z = hash.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
