use image::ImageFormat;
use log::warn;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::OutputImageFormat;
use crate::error::AugmentError;
use crate::labels::format_labels;
use crate::types::{AugmentedVariant, SplitDirs, AUG_MARKER};

/// Output base name for variant `index` of the image with stem `stem`.
pub fn variant_base_name(stem: &str, index: usize) -> String {
    format!("{}{}{}", stem, AUG_MARKER, index)
}

/// Paths written for one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenVariant {
    pub image_path: PathBuf,
    pub label_path: PathBuf,
}

/// Persist an accepted variant next to the originals of its split.
///
/// The image keeps `source_ext` unless `format` overrides it. Existing files
/// with the same name are overwritten. Both files are written under temporary
/// names first and renamed into place label first, so a failure never leaves
/// an image without its label.
pub fn write_variant(
    variant: &AugmentedVariant,
    split: &SplitDirs,
    stem: &str,
    index: usize,
    source_ext: &str,
    format: OutputImageFormat,
    label_ext: &str,
) -> Result<WrittenVariant, AugmentError> {
    let base_name = variant_base_name(stem, index);
    let image_ext = format.extension().unwrap_or(source_ext);

    let image_path = split.images_dir.join(format!("{}.{}", base_name, image_ext));
    let label_path = split.labels_dir.join(format!("{}.{}", base_name, label_ext));
    let image_tmp = temp_path(&image_path);
    let label_tmp = temp_path(&label_path);

    let staged = save_image(variant, &image_path, &image_tmp)
        .and_then(|_| write_label_file(&label_tmp, variant));
    if let Err(e) = staged {
        discard(&[&image_tmp, &label_tmp]);
        return Err(e);
    }

    if let Err(e) = fs::rename(&label_tmp, &label_path) {
        discard(&[&image_tmp, &label_tmp]);
        return Err(AugmentError::write(&label_path, e));
    }
    if let Err(e) = fs::rename(&image_tmp, &image_path) {
        discard(&[&image_tmp, &label_path]);
        return Err(AugmentError::write(&image_path, e));
    }

    Ok(WrittenVariant {
        image_path,
        label_path,
    })
}

/// Hidden sibling of `path` used while a file is being written.
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}

fn discard(paths: &[&Path]) {
    for path in paths {
        if let Err(e) = fs::remove_file(path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }
}

/// Encode `variant.image` in the format implied by `path`, writing it to `tmp`.
fn save_image(variant: &AugmentedVariant, path: &Path, tmp: &Path) -> Result<(), AugmentError> {
    let format = ImageFormat::from_path(path).map_err(|e| AugmentError::write(path, e))?;
    variant
        .image
        .save_with_format(tmp, format)
        .map_err(|e| AugmentError::write(path, e))
}

fn write_label_file(path: &Path, variant: &AugmentedVariant) -> Result<(), AugmentError> {
    let file = File::create(path).map_err(|e| AugmentError::write(path, e))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(format_labels(&variant.boxes).as_bytes())
        .and_then(|_| writer.flush())
        .map_err(|e| AugmentError::write(path, e))
}
