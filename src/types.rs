use image::RgbImage;
use std::ops::{Add, AddAssign};
use std::path::{Path, PathBuf};

// Image extensions enumerated when none are configured
pub const IMG_FORMATS: &[&str] = &["jpg", "png"];

// Extension of YOLO label files
pub const LABEL_EXTENSION: &str = "txt";

// Marker inserted between the source stem and the variant index
pub const AUG_MARKER: &str = "_aug_";

/// A YOLO box: class id plus center and extent as fractions of the image size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnotatedBox {
    pub class_id: u32,
    pub cx: f64,
    pub cy: f64,
    pub w: f64,
    pub h: f64,
}

impl AnnotatedBox {
    pub fn new(class_id: u32, cx: f64, cy: f64, w: f64, h: f64) -> Self {
        Self {
            class_id,
            cx,
            cy,
            w,
            h,
        }
    }

    /// Corners `(x_min, y_min, x_max, y_max)` in pixels for an image of the given size.
    pub fn to_pixel_corners(&self, width: u32, height: u32) -> (f64, f64, f64, f64) {
        let (w_img, h_img) = (width as f64, height as f64);
        let half_w = self.w * w_img / 2.0;
        let half_h = self.h * h_img / 2.0;
        let cx = self.cx * w_img;
        let cy = self.cy * h_img;
        (cx - half_w, cy - half_h, cx + half_w, cy + half_h)
    }

    /// Build a normalized box back from pixel corners.
    pub fn from_pixel_corners(
        class_id: u32,
        (x_min, y_min, x_max, y_max): (f64, f64, f64, f64),
        width: u32,
        height: u32,
    ) -> Self {
        let (w_img, h_img) = (width as f64, height as f64);
        Self {
            class_id,
            cx: (x_min + x_max) / 2.0 / w_img,
            cy: (y_min + y_max) / 2.0 / h_img,
            w: (x_max - x_min) / w_img,
            h: (y_max - y_min) / h_img,
        }
    }
}

/// A decoded image and its sanitized boxes. Never mutated once loaded.
#[derive(Debug, Clone)]
pub struct Sample {
    pub image: RgbImage,
    pub boxes: Vec<AnnotatedBox>,
}

/// One independently transformed copy of a [`Sample`].
#[derive(Debug, Clone)]
pub struct AugmentedVariant {
    pub image: RgbImage,
    pub boxes: Vec<AnnotatedBox>,
}

// Paths of one split: <root>/<name>/images and <root>/<name>/labels
#[derive(Debug, Clone)]
pub struct SplitDirs {
    pub name: String,
    pub images_dir: PathBuf,
    pub labels_dir: PathBuf,
}

impl SplitDirs {
    pub fn new(root: &Path, name: &str) -> Self {
        let split_root = root.join(name);
        Self {
            name: name.to_string(),
            images_dir: split_root.join("images"),
            labels_dir: split_root.join("labels"),
        }
    }
}

// Counters for one split; per-sample stats are summed after processing
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SplitStats {
    pub images_found: usize,
    pub eligible_samples: usize,
    pub skipped_decode: usize,
    pub skipped_label_read: usize,
    pub skipped_empty: usize,
    pub label_parse_errors: usize,
    pub transform_failures: usize,
    pub discarded_empty_variants: usize,
    pub variants_created: usize,
}

impl SplitStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn print_summary(&self, split: &str) {
        log::info!("=== Split '{}' ===", split);
        log::info!("Images found: {}", self.images_found);
        log::info!("Eligible samples: {}", self.eligible_samples);
        log::info!("Variants created: {}", self.variants_created);

        let skipped = self.skipped_decode + self.skipped_label_read + self.skipped_empty;
        if skipped > 0 {
            log::info!(
                "Skipped samples: {} (undecodable image: {}, unreadable labels: {}, no valid boxes: {})",
                skipped,
                self.skipped_decode,
                self.skipped_label_read,
                self.skipped_empty
            );
        }
        if self.label_parse_errors > 0 {
            log::warn!("Malformed label lines skipped: {}", self.label_parse_errors);
        }
        if self.transform_failures + self.discarded_empty_variants > 0 {
            log::warn!(
                "Variants discarded: {} (transform failure: {}, no boxes left: {})",
                self.transform_failures + self.discarded_empty_variants,
                self.transform_failures,
                self.discarded_empty_variants
            );
        }
    }
}

impl AddAssign for SplitStats {
    fn add_assign(&mut self, other: Self) {
        self.images_found += other.images_found;
        self.eligible_samples += other.eligible_samples;
        self.skipped_decode += other.skipped_decode;
        self.skipped_label_read += other.skipped_label_read;
        self.skipped_empty += other.skipped_empty;
        self.label_parse_errors += other.label_parse_errors;
        self.transform_failures += other.transform_failures;
        self.discarded_empty_variants += other.discarded_empty_variants;
        self.variants_created += other.variants_created;
    }
}

impl Add for SplitStats {
    type Output = Self;

    fn add(mut self, other: Self) -> Self {
        self += other;
        self
    }
}

impl std::iter::Sum for SplitStats {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Result of a whole run, one entry per configured split in order.
#[derive(Debug, Default, Clone)]
pub struct AugmentReport {
    pub splits: Vec<(String, SplitStats)>,
}

impl AugmentReport {
    pub fn total_variants(&self) -> usize {
        self.splits.iter().map(|(_, s)| s.variants_created).sum()
    }

    pub fn get(&self, split: &str) -> Option<&SplitStats> {
        self.splits
            .iter()
            .find(|(name, _)| name == split)
            .map(|(_, stats)| stats)
    }
}
