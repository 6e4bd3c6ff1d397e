use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::path::Path;

use crate::config::AugmentConfig;
use crate::error::AugmentError;
use crate::geometry::sanitize;
use crate::io::write_variant;
use crate::labels::load_labels;
use crate::types::{AugmentReport, Sample, SplitDirs, SplitStats};
use crate::utils::{collect_images, create_progress_bar, variant_seed};

/// Augment every configured split in order.
///
/// Data problems (undecodable images, malformed label lines, samples without
/// valid boxes, rejected variants) are logged and counted. A failure to write
/// an output stops the run and is returned.
pub fn augment_dataset(config: &AugmentConfig) -> Result<AugmentReport, AugmentError> {
    config.validate()?;
    let pool = ThreadPoolBuilder::new()
        .num_threads(config.workers)
        .build()?;

    info!("Starting data augmentation...");
    let mut report = AugmentReport::default();
    for name in &config.splits {
        let split = SplitDirs::new(&config.dataset_root, name);
        let stats = pool.install(|| process_split(&split, config))?;
        info!("Finished {}: created {} new images.", name, stats.variants_created);
        stats.print_summary(name);
        report.splits.push((name.clone(), stats));
    }

    info!(
        "Augmentation complete: {} new images across {} splits.",
        report.total_variants(),
        report.splits.len()
    );
    Ok(report)
}

/// Augment all images of one split. Samples are processed in parallel on the
/// current rayon pool; their counters are summed once all of them finish.
pub fn process_split(split: &SplitDirs, config: &AugmentConfig) -> Result<SplitStats, AugmentError> {
    if !split.images_dir.is_dir() {
        warn!(
            "Split '{}' has no image directory at {}, skipping it.",
            split.name,
            split.images_dir.display()
        );
        return Ok(SplitStats::new());
    }

    let images = collect_images(&split.images_dir, &config.image_exts, config.skip_augmented);
    info!(
        "Processing {}: found {} original images.",
        split.name,
        images.len()
    );

    let pb = create_progress_bar(images.len() as u64, &split.name);
    let per_sample: Result<Vec<SplitStats>, AugmentError> = images
        .par_iter()
        .map(|image_path| {
            let result = process_image(image_path, split, config);
            pb.inc(1);
            result
        })
        .collect();
    pb.finish_and_clear();

    let mut stats: SplitStats = per_sample?.into_iter().sum();
    stats.images_found = images.len();
    Ok(stats)
}

/// Sanitize, augment and write the variants of a single image.
pub fn process_image(
    image_path: &Path,
    split: &SplitDirs,
    config: &AugmentConfig,
) -> Result<SplitStats, AugmentError> {
    let mut stats = SplitStats::new();
    let stem = image_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let source_ext = image_path
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let label_path = split
        .labels_dir
        .join(format!("{}.{}", stem, config.label_ext));
    let labels = match load_labels(Some(&label_path)) {
        Ok(labels) => labels,
        Err(source) => {
            let e = AugmentError::LabelRead {
                path: label_path,
                source,
            };
            warn!("Skipping {}: {}", image_path.display(), e);
            stats.skipped_label_read += 1;
            return Ok(stats);
        }
    };
    stats.label_parse_errors += labels.errors.len();

    if labels.boxes.is_empty() {
        debug!("Skipping {}: no valid boxes", image_path.display());
        stats.skipped_empty += 1;
        return Ok(stats);
    }

    let image = match image::open(image_path) {
        Ok(image) => image.to_rgb8(),
        Err(source) => {
            let e = AugmentError::Decode {
                path: image_path.to_path_buf(),
                source,
            };
            warn!("Skipping {}", e);
            stats.skipped_decode += 1;
            return Ok(stats);
        }
    };

    let sample = Sample {
        image,
        boxes: labels.boxes,
    };
    stats.eligible_samples += 1;

    for index in 0..config.variants {
        let mut rng = StdRng::seed_from_u64(variant_seed(config.seed, &split.name, &stem, index));
        let mut variant = match config.transform.apply(&sample, &mut rng) {
            Ok(variant) => variant,
            Err(e) => {
                warn!(
                    "Discarding variant {} of {}: {}",
                    index,
                    image_path.display(),
                    e
                );
                stats.transform_failures += 1;
                continue;
            }
        };

        variant.boxes = sanitize(&variant.boxes);
        if variant.boxes.is_empty() {
            debug!(
                "Discarding variant {} of {}: no boxes left",
                index,
                image_path.display()
            );
            stats.discarded_empty_variants += 1;
            continue;
        }

        let written = write_variant(
            &variant,
            split,
            &stem,
            index,
            &source_ext,
            config.image_format,
            &config.label_ext,
        )?;
        debug!(
            "Wrote {} ({} boxes)",
            written.image_path.display(),
            variant.boxes.len()
        );
        stats.variants_created += 1;
    }

    Ok(stats)
}
