use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::transforms::TransformSpec;
use crate::types::{IMG_FORMATS, LABEL_EXTENSION};

/// Command-line arguments for augmenting a YOLO dataset in place.
#[derive(Parser, Debug, Clone)]
#[command(version, long_about = None)]
pub struct Args {
    /// Dataset root containing one directory per split, each with images/ and labels/
    #[arg(short = 'd', long = "dataset_root")]
    pub dataset_root: PathBuf,

    /// Splits to augment
    #[arg(long = "splits", value_delimiter = ',', default_value = "train,valid")]
    pub splits: Vec<String>,

    /// Number of augmented variants drawn per image
    #[arg(long = "variants", default_value_t = 2, value_parser = validate_variants)]
    pub variants: usize,

    /// Seed for the augmentation random draws
    #[arg(long = "seed", default_value_t = 42)]
    pub seed: u64,

    /// Image extensions to pick up (case-insensitive)
    #[arg(long = "image_exts", value_delimiter = ',', default_value = "jpg,png")]
    pub image_exts: Vec<String>,

    /// Extension of label files
    #[arg(long = "label_ext", default_value = LABEL_EXTENSION)]
    pub label_ext: String,

    /// Encoding of the written images: keep the source extension, or force jpg/png
    #[arg(long = "image_format", value_enum, default_value = "keep")]
    pub image_format: OutputImageFormat,

    /// JSON file describing the transform steps (defaults to flip, brightness/contrast, rotate)
    #[arg(long = "transform_config")]
    pub transform_config: Option<PathBuf>,

    /// Ignore images that are themselves augmented variants (`*_aug_<n>`)
    #[arg(long = "skip_augmented")]
    pub skip_augmented: bool,

    /// Worker threads, 0 lets rayon decide
    #[arg(long = "workers", default_value_t = 0)]
    pub workers: usize,
}

// Encoding of generated images
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default)]
pub enum OutputImageFormat {
    #[default]
    Keep,
    Jpg,
    Png,
}

impl OutputImageFormat {
    /// Forced extension, or `None` to reuse the source image's.
    pub fn extension(self) -> Option<&'static str> {
        match self {
            OutputImageFormat::Keep => None,
            OutputImageFormat::Jpg => Some("jpg"),
            OutputImageFormat::Png => Some("png"),
        }
    }
}

/// Everything a run needs, independent of how it was collected.
#[derive(Debug, Clone)]
pub struct AugmentConfig {
    pub dataset_root: PathBuf,
    pub splits: Vec<String>,
    pub variants: usize,
    pub seed: u64,
    pub image_exts: Vec<String>,
    pub label_ext: String,
    pub image_format: OutputImageFormat,
    pub transform: TransformSpec,
    pub skip_augmented: bool,
    pub workers: usize,
}

impl AugmentConfig {
    /// Defaults matching the CLI for the dataset at `dataset_root`.
    pub fn new(dataset_root: impl Into<PathBuf>) -> Self {
        Self {
            dataset_root: dataset_root.into(),
            splits: vec!["train".to_string(), "valid".to_string()],
            variants: 2,
            seed: 42,
            image_exts: IMG_FORMATS.iter().map(|ext| ext.to_string()).collect(),
            label_ext: LABEL_EXTENSION.to_string(),
            image_format: OutputImageFormat::Keep,
            transform: TransformSpec::default(),
            skip_augmented: false,
            workers: 0,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.variants == 0 {
            return Err(ConfigError::NoVariants);
        }
        self.transform.validate()
    }
}

impl Args {
    /// Resolve the arguments into a run configuration, loading the transform file if given.
    pub fn to_augment_config(&self) -> Result<AugmentConfig, ConfigError> {
        let transform = match &self.transform_config {
            Some(path) => TransformSpec::from_json_file(path)?,
            None => TransformSpec::default(),
        };

        let config = AugmentConfig {
            dataset_root: self.dataset_root.clone(),
            splits: self.splits.clone(),
            variants: self.variants,
            seed: self.seed,
            image_exts: self
                .image_exts
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_string())
                .collect(),
            label_ext: self.label_ext.trim_start_matches('.').to_string(),
            image_format: self.image_format,
            transform,
            skip_augmented: self.skip_augmented,
            workers: self.workers,
        };
        config.validate()?;
        Ok(config)
    }
}

// Validate that at least one variant is requested
fn validate_variants(s: &str) -> Result<usize, String> {
    match usize::from_str(s) {
        Ok(val) if val >= 1 => Ok(val),
        _ => Err("VARIANTS must be a positive integer".to_string()),
    }
}
