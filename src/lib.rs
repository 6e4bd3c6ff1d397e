//! YOLO dataset augmenter
//!
//! This library generates augmented (image, label) pairs from an annotated YOLO
//! dataset while keeping every emitted bounding box geometrically valid.

pub mod config;
pub mod dataset;
pub mod error;
pub mod geometry;
pub mod io;
pub mod labels;
pub mod transforms;
pub mod types;
pub mod utils;

// Re-export commonly used types and functions
pub use config::{Args, AugmentConfig, OutputImageFormat};
pub use dataset::{augment_dataset, process_image, process_split};
pub use error::{AugmentError, ConfigError, LabelParseError, TransformError};
pub use geometry::{clip, is_valid, sanitize};
pub use labels::{format_labels, load_labels, parse_label_line, parse_labels, LoadedLabels};
pub use transforms::{TransformOp, TransformSpec, TransformStep};
pub use types::{AnnotatedBox, AugmentReport, AugmentedVariant, Sample, SplitDirs, SplitStats};
