//! Joint image/box augmentation pipeline.
//!
//! A [`TransformSpec`] is an ordered list of steps, each applied with its own
//! probability. Geometric steps move every box under the same mapping as the
//! pixels; photometric steps leave boxes alone.

use image::{imageops, Rgb, RgbImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

use crate::error::{ConfigError, TransformError};
use crate::geometry::is_valid;
use crate::types::{AnnotatedBox, AugmentedVariant, Sample};

fn default_probability() -> f64 {
    0.5
}

fn default_color_limit() -> f64 {
    0.2
}

fn default_rotate_limit() -> f64 {
    15.0
}

/// A single operation and its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TransformOp {
    /// Mirror left-right.
    HorizontalFlip,
    /// Mirror top-bottom.
    VerticalFlip,
    /// `out = alpha * px + beta` with `alpha = 1 + U(-contrast_limit, contrast_limit)`
    /// and `beta = 255 * U(-brightness_limit, brightness_limit)`.
    BrightnessContrast {
        #[serde(default = "default_color_limit")]
        brightness_limit: f64,
        #[serde(default = "default_color_limit")]
        contrast_limit: f64,
    },
    /// Rotate by `U(-limit, limit)` degrees about the image center, keeping
    /// the canvas size. Uncovered pixels are filled with black.
    SafeRotate {
        #[serde(default = "default_rotate_limit")]
        limit: f64,
    },
}

impl TransformOp {
    pub fn name(&self) -> &'static str {
        match self {
            TransformOp::HorizontalFlip => "horizontal_flip",
            TransformOp::VerticalFlip => "vertical_flip",
            TransformOp::BrightnessContrast { .. } => "brightness_contrast",
            TransformOp::SafeRotate { .. } => "safe_rotate",
        }
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        match self {
            TransformOp::HorizontalFlip | TransformOp::VerticalFlip => &[],
            TransformOp::BrightnessContrast { .. } => &["brightness_limit", "contrast_limit"],
            TransformOp::SafeRotate { .. } => &["limit"],
        }
    }
}

/// One operation plus its apply probability. In JSON the operation's fields
/// sit next to `p`; any other key is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct TransformStep {
    #[serde(flatten)]
    pub op: TransformOp,
    #[serde(default = "default_probability")]
    pub p: f64,
}

impl TransformStep {
    pub fn new(op: TransformOp, p: f64) -> Self {
        Self { op, p }
    }
}

impl TryFrom<Map<String, Value>> for TransformStep {
    type Error = String;

    fn try_from(mut raw: Map<String, Value>) -> Result<Self, Self::Error> {
        let p = match raw.remove("p") {
            Some(value) => value
                .as_f64()
                .ok_or_else(|| format!("`p` must be a number, found {}", value))?,
            None => default_probability(),
        };
        let keys: Vec<String> = raw.keys().cloned().collect();
        let op: TransformOp =
            serde_json::from_value(Value::Object(raw)).map_err(|e| e.to_string())?;

        let allowed = op.parameter_names();
        if let Some(key) = keys
            .iter()
            .find(|k| k.as_str() != "op" && !allowed.contains(&k.as_str()))
        {
            return Err(format!("unknown field `{}` for {}", key, op.name()));
        }
        Ok(Self { op, p })
    }
}

/// Ordered augmentation steps, applied independently on every variant draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformSpec {
    pub steps: Vec<TransformStep>,
}

impl Default for TransformSpec {
    /// Flip, brightness/contrast jitter and a ±15° rotation, each at p = 0.5.
    fn default() -> Self {
        Self {
            steps: vec![
                TransformStep::new(TransformOp::HorizontalFlip, 0.5),
                TransformStep::new(
                    TransformOp::BrightnessContrast {
                        brightness_limit: 0.2,
                        contrast_limit: 0.2,
                    },
                    0.5,
                ),
                TransformStep::new(TransformOp::SafeRotate { limit: 15.0 }, 0.5),
            ],
        }
    }
}

impl TransformSpec {
    pub fn new(steps: Vec<TransformStep>) -> Self {
        Self { steps }
    }

    /// Load a spec from a JSON file such as
    /// `{"steps": [{"op": "horizontal_flip", "p": 0.5}]}`.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let spec: TransformSpec =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for step in &self.steps {
            if !(0.0..=1.0).contains(&step.p) {
                return Err(ConfigError::Probability {
                    op: step.op.name(),
                    p: step.p,
                });
            }
            match step.op {
                TransformOp::BrightnessContrast {
                    brightness_limit,
                    contrast_limit,
                } => {
                    check_range("brightness_limit", brightness_limit, 1.0)?;
                    check_range("contrast_limit", contrast_limit, 1.0)?;
                }
                TransformOp::SafeRotate { limit } => check_range("rotation limit", limit, 180.0)?,
                TransformOp::HorizontalFlip | TransformOp::VerticalFlip => {}
            }
        }
        Ok(())
    }

    /// Produce one augmented copy of `sample`. The sample itself is untouched.
    ///
    /// Every step draws its apply/skip decision from `rng`, so two calls with
    /// identically seeded generators give identical variants. Parameter ranges
    /// are assumed to have passed [`TransformSpec::validate`].
    pub fn apply<R: Rng + ?Sized>(
        &self,
        sample: &Sample,
        rng: &mut R,
    ) -> Result<AugmentedVariant, TransformError> {
        let (width, height) = sample.image.dimensions();
        if width == 0 || height == 0 {
            return Err(TransformError::EmptyImage);
        }
        if let Some(index) = sample.boxes.iter().position(|b| !is_valid(b)) {
            return Err(TransformError::InvalidInputBox { index });
        }

        let mut image = sample.image.clone();
        let mut boxes = sample.boxes.clone();

        for step in &self.steps {
            if rng.gen::<f64>() >= step.p {
                continue;
            }
            match step.op {
                TransformOp::HorizontalFlip => {
                    imageops::flip_horizontal_in_place(&mut image);
                    for b in boxes.iter_mut() {
                        b.cx = 1.0 - b.cx;
                    }
                }
                TransformOp::VerticalFlip => {
                    imageops::flip_vertical_in_place(&mut image);
                    for b in boxes.iter_mut() {
                        b.cy = 1.0 - b.cy;
                    }
                }
                TransformOp::BrightnessContrast {
                    brightness_limit,
                    contrast_limit,
                } => {
                    let alpha = 1.0 + rng.gen_range(-contrast_limit..=contrast_limit);
                    let beta = 255.0 * rng.gen_range(-brightness_limit..=brightness_limit);
                    adjust_brightness_contrast(&mut image, alpha, beta);
                    debug!("brightness_contrast alpha={:.3} beta={:.1}", alpha, beta);
                }
                TransformOp::SafeRotate { limit } => {
                    let angle = rng.gen_range(-limit..=limit);
                    image = rotate_image(&image, angle);
                    boxes = rotate_boxes(&boxes, angle, width, height)?;
                    debug!("safe_rotate angle={:.2}", angle);
                }
            }
            check_finite(&boxes, step.op.name())?;
        }

        Ok(AugmentedVariant { image, boxes })
    }
}

fn check_range(name: &'static str, value: f64, max: f64) -> Result<(), ConfigError> {
    if (0.0..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { name, value, max })
    }
}

fn check_finite(boxes: &[AnnotatedBox], op: &'static str) -> Result<(), TransformError> {
    match boxes
        .iter()
        .position(|b| ![b.cx, b.cy, b.w, b.h].iter().all(|v| v.is_finite()))
    {
        Some(index) => Err(TransformError::Unrepresentable { index, op }),
        None => Ok(()),
    }
}

/// Apply `alpha * v + beta` to every channel through a lookup table.
pub fn adjust_brightness_contrast(image: &mut RgbImage, alpha: f64, beta: f64) {
    let mut lut = [0u8; 256];
    for (v, slot) in lut.iter_mut().enumerate() {
        *slot = (alpha * v as f64 + beta).round().clamp(0.0, 255.0) as u8;
    }
    for channel in image.iter_mut() {
        *channel = lut[*channel as usize];
    }
}

/// Rotate clockwise about the image center by `angle` degrees into a canvas
/// of the same size, filling uncovered pixels with black.
pub fn rotate_image(src: &RgbImage, angle: f64) -> RgbImage {
    rotate_about_center(
        src,
        angle.to_radians() as f32,
        Interpolation::Bilinear,
        Rgb([0, 0, 0]),
    )
}

/// Rotate box corners with the same mapping as [`rotate_image`] and take the
/// axis-aligned hull, clipped to the frame. Boxes left without area are dropped.
pub fn rotate_boxes(
    boxes: &[AnnotatedBox],
    angle: f64,
    width: u32,
    height: u32,
) -> Result<Vec<AnnotatedBox>, TransformError> {
    let (sin, cos) = angle.to_radians().sin_cos();
    let (w_img, h_img) = (width as f64, height as f64);
    let cx = w_img / 2.0;
    let cy = h_img / 2.0;

    let mut out = Vec::with_capacity(boxes.len());
    for (index, b) in boxes.iter().enumerate() {
        let (x_min, y_min, x_max, y_max) = b.to_pixel_corners(width, height);
        let corners = [(x_min, y_min), (x_max, y_min), (x_max, y_max), (x_min, y_max)];

        let (rx_min, ry_min, rx_max, ry_max) = corners.iter().fold(
            (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
            |(x0, y0, x1, y1), &(x, y)| {
                let dx = x - cx;
                let dy = y - cy;
                let rx = cx + dx * cos - dy * sin;
                let ry = cy + dx * sin + dy * cos;
                (x0.min(rx), y0.min(ry), x1.max(rx), y1.max(ry))
            },
        );
        if ![rx_min, ry_min, rx_max, ry_max].iter().all(|v| v.is_finite()) {
            return Err(TransformError::Unrepresentable {
                index,
                op: "safe_rotate",
            });
        }

        let clipped = (
            rx_min.clamp(0.0, w_img),
            ry_min.clamp(0.0, h_img),
            rx_max.clamp(0.0, w_img),
            ry_max.clamp(0.0, h_img),
        );
        if clipped.2 - clipped.0 <= 0.0 || clipped.3 - clipped.1 <= 0.0 {
            debug!("Box {} rotated out of frame, dropping it", index);
            continue;
        }
        out.push(AnnotatedBox::from_pixel_corners(
            b.class_id, clipped, width, height,
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn gradient_image(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, 128])
        })
    }

    fn sample_with(boxes: Vec<AnnotatedBox>) -> Sample {
        Sample {
            image: gradient_image(64, 48),
            boxes,
        }
    }

    fn only(op: TransformOp) -> TransformSpec {
        TransformSpec::new(vec![TransformStep::new(op, 1.0)])
    }

    #[test]
    fn test_horizontal_flip_boxes_and_pixels() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 0, 255]));
        let sample = Sample {
            image: img,
            boxes: vec![AnnotatedBox::new(3, 0.2, 0.4, 0.1, 0.3)],
        };

        let mut rng = StdRng::seed_from_u64(0);
        let variant = only(TransformOp::HorizontalFlip)
            .apply(&sample, &mut rng)
            .unwrap();

        assert_eq!(variant.image.as_raw(), &vec![0, 0, 255, 255, 0, 0]);
        let b = variant.boxes[0];
        assert!((b.cx - 0.8).abs() < 1e-12);
        assert_eq!((b.class_id, b.cy, b.w, b.h), (3, 0.4, 0.1, 0.3));
        // source sample is left untouched
        assert_eq!(sample.boxes[0].cx, 0.2);
        assert_eq!(sample.image.get_pixel(0, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_vertical_flip_boxes() {
        let sample = sample_with(vec![AnnotatedBox::new(0, 0.3, 0.25, 0.2, 0.2)]);
        let mut rng = StdRng::seed_from_u64(0);
        let variant = only(TransformOp::VerticalFlip)
            .apply(&sample, &mut rng)
            .unwrap();
        assert!((variant.boxes[0].cy - 0.75).abs() < 1e-12);
        assert_eq!(variant.boxes[0].cx, 0.3);
    }

    #[test]
    fn test_brightness_contrast_keeps_boxes() {
        let boxes = vec![
            AnnotatedBox::new(1, 0.5, 0.5, 0.2, 0.2),
            AnnotatedBox::new(2, 0.1, 0.9, 0.05, 0.1),
        ];
        let sample = sample_with(boxes.clone());
        let mut rng = StdRng::seed_from_u64(7);
        let spec = only(TransformOp::BrightnessContrast {
            brightness_limit: 0.2,
            contrast_limit: 0.2,
        });
        let variant = spec.apply(&sample, &mut rng).unwrap();
        assert_eq!(variant.boxes, boxes);
        assert_eq!(variant.image.dimensions(), (64, 48));
    }

    #[test]
    fn test_adjust_brightness_contrast_saturates() {
        let mut img = RgbImage::from_pixel(2, 2, Rgb([10, 128, 250]));
        adjust_brightness_contrast(&mut img, 1.0, 20.0);
        assert_eq!(img.get_pixel(1, 1), &Rgb([30, 148, 255]));

        let mut img = RgbImage::from_pixel(1, 1, Rgb([100, 0, 200]));
        adjust_brightness_contrast(&mut img, 1.0, 0.0);
        assert_eq!(img.get_pixel(0, 0), &Rgb([100, 0, 200]));
    }

    #[test]
    fn test_rotate_zero_is_identity() {
        let img = gradient_image(16, 12);
        let rotated = rotate_image(&img, 0.0);
        assert_eq!(rotated.dimensions(), (16, 12));
        for (x, y) in [(3, 3), (8, 6), (12, 9)] {
            let (a, b) = (img.get_pixel(x, y), rotated.get_pixel(x, y));
            for c in 0..3 {
                assert!((a[c] as i32 - b[c] as i32).abs() <= 1);
            }
        }

        let boxes = vec![AnnotatedBox::new(4, 0.5, 0.5, 0.25, 0.5)];
        let rotated = rotate_boxes(&boxes, 0.0, 16, 12).unwrap();
        assert_eq!(rotated.len(), 1);
        let (a, b) = (boxes[0], rotated[0]);
        assert_eq!(b.class_id, 4);
        assert!((a.cx - b.cx).abs() < 1e-9);
        assert!((a.cy - b.cy).abs() < 1e-9);
        assert!((a.w - b.w).abs() < 1e-9);
        assert!((a.h - b.h).abs() < 1e-9);
    }

    #[test]
    fn test_rotate_grows_box_hull() {
        let boxes = vec![AnnotatedBox::new(0, 0.5, 0.5, 0.2, 0.2)];
        let rotated = rotate_boxes(&boxes, 15.0, 100, 100).unwrap();
        let b = rotated[0];
        // |cos| + |sin| of 15 degrees
        let factor = 15f64.to_radians().cos() + 15f64.to_radians().sin();
        assert!((b.w - 0.2 * factor).abs() < 1e-9);
        assert!((b.h - 0.2 * factor).abs() < 1e-9);
        assert!((b.cx - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_rotate_clips_to_frame() {
        let boxes = vec![AnnotatedBox::new(0, 0.95, 0.5, 0.1, 0.9)];
        let rotated = rotate_boxes(&boxes, 15.0, 100, 100).unwrap();
        let b = rotated[0];
        let (x_min, y_min, x_max, y_max) = b.to_pixel_corners(100, 100);
        assert!(x_min >= -1e-9 && y_min >= -1e-9);
        assert!(x_max <= 100.0 + 1e-9 && y_max <= 100.0 + 1e-9);
    }

    #[test]
    fn test_rotate_drops_box_leaving_frame() {
        // a small box in the corner swings past the bottom edge at 45 degrees
        let boxes = vec![
            AnnotatedBox::new(0, 0.995, 0.995, 0.01, 0.01),
            AnnotatedBox::new(1, 0.5, 0.5, 0.2, 0.2),
        ];
        let rotated = rotate_boxes(&boxes, 45.0, 100, 100).unwrap();
        assert_eq!(rotated.len(), 1);
        assert_eq!(rotated[0].class_id, 1);
    }

    #[test]
    fn test_rotated_pixels_stay_inside_rotated_box() {
        // off-center so that a wrong rotation direction moves the pixels away
        let (width, height) = (100, 80);
        let boxes = vec![AnnotatedBox::new(0, 0.3, 0.35, 0.2, 0.2)];
        let (x_min, y_min, x_max, y_max) = boxes[0].to_pixel_corners(width, height);
        let img = RgbImage::from_fn(width, height, |x, y| {
            let (px, py) = (x as f64 + 0.5, y as f64 + 0.5);
            if px > x_min && px < x_max && py > y_min && py < y_max {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });

        for angle in [15.0, -15.0] {
            let rotated = rotate_image(&img, angle);
            let hull = rotate_boxes(&boxes, angle, width, height).unwrap();
            let (hx0, hy0, hx1, hy1) = hull[0].to_pixel_corners(width, height);

            let mut bright = 0;
            for (x, y, p) in rotated.enumerate_pixels() {
                if p[0] < 128 {
                    continue;
                }
                bright += 1;
                let (px, py) = (x as f64 + 0.5, y as f64 + 0.5);
                assert!(
                    px >= hx0 - 1.0 && px <= hx1 + 1.0 && py >= hy0 - 1.0 && py <= hy1 + 1.0,
                    "pixel ({}, {}) outside rotated box at {} degrees",
                    x,
                    y,
                    angle
                );
            }
            assert!(bright > 200);
        }
    }

    #[test]
    fn test_box_count_never_increases() {
        let boxes = vec![
            AnnotatedBox::new(0, 0.1, 0.1, 0.1, 0.1),
            AnnotatedBox::new(1, 0.9, 0.9, 0.2, 0.2),
            AnnotatedBox::new(2, 0.5, 0.5, 1.0, 1.0),
        ];
        let sample = sample_with(boxes);
        let spec = TransformSpec::default();
        for seed in 0..32 {
            let mut rng = StdRng::seed_from_u64(seed);
            let variant = spec.apply(&sample, &mut rng).unwrap();
            assert!(variant.boxes.len() <= 3);
        }
    }

    #[test]
    fn test_same_seed_same_variant() {
        let sample = sample_with(vec![AnnotatedBox::new(0, 0.4, 0.6, 0.3, 0.2)]);
        let spec = TransformSpec::default();
        let a = spec.apply(&sample, &mut StdRng::seed_from_u64(99)).unwrap();
        let b = spec.apply(&sample, &mut StdRng::seed_from_u64(99)).unwrap();
        assert_eq!(a.boxes, b.boxes);
        assert_eq!(a.image, b.image);
    }

    #[test]
    fn test_zero_probability_is_noop() {
        let sample = sample_with(vec![AnnotatedBox::new(0, 0.4, 0.6, 0.3, 0.2)]);
        let spec = TransformSpec::new(
            TransformSpec::default()
                .steps
                .into_iter()
                .map(|s| TransformStep::new(s.op, 0.0))
                .collect(),
        );
        let variant = spec.apply(&sample, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(variant.boxes, sample.boxes);
        assert_eq!(variant.image, sample.image);
    }

    #[test]
    fn test_invalid_input_box_is_transform_error() {
        let sample = sample_with(vec![
            AnnotatedBox::new(0, 0.4, 0.6, 0.3, 0.2),
            AnnotatedBox::new(1, 0.4, 0.6, 0.0, 0.2),
        ]);
        let err = TransformSpec::default()
            .apply(&sample, &mut StdRng::seed_from_u64(1))
            .unwrap_err();
        assert_eq!(err, TransformError::InvalidInputBox { index: 1 });
    }

    #[test]
    fn test_empty_image_is_transform_error() {
        let sample = Sample {
            image: RgbImage::new(0, 0),
            boxes: vec![AnnotatedBox::new(0, 0.5, 0.5, 0.2, 0.2)],
        };
        let err = TransformSpec::default()
            .apply(&sample, &mut StdRng::seed_from_u64(1))
            .unwrap_err();
        assert_eq!(err, TransformError::EmptyImage);
    }

    #[test]
    fn test_spec_json() {
        let json = r#"{"steps": [
            {"op": "horizontal_flip", "p": 0.5},
            {"op": "brightness_contrast"},
            {"op": "safe_rotate", "p": 0.5, "limit": 15}
        ]}"#;
        let spec: TransformSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec, TransformSpec::default());

        let encoded = serde_json::to_string(&spec).unwrap();
        let decoded: TransformSpec = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, spec);
    }

    #[test]
    fn test_validate() {
        assert!(TransformSpec::default().validate().is_ok());
        let bad_p = TransformSpec::new(vec![TransformStep::new(TransformOp::HorizontalFlip, 1.5)]);
        assert!(matches!(
            bad_p.validate(),
            Err(ConfigError::Probability { p, .. }) if p == 1.5
        ));
        let bad_limit = only(TransformOp::SafeRotate { limit: 270.0 });
        assert!(matches!(
            bad_limit.validate(),
            Err(ConfigError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spec.json");
        fs::write(&path, r#"{"steps": [{"op": "vertical_flip", "p": 0.25}]}"#).unwrap();
        let spec = TransformSpec::from_json_file(&path).unwrap();
        assert_eq!(
            spec.steps,
            vec![TransformStep::new(TransformOp::VerticalFlip, 0.25)]
        );

        fs::write(&path, r#"{"steps": [{"op": "warp"}]}"#).unwrap();
        assert!(matches!(
            TransformSpec::from_json_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_unknown_step_keys_are_rejected() {
        for json in [
            r#"{"steps": [{"op": "horizontal_flip", "probability": 1.0}]}"#,
            r#"{"steps": [{"op": "safe_rotate", "limit": 10, "angle": 5}]}"#,
            r#"{"steps": [{"op": "vertical_flip", "p": "often"}]}"#,
        ] {
            assert!(serde_json::from_str::<TransformSpec>(json).is_err(), "{}", json);
        }

        let spec: TransformSpec = serde_json::from_str(
            r#"{"steps": [{"op": "brightness_contrast", "p": 1, "contrast_limit": 0.1}]}"#,
        )
        .unwrap();
        assert_eq!(
            spec.steps,
            vec![TransformStep::new(
                TransformOp::BrightnessContrast {
                    brightness_limit: 0.2,
                    contrast_limit: 0.1,
                },
                1.0
            )]
        );
    }
}
