//! Box coordinate invariants.
//!
//! Every box that enters the transform pipeline or reaches a label file has
//! gone through [`clip`] and passed [`is_valid`].

use crate::types::AnnotatedBox;

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// Clamp all four geometric fields into `[0.0, 1.0]`.
///
/// Centers are clamped with the same rule as extents, so a box whose center
/// lies outside the frame is moved onto the nearest edge rather than rejected.
pub fn clip(b: &AnnotatedBox) -> AnnotatedBox {
    AnnotatedBox {
        class_id: b.class_id,
        cx: clamp_unit(b.cx),
        cy: clamp_unit(b.cy),
        w: clamp_unit(b.w),
        h: clamp_unit(b.h),
    }
}

/// A box is usable when it has positive width and height.
pub fn is_valid(b: &AnnotatedBox) -> bool {
    b.w > 0.0 && b.h > 0.0
}

/// Clip every box and drop the ones left without area, keeping order.
pub fn sanitize<'a, I>(boxes: I) -> Vec<AnnotatedBox>
where
    I: IntoIterator<Item = &'a AnnotatedBox>,
{
    boxes
        .into_iter()
        .map(clip)
        .filter(is_valid)
        .collect()
}
