//! Axis-aligned boxes and the plain-array conversions around them.
//!
//! Boxes are `(x1, y1, x2, y2)` in pixels. Coordinate ordering is not
//! enforced: clipping can legitimately produce degenerate boxes, and every
//! consumer treats negative extents as zero area.

use crate::util::{RpnError, RpnResult};

/// Axis-aligned box in `(x1, y1, x2, y2)` form.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bbox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Bbox {
    /// Creates a box from corner coordinates.
    pub const fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Creates a box from a center and extents.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w * 0.5,
            y1: cy - h * 0.5,
            x2: cx + w * 0.5,
            y2: cy + h * 0.5,
        }
    }

    pub fn from_array(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    /// Signed width (`x2 - x1`).
    #[inline]
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    /// Signed height (`y2 - y1`).
    #[inline]
    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Area with negative extents counted as zero.
    #[inline]
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Returns the box center.
    #[inline]
    pub fn center(&self) -> (f32, f32) {
        (
            self.x1 + self.width() * 0.5,
            self.y1 + self.height() * 0.5,
        )
    }

    /// Area of the intersection with `other` (0 when disjoint).
    #[inline]
    pub fn intersection(&self, other: &Bbox) -> f32 {
        let iw = self.x2.min(other.x2) - self.x1.max(other.x1);
        let ih = self.y2.min(other.y2) - self.y1.max(other.y1);
        iw.max(0.0) * ih.max(0.0)
    }

    /// Translates the box by `(dx, dy)`.
    #[inline]
    pub fn shifted(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.x1 + dx, self.y1 + dy, self.x2 + dx, self.y2 + dy)
    }

    /// Clamps every coordinate into `[0, width] x [0, height]`.
    pub fn clip(&self, shape: ImageShape) -> Self {
        Self {
            x1: self.x1.max(0.0).min(shape.width),
            y1: self.y1.max(0.0).min(shape.height),
            x2: self.x2.max(0.0).min(shape.width),
            y2: self.y2.max(0.0).min(shape.height),
        }
    }

    /// Returns true if the box lies fully inside the image.
    pub fn is_inside(&self, shape: ImageShape) -> bool {
        self.x1 >= 0.0 && self.y1 >= 0.0 && self.x2 <= shape.width && self.y2 <= shape.height
    }
}

impl From<[f32; 4]> for Bbox {
    fn from(v: [f32; 4]) -> Self {
        Self::from_array(v)
    }
}

/// Image extent used for clipping, `(height, width)` like the feature maps.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImageShape {
    pub height: f32,
    pub width: f32,
}

impl ImageShape {
    pub fn new(height: f32, width: f32) -> Self {
        Self { height, width }
    }

    /// Rejects non-finite or negative extents.
    pub fn validate(&self) -> RpnResult<()> {
        if !self.height.is_finite() || !self.width.is_finite() {
            return Err(RpnError::InvalidInput("image shape must be finite"));
        }
        if self.height < 0.0 || self.width < 0.0 {
            return Err(RpnError::InvalidInput("image shape must be non-negative"));
        }
        Ok(())
    }
}

/// Reinterprets a flat `[N * 4]` buffer as boxes.
///
/// The last axis must be exactly 4; any other length is a shape error.
pub fn boxes_from_flat(data: &[f32]) -> RpnResult<Vec<Bbox>> {
    if data.len() % 4 != 0 {
        return Err(RpnError::ShapeMismatch {
            context: "box array (last axis)",
            expected: 4,
            got: data.len() % 4,
        });
    }
    Ok(data
        .chunks_exact(4)
        .map(|c| Bbox::new(c[0], c[1], c[2], c[3]))
        .collect())
}

/// Flattens boxes back into a `[N * 4]` buffer.
pub fn flatten_boxes(boxes: &[Bbox]) -> Vec<f32> {
    boxes.iter().flat_map(|b| b.to_array()).collect()
}

/// Clips all boxes in place to the image extent.
pub fn clip_boxes(boxes: &mut [Bbox], shape: ImageShape) {
    for b in boxes.iter_mut() {
        *b = b.clip(shape);
    }
}

/// Returns the indices and copies of boxes that lie fully inside the image.
pub fn filter_boxes_inside_shape(boxes: &[Bbox], shape: ImageShape) -> (Vec<usize>, Vec<Bbox>) {
    boxes
        .iter()
        .enumerate()
        .filter(|(_, b)| b.is_inside(shape))
        .map(|(idx, b)| (idx, *b))
        .unzip()
}

/// Expands each box into its four corner points.
///
/// Corner order is `(x1, y1), (x2, y2), (x1, y2), (x2, y1)`.
pub fn box_to_point4(boxes: &[Bbox]) -> Vec<[f32; 2]> {
    let mut points = Vec::with_capacity(boxes.len() * 4);
    for b in boxes {
        points.push([b.x1, b.y1]);
        points.push([b.x2, b.y2]);
        points.push([b.x1, b.y2]);
        points.push([b.x2, b.y1]);
    }
    points
}

/// Collapses groups of four points into their bounding boxes.
///
/// This is the inverse of [`box_to_point4`] and also accepts points that
/// were transformed (flipped, rotated) in between.
pub fn point4_to_box(points: &[[f32; 2]]) -> RpnResult<Vec<Bbox>> {
    if points.len() % 4 != 0 {
        return Err(RpnError::ShapeMismatch {
            context: "corner points (group size)",
            expected: 4,
            got: points.len() % 4,
        });
    }
    Ok(points
        .chunks_exact(4)
        .map(|group| {
            let mut b = Bbox::new(f32::INFINITY, f32::INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY);
            for p in group {
                b.x1 = b.x1.min(p[0]);
                b.y1 = b.y1.min(p[1]);
                b.x2 = b.x2.max(p[0]);
                b.y2 = b.y2.max(p[1]);
            }
            b
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_pulls_box_into_image() {
        let clipped = Bbox::new(-5.0, -5.0, 10.0, 10.0).clip(ImageShape::new(8.0, 8.0));
        assert_eq!(clipped, Bbox::new(0.0, 0.0, 8.0, 8.0));
    }

    #[test]
    fn clip_uses_height_for_y_and_width_for_x() {
        let clipped = Bbox::new(-1.0, -1.0, 50.0, 50.0).clip(ImageShape::new(10.0, 20.0));
        assert_eq!(clipped, Bbox::new(0.0, 0.0, 20.0, 10.0));
    }

    #[test]
    fn degenerate_area_is_zero() {
        assert_eq!(Bbox::new(5.0, 5.0, 1.0, 9.0).area(), 0.0);
        assert_eq!(Bbox::new(5.0, 5.0, 5.0, 9.0).area(), 0.0);
        assert_eq!(Bbox::new(0.0, 0.0, 2.0, 3.0).area(), 6.0);
    }

    #[test]
    fn point4_roundtrip() {
        let boxes = vec![Bbox::new(1.0, 2.0, 3.0, 5.0), Bbox::new(-1.0, 0.0, 4.0, 4.0)];
        let points = box_to_point4(&boxes);
        assert_eq!(points.len(), 8);
        assert_eq!(point4_to_box(&points).unwrap(), boxes);
    }

    #[test]
    fn point4_rejects_partial_group() {
        let err = point4_to_box(&[[0.0, 0.0]; 6]).unwrap_err();
        assert!(matches!(err, RpnError::ShapeMismatch { got: 2, .. }));
    }

    #[test]
    fn inside_filter_keeps_indices() {
        let boxes = [
            Bbox::new(0.0, 0.0, 4.0, 4.0),
            Bbox::new(-1.0, 0.0, 4.0, 4.0),
            Bbox::new(2.0, 2.0, 10.0, 8.0),
        ];
        let (idx, kept) = filter_boxes_inside_shape(&boxes, ImageShape::new(8.0, 10.0));
        assert_eq!(idx, vec![0, 2]);
        assert_eq!(kept, vec![boxes[0], boxes[2]]);
    }
}
