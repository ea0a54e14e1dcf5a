//! Dense anchor lattices over feature maps.
//!
//! An anchor grid tiles a small set of cell anchors (one per ratio/size
//! pair, centered on the origin) over a square field of
//! `ceil(max_size / stride)` positions per axis. Shifts are `index * stride`,
//! i.e. anchors sit on the top-left corner of each stride cell.
//!
//! Generation is a pure function of [`AnchorSpec`]; [`AnchorCache`] memoizes
//! grids per specification so every image sharing a maximum size reuses
//! the same lattice.

mod cache;
mod fpn;

pub use cache::{AnchorCache, AnchorGenerator};
pub use fpn::{FpnAnchorConfig, FpnAnchors, LevelAnchorSpec};

use crate::geometry::Bbox;
use crate::util::math::{all_finite_positive, ceil_div};
use crate::util::{RpnError, RpnResult};

/// Parameters that fully determine one anchor grid.
#[derive(Clone, Debug, PartialEq)]
pub struct AnchorSpec {
    /// Feature stride in pixels.
    pub stride: u32,
    /// Anchor sizes (square root of the anchor area) in pixels.
    pub sizes: Vec<f32>,
    /// Aspect ratios `h / w`.
    pub ratios: Vec<f32>,
    /// Largest image side the grid must cover.
    pub max_size: u32,
}

impl AnchorSpec {
    pub fn new(stride: u32, sizes: Vec<f32>, ratios: Vec<f32>, max_size: u32) -> Self {
        Self {
            stride,
            sizes,
            ratios,
            max_size,
        }
    }

    /// Validates the specification.
    pub fn validate(&self) -> RpnResult<()> {
        if self.stride == 0 {
            return Err(RpnError::InvalidConfig {
                reason: "anchor stride must be > 0",
            });
        }
        if self.max_size == 0 {
            return Err(RpnError::InvalidConfig {
                reason: "max_size must be > 0",
            });
        }
        if self.sizes.is_empty() {
            return Err(RpnError::InvalidConfig {
                reason: "anchor sizes must not be empty",
            });
        }
        if self.ratios.is_empty() {
            return Err(RpnError::InvalidConfig {
                reason: "anchor ratios must not be empty",
            });
        }
        if !all_finite_positive(&self.sizes) {
            return Err(RpnError::InvalidConfig {
                reason: "anchor sizes must be finite and > 0",
            });
        }
        if !all_finite_positive(&self.ratios) {
            return Err(RpnError::InvalidConfig {
                reason: "anchor ratios must be finite and > 0",
            });
        }
        Ok(())
    }

    /// Number of positions per axis, `ceil(max_size / stride)`.
    pub fn field_size(&self) -> usize {
        ceil_div(self.max_size, self.stride) as usize
    }

    /// Anchors per cell, `len(sizes) * len(ratios)`.
    pub fn num_anchors(&self) -> usize {
        self.sizes.len() * self.ratios.len()
    }
}

/// Anchor lattice of shape `[field_h, field_w, num_anchors, 4]`.
#[derive(Clone, Debug, PartialEq)]
pub struct AnchorGrid {
    boxes: Vec<Bbox>,
    field_h: usize,
    field_w: usize,
    num_anchors: usize,
    stride: u32,
}

impl AnchorGrid {
    /// Returns the full shape including the coordinate axis.
    pub fn shape(&self) -> [usize; 4] {
        [self.field_h, self.field_w, self.num_anchors, 4]
    }

    pub fn field_h(&self) -> usize {
        self.field_h
    }

    pub fn field_w(&self) -> usize {
        self.field_w
    }

    pub fn num_anchors(&self) -> usize {
        self.num_anchors
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Total number of anchors, `field_h * field_w * num_anchors`.
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Anchors flattened in `[y][x][a]` order.
    pub fn as_slice(&self) -> &[Bbox] {
        &self.boxes
    }

    /// Returns the anchor at cell `(y, x)`, slot `a`.
    pub fn get(&self, y: usize, x: usize, a: usize) -> Option<&Bbox> {
        if y >= self.field_h || x >= self.field_w || a >= self.num_anchors {
            return None;
        }
        self.boxes
            .get((y * self.field_w + x) * self.num_anchors + a)
    }

    /// Returns all anchors of cell `(y, x)`.
    pub fn cell(&self, y: usize, x: usize) -> Option<&[Bbox]> {
        if y >= self.field_h || x >= self.field_w {
            return None;
        }
        let start = (y * self.field_w + x) * self.num_anchors;
        self.boxes.get(start..start + self.num_anchors)
    }

    /// Crops the grid to the top-left `[0:fh, 0:fw]` region.
    ///
    /// Feature maps of small images are smaller than the nominal field; the
    /// grid must be cropped to match before decoding.
    pub fn narrow_to(&self, fh: usize, fw: usize) -> RpnResult<AnchorGrid> {
        if fh > self.field_h {
            return Err(RpnError::ShapeMismatch {
                context: "narrowed anchor field height",
                expected: self.field_h,
                got: fh,
            });
        }
        if fw > self.field_w {
            return Err(RpnError::ShapeMismatch {
                context: "narrowed anchor field width",
                expected: self.field_w,
                got: fw,
            });
        }
        let row_len = fw * self.num_anchors;
        let mut boxes = Vec::with_capacity(fh * row_len);
        for y in 0..fh {
            let start = y * self.field_w * self.num_anchors;
            boxes.extend_from_slice(&self.boxes[start..start + row_len]);
        }
        Ok(AnchorGrid {
            boxes,
            field_h: fh,
            field_w: fw,
            num_anchors: self.num_anchors,
            stride: self.stride,
        })
    }
}

impl AsRef<AnchorGrid> for AnchorGrid {
    fn as_ref(&self) -> &AnchorGrid {
        self
    }
}

/// Cell anchors centered on the origin, ratio-major then size.
///
/// Slot `r * len(sizes) + s` holds the anchor for `ratios[r]`, `sizes[s]`.
pub fn cell_anchors(sizes: &[f32], ratios: &[f32]) -> Vec<Bbox> {
    cell_extents(sizes, ratios)
        .into_iter()
        .map(|b| Bbox::new(b[0] as f32, b[1] as f32, b[2] as f32, b[3] as f32))
        .collect()
}

// Kept in f64 until the shift is applied; the lattice is rounded once.
fn cell_extents(sizes: &[f32], ratios: &[f32]) -> Vec<[f64; 4]> {
    let mut cells = Vec::with_capacity(sizes.len() * ratios.len());
    for &ratio in ratios {
        for &size in sizes {
            let size = f64::from(size);
            let ratio = f64::from(ratio);
            let w = (size * size / ratio).sqrt();
            let h = ratio * w;
            cells.push([-w * 0.5, -h * 0.5, w * 0.5, h * 0.5]);
        }
    }
    cells
}

/// Generates the anchor grid for `spec`.
pub fn generate_anchors(spec: &AnchorSpec) -> RpnResult<AnchorGrid> {
    spec.validate()?;
    Ok(build_grid(spec))
}

/// Builds a grid from an already validated spec.
pub(crate) fn build_grid(spec: &AnchorSpec) -> AnchorGrid {
    let field = spec.field_size();
    let stride = f64::from(spec.stride);

    let base = cell_extents(&spec.sizes, &spec.ratios);

    let mut boxes = Vec::with_capacity(field * field * base.len());
    for y in 0..field {
        let shift_y = y as f64 * stride;
        for x in 0..field {
            let shift_x = x as f64 * stride;
            for b in &base {
                boxes.push(Bbox::new(
                    (b[0] + shift_x) as f32,
                    (b[1] + shift_y) as f32,
                    (b[2] + shift_x) as f32,
                    (b[3] + shift_y) as f32,
                ));
            }
        }
    }

    AnchorGrid {
        boxes,
        field_h: field,
        field_w: field,
        num_anchors: base.len(),
        stride: spec.stride,
    }
}
