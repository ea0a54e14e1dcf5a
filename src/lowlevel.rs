//! Low-level building blocks for custom proposal pipelines.
//!
//! These expose the overlap kernels, chunked evaluation and array
//! conversions behind the high-level API. Most users should prefer
//! [`HierarchicalRpn`](crate::HierarchicalRpn) or
//! [`select_proposals`](crate::select_proposals).

pub use crate::anchors::{cell_anchors, LevelAnchorSpec};
pub use crate::codec::{deltas_from_flat, DEFAULT_DELTA_CLAMP};
pub use crate::filter::{containment_keep_flags, DEFAULT_CONTAINMENT_THRESHOLD};
pub use crate::geometry::{
    box_to_point4, boxes_from_flat, filter_boxes_inside_shape, flatten_boxes, point4_to_box,
};
pub use crate::overlap::scalar::{ScalarKernel, ScalarPlan};
#[cfg(feature = "simd")]
pub use crate::overlap::simd::{SimdKernel, SimdPlan};
pub use crate::overlap::{pairwise_overlap, OverlapKernel, DEFAULT_CHUNK_ROWS};
