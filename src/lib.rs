//! rpnkit implements the anchor and proposal side of a region-proposal
//! network: dense anchor grids over a feature pyramid, box regression
//! encode/decode, IoU and containment overlap, containment filtering of
//! anchors inside parent boxes, and top-k + NMS proposal selection.
//!
//! Everything operates on plain `f32` buffers on the CPU; the network
//! itself lives elsewhere. Optional features: `rayon` for chunk-parallel
//! overlap evaluation, `simd` for a `wide`-based overlap kernel and
//! `tracing` for spans and events.
//!
//! ```
//! use rpnkit::{select_proposals, Bbox, ImageShape, ProposalConfig};
//!
//! let boxes = [Bbox::new(0.0, 0.0, 10.0, 10.0), Bbox::new(1.0, 1.0, 10.0, 10.0)];
//! let set = select_proposals(
//!     &boxes,
//!     &[0.9, 0.8],
//!     ImageShape::new(32.0, 32.0),
//!     &ProposalConfig::default(),
//!     None,
//! )
//! .unwrap();
//! assert_eq!(set.len(), 1);
//! ```

pub mod anchors;
pub mod codec;
pub mod filter;
pub mod geometry;
pub mod lowlevel;
pub mod overlap;
pub mod pipeline;
pub mod proposal;
mod trace;
pub mod util;

pub use anchors::{
    generate_anchors, AnchorCache, AnchorGenerator, AnchorGrid, AnchorSpec, FpnAnchorConfig,
    FpnAnchors,
};
pub use codec::{BoxCodec, BoxDelta};
pub use filter::{filter_by_containment, ContainmentFilterConfig, KeepMask};
pub use geometry::{clip_boxes, Bbox, ImageShape};
pub use overlap::{
    max_overlap_per_row, pairwise_containment, pairwise_iou, OverlapMatrix, OverlapMetric,
    OverlapParams,
};
pub use pipeline::{HierarchicalRpn, LevelPrediction, NestedProposals, RpnConfig, RpnHead};
pub use proposal::{
    select_fpn_proposals, select_proposals, FpnProposalConfig, FpnProposalMode,
    LevelProposalInput, ProposalConfig, ProposalSet,
};
pub use util::{RpnError, RpnResult};
