//! Anchor-relative box regression encoding.
//!
//! Deltas follow the usual R-CNN parameterization on centers and sizes:
//!
//! ```text
//! dx = wx * (tx - ax) / aw      dw = ww * ln(tw / aw)
//! dy = wy * (ty - ay) / ah      dh = wh * ln(th / ah)
//! ```
//!
//! Decoding inverts this exactly, except that `dw` and `dh` are clamped from
//! above before `exp` so wild predictions cannot overflow.

use crate::anchors::AnchorGrid;
use crate::geometry::Bbox;
use crate::trace::trace_span;
use crate::util::{RpnError, RpnResult};

/// Default upper bound on `dw`/`dh`, `ln(1000 / 16)`.
pub const DEFAULT_DELTA_CLAMP: f32 = 4.135_166_6;

/// Regression target relative to an anchor.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoxDelta {
    pub dx: f32,
    pub dy: f32,
    pub dw: f32,
    pub dh: f32,
}

impl BoxDelta {
    pub const fn new(dx: f32, dy: f32, dw: f32, dh: f32) -> Self {
        Self { dx, dy, dw, dh }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.dx, self.dy, self.dw, self.dh]
    }
}

impl From<[f32; 4]> for BoxDelta {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

/// Encoder/decoder between boxes and anchor-relative deltas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxCodec {
    /// Upper bound applied to `dw` and `dh` before exponentiation.
    pub delta_clamp: f32,
    /// Per-coordinate weights `(wx, wy, ww, wh)`.
    pub weights: [f32; 4],
}

impl Default for BoxCodec {
    fn default() -> Self {
        Self {
            delta_clamp: DEFAULT_DELTA_CLAMP,
            weights: [1.0; 4],
        }
    }
}

impl BoxCodec {
    /// Codec with custom weights and the default clamp.
    pub fn with_weights(weights: [f32; 4]) -> Self {
        Self {
            weights,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> RpnResult<()> {
        if !self.delta_clamp.is_finite() {
            return Err(RpnError::InvalidConfig {
                reason: "delta_clamp must be finite",
            });
        }
        if self.weights.iter().any(|w| !(w.is_finite() && *w > 0.0)) {
            return Err(RpnError::InvalidConfig {
                reason: "codec weights must be finite and > 0",
            });
        }
        Ok(())
    }

    /// Encodes `target` relative to `anchor`.
    ///
    /// Both boxes must have strictly positive width and height.
    pub fn encode(&self, anchor: &Bbox, target: &Bbox) -> RpnResult<BoxDelta> {
        let (aw, ah) = (anchor.width(), anchor.height());
        if !(aw > 0.0 && ah > 0.0) {
            return Err(RpnError::InvalidInput("anchor extents must be > 0"));
        }
        let (tw, th) = (target.width(), target.height());
        if !(tw > 0.0 && th > 0.0) {
            return Err(RpnError::InvalidInput("target extents must be > 0"));
        }
        let (ax, ay) = anchor.center();
        let (tx, ty) = target.center();
        let [wx, wy, ww, wh] = self.weights;
        Ok(BoxDelta {
            dx: wx * (tx - ax) / aw,
            dy: wy * (ty - ay) / ah,
            dw: ww * (tw / aw).ln(),
            dh: wh * (th / ah).ln(),
        })
    }

    /// Applies `delta` to `anchor`.
    #[inline]
    pub fn decode(&self, anchor: &Bbox, delta: &BoxDelta) -> Bbox {
        let (aw, ah) = (anchor.width(), anchor.height());
        let (ax, ay) = anchor.center();
        let [wx, wy, ww, wh] = self.weights;

        let dw = (delta.dw / ww).min(self.delta_clamp);
        let dh = (delta.dh / wh).min(self.delta_clamp);
        let cx = delta.dx / wx * aw + ax;
        let cy = delta.dy / wy * ah + ay;
        Bbox::from_center(cx, cy, dw.exp() * aw, dh.exp() * ah)
    }

    /// Encodes `targets[i]` against `anchors[i]`.
    pub fn encode_boxes(&self, anchors: &[Bbox], targets: &[Bbox]) -> RpnResult<Vec<BoxDelta>> {
        check_len("targets per anchor", anchors.len(), targets.len())?;
        anchors
            .iter()
            .zip(targets)
            .map(|(a, t)| self.encode(a, t))
            .collect()
    }

    /// Decodes `deltas[i]` against `anchors[i]`.
    pub fn decode_boxes(&self, anchors: &[Bbox], deltas: &[BoxDelta]) -> RpnResult<Vec<Bbox>> {
        check_len("deltas per anchor", anchors.len(), deltas.len())?;
        Ok(anchors
            .iter()
            .zip(deltas)
            .map(|(a, d)| self.decode(a, d))
            .collect())
    }

    /// Decodes one feature level.
    ///
    /// The grid is cropped to the `[feature_h, feature_w]` top-left region
    /// first; `deltas` is laid out `[feature_h][feature_w][A]`.
    pub fn decode_level(
        &self,
        grid: &AnchorGrid,
        feature_h: usize,
        feature_w: usize,
        deltas: &[BoxDelta],
    ) -> RpnResult<Vec<Bbox>> {
        let _span = trace_span!(
            "decode_level",
            stride = grid.stride(),
            feature_h = feature_h,
            feature_w = feature_w
        )
        .entered();
        let narrowed = grid.narrow_to(feature_h, feature_w)?;
        self.decode_boxes(narrowed.as_slice(), deltas)
    }
}

fn check_len(context: &'static str, expected: usize, got: usize) -> RpnResult<()> {
    if expected != got {
        return Err(RpnError::ShapeMismatch {
            context,
            expected,
            got,
        });
    }
    Ok(())
}

/// Reinterprets a flat `[N * 4]` buffer as deltas.
pub fn deltas_from_flat(data: &[f32]) -> RpnResult<Vec<BoxDelta>> {
    if data.len() % 4 != 0 {
        return Err(RpnError::ShapeMismatch {
            context: "delta array (last axis)",
            expected: 4,
            got: data.len() % 4,
        });
    }
    Ok(data
        .chunks_exact(4)
        .map(|c| BoxDelta::new(c[0], c[1], c[2], c[3]))
        .collect())
}
