//! Multi-level anchor configuration for a feature pyramid.

use super::{AnchorGrid, AnchorSpec};
use crate::util::{RpnError, RpnResult};
use std::sync::Arc;

/// Stride and sizes of one pyramid level.
#[derive(Clone, Debug, PartialEq)]
pub struct LevelAnchorSpec {
    pub stride: u32,
    pub sizes: Vec<f32>,
}

/// Anchor layout for every pyramid level; ratios and max size are shared.
#[derive(Clone, Debug, PartialEq)]
pub struct FpnAnchorConfig {
    pub levels: Vec<LevelAnchorSpec>,
    pub ratios: Vec<f32>,
    pub max_size: u32,
}

impl Default for FpnAnchorConfig {
    /// P2-P6 pyramid with one size per level.
    fn default() -> Self {
        let levels = [(4, 32.0), (8, 64.0), (16, 128.0), (32, 256.0), (64, 512.0)]
            .into_iter()
            .map(|(stride, size)| LevelAnchorSpec {
                stride,
                sizes: vec![size],
            })
            .collect();
        Self {
            levels,
            ratios: vec![0.5, 1.0, 2.0],
            max_size: 1333,
        }
    }
}

impl FpnAnchorConfig {
    /// Pairs stride `i` with the single anchor size `sizes[i]`.
    pub fn from_strides(
        strides: &[u32],
        sizes: &[f32],
        ratios: Vec<f32>,
        max_size: u32,
    ) -> RpnResult<Self> {
        if strides.len() != sizes.len() {
            return Err(RpnError::ShapeMismatch {
                context: "anchor sizes per stride",
                expected: strides.len(),
                got: sizes.len(),
            });
        }
        let levels = strides
            .iter()
            .zip(sizes)
            .map(|(&stride, &size)| LevelAnchorSpec {
                stride,
                sizes: vec![size],
            })
            .collect();
        Ok(Self {
            levels,
            ratios,
            max_size,
        })
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Full anchor specification of level `idx`.
    pub fn level_spec(&self, idx: usize) -> RpnResult<AnchorSpec> {
        let level = self.levels.get(idx).ok_or(RpnError::IndexOutOfBounds {
            index: idx,
            len: self.levels.len(),
            context: "pyramid level",
        })?;
        Ok(AnchorSpec::new(
            level.stride,
            level.sizes.clone(),
            self.ratios.clone(),
            self.max_size,
        ))
    }

    /// Anchors per cell on level `idx`.
    pub fn num_anchors(&self, idx: usize) -> Option<usize> {
        self.levels
            .get(idx)
            .map(|level| level.sizes.len() * self.ratios.len())
    }

    /// Validates every level.
    pub fn validate(&self) -> RpnResult<()> {
        if self.levels.is_empty() {
            return Err(RpnError::InvalidConfig {
                reason: "at least one pyramid level is required",
            });
        }
        for idx in 0..self.levels.len() {
            self.level_spec(idx)?.validate()?;
        }
        Ok(())
    }
}

/// Generated grids, aligned with the configured level order.
#[derive(Clone, Debug)]
pub struct FpnAnchors {
    levels: Vec<Arc<AnchorGrid>>,
}

impl FpnAnchors {
    pub(crate) fn new(levels: Vec<Arc<AnchorGrid>>) -> Self {
        Self { levels }
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&AnchorGrid> {
        self.levels.get(idx).map(Arc::as_ref)
    }

    pub fn levels(&self) -> &[Arc<AnchorGrid>] {
        &self.levels
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnchorGrid> + '_ {
        self.levels.iter().map(Arc::as_ref)
    }

    /// Strides in level order.
    pub fn strides(&self) -> Vec<u32> {
        self.iter().map(AnchorGrid::stride).collect()
    }
}
