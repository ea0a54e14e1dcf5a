//! Memoized anchor generation.
//!
//! The cache maps each specification to a slot holding a `OnceLock`. The
//! map lock is only held to find or insert the slot; generation happens
//! inside `OnceLock::get_or_init`, so concurrent first requests for the same
//! key compute the grid once while requests for other keys proceed.
//! Entries are never evicted.

use super::{build_grid, AnchorGrid, AnchorSpec, FpnAnchorConfig, FpnAnchors};
use crate::trace::{trace_debug, trace_span};
use crate::util::RpnResult;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// Hashable identity of an [`AnchorSpec`]; floats are keyed by bit pattern.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct AnchorKey {
    stride: u32,
    sizes: Vec<u32>,
    ratios: Vec<u32>,
    max_size: u32,
}

impl From<&AnchorSpec> for AnchorKey {
    fn from(spec: &AnchorSpec) -> Self {
        Self {
            stride: spec.stride,
            sizes: spec.sizes.iter().map(|v| v.to_bits()).collect(),
            ratios: spec.ratios.iter().map(|v| v.to_bits()).collect(),
            max_size: spec.max_size,
        }
    }
}

type Slot = Arc<OnceLock<Arc<AnchorGrid>>>;

/// Thread-safe, write-once-per-key store of generated anchor grids.
#[derive(Default)]
pub struct AnchorCache {
    slots: Mutex<HashMap<AnchorKey, Slot>>,
}

impl AnchorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct specifications seen so far.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the grid for `spec`, generating it on first use.
    pub fn get_or_generate(&self, spec: &AnchorSpec) -> RpnResult<Arc<AnchorGrid>> {
        spec.validate()?;
        let slot = {
            let mut slots = self.lock();
            Arc::clone(slots.entry(AnchorKey::from(spec)).or_default())
        };

        if let Some(grid) = slot.get() {
            trace_debug!("anchor_cache_hit", stride = spec.stride);
            return Ok(Arc::clone(grid));
        }

        let grid = slot.get_or_init(|| {
            let _span = trace_span!(
                "generate_anchors",
                stride = spec.stride,
                field = spec.field_size(),
                per_cell = spec.num_anchors()
            )
            .entered();
            Arc::new(build_grid(spec))
        });
        Ok(Arc::clone(grid))
    }

    // Slots are only ever inserted, so a poisoned map is still consistent.
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<AnchorKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Anchor generator bound to an injected cache.
///
/// Generators sharing one `Arc<AnchorCache>` share every generated grid.
#[derive(Clone, Default)]
pub struct AnchorGenerator {
    cache: Arc<AnchorCache>,
}

impl AnchorGenerator {
    /// Creates a generator that memoizes into `cache`.
    pub fn new(cache: Arc<AnchorCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<AnchorCache> {
        &self.cache
    }

    /// Returns the (possibly cached) grid for `spec`.
    pub fn generate(&self, spec: &AnchorSpec) -> RpnResult<Arc<AnchorGrid>> {
        self.cache.get_or_generate(spec)
    }

    /// Returns one grid per pyramid level, in level order.
    pub fn generate_fpn(&self, cfg: &FpnAnchorConfig) -> RpnResult<FpnAnchors> {
        cfg.validate()?;
        let levels = (0..cfg.num_levels())
            .map(|idx| self.generate(&cfg.level_spec(idx)?))
            .collect::<RpnResult<Vec<_>>>()?;
        Ok(FpnAnchors::new(levels))
    }
}
