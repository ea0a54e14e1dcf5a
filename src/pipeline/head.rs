//! Prediction head variants selectable from configuration.

use crate::util::{RpnError, RpnResult};

/// Convolutional head that produced the per-level predictions.
///
/// The core never runs the head; the variant is carried so configurations
/// can be validated and the dilation reported to the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RpnHead {
    /// Plain 3x3 convolution head.
    #[default]
    Standard,
    /// 3x3 convolution head with dilation 3.
    Dilated,
}

const HEADS: &[(&str, RpnHead)] = &[
    ("rpn_head", RpnHead::Standard),
    ("dil_rpn_head", RpnHead::Dilated),
];

impl RpnHead {
    /// Resolves a configured head name.
    pub fn from_name(name: &str) -> RpnResult<Self> {
        HEADS
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, head)| *head)
            .ok_or(RpnError::InvalidConfig {
                reason: "unknown rpn head name",
            })
    }

    pub fn name(self) -> &'static str {
        match self {
            RpnHead::Standard => "rpn_head",
            RpnHead::Dilated => "dil_rpn_head",
        }
    }

    pub fn dilation(self) -> u32 {
        match self {
            RpnHead::Standard => 1,
            RpnHead::Dilated => 3,
        }
    }

    /// All registered head names.
    pub fn names() -> impl Iterator<Item = &'static str> {
        HEADS.iter().map(|(name, _)| *name)
    }
}
