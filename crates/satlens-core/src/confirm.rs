//! Confirmation progress derived from chain heights.
//!
//! Nothing here is stored: the status is recomputed from the current tip
//! and the containing block every time either height is refetched.

use serde::{Deserialize, Serialize};

use crate::types::BlockHeight;

/// Depth at which a transaction is shown as settled.
pub const DEFAULT_TARGET_DEPTH: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConfirmationStatus {
    Pending,
    Confirming { depth: u32, target: u32 },
    Completed,
}

impl ConfirmationStatus {
    /// Short phrase for a receipt header, e.g. `Confirming 2/4`.
    pub fn phrase(&self) -> String {
        match self {
            Self::Pending => "Pending".to_owned(),
            Self::Confirming { depth, target } => format!("Confirming {depth}/{target}"),
            Self::Completed => "Completed".to_owned(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Confirming { .. } => 1,
            Self::Completed => 2,
        }
    }
}

impl PartialOrd for ConfirmationStatus {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (
                Self::Confirming { depth, target },
                Self::Confirming {
                    depth: other_depth,
                    target: other_target,
                },
            ) => Some((depth, target).cmp(&(other_depth, other_target))),
            _ => Some(self.rank().cmp(&other.rank())),
        }
    }
}

/// Number of blocks from the containing block to the tip, both inclusive.
///
/// Zero when either height is unknown. A tip below the containing block
/// (the block was reorganised away but the explorer still reports it)
/// also yields zero, so such a transaction reads as pending again.
#[must_use]
pub fn confirmation_depth(tip: Option<BlockHeight>, containing: Option<BlockHeight>) -> u32 {
    match (tip, containing) {
        (Some(tip), Some(block)) if *tip >= *block => *tip - *block + 1,
        _ => 0,
    }
}

#[must_use]
pub fn derive_status(
    tip: Option<BlockHeight>,
    containing: Option<BlockHeight>,
    target_depth: u32,
) -> ConfirmationStatus {
    status_for_depth(confirmation_depth(tip, containing), target_depth)
}

#[must_use]
pub fn status_for_depth(depth: u32, target_depth: u32) -> ConfirmationStatus {
    if depth == 0 {
        ConfirmationStatus::Pending
    } else if depth >= target_depth {
        ConfirmationStatus::Completed
    } else {
        ConfirmationStatus::Confirming {
            depth,
            target: target_depth,
        }
    }
}

/// Progress label capped at the target, e.g. `4/4 confirmations` for a
/// transaction buried 30 blocks deep.
pub fn confirmation_label(depth: u32, target_depth: u32) -> String {
    format!(
        "{}/{target_depth} confirmations",
        depth.min(target_depth)
    )
}
