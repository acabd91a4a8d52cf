use serde::{Deserialize, Serialize};

/// The maximum depth below the head that a [`crate::ForkDatabase`] retains.
///
/// Blocks whose `num` falls more than `max_window` below the head's `num`
/// are evicted from both the linked and unlinked indexes. This mirrors the
/// `MAX_BLOCK_REORDERING` constant from the upstream design: it bounds how
/// far a consensus engine may reorder/reorg before history is gone.
pub const DEFAULT_MAX_WINDOW: u32 = 1024;

/// Configuration for a [`crate::ForkDatabase`].
///
/// Kept as its own `serde`-derived struct, in the style of the wider node's
/// configuration types, so it can be embedded in a larger node config file
/// even though this crate itself has no CLI to parse one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkDbConfig {
  /// See [`DEFAULT_MAX_WINDOW`].
  pub max_window: u32,
}

impl Default for ForkDbConfig {
  fn default() -> Self {
    Self {
      max_window: DEFAULT_MAX_WINDOW,
    }
  }
}
