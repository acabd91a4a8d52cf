use crate::block::{Block, BlockId, BlockNum};

/// The stored record wrapping a candidate block with its height and an
/// `invalid` flag.
///
/// One [`ForkItem`] exists per block observed by
/// [`crate::ForkDatabase::push_block`]/[`crate::ForkDatabase::start_block`],
/// regardless of whether it currently lives in the linked or unlinked index.
/// Items are held by value and handed back to callers as copies — nothing in
/// this crate hands out long-lived references into the database.
#[derive(Debug, Clone)]
pub struct ForkItem<D> {
  pub id: BlockId,
  pub previous_id: BlockId,
  pub num: BlockNum,

  /// Set externally once a descendant of this block is found to violate a
  /// rule the fork database knows nothing about. No block may extend an
  /// item with this flag set.
  pub invalid: bool,

  /// The block payload, opaque to this crate.
  pub data: D,
}

impl<D> ForkItem<D> {
  pub fn new(block: &impl Block, data: D) -> Self {
    Self {
      id: block.id(),
      previous_id: block.previous_id(),
      num: block.block_num(),
      invalid: false,
      data,
    }
  }
}
