use crate::block::BlockId;
use thiserror::Error;

/// Errors surfaced by the fork database.
///
/// [`Error::UnlinkableBlock`] is raised internally by the linking step but
/// never escapes [`crate::ForkDatabase::push_block`] — a block that fails to
/// link is staged in the unlinked index instead, per the design note in
/// `spec.md` §7: orphan blocks are staged, not rejected.
#[derive(Debug, Error)]
pub enum Error {
  #[error("block does not link to a known chain: parent {0} not found")]
  UnlinkableBlock(BlockId),

  #[error("parent block {0} is flagged invalid, refusing to extend it")]
  InvalidParent(BlockId),

  #[error("block {0} is not known to the linked index")]
  UnknownBlock(BlockId),
}
