use std::fmt;

/// Identifier of a block, an opaque 20-byte hash.
///
/// The fork database never inspects the bytes beyond equality, hashing and
/// ordering; hashing the block payload itself is the caller's job.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BlockId([u8; 20]);

impl BlockId {
  /// The sentinel identifier used by genesis-like blocks that have no
  /// parent.
  pub const ZERO: BlockId = BlockId([0u8; 20]);

  pub const fn new(bytes: [u8; 20]) -> Self {
    Self(bytes)
  }

  pub fn is_zero(&self) -> bool {
    *self == Self::ZERO
  }

  pub fn as_bytes(&self) -> &[u8; 20] {
    &self.0
  }
}

impl From<[u8; 20]> for BlockId {
  fn from(bytes: [u8; 20]) -> Self {
    Self(bytes)
  }
}

impl fmt::Display for BlockId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", bs58::encode(&self.0).into_string())
  }
}

impl fmt::Debug for BlockId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "BlockId({self})")
  }
}

/// Block height. Monotone with chain depth on any single fork.
pub type BlockNum = u32;

/// The interface the fork database needs from a candidate block.
///
/// Everything else about the block — its transactions, signatures, and how
/// its hash is computed — is opaque to this crate.
pub trait Block {
  /// This block's own identifier.
  fn id(&self) -> BlockId;

  /// The identifier of the block this one builds on.
  ///
  /// [`BlockId::ZERO`] marks a root with no known parent (genesis, or a
  /// recovery checkpoint admitted via [`crate::ForkDatabase::start_block`]).
  fn previous_id(&self) -> BlockId;

  /// This block's height.
  fn block_num(&self) -> BlockNum;
}
