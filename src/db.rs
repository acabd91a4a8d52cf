use crate::{
  block::{Block, BlockId, BlockNum},
  config::ForkDbConfig,
  error::Error,
  index::ForkIndex,
  item::ForkItem,
};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// The maximum number of blocks that may be skipped in an out-of-order push
/// before a fetched branch would exceed the intended reorder depth.
///
/// This mirrors the upstream `MAX_BLOCK_REORDERING` constant: it documents
/// the design intent but is not enforced anywhere in this crate (`spec.md`
/// §7 calls it out explicitly as suggested, not enforced).
pub const MAX_BLOCK_REORDERING: u32 = 1024;

/// Tracks every candidate block observed near the tip of the chain,
/// organizes them into the tree of forks they induce, and answers the
/// structural queries a consensus engine needs to switch between forks.
///
/// Not internally synchronized — callers serialize access to a single
/// instance themselves, typically behind the lock that guards the rest of
/// the chain state.
pub struct ForkDatabase<D> {
  linked: ForkIndex<D>,
  unlinked: ForkIndex<D>,
  head: Option<BlockId>,
  max_window: BlockNum,
}

/// Whether linking a candidate item succeeded outright or found no known
/// parent. [`Error::InvalidParent`] is returned directly from [`try_link`]
/// rather than folded into this enum, since it is fatal and not something a
/// caller recovers from by staging the block.
enum LinkOutcome<D> {
  Linked(BlockId),
  Unlinkable(ForkItem<D>),
}

impl<D> ForkDatabase<D> {
  /// A fresh, empty database backed by ordinary heap allocation.
  pub fn new(config: ForkDbConfig) -> Self {
    Self {
      linked: ForkIndex::new(),
      unlinked: ForkIndex::new(),
      head: None,
      max_window: config.max_window,
    }
  }

  /// Clears both indexes and marks the head empty.
  pub fn reset(&mut self) {
    self.linked.clear();
    self.unlinked.clear();
    self.head = None;
  }

  /// Re-runs eviction against the current head with a new window size.
  pub fn set_max_size(&mut self, size: BlockNum) {
    self.max_window = size;
    if self.head.is_some() {
      self.evict();
    }
  }

  /// Seeds the database with `b` as the first block, without validating
  /// linkage. Intended for the genesis or recovery case.
  pub fn start_block(&mut self, b: &impl Block, data: D) {
    let item = ForkItem::new(b, data);
    self.head = Some(item.id);
    info!(id = %item.id, num = item.num, "seeded fork database");
    self.linked.insert(item);
  }

  /// Primary ingress. Admits `b` into the linked index if its parent is
  /// known, or stages it in the unlinked index otherwise. Returns the
  /// resulting head item (the longest known chain).
  ///
  /// A block whose parent is absent is staged, not rejected — it never
  /// surfaces [`Error::UnlinkableBlock`] to the caller. A block whose parent
  /// is known but flagged invalid does surface [`Error::InvalidParent`].
  pub fn push_block(
    &mut self,
    b: &impl Block,
    data: D,
  ) -> Result<ForkItem<D>, Error>
  where
    D: Clone,
  {
    let item = ForkItem::new(b, data);
    match self.try_link(item) {
      Ok(LinkOutcome::Linked(id)) => self.promote_orphans(id),
      Ok(LinkOutcome::Unlinkable(orphan)) => {
        let reason = Error::UnlinkableBlock(orphan.previous_id);
        warn!(id = %orphan.id, %reason, "staging block as orphan");
        self.unlinked.insert(orphan);
      }
      Err(e) => return Err(e),
    }
    Ok(
      self
        .head()
        .expect("push_block always leaves a non-empty head"),
    )
  }

  /// Attempts to admit `item` into the linked index.
  ///
  /// Returns [`LinkOutcome::Unlinkable`] (handing the item back) if its
  /// parent is not present in the linked index yet, or
  /// [`Error::InvalidParent`] if the parent is present but flagged invalid.
  /// Otherwise links the item, advances the head if it is now the deepest
  /// known block (ties keep the incumbent head), and runs eviction.
  fn try_link(
    &mut self,
    item: ForkItem<D>,
  ) -> Result<LinkOutcome<D>, Error> {
    if !self.linked.is_empty() && !item.previous_id.is_zero() {
      match self.linked.get(&item.previous_id) {
        None => return Ok(LinkOutcome::Unlinkable(item)),
        Some(parent) if parent.invalid => {
          return Err(Error::InvalidParent(item.previous_id))
        }
        Some(parent) => {
          debug_assert!(
            parent.num < item.num,
            "acyclic invariant violated: parent num {} >= child num {}",
            parent.num,
            item.num
          );
        }
      }
    }

    let id = item.id;
    let num = item.num;
    let becomes_head = match self.head_num() {
      None => true,
      Some(head_num) => num > head_num,
    };

    self.linked.insert(item);

    if becomes_head {
      self.head = Some(id);
      info!(id = %id, num, "head advanced");
      self.evict();
    }

    Ok(LinkOutcome::Linked(id))
  }

  /// Given a newly linked item's id, promotes every unlinked descendant
  /// depth-first. Implemented with an explicit worklist rather than mutual
  /// recursion between linking and promotion, so promotion depth is bounded
  /// by heap rather than stack (`spec.md` §9).
  fn promote_orphans(&mut self, root: BlockId) {
    let mut worklist = VecDeque::from([root]);

    while let Some(parent_id) = worklist.pop_front() {
      let children: Vec<BlockId> =
        self.unlinked.by_previous(&parent_id).copied().collect();

      for child_id in children {
        let Some(orphan) = self.unlinked.erase_by_id(&child_id) else {
          continue;
        };

        match self.try_link(orphan) {
          Ok(LinkOutcome::Linked(linked_id)) => {
            debug!(id = %linked_id, parent = %parent_id, "promoted orphan");
            worklist.push_back(linked_id);
          }
          Ok(LinkOutcome::Unlinkable(_)) => {
            // Can't happen: the orphan's previous_id is parent_id, which we
            // just confirmed is linked.
          }
          Err(Error::InvalidParent(_)) => {
            // Dropped, not reinserted: its parent is invalid.
          }
          Err(e) => warn!(error = %e, "unexpected error during orphan promotion"),
        }
      }
    }
  }

  fn head_num(&self) -> Option<BlockNum> {
    self.head.and_then(|h| self.linked.get(&h)).map(|it| it.num)
  }

  /// Evicts items with `num < head.num - max_window` from both indexes.
  fn evict(&mut self) {
    let head_num = self.head_num().unwrap_or(0);
    let min_keep = head_num.saturating_sub(self.max_window);
    self.linked.evict_below(min_keep);
    self.unlinked.evict_below(min_keep);
  }

  /// Resets the head to the current head's `previous_id`. Does not remove
  /// the popped block from the index — callers may still fetch it. This is
  /// a cursor operation, not a deletion.
  pub fn pop_block(&mut self)
  where
    D: Clone,
  {
    let previous = self
      .head
      .and_then(|h| self.fetch_block(&h))
      .map(|it| it.previous_id)
      .unwrap_or(BlockId::ZERO);
    self.head = Some(previous);
  }

  /// Erases `id` from the linked index only; the unlinked index is not
  /// swept.
  pub fn remove(&mut self, id: &BlockId) {
    self.linked.erase_by_id(id);
  }

  /// Overrides the head pointer to `item.id`, without checking that the
  /// item is present in either index.
  pub fn set_head(&mut self, item: &ForkItem<D>) {
    self.head = Some(item.id);
  }

  /// The current head item, or `None` if the database is empty or the head
  /// pointer no longer resolves to a known block.
  pub fn head(&self) -> Option<ForkItem<D>>
  where
    D: Clone,
  {
    self.head.and_then(|h| self.fetch_block(&h))
  }

  pub fn is_known_block(&self, id: &BlockId) -> bool {
    self.linked.contains_id(id) || self.unlinked.contains_id(id)
  }

  /// Looks up `id`, first in the linked index, then in the unlinked index.
  pub fn fetch_block(&self, id: &BlockId) -> Option<ForkItem<D>>
  where
    D: Clone,
  {
    self
      .linked
      .get(id)
      .or_else(|| self.unlinked.get(id))
      .cloned()
  }

  /// A mutable handle to a known block's fork item, e.g. to set
  /// [`ForkItem::invalid`]. Only the linked index is searched, matching
  /// `spec.md`'s statement that mutation happens "via the item's address
  /// returned from the index."
  pub fn fetch_block_mut(&mut self, id: &BlockId) -> Option<&mut ForkItem<D>> {
    self.linked.get_mut(id)
  }

  /// Every item in the linked index at height `num`, in ascending
  /// insertion-stable order. Orphans are not included.
  pub fn fetch_block_by_number(&self, num: BlockNum) -> Vec<ForkItem<D>>
  where
    D: Clone,
  {
    self.linked.by_num(num).cloned().collect()
  }

  /// Splits the fork graph at the common ancestor of `a` and `b`.
  ///
  /// Both must be present in the linked index, or this fails with
  /// [`Error::UnknownBlock`]. Returned branches are ordered head-down to the
  /// child of the common ancestor; the common ancestor itself is never
  /// included. If `a == b`, both branches are empty. If one is an ancestor
  /// of the other, that one's branch is empty and the other lists its
  /// descendants down to (but not including) the ancestor.
  pub fn fetch_branch_from(
    &self,
    a: &BlockId,
    b: &BlockId,
  ) -> Result<(Vec<ForkItem<D>>, Vec<ForkItem<D>>), Error>
  where
    D: Clone,
  {
    let mut cursor_a =
      self.linked.get(a).cloned().ok_or(Error::UnknownBlock(*a))?;
    let mut cursor_b =
      self.linked.get(b).cloned().ok_or(Error::UnknownBlock(*b))?;

    let mut branch_a = Vec::new();
    let mut branch_b = Vec::new();

    while cursor_a.num > cursor_b.num {
      branch_a.push(cursor_a.clone());
      match self.fetch_block(&cursor_a.previous_id) {
        Some(parent) => cursor_a = parent,
        None => return Ok((branch_a, branch_b)),
      }
    }

    while cursor_b.num > cursor_a.num {
      branch_b.push(cursor_b.clone());
      match self.fetch_block(&cursor_b.previous_id) {
        Some(parent) => cursor_b = parent,
        None => return Ok((branch_a, branch_b)),
      }
    }

    while cursor_a.id != cursor_b.id
      && cursor_a.previous_id != cursor_b.previous_id
    {
      branch_a.push(cursor_a.clone());
      branch_b.push(cursor_b.clone());
      let (next_a, next_b) = match (
        self.fetch_block(&cursor_a.previous_id),
        self.fetch_block(&cursor_b.previous_id),
      ) {
        (Some(x), Some(y)) => (x, y),
        _ => return Ok((branch_a, branch_b)),
      };
      cursor_a = next_a;
      cursor_b = next_b;
    }

    // cursor_a and cursor_b now share a parent. If they are the same block,
    // one of the original endpoints was an ancestor of the other and that
    // block *is* the common ancestor — it is excluded from both branches.
    // Otherwise they are two distinct children of the common ancestor and
    // both belong in their respective branches.
    if cursor_a.id != cursor_b.id {
      branch_a.push(cursor_a);
      branch_b.push(cursor_b);
    }

    Ok((branch_a, branch_b))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::ForkDbConfig;

  #[derive(Clone, Copy)]
  struct TestBlock {
    id: BlockId,
    previous_id: BlockId,
    num: BlockNum,
  }

  impl Block for TestBlock {
    fn id(&self) -> BlockId {
      self.id
    }
    fn previous_id(&self) -> BlockId {
      self.previous_id
    }
    fn block_num(&self) -> BlockNum {
      self.num
    }
  }

  fn id(b: u8) -> BlockId {
    BlockId::new([b; 20])
  }

  fn block(i: u8, prev: u8, num: BlockNum) -> TestBlock {
    TestBlock {
      id: id(i),
      previous_id: id(prev),
      num,
    }
  }

  fn db() -> ForkDatabase<()> {
    ForkDatabase::new(ForkDbConfig { max_window: 1024 })
  }

  // Scenario 1: linear chain.
  #[test]
  fn linear_chain() {
    let mut fdb = db();
    fdb.start_block(&block(1, 0, 1), ());
    fdb.push_block(&block(2, 1, 2), ()).unwrap();
    fdb.push_block(&block(3, 2, 3), ()).unwrap();
    let head = fdb.push_block(&block(4, 3, 4), ()).unwrap();

    assert_eq!(head.id, id(4));
    assert_eq!(fdb.head().unwrap().id, id(4));

    let (branch_a, branch_b) =
      fdb.fetch_branch_from(&id(4), &id(3)).unwrap();
    assert_eq!(branch_a.iter().map(|x| x.id).collect::<Vec<_>>(), vec![id(4)]);
    assert!(branch_b.is_empty());
  }

  // Scenario 2: simple fork with tie-break, then extend one side.
  #[test]
  fn simple_fork_tie_break_and_divergent_branches() {
    let mut fdb = db();
    fdb.start_block(&block(1, 0, 1), ()); // G
    fdb.push_block(&block(2, 1, 2), ()).unwrap(); // A
    let head = fdb.push_block(&block(3, 2, 3), ()).unwrap(); // B1, first at height 3
    assert_eq!(head.id, id(3));

    let head = fdb.push_block(&block(4, 2, 3), ()).unwrap(); // B2, same height
    assert_eq!(head.id, id(3), "first block at a height keeps the head");

    let head = fdb.push_block(&block(5, 4, 4), ()).unwrap(); // C2, child of B2
    assert_eq!(head.id, id(5));

    let (branch_a, branch_b) =
      fdb.fetch_branch_from(&id(5), &id(3)).unwrap();
    assert_eq!(
      branch_a.iter().map(|x| x.id).collect::<Vec<_>>(),
      vec![id(5), id(4)]
    );
    assert_eq!(branch_b.iter().map(|x| x.id).collect::<Vec<_>>(), vec![id(3)]);
  }

  // Scenario 3: out-of-order arrival via the orphan index.
  #[test]
  fn out_of_order_arrival_promotes_orphans() {
    let mut fdb = db();
    fdb.start_block(&block(1, 0, 1), ()); // G

    fdb.push_block(&block(4, 3, 4), ()).unwrap(); // C, parent B missing
    assert!(!fdb.is_known_block(&id(3)));
    assert!(fdb.is_known_block(&id(4)));
    assert_eq!(fdb.head().unwrap().id, id(1));

    fdb.push_block(&block(3, 2, 3), ()).unwrap(); // B, parent A missing
    assert_eq!(fdb.head().unwrap().id, id(1));

    let head = fdb.push_block(&block(2, 1, 2), ()).unwrap(); // A links everything
    assert_eq!(head.id, id(4));
    assert!(fdb.is_known_block(&id(2)));
    assert!(fdb.is_known_block(&id(3)));
    assert!(fdb.is_known_block(&id(4)));
  }

  // Scenario 4: orphan with invalid parent.
  #[test]
  fn invalid_parent_rejects_descendant() {
    let mut fdb = db();
    fdb.start_block(&block(1, 0, 1), ()); // G
    fdb.push_block(&block(2, 1, 2), ()).unwrap(); // A
    fdb.fetch_block_mut(&id(2)).unwrap().invalid = true;

    let err = fdb.push_block(&block(3, 2, 3), ()).unwrap_err();
    assert!(matches!(err, Error::InvalidParent(p) if p == id(2)));
    assert!(!fdb.is_known_block(&id(3)));
  }

  // Scenario 5: sliding-window eviction.
  #[test]
  fn sliding_window_evicts_old_blocks() {
    let mut fdb = ForkDatabase::<()>::new(ForkDbConfig { max_window: 3 });
    fdb.start_block(&block(1, 0, 1), ());
    for n in 2..=10u8 {
      fdb.push_block(&block(n, n - 1, n as u32), ()).unwrap();
    }

    for n in 1..=6u8 {
      assert!(fdb.fetch_block(&id(n)).is_none(), "block {n} should be evicted");
    }
    for n in 7..=10u8 {
      assert!(fdb.fetch_block(&id(n)).is_some(), "block {n} should survive");
    }
  }

  // Scenario 6: common ancestor at the root.
  #[test]
  fn common_ancestor_at_root() {
    let mut fdb = db();
    fdb.start_block(&block(1, 0, 1), ()); // G

    fdb.push_block(&block(2, 1, 2), ()).unwrap(); // A1
    fdb.push_block(&block(3, 2, 3), ()).unwrap(); // B1

    fdb.push_block(&block(4, 1, 2), ()).unwrap(); // A2
    fdb.push_block(&block(5, 4, 3), ()).unwrap(); // B2

    let (branch_a, branch_b) =
      fdb.fetch_branch_from(&id(3), &id(5)).unwrap();
    assert_eq!(
      branch_a.iter().map(|x| x.id).collect::<Vec<_>>(),
      vec![id(3), id(2)]
    );
    assert_eq!(
      branch_b.iter().map(|x| x.id).collect::<Vec<_>>(),
      vec![id(5), id(4)]
    );
    assert_eq!(branch_a.last().unwrap().previous_id, id(1));
    assert_eq!(branch_b.last().unwrap().previous_id, id(1));
  }

  #[test]
  fn fetch_branch_from_identical_endpoints_is_empty() {
    let mut fdb = db();
    fdb.start_block(&block(1, 0, 1), ());
    fdb.push_block(&block(2, 1, 2), ()).unwrap();

    let (branch_a, branch_b) =
      fdb.fetch_branch_from(&id(2), &id(2)).unwrap();
    assert!(branch_a.is_empty());
    assert!(branch_b.is_empty());
  }

  #[test]
  fn fetch_branch_from_unknown_block_errors() {
    let mut fdb = db();
    fdb.start_block(&block(1, 0, 1), ());
    let err = fdb.fetch_branch_from(&id(1), &id(99)).unwrap_err();
    assert!(matches!(err, Error::UnknownBlock(x) if x == id(99)));
  }

  #[test]
  fn pop_block_moves_head_without_removing_from_index() {
    let mut fdb = db();
    fdb.start_block(&block(1, 0, 1), ());
    fdb.push_block(&block(2, 1, 2), ()).unwrap();

    fdb.pop_block();
    assert_eq!(fdb.head().unwrap().id, id(1));
    assert!(fdb.is_known_block(&id(2)), "pop_block must not delete");
  }

  #[test]
  fn remove_only_touches_linked_index() {
    let mut fdb = db();
    fdb.start_block(&block(1, 0, 1), ());
    fdb.push_block(&block(3, 2, 3), ()).unwrap(); // orphan, parent missing

    fdb.remove(&id(1));
    assert!(!fdb.is_known_block(&id(1)));
    assert!(fdb.is_known_block(&id(3)), "unlinked index is untouched by remove");
  }

  #[test]
  fn reset_clears_everything() {
    let mut fdb = db();
    fdb.start_block(&block(1, 0, 1), ());
    fdb.push_block(&block(3, 2, 3), ()).unwrap();

    fdb.reset();
    assert!(fdb.head().is_none());
    assert!(!fdb.is_known_block(&id(1)));
    assert!(!fdb.is_known_block(&id(3)));
  }

  #[test]
  fn set_max_size_reevicts_against_current_head() {
    let mut fdb = db();
    fdb.start_block(&block(1, 0, 1), ());
    for n in 2..=10u8 {
      fdb.push_block(&block(n, n - 1, n as u32), ()).unwrap();
    }

    fdb.set_max_size(2);
    for n in 1..=7u8 {
      assert!(fdb.fetch_block(&id(n)).is_none());
    }
    for n in 8..=10u8 {
      assert!(fdb.fetch_block(&id(n)).is_some());
    }
  }

  #[test]
  fn set_head_does_not_validate_membership() {
    let mut fdb = db();
    fdb.start_block(&block(1, 0, 1), ());
    let phantom = ForkItem {
      id: id(42),
      previous_id: id(1),
      num: 2,
      invalid: false,
      data: (),
    };
    fdb.set_head(&phantom);
    assert!(
      fdb.head().is_none(),
      "head points past what is actually indexed"
    );
  }

  #[test]
  fn fetch_block_by_number_excludes_orphans() {
    let mut fdb = db();
    fdb.start_block(&block(1, 0, 1), ()); // G
    fdb.push_block(&block(2, 1, 2), ()).unwrap(); // A
    fdb.push_block(&block(3, 2, 3), ()).unwrap(); // B1
    fdb.push_block(&block(4, 2, 3), ()).unwrap(); // B2, same height
    fdb.push_block(&block(9, 8, 3), ()).unwrap(); // orphan, parent 8 missing

    let at_height_3: Vec<_> =
      fdb.fetch_block_by_number(3).into_iter().map(|x| x.id).collect();
    assert_eq!(at_height_3, vec![id(3), id(4)]);
  }

  #[test]
  fn no_orphan_ever_has_a_linked_parent() {
    let mut fdb = db();
    fdb.start_block(&block(1, 0, 1), ());

    // Push blocks out of order; every intermediate state should satisfy the
    // invariant that no unlinked item's parent is present in the linked
    // index.
    for (i, prev, num) in [(4, 3, 4), (3, 2, 3), (2, 1, 2), (6, 5, 6), (5, 4, 5)] {
      fdb.push_block(&block(i, prev, num), ()).unwrap();
      for orphan_id in [3u8, 4, 5, 6] {
        if let Some(orphan) = fdb.unlinked.get(&id(orphan_id)) {
          assert!(
            !fdb.linked.contains_id(&orphan.previous_id),
            "orphan {orphan_id} has a parent that is already linked"
          );
        }
      }
    }
  }

  #[test]
  fn in_order_linear_push_head_tracks_max_num() {
    let mut fdb = db();
    fdb.start_block(&block(1, 0, 1), ());
    for n in 2..=20u8 {
      let head = fdb.push_block(&block(n, n - 1, n as u32), ()).unwrap();
      assert_eq!(head.num, n as u32);
      assert!(fdb.is_known_block(&id(n)));
    }
  }
}
