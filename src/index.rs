use crate::{
  block::{BlockId, BlockNum},
  item::ForkItem,
};
use std::collections::{BTreeMap, HashMap};

/// A multi-key container over [`ForkItem`], exposing the three lookup modes
/// `spec.md` §4.1 asks of both the linked and unlinked indexes:
///
/// - **by-id**: unique hash lookup on `id` — the primary key.
/// - **by-previous**: non-unique hash lookup on `previous_id` — used to
///   promote orphans out of the unlinked index.
/// - **by-num**: ordered (ascending) lookup on `num` — used for eviction and
///   height queries, preserving insertion order among items at the same
///   height.
///
/// All three views are updated together by [`Self::insert`] and
/// [`Self::erase_by_id`] so that no caller can observe them out of sync —
/// the substrate does not expose raw access to any one view for mutation.
#[derive(Debug, Default)]
pub struct ForkIndex<D> {
  by_id: HashMap<BlockId, ForkItem<D>>,
  by_previous: HashMap<BlockId, Vec<BlockId>>,
  by_num: BTreeMap<BlockNum, Vec<BlockId>>,
}

impl<D> ForkIndex<D> {
  pub fn new() -> Self {
    Self {
      by_id: HashMap::new(),
      by_previous: HashMap::new(),
      by_num: BTreeMap::new(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.by_id.is_empty()
  }

  pub fn len(&self) -> usize {
    self.by_id.len()
  }

  pub fn contains_id(&self, id: &BlockId) -> bool {
    self.by_id.contains_key(id)
  }

  pub fn get(&self, id: &BlockId) -> Option<&ForkItem<D>> {
    self.by_id.get(id)
  }

  pub fn get_mut(&mut self, id: &BlockId) -> Option<&mut ForkItem<D>> {
    self.by_id.get_mut(id)
  }

  /// Inserts `item` into all three views. Overwrites any existing item with
  /// the same id (the by-id view is the primary key).
  pub fn insert(&mut self, item: ForkItem<D>) {
    let id = item.id;
    let previous_id = item.previous_id;
    let num = item.num;

    self.by_previous.entry(previous_id).or_default().push(id);
    self.by_num.entry(num).or_default().push(id);
    self.by_id.insert(id, item);
  }

  /// Removes `id` from all three views, returning the removed item if it was
  /// present.
  pub fn erase_by_id(&mut self, id: &BlockId) -> Option<ForkItem<D>> {
    let item = self.by_id.remove(id)?;

    if let Some(siblings) = self.by_previous.get_mut(&item.previous_id) {
      siblings.retain(|x| x != id);
      if siblings.is_empty() {
        self.by_previous.remove(&item.previous_id);
      }
    }

    if let Some(peers) = self.by_num.get_mut(&item.num) {
      peers.retain(|x| x != id);
      if peers.is_empty() {
        self.by_num.remove(&item.num);
      }
    }

    Some(item)
  }

  /// All items directly parented by `previous_id`, in insertion order.
  pub fn by_previous(&self, previous_id: &BlockId) -> impl Iterator<Item = &BlockId> {
    self
      .by_previous
      .get(previous_id)
      .into_iter()
      .flat_map(|v| v.iter())
  }

  /// All items at height `num`, in ascending insertion-stable order.
  pub fn by_num(&self, num: BlockNum) -> impl Iterator<Item = &ForkItem<D>> {
    self
      .by_num
      .get(&num)
      .into_iter()
      .flat_map(|ids| ids.iter().filter_map(|id| self.by_id.get(id)))
  }

  /// The smallest `num` currently present, if any.
  pub fn min_num(&self) -> Option<BlockNum> {
    self.by_num.keys().next().copied()
  }

  /// Erases every item whose `num < min_keep`, scanning from the lowest
  /// height upward as `spec.md` §4.5 describes.
  pub fn evict_below(&mut self, min_keep: BlockNum) {
    let stale: Vec<BlockNum> = self
      .by_num
      .range(..min_keep)
      .map(|(num, _)| *num)
      .collect();

    for num in stale {
      if let Some(ids) = self.by_num.remove(&num) {
        for id in ids {
          if let Some(item) = self.by_id.remove(&id) {
            if let Some(siblings) = self.by_previous.get_mut(&item.previous_id) {
              siblings.retain(|x| *x != id);
              if siblings.is_empty() {
                self.by_previous.remove(&item.previous_id);
              }
            }
          }
        }
      }
    }
  }

  pub fn clear(&mut self) {
    self.by_id.clear();
    self.by_previous.clear();
    self.by_num.clear();
  }
}
