use crate::world::thing::HolderId;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub u32);

static NEXT_ITEM_ID: AtomicU32 = AtomicU32::new(1);

impl ItemId {
    pub fn next() -> Self {
        let id = NEXT_ITEM_ID.fetch_add(1, Ordering::Relaxed);
        ItemId(id)
    }

    pub fn is_assigned(self) -> bool {
        self.0 != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemTypeId(pub u16);

/// Arena node for a single item. Placement is owned by the holder that
/// lists it; `parent` is the back-reference maintained by holder commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: ItemId,
    pub type_id: ItemTypeId,
    pub count: u16,
    pub locked: bool,
    pub(crate) parent: Option<HolderId>,
    pub(crate) content_weight: u32,
}

impl Item {
    pub fn new(type_id: ItemTypeId, count: u16) -> Self {
        Self {
            id: ItemId::next(),
            type_id,
            count,
            locked: false,
            parent: None,
            content_weight: 0,
        }
    }

    pub fn parent(&self) -> Option<HolderId> {
        self.parent
    }

    /// Weight of everything nested inside this item, kept current by the
    /// holder notifications.
    pub fn content_weight(&self) -> u32 {
        self.content_weight
    }

    /// Split `count` units off into a fresh, unplaced item of the same type.
    pub fn split_off(&self, count: u16) -> Item {
        Item::new(self.type_id, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_ids_are_unique_and_assigned() {
        let first = ItemId::next();
        let second = ItemId::next();
        assert_ne!(first, second);
        assert!(first.is_assigned());
        assert!(!ItemId(0).is_assigned());
    }

    #[test]
    fn new_item_is_unplaced() {
        let item = Item::new(ItemTypeId(3031), 12);
        assert_eq!(item.parent(), None);
        assert_eq!(item.content_weight(), 0);
        assert!(!item.locked);
    }

    #[test]
    fn split_off_gets_new_identity() {
        let item = Item::new(ItemTypeId(3031), 50);
        let split = item.split_off(20);
        assert_ne!(item.id, split.id);
        assert_eq!(split.type_id, item.type_id);
        assert_eq!(split.count, 20);
        assert_eq!(split.parent(), None);
    }
}
