//! The transfer protocol every holder speaks.
//!
//! Moving a thing is a query phase (`query_destination`, `query_add`,
//! `query_remove`, `query_max_count`) that never mutates, followed by a
//! commit phase (`remove_thing`, `add_thing`/`update_thing`) and the post
//! notifications. `World` sequences the calls; holders only answer for
//! themselves.

use crate::entities::effects::MagicEffect;
use crate::entities::item::ItemId;
use crate::world::position::Position;
use crate::world::state::World;
use crate::world::thing::{HolderId, SlotIndex, ThingId, ThingStore};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnValue {
    NoError,
    NotEnoughRoom,
    NotEnoughCapacity,
    CannotPickup,
    CannotMove,
    ThisIsImpossible,
    WrongItemType,
    NotPossible,
}

impl ReturnValue {
    pub fn is_ok(self) -> bool {
        self == ReturnValue::NoError
    }

    pub fn into_result(self) -> Result<(), ReturnValue> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Text shown to the player that issued the action.
    pub fn message(self) -> &'static str {
        match self {
            ReturnValue::NoError => "",
            ReturnValue::NotEnoughRoom => "There is not enough room.",
            ReturnValue::NotEnoughCapacity => "This object is too heavy.",
            ReturnValue::CannotPickup => "You cannot take this object.",
            ReturnValue::CannotMove => "You cannot move this object.",
            ReturnValue::ThisIsImpossible => "This is impossible.",
            ReturnValue::WrongItemType => "You cannot put this object there.",
            ReturnValue::NotPossible => "Sorry, not possible.",
        }
    }
}

impl fmt::Display for ReturnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnValue::NoError => f.write_str("no error"),
            other => f.write_str(other.message()),
        }
    }
}

/// Resolved target of an add: the holder that will really receive the
/// thing, the index inside it, and the stack it merges into, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Destination {
    pub holder: HolderId,
    pub index: SlotIndex,
    pub dest_item: Option<ItemId>,
}

impl Destination {
    pub fn here(holder: HolderId, index: SlotIndex) -> Self {
        Self {
            holder,
            index,
            dest_item: None,
        }
    }

    pub fn merge(holder: HolderId, index: usize, item: ItemId) -> Self {
        Self {
            holder,
            index: SlotIndex::At(index),
            dest_item: Some(item),
        }
    }
}

/// Follow-up work a holder asks for after a commit. The world applies these
/// before the transfer returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HolderEffect {
    /// Repeat the notification on the parent holder.
    NotifyParent,
    /// Move the thing on to a map position.
    Relocate {
        thing: ThingId,
        to: Position,
        effect: MagicEffect,
    },
    /// Destroy the item that was just added.
    Consume { item: ItemId },
    /// Show an effect at the holder's position.
    Effect(MagicEffect),
}

pub trait Cylinder {
    fn holder_id(&self) -> HolderId;

    fn query_add(
        &self,
        world: &World,
        index: SlotIndex,
        thing: ThingId,
        count: u16,
        child_is_owner: bool,
    ) -> ReturnValue;

    fn query_max_count(
        &self,
        world: &World,
        index: SlotIndex,
        thing: ThingId,
        count: u16,
    ) -> (ReturnValue, u16);

    fn query_remove(&self, world: &World, thing: ThingId, count: u16) -> ReturnValue;

    fn query_destination(&self, world: &World, index: SlotIndex, thing: ThingId) -> Destination;

    fn add_thing(&mut self, things: &mut ThingStore, index: SlotIndex, thing: ThingId);

    fn update_thing(&mut self, things: &mut ThingStore, thing: ThingId, count: u16);

    fn replace_thing(&mut self, things: &mut ThingStore, index: usize, thing: ThingId);

    fn remove_thing(&mut self, things: &mut ThingStore, thing: ThingId, count: u16);

    /// Move a thing already held here to another index without detaching it.
    fn reorder_thing(&mut self, thing: ThingId, index: SlotIndex);

    fn index_of_thing(&self, thing: ThingId) -> Option<usize>;

    fn thing(&self, index: usize) -> Option<ThingId>;

    fn contents(&self) -> Vec<ThingId>;

    fn post_add_notification(
        &mut self,
        things: &mut ThingStore,
        thing: ThingId,
        has_ownership: bool,
    ) -> Vec<HolderEffect>;

    fn post_remove_notification(
        &mut self,
        things: &mut ThingStore,
        thing: ThingId,
        had_ownership: bool,
    ) -> Vec<HolderEffect>;

    /// Insert without validation. Only for trusted bulk paths such as
    /// loading a world snapshot.
    fn internal_add_thing(&mut self, things: &mut ThingStore, index: SlotIndex, thing: ThingId);

    fn is_empty(&self) -> bool {
        self.contents().is_empty()
    }
}

/// Common `query_remove` checks for holders that keep what they receive.
pub(crate) fn check_removable(things: &ThingStore, thing: ThingId, count: u16) -> ReturnValue {
    let ThingId::Item(id) = thing else {
        return ReturnValue::NoError;
    };
    let Some(item) = things.item(id) else {
        return ReturnValue::NotPossible;
    };
    if item.locked {
        return ReturnValue::CannotMove;
    }
    let movable = things
        .item_type(id)
        .map(|item_type| item_type.movable)
        .unwrap_or(true);
    if !movable {
        return ReturnValue::CannotMove;
    }
    if count == 0 || count > item.count {
        return ReturnValue::NotPossible;
    }
    if !things.is_stackable(thing) && count != item.count {
        return ReturnValue::NotPossible;
    }
    ReturnValue::NoError
}

/// Units that still fit on top of `existing` when merging `thing` into it.
pub(crate) fn stack_room(things: &ThingStore, existing: ItemId, thing: ThingId) -> u16 {
    let Some(id) = thing.as_item() else {
        return 0;
    };
    if !things.can_stack(existing, id) {
        return 0;
    }
    let limit = things.stack_limit(thing);
    let current = things.item(existing).map(|item| item.count).unwrap_or(limit);
    limit.saturating_sub(current)
}

/// Clamp for a merge into `existing`, or for a fresh stack when `None`.
pub(crate) fn clamp_count(
    things: &ThingStore,
    existing: Option<ItemId>,
    thing: ThingId,
    count: u16,
) -> (ReturnValue, u16) {
    let room = match existing {
        Some(existing) => stack_room(things, existing, thing),
        None => things.stack_limit(thing),
    };
    let max = count.min(room);
    if max == 0 {
        (ReturnValue::NotEnoughRoom, 0)
    } else {
        (ReturnValue::NoError, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::item::{Item, ItemTypeId};
    use crate::world::item_types::{ItemType, ItemTypeIndex};

    fn store() -> ThingStore {
        let mut types = ItemTypeIndex::default();
        let mut potion = ItemType::new(ItemTypeId(7), "potion");
        potion.stackable = true;
        types.insert(potion).expect("potion");
        let mut statue = ItemType::new(ItemTypeId(8), "statue");
        statue.movable = false;
        types.insert(statue).expect("statue");
        ThingStore::new(types)
    }

    #[test]
    fn into_result_maps_no_error_to_ok() {
        assert_eq!(ReturnValue::NoError.into_result(), Ok(()));
        assert_eq!(
            ReturnValue::NotEnoughRoom.into_result(),
            Err(ReturnValue::NotEnoughRoom)
        );
        assert_eq!(ReturnValue::NotEnoughRoom.to_string(), "There is not enough room.");
    }

    #[test]
    fn clamp_at_full_stack_is_zero() {
        let mut store = store();
        let full = store.insert_item(Item::new(ItemTypeId(7), 100));
        let incoming = store.insert_item(Item::new(ItemTypeId(7), 10));
        assert_eq!(
            clamp_count(&store, Some(full), ThingId::Item(incoming), 10),
            (ReturnValue::NotEnoughRoom, 0)
        );
    }

    #[test]
    fn clamp_partial_merge() {
        let mut store = store();
        let existing = store.insert_item(Item::new(ItemTypeId(7), 30));
        let incoming = store.insert_item(Item::new(ItemTypeId(7), 80));
        assert_eq!(
            clamp_count(&store, Some(existing), ThingId::Item(incoming), 80),
            (ReturnValue::NoError, 70)
        );
        assert_eq!(
            clamp_count(&store, None, ThingId::Item(incoming), 80),
            (ReturnValue::NoError, 80)
        );
    }

    #[test]
    fn check_removable_rejects_fixed_and_locked_items() {
        let mut store = store();
        let statue = store.insert_item(Item::new(ItemTypeId(8), 1));
        assert_eq!(
            check_removable(&store, ThingId::Item(statue), 1),
            ReturnValue::CannotMove
        );
        let potion = store.insert_item(Item::new(ItemTypeId(7), 5));
        assert_eq!(
            check_removable(&store, ThingId::Item(potion), 6),
            ReturnValue::NotPossible
        );
        if let Some(item) = store.item_mut(potion) {
            item.locked = true;
        }
        assert_eq!(
            check_removable(&store, ThingId::Item(potion), 1),
            ReturnValue::CannotMove
        );
    }
}
