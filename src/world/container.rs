use crate::entities::item::ItemId;
use crate::telemetry::logging;
use crate::world::cylinder::{
    check_removable, clamp_count, stack_room, Cylinder, Destination, HolderEffect, ReturnValue,
};
use crate::world::state::World;
use crate::world::thing::{HolderId, SlotIndex, ThingId, ThingStore};

/// Bounded item holder backed by a container item. New items go to the
/// front, like a freshly dropped item on top of a bag's contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    item: ItemId,
    capacity: u16,
    slots: Vec<ItemId>,
}

impl Container {
    pub fn new(item: ItemId, capacity: u16) -> Self {
        Self {
            item,
            capacity,
            slots: Vec::new(),
        }
    }

    pub fn item(&self) -> ItemId {
        self.item
    }

    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() >= usize::from(self.capacity)
    }

    pub fn items(&self) -> &[ItemId] {
        &self.slots
    }

    /// Sum of the total weight of every item inside, nested contents
    /// included.
    pub fn weight(&self, things: &ThingStore) -> u32 {
        self.slots
            .iter()
            .map(|id| things.total_weight(ThingId::Item(*id)))
            .fold(0u32, u32::saturating_add)
    }

    fn recompute_weight(&self, things: &mut ThingStore) {
        let weight = self.weight(things);
        if let Some(item) = things.item_mut(self.item) {
            item.content_weight = weight;
        }
    }

    fn mergeable_stack(&self, things: &ThingStore, item: ItemId) -> Option<(usize, ItemId)> {
        self.slots.iter().enumerate().find_map(|(index, existing)| {
            (things.can_stack(*existing, item)
                && stack_room(things, *existing, ThingId::Item(item)) > 0)
                .then_some((index, *existing))
        })
    }

    /// A whole item already held here only changes position; a split of it
    /// still needs a free slot.
    fn reorders(&self, things: &ThingStore, item: ItemId, count: u16) -> bool {
        self.slots.contains(&item) && count >= things.count(ThingId::Item(item))
    }

    fn stack_at(&self, things: &ThingStore, index: SlotIndex, item: ItemId) -> Option<ItemId> {
        match index {
            SlotIndex::At(index) => self
                .slots
                .get(index)
                .copied()
                .filter(|existing| things.can_stack(*existing, item)),
            SlotIndex::Anywhere => None,
        }
    }

    /// First nested container, by slot order, that would take the thing.
    fn descend_target(&self, world: &World, thing: ThingId) -> Option<ItemId> {
        let count = world.things().count(thing);
        self.slots.iter().copied().find(|id| {
            ThingId::Item(*id) != thing
                && world
                    .container(*id)
                    .map(|nested| {
                        nested
                            .query_add(world, SlotIndex::Anywhere, thing, count, false)
                            .is_ok()
                    })
                    .unwrap_or(false)
        })
    }
}

impl Cylinder for Container {
    fn holder_id(&self) -> HolderId {
        HolderId::Item(self.item)
    }

    fn query_add(
        &self,
        world: &World,
        index: SlotIndex,
        thing: ThingId,
        count: u16,
        child_is_owner: bool,
    ) -> ReturnValue {
        let things = world.things();
        let Some(item) = thing.as_item() else {
            return ReturnValue::NotPossible;
        };
        let parent = things.holder_parent(self.holder_id());
        if !child_is_owner {
            if things.is_ancestor(item, self.holder_id()) {
                return ReturnValue::ThisIsImpossible;
            }
            let Some(item_type) = things.item_type(item) else {
                return ReturnValue::NotPossible;
            };
            if !item_type.pickupable {
                return ReturnValue::CannotPickup;
            }
            if !self.reorders(things, item, count)
                && self.stack_at(things, index, item).is_none()
                && self.is_full()
            {
                return ReturnValue::NotEnoughRoom;
            }
        }
        match parent.and_then(|parent| world.holder(parent)) {
            Some(parent) => parent.query_add(world, SlotIndex::Anywhere, thing, count, true),
            None => ReturnValue::NoError,
        }
    }

    fn query_max_count(
        &self,
        world: &World,
        index: SlotIndex,
        thing: ThingId,
        count: u16,
    ) -> (ReturnValue, u16) {
        let things = world.things();
        let Some(item) = thing.as_item() else {
            return (ReturnValue::NotPossible, 0);
        };
        let existing = self.stack_at(things, index, item);
        if existing.is_none() && self.is_full() && !self.reorders(things, item, count) {
            return (ReturnValue::NotEnoughRoom, 0);
        }
        clamp_count(things, existing, thing, count)
    }

    fn query_remove(&self, world: &World, thing: ThingId, count: u16) -> ReturnValue {
        if self.index_of_thing(thing).is_none() {
            return ReturnValue::NotPossible;
        }
        check_removable(world.things(), thing, count)
    }

    fn query_destination(&self, world: &World, index: SlotIndex, thing: ThingId) -> Destination {
        let things = world.things();
        let Some(item) = thing.as_item() else {
            return Destination::here(self.holder_id(), SlotIndex::Anywhere);
        };
        if let SlotIndex::At(index) = index {
            if let Some(existing) = self.slots.get(index).copied() {
                if existing != item && world.container(existing).is_some() {
                    return Destination::here(HolderId::Item(existing), SlotIndex::Anywhere);
                }
                if things.can_stack(existing, item) && stack_room(things, existing, thing) > 0 {
                    return Destination::merge(self.holder_id(), index, existing);
                }
            }
        }
        if let Some((index, existing)) = self.mergeable_stack(things, item) {
            return Destination::merge(self.holder_id(), index, existing);
        }
        if self.is_full() && !self.slots.contains(&item) {
            if let Some(nested) = self.descend_target(world, thing) {
                return Destination::here(HolderId::Item(nested), SlotIndex::Anywhere);
            }
        }
        Destination::here(self.holder_id(), SlotIndex::Anywhere)
    }

    fn add_thing(&mut self, things: &mut ThingStore, index: SlotIndex, thing: ThingId) {
        let Some(item) = thing.as_item() else {
            logging::log_error(&format!("container {:?} cannot hold {:?}", self.item, thing));
            return;
        };
        match index {
            SlotIndex::At(index) if index < self.slots.len() => self.slots.insert(index, item),
            SlotIndex::At(_) => self.slots.push(item),
            SlotIndex::Anywhere => self.slots.insert(0, item),
        }
        things.set_parent(thing, Some(self.holder_id()));
    }

    fn update_thing(&mut self, things: &mut ThingStore, thing: ThingId, count: u16) {
        let Some(id) = thing.as_item().filter(|id| self.slots.contains(id)) else {
            logging::log_error(&format!("container {:?} update of foreign thing {:?}", self.item, thing));
            return;
        };
        if let Some(item) = things.item_mut(id) {
            item.count = count;
        }
    }

    fn replace_thing(&mut self, things: &mut ThingStore, index: usize, thing: ThingId) {
        let (Some(slot), Some(item)) = (self.slots.get_mut(index), thing.as_item()) else {
            logging::log_error(&format!("container {:?} replace at bad index {}", self.item, index));
            return;
        };
        let previous = std::mem::replace(slot, item);
        things.set_parent(ThingId::Item(previous), None);
        things.set_parent(thing, Some(HolderId::Item(self.item)));
    }

    fn remove_thing(&mut self, things: &mut ThingStore, thing: ThingId, count: u16) {
        let Some(index) = self.index_of_thing(thing) else {
            logging::log_error(&format!("container {:?} remove of foreign thing {:?}", self.item, thing));
            return;
        };
        if let Some(item) = thing.as_item().and_then(|id| things.item_mut(id)) {
            if count < item.count {
                item.count -= count;
                return;
            }
        }
        self.slots.remove(index);
        things.set_parent(thing, None);
    }

    fn reorder_thing(&mut self, thing: ThingId, index: SlotIndex) {
        let Some(current) = self.index_of_thing(thing) else {
            return;
        };
        let item = self.slots.remove(current);
        match index {
            SlotIndex::At(index) if index < self.slots.len() => self.slots.insert(index, item),
            SlotIndex::At(_) => self.slots.push(item),
            SlotIndex::Anywhere => self.slots.insert(0, item),
        }
    }

    fn index_of_thing(&self, thing: ThingId) -> Option<usize> {
        let item = thing.as_item()?;
        self.slots.iter().position(|id| *id == item)
    }

    fn thing(&self, index: usize) -> Option<ThingId> {
        self.slots.get(index).copied().map(ThingId::Item)
    }

    fn contents(&self) -> Vec<ThingId> {
        self.slots.iter().copied().map(ThingId::Item).collect()
    }

    fn post_add_notification(
        &mut self,
        things: &mut ThingStore,
        _thing: ThingId,
        _has_ownership: bool,
    ) -> Vec<HolderEffect> {
        self.recompute_weight(things);
        vec![HolderEffect::NotifyParent]
    }

    fn post_remove_notification(
        &mut self,
        things: &mut ThingStore,
        _thing: ThingId,
        _had_ownership: bool,
    ) -> Vec<HolderEffect> {
        self.recompute_weight(things);
        vec![HolderEffect::NotifyParent]
    }

    fn internal_add_thing(&mut self, things: &mut ThingStore, index: SlotIndex, thing: ThingId) {
        let index = match index {
            SlotIndex::Anywhere => SlotIndex::At(self.slots.len()),
            index => index,
        };
        self.add_thing(things, index, thing);
        self.recompute_weight(things);
    }
}
