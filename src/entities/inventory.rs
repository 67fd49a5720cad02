use crate::entities::creature::CreatureId;
use crate::entities::item::ItemId;
use crate::telemetry::logging;
use crate::world::cylinder::{
    check_removable, clamp_count, stack_room, Cylinder, Destination, HolderEffect, ReturnValue,
};
use crate::world::state::World;
use crate::world::thing::{HolderId, SlotIndex, ThingId, ThingStore};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventorySlot {
    Head,
    Necklace,
    Backpack,
    Armor,
    RightHand,
    LeftHand,
    Legs,
    Feet,
    Ring,
    Ammo,
}

impl InventorySlot {
    const COUNT: usize = 10;

    pub fn index(self) -> usize {
        match self {
            InventorySlot::Head => 0,
            InventorySlot::Necklace => 1,
            InventorySlot::Backpack => 2,
            InventorySlot::Armor => 3,
            InventorySlot::RightHand => 4,
            InventorySlot::LeftHand => 5,
            InventorySlot::Legs => 6,
            InventorySlot::Feet => 7,
            InventorySlot::Ring => 8,
            InventorySlot::Ammo => 9,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(InventorySlot::Head),
            1 => Some(InventorySlot::Necklace),
            2 => Some(InventorySlot::Backpack),
            3 => Some(InventorySlot::Armor),
            4 => Some(InventorySlot::RightHand),
            5 => Some(InventorySlot::LeftHand),
            6 => Some(InventorySlot::Legs),
            7 => Some(InventorySlot::Feet),
            8 => Some(InventorySlot::Ring),
            9 => Some(InventorySlot::Ammo),
            _ => None,
        }
    }

    /// Hands and the ammo slot take anything; body slots only take items
    /// made for them.
    pub fn accepts(self, item_slot: Option<InventorySlot>) -> bool {
        match self {
            InventorySlot::RightHand | InventorySlot::LeftHand | InventorySlot::Ammo => true,
            slot => item_slot == Some(slot),
        }
    }
}

pub const INVENTORY_SLOTS: [InventorySlot; 10] = [
    InventorySlot::Head,
    InventorySlot::Necklace,
    InventorySlot::Backpack,
    InventorySlot::Armor,
    InventorySlot::RightHand,
    InventorySlot::LeftHand,
    InventorySlot::Legs,
    InventorySlot::Feet,
    InventorySlot::Ring,
    InventorySlot::Ammo,
];

/// Equipment of one creature. Carried weight is recomputed into the
/// creature after every add or remove notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inventory {
    creature: CreatureId,
    slots: Vec<Option<ItemId>>,
}

impl Inventory {
    pub fn new(creature: CreatureId) -> Self {
        Self {
            creature,
            slots: vec![None; InventorySlot::COUNT],
        }
    }

    pub fn creature(&self) -> CreatureId {
        self.creature
    }

    pub fn slot(&self, slot: InventorySlot) -> Option<ItemId> {
        self.slots.get(slot.index()).copied().flatten()
    }

    pub fn slot_of(&self, item: ItemId) -> Option<InventorySlot> {
        self.slots
            .iter()
            .position(|entry| *entry == Some(item))
            .and_then(InventorySlot::from_index)
    }

    pub fn items(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.slots.iter().filter_map(|entry| *entry)
    }

    /// Total weight of everything equipped, nested contents included.
    pub fn weight(&self, things: &ThingStore) -> u32 {
        self.items()
            .map(|id| things.total_weight(ThingId::Item(id)))
            .fold(0u32, u32::saturating_add)
    }

    pub fn recompute_weight(&self, things: &mut ThingStore) {
        let weight = self.weight(things);
        if let Some(creature) = things.creature_mut(self.creature) {
            creature.carried_weight = weight;
        }
    }

    fn item_slot(things: &ThingStore, item: ItemId) -> Option<InventorySlot> {
        things.item_type(item).and_then(|item_type| item_type.slot)
    }

    fn free_slot_for(&self, things: &ThingStore, item: ItemId) -> Option<InventorySlot> {
        let wanted = Self::item_slot(things, item);
        INVENTORY_SLOTS
            .into_iter()
            .find(|slot| self.slot(*slot).is_none() && slot.accepts(wanted))
    }

    fn mergeable_stack(&self, things: &ThingStore, item: ItemId) -> Option<(usize, ItemId)> {
        self.slots.iter().enumerate().find_map(|(index, entry)| {
            let existing = (*entry)?;
            (things.can_stack(existing, item) && stack_room(things, existing, ThingId::Item(item)) > 0)
                .then_some((index, existing))
        })
    }

    fn owns(&self, things: &ThingStore, item: ItemId) -> bool {
        things
            .parent(ThingId::Item(item))
            .and_then(|parent| things.owner_creature(parent))
            == Some(self.creature)
    }

    fn check_capacity(&self, things: &ThingStore, item: ItemId, count: u16) -> ReturnValue {
        if self.owns(things, item) {
            return ReturnValue::NoError;
        }
        let free = things
            .creature(self.creature)
            .map(|creature| creature.free_capacity())
            .unwrap_or(0);
        if things.weight_of(ThingId::Item(item), count) > free {
            ReturnValue::NotEnoughCapacity
        } else {
            ReturnValue::NoError
        }
    }
}

impl Cylinder for Inventory {
    fn holder_id(&self) -> HolderId {
        HolderId::Inventory(self.creature)
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
        let Some(item_type) = things.item_type(item) else {
            return ReturnValue::NotPossible;
        };
        if child_is_owner {
            return self.check_capacity(things, item, count);
        }
        if !item_type.pickupable {
            return ReturnValue::CannotPickup;
        }
        match index {
            SlotIndex::At(index) => {
                let Some(slot) = InventorySlot::from_index(index) else {
                    return ReturnValue::NotPossible;
                };
                if !slot.accepts(item_type.slot) {
                    return ReturnValue::WrongItemType;
                }
                if let Some(existing) = self.slot(slot) {
                    if existing != item && !things.can_stack(existing, item) {
                        return ReturnValue::NotEnoughRoom;
                    }
                }
            }
            SlotIndex::Anywhere => {
                if self.free_slot_for(things, item).is_none()
                    && self.mergeable_stack(things, item).is_none()
                {
                    return ReturnValue::NotEnoughRoom;
                }
            }
        }
        self.check_capacity(things, item, count)
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
        let existing = match index {
            SlotIndex::At(index) => self
                .slots
                .get(index)
                .copied()
                .flatten()
                .filter(|existing| things.can_stack(*existing, item)),
            SlotIndex::Anywhere => self.mergeable_stack(things, item).map(|(_, id)| id),
        };
        let (result, mut max) = clamp_count(things, existing, thing, count);
        if !result.is_ok() {
            return (result, max);
        }
        if !self.owns(things, item) {
            let unit = things.weight_of(thing, 1);
            if unit > 0 {
                let free = things
                    .creature(self.creature)
                    .map(|creature| creature.free_capacity())
                    .unwrap_or(0);
                let affordable = (free / unit).min(u32::from(u16::MAX)) as u16;
                max = max.min(affordable);
            }
        }
        if max == 0 {
            (ReturnValue::NotEnoughCapacity, 0)
        } else {
            (ReturnValue::NoError, max)
        }
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
            return Destination::here(self.holder_id(), index);
        };
        match index {
            SlotIndex::At(index) => {
                let Some(existing) = self.slots.get(index).copied().flatten() else {
                    return Destination::here(self.holder_id(), SlotIndex::At(index));
                };
                if existing != item && world.container(existing).is_some() {
                    return Destination::here(HolderId::Item(existing), SlotIndex::Anywhere);
                }
                if things.can_stack(existing, item) && stack_room(things, existing, thing) > 0 {
                    return Destination::merge(self.holder_id(), index, existing);
                }
                Destination::here(self.holder_id(), SlotIndex::At(index))
            }
            SlotIndex::Anywhere => {
                if let Some((index, existing)) = self.mergeable_stack(things, item) {
                    return Destination::merge(self.holder_id(), index, existing);
                }
                if let Some(slot) = self.free_slot_for(things, item) {
                    return Destination::here(self.holder_id(), SlotIndex::At(slot.index()));
                }
                if let Some(backpack) = self.slot(InventorySlot::Backpack) {
                    if backpack != item && world.container(backpack).is_some() {
                        return Destination::here(HolderId::Item(backpack), SlotIndex::Anywhere);
                    }
                }
                Destination::here(self.holder_id(), SlotIndex::Anywhere)
            }
        }
    }

    fn add_thing(&mut self, things: &mut ThingStore, index: SlotIndex, thing: ThingId) {
        let Some(item) = thing.as_item() else {
            logging::log_error(&format!("inventory {:?} cannot hold {:?}", self.creature, thing));
            return;
        };
        let slot = match index {
            SlotIndex::At(index) => InventorySlot::from_index(index),
            SlotIndex::Anywhere => self.free_slot_for(things, item),
        };
        let Some(entry) = slot.and_then(|slot| self.slots.get_mut(slot.index())) else {
            logging::log_error(&format!("inventory {:?} has no slot for {:?}", self.creature, item));
            return;
        };
        if entry.is_some() {
            logging::log_error(&format!("inventory {:?} slot {:?} already occupied", self.creature, slot));
            return;
        }
        *entry = Some(item);
        things.set_parent(thing, Some(self.holder_id()));
    }

    fn update_thing(&mut self, things: &mut ThingStore, thing: ThingId, count: u16) {
        let Some(item) = thing.as_item().filter(|_| self.index_of_thing(thing).is_some()) else {
            logging::log_error(&format!("inventory {:?} update of foreign thing {:?}", self.creature, thing));
            return;
        };
        if let Some(item) = things.item_mut(item) {
            item.count = count;
        }
    }

    fn replace_thing(&mut self, things: &mut ThingStore, index: usize, thing: ThingId) {
        let (Some(entry), Some(item)) = (self.slots.get_mut(index), thing.as_item()) else {
            logging::log_error(&format!("inventory {:?} replace at bad index {}", self.creature, index));
            return;
        };
        if let Some(previous) = entry.replace(item) {
            things.set_parent(ThingId::Item(previous), None);
        }
        things.set_parent(thing, Some(HolderId::Inventory(self.creature)));
    }

    fn remove_thing(&mut self, things: &mut ThingStore, thing: ThingId, count: u16) {
        let Some(index) = self.index_of_thing(thing) else {
            logging::log_error(&format!("inventory {:?} remove of foreign thing {:?}", self.creature, thing));
            return;
        };
        if let Some(item) = thing.as_item().and_then(|id| things.item_mut(id)) {
            if count < item.count {
                item.count -= count;
                return;
            }
        }
        self.slots[index] = None;
        things.set_parent(thing, None);
    }

    fn reorder_thing(&mut self, thing: ThingId, index: SlotIndex) {
        let (Some(current), SlotIndex::At(target)) = (self.index_of_thing(thing), index) else {
            return;
        };
        if target < self.slots.len() && self.slots[target].is_none() {
            self.slots.swap(current, target);
        }
    }

    fn index_of_thing(&self, thing: ThingId) -> Option<usize> {
        let item = thing.as_item()?;
        self.slots.iter().position(|entry| *entry == Some(item))
    }

    fn thing(&self, index: usize) -> Option<ThingId> {
        self.slots.get(index).copied().flatten().map(ThingId::Item)
    }

    fn contents(&self) -> Vec<ThingId> {
        self.items().map(ThingId::Item).collect()
    }

    fn post_add_notification(
        &mut self,
        things: &mut ThingStore,
        _thing: ThingId,
        _has_ownership: bool,
    ) -> Vec<HolderEffect> {
        self.recompute_weight(things);
        Vec::new()
    }

    fn post_remove_notification(
        &mut self,
        things: &mut ThingStore,
        _thing: ThingId,
        _had_ownership: bool,
    ) -> Vec<HolderEffect> {
        self.recompute_weight(things);
        Vec::new()
    }

    fn internal_add_thing(&mut self, things: &mut ThingStore, index: SlotIndex, thing: ThingId) {
        self.add_thing(things, index, thing);
        self.recompute_weight(things);
    }
}
