use crate::entities::effects::MagicEffect;
use crate::entities::item::ItemId;
use crate::telemetry::logging;
use crate::world::cylinder::{Cylinder, Destination, HolderEffect, ReturnValue};
use crate::world::position::Position;
use crate::world::state::World;
use crate::world::thing::{HolderId, SlotIndex, ThingId, ThingStore};

/// Redirect holder. Anything that enters is relayed to `destination` before
/// the transfer that delivered it returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Teleport {
    item: ItemId,
    destination: Option<Position>,
    held: Vec<ThingId>,
}

impl Teleport {
    pub fn new(item: ItemId) -> Self {
        Self {
            item,
            destination: None,
            held: Vec::new(),
        }
    }

    pub fn item(&self) -> ItemId {
        self.item
    }

    pub fn destination(&self) -> Option<Position> {
        self.destination
    }

    pub fn set_destination(&mut self, destination: Option<Position>) {
        self.destination = destination;
    }
}

impl Cylinder for Teleport {
    fn holder_id(&self) -> HolderId {
        HolderId::Item(self.item)
    }

    fn query_add(
        &self,
        world: &World,
        _index: SlotIndex,
        thing: ThingId,
        _count: u16,
        _child_is_owner: bool,
    ) -> ReturnValue {
        if self.destination.is_none() {
            return ReturnValue::ThisIsImpossible;
        }
        if let Some(item) = thing.as_item() {
            if world.things().is_ancestor(item, self.holder_id()) {
                return ReturnValue::ThisIsImpossible;
            }
        }
        ReturnValue::NoError
    }

    fn query_max_count(
        &self,
        _world: &World,
        _index: SlotIndex,
        _thing: ThingId,
        count: u16,
    ) -> (ReturnValue, u16) {
        (ReturnValue::NoError, count)
    }

    fn query_remove(&self, world: &World, thing: ThingId, count: u16) -> ReturnValue {
        if !self.held.contains(&thing) {
            return ReturnValue::NotPossible;
        }
        if count == 0 || count > world.things().count(thing) {
            return ReturnValue::NotPossible;
        }
        ReturnValue::NoError
    }

    fn query_destination(&self, _world: &World, _index: SlotIndex, _thing: ThingId) -> Destination {
        Destination::here(self.holder_id(), SlotIndex::Anywhere)
    }

    fn add_thing(&mut self, things: &mut ThingStore, _index: SlotIndex, thing: ThingId) {
        self.held.push(thing);
        things.set_parent(thing, Some(self.holder_id()));
    }

    fn update_thing(&mut self, _things: &mut ThingStore, thing: ThingId, _count: u16) {
        logging::log_error(&format!("teleport {:?} cannot update {:?}", self.item, thing));
    }

    fn replace_thing(&mut self, _things: &mut ThingStore, index: usize, thing: ThingId) {
        logging::log_error(&format!(
            "teleport {:?} cannot replace index {} with {:?}",
            self.item, index, thing
        ));
    }

    fn remove_thing(&mut self, things: &mut ThingStore, thing: ThingId, count: u16) {
        let Some(index) = self.index_of_thing(thing) else {
            logging::log_error(&format!("teleport {:?} remove of foreign thing {:?}", self.item, thing));
            return;
        };
        if let Some(item) = thing.as_item().and_then(|id| things.item_mut(id)) {
            if count < item.count {
                item.count -= count;
                return;
            }
        }
        self.held.remove(index);
        things.set_parent(thing, None);
    }

    fn reorder_thing(&mut self, _thing: ThingId, _index: SlotIndex) {}

    fn index_of_thing(&self, thing: ThingId) -> Option<usize> {
        self.held.iter().position(|other| *other == thing)
    }

    fn thing(&self, index: usize) -> Option<ThingId> {
        self.held.get(index).copied()
    }

    fn contents(&self) -> Vec<ThingId> {
        self.held.clone()
    }

    fn post_add_notification(
        &mut self,
        _things: &mut ThingStore,
        thing: ThingId,
        has_ownership: bool,
    ) -> Vec<HolderEffect> {
        let Some(to) = self.destination.filter(|_| has_ownership && self.held.contains(&thing)) else {
            return Vec::new();
        };
        vec![
            HolderEffect::Effect(MagicEffect::TELEPORT),
            HolderEffect::Relocate {
                thing,
                to,
                effect: MagicEffect::TELEPORT,
            },
        ]
    }

    fn post_remove_notification(
        &mut self,
        _things: &mut ThingStore,
        _thing: ThingId,
        _had_ownership: bool,
    ) -> Vec<HolderEffect> {
        Vec::new()
    }

    fn internal_add_thing(&mut self, things: &mut ThingStore, index: SlotIndex, thing: ThingId) {
        self.add_thing(things, index, thing);
    }
}
