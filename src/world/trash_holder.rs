use crate::entities::effects::MagicEffect;
use crate::entities::item::ItemId;
use crate::telemetry::logging;
use crate::world::cylinder::{Cylinder, Destination, HolderEffect, ReturnValue};
use crate::world::state::World;
use crate::world::thing::{HolderId, SlotIndex, ThingId, ThingStore};

/// Consuming holder: destroys whatever it receives and shows `effect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrashHolder {
    item: ItemId,
    effect: MagicEffect,
    held: Vec<ItemId>,
}

impl TrashHolder {
    pub fn new(item: ItemId, effect: MagicEffect) -> Self {
        Self {
            item,
            effect,
            held: Vec::new(),
        }
    }

    pub fn item(&self) -> ItemId {
        self.item
    }

    pub fn effect(&self) -> MagicEffect {
        self.effect
    }

    pub fn set_effect(&mut self, effect: MagicEffect) {
        self.effect = effect;
    }
}

impl Cylinder for TrashHolder {
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
        let things = world.things();
        let Some(item) = thing.as_item() else {
            return ReturnValue::NotPossible;
        };
        if things.is_ancestor(item, self.holder_id()) {
            return ReturnValue::ThisIsImpossible;
        }
        match things.item_type(item) {
            Some(item_type) if item_type.destructible => ReturnValue::NoError,
            Some(_) => ReturnValue::WrongItemType,
            None => ReturnValue::NotPossible,
        }
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

    fn query_remove(&self, _world: &World, _thing: ThingId, _count: u16) -> ReturnValue {
        ReturnValue::NotPossible
    }

    fn query_destination(&self, _world: &World, _index: SlotIndex, _thing: ThingId) -> Destination {
        Destination::here(self.holder_id(), SlotIndex::Anywhere)
    }

    fn add_thing(&mut self, things: &mut ThingStore, _index: SlotIndex, thing: ThingId) {
        let Some(item) = thing.as_item() else {
            logging::log_error(&format!("trash {:?} cannot hold {:?}", self.item, thing));
            return;
        };
        self.held.push(item);
        things.set_parent(thing, Some(self.holder_id()));
    }

    fn update_thing(&mut self, _things: &mut ThingStore, thing: ThingId, _count: u16) {
        logging::log_error(&format!("trash {:?} cannot update {:?}", self.item, thing));
    }

    fn replace_thing(&mut self, _things: &mut ThingStore, index: usize, thing: ThingId) {
        logging::log_error(&format!(
            "trash {:?} cannot replace index {} with {:?}",
            self.item, index, thing
        ));
    }

    fn remove_thing(&mut self, things: &mut ThingStore, thing: ThingId, _count: u16) {
        let Some(index) = self.index_of_thing(thing) else {
            return;
        };
        self.held.remove(index);
        things.set_parent(thing, None);
    }

    fn reorder_thing(&mut self, _thing: ThingId, _index: SlotIndex) {}

    fn index_of_thing(&self, thing: ThingId) -> Option<usize> {
        let item = thing.as_item()?;
        self.held.iter().position(|id| *id == item)
    }

    fn thing(&self, index: usize) -> Option<ThingId> {
        self.held.get(index).copied().map(ThingId::Item)
    }

    fn contents(&self) -> Vec<ThingId> {
        self.held.iter().copied().map(ThingId::Item).collect()
    }

    fn post_add_notification(
        &mut self,
        _things: &mut ThingStore,
        thing: ThingId,
        has_ownership: bool,
    ) -> Vec<HolderEffect> {
        match thing.as_item() {
            Some(item) if has_ownership && self.held.contains(&item) => vec![
                HolderEffect::Effect(self.effect),
                HolderEffect::Consume { item },
            ],
            _ => Vec::new(),
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::item::ItemTypeId;
    use crate::world::item_types::{ItemRole, ItemType, ItemTypeIndex};
    use crate::world::position::Position;
    use crate::world::state::WorldEvent;

    const BIN_TILE: Position = Position { x: 5, y: 5, z: 7 };
    const NEXT_TILE: Position = Position { x: 6, y: 5, z: 7 };
    const DUSTBIN: ItemTypeId = ItemTypeId(1777);
    const APPLE: ItemTypeId = ItemTypeId(3031);
    const RELIC: ItemTypeId = ItemTypeId(4000);

    fn world() -> (World, ItemId) {
        let mut types = ItemTypeIndex::default();
        let mut dustbin = ItemType::new(DUSTBIN, "dustbin");
        dustbin.movable = false;
        dustbin.role = Some(ItemRole::Trash {
            effect: MagicEffect::POFF,
        });
        types.insert(dustbin).expect("dustbin");
        types.insert(ItemType::new(APPLE, "apple")).expect("apple");
        let mut relic = ItemType::new(RELIC, "quest relic");
        relic.destructible = false;
        types.insert(relic).expect("relic");
        let mut world = World::new(types);
        world.add_tile(BIN_TILE);
        world.add_tile(NEXT_TILE);
        let bin = world.create_item(DUSTBIN, 1).expect("bin");
        world
            .add_item(HolderId::Tile(BIN_TILE), SlotIndex::Anywhere, bin)
            .expect("place bin");
        (world, bin)
    }

    #[test]
    fn protected_item_is_refused() {
        let (mut world, bin) = world();
        let relic = world.create_item(RELIC, 1).expect("relic");
        let trash = world.trash_holder(bin).expect("trash");
        assert_eq!(
            trash.query_add(&world, SlotIndex::Anywhere, ThingId::Item(relic), 1, false),
            ReturnValue::WrongItemType
        );
        assert_eq!(
            trash.query_add(&world, SlotIndex::Anywhere, ThingId::Item(bin), 1, false),
            ReturnValue::ThisIsImpossible
        );
    }

    #[test]
    fn trashed_item_ceases_to_exist_with_one_effect() {
        let (mut world, bin) = world();
        let apple = world.create_item(APPLE, 1).expect("apple");
        world
            .add_item(HolderId::Tile(NEXT_TILE), SlotIndex::Anywhere, apple)
            .expect("place apple");
        world.drain_events();

        let report = world
            .move_thing(
                HolderId::Tile(NEXT_TILE),
                ThingId::Item(apple),
                HolderId::Tile(BIN_TILE),
                SlotIndex::Anywhere,
                1,
            )
            .expect("move");

        assert_eq!(report.destination, HolderId::Item(bin));
        assert_eq!(report.final_holder, None);
        assert!(world.things().item(apple).is_none());
        assert!(world.trash_holder(bin).expect("trash").is_empty());
        let events = world.drain_events();
        let effects = events
            .iter()
            .filter(|event| {
                matches!(event, WorldEvent::MagicEffect { effect, .. } if *effect == MagicEffect::POFF)
            })
            .count();
        assert_eq!(effects, 1);
        assert!(events
            .iter()
            .any(|event| matches!(event, WorldEvent::ItemDestroyed { item, .. } if *item == apple)));
    }

    #[test]
    fn protected_item_stays_on_tile() {
        let (mut world, _) = world();
        let relic = world.create_item(RELIC, 1).expect("relic");
        world
            .add_item(HolderId::Tile(NEXT_TILE), SlotIndex::Anywhere, relic)
            .expect("place relic");
        world
            .move_thing(
                HolderId::Tile(NEXT_TILE),
                ThingId::Item(relic),
                HolderId::Tile(BIN_TILE),
                SlotIndex::Anywhere,
                1,
            )
            .expect("move");
        assert_eq!(world.tile(BIN_TILE).expect("tile").top_item(), Some(relic));
    }
}
