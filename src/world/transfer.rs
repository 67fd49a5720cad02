//! Transfer orchestration: resolve the real destination, run the query
//! phase against both holders, then commit and notify.

use crate::entities::effects::MagicEffect;
use crate::entities::item::{ItemId, ItemTypeId};
use crate::telemetry::logging;
use crate::world::cylinder::{Destination, ReturnValue};
use crate::world::position::Position;
use crate::world::state::{World, WorldEvent};
use crate::world::thing::{HolderId, SlotIndex, ThingId};

/// Redirect hops (auto-descend, teleport/trash on a tile) followed while
/// resolving one destination.
const MAX_REDIRECTS: usize = 16;
/// Nested teleport relays allowed before the thing is set down directly.
const MAX_RELOCATIONS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveReport {
    /// What now sits in the destination: the original thing, a split-off
    /// part of it, or the stack it merged into.
    pub thing: ThingId,
    pub moved: u16,
    /// Units left behind at the source (or in the unplaced item for adds).
    pub remainder: u16,
    /// Holder that accepted the thing after redirects.
    pub destination: HolderId,
    /// Where the thing ended up once holder side effects ran; `None` when
    /// it was consumed.
    pub final_holder: Option<HolderId>,
}

impl World {
    /// Move `count` units of `thing` out of `src` into `dst`.
    pub fn move_thing(
        &mut self,
        src: HolderId,
        thing: ThingId,
        dst: HolderId,
        index: SlotIndex,
        count: u16,
    ) -> Result<MoveReport, ReturnValue> {
        if self.things.parent(thing) != Some(src) {
            return Err(ReturnValue::NotPossible);
        }
        let result = self.transfer(Some(src), thing, dst, index, count);
        match &result {
            Ok(report) => logging::log_transfer(&format!(
                "move {:?} x{} {:?} -> {:?} (left {})",
                thing, report.moved, src, report.destination, report.remainder
            )),
            Err(err) => logging::log_transfer(&format!(
                "move {:?} x{} {:?} -> {:?} refused: {:?}",
                thing, count, src, dst, err
            )),
        }
        result
    }

    /// Insert an unplaced item. Units that do not fit stay in `item`.
    pub fn add_item(
        &mut self,
        holder: HolderId,
        index: SlotIndex,
        item: ItemId,
    ) -> Result<MoveReport, ReturnValue> {
        let placed = self.things.item(item).map(|item| item.parent().is_some());
        if placed != Some(false) {
            return Err(ReturnValue::NotPossible);
        }
        let thing = ThingId::Item(item);
        let count = self.things.count(thing);
        self.transfer(None, thing, holder, index, count)
    }

    /// Put an unplaced item straight onto the tile at `position`. Teleports
    /// and trash holders lying there do not take it.
    pub fn set_item_down(&mut self, position: Position, item: ItemId) -> Result<(), ReturnValue> {
        let thing = ThingId::Item(item);
        let tile = HolderId::Tile(position);
        if !self.things.contains(thing) || self.things.parent(thing).is_some() {
            return Err(ReturnValue::NotPossible);
        }
        if !self.holders.contains_key(&tile) {
            return Err(ReturnValue::NotPossible);
        }
        self.with_holder_mut(tile, |cylinder, things| {
            cylinder.internal_add_thing(things, SlotIndex::Anywhere, thing)
        });
        self.events.push(WorldEvent::ThingAppeared { thing, holder: tile });
        self.notify_add(tile, thing);
        Ok(())
    }

    /// Remove `count` units of a placed item, destroying it when nothing is
    /// left. Returns the units remaining.
    pub fn remove_item(&mut self, item: ItemId, count: u16) -> Result<u16, ReturnValue> {
        let thing = ThingId::Item(item);
        let holder = self.things.parent(thing).ok_or(ReturnValue::NotPossible)?;
        self.holder(holder)
            .ok_or(ReturnValue::NotPossible)?
            .query_remove(self, thing, count)
            .into_result()?;
        let available = self.things.count(thing);
        self.with_holder_mut(holder, |cylinder, things| cylinder.remove_thing(things, thing, count));
        self.notify_remove(holder, thing);
        if count >= available {
            self.destroy_detached(item);
            logging::log_transfer(&format!("remove {:?} from {:?}", thing, holder));
            return Ok(0);
        }
        Ok(available - count)
    }

    /// Replace an item in place with a new item of another type. Contents
    /// of a container carry over when the new type can hold them.
    pub fn transform_item(&mut self, item: ItemId, new_type: ItemTypeId) -> Result<ItemId, ReturnValue> {
        let thing = ThingId::Item(item);
        let holder = self.things.parent(thing).ok_or(ReturnValue::NotPossible)?;
        let index = self
            .holder(holder)
            .and_then(|cylinder| cylinder.index_of_thing(thing))
            .ok_or(ReturnValue::NotPossible)?;
        let count = self.things.count(thing);
        let item_type = self
            .things
            .types()
            .get(new_type)
            .ok_or(ReturnValue::WrongItemType)?;
        let count = count.min(item_type.stack_limit());
        let capacity = item_type.container_capacity();
        let contents = self
            .holder(HolderId::Item(item))
            .map(|cylinder| cylinder.contents())
            .unwrap_or_default();
        if !contents.is_empty() {
            match capacity {
                Some(capacity) if usize::from(capacity) >= contents.len() => {}
                _ => return Err(ReturnValue::NotEnoughRoom),
            }
        }
        let replacement = self
            .create_item(new_type, count)
            .map_err(|_| ReturnValue::NotPossible)?;
        for content in contents {
            let units = self.things.count(content);
            self.with_holder_mut(HolderId::Item(item), |cylinder, things| {
                cylinder.remove_thing(things, content, units)
            });
            self.with_holder_mut(HolderId::Item(replacement), |cylinder, things| {
                cylinder.internal_add_thing(things, SlotIndex::Anywhere, content)
            });
        }
        let new_thing = ThingId::Item(replacement);
        self.with_holder_mut(holder, |cylinder, things| {
            cylinder.replace_thing(things, index, new_thing)
        });
        self.destroy_detached(item);
        self.events.push(WorldEvent::ThingAppeared {
            thing: new_thing,
            holder,
        });
        self.notify_add(holder, new_thing);
        Ok(replacement)
    }

    /// Follow `query_destination` until a holder answers for itself.
    fn resolve_destination(
        &self,
        dst: HolderId,
        index: SlotIndex,
        thing: ThingId,
    ) -> Result<Destination, ReturnValue> {
        let mut holder = dst;
        let mut index = index;
        for _ in 0..MAX_REDIRECTS {
            let cylinder = self.holder(holder).ok_or(ReturnValue::NotPossible)?;
            let destination = cylinder.query_destination(self, index, thing);
            if destination.holder == holder {
                return Ok(destination);
            }
            holder = destination.holder;
            index = destination.index;
        }
        Err(ReturnValue::ThisIsImpossible)
    }

    fn transfer(
        &mut self,
        src: Option<HolderId>,
        thing: ThingId,
        dst: HolderId,
        index: SlotIndex,
        count: u16,
    ) -> Result<MoveReport, ReturnValue> {
        if !self.things.contains(thing) {
            return Err(ReturnValue::NotPossible);
        }
        let count = match thing {
            ThingId::Creature(_) => 1,
            ThingId::Item(_) => count,
        };
        let available = self.things.count(thing);
        if count == 0 || count > available {
            return Err(ReturnValue::NotPossible);
        }

        let destination = self.resolve_destination(dst, index, thing)?;
        let target = self
            .holder(destination.holder)
            .ok_or(ReturnValue::NotPossible)?;
        target
            .query_add(self, destination.index, thing, count, false)
            .into_result()?;
        if let Some(src) = src {
            self.holder(src)
                .ok_or(ReturnValue::NotPossible)?
                .query_remove(self, thing, count)
                .into_result()?;
        }
        let (result, max) = target.query_max_count(self, destination.index, thing, count);
        if max == 0 {
            return Err(if result.is_ok() {
                ReturnValue::NotEnoughRoom
            } else {
                result
            });
        }
        let moved = max.min(count);
        let remainder = count - moved;
        let whole = moved >= available;

        if src == Some(destination.holder) && destination.dest_item.is_none() && whole {
            self.with_holder_mut(destination.holder, |cylinder, _| {
                cylinder.reorder_thing(thing, destination.index)
            });
            self.events.push(WorldEvent::ThingMoved {
                thing,
                from: destination.holder,
                to: destination.holder,
            });
            return Ok(MoveReport {
                thing,
                moved,
                remainder,
                destination: destination.holder,
                final_holder: Some(destination.holder),
            });
        }

        if let Some(src) = src {
            self.with_holder_mut(src, |cylinder, things| cylinder.remove_thing(things, thing, moved));
        }
        let placed = match (destination.dest_item, thing) {
            (Some(stack), ThingId::Item(item)) => {
                let merged = self.things.count(ThingId::Item(stack)).saturating_add(moved);
                self.with_holder_mut(destination.holder, |cylinder, things| {
                    cylinder.update_thing(things, ThingId::Item(stack), merged)
                });
                if whole {
                    self.things.take_item(item);
                } else if src.is_none() {
                    self.shrink_unplaced(item, moved);
                }
                ThingId::Item(stack)
            }
            (_, ThingId::Item(item)) if !whole => {
                let split = self
                    .things
                    .item(item)
                    .map(|original| original.split_off(moved))
                    .ok_or(ReturnValue::NotPossible)?;
                let split = ThingId::Item(self.things.insert_item(split));
                if src.is_none() {
                    self.shrink_unplaced(item, moved);
                }
                self.with_holder_mut(destination.holder, |cylinder, things| {
                    cylinder.add_thing(things, destination.index, split)
                });
                split
            }
            _ => {
                self.with_holder_mut(destination.holder, |cylinder, things| {
                    cylinder.add_thing(things, destination.index, thing)
                });
                thing
            }
        };

        self.events.push(match src {
            Some(src) => WorldEvent::ThingMoved {
                thing: placed,
                from: src,
                to: destination.holder,
            },
            None => WorldEvent::ThingAppeared {
                thing: placed,
                holder: destination.holder,
            },
        });
        if let Some(src) = src {
            self.notify_remove(src, thing);
        }
        self.notify_add(destination.holder, placed);

        Ok(MoveReport {
            thing: placed,
            moved,
            remainder,
            destination: destination.holder,
            final_holder: self.things.parent(placed),
        })
    }

    fn shrink_unplaced(&mut self, item: ItemId, units: u16) {
        if let Some(item) = self.things.item_mut(item) {
            item.count = item.count.saturating_sub(units);
        }
    }

    /// Relay a thing held by a teleport to `to`. When the regular transfer
    /// is refused, or relays nest too deep, the thing is set down on the
    /// target tile (or the teleport's own tile) without further redirects.
    pub(crate) fn relocate(&mut self, from: HolderId, thing: ThingId, to: Position, effect: MagicEffect) {
        if self.things.parent(thing) != Some(from) {
            return;
        }
        let count = self.things.count(thing);
        let outcome = if self.relocation_depth >= MAX_RELOCATIONS || self.tile(to).is_none() {
            Err(ReturnValue::NotPossible)
        } else {
            self.relocation_depth += 1;
            let outcome = self.transfer(Some(from), thing, HolderId::Tile(to), SlotIndex::Anywhere, count);
            self.relocation_depth -= 1;
            outcome
        };
        match outcome {
            Ok(report) => {
                self.events.push(WorldEvent::MagicEffect {
                    position: to,
                    effect,
                });
                if report.remainder > 0 {
                    self.set_down(from, thing, to);
                }
            }
            Err(err) => {
                logging::log_error(&format!(
                    "teleport {:?} could not relay {:?} to {}: {:?}",
                    from, thing, to, err
                ));
                self.set_down(from, thing, to);
            }
        }
    }

    fn set_down(&mut self, from: HolderId, thing: ThingId, to: Position) {
        let target = [Some(to), self.things.holder_position(from)]
            .into_iter()
            .flatten()
            .map(HolderId::Tile)
            .find(|tile| self.holders.contains_key(tile));
        let count = self.things.count(thing);
        self.with_holder_mut(from, |cylinder, things| cylinder.remove_thing(things, thing, count));
        match target {
            Some(tile) => {
                self.with_holder_mut(tile, |cylinder, things| {
                    cylinder.internal_add_thing(things, SlotIndex::Anywhere, thing)
                });
                self.events.push(WorldEvent::ThingMoved {
                    thing,
                    from,
                    to: tile,
                });
            }
            None => {
                logging::log_error(&format!("no tile left for {:?} from {:?}", thing, from));
                match thing {
                    ThingId::Item(item) => self.destroy_detached(item),
                    ThingId::Creature(_) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::creature::{Creature, CreatureId, CreatureKind};
    use crate::entities::inventory::InventorySlot;
    use crate::world::item_types::{ItemRole, ItemType, ItemTypeIndex};

    const LEFT: Position = Position { x: 10, y: 10, z: 7 };
    const RIGHT: Position = Position { x: 11, y: 10, z: 7 };
    const POTION: ItemTypeId = ItemTypeId(266);
    const BAG: ItemTypeId = ItemTypeId(1987);
    const FLOWER: ItemTypeId = ItemTypeId(2743);
    const ROSE: ItemTypeId = ItemTypeId(2744);

    fn world() -> World {
        let mut types = ItemTypeIndex::default();
        let mut potion = ItemType::new(POTION, "health potion");
        potion.stackable = true;
        potion.weight = 180;
        types.insert(potion).expect("potion");
        let mut bag = ItemType::new(BAG, "bag");
        bag.weight = 800;
        bag.slot = Some(InventorySlot::Backpack);
        bag.role = Some(ItemRole::Container { capacity: 8 });
        types.insert(bag).expect("bag");
        types.insert(ItemType::new(FLOWER, "flower")).expect("flower");
        types.insert(ItemType::new(ROSE, "rose")).expect("rose");
        let mut world = World::new(types);
        world.add_tile(LEFT);
        world.add_tile(RIGHT);
        world
    }

    fn place(world: &mut World, holder: HolderId, type_id: ItemTypeId, count: u16) -> ItemId {
        let item = world.create_item(type_id, count).expect("create");
        world
            .add_item(holder, SlotIndex::Anywhere, item)
            .expect("place");
        item
    }

    #[test]
    fn partial_merge_leaves_remainder_at_source() {
        let mut world = world();
        let bag = place(&mut world, HolderId::Tile(RIGHT), BAG, 1);
        let target = place(&mut world, HolderId::Item(bag), POTION, 30);
        let source = place(&mut world, HolderId::Tile(LEFT), POTION, 80);

        let report = world
            .move_thing(
                HolderId::Tile(LEFT),
                ThingId::Item(source),
                HolderId::Item(bag),
                SlotIndex::At(0),
                80,
            )
            .expect("move");

        assert_eq!(report.moved, 70);
        assert_eq!(report.remainder, 10);
        assert_eq!(report.thing, ThingId::Item(target));
        assert_eq!(world.things().item(target).expect("target").count, 100);
        assert_eq!(world.things().item(source).expect("source").count, 10);
        assert_eq!(world.things().parent(ThingId::Item(source)), Some(HolderId::Tile(LEFT)));
        assert!(world.audit().is_empty());
    }

    #[test]
    fn splitting_a_stack_creates_new_item() {
        let mut world = world();
        let source = place(&mut world, HolderId::Tile(LEFT), POTION, 50);
        let report = world
            .move_thing(
                HolderId::Tile(LEFT),
                ThingId::Item(source),
                HolderId::Tile(RIGHT),
                SlotIndex::Anywhere,
                20,
            )
            .expect("split");
        assert_ne!(report.thing, ThingId::Item(source));
        assert_eq!(world.things().count(report.thing), 20);
        assert_eq!(world.things().count(ThingId::Item(source)), 30);
        assert_eq!(report.final_holder, Some(HolderId::Tile(RIGHT)));
    }

    #[test]
    fn cycle_is_rejected_without_mutation() {
        let mut world = world();
        let outer = place(&mut world, HolderId::Tile(LEFT), BAG, 1);
        let inner = place(&mut world, HolderId::Item(outer), BAG, 1);

        let result = world.move_thing(
            HolderId::Tile(LEFT),
            ThingId::Item(outer),
            HolderId::Item(inner),
            SlotIndex::Anywhere,
            1,
        );
        assert_eq!(result, Err(ReturnValue::ThisIsImpossible));
        assert_eq!(world.things().parent(ThingId::Item(outer)), Some(HolderId::Tile(LEFT)));
        assert_eq!(world.things().parent(ThingId::Item(inner)), Some(HolderId::Item(outer)));
        assert!(world.audit().is_empty());
    }

    #[test]
    fn reorder_within_one_holder_keeps_identity() {
        let mut world = world();
        let bag = place(&mut world, HolderId::Tile(LEFT), BAG, 1);
        let flower = place(&mut world, HolderId::Item(bag), FLOWER, 1);
        let rose = place(&mut world, HolderId::Item(bag), ROSE, 1);
        assert_eq!(world.container(bag).expect("bag").items(), &[rose, flower]);

        let report = world
            .move_thing(
                HolderId::Item(bag),
                ThingId::Item(flower),
                HolderId::Item(bag),
                SlotIndex::Anywhere,
                1,
            )
            .expect("reorder");
        assert_eq!(report.thing, ThingId::Item(flower));
        assert_eq!(world.container(bag).expect("bag").items(), &[flower, rose]);
        assert!(world.things().item(flower).is_some());
    }

    #[test]
    fn remove_item_partial_then_whole() {
        let mut world = world();
        let potions = place(&mut world, HolderId::Tile(LEFT), POTION, 10);
        assert_eq!(world.remove_item(potions, 4), Ok(6));
        assert_eq!(world.remove_item(potions, 6), Ok(0));
        assert!(world.things().item(potions).is_none());
        assert_eq!(world.remove_item(potions, 1), Err(ReturnValue::NotPossible));
    }

    #[test]
    fn transform_replaces_in_same_slot() {
        let mut world = world();
        let bag = place(&mut world, HolderId::Tile(LEFT), BAG, 1);
        let first = place(&mut world, HolderId::Item(bag), ROSE, 1);
        let flower = place(&mut world, HolderId::Item(bag), FLOWER, 1);
        let _ = first;

        let rose = world.transform_item(flower, ROSE).expect("transform");
        assert!(world.things().item(flower).is_none());
        assert_eq!(world.container(bag).expect("bag").items()[0], rose);
        assert_eq!(world.things().parent(ThingId::Item(rose)), Some(HolderId::Item(bag)));
        assert_eq!(world.transform_item(rose, ItemTypeId(1)), Err(ReturnValue::WrongItemType));
    }

    #[test]
    fn creature_moves_between_tiles() {
        let mut world = world();
        let rat = world
            .spawn_creature(Creature::new(CreatureId(9), "Rat", CreatureKind::Monster, 0), LEFT)
            .expect("spawn");
        world
            .move_thing(
                HolderId::Tile(LEFT),
                ThingId::Creature(rat),
                HolderId::Tile(RIGHT),
                SlotIndex::Anywhere,
                1,
            )
            .expect("step");
        assert_eq!(world.things().creature(rat).expect("rat").position(), Some(RIGHT));
        assert!(!world.tile(LEFT).expect("left").has_creature());

        let bag = place(&mut world, HolderId::Tile(LEFT), BAG, 1);
        assert_eq!(
            world.move_thing(
                HolderId::Tile(RIGHT),
                ThingId::Creature(rat),
                HolderId::Item(bag),
                SlotIndex::Anywhere,
                1,
            ),
            Err(ReturnValue::NotPossible)
        );
    }

    #[test]
    fn equipping_into_backpack_updates_carried_weight() {
        let mut world = world();
        let knight = world
            .spawn_creature(Creature::new(CreatureId(4), "Knight", CreatureKind::Player, 10_000), LEFT)
            .expect("spawn");
        let bag = place(&mut world, HolderId::Tile(LEFT), BAG, 1);
        world
            .move_thing(
                HolderId::Tile(LEFT),
                ThingId::Item(bag),
                HolderId::Inventory(knight),
                SlotIndex::At(InventorySlot::Backpack.index()),
                1,
            )
            .expect("equip");
        let potions = place(&mut world, HolderId::Tile(LEFT), POTION, 20);
        world
            .move_thing(
                HolderId::Tile(LEFT),
                ThingId::Item(potions),
                HolderId::Inventory(knight),
                SlotIndex::At(InventorySlot::Backpack.index()),
                20,
            )
            .expect("pack");

        assert_eq!(world.things().parent(ThingId::Item(potions)), Some(HolderId::Item(bag)));
        let carried = world.things().creature(knight).expect("knight").carried_weight();
        assert_eq!(carried, 800 + 20 * 180);

        let heavy = place(&mut world, HolderId::Tile(LEFT), POTION, 100);
        assert_eq!(
            world.move_thing(
                HolderId::Tile(LEFT),
                ThingId::Item(heavy),
                HolderId::Item(bag),
                SlotIndex::Anywhere,
                100,
            ),
            Err(ReturnValue::NotEnoughCapacity)
        );

        world
            .move_thing(
                HolderId::Item(bag),
                ThingId::Item(potions),
                HolderId::Tile(RIGHT),
                SlotIndex::Anywhere,
                20,
            )
            .expect("drop");
        assert_eq!(world.things().creature(knight).expect("knight").carried_weight(), 800);
    }
}
