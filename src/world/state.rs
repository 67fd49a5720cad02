use crate::entities::creature::{Creature, CreatureId};
use crate::entities::effects::MagicEffect;
use crate::entities::inventory::Inventory;
use crate::entities::item::{Item, ItemId, ItemTypeId};
use crate::telemetry::logging;
use crate::world::container::Container;
use crate::world::cylinder::{Cylinder, HolderEffect};
use crate::world::item_types::{ItemRole, ItemTypeIndex};
use crate::world::position::Position;
use crate::world::teleport::Teleport;
use crate::world::thing::{HolderId, SlotIndex, ThingId, ThingStore};
use crate::world::tile::Tile;
use crate::world::trash_holder::TrashHolder;
use std::collections::HashMap;

/// Longest parent chain a notification is propagated along.
const MAX_NOTIFY_DEPTH: usize = 64;

/// Closed set of holder kinds. Adding a kind means adding a variant here
/// and nothing in the transfer code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Holder {
    Tile(Tile),
    Container(Container),
    Teleport(Teleport),
    Trash(TrashHolder),
    Inventory(Inventory),
}

impl Holder {
    pub fn as_cylinder(&self) -> &dyn Cylinder {
        match self {
            Holder::Tile(tile) => tile,
            Holder::Container(container) => container,
            Holder::Teleport(teleport) => teleport,
            Holder::Trash(trash) => trash,
            Holder::Inventory(inventory) => inventory,
        }
    }

    pub fn as_cylinder_mut(&mut self) -> &mut dyn Cylinder {
        match self {
            Holder::Tile(tile) => tile,
            Holder::Container(container) => container,
            Holder::Teleport(teleport) => teleport,
            Holder::Trash(trash) => trash,
            Holder::Inventory(inventory) => inventory,
        }
    }
}

/// Client-visible consequences of world mutations, drained by whoever
/// refreshes clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldEvent {
    MagicEffect {
        position: Position,
        effect: MagicEffect,
    },
    ThingAppeared {
        thing: ThingId,
        holder: HolderId,
    },
    ThingMoved {
        thing: ThingId,
        from: HolderId,
        to: HolderId,
    },
    ItemDestroyed {
        item: ItemId,
        type_id: ItemTypeId,
    },
}

#[derive(Debug)]
pub struct World {
    pub(crate) things: ThingStore,
    pub(crate) holders: HashMap<HolderId, Holder>,
    pub(crate) events: Vec<WorldEvent>,
    pub(crate) relocation_depth: usize,
}

impl World {
    pub fn new(types: ItemTypeIndex) -> Self {
        Self {
            things: ThingStore::new(types),
            holders: HashMap::new(),
            events: Vec::new(),
            relocation_depth: 0,
        }
    }

    pub fn things(&self) -> &ThingStore {
        &self.things
    }

    pub fn holder(&self, id: HolderId) -> Option<&dyn Cylinder> {
        self.holders.get(&id).map(Holder::as_cylinder)
    }

    pub fn tile(&self, position: Position) -> Option<&Tile> {
        match self.holders.get(&HolderId::Tile(position)) {
            Some(Holder::Tile(tile)) => Some(tile),
            _ => None,
        }
    }

    pub fn container(&self, item: ItemId) -> Option<&Container> {
        match self.holders.get(&HolderId::Item(item)) {
            Some(Holder::Container(container)) => Some(container),
            _ => None,
        }
    }

    pub fn teleport(&self, item: ItemId) -> Option<&Teleport> {
        match self.holders.get(&HolderId::Item(item)) {
            Some(Holder::Teleport(teleport)) => Some(teleport),
            _ => None,
        }
    }

    pub fn trash_holder(&self, item: ItemId) -> Option<&TrashHolder> {
        match self.holders.get(&HolderId::Item(item)) {
            Some(Holder::Trash(trash)) => Some(trash),
            _ => None,
        }
    }

    pub fn inventory(&self, creature: CreatureId) -> Option<&Inventory> {
        match self.holders.get(&HolderId::Inventory(creature)) {
            Some(Holder::Inventory(inventory)) => Some(inventory),
            _ => None,
        }
    }

    /// Tiles ordered by position.
    pub fn tiles(&self) -> Vec<&Tile> {
        let mut tiles: Vec<&Tile> = self
            .holders
            .values()
            .filter_map(|holder| match holder {
                Holder::Tile(tile) => Some(tile),
                _ => None,
            })
            .collect();
        tiles.sort_by_key(|tile| tile.position);
        tiles
    }

    pub fn tile_count(&self) -> usize {
        self.holders
            .keys()
            .filter(|id| matches!(id, HolderId::Tile(_)))
            .count()
    }

    pub fn drain_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn add_tile(&mut self, position: Position) {
        self.holders
            .entry(HolderId::Tile(position))
            .or_insert_with(|| Holder::Tile(Tile::new(position)));
    }

    /// Tear down a tile and everything lying on it. Refused while a
    /// creature stands there.
    pub fn remove_tile(&mut self, position: Position) -> Result<(), String> {
        let tile = self
            .tile(position)
            .ok_or_else(|| format!("no tile at {}", position))?;
        if tile.has_creature() {
            return Err(format!("tile {} is occupied by a creature", position));
        }
        let items: Vec<ItemId> = tile.items().collect();
        self.holders.remove(&HolderId::Tile(position));
        for item in items {
            self.things.set_parent(ThingId::Item(item), None);
            self.purge_item(item);
        }
        Ok(())
    }

    /// Create an unplaced item and the holder its type role asks for.
    pub fn create_item(&mut self, type_id: ItemTypeId, count: u16) -> Result<ItemId, String> {
        let item_type = self
            .things
            .types()
            .get(type_id)
            .ok_or_else(|| format!("unknown item type {}", type_id.0))?;
        if count == 0 || count > item_type.stack_limit() {
            return Err(format!(
                "invalid count {} for item type {} (limit {})",
                count,
                type_id.0,
                item_type.stack_limit()
            ));
        }
        let role = item_type.role;
        let id = self.things.insert_item(Item::new(type_id, count));
        let holder = match role {
            Some(ItemRole::Container { capacity }) => Some(Holder::Container(Container::new(id, capacity))),
            Some(ItemRole::Teleport) => Some(Holder::Teleport(Teleport::new(id))),
            Some(ItemRole::Trash { effect }) => Some(Holder::Trash(TrashHolder::new(id, effect))),
            None => None,
        };
        if let Some(holder) = holder {
            self.holders.insert(HolderId::Item(id), holder);
        }
        Ok(id)
    }

    pub fn set_teleport_destination(&mut self, item: ItemId, destination: Position) -> Result<(), String> {
        match self.holders.get_mut(&HolderId::Item(item)) {
            Some(Holder::Teleport(teleport)) => {
                teleport.set_destination(Some(destination));
                Ok(())
            }
            _ => Err(format!("item {} is not a teleport", item.0)),
        }
    }

    /// Override the effect a trash holder shows for this one item.
    pub fn set_trash_effect(&mut self, item: ItemId, effect: MagicEffect) -> Result<(), String> {
        match self.holders.get_mut(&HolderId::Item(item)) {
            Some(Holder::Trash(trash)) => {
                trash.set_effect(effect);
                Ok(())
            }
            _ => Err(format!("item {} is not a trash holder", item.0)),
        }
    }

    /// Place a new creature on a tile through the tile's own checks.
    pub fn spawn_creature(&mut self, creature: Creature, position: Position) -> Result<CreatureId, String> {
        let id = creature.id;
        if self.things.creature(id).is_some() {
            return Err(format!("creature {} already exists", id.0));
        }
        let name = creature.name.clone();
        let tile_id = HolderId::Tile(position);
        if !self.holders.contains_key(&tile_id) {
            return Err(format!("no tile at {}", position));
        }
        self.things.insert_creature(creature);
        let thing = ThingId::Creature(id);
        let result = self
            .holder(tile_id)
            .map(|tile| tile.query_add(self, SlotIndex::Anywhere, thing, 1, false))
            .unwrap_or(crate::world::cylinder::ReturnValue::NotPossible);
        if !result.is_ok() {
            self.things.take_creature(id);
            return Err(format!("cannot place {} at {}: {}", name, position, result));
        }
        self.holders
            .insert(HolderId::Inventory(id), Holder::Inventory(Inventory::new(id)));
        self.with_holder_mut(tile_id, |tile, things| {
            tile.add_thing(things, SlotIndex::Anywhere, thing)
        });
        self.events.push(WorldEvent::ThingAppeared {
            thing,
            holder: tile_id,
        });
        self.notify_add(tile_id, thing);
        logging::log_game(&format!("{} appears at {}", name, position));
        Ok(id)
    }

    /// Take a creature out of the world. Its equipment is destroyed.
    pub fn remove_creature(&mut self, id: CreatureId) -> Result<Creature, String> {
        let thing = ThingId::Creature(id);
        if let Some(parent) = self.things.parent(thing) {
            self.with_holder_mut(parent, |holder, things| holder.remove_thing(things, thing, 1));
            self.notify_remove(parent, thing);
        }
        if let Some(Holder::Inventory(inventory)) = self.holders.remove(&HolderId::Inventory(id)) {
            for item in inventory.items() {
                self.things.set_parent(ThingId::Item(item), None);
                self.purge_item(item);
            }
        }
        self.things
            .take_creature(id)
            .ok_or_else(|| format!("creature {} does not exist", id.0))
    }

    /// Detach an item from wherever it is and destroy it with everything
    /// inside it.
    pub fn destroy_item(&mut self, item: ItemId) -> Result<(), String> {
        let thing = ThingId::Item(item);
        let count = self.things.count(thing);
        if !self.things.contains(thing) {
            return Err(format!("item {} does not exist", item.0));
        }
        if let Some(parent) = self.things.parent(thing) {
            self.with_holder_mut(parent, |holder, things| holder.remove_thing(things, thing, count));
            self.notify_remove(parent, thing);
        }
        self.destroy_detached(item);
        Ok(())
    }

    pub(crate) fn destroy_detached(&mut self, item: ItemId) {
        if let Some(type_id) = self.things.item(item).map(|item| item.type_id) {
            self.purge_item(item);
            self.events.push(WorldEvent::ItemDestroyed { item, type_id });
        }
    }

    /// Drop an unplaced item, its holder and all nested items from the world.
    fn purge_item(&mut self, item: ItemId) {
        let mut pending = vec![item];
        while let Some(id) = pending.pop() {
            if let Some(holder) = self.holders.remove(&HolderId::Item(id)) {
                for thing in holder.as_cylinder().contents() {
                    match thing {
                        ThingId::Item(nested) => pending.push(nested),
                        ThingId::Creature(_) => self.things.set_parent(thing, None),
                    }
                }
            }
            self.things.take_item(id);
        }
    }

    pub(crate) fn with_holder_mut<R>(
        &mut self,
        id: HolderId,
        f: impl FnOnce(&mut dyn Cylinder, &mut ThingStore) -> R,
    ) -> Option<R> {
        let World { things, holders, .. } = self;
        match holders.get_mut(&id) {
            Some(holder) => Some(f(holder.as_cylinder_mut(), things)),
            None => {
                logging::log_error(&format!("holder {:?} missing during commit", id));
                None
            }
        }
    }

    pub(crate) fn notify_add(&mut self, holder: HolderId, thing: ThingId) {
        self.notify(holder, thing, true);
    }

    pub(crate) fn notify_remove(&mut self, holder: HolderId, thing: ThingId) {
        self.notify(holder, thing, false);
    }

    /// Run post notifications from `holder` up its parent chain, applying
    /// the effects each holder asks for along the way.
    fn notify(&mut self, holder: HolderId, thing: ThingId, added: bool) {
        let mut current = Some(holder);
        let mut direct = true;
        let mut depth = 0;
        while let Some(id) = current.take() {
            depth += 1;
            if depth > MAX_NOTIFY_DEPTH {
                logging::log_error(&format!("notification chain from {:?} too deep", holder));
                return;
            }
            let effects = self
                .with_holder_mut(id, |cylinder, things| {
                    if added {
                        cylinder.post_add_notification(things, thing, direct)
                    } else {
                        cylinder.post_remove_notification(things, thing, direct)
                    }
                })
                .unwrap_or_default();
            for effect in effects {
                match effect {
                    HolderEffect::NotifyParent => current = self.things.holder_parent(id),
                    HolderEffect::Effect(effect) => self.emit_effect(id, effect),
                    HolderEffect::Relocate { thing, to, effect } => {
                        self.relocate(id, thing, to, effect)
                    }
                    HolderEffect::Consume { item } => self.consume(id, item),
                }
            }
            direct = false;
        }
    }

    pub(crate) fn emit_effect(&mut self, holder: HolderId, effect: MagicEffect) {
        match self.things.holder_position(holder) {
            Some(position) => self.events.push(WorldEvent::MagicEffect { position, effect }),
            None => logging::log_error(&format!("effect {} at unplaced holder {:?}", effect.id(), holder)),
        }
    }

    fn consume(&mut self, holder: HolderId, item: ItemId) {
        let thing = ThingId::Item(item);
        let count = self.things.count(thing);
        self.with_holder_mut(holder, |cylinder, things| cylinder.remove_thing(things, thing, count));
        self.destroy_detached(item);
    }

    /// Containment invariant violations, one line each. Empty when the
    /// world is consistent.
    pub fn audit(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (id, holder) in &self.holders {
            let cylinder = holder.as_cylinder();
            for thing in cylinder.contents() {
                if !self.things.contains(thing) {
                    problems.push(format!("{:?} lists missing {:?}", id, thing));
                } else if self.things.parent(thing) != Some(*id) {
                    problems.push(format!(
                        "{:?} lists {:?} whose parent is {:?}",
                        id,
                        thing,
                        self.things.parent(thing)
                    ));
                }
            }
            match holder {
                Holder::Container(container) => {
                    if container.len() > usize::from(container.capacity()) {
                        problems.push(format!(
                            "container {} holds {} items over capacity {}",
                            container.item().0,
                            container.len(),
                            container.capacity()
                        ));
                    }
                }
                Holder::Teleport(_) | Holder::Trash(_) => {
                    if !cylinder.is_empty() {
                        problems.push(format!("{:?} still holds things", id));
                    }
                }
                Holder::Tile(_) | Holder::Inventory(_) => {}
            }
            if let HolderId::Item(item) = id {
                if self.things.item(*item).is_none() {
                    problems.push(format!("holder for missing item {}", item.0));
                }
                let cyclic = self
                    .things
                    .holder_parent(*id)
                    .map(|parent| self.things.is_ancestor(*item, parent))
                    .unwrap_or(false);
                if cyclic {
                    problems.push(format!("item {} contains itself", item.0));
                }
            }
        }
        for item in self.things.items() {
            let thing = ThingId::Item(item.id);
            if let Some(parent) = item.parent() {
                let listed = self
                    .holder(parent)
                    .and_then(|holder| holder.index_of_thing(thing))
                    .is_some();
                if !listed {
                    problems.push(format!("item {} claims parent {:?} which does not list it", item.id.0, parent));
                }
            }
            let limit = self.things.stack_limit(thing);
            if item.count == 0 || item.count > limit {
                problems.push(format!("item {} has count {} (limit {})", item.id.0, item.count, limit));
            }
        }
        for creature in self.things.creatures() {
            if !matches!(creature.parent(), Some(HolderId::Tile(_))) {
                problems.push(format!("creature {} is not on a tile", creature.id.0));
            }
        }
        problems.sort();
        problems
    }
}
