//! YAML world snapshot. Loading places items with trusted insertion, so
//! fixed map furniture (teleports, dustbins) needs no move rights.

use crate::entities::effects::MagicEffect;
use crate::entities::item::{ItemId, ItemTypeId};
use crate::world::item_types::ItemTypeIndex;
use crate::world::position::Position;
use crate::world::state::World;
use crate::world::thing::{HolderId, SlotIndex, ThingId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldFile {
    #[serde(default)]
    pub tiles: Vec<TileEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileEntry {
    pub position: Position,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ItemEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemEntry {
    #[serde(rename = "type")]
    pub type_id: ItemTypeId,
    #[serde(default = "default_count")]
    pub count: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<MagicEffect>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ItemEntry>,
}

fn default_count() -> u16 {
    1
}

pub fn load_world(path: &Path, types: ItemTypeIndex) -> Result<World, String> {
    let content = fs::read_to_string(path)
        .map_err(|err| format!("failed to read world file {}: {}", path.display(), err))?;
    parse_world(&content, types).map_err(|err| format!("{}: {}", path.display(), err))
}

pub fn parse_world(content: &str, types: ItemTypeIndex) -> Result<World, String> {
    let file: WorldFile =
        serde_yaml::from_str(content).map_err(|err| format!("world file parse failed: {}", err))?;
    build_world(&file, types)
}

pub fn build_world(file: &WorldFile, types: ItemTypeIndex) -> Result<World, String> {
    let mut world = World::new(types);
    let mut seen = HashSet::new();
    for tile in &file.tiles {
        if !seen.insert(tile.position) {
            return Err(format!("tile {} listed twice", tile.position));
        }
        world.add_tile(tile.position);
        for entry in &tile.items {
            let item = build_item(&mut world, entry)?;
            place(&mut world, HolderId::Tile(tile.position), item);
        }
    }
    Ok(world)
}

/// Contents are placed before their container so weights settle bottom-up.
fn build_item(world: &mut World, entry: &ItemEntry) -> Result<ItemId, String> {
    let item = world.create_item(entry.type_id, entry.count)?;
    if let Some(destination) = entry.destination {
        world.set_teleport_destination(item, destination)?;
    }
    if let Some(effect) = entry.effect {
        world.set_trash_effect(item, effect)?;
    }
    if entry.items.is_empty() {
        return Ok(item);
    }
    let capacity = world
        .container(item)
        .map(|container| usize::from(container.capacity()))
        .ok_or_else(|| format!("item type {} cannot hold items", entry.type_id.0))?;
    if entry.items.len() > capacity {
        return Err(format!(
            "item type {} holds {} items, capacity is {}",
            entry.type_id.0,
            entry.items.len(),
            capacity
        ));
    }
    for nested in &entry.items {
        let child = build_item(world, nested)?;
        place(world, HolderId::Item(item), child);
    }
    Ok(item)
}

fn place(world: &mut World, holder: HolderId, item: ItemId) {
    world.with_holder_mut(holder, |cylinder, things| {
        cylinder.internal_add_thing(things, SlotIndex::Anywhere, ThingId::Item(item))
    });
}

/// Tiles and their items. Creatures are not part of the snapshot.
pub fn snapshot_world(world: &World) -> WorldFile {
    WorldFile {
        tiles: world
            .tiles()
            .into_iter()
            .map(|tile| TileEntry {
                position: tile.position,
                items: tile.items().filter_map(|item| snapshot_item(world, item)).collect(),
            })
            .collect(),
    }
}

fn snapshot_item(world: &World, item: ItemId) -> Option<ItemEntry> {
    let node = world.things().item(item)?;
    let items = world
        .container(item)
        .map(|container| {
            container
                .items()
                .iter()
                .filter_map(|nested| snapshot_item(world, *nested))
                .collect()
        })
        .unwrap_or_default();
    Some(ItemEntry {
        type_id: node.type_id,
        count: node.count,
        destination: world.teleport(item).and_then(|teleport| teleport.destination()),
        effect: world.trash_holder(item).map(|trash| trash.effect()),
        items,
    })
}

pub fn save_world(world: &World, path: &Path) -> Result<(), String> {
    let data = serde_yaml::to_string(&snapshot_world(world))
        .map_err(|err| format!("world file encode failed: {}", err))?;
    fs::write(path, data)
        .map_err(|err| format!("world file write failed for {}: {}", path.display(), err))
}
