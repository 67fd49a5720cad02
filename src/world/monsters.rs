use crate::entities::creature::CreatureId;
use crate::entities::item::{ItemId, ItemTypeId};
use crate::telemetry::logging;
use crate::world::item_types::ItemTypeIndex;
use crate::world::state::World;
use crate::world::thing::{HolderId, SlotIndex, ThingId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Loot chances are expressed out of this many.
pub const LOOT_CHANCE_MAX: u32 = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LootEntry {
    #[serde(rename = "type")]
    pub type_id: ItemTypeId,
    /// Upper bound of the rolled count.
    #[serde(default = "default_loot_count")]
    pub count: u16,
    pub chance: u32,
    /// Rolled into the dropped item when it is a container.
    #[serde(default)]
    pub contents: Vec<LootEntry>,
}

fn default_loot_count() -> u16 {
    1
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LootTable {
    #[serde(default)]
    pub entries: Vec<LootEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonsterLoot {
    pub name: String,
    pub corpse: ItemTypeId,
    #[serde(default)]
    pub loot: Vec<LootEntry>,
}

impl MonsterLoot {
    pub fn table(&self) -> LootTable {
        LootTable {
            entries: self.loot.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MonsterLootFile {
    #[serde(default)]
    monsters: Vec<MonsterLoot>,
}

/// Deterministic LCG so loot rolls can be replayed from a seed.
#[derive(Debug, Clone)]
pub struct LootRng {
    state: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LootDrop {
    pub type_id: ItemTypeId,
    pub count: u16,
    pub contents: Vec<LootDrop>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LootReport {
    pub placed: usize,
    pub dropped: usize,
}

impl LootTable {
    pub fn roll(&self, rng: &mut LootRng, item_types: &ItemTypeIndex) -> Vec<LootDrop> {
        roll_entries(&self.entries, rng, item_types)
    }
}

fn roll_entries(entries: &[LootEntry], rng: &mut LootRng, item_types: &ItemTypeIndex) -> Vec<LootDrop> {
    let mut drops = Vec::new();
    for entry in entries {
        if entry.count == 0 || !rng.roll_chance(entry.chance) {
            continue;
        }
        let Some(item_type) = item_types.get(entry.type_id) else {
            logging::log_error(&format!("loot references unknown item type {}", entry.type_id.0));
            continue;
        };
        let count = rng.roll_range(1, entry.count);
        let contents = if item_type.container_capacity().is_some() {
            roll_entries(&entry.contents, rng, item_types)
        } else {
            Vec::new()
        };
        if item_type.stackable {
            drops.push(LootDrop {
                type_id: entry.type_id,
                count: count.min(item_type.stack_limit()),
                contents,
            });
        } else {
            for _ in 0..count {
                drops.push(LootDrop {
                    type_id: entry.type_id,
                    count: 1,
                    contents: contents.clone(),
                });
            }
        }
    }
    drops
}

impl LootRng {
    pub fn from_seed(seed: u64) -> Self {
        let seed = if seed == 0 { 0x9e3779b97f4a7c15 } else { seed };
        Self { state: seed }
    }

    fn next(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1);
        (self.state >> 32) as u32
    }

    /// True with probability `chance / LOOT_CHANCE_MAX`.
    pub fn roll_chance(&mut self, chance: u32) -> bool {
        let bucket = self.next() % LOOT_CHANCE_MAX;
        bucket < chance.min(LOOT_CHANCE_MAX)
    }

    pub fn roll_range(&mut self, min: u16, max: u16) -> u16 {
        let (min, max) = if min >= max { (min, min) } else { (min, max) };
        let span = u32::from(max - min) + 1;
        min + (self.next() % span) as u16
    }
}

impl Default for LootRng {
    fn default() -> Self {
        Self::from_seed(0x9e3779b97f4a7c15)
    }
}

pub fn load_monster_loot(path: &Path) -> Result<HashMap<String, MonsterLoot>, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| format!("failed to read monster loot {}: {}", path.display(), err))?;
    parse_monster_loot(&content).map_err(|err| format!("{}: {}", path.display(), err))
}

pub fn parse_monster_loot(content: &str) -> Result<HashMap<String, MonsterLoot>, String> {
    let file: MonsterLootFile = serde_yaml::from_str(content)
        .map_err(|err| format!("monster loot parse failed: {}", err))?;
    let mut index = HashMap::new();
    for monster in file.monsters {
        let key = monster.name.to_ascii_lowercase();
        if index.contains_key(&key) {
            return Err(format!("monster {} listed twice", monster.name));
        }
        index.insert(key, monster);
    }
    Ok(index)
}

/// Put rolled loot into a corpse through the normal transfer checks.
/// Anything the corpse refuses is destroyed rather than forced in.
pub fn drop_loot(world: &mut World, corpse: ItemId, drops: &[LootDrop]) -> LootReport {
    let mut report = LootReport::default();
    for drop in drops {
        let item = match world.create_item(drop.type_id, drop.count) {
            Ok(item) => item,
            Err(err) => {
                logging::log_error(&format!("loot item skipped: {}", err));
                report.dropped += 1;
                continue;
            }
        };
        match world.add_item(HolderId::Item(corpse), SlotIndex::Anywhere, item) {
            Ok(added) => {
                report.placed += 1;
                if added.remainder > 0 {
                    let _ = world.destroy_item(item);
                }
                if !drop.contents.is_empty() && world.container(item).is_some() {
                    let nested = drop_loot(world, item, &drop.contents);
                    report.placed += nested.placed;
                    report.dropped += nested.dropped;
                }
            }
            Err(_) => {
                let _ = world.destroy_item(item);
                report.dropped += 1;
            }
        }
    }
    report
}

/// Replace a creature by its corpse: equipment goes into the corpse first,
/// then rolled loot. The corpse stays on the death tile even when a
/// teleport or trash holder lies there.
pub fn kill_creature(
    world: &mut World,
    creature: CreatureId,
    corpse_type: ItemTypeId,
    loot: Option<&LootTable>,
    rng: &mut LootRng,
) -> Result<ItemId, String> {
    let position = world
        .things()
        .creature(creature)
        .and_then(|creature| creature.position())
        .ok_or_else(|| format!("creature {} is not on the map", creature.0))?;
    let corpse = world.create_item(corpse_type, 1)?;
    if world.container(corpse).is_none() {
        let _ = world.destroy_item(corpse);
        return Err(format!("corpse type {} is not a container", corpse_type.0));
    }
    let equipment: Vec<ItemId> = world
        .inventory(creature)
        .map(|inventory| inventory.items().collect())
        .unwrap_or_default();
    for item in equipment {
        let count = world.things().count(ThingId::Item(item));
        if let Err(err) = world.move_thing(
            HolderId::Inventory(creature),
            ThingId::Item(item),
            HolderId::Item(corpse),
            SlotIndex::Anywhere,
            count,
        ) {
            logging::log_game(&format!("item {} lost with creature {}: {:?}", item.0, creature.0, err));
        }
    }
    let name = world.remove_creature(creature)?.name;
    if let Err(err) = world.set_item_down(position, corpse) {
        let _ = world.destroy_item(corpse);
        return Err(format!("corpse of {} cannot be placed at {}: {}", name, position, err));
    }
    if let Some(table) = loot {
        if world.container(corpse).is_some() {
            let drops = table.roll(rng, world.things().types());
            let report = drop_loot(world, corpse, &drops);
            logging::log_game(&format!(
                "{} died at {}: loot placed={}, dropped={}",
                name, position, report.placed, report.dropped
            ));
        }
    }
    Ok(corpse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::creature::{Creature, CreatureKind};
    use crate::entities::effects::MagicEffect;
    use crate::entities::inventory::InventorySlot;
    use crate::world::item_types::{ItemRole, ItemType};
    use crate::world::position::Position;

    const COIN: ItemTypeId = ItemTypeId(3031);
    const SWORD: ItemTypeId = ItemTypeId(3264);
    const BAG: ItemTypeId = ItemTypeId(2853);
    const CORPSE: ItemTypeId = ItemTypeId(4240);
    const DUSTBIN: ItemTypeId = ItemTypeId(1777);
    const LAIR: Position = Position { x: 400, y: 400, z: 9 };

    fn types() -> ItemTypeIndex {
        let mut types = ItemTypeIndex::default();
        let mut coin = ItemType::new(COIN, "gold coin");
        coin.stackable = true;
        types.insert(coin).expect("coin");
        let mut sword = ItemType::new(SWORD, "sword");
        sword.weight = 3500;
        types.insert(sword).expect("sword");
        let mut bag = ItemType::new(BAG, "bag");
        bag.role = Some(ItemRole::Container { capacity: 8 });
        types.insert(bag).expect("bag");
        let mut corpse = ItemType::new(CORPSE, "dead orc");
        corpse.pickupable = false;
        corpse.role = Some(ItemRole::Container { capacity: 2 });
        types.insert(corpse).expect("corpse");
        let mut dustbin = ItemType::new(DUSTBIN, "dustbin");
        dustbin.role = Some(ItemRole::Trash {
            effect: MagicEffect::default(),
        });
        types.insert(dustbin).expect("dustbin");
        types
    }

    fn entry(type_id: ItemTypeId, count: u16, chance: u32) -> LootEntry {
        LootEntry {
            type_id,
            count,
            chance,
            contents: Vec::new(),
        }
    }

    #[test]
    fn roll_honours_chance_bounds() {
        let table = LootTable {
            entries: vec![entry(COIN, 10, LOOT_CHANCE_MAX), entry(SWORD, 1, 0)],
        };
        let mut rng = LootRng::from_seed(1);
        let drops = table.roll(&mut rng, &types());
        assert_eq!(drops.len(), 1);
        assert_eq!(drops[0].type_id, COIN);
        assert!((1..=10).contains(&drops[0].count));
    }

    #[test]
    fn non_stackable_count_expands_to_copies() {
        let table = LootTable {
            entries: vec![entry(SWORD, 1, LOOT_CHANCE_MAX)],
        };
        let mut rng = LootRng::default();
        let drops = table.roll(&mut rng, &types());
        assert_eq!(
            drops,
            vec![LootDrop {
                type_id: SWORD,
                count: 1,
                contents: Vec::new()
            }]
        );
    }

    #[test]
    fn same_seed_rolls_same_loot() {
        let table = LootTable {
            entries: vec![entry(COIN, 100, 50_000), entry(SWORD, 3, 30_000)],
        };
        let types = types();
        let first = table.roll(&mut LootRng::from_seed(42), &types);
        let second = table.roll(&mut LootRng::from_seed(42), &types);
        assert_eq!(first, second);
    }

    #[test]
    fn parse_monster_loot_reads_nested_contents() {
        let content = r#"
monsters:
  - name: Orc
    corpse: 4240
    loot:
      - { type: 3031, count: 15, chance: 80000 }
      - type: 2853
        chance: 10000
        contents:
          - { type: 3264, chance: 5000 }
"#;
        let index = parse_monster_loot(content).expect("parse");
        let orc = index.get("orc").expect("orc");
        assert_eq!(orc.corpse, CORPSE);
        assert_eq!(orc.loot.len(), 2);
        assert_eq!(orc.loot[1].count, 1);
        assert_eq!(orc.loot[1].contents[0].type_id, SWORD);
        assert!(parse_monster_loot("monsters:\n  - {name: A, corpse: 1}\n  - {name: a, corpse: 2}\n").is_err());
    }

    #[test]
    fn kill_drops_equipment_and_loot_into_corpse() {
        let mut world = World::new(types());
        world.add_tile(LAIR);
        let orc = world
            .spawn_creature(Creature::new(CreatureId(77), "Orc", CreatureKind::Monster, 50_000), LAIR)
            .expect("spawn");
        let sword = world.create_item(SWORD, 1).expect("sword");
        world
            .add_item(
                HolderId::Inventory(orc),
                SlotIndex::At(InventorySlot::RightHand.index()),
                sword,
            )
            .expect("wield");

        let table = LootTable {
            entries: vec![
                entry(COIN, 10, LOOT_CHANCE_MAX),
                entry(SWORD, 1, LOOT_CHANCE_MAX),
            ],
        };
        let corpse = kill_creature(&mut world, orc, CORPSE, Some(&table), &mut LootRng::from_seed(7))
            .expect("kill");

        assert!(world.things().creature(orc).is_none());
        assert!(world.inventory(orc).is_none());
        assert_eq!(world.tile(LAIR).expect("lair").top_item(), Some(corpse));
        let container = world.container(corpse).expect("corpse");
        assert_eq!(container.len(), 2);
        assert!(container.items().contains(&sword));
        assert!(world.audit().is_empty());
    }

    #[test]
    fn corpse_stays_on_a_tile_with_a_trash_holder() {
        let mut world = World::new(types());
        world.add_tile(LAIR);
        let dustbin = world.create_item(DUSTBIN, 1).expect("dustbin");
        world
            .add_item(HolderId::Tile(LAIR), SlotIndex::Anywhere, dustbin)
            .expect("place dustbin");
        let orc = world
            .spawn_creature(Creature::new(CreatureId(78), "Orc", CreatureKind::Monster, 50_000), LAIR)
            .expect("spawn");

        let table = LootTable {
            entries: vec![entry(COIN, 5, LOOT_CHANCE_MAX)],
        };
        let corpse = kill_creature(&mut world, orc, CORPSE, Some(&table), &mut LootRng::from_seed(3))
            .expect("kill");

        assert!(world.things().contains(ThingId::Item(corpse)));
        assert_eq!(
            world.things().parent(ThingId::Item(corpse)),
            Some(HolderId::Tile(LAIR))
        );
        assert_eq!(world.tile(LAIR).expect("lair").top_item(), Some(corpse));
        assert_eq!(world.container(corpse).expect("corpse").len(), 1);
        assert!(world.audit().is_empty());
    }
}
