use crate::entities::effects::MagicEffect;
use crate::entities::inventory::InventorySlot;
use crate::entities::item::ItemTypeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const DEFAULT_MAX_COUNT: u16 = 100;

/// Special holder behaviour attached to every item of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemRole {
    Container { capacity: u16 },
    Teleport,
    Trash {
        #[serde(default)]
        effect: MagicEffect,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemType {
    pub id: ItemTypeId,
    pub name: String,
    #[serde(default)]
    pub stackable: bool,
    #[serde(default = "default_max_count")]
    pub max_count: u16,
    #[serde(default)]
    pub weight: u32,
    #[serde(default = "default_true")]
    pub movable: bool,
    #[serde(default = "default_true")]
    pub pickupable: bool,
    #[serde(default = "default_true")]
    pub destructible: bool,
    #[serde(default)]
    pub blocking: bool,
    #[serde(default)]
    pub slot: Option<InventorySlot>,
    #[serde(default)]
    pub role: Option<ItemRole>,
}

fn default_max_count() -> u16 {
    DEFAULT_MAX_COUNT
}

fn default_true() -> bool {
    true
}

impl ItemType {
    pub fn new(id: ItemTypeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            stackable: false,
            max_count: DEFAULT_MAX_COUNT,
            weight: 0,
            movable: true,
            pickupable: true,
            destructible: true,
            blocking: false,
            slot: None,
            role: None,
        }
    }

    /// Largest count a single stack of this type may hold.
    pub fn stack_limit(&self) -> u16 {
        if self.stackable {
            self.max_count.max(1)
        } else {
            1
        }
    }

    pub fn container_capacity(&self) -> Option<u16> {
        match self.role {
            Some(ItemRole::Container { capacity }) => Some(capacity),
            _ => None,
        }
    }

    pub fn is_teleport(&self) -> bool {
        matches!(self.role, Some(ItemRole::Teleport))
    }

    pub fn trash_effect(&self) -> Option<MagicEffect> {
        match self.role {
            Some(ItemRole::Trash { effect }) => Some(effect),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ItemTypeIndex {
    types: HashMap<ItemTypeId, ItemType>,
}

impl ItemTypeIndex {
    pub fn get(&self, id: ItemTypeId) -> Option<&ItemType> {
        self.types.get(&id)
    }

    pub fn insert(&mut self, item: ItemType) -> Result<(), String> {
        if self.types.contains_key(&item.id) {
            return Err(format!("item type {:?} already exists", item.id));
        }
        self.types.insert(item.id, item);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ItemType> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct ItemCatalogFile {
    #[serde(default)]
    items: Vec<ItemType>,
}

pub fn load_item_types(path: &Path) -> Result<ItemTypeIndex, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| format!("failed to read item catalog {}: {}", path.display(), err))?;
    parse_item_types(&content).map_err(|err| format!("{}: {}", path.display(), err))
}

pub fn parse_item_types(content: &str) -> Result<ItemTypeIndex, String> {
    let catalog: ItemCatalogFile = serde_yaml::from_str(content)
        .map_err(|err| format!("item catalog parse failed: {}", err))?;
    let mut index = ItemTypeIndex::default();
    for item in catalog.items {
        if item.stackable && item.max_count == 0 {
            return Err(format!("item type {} has zero max_count", item.id.0));
        }
        if item.stackable && item.role.is_some() {
            return Err(format!(
                "item type {} cannot be stackable and carry a holder role",
                item.id.0
            ));
        }
        index.insert(item)?;
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
items:
  - id: 2148
    name: gold coin
    stackable: true
    weight: 10
  - id: 1987
    name: bag
    weight: 800
    slot: backpack
    role: { kind: container, capacity: 8 }
  - id: 1387
    name: magic forcefield
    movable: false
    pickupable: false
    role: { kind: teleport }
  - id: 1777
    name: dustbin
    movable: false
    role: { kind: trash, effect: 2 }
  - id: 2457
    name: steel helmet
    weight: 4600
    slot: head
"#;

    #[test]
    fn parse_catalog_applies_defaults() {
        let index = parse_item_types(CATALOG).expect("catalog");
        assert_eq!(index.len(), 5);

        let coin = index.get(ItemTypeId(2148)).expect("coin");
        assert!(coin.stackable);
        assert_eq!(coin.stack_limit(), DEFAULT_MAX_COUNT);
        assert!(coin.movable && coin.pickupable && coin.destructible);

        let bag = index.get(ItemTypeId(1987)).expect("bag");
        assert_eq!(bag.container_capacity(), Some(8));
        assert_eq!(bag.stack_limit(), 1);
        assert_eq!(bag.slot, Some(InventorySlot::Backpack));

        assert!(index.get(ItemTypeId(1387)).expect("teleport").is_teleport());
        assert_eq!(
            index.get(ItemTypeId(1777)).expect("dustbin").trash_effect(),
            Some(MagicEffect::PUFF)
        );
    }

    #[test]
    fn parse_catalog_rejects_duplicate_ids() {
        let content = "items:\n  - {id: 1, name: a}\n  - {id: 1, name: b}\n";
        let err = parse_item_types(content).expect_err("duplicate");
        assert!(err.contains("already exists"));
    }

    #[test]
    fn parse_catalog_rejects_stackable_containers() {
        let content =
            "items:\n  - {id: 5, name: odd, stackable: true, role: {kind: container, capacity: 2}}\n";
        assert!(parse_item_types(content).is_err());
    }
}
