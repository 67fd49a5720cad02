pub mod creature;
pub mod effects;
pub mod inventory;
pub mod item;
