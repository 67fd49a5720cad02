pub mod container;
pub mod cylinder;
pub mod item_types;
pub mod monsters;
pub mod position;
pub mod state;
pub mod teleport;
pub mod thing;
pub mod tick;
pub mod tile;
pub mod transfer;
pub mod trash_holder;
