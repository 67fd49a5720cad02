pub mod bans;
pub mod world_file;
