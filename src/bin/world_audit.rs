use std::path::Path;
use tibia_world::persistence::world_file::load_world;
use tibia_world::world::item_types::load_item_types;

fn main() -> Result<(), String> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        return Err("usage: world_audit <items.yml> <world.yml>".to_string());
    }
    let types = load_item_types(Path::new(&args[1]))?;
    let type_count = types.len();
    let world = load_world(Path::new(&args[2]), types)?;
    let problems = world.audit();

    println!("world audit:");
    println!("- item types: {}", type_count);
    println!("- tiles: {}", world.tile_count());
    println!("- items: {}", world.things().item_count());
    println!("- problems: {}", problems.len());
    if !problems.is_empty() {
        println!("problems:");
        for problem in problems {
            println!("- {}", problem);
        }
        return Err("containment problems detected".to_string());
    }

    Ok(())
}
