pub mod admin;
mod config;
pub mod entities;
pub mod net;
pub mod persistence;
pub mod telemetry;
pub mod world;

pub use config::{AppConfig, ServerSettings};

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const TICK_INTERVAL: Duration = Duration::from_millis(50);

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Start the world: load settings, catalog, snapshot and bans, run the tick
/// thread and read admin commands from stdin until it closes. The world and
/// the bans are saved on the way out.
pub fn run(args: &[String]) -> Result<(), String> {
    let app = AppConfig::from_args(args)?;
    telemetry::logging::init(&app.root)?;
    let mut settings = ServerSettings::load(&app.root)?;
    settings.apply_overrides(&app);

    let items_path = resolve(&app.root, &settings.items_file);
    let world_path = resolve(&app.root, &settings.world_file);
    let ban_path = resolve(&app.root, &settings.ban_file);

    let types = world::item_types::load_item_types(&items_path)?;
    let type_count = types.len();
    let world = if world_path.exists() {
        persistence::world_file::load_world(&world_path, types)?
    } else {
        world::state::World::new(types)
    };
    let problems = world.audit();
    for problem in &problems {
        telemetry::logging::log_error(&format!("world audit: {}", problem));
    }

    let ban_store = persistence::bans::open_ban_store(settings.ban_backend, ban_path);
    let guard = Arc::new(net::guard::ConnectionGuard::new(settings.guard_config()));
    let bans = guard.load_bans(ban_store.as_ref(), net::guard::unix_seconds())?;

    telemetry::logging::log_game(&format!(
        "world loaded: {} tiles, {} item types, {} bans",
        world.tile_count(),
        type_count,
        bans
    ));
    println!("tibia-world: startup");
    println!("- root: {}", app.root.display());
    println!("- item types: {} ({})", type_count, items_path.display());
    println!("- tiles: {} ({})", world.tile_count(), world_path.display());
    println!("- audit problems: {}", problems.len());
    println!("- bans: {} ({})", bans, ban_store.location());

    let (queue, mut runner) = world::tick::intent_channel(settings.intents_per_tick);
    let stop = Arc::new(AtomicBool::new(false));
    let tick_stop = Arc::clone(&stop);
    let tick_handle = std::thread::spawn(move || {
        let mut world = world;
        while !tick_stop.load(Ordering::Relaxed) {
            for (intent, outcome) in runner.run_tick(&mut world) {
                if let crate::world::tick::IntentOutcome::Rejected(reason) = outcome {
                    telemetry::logging::log_game(&format!("intent {:?} rejected: {:?}", intent, reason));
                }
            }
            world.drain_events();
            std::thread::sleep(TICK_INTERVAL);
        }
        world
    });

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.map_err(|err| format!("console read failed: {}", err))?;
        match admin::commands::parse_admin_command(&line) {
            Ok(Some(command)) => {
                let reply = admin::commands::execute_admin_command(
                    &command,
                    &guard,
                    &queue,
                    net::guard::unix_seconds(),
                );
                println!("{}", reply);
            }
            Ok(None) => {}
            Err(err) => eprintln!("tibia-world: {}", err),
        }
    }

    stop.store(true, Ordering::Relaxed);
    let world = tick_handle
        .join()
        .map_err(|_| "tick thread panicked".to_string())?;
    persistence::world_file::save_world(&world, &world_path)?;
    let saved = guard.save_bans(ban_store.as_ref(), net::guard::unix_seconds())?;
    println!("tibia-world: saved {} tiles and {} bans", world.tile_count(), saved);
    Ok(())
}
