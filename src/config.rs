use crate::net::guard::GuardConfig;
use crate::persistence::bans::BanBackend;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct AppConfig {
    pub root: PathBuf,
    pub world_file: Option<PathBuf>,
    pub ban_backend: Option<BanBackend>,
    pub ban_file: Option<PathBuf>,
    pub items_file: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_args(args: &[String]) -> Result<Self, String> {
        if args.len() < 2 {
            return Err("usage: tibia-world <world-root> [world-file]".to_string());
        }

        let root = Path::new(&args[1]).to_path_buf();
        let world_file = args.get(2).map(PathBuf::from);
        let ban_backend = env_value("TIBIA_BAN_BACKEND")
            .map(|value| value.parse::<BanBackend>())
            .transpose()?;
        Ok(Self {
            root,
            world_file,
            ban_backend,
            ban_file: env_value("TIBIA_BAN_FILE").map(PathBuf::from),
            items_file: env_value("TIBIA_ITEMS_FILE").map(PathBuf::from),
        })
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// `<root>/config.yml`. Paths are relative to the world root.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub max_login_tries: u32,
    pub retry_timeout_ms: u64,
    pub login_timeout_ms: u64,
    pub connect_interval_ms: u64,
    pub tracked_addresses: usize,
    pub ban_backend: BanBackend,
    pub ban_file: PathBuf,
    pub items_file: PathBuf,
    pub world_file: PathBuf,
    pub intents_per_tick: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        let guard = GuardConfig::default();
        Self {
            max_login_tries: guard.max_login_tries,
            retry_timeout_ms: guard.retry_timeout_ms,
            login_timeout_ms: guard.login_timeout_ms,
            connect_interval_ms: guard.connect_interval_ms,
            tracked_addresses: guard.tracked_addresses,
            ban_backend: BanBackend::Text,
            ban_file: PathBuf::from("dat/bans.txt"),
            items_file: PathBuf::from("dat/items.yml"),
            world_file: PathBuf::from("dat/world.yml"),
            intents_per_tick: 256,
        }
    }
}

impl ServerSettings {
    /// Defaults when the file is absent.
    pub fn load(root: &Path) -> Result<Self, String> {
        let path = root.join("config.yml");
        match std::fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content).map_err(|err| format!("{}: {}", path.display(), err)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(format!("failed to read {}: {}", path.display(), err)),
        }
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|err| format!("settings parse failed: {}", err))
    }

    /// Command line and environment win over the file.
    pub fn apply_overrides(&mut self, app: &AppConfig) {
        if let Some(backend) = app.ban_backend {
            self.ban_backend = backend;
        }
        if let Some(path) = &app.ban_file {
            self.ban_file = path.clone();
        }
        if let Some(path) = &app.items_file {
            self.items_file = path.clone();
        }
        if let Some(path) = &app.world_file {
            self.world_file = path.clone();
        }
    }

    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            max_login_tries: self.max_login_tries,
            retry_timeout_ms: self.retry_timeout_ms,
            login_timeout_ms: self.login_timeout_ms,
            connect_interval_ms: self.connect_interval_ms,
            tracked_addresses: self.tracked_addresses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_args_requires_root() {
        assert!(AppConfig::from_args(&["tibia-world".to_string()]).is_err());
        let config = AppConfig::from_args(&[
            "tibia-world".to_string(),
            "/srv/tibia".to_string(),
            "maps/test.yml".to_string(),
        ])
        .expect("config");
        assert_eq!(config.root, PathBuf::from("/srv/tibia"));
        assert_eq!(config.world_file, Some(PathBuf::from("maps/test.yml")));
    }

    #[test]
    fn settings_fill_in_defaults() {
        let settings = ServerSettings::parse("max_login_tries: 5\nban_backend: yaml\n").expect("parse");
        assert_eq!(settings.max_login_tries, 5);
        assert_eq!(settings.ban_backend, BanBackend::Yaml);
        assert_eq!(settings.connect_interval_ms, 1_000);
        assert_eq!(settings.guard_config().login_timeout_ms, 60_000);
        assert_eq!(ServerSettings::parse("").expect("empty"), ServerSettings::default());
        assert!(ServerSettings::parse("max_login_tries: lots\n").is_err());
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut settings = ServerSettings::default();
        let app = AppConfig {
            root: PathBuf::from("."),
            world_file: Some(PathBuf::from("other.yml")),
            ban_backend: Some(BanBackend::Yaml),
            ban_file: None,
            items_file: None,
        };
        settings.apply_overrides(&app);
        assert_eq!(settings.world_file, PathBuf::from("other.yml"));
        assert_eq!(settings.ban_backend, BanBackend::Yaml);
        assert_eq!(settings.ban_file, PathBuf::from("dat/bans.txt"));
    }

    #[test]
    fn missing_settings_file_uses_defaults() {
        let root = std::env::temp_dir().join("tibia-settings-test-missing-root");
        assert_eq!(ServerSettings::load(&root).expect("load"), ServerSettings::default());
    }
}
