use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BanKind {
    Ip,
    Player,
    Account,
}

impl BanKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BanKind::Ip => "ip",
            BanKind::Player => "player",
            BanKind::Account => "account",
        }
    }
}

impl FromStr for BanKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "ip" => Ok(BanKind::Ip),
            "player" => Ok(BanKind::Player),
            "account" => Ok(BanKind::Account),
            other => Err(format!("unknown ban kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BanTarget {
    Ip { ip: Ipv4Addr, mask: Ipv4Addr },
    Player(u32),
    Account(u32),
}

impl BanTarget {
    pub fn kind(self) -> BanKind {
        match self {
            BanTarget::Ip { .. } => BanKind::Ip,
            BanTarget::Player(_) => BanKind::Player,
            BanTarget::Account(_) => BanKind::Account,
        }
    }
}

impl fmt::Display for BanTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BanTarget::Ip { ip, mask } => write!(f, "ip {} mask {}", ip, mask),
            BanTarget::Player(id) => write!(f, "player {}", id),
            BanTarget::Account(id) => write!(f, "account {}", id),
        }
    }
}

/// A ban with its expiry in unix seconds; 0 is permanent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BanRecord {
    pub target: BanTarget,
    pub expires_at: u64,
}

impl BanRecord {
    pub fn is_permanent(&self) -> bool {
        self.expires_at == 0
    }

    pub fn is_active(&self, now: u64) -> bool {
        self.is_permanent() || now < self.expires_at
    }
}

/// Pluggable ban persistence. Stores only move records to and from disk;
/// expiry filtering is up to the caller.
pub trait BanStore: Send + Sync {
    fn load(&self) -> Result<Vec<BanRecord>, String>;
    fn save(&self, bans: &[BanRecord]) -> Result<(), String>;
    fn location(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BanBackend {
    Text,
    Yaml,
}

impl FromStr for BanBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(BanBackend::Text),
            "yaml" | "yml" => Ok(BanBackend::Yaml),
            other => Err(format!("unknown ban backend '{}'", other)),
        }
    }
}

pub fn open_ban_store(backend: BanBackend, path: PathBuf) -> Box<dyn BanStore> {
    match backend {
        BanBackend::Text => Box::new(TextBanStore::new(path)),
        BanBackend::Yaml => Box::new(YamlBanStore::new(path)),
    }
}

/// Flat form shared by both file formats.
#[derive(Debug, Default, Serialize, Deserialize)]
struct BanEntry {
    #[serde(default)]
    kind: Option<BanKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ip: Option<Ipv4Addr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mask: Option<Ipv4Addr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<u32>,
    #[serde(default)]
    expires_at: u64,
}

impl BanEntry {
    fn from_record(record: &BanRecord) -> Self {
        let mut entry = BanEntry {
            kind: Some(record.target.kind()),
            expires_at: record.expires_at,
            ..BanEntry::default()
        };
        match record.target {
            BanTarget::Ip { ip, mask } => {
                entry.ip = Some(ip);
                entry.mask = Some(mask);
            }
            BanTarget::Player(id) | BanTarget::Account(id) => entry.id = Some(id),
        }
        entry
    }

    fn has_data(&self) -> bool {
        self.kind.is_some() || self.ip.is_some() || self.mask.is_some() || self.id.is_some()
    }

    fn into_record(self, label: &str) -> Result<BanRecord, String> {
        let kind = self
            .kind
            .ok_or_else(|| format!("{} missing kind", label))?;
        let target = match kind {
            BanKind::Ip => BanTarget::Ip {
                ip: self
                    .ip
                    .ok_or_else(|| format!("{} ip ban missing ip", label))?,
                mask: self.mask.unwrap_or(Ipv4Addr::BROADCAST),
            },
            BanKind::Player => BanTarget::Player(
                self.id
                    .ok_or_else(|| format!("{} player ban missing id", label))?,
            ),
            BanKind::Account => BanTarget::Account(
                self.id
                    .ok_or_else(|| format!("{} account ban missing id", label))?,
            ),
        };
        Ok(BanRecord {
            target,
            expires_at: self.expires_at,
        })
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, String> {
    match fs::read_to_string(path) {
        Ok(data) => Ok(Some(data)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(format!("ban list read failed for {}: {}", path.display(), err)),
    }
}

fn write_file(path: &Path, data: &str) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            format!("ban list dir create failed for {}: {}", parent.display(), err)
        })?;
    }
    fs::write(path, data)
        .map_err(|err| format!("ban list write failed for {}: {}", path.display(), err))
}

/// `key = value` blocks, one ban per block, each starting with `kind`.
#[derive(Debug, Clone)]
pub struct TextBanStore {
    path: PathBuf,
}

impl TextBanStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl BanStore for TextBanStore {
    fn load(&self) -> Result<Vec<BanRecord>, String> {
        match read_optional(&self.path)? {
            Some(data) => parse_text_bans(&data),
            None => Ok(Vec::new()),
        }
    }

    fn save(&self, bans: &[BanRecord]) -> Result<(), String> {
        write_file(&self.path, &format_text_bans(bans))
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

pub fn parse_text_bans(data: &str) -> Result<Vec<BanRecord>, String> {
    let mut bans = Vec::new();
    let mut entry = BanEntry::default();
    let mut last_line = 1usize;

    for (idx, raw_line) in data.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();
        if line.is_empty() {
            if entry.has_data() {
                bans.push(std::mem::take(&mut entry).into_record(&block_label(last_line))?);
            }
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        let (key, value) = split_kv(line, line_no)?;
        if key == "kind" && entry.has_data() {
            bans.push(std::mem::take(&mut entry).into_record(&block_label(last_line))?);
        }
        match key {
            "kind" => entry.kind = Some(value.parse()?),
            "ip" => entry.ip = Some(parse_ip(value, line_no)?),
            "mask" => entry.mask = Some(parse_ip(value, line_no)?),
            "id" => entry.id = Some(parse_u32(value, line_no)?),
            "expires_at" => entry.expires_at = parse_u64(value, line_no)?,
            other => {
                return Err(format!(
                    "bans.txt unknown field '{}' at line {}",
                    other, line_no
                ));
            }
        }
        last_line = line_no;
    }
    if entry.has_data() {
        bans.push(entry.into_record(&block_label(last_line))?);
    }
    Ok(bans)
}

pub fn format_text_bans(bans: &[BanRecord]) -> String {
    let mut out = String::new();
    for record in bans {
        out.push_str(&format!("kind = {}\n", record.target.kind().as_str()));
        match record.target {
            BanTarget::Ip { ip, mask } => {
                out.push_str(&format!("ip = {}\n", ip));
                out.push_str(&format!("mask = {}\n", mask));
            }
            BanTarget::Player(id) | BanTarget::Account(id) => {
                out.push_str(&format!("id = {}\n", id));
            }
        }
        out.push_str(&format!("expires_at = {}\n\n", record.expires_at));
    }
    out
}

fn block_label(line_no: usize) -> String {
    format!("bans.txt entry ending at line {}", line_no)
}

fn split_kv(line: &str, line_no: usize) -> Result<(&str, &str), String> {
    let (key, value) = line.split_once('=').ok_or_else(|| {
        format!(
            "bans.txt expected key=value at line {}, got '{}'",
            line_no, line
        )
    })?;
    Ok((key.trim(), value.trim()))
}

fn parse_ip(value: &str, line_no: usize) -> Result<Ipv4Addr, String> {
    value
        .parse::<Ipv4Addr>()
        .map_err(|_| format!("bans.txt expects an IPv4 address at line {}, got '{}'", line_no, value))
}

fn parse_u32(value: &str, line_no: usize) -> Result<u32, String> {
    value
        .parse::<u32>()
        .map_err(|_| format!("bans.txt expects unsigned int at line {}, got '{}'", line_no, value))
}

fn parse_u64(value: &str, line_no: usize) -> Result<u64, String> {
    value
        .parse::<u64>()
        .map_err(|_| format!("bans.txt expects unix epoch at line {}, got '{}'", line_no, value))
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BanFile {
    #[serde(default)]
    bans: Vec<BanEntry>,
}

#[derive(Debug, Clone)]
pub struct YamlBanStore {
    path: PathBuf,
}

impl YamlBanStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl BanStore for YamlBanStore {
    fn load(&self) -> Result<Vec<BanRecord>, String> {
        let Some(data) = read_optional(&self.path)? else {
            return Ok(Vec::new());
        };
        let file: BanFile = serde_yaml::from_str(&data)
            .map_err(|err| format!("ban list parse failed for {}: {}", self.path.display(), err))?;
        file.bans
            .into_iter()
            .enumerate()
            .map(|(index, entry)| entry.into_record(&format!("bans.yml entry {}", index + 1)))
            .collect()
    }

    fn save(&self, bans: &[BanRecord]) -> Result<(), String> {
        let file = BanFile {
            bans: bans.iter().map(BanEntry::from_record).collect(),
        };
        let data = serde_yaml::to_string(&file)
            .map_err(|err| format!("ban list encode failed: {}", err))?;
        write_file(&self.path, &data)
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
