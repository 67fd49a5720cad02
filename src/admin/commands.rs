use crate::entities::item::{ItemId, ItemTypeId};
use crate::net::guard::{describe_expiry, ConnectionGuard};
use crate::persistence::bans::BanKind;
use crate::world::position::Position;
use crate::world::thing::{HolderId, SlotIndex};
use crate::world::tick::{IntentQueue, WorldIntent};
use std::net::Ipv4Addr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    BanIp {
        ip: Ipv4Addr,
        mask: Ipv4Addr,
        hours: u32,
    },
    BanPlayer { player: u32, hours: u32 },
    BanAccount { account: u32, hours: u32 },
    Unban { kind: BanKind, number: usize },
    Bans,
    CreateItem {
        position: Position,
        type_id: ItemTypeId,
        count: u16,
    },
    RemoveItem { item: ItemId, count: u16 },
    Unknown(String),
}

impl AdminCommand {
    /// The world change this command asks the tick thread for, if any.
    pub fn world_intent(&self) -> Option<WorldIntent> {
        match *self {
            AdminCommand::CreateItem {
                position,
                type_id,
                count,
            } => Some(WorldIntent::AddItem {
                holder: HolderId::Tile(position),
                index: SlotIndex::Anywhere,
                type_id,
                count,
            }),
            AdminCommand::RemoveItem { item, count } => Some(WorldIntent::RemoveItem { item, count }),
            _ => None,
        }
    }
}

pub fn parse_admin_command(message: &str) -> Result<Option<AdminCommand>, String> {
    let trimmed = message.trim();
    if !trimmed.starts_with('!') {
        return Ok(None);
    }

    let mut parts = trimmed[1..].split_whitespace();
    let command = parts
        .next()
        .ok_or_else(|| "admin command missing name".to_string())?;
    let command = command.to_ascii_lowercase();
    let parsed = match command.as_str() {
        "banip" => {
            let ip = parse_ip(parts.next())?;
            let (mask, hours) = match parts.next() {
                Some(value) if value.contains('.') => (parse_ip(Some(value))?, parse_hours(parts.next())?),
                other => (Ipv4Addr::BROADCAST, parse_hours(other)?),
            };
            AdminCommand::BanIp { ip, mask, hours }
        }
        "banplayer" => AdminCommand::BanPlayer {
            player: parse_id(parts.next())?,
            hours: parse_hours(parts.next())?,
        },
        "banaccount" => AdminCommand::BanAccount {
            account: parse_id(parts.next())?,
            hours: parse_hours(parts.next())?,
        },
        "unbanip" => AdminCommand::Unban {
            kind: BanKind::Ip,
            number: parse_number(parts.next())?,
        },
        "unbanplayer" => AdminCommand::Unban {
            kind: BanKind::Player,
            number: parse_number(parts.next())?,
        },
        "unbanaccount" => AdminCommand::Unban {
            kind: BanKind::Account,
            number: parse_number(parts.next())?,
        },
        "bans" => AdminCommand::Bans,
        "create" => AdminCommand::CreateItem {
            position: Position {
                x: parse_coordinate(parts.next())?,
                y: parse_coordinate(parts.next())?,
                z: parse_floor(parts.next())?,
            },
            type_id: ItemTypeId(parse_count(parts.next(), "item type")?),
            count: parse_optional_count(parts.next())?,
        },
        "remove" => AdminCommand::RemoveItem {
            item: ItemId(parse_id(parts.next())?),
            count: parse_optional_count(parts.next())?,
        },
        _ => AdminCommand::Unknown(command),
    };
    Ok(Some(parsed))
}

/// Apply a command and return the reply for the issuer. Ban commands act
/// on the guard directly; world commands are queued for the next tick.
/// `now` is unix seconds.
pub fn execute_admin_command(
    command: &AdminCommand,
    guard: &ConnectionGuard,
    queue: &IntentQueue,
    now: u64,
) -> String {
    if let Some(intent) = command.world_intent() {
        return match queue.submit(intent) {
            Ok(()) => "queued for the next tick.".to_string(),
            Err(err) => format!("not queued: {}.", err),
        };
    }
    match command {
        AdminCommand::BanIp { ip, mask, hours } => {
            let expires_at = expiry(now, *hours);
            guard.add_ip_ban(*ip, *mask, expires_at);
            format!("ip {} mask {} banned, {}.", ip, mask, describe_expiry(expires_at))
        }
        AdminCommand::BanPlayer { player, hours } => {
            let expires_at = expiry(now, *hours);
            guard.add_player_ban(*player, expires_at);
            format!("player {} banned, {}.", player, describe_expiry(expires_at))
        }
        AdminCommand::BanAccount { account, hours } => {
            let expires_at = expiry(now, *hours);
            guard.add_account_ban(*account, expires_at);
            format!("account {} banned, {}.", account, describe_expiry(expires_at))
        }
        AdminCommand::Unban { kind, number } => {
            if guard.remove_ban(*kind, *number) {
                format!("{} ban {} removed.", kind.as_str(), number)
            } else {
                format!("no {} ban number {}.", kind.as_str(), number)
            }
        }
        AdminCommand::Bans => list_bans(guard, now),
        AdminCommand::CreateItem { .. } | AdminCommand::RemoveItem { .. } => {
            "world command not queued.".to_string()
        }
        AdminCommand::Unknown(name) => format!("unknown command !{}.", name),
    }
}

fn list_bans(guard: &ConnectionGuard, now: u64) -> String {
    let mut lines = Vec::new();
    for kind in [BanKind::Ip, BanKind::Player, BanKind::Account] {
        for (index, ban) in guard.bans(kind).iter().enumerate() {
            let state = if ban.is_active(now) { "" } else { " (expired)" };
            lines.push(format!(
                "{} {}: {}, {}{}",
                kind.as_str(),
                index + 1,
                ban.target,
                describe_expiry(ban.expires_at),
                state
            ));
        }
    }
    if lines.is_empty() {
        "no bans.".to_string()
    } else {
        lines.join("\n")
    }
}

/// Zero hours is a permanent ban.
fn expiry(now: u64, hours: u32) -> u64 {
    if hours == 0 {
        0
    } else {
        now + u64::from(hours) * 3_600
    }
}

fn parse_ip(value: Option<&str>) -> Result<Ipv4Addr, String> {
    let value = value.ok_or_else(|| "admin command missing address".to_string())?;
    value
        .parse::<Ipv4Addr>()
        .map_err(|_| format!("admin command expected IPv4 address, got '{value}'"))
}

fn parse_id(value: Option<&str>) -> Result<u32, String> {
    let value = value.ok_or_else(|| "admin command missing id".to_string())?;
    value
        .parse::<u32>()
        .map_err(|_| format!("admin command expected u32, got '{value}'"))
}

fn parse_hours(value: Option<&str>) -> Result<u32, String> {
    match value {
        None => Ok(0),
        Some(value) => value
            .parse::<u32>()
            .map_err(|_| format!("admin command expected hours, got '{value}'")),
    }
}

fn parse_coordinate(value: Option<&str>) -> Result<u16, String> {
    parse_count(value, "coordinate")
}

fn parse_floor(value: Option<&str>) -> Result<u8, String> {
    let value = value.ok_or_else(|| "admin command missing floor".to_string())?;
    value
        .parse::<u8>()
        .map_err(|_| format!("admin command expected floor, got '{value}'"))
}

fn parse_count(value: Option<&str>, what: &str) -> Result<u16, String> {
    let value = value.ok_or_else(|| format!("admin command missing {what}"))?;
    value
        .parse::<u16>()
        .map_err(|_| format!("admin command expected {what}, got '{value}'"))
}

/// Missing means one.
fn parse_optional_count(value: Option<&str>) -> Result<u16, String> {
    match value {
        None => Ok(1),
        Some(_) => parse_count(value, "count"),
    }
}

fn parse_number(value: Option<&str>) -> Result<usize, String> {
    let value = value.ok_or_else(|| "admin command missing ban number".to_string())?;
    value
        .parse::<usize>()
        .map_err(|_| format!("admin command expected ban number, got '{value}'"))
}
