//! Connection abuse guard shared by the accepting threads: address, account
//! and player bans plus the reconnect and failed-login throttles. Every table
//! sits behind one lock.

use crate::persistence::bans::{BanKind, BanRecord, BanStore, BanTarget};
use crate::telemetry::logging;
use lru::LruCache;
use std::net::Ipv4Addr;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardConfig {
    /// 0 disables the failed-login block.
    pub max_login_tries: u32,
    pub retry_timeout_ms: u64,
    pub login_timeout_ms: u64,
    pub connect_interval_ms: u64,
    pub tracked_addresses: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_login_tries: 3,
            retry_timeout_ms: 5_000,
            login_timeout_ms: 60_000,
            connect_interval_ms: 1_000,
            tracked_addresses: 4_096,
        }
    }
}

/// Name to player id resolution for name-based ban checks.
pub trait PlayerLookup {
    fn player_id(&self, name: &str) -> Option<u32>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LoginBlock {
    count: u32,
    last_attempt: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ConnectBlock {
    last_connection: u64,
}

struct GuardTables {
    logins: LruCache<Ipv4Addr, LoginBlock>,
    connects: LruCache<Ipv4Addr, ConnectBlock>,
    ip_bans: Vec<BanRecord>,
    player_bans: Vec<BanRecord>,
    account_bans: Vec<BanRecord>,
}

impl GuardTables {
    fn list(&self, kind: BanKind) -> &Vec<BanRecord> {
        match kind {
            BanKind::Ip => &self.ip_bans,
            BanKind::Player => &self.player_bans,
            BanKind::Account => &self.account_bans,
        }
    }

    fn list_mut(&mut self, kind: BanKind) -> &mut Vec<BanRecord> {
        match kind {
            BanKind::Ip => &mut self.ip_bans,
            BanKind::Player => &mut self.player_bans,
            BanKind::Account => &mut self.account_bans,
        }
    }
}

pub struct ConnectionGuard {
    config: GuardConfig,
    tables: Mutex<GuardTables>,
}

pub fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn ip_matches(ban: &BanRecord, client: Ipv4Addr) -> bool {
    match ban.target {
        BanTarget::Ip { ip, mask } => {
            let mask = u32::from(mask);
            u32::from(ip) & mask == u32::from(client) & mask
        }
        _ => false,
    }
}

impl ConnectionGuard {
    pub fn new(config: GuardConfig) -> Self {
        let capacity = NonZeroUsize::new(config.tracked_addresses.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            config,
            tables: Mutex::new(GuardTables {
                logins: LruCache::new(capacity),
                connects: LruCache::new(capacity),
                ip_bans: Vec::new(),
                player_bans: Vec::new(),
                account_bans: Vec::new(),
            }),
        }
    }

    pub fn config(&self) -> GuardConfig {
        self.config
    }

    fn tables(&self) -> MutexGuard<'_, GuardTables> {
        // no method panics mid-update, so a poisoned lock still guards whole tables
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_ip_banished(&self, ip: Ipv4Addr) -> bool {
        self.is_ip_banished_at(ip, unix_seconds())
    }

    pub fn is_ip_banished_at(&self, ip: Ipv4Addr, now: u64) -> bool {
        if ip.is_unspecified() {
            return false;
        }
        self.tables()
            .ip_bans
            .iter()
            .any(|ban| ip_matches(ban, ip) && ban.is_active(now))
    }

    pub fn is_ip_disabled(&self, ip: Ipv4Addr) -> bool {
        self.is_ip_disabled_at(ip, unix_millis())
    }

    /// True while an address that used up its login tries sits out the
    /// login timeout.
    pub fn is_ip_disabled_at(&self, ip: Ipv4Addr, now_ms: u64) -> bool {
        if self.config.max_login_tries == 0 {
            return false;
        }
        let mut tables = self.tables();
        match tables.logins.get(&ip) {
            Some(block) => {
                block.count >= self.config.max_login_tries
                    && now_ms < block.last_attempt.saturating_add(self.config.login_timeout_ms)
            }
            None => false,
        }
    }

    pub fn accept_connection(&self, ip: Ipv4Addr) -> bool {
        self.accept_connection_at(ip, unix_millis())
    }

    /// One connection per address per connect interval. A refused attempt
    /// does not push the window forward.
    pub fn accept_connection_at(&self, ip: Ipv4Addr, now_ms: u64) -> bool {
        if ip.is_unspecified() {
            return false;
        }
        let mut tables = self.tables();
        match tables.connects.get_mut(&ip) {
            None => {
                tables.connects.put(
                    ip,
                    ConnectBlock {
                        last_connection: now_ms,
                    },
                );
                true
            }
            Some(block) => {
                if now_ms.saturating_sub(block.last_connection) < self.config.connect_interval_ms {
                    return false;
                }
                block.last_connection = now_ms;
                true
            }
        }
    }

    pub fn add_login_attempt(&self, ip: Ipv4Addr, success: bool) {
        self.add_login_attempt_at(ip, success, unix_millis());
    }

    /// Failures, and successes that come too soon after the previous
    /// attempt, count toward the block. A success outside the retry window
    /// clears the counter.
    pub fn add_login_attempt_at(&self, ip: Ipv4Addr, success: bool, now_ms: u64) {
        if ip.is_unspecified() {
            return;
        }
        let max_tries = self.config.max_login_tries;
        let retry = self.config.retry_timeout_ms;
        let mut tables = self.tables();
        let mut block = tables.logins.get(&ip).copied().unwrap_or(LoginBlock {
            count: 0,
            last_attempt: 0,
        });
        if block.count >= max_tries {
            block.count = 0;
        }
        if !success || now_ms < block.last_attempt.saturating_add(retry) {
            block.count += 1;
        } else {
            block.count = 0;
        }
        block.last_attempt = now_ms;
        tables.logins.put(ip, block);
    }

    pub fn is_account_banished(&self, account: u32) -> bool {
        self.is_account_banished_at(account, unix_seconds())
    }

    pub fn is_account_banished_at(&self, account: u32, now: u64) -> bool {
        self.tables()
            .account_bans
            .iter()
            .any(|ban| ban.target == BanTarget::Account(account) && ban.is_active(now))
    }

    pub fn is_player_id_banished(&self, player: u32) -> bool {
        self.is_player_id_banished_at(player, unix_seconds())
    }

    pub fn is_player_id_banished_at(&self, player: u32, now: u64) -> bool {
        self.tables()
            .player_bans
            .iter()
            .any(|ban| ban.target == BanTarget::Player(player) && ban.is_active(now))
    }

    /// Unknown names are never banished.
    pub fn is_player_banished(&self, name: &str, players: &dyn PlayerLookup) -> bool {
        match players.player_id(name) {
            Some(id) => self.is_player_id_banished(id),
            None => false,
        }
    }

    pub fn add_ip_ban(&self, ip: Ipv4Addr, mask: Ipv4Addr, expires_at: u64) {
        self.add_ban(BanTarget::Ip { ip, mask }, expires_at);
    }

    pub fn add_player_ban(&self, player: u32, expires_at: u64) {
        self.add_ban(BanTarget::Player(player), expires_at);
    }

    pub fn add_account_ban(&self, account: u32, expires_at: u64) {
        self.add_ban(BanTarget::Account(account), expires_at);
    }

    /// Re-banning the same target only moves its expiry.
    pub fn add_ban(&self, target: BanTarget, expires_at: u64) {
        let mut tables = self.tables();
        let list = tables.list_mut(target.kind());
        match list.iter_mut().find(|ban| ban.target == target) {
            Some(existing) => existing.expires_at = expires_at,
            None => list.push(BanRecord { target, expires_at }),
        }
        drop(tables);
        logging::log_banish(&format!("ban {} until {}", target, describe_expiry(expires_at)));
    }

    pub fn remove_ip_ban(&self, number: usize) -> bool {
        self.remove_ban(BanKind::Ip, number)
    }

    pub fn remove_player_ban(&self, number: usize) -> bool {
        self.remove_ban(BanKind::Player, number)
    }

    pub fn remove_account_ban(&self, number: usize) -> bool {
        self.remove_ban(BanKind::Account, number)
    }

    /// `number` is the 1-based position shown by `bans`.
    pub fn remove_ban(&self, kind: BanKind, number: usize) -> bool {
        if number == 0 {
            return false;
        }
        let mut tables = self.tables();
        let list = tables.list_mut(kind);
        if number > list.len() {
            return false;
        }
        let removed = list.remove(number - 1);
        drop(tables);
        logging::log_banish(&format!("unban {}", removed.target));
        true
    }

    pub fn bans(&self, kind: BanKind) -> Vec<BanRecord> {
        self.tables().list(kind).clone()
    }

    /// Replace the ban lists with the active records of `store`.
    pub fn load_bans(&self, store: &dyn BanStore, now: u64) -> Result<usize, String> {
        let records = store.load()?;
        let mut tables = self.tables();
        tables.ip_bans.clear();
        tables.player_bans.clear();
        tables.account_bans.clear();
        let mut loaded = 0;
        for record in records.into_iter().filter(|record| record.is_active(now)) {
            tables.list_mut(record.target.kind()).push(record);
            loaded += 1;
        }
        drop(tables);
        logging::log_banish(&format!("{} bans loaded from {}", loaded, store.location()));
        Ok(loaded)
    }

    /// Write every active ban, permanent ones included.
    pub fn save_bans(&self, store: &dyn BanStore, now: u64) -> Result<usize, String> {
        let mut records = Vec::new();
        let tables = self.tables();
        for kind in [BanKind::Ip, BanKind::Player, BanKind::Account] {
            records.extend(tables.list(kind).iter().filter(|record| record.is_active(now)));
        }
        drop(tables);
        store.save(&records)?;
        logging::log_banish(&format!("{} bans saved to {}", records.len(), store.location()));
        Ok(records.len())
    }
}

pub fn describe_expiry(expires_at: u64) -> String {
    if expires_at == 0 {
        "permanent".to_string()
    } else {
        format!("epoch {}", expires_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::bans::TextBanStore;
    use std::collections::HashMap;
    use std::sync::Arc;

    const CLIENT: Ipv4Addr = Ipv4Addr::new(10, 1, 2, 3);

    fn guard() -> ConnectionGuard {
        ConnectionGuard::new(GuardConfig::default())
    }

    struct Players(HashMap<&'static str, u32>);

    impl PlayerLookup for Players {
        fn player_id(&self, name: &str) -> Option<u32> {
            self.0.get(name).copied()
        }
    }

    #[test]
    fn second_connection_within_a_second_is_refused() {
        let guard = guard();
        assert!(guard.accept_connection_at(CLIENT, 10_000));
        assert!(!guard.accept_connection_at(CLIENT, 10_500));
        // the refused attempt did not move the window
        assert!(guard.accept_connection_at(CLIENT, 11_000));
        assert!(guard.accept_connection_at(Ipv4Addr::new(10, 1, 2, 4), 11_001));
        assert!(!guard.accept_connection_at(Ipv4Addr::UNSPECIFIED, 20_000));
    }

    #[test]
    fn failed_logins_block_until_timeout() {
        let guard = guard();
        guard.add_login_attempt_at(CLIENT, false, 1_000);
        guard.add_login_attempt_at(CLIENT, false, 2_000);
        assert!(!guard.is_ip_disabled_at(CLIENT, 2_001));
        guard.add_login_attempt_at(CLIENT, false, 3_000);
        assert!(guard.is_ip_disabled_at(CLIENT, 3_001));
        assert!(guard.is_ip_disabled_at(CLIENT, 62_999));
        assert!(!guard.is_ip_disabled_at(CLIENT, 63_000));
    }

    #[test]
    fn success_outside_retry_window_resets_counter() {
        let guard = guard();
        guard.add_login_attempt_at(CLIENT, false, 1_000);
        guard.add_login_attempt_at(CLIENT, false, 2_000);
        guard.add_login_attempt_at(CLIENT, true, 10_000);
        guard.add_login_attempt_at(CLIENT, false, 20_000);
        guard.add_login_attempt_at(CLIENT, false, 21_000);
        assert!(!guard.is_ip_disabled_at(CLIENT, 21_001));
    }

    #[test]
    fn quick_success_still_counts() {
        let guard = guard();
        guard.add_login_attempt_at(CLIENT, false, 1_000);
        guard.add_login_attempt_at(CLIENT, false, 2_000);
        guard.add_login_attempt_at(CLIENT, true, 3_000);
        assert!(guard.is_ip_disabled_at(CLIENT, 3_500));
    }

    #[test]
    fn zero_login_tries_never_disables() {
        let guard = ConnectionGuard::new(GuardConfig {
            max_login_tries: 0,
            ..GuardConfig::default()
        });
        for at in 0..10 {
            guard.add_login_attempt_at(CLIENT, false, at * 10);
        }
        assert!(!guard.is_ip_disabled_at(CLIENT, 100));
    }

    #[test]
    fn unbounded_timeouts_keep_the_block() {
        let guard = ConnectionGuard::new(GuardConfig {
            retry_timeout_ms: u64::MAX,
            login_timeout_ms: u64::MAX,
            ..GuardConfig::default()
        });
        guard.add_login_attempt_at(CLIENT, false, 1_000);
        guard.add_login_attempt_at(CLIENT, true, 2_000);
        guard.add_login_attempt_at(CLIENT, true, u64::MAX - 1);
        assert!(guard.is_ip_disabled_at(CLIENT, u64::MAX - 1));
    }

    #[test]
    fn ip_bans_respect_mask_and_expiry() {
        let guard = guard();
        guard.add_ip_ban(
            Ipv4Addr::new(10, 1, 2, 0),
            Ipv4Addr::new(255, 255, 255, 0),
            500,
        );
        assert!(guard.is_ip_banished_at(CLIENT, 499));
        assert!(!guard.is_ip_banished_at(Ipv4Addr::new(10, 1, 3, 3), 499));
        assert!(!guard.is_ip_banished_at(CLIENT, 500));
        guard.add_ip_ban(
            Ipv4Addr::new(10, 1, 2, 0),
            Ipv4Addr::new(255, 255, 255, 0),
            0,
        );
        assert_eq!(guard.bans(BanKind::Ip).len(), 1);
        assert!(guard.is_ip_banished_at(CLIENT, u64::MAX));
    }

    #[test]
    fn player_and_account_bans() {
        let guard = guard();
        guard.add_player_ban(7, 0);
        guard.add_account_ban(900, 100);
        let players = Players(HashMap::from([("Eryn", 7), ("Bob", 8)]));
        assert!(guard.is_player_banished("Eryn", &players));
        assert!(!guard.is_player_banished("Bob", &players));
        assert!(!guard.is_player_banished("Nobody", &players));
        assert!(guard.is_account_banished_at(900, 99));
        assert!(!guard.is_account_banished_at(900, 100));
    }

    #[test]
    fn removal_uses_one_based_positions() {
        let guard = guard();
        guard.add_player_ban(1, 0);
        guard.add_player_ban(2, 0);
        assert!(!guard.remove_player_ban(0));
        assert!(!guard.remove_player_ban(3));
        assert!(guard.remove_player_ban(1));
        assert_eq!(
            guard.bans(BanKind::Player),
            vec![BanRecord {
                target: BanTarget::Player(2),
                expires_at: 0
            }]
        );
    }

    #[test]
    fn save_drops_expired_and_load_skips_them() {
        let path = std::env::temp_dir().join(format!(
            "tibia-guard-test-{}.txt",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("time")
                .as_nanos()
        ));
        let store = TextBanStore::new(path.clone());
        let guard = guard();
        guard.add_account_ban(1, 0);
        guard.add_account_ban(2, 50);
        guard.add_account_ban(3, 500);
        assert_eq!(guard.save_bans(&store, 100).expect("save"), 2);

        let restored = ConnectionGuard::new(GuardConfig::default());
        assert_eq!(restored.load_bans(&store, 600).expect("load"), 1);
        assert!(restored.is_account_banished_at(1, 600));
        assert!(!restored.is_account_banished_at(3, 600));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn guard_is_shared_across_threads() {
        let guard = Arc::new(guard());
        let handles: Vec<_> = (0..4u8)
            .map(|n| {
                let guard = Arc::clone(&guard);
                std::thread::spawn(move || guard.accept_connection_at(Ipv4Addr::new(10, 0, 0, n + 1), 5_000))
            })
            .collect();
        for handle in handles {
            assert!(handle.join().expect("thread"));
        }
        assert!(!guard.accept_connection_at(Ipv4Addr::new(10, 0, 0, 1), 5_100));
    }

    #[test]
    fn tracked_addresses_are_bounded() {
        let guard = ConnectionGuard::new(GuardConfig {
            tracked_addresses: 1,
            ..GuardConfig::default()
        });
        assert!(guard.accept_connection_at(CLIENT, 1_000));
        assert!(guard.accept_connection_at(Ipv4Addr::new(10, 9, 9, 9), 1_000));
        // CLIENT was evicted, so it is treated as new
        assert!(guard.accept_connection_at(CLIENT, 1_001));
    }
}
