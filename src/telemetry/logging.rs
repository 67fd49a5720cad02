use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
enum LogFile {
    Banish,
    Error,
    Game,
    Transfer,
}

impl LogFile {
    const ALL: [LogFile; 4] = [LogFile::Banish, LogFile::Error, LogFile::Game, LogFile::Transfer];

    fn file_name(self) -> &'static str {
        match self {
            LogFile::Banish => "banish.log",
            LogFile::Error => "error.log",
            LogFile::Game => "game.log",
            LogFile::Transfer => "transfer.log",
        }
    }

    /// Error and transfer logs are machine-read and start without a banner.
    fn has_header(self) -> bool {
        matches!(self, LogFile::Banish | LogFile::Game)
    }
}

struct Logger {
    files: Mutex<BTreeMap<LogFile, File>>,
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

const HEADER_LINE: &str = "-------------------------------------------------------------------------------";
const HEADER_TITLE: &str = "Tibia - Graphical Multi-User-Dungeon";

/// Day 0 of the unix epoch was a Thursday.
const WEEKDAYS: [&str; 7] = ["Thu", "Fri", "Sat", "Sun", "Mon", "Tue", "Wed"];
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Open `<root>/log/*.log` for appending. Calls after the first are no-ops.
pub fn init(root: &Path) -> Result<(), String> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let log_dir = root.join("log");
    std::fs::create_dir_all(&log_dir)
        .map_err(|err| format!("log directory create failed for {}: {}", log_dir.display(), err))?;

    let started = Stamp::now();
    let mut files = BTreeMap::new();
    for log_file in LogFile::ALL {
        let name = log_file.file_name();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join(name))
            .map_err(|err| format!("open log {} failed: {}", name, err))?;
        let fresh = file.metadata().map(|meta| meta.len() == 0).unwrap_or(true);
        if log_file.has_header() && fresh {
            file.write_all(started.banner(name).as_bytes())
                .map_err(|err| format!("header write failed for {}: {}", name, err))?;
        }
        files.insert(log_file, file);
    }

    LOGGER
        .set(Logger {
            files: Mutex::new(files),
        })
        .map_err(|_| "log system already initialized".to_string())
}

pub fn log_game(message: &str) {
    append(LogFile::Game, message);
}

pub fn log_error(message: &str) {
    append(LogFile::Error, message);
}

pub fn log_banish(message: &str) {
    append(LogFile::Banish, message);
}

pub fn log_transfer(message: &str) {
    append(LogFile::Transfer, message);
}

fn append(log_file: LogFile, message: &str) {
    let Some(logger) = LOGGER.get() else {
        return;
    };
    let line = Stamp::now().entry(message);
    let Ok(mut files) = logger.files.lock() else {
        return;
    };
    if let Some(file) = files.get_mut(&log_file) {
        let _ = file.write_all(line.as_bytes()).and_then(|_| file.flush());
    }
}

/// Calendar breakdown of a unix timestamp in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    year: i64,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
    weekday: usize,
}

impl Stamp {
    fn now() -> Self {
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self::from_unix(secs)
    }

    fn from_unix(secs: u64) -> Self {
        let days = (secs / 86_400) as i64;
        let of_day = (secs % 86_400) as u32;
        let (year, month, day) = civil_from_days(days);
        Self {
            year,
            month,
            day,
            hour: of_day / 3_600,
            minute: of_day % 3_600 / 60,
            second: of_day % 60,
            weekday: days.rem_euclid(7) as usize,
        }
    }

    /// `DD.MM.YYYY HH:MM:SS (0): message`
    fn entry(&self, message: &str) -> String {
        format!(
            "{:02}.{:02}.{} {:02}:{:02}:{:02} (0): {}\n",
            self.day, self.month, self.year, self.hour, self.minute, self.second, message
        )
    }

    fn banner(&self, name: &str) -> String {
        let month = MONTHS[(self.month as usize).saturating_sub(1).min(11)];
        format!(
            "{HEADER_LINE}\n{HEADER_TITLE}\n{name} - gestartet {} {month} {:>2} {:02}:{:02}:{:02} {}\n",
            WEEKDAYS[self.weekday % 7],
            self.day,
            self.hour,
            self.minute,
            self.second,
            self.year
        )
    }
}

/// Proleptic Gregorian date for a day count since 1970-01-01.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn civil_dates_from_epoch_days() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(19_723), (2024, 1, 1));
        assert_eq!(civil_from_days(11_016), (2000, 2, 29));
        assert_eq!(civil_from_days(-1), (1969, 12, 31));
    }

    #[test]
    fn stamp_splits_time_of_day() {
        let stamp = Stamp::from_unix(86_400 + 3_661);
        assert_eq!((stamp.year, stamp.month, stamp.day), (1970, 1, 2));
        assert_eq!((stamp.hour, stamp.minute, stamp.second), (1, 1, 1));
        assert_eq!(WEEKDAYS[stamp.weekday], "Fri");
    }

    #[test]
    fn weekdays_follow_the_calendar() {
        // 2024-01-01 was a Monday, 2000-02-29 a Tuesday
        assert_eq!(WEEKDAYS[Stamp::from_unix(19_723 * 86_400).weekday], "Mon");
        assert_eq!(WEEKDAYS[Stamp::from_unix(11_016 * 86_400).weekday], "Tue");
    }

    #[test]
    fn entry_and_banner_formats() {
        let stamp = Stamp::from_unix(19_723 * 86_400 + 45_296);
        assert_eq!(stamp.entry("hello"), "01.01.2024 12:34:56 (0): hello\n");
        let banner = stamp.banner("game.log");
        assert!(banner.ends_with("game.log - gestartet Mon Jan  1 12:34:56 2024\n"));
        assert!(banner.starts_with(HEADER_LINE));
    }

    #[test]
    fn logging_before_init_is_silent() {
        log_transfer("move item 1 -> container");
        log_banish("nothing to see");
    }
}
