use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::{FixedOffset, NaiveDateTime, Offset, Utc};

use crate::{errors::Error, Result};

/// Typed configuration, read from the environment (and an optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    pub bot_token: String,
    /// Global admins. More can be claimed at runtime via `/set_admin` while this is empty.
    pub admin_user_ids: Vec<i64>,
    /// Usernames (without `@`) seeded as operators of newly authorized groups.
    pub initial_operators: Vec<String>,

    pub timezone: FixedOffset,
    pub reset_check_interval: Duration,
    pub save_interval: Duration,
    pub history_retention_days: i64,

    pub data_file: PathBuf,
    pub export_dir: PathBuf,

    pub max_processed_messages: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let bot_token = env_str("BOT_TOKEN")
            .or_else(|| env_str("TELEGRAM_BOT_TOKEN"))
            .unwrap_or_default();
        if bot_token.trim().is_empty() {
            return Err(Error::Config(
                "BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let admin_user_ids =
            parse_csv_i64(env_str("ADMIN_USER_IDS").or_else(|| env_str("ADMIN_USER_ID")));
        let initial_operators = parse_usernames(env_str("INITIAL_OPERATORS"));

        let timezone = match env_str("TIMEZONE") {
            Some(raw) => parse_timezone(&raw)?,
            None => default_timezone(),
        };

        let reset_check_interval =
            Duration::from_secs(env_u64("RESET_CHECK_INTERVAL").unwrap_or(3600).max(1));
        let save_interval = Duration::from_secs(env_u64("SAVE_INTERVAL").unwrap_or(300).max(1));
        let history_retention_days = env_u64("HISTORY_RETENTION_DAYS")
            .map(|d| i64::try_from(d).unwrap_or(i64::MAX))
            .unwrap_or(7);

        let data_file = PathBuf::from(env_str("DATA_FILE").unwrap_or("bot_data.json".to_string()));
        let export_dir = PathBuf::from(env_str("EXPORT_DIR").unwrap_or("exports".to_string()));
        fs::create_dir_all(&export_dir)?;

        let max_processed_messages = env_usize("MAX_PROCESSED_MESSAGES").unwrap_or(100).max(1);

        Ok(Self {
            bot_token,
            admin_user_ids,
            initial_operators,
            timezone,
            reset_check_interval,
            save_interval,
            history_retention_days,
            data_file,
            export_dir,
            max_processed_messages,
        })
    }

    /// Wall-clock time in the configured timezone. Record times and dates use this.
    pub fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.timezone).naive_local()
    }
}

/// Asia/Shanghai.
pub fn default_timezone() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).unwrap_or(Utc.fix())
}

/// Accepts a handful of IANA names without DST, `UTC`, or a `±HH[:MM]` offset.
pub fn parse_timezone(raw: &str) -> Result<FixedOffset> {
    let s = raw.trim();
    let named_hours = match s {
        "UTC" | "Etc/UTC" | "GMT" => Some(0),
        "Asia/Shanghai" | "Asia/Chongqing" | "Asia/Hong_Kong" | "Asia/Macau" | "Asia/Taipei"
        | "Asia/Singapore" | "Asia/Manila" | "Asia/Kuala_Lumpur" => Some(8),
        "Asia/Tokyo" | "Asia/Seoul" => Some(9),
        "Asia/Bangkok" | "Asia/Ho_Chi_Minh" | "Asia/Jakarta" => Some(7),
        _ => None,
    };
    if let Some(h) = named_hours {
        return FixedOffset::east_opt(h * 3600)
            .ok_or_else(|| Error::Config(format!("invalid TIMEZONE: {raw}")));
    }

    let (sign, rest) = match s.as_bytes().first() {
        Some(b'+') => (1, &s[1..]),
        Some(b'-') => (-1, &s[1..]),
        _ => return Err(Error::Config(format!("unsupported TIMEZONE: {raw}"))),
    };
    let (h, m) = rest.split_once(':').unwrap_or((rest, "0"));
    let hours: i32 = h
        .parse()
        .map_err(|_| Error::Config(format!("invalid TIMEZONE: {raw}")))?;
    let minutes: i32 = m
        .parse()
        .map_err(|_| Error::Config(format!("invalid TIMEZONE: {raw}")))?;
    if hours > 14 || minutes > 59 {
        return Err(Error::Config(format!("invalid TIMEZONE: {raw}")));
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| Error::Config(format!("invalid TIMEZONE: {raw}")))
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim().trim_start_matches("export ").trim();
        if key.is_empty() || env::var_os(key).is_some() {
            continue;
        }

        env::set_var(key, strip_quotes(v.trim()));
    }
}

fn strip_quotes(v: &str) -> &str {
    let quoted = v.len() >= 2
        && ((v.starts_with('"') && v.ends_with('"')) || (v.starts_with('\'') && v.ends_with('\'')));
    if quoted {
        &v[1..v.len() - 1]
    } else {
        v
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn parse_usernames(v: Option<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in v.unwrap_or_default().split(',') {
        let name = name.trim().trim_start_matches('@');
        if !name.is_empty() && !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}
