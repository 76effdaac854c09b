//! Per-chat ledger: records, rates, user classes and daily snapshots.
//!
//! Field names follow the persisted JSON layout (`rate` is the fee percentage,
//! `fixed_rate` the exchange rate) so older data files load unchanged.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

mod book;

pub use book::{group_sums, Book};

pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Anything carrying a `YYYY-MM-DD HH:MM:SS` timestamp.
pub trait Timed {
    fn time(&self) -> &str;

    fn date(&self) -> &str {
        self.time().split(' ').next().unwrap_or("")
    }

    /// `HH:MM:SS`, or `None` for malformed timestamps.
    fn clock(&self) -> Option<&str> {
        self.time().split(' ').nth(1)
    }

    /// `HH:MM`, or `00:00` for malformed timestamps.
    fn hour_minute(&self) -> String {
        match self.clock() {
            Some(t) => t.split(':').take(2).collect::<Vec<_>>().join(":"),
            None => "00:00".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DepositRecord {
    pub amount: f64,
    #[serde(default)]
    pub usd_equivalent: f64,
    pub time: String,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responder: Option<String>,
}

impl Timed for DepositRecord {
    fn time(&self) -> &str {
        &self.time
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalRecord {
    /// Local currency.
    pub amount: f64,
    /// The USDT amount that was typed.
    #[serde(default)]
    pub usd_equivalent: f64,
    pub time: String,
    pub user: String,
}

impl Timed for WithdrawalRecord {
    fn time(&self) -> &str {
        &self.time
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserClass {
    pub up: f64,
    pub down: f64,
    pub balance: f64,
}

/// A day's records frozen by the rollover.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub deposits: Vec<DepositRecord>,
    #[serde(default)]
    pub withdrawals: Vec<WithdrawalRecord>,
    #[serde(default, rename = "rate")]
    pub fee_rate: f64,
    #[serde(default)]
    pub fixed_rate: f64,
}

impl Snapshot {
    pub fn book(&self) -> Book<'_> {
        Book::new(
            &self.deposits,
            &self.withdrawals,
            self.fee_rate,
            self.fixed_rate,
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub deposits: Vec<DepositRecord>,
    #[serde(default)]
    pub withdrawals: Vec<WithdrawalRecord>,
    /// Fee percentage. Shown on bills, never applied.
    #[serde(default, rename = "rate")]
    pub fee_rate: f64,
    #[serde(default)]
    pub fixed_rate: f64,
    #[serde(default)]
    pub users: BTreeMap<String, UserClass>,
    #[serde(default)]
    pub history: BTreeMap<String, Snapshot>,
    /// Last seen chat title, for reports about other chats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// `amount / rate`, with a zero rate short-circuiting to zero.
pub fn usd_of(amount: f64, rate: f64) -> f64 {
    if rate == 0.0 {
        0.0
    } else {
        amount / rate
    }
}

fn stamp(at: NaiveDateTime) -> String {
    at.format(TIME_FORMAT).to_string()
}

impl Ledger {
    pub fn book(&self) -> Book<'_> {
        Book::new(
            &self.deposits,
            &self.withdrawals,
            self.fee_rate,
            self.fixed_rate,
        )
    }

    pub fn add_deposit(
        &mut self,
        amount: f64,
        user: String,
        responder: Option<String>,
        at: NaiveDateTime,
    ) -> &DepositRecord {
        let record = DepositRecord {
            amount,
            usd_equivalent: usd_of(amount, self.fixed_rate),
            time: stamp(at),
            user,
            responder,
        };
        self.deposits.push(record);
        &self.deposits[self.deposits.len() - 1]
    }

    /// Stores `-amount` as a deposit (a correction), never with a responder.
    pub fn add_negative_deposit(
        &mut self,
        amount: f64,
        user: String,
        at: NaiveDateTime,
    ) -> &DepositRecord {
        self.add_deposit(-amount, user, None, at)
    }

    /// `usdt` is converted to local currency at the current fixed rate.
    pub fn add_withdrawal(&mut self, usdt: f64, user: String, at: NaiveDateTime) -> &WithdrawalRecord {
        let record = WithdrawalRecord {
            amount: usdt * self.fixed_rate,
            usd_equivalent: usdt,
            time: stamp(at),
            user,
        };
        self.withdrawals.push(record);
        &self.withdrawals[self.withdrawals.len() - 1]
    }

    pub fn set_fee_rate(&mut self, rate: f64) {
        self.fee_rate = rate;
    }

    pub fn set_fixed_rate(&mut self, rate: f64) {
        self.fixed_rate = rate;
    }

    pub fn set_user_class(&mut self, id: &str, up: f64, down: f64) -> UserClass {
        let class = UserClass {
            up,
            down,
            balance: up - down,
        };
        self.users.insert(id.to_string(), class);
        class
    }

    /// Manual reset: empty ledger with fee 0 and exchange rate 1. History survives.
    pub fn reset(&mut self) {
        self.deposits.clear();
        self.withdrawals.clear();
        self.users.clear();
        self.fee_rate = 0.0;
        self.fixed_rate = 1.0;
    }

    pub fn has_active_records(&self) -> bool {
        !self.deposits.is_empty() || !self.withdrawals.is_empty()
    }

    /// Store the active records and rates as `history[date]`, replacing any
    /// earlier snapshot of that date.
    pub fn archive(&mut self, date: &str) {
        self.history.insert(
            date.to_string(),
            Snapshot {
                deposits: self.deposits.clone(),
                withdrawals: self.withdrawals.clone(),
                fee_rate: self.fee_rate,
                fixed_rate: self.fixed_rate,
            },
        );
    }

    /// Daily rollover: archive under `date` (when there is anything to archive),
    /// then clear records and user classes. Rates and history are kept.
    ///
    /// Returns true when a snapshot was written.
    pub fn roll_over(&mut self, date: &str) -> bool {
        let archived = self.has_active_records();
        if archived {
            self.archive(date);
        }
        self.deposits.clear();
        self.withdrawals.clear();
        self.users.clear();
        archived
    }

    /// Drop snapshots dated before `cutoff` (`YYYY-MM-DD` compares lexically).
    pub fn prune_history(&mut self, cutoff: &str) -> usize {
        let before = self.history.len();
        self.history.retain(|date, _| date.as_str() >= cutoff);
        before - self.history.len()
    }

    /// Every record dated `date`: the archived snapshot plus matching active records.
    pub fn day(&self, date: &str) -> DayRecords {
        let snapshot = self.history.get(date);
        let mut deposits: Vec<DepositRecord> = snapshot
            .map(|s| s.deposits.clone())
            .unwrap_or_default();
        let mut withdrawals: Vec<WithdrawalRecord> = snapshot
            .map(|s| s.withdrawals.clone())
            .unwrap_or_default();

        let active_deposits = self.deposits.iter().filter(|d| d.date() == date);
        let active_withdrawals = self.withdrawals.iter().filter(|w| w.date() == date);
        let before = deposits.len() + withdrawals.len();
        deposits.extend(active_deposits.cloned());
        withdrawals.extend(active_withdrawals.cloned());
        let has_active = deposits.len() + withdrawals.len() > before;

        let (fee_rate, fixed_rate) = match snapshot {
            Some(s) if !has_active => (s.fee_rate, s.fixed_rate),
            _ => (self.fee_rate, self.fixed_rate),
        };

        DayRecords {
            date: date.to_string(),
            deposits,
            withdrawals,
            fee_rate,
            fixed_rate,
        }
    }

    pub fn has_records_on(&self, date: &str) -> bool {
        let archived = self
            .history
            .get(date)
            .map(|s| !s.deposits.is_empty() || !s.withdrawals.is_empty())
            .unwrap_or(false);
        archived
            || self.deposits.iter().any(|d| d.date() == date)
            || self.withdrawals.iter().any(|w| w.date() == date)
    }
}

/// Owned records of one calendar day, with the rates that applied.
#[derive(Clone, Debug, PartialEq)]
pub struct DayRecords {
    pub date: String,
    pub deposits: Vec<DepositRecord>,
    pub withdrawals: Vec<WithdrawalRecord>,
    pub fee_rate: f64,
    pub fixed_rate: f64,
}

impl DayRecords {
    pub fn book(&self) -> Book<'_> {
        Book::new(
            &self.deposits,
            &self.withdrawals,
            self.fee_rate,
            self.fixed_rate,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.deposits.is_empty() && self.withdrawals.is_empty()
    }
}
