//! Recognizes the text triggers the bot reacts to.
//!
//! Parsing is separate from authorization: the bot decides who may run a
//! trigger, this module only decides what the text means.

use std::sync::OnceLock;

use regex::Regex;

use crate::calc;

#[derive(Clone, Debug, PartialEq)]
pub enum Trigger {
    AuthorizeChat,
    Operators(OperatorCommand),
    Finance(FinanceView),
    Deposit(Entry),
    Deduct(Entry),
    Malformed(EntryKind),
    ExportRecent,
    Calculate(String),
    Payout { kind: PayoutKind, usdt: f64 },
    SetFeeRate(f64),
    SetFixedRate(f64),
    ExportYesterday,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OperatorCommand {
    Reset,
    /// `None` means "the user I am replying to".
    Add(Option<String>),
    Remove(Option<String>),
    Clear,
    Show,
    /// Starts like an operator command but matches no form.
    Unrecognized,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinanceView {
    Bill,
    Stats,
    Audit,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Entry {
    pub amount: f64,
    /// Exchange rate given as `+N/R`.
    pub rate: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Deposit,
    Deduct,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayoutKind {
    /// `回N`
    Return,
    /// `下发N`
    Dispatch,
}

impl PayoutKind {
    pub fn ack(self) -> &'static str {
        match self {
            PayoutKind::Return => "已回款",
            PayoutKind::Dispatch => "已下发",
        }
    }
}

fn cached(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("valid regex"))
}

fn add_operator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"^设置操作人\s+@(\w+)$")
}

fn remove_operator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"^删除操作人\s+@(\w+)$")
}

fn return_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"^回(\d+(?:\.\d+)?)$")
}

fn dispatch_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"^下发(\d+(?:\.\d+)?)$")
}

fn fee_rate_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"^设置费率(\d+(?:\.\d+)?)%$")
}

fn fixed_rate_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"^设置汇率(\d+(?:\.\d+)?)$")
}

fn captured_number(re: &Regex, text: &str) -> Option<f64> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

/// Finite numbers only; `inf` / `NaN` are rejected like any other junk.
pub fn parse_amount(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_entry(body: &str) -> Option<Entry> {
    match body.split_once('/') {
        Some((amount, rate)) => Some(Entry {
            amount: parse_amount(amount)?,
            rate: Some(parse_amount(rate)?),
        }),
        None => Some(Entry {
            amount: parse_amount(body)?,
            rate: None,
        }),
    }
}

fn parse_operator_command(text: &str) -> Option<OperatorCommand> {
    let cmd = match text {
        "重置授权人" => OperatorCommand::Reset,
        "清空操作人" => OperatorCommand::Clear,
        "显示操作人" => OperatorCommand::Show,
        "设置操作人" => OperatorCommand::Add(None),
        "删除操作人" => OperatorCommand::Remove(None),
        _ if text.starts_with("设置操作人") => add_operator_re()
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| OperatorCommand::Add(Some(m.as_str().to_string())))
            .unwrap_or(OperatorCommand::Unrecognized),
        _ if text.starts_with("删除操作人") => remove_operator_re()
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| OperatorCommand::Remove(Some(m.as_str().to_string())))
            .unwrap_or(OperatorCommand::Unrecognized),
        _ => return None,
    };
    Some(cmd)
}

/// Classify a message. Checks run in a fixed order; the first match wins.
pub fn parse_trigger(text: &str) -> Option<Trigger> {
    let text = text.trim();
    if text == "授权群" {
        return Some(Trigger::AuthorizeChat);
    }
    if let Some(cmd) = parse_operator_command(text) {
        return Some(Trigger::Operators(cmd));
    }
    if let Some(rest) = text.strip_prefix("财务") {
        let view = match rest {
            "统计" => FinanceView::Stats,
            "查账" => FinanceView::Audit,
            _ => FinanceView::Bill,
        };
        return Some(Trigger::Finance(view));
    }
    if let Some(body) = text.strip_prefix('+') {
        return Some(
            parse_entry(body)
                .map(Trigger::Deposit)
                .unwrap_or(Trigger::Malformed(EntryKind::Deposit)),
        );
    }
    if let Some(body) = text.strip_prefix('-') {
        return Some(
            parse_entry(body)
                .map(Trigger::Deduct)
                .unwrap_or(Trigger::Malformed(EntryKind::Deduct)),
        );
    }
    if text == "导出全部账单" {
        return Some(Trigger::ExportRecent);
    }
    if text.starts_with("计算") || text.starts_with("calc") || calc::is_math_expression(text) {
        return Some(Trigger::Calculate(text.to_string()));
    }
    if let Some(usdt) = captured_number(return_re(), text) {
        return Some(Trigger::Payout {
            kind: PayoutKind::Return,
            usdt,
        });
    }
    if let Some(usdt) = captured_number(dispatch_re(), text) {
        return Some(Trigger::Payout {
            kind: PayoutKind::Dispatch,
            usdt,
        });
    }
    if let Some(rate) = captured_number(fee_rate_re(), text) {
        return Some(Trigger::SetFeeRate(rate));
    }
    if let Some(rate) = captured_number(fixed_rate_re(), text) {
        return Some(Trigger::SetFixedRate(rate));
    }
    if text == "导出昨日账单" {
        return Some(Trigger::ExportYesterday);
    }
    None
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mention {
    /// No bot was mentioned; text unchanged.
    None(String),
    /// This bot was mentioned; the mention is removed.
    Ours(String),
    /// Another bot was mentioned.
    Other,
}

/// Look for `cmd@somebot` in the first token of a group message.
///
/// Only names ending in `bot` count as bot mentions, so `设置操作人 @alice`
/// keeps its argument.
pub fn strip_bot_mention(text: &str, our_username: Option<&str>) -> Mention {
    let trimmed = text.trim();
    let (first, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((first, rest)) => (first, Some(rest)),
        None => (trimmed, None),
    };
    let Some((command, name)) = first.split_once('@') else {
        return Mention::None(text.to_string());
    };
    if !name.to_ascii_lowercase().ends_with("bot") {
        return Mention::None(text.to_string());
    }
    let ours = our_username
        .map(|u| u.trim_start_matches('@').eq_ignore_ascii_case(name))
        .unwrap_or(false);
    if !ours {
        return Mention::Other;
    }
    let stripped = match rest {
        Some(rest) if command.is_empty() => rest.trim().to_string(),
        Some(rest) => format!("{command} {}", rest.trim()),
        None => command.to_string(),
    };
    Mention::Ours(stripped)
}
