//! Keyboards and date lists shared by text triggers, commands and callbacks.

use chrono::NaiveDate;

use crate::{
    actions::{self, CallbackAction},
    domain::ChatId,
    ledger::{Ledger, DATE_FORMAT},
    messaging::types::{InlineButton, InlineKeyboard},
    store::BotState,
};

pub const RECENT_DAYS: i64 = 7;

pub const EXPORT_DATE_PROMPT: &str = "请选择要导出的日期:";
pub const PICK_DATE_PROMPT: &str = "请选择要查看的日期:";
pub const MENU_PROMPT: &str = "请选择要查看的账单类型:";
pub const NO_DATES: &str = "没有找到任何日期的记账记录";

/// `today` and the six days before it, newest first.
pub fn recent_dates(today: NaiveDate) -> Vec<String> {
    (0..RECENT_DAYS)
        .map(|i| (today - chrono::Duration::days(i)).format(DATE_FORMAT).to_string())
        .collect()
}

/// Recent dates on which `ledger` has active or archived records.
pub fn chat_dates_with_records(ledger: Option<&Ledger>, today: NaiveDate) -> Vec<String> {
    let Some(ledger) = ledger else {
        return Vec::new();
    };
    recent_dates(today)
        .into_iter()
        .filter(|d| ledger.has_records_on(d))
        .collect()
}

/// Recent dates on which any chat has records.
pub fn any_chat_dates_with_records(state: &BotState, today: NaiveDate) -> Vec<String> {
    recent_dates(today)
        .into_iter()
        .filter(|d| state.chat_accounting.values().any(|l| l.has_records_on(d)))
        .collect()
}

fn date_buttons(dates: &[String], data: impl Fn(&str) -> String) -> Vec<InlineButton> {
    dates
        .iter()
        .map(|d| InlineButton::new(d.clone(), data(d)))
        .collect()
}

pub fn bill_keyboard(chat: ChatId) -> InlineKeyboard {
    InlineKeyboard::one_per_row(vec![
        InlineButton::new("详细账单", CallbackAction::ExportBill(chat).encode()),
        InlineButton::new("历史账单", CallbackAction::ViewHistory(chat).encode()),
    ])
}

pub fn export_dates_keyboard(chat: ChatId, dates: &[String]) -> InlineKeyboard {
    InlineKeyboard::pairs(date_buttons(dates, |d| {
        CallbackAction::ExportDate {
            date: d.to_string(),
            chat,
        }
        .encode()
    }))
}

pub fn back_to_export_dates(chat: ChatId) -> InlineKeyboard {
    InlineKeyboard::single("返回", CallbackAction::ExportDateBack(chat).encode())
}

pub fn history_keyboard(chat: ChatId, ledger: &Ledger) -> InlineKeyboard {
    let buttons = ledger
        .history
        .keys()
        .rev()
        .map(|date| {
            InlineButton::new(
                date.clone(),
                CallbackAction::HistoryDate {
                    chat,
                    date: date.clone(),
                }
                .encode(),
            )
        })
        .collect();
    InlineKeyboard::one_per_row(buttons)
        .push_row(vec![InlineButton::new("返回", CallbackAction::Cancel.encode())])
}

pub fn back_to_history(chat: ChatId) -> InlineKeyboard {
    InlineKeyboard::single("返回历史选择", CallbackAction::ViewHistory(chat).encode())
}

pub fn history_exported(chat: ChatId) -> InlineKeyboard {
    InlineKeyboard::single("查看历史账单", CallbackAction::ViewHistory(chat).encode())
}

/// The `/allbills` menu.
pub fn bills_menu() -> InlineKeyboard {
    InlineKeyboard::one_per_row(vec![
        InlineButton::new("查看所有群组当日统计", CallbackAction::AllChatsToday.encode()),
        InlineButton::new("按日期查看所有群组", CallbackAction::AllChatsByDate.encode()),
        InlineButton::new("查看当前群组7天账单", CallbackAction::CurrentChatWeek.encode()),
    ])
}

pub fn back_to_menu() -> InlineKeyboard {
    InlineKeyboard::single("返回", CallbackAction::FirstPage.encode())
}

/// Dates reached from the `/allbills` menu, with a way back to it.
pub fn menu_dates_keyboard(dates: &[String]) -> InlineKeyboard {
    InlineKeyboard::pairs(date_buttons(dates, |d| {
        CallbackAction::AllChatsOn(d.to_string()).encode()
    }))
    .push_row(vec![InlineButton::new("返回", CallbackAction::FirstPage.encode())])
}

/// Dates offered by `财务查账` and `/income`.
pub fn income_dates_keyboard(dates: &[String]) -> InlineKeyboard {
    InlineKeyboard::pairs(date_buttons(dates, actions::select_date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChatId;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn recent_dates_cross_month_boundaries() {
        let dates = recent_dates(day("2026-03-02"));
        assert_eq!(dates.len(), 7);
        assert_eq!(dates[0], "2026-03-02");
        assert_eq!(dates[1], "2026-03-01");
        assert_eq!(dates[2], "2026-02-28");
    }

    #[test]
    fn chat_dates_include_archived_days() {
        let mut ledger = Ledger::default();
        let at = day("2026-03-01").and_hms_opt(9, 0, 0).unwrap();
        ledger.add_deposit(10.0, "op".into(), None, at);
        ledger.roll_over("2026-03-01");
        let at = day("2026-03-02").and_hms_opt(9, 0, 0).unwrap();
        ledger.add_withdrawal(1.0, "op".into(), at);

        let dates = chat_dates_with_records(Some(&ledger), day("2026-03-02"));
        assert_eq!(dates, vec!["2026-03-02", "2026-03-01"]);
        assert!(chat_dates_with_records(None, day("2026-03-02")).is_empty());
    }

    #[test]
    fn history_buttons_are_newest_first_with_a_back_row() {
        let mut ledger = Ledger::default();
        for d in ["2026-03-01", "2026-03-03"] {
            ledger.add_deposit(1.0, "op".into(), None, day(d).and_hms_opt(1, 0, 0).unwrap());
            ledger.roll_over(d);
        }
        let kb = history_keyboard(ChatId(-5), &ledger);
        assert_eq!(
            kb.callback_data(),
            vec!["history_-5_2026-03-03", "history_-5_2026-03-01", "cancel"]
        );
    }

    #[test]
    fn date_pickers_use_two_buttons_per_row() {
        let dates: Vec<String> = ["2026-03-03", "2026-03-02", "2026-03-01"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let kb = export_dates_keyboard(ChatId(-5), &dates);
        assert_eq!(kb.rows.len(), 2);
        assert_eq!(kb.rows[0][1].callback_data, "export_date_2026-03-02_-5");

        let menu = menu_dates_keyboard(&dates);
        assert_eq!(menu.rows.last().unwrap()[0].callback_data, "first_page");
        assert_eq!(income_dates_keyboard(&dates).rows[0][0].callback_data, "select_date_2026-03-03");
    }
}
