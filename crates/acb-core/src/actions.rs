//! Inline-button callback payloads.

use crate::domain::ChatId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackAction {
    ExportBill(ChatId),
    ViewHistory(ChatId),
    HistoryDate { chat: ChatId, date: String },
    ExportDate { date: String, chat: ChatId },
    ExportDateBack(ChatId),
    AllChatsToday,
    AllChatsByDate,
    /// `date_`, `select_date_` and `income_statement_` all open the same view.
    AllChatsOn(String),
    CurrentChatWeek,
    FirstPage,
    Cancel,
    Unknown(String),
}

fn chat_id(raw: &str) -> Option<ChatId> {
    raw.parse().ok().map(ChatId)
}

impl CallbackAction {
    pub fn parse(data: &str) -> Self {
        let unknown = || CallbackAction::Unknown(data.to_string());
        match data {
            "all_groups_today" => return CallbackAction::AllChatsToday,
            "all_groups_by_date" => return CallbackAction::AllChatsByDate,
            "current_group_7days" => return CallbackAction::CurrentChatWeek,
            "first_page" => return CallbackAction::FirstPage,
            "cancel" => return CallbackAction::Cancel,
            _ => {}
        }

        if let Some(rest) = data.strip_prefix("export_bill_") {
            return chat_id(rest).map(CallbackAction::ExportBill).unwrap_or_else(unknown);
        }
        if let Some(rest) = data.strip_prefix("view_history_") {
            return chat_id(rest).map(CallbackAction::ViewHistory).unwrap_or_else(unknown);
        }
        if let Some(rest) = data.strip_prefix("history_") {
            return rest
                .split_once('_')
                .and_then(|(chat, date)| {
                    Some(CallbackAction::HistoryDate {
                        chat: chat_id(chat)?,
                        date: date.to_string(),
                    })
                })
                .unwrap_or_else(unknown);
        }
        // Must be checked before `export_date_{date}_{chat}`.
        if let Some(rest) = data.strip_prefix("export_date_back_") {
            return chat_id(rest).map(CallbackAction::ExportDateBack).unwrap_or_else(unknown);
        }
        if let Some(rest) = data.strip_prefix("export_date_") {
            return rest
                .rsplit_once('_')
                .and_then(|(date, chat)| {
                    Some(CallbackAction::ExportDate {
                        date: date.to_string(),
                        chat: chat_id(chat)?,
                    })
                })
                .unwrap_or_else(unknown);
        }
        for prefix in ["select_date_", "income_statement_", "date_"] {
            if let Some(date) = data.strip_prefix(prefix) {
                if date.is_empty() {
                    return unknown();
                }
                return CallbackAction::AllChatsOn(date.to_string());
            }
        }
        unknown()
    }

    pub fn encode(&self) -> String {
        match self {
            CallbackAction::ExportBill(chat) => format!("export_bill_{}", chat.0),
            CallbackAction::ViewHistory(chat) => format!("view_history_{}", chat.0),
            CallbackAction::HistoryDate { chat, date } => format!("history_{}_{date}", chat.0),
            CallbackAction::ExportDate { date, chat } => format!("export_date_{date}_{}", chat.0),
            CallbackAction::ExportDateBack(chat) => format!("export_date_back_{}", chat.0),
            CallbackAction::AllChatsToday => "all_groups_today".to_string(),
            CallbackAction::AllChatsByDate => "all_groups_by_date".to_string(),
            CallbackAction::AllChatsOn(date) => format!("date_{date}"),
            CallbackAction::CurrentChatWeek => "current_group_7days".to_string(),
            CallbackAction::FirstPage => "first_page".to_string(),
            CallbackAction::Cancel => "cancel".to_string(),
            CallbackAction::Unknown(raw) => raw.clone(),
        }
    }

    /// Buttons that read across every chat's ledger.
    pub fn is_cross_chat(&self) -> bool {
        matches!(
            self,
            CallbackAction::AllChatsToday
                | CallbackAction::AllChatsByDate
                | CallbackAction::AllChatsOn(_)
                | CallbackAction::FirstPage
        )
    }
}

/// `select_date_{date}`, the form used by the cross-chat date picker.
pub fn select_date(date: &str) -> String {
    format!("select_date_{date}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_scoped_payloads_with_negative_ids() {
        assert_eq!(
            CallbackAction::parse("export_bill_-1001234"),
            CallbackAction::ExportBill(ChatId(-1001234))
        );
        assert_eq!(
            CallbackAction::parse("history_-42_2026-03-01"),
            CallbackAction::HistoryDate {
                chat: ChatId(-42),
                date: "2026-03-01".into()
            }
        );
        assert_eq!(
            CallbackAction::parse("export_date_2026-03-01_-42"),
            CallbackAction::ExportDate {
                date: "2026-03-01".into(),
                chat: ChatId(-42)
            }
        );
        assert_eq!(
            CallbackAction::parse("export_date_back_-42"),
            CallbackAction::ExportDateBack(ChatId(-42))
        );
    }

    #[test]
    fn cross_chat_payloads() {
        for data in ["date_2026-03-01", "select_date_2026-03-01", "income_statement_2026-03-01"] {
            assert_eq!(
                CallbackAction::parse(data),
                CallbackAction::AllChatsOn("2026-03-01".into())
            );
        }
        assert!(CallbackAction::parse("first_page").is_cross_chat());
        assert!(!CallbackAction::parse("cancel").is_cross_chat());
    }

    #[test]
    fn malformed_payloads_are_unknown() {
        assert_eq!(
            CallbackAction::parse("export_bill_abc"),
            CallbackAction::Unknown("export_bill_abc".into())
        );
        assert_eq!(
            CallbackAction::parse("something"),
            CallbackAction::Unknown("something".into())
        );
    }

    #[test]
    fn encode_matches_parse() {
        let action = CallbackAction::ExportDate {
            date: "2026-03-01".into(),
            chat: ChatId(-7),
        };
        assert_eq!(CallbackAction::parse(&action.encode()), action);
    }
}
