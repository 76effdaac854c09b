//! Inline-button presses.
//!
//! Every query is answered first (or answered with an error when the user may
//! not see cross-chat data); the visible result is an edit of the message the
//! button sits on.

use crate::{
    actions::CallbackAction,
    domain::{ChatId, ChatInfo},
    ledger::Ledger,
    messaging::types::{CallbackQuery, InlineKeyboard},
    report::{self, ChatDay},
    Result,
};

use super::{known_chat, views, AccountingBot};

const NO_BILL_PERMISSION: &str = "您没有权限查看此账单";
const NO_HISTORY_PERMISSION: &str = "您没有权限查看历史账单";

impl AccountingBot {
    pub(super) async fn dispatch_callback(&self, q: &CallbackQuery) -> Result<()> {
        let action = CallbackAction::parse(&q.data);
        tracing::debug!(chat_id = q.chat.id.0, data = %q.data, ?action, "callback");

        if action.is_cross_chat() && !self.may_view_all_chats(q).await {
            return self
                .messenger
                .answer_callback_query(&q.callback_id, Some(NO_BILL_PERMISSION))
                .await;
        }
        self.messenger
            .answer_callback_query(&q.callback_id, None)
            .await?;

        let context = match &action {
            CallbackAction::ViewHistory(_) => "查看历史账单时出错",
            CallbackAction::FirstPage
            | CallbackAction::Cancel
            | CallbackAction::AllChatsByDate
            | CallbackAction::ExportDateBack(_)
            | CallbackAction::Unknown(_) => "操作失败",
            _ => "导出账单时出错",
        };

        let res = match action {
            CallbackAction::ExportBill(chat) => self.export_bill(q, chat).await,
            CallbackAction::ViewHistory(chat) => self.view_history(q, chat).await,
            CallbackAction::HistoryDate { chat, date } => self.export_history(q, chat, &date).await,
            CallbackAction::ExportDate { date, chat } => self.export_date(q, chat, &date).await,
            CallbackAction::ExportDateBack(chat) => {
                let chat = self.callback_chat(q, chat).await;
                self.show_export_dates(&chat, q.message).await
            }
            CallbackAction::AllChatsToday => {
                let today = self.today_str();
                self.export_all_chats(q, &today).await
            }
            CallbackAction::AllChatsByDate => self.pick_all_chats_date(q).await,
            CallbackAction::AllChatsOn(date) => self.export_all_chats(q, &date).await,
            CallbackAction::CurrentChatWeek => self.export_week(q).await,
            CallbackAction::FirstPage => {
                self.show(q, views::MENU_PROMPT, Some(views::bills_menu()))
                    .await
            }
            CallbackAction::Cancel => self.show(q, "操作已取消", None).await,
            CallbackAction::Unknown(data) => {
                tracing::warn!(data = %data, "unknown callback data");
                self.show(q, "未知的操作", None).await
            }
        };

        if let Err(e) = res {
            tracing::error!(chat_id = q.chat.id.0, data = %q.data, "{context}: {e}");
            self.show(q, &format!("{context}: {e}"), None).await?;
        }
        Ok(())
    }

    /// Edit the message carrying the button, or send a new one if there is none.
    async fn show(
        &self,
        q: &CallbackQuery,
        text: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<()> {
        self.present(q.chat.id, q.message, text, keyboard).await
    }

    async fn may_view_all_chats(&self, q: &CallbackQuery) -> bool {
        let state = self.store.lock().await;
        let policy = self.policy(&state);
        policy.is_global_admin(q.from.id)
            || policy.is_operator(q.chat.id, q.from.username.as_deref())
    }

    /// The chat a button refers to. Usually the one it was pressed in.
    async fn callback_chat(&self, q: &CallbackQuery, id: ChatId) -> ChatInfo {
        if q.chat.id == id {
            return q.chat.clone();
        }
        let state = self.store.lock().await;
        known_chat(&state, id)
    }

    async fn export_bill(&self, q: &CallbackQuery, id: ChatId) -> Result<()> {
        let chat = self.callback_chat(q, id).await;
        if !self.is_manager(&chat, &q.from).await {
            return self.show(q, NO_BILL_PERMISSION, None).await;
        }
        let title = chat.display_title();
        self.show(q, &format!("正在生成 {title} 账单..."), None)
            .await?;

        let now = self.now();
        let content = {
            let state = self.store.lock().await;
            let empty = Ledger::default();
            let ledger = state.ledger(id).unwrap_or(&empty);
            report::detailed_bill(&title, &ledger.book(), now)
        };
        let file = self.exporter.detailed_bill(&title, &content, now).await?;
        self.messenger.send_document(q.chat.id, file).await?;
        self.show(q, "账单已导出为文件", Some(views::history_exported(id)))
            .await
    }

    async fn view_history(&self, q: &CallbackQuery, id: ChatId) -> Result<()> {
        let chat = self.callback_chat(q, id).await;
        if !self.is_manager(&chat, &q.from).await {
            return self.show(q, NO_HISTORY_PERMISSION, None).await;
        }
        let title = chat.display_title();
        let keyboard = {
            let state = self.store.lock().await;
            state
                .ledger(id)
                .filter(|l| !l.history.is_empty())
                .map(|l| views::history_keyboard(id, l))
        };
        match keyboard {
            Some(keyboard) => {
                self.show(
                    q,
                    &format!("请选择要查看的 {title} 历史账单日期:"),
                    Some(keyboard),
                )
                .await
            }
            None => self.show(q, &format!("{title} 没有历史账单记录"), None).await,
        }
    }

    async fn export_history(&self, q: &CallbackQuery, id: ChatId, date: &str) -> Result<()> {
        let chat = self.callback_chat(q, id).await;
        if !self.is_manager(&chat, &q.from).await {
            return self.show(q, NO_HISTORY_PERMISSION, None).await;
        }
        let title = chat.display_title();
        let now = self.now();
        let content = {
            let state = self.store.lock().await;
            state
                .ledger(id)
                .and_then(|l| l.history.get(date))
                .map(|s| report::detailed_bill(&format!("{title} ({date})"), &s.book(), now))
        };
        let Some(content) = content else {
            return self
                .show(q, &format!("{title} 没有 {date} 的历史账单记录"), None)
                .await;
        };

        let file = self
            .exporter
            .history_bill(&title, date, &content, now)
            .await?;
        self.messenger.send_document(q.chat.id, file).await?;
        self.show(
            q,
            &format!("{date} 历史账单已导出为文件"),
            Some(views::back_to_history(id)),
        )
        .await
    }

    async fn export_date(&self, q: &CallbackQuery, id: ChatId, date: &str) -> Result<()> {
        let chat = self.callback_chat(q, id).await;
        if !self.is_chat_open(&chat, &q.from).await {
            return self.show(q, NO_BILL_PERMISSION, None).await;
        }
        let title = chat.display_title();
        let back = views::back_to_export_dates(id);
        self.show(
            q,
            &format!("正在导出 {title} {date} 的账单数据..."),
            Some(back.clone()),
        )
        .await?;

        let now = self.now();
        let day = {
            let state = self.store.lock().await;
            match state.ledger(id) {
                Some(ledger) => ledger.day(date),
                None => Ledger::default().day(date),
            }
        };
        let content = report::date_export(&title, &day, now);
        let file = self.exporter.date_bill(&title, date, &content, now).await?;
        self.messenger.send_document(q.chat.id, file).await?;
        self.show(
            q,
            &format!("已成功导出 {title} {date} 的账单数据"),
            Some(back),
        )
        .await
    }

    async fn pick_all_chats_date(&self, q: &CallbackQuery) -> Result<()> {
        let dates = {
            let state = self.store.lock().await;
            views::any_chat_dates_with_records(&state, self.today())
        };
        if dates.is_empty() {
            return self.show(q, views::NO_DATES, None).await;
        }
        self.show(
            q,
            views::PICK_DATE_PROMPT,
            Some(views::menu_dates_keyboard(&dates)),
        )
        .await
    }

    /// Statistics of every group with records on `date`, as a file.
    async fn export_all_chats(&self, q: &CallbackQuery, date: &str) -> Result<()> {
        let back = views::back_to_menu();
        let chats: Vec<ChatDay> = {
            let state = self.store.lock().await;
            state
                .chat_accounting
                .iter()
                .map(|(id, ledger)| (ChatId(*id), ledger))
                .filter(|(id, ledger)| id.is_group() && ledger.has_records_on(date))
                .map(|(id, ledger)| ChatDay {
                    title: known_chat(&state, id).display_title(),
                    day: ledger.day(date),
                })
                .collect()
        };
        if chats.is_empty() {
            return self
                .show(
                    q,
                    &format!("在 {date} 没有找到任何群组的记账记录"),
                    Some(back),
                )
                .await;
        }

        self.show(
            q,
            &format!("正在导出 {date} 所有群组的统计数据..."),
            Some(back.clone()),
        )
        .await?;
        let now = self.now();
        let content = report::all_chats_statistics(date, &chats, now);
        let file = self.exporter.all_chats(date, &content, now).await?;
        self.messenger.send_document(q.chat.id, file).await?;
        tracing::info!(date, chats = chats.len(), "all-chats statistics exported");
        self.show(
            q,
            &format!("已成功导出 {date} 所有群组的统计数据"),
            Some(back),
        )
        .await
    }

    async fn export_week(&self, q: &CallbackQuery) -> Result<()> {
        let chat = &q.chat;
        if !self.is_chat_open(chat, &q.from).await {
            return self.show(q, NO_BILL_PERMISSION, None).await;
        }
        let title = chat.display_title();
        let back = views::back_to_menu();
        self.show(
            q,
            &format!("正在导出 {title} 最近7天的账单数据..."),
            Some(back.clone()),
        )
        .await?;

        let now = self.now();
        let content = {
            let state = self.store.lock().await;
            let empty = Ledger::default();
            let ledger = state.ledger(chat.id).unwrap_or(&empty);
            let days: Vec<_> = views::recent_dates(now.date())
                .iter()
                .map(|d| ledger.day(d))
                .collect();
            report::seven_day_export(&title, &days, ledger.fee_rate, ledger.fixed_rate, now)
        };
        let file = self.exporter.seven_days(&title, &content, now).await?;
        self.messenger.send_document(chat.id, file).await?;
        self.show(
            q,
            &format!("已成功导出 {title} 最近7天的账单数据"),
            Some(back),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use crate::domain::ChatId;

    async fn with_group_records(h: &Harness) {
        h.authorize(GROUP).await;
        h.text(GROUP, ADMIN, "设置汇率7").await;
        h.text(GROUP, ADMIN, "+700").await;
        h.messenger.clear();
    }

    #[tokio::test]
    async fn export_bill_sends_the_detailed_file() {
        let h = Harness::new();
        with_group_records(&h).await;

        h.callback(GROUP, ADMIN, "export_bill_-100").await;
        let docs = h.messenger.documents();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].1.file_name, "Test Group_账单.txt");
        assert_eq!(docs[0].1.caption, "Test Group 账单详情");
        let content = std::fs::read_to_string(&docs[0].1.path).unwrap();
        assert!(content.starts_with("====== Test Group 账单明细 ======"));

        let edits = h.messenger.edits();
        assert_eq!(edits[0].1, "正在生成 Test Group 账单...");
        assert_eq!(edits[1].1, "账单已导出为文件");
        assert_eq!(edits[1].2.as_ref().unwrap().callback_data(), vec!["view_history_-100"]);
        assert_eq!(h.messenger.answers(), vec![None]);
    }

    #[tokio::test]
    async fn bill_buttons_check_permissions() {
        let h = Harness::new();
        with_group_records(&h).await;

        h.callback(GROUP, STRANGER, "export_bill_-100").await;
        h.callback(GROUP, STRANGER, "view_history_-100").await;
        let edits: Vec<String> = h.messenger.edits().into_iter().map(|e| e.1).collect();
        assert_eq!(edits, vec!["您没有权限查看此账单", "您没有权限查看历史账单"]);
        assert!(h.messenger.documents().is_empty());
    }

    #[tokio::test]
    async fn history_flow() {
        let h = Harness::new();
        with_group_records(&h).await;

        h.callback(GROUP, ADMIN, "view_history_-100").await;
        assert_eq!(h.messenger.edits()[0].1, "Test Group 没有历史账单记录");

        h.store
            .update(|s| {
                s.ledger_mut(ChatId(GROUP)).roll_over("2026-03-01");
            })
            .await
            .unwrap();
        h.callback(GROUP, ADMIN, "view_history_-100").await;
        let (_, text, kb) = h.messenger.edits().pop().unwrap();
        assert_eq!(text, "请选择要查看的 Test Group 历史账单日期:");
        assert_eq!(
            kb.unwrap().callback_data(),
            vec!["history_-100_2026-03-01", "cancel"]
        );

        h.callback(GROUP, ADMIN, "history_-100_2026-02-01").await;
        assert_eq!(
            h.messenger.edits().pop().unwrap().1,
            "Test Group 没有 2026-02-01 的历史账单记录"
        );

        h.callback(GROUP, ADMIN, "history_-100_2026-03-01").await;
        let docs = h.messenger.documents();
        assert_eq!(docs[0].1.file_name, "Test Group_2026-03-01_历史账单.txt");
        let content = std::fs::read_to_string(&docs[0].1.path).unwrap();
        assert!(content.starts_with("====== Test Group (2026-03-01) 账单明细 ======"));
        assert_eq!(
            h.messenger.edits().pop().unwrap().1,
            "2026-03-01 历史账单已导出为文件"
        );
    }

    #[tokio::test]
    async fn export_date_and_back() {
        let h = Harness::new();
        with_group_records(&h).await;
        let today = h.today();

        h.callback(GROUP, STRANGER, &format!("export_date_{today}_-100")).await;
        let docs = h.messenger.documents();
        assert_eq!(docs[0].1.file_name, format!("Test Group_{today}_账单.txt"));
        let edits = h.messenger.edits();
        assert_eq!(edits[0].1, format!("正在导出 Test Group {today} 的账单数据..."));
        assert_eq!(edits[1].1, format!("已成功导出 Test Group {today} 的账单数据"));
        assert_eq!(
            edits[1].2.as_ref().unwrap().callback_data(),
            vec!["export_date_back_-100"]
        );

        h.callback(GROUP, STRANGER, "export_date_back_-100").await;
        let (_, text, kb) = h.messenger.edits().pop().unwrap();
        assert_eq!(text, "请选择要导出的日期:");
        assert_eq!(kb.unwrap().callback_data(), vec![format!("export_date_{today}_-100")]);
    }

    #[tokio::test]
    async fn cross_chat_views_need_admin_or_operator() {
        let h = Harness::new();
        with_group_records(&h).await;

        h.callback(GROUP, STRANGER, "all_groups_today").await;
        assert_eq!(h.messenger.answers(), vec![Some("您没有权限查看此账单".to_string())]);
        assert!(h.messenger.edits().is_empty());

        h.text(GROUP, ADMIN, "设置操作人 @op").await;
        h.callback(GROUP, OPERATOR, "first_page").await;
        let (_, text, _) = h.messenger.edits().pop().unwrap();
        assert_eq!(text, "请选择要查看的账单类型:");
    }

    #[tokio::test]
    async fn all_chats_statistics_cover_groups_only() {
        let h = Harness::new();
        with_group_records(&h).await;
        h.command(PRIVATE, ADMIN, "deposit", &["5"]).await;
        let today = h.today();

        h.callback(PRIVATE, ADMIN, "all_groups_today").await;
        let docs = h.messenger.documents();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].1.file_name, format!("{today}_所有群组统计.txt"));
        let content = std::fs::read_to_string(&docs[0].1.path).unwrap();
        assert!(content.contains("[Test Group]"));
        assert!(content.contains("• 群组数量: 1"));

        h.callback(PRIVATE, ADMIN, "select_date_2020-01-01").await;
        assert_eq!(
            h.messenger.edits().pop().unwrap().1,
            "在 2020-01-01 没有找到任何群组的记账记录"
        );
    }

    #[tokio::test]
    async fn date_picker_lists_days_with_records() {
        let h = Harness::new();
        h.callback(PRIVATE, ADMIN, "all_groups_by_date").await;
        assert_eq!(h.messenger.edits()[0].1, "没有找到任何日期的记账记录");

        with_group_records(&h).await;
        h.callback(PRIVATE, ADMIN, "all_groups_by_date").await;
        let (_, text, kb) = h.messenger.edits().pop().unwrap();
        assert_eq!(text, "请选择要查看的日期:");
        assert_eq!(
            kb.unwrap().callback_data(),
            vec![format!("date_{}", h.today()), "first_page".to_string()]
        );
    }

    #[tokio::test]
    async fn seven_day_export_of_the_current_chat() {
        let h = Harness::new();
        with_group_records(&h).await;

        h.callback(GROUP, ADMIN, "current_group_7days").await;
        let docs = h.messenger.documents();
        assert_eq!(docs[0].1.file_name, "Test Group_7天账单.txt");
        assert_eq!(docs[0].1.caption, "Test Group 最近7天财务账单导出文件");
        let content = std::fs::read_to_string(&docs[0].1.path).unwrap();
        assert!(content.contains("总入款：1笔，共计 700.00"));
        assert_eq!(
            h.messenger.edits().pop().unwrap().1,
            "已成功导出 Test Group 最近7天的账单数据"
        );
    }

    #[tokio::test]
    async fn cancel_and_unknown() {
        let h = Harness::new();
        h.callback(PRIVATE, ADMIN, "cancel").await;
        h.callback(PRIVATE, ADMIN, "bogus").await;
        let edits: Vec<String> = h.messenger.edits().into_iter().map(|e| e.1).collect();
        assert_eq!(edits, vec!["操作已取消", "未知的操作"]);
        assert_eq!(h.messenger.answers().len(), 2);
    }
}
