//! Plain-text triggers: `+100`, `下发50`, `财务`, operator management and friends.

use crate::{
    calc,
    command::{
        parse_trigger, strip_bot_mention, Entry, EntryKind, FinanceView, Mention,
        OperatorCommand, PayoutKind, Trigger,
    },
    domain::ChatInfo,
    formatting::{mention_list, plain_number},
    ledger::{Ledger, DATE_FORMAT},
    messaging::types::IncomingText,
    report, Result,
};

use super::AccountingBot;

const NOT_AUTHORIZED_GROUP: &str = "❌ 此群组未授权，请联系管理员进行授权";
const ADMIN_ONLY: &str = "❌ 只有全局管理员才能执行此命令";

impl AccountingBot {
    pub(super) async fn dispatch_text(&self, msg: &IncomingText) -> Result<()> {
        let chat = &msg.chat;
        if msg.text.trim() == "授权群" {
            return self.authorize_chat(msg).await;
        }
        if !self.is_chat_open(chat, &msg.from).await {
            tracing::debug!(chat_id = chat.id.0, "ignoring message in unauthorized group");
            return Ok(());
        }

        let text = if chat.kind.is_group() {
            match strip_bot_mention(&msg.text, self.bot_username.as_deref()) {
                Mention::None(text) | Mention::Ours(text) => text,
                Mention::Other => return Ok(()),
            }
        } else {
            msg.text.clone()
        };

        let Some(trigger) = parse_trigger(&text) else {
            return self.fallback(msg).await;
        };
        tracing::debug!(chat_id = chat.id.0, ?trigger, "text trigger");

        match trigger {
            Trigger::AuthorizeChat => self.authorize_chat(msg).await,
            Trigger::Operators(cmd) => self.manage_operators(msg, cmd).await,
            Trigger::Finance(view) => self.finance(msg, view).await,
            Trigger::Deposit(entry) => {
                let res = self.record_entry(msg, EntryKind::Deposit, entry).await;
                self.settle(chat.id, "❌ 处理入款时出错", res).await
            }
            Trigger::Deduct(entry) => {
                let res = self.record_entry(msg, EntryKind::Deduct, entry).await;
                self.settle(chat.id, "❌ 处理减款时出错", res).await
            }
            Trigger::Malformed(kind) => {
                if !self.may_record(msg).await? {
                    return Ok(());
                }
                let reply = match kind {
                    EntryKind::Deposit => "❌ 入款金额必须是数字",
                    EntryKind::Deduct => "❌ 减款金额必须是数字",
                };
                self.reply(chat.id, reply).await
            }
            Trigger::ExportRecent => self.show_export_dates(chat, None).await,
            Trigger::Calculate(expr) => self.reply(chat.id, &calc::reply(&expr)).await,
            Trigger::Payout { kind, usdt } => {
                let context = match kind {
                    PayoutKind::Return => "处理回款出错",
                    PayoutKind::Dispatch => "处理下发出错",
                };
                let res = self.payout(msg, kind, usdt).await;
                self.settle(chat.id, context, res).await
            }
            Trigger::SetFeeRate(rate) => {
                let res = self.set_fee_rate(msg, rate).await;
                self.settle(chat.id, "❌ 设置费率出错", res).await
            }
            Trigger::SetFixedRate(rate) => {
                let res = self.set_fixed_rate(msg, rate).await;
                self.settle(chat.id, "❌ 设置汇率出错", res).await
            }
            Trigger::ExportYesterday => {
                let res = self.export_yesterday(msg).await;
                self.settle(chat.id, "❌ 导出昨日账单时出错", res).await
            }
        }
    }

    async fn fallback(&self, msg: &IncomingText) -> Result<()> {
        if msg.chat.kind.is_group() {
            return Ok(());
        }
        let (manager, admin) = {
            let state = self.store.lock().await;
            let policy = self.policy(&state);
            (
                policy.is_manager(&msg.chat, &msg.from),
                policy.is_global_admin(msg.from.id),
            )
        };
        self.reply(msg.chat.id, &report::full_help(manager, admin)).await
    }

    async fn authorize_chat(&self, msg: &IncomingText) -> Result<()> {
        let chat = &msg.chat;
        if !self.is_global_admin(msg.from.id).await {
            return self.reply(chat.id, "❌ 只有管理员和操作员才能授权群组").await;
        }
        if !chat.kind.is_group() {
            return self.reply(chat.id, "❌ 此命令只能在群组中使用").await;
        }

        let id = chat.id;
        let initial = self.cfg.initial_operators.clone();
        self.store
            .update(move |state| {
                state.authorized_groups.insert(id.0);
                if state.operators(id).is_none() {
                    state.reset_operators(id, &initial);
                }
            })
            .await?;
        tracing::info!(chat_id = id.0, title = %chat.display_title(), "group authorized");
        self.reply(id, "✅ 此群组已成功授权，可以开始使用机器人功能").await
    }

    async fn manage_operators(&self, msg: &IncomingText, cmd: OperatorCommand) -> Result<()> {
        let chat = msg.chat.id;
        let is_admin = self.is_global_admin(msg.from.id).await;
        if !is_admin {
            return self.reply(chat, ADMIN_ONLY).await;
        }

        let reply = match cmd {
            OperatorCommand::Reset => {
                let initial = self.cfg.initial_operators.clone();
                let listed = self
                    .store
                    .update(move |state| mention_list(state.reset_operators(chat, &initial)))
                    .await?;
                format!("已重置此群授权人: {listed}")
            }
            OperatorCommand::Add(name) => {
                let name = match name {
                    Some(name) => name,
                    None => match replied_username(msg) {
                        Replied::Username(name) => name,
                        Replied::NoUsername => {
                            return self
                                .reply(chat, "无法设置操作人：被回复的用户没有用户名")
                                .await
                        }
                        Replied::NoReply => return Ok(()),
                    },
                };
                let added = name.clone();
                self.store
                    .update(move |state| state.operators_mut(chat).insert(added))
                    .await?;
                tracing::info!(chat_id = chat.0, operator = %name, "operator added");
                format!("已添加此群操作人: @{name}")
            }
            OperatorCommand::Remove(name) => {
                let name = match name {
                    Some(name) => name,
                    None => match replied_username(msg) {
                        Replied::Username(name) => name,
                        Replied::NoUsername => {
                            return self
                                .reply(chat, "无法删除操作人：被回复的用户没有用户名")
                                .await
                        }
                        Replied::NoReply => return Ok(()),
                    },
                };
                let removed_name = name.clone();
                let removed = self
                    .store
                    .update(move |state| state.operators_mut(chat).remove(&removed_name))
                    .await?;
                if removed {
                    tracing::info!(chat_id = chat.0, operator = %name, "operator removed");
                    format!("已删除此群操作人: @{name}")
                } else {
                    format!("此群操作人 @{name} 不存在")
                }
            }
            OperatorCommand::Clear => {
                self.store
                    .update(move |state| state.operators_mut(chat).clear())
                    .await?;
                "已清空此群所有操作人".to_string()
            }
            OperatorCommand::Show => {
                let state = self.store.lock().await;
                let listed = state
                    .operators(chat)
                    .map(mention_list)
                    .unwrap_or_else(|| mention_list(std::iter::empty::<&String>()));
                format!("此群当前操作人: {listed}")
            }
            OperatorCommand::Unrecognized => return Ok(()),
        };
        self.reply(chat, &reply).await
    }

    async fn finance(&self, msg: &IncomingText, view: FinanceView) -> Result<()> {
        let chat = &msg.chat;
        if !self.is_manager(chat, &msg.from).await {
            return self
                .reply(chat.id, "❌ 只有管理员和操作员才能使用财务账单功能")
                .await;
        }
        match view {
            FinanceView::Bill => self.show_bill(chat).await,
            FinanceView::Stats => self.send_financial_summary(chat).await,
            FinanceView::Audit => self.show_income_dates(chat.id).await,
        }
    }

    pub(super) async fn send_financial_summary(&self, chat: &ChatInfo) -> Result<()> {
        let today = self.today_str();
        let text = {
            let state = self.store.lock().await;
            let empty = Ledger::default();
            let ledger = state.ledger(chat.id).unwrap_or(&empty);
            let day = ledger.day(&today);
            report::financial_summary(&chat.display_title(), &today, &ledger.book(), &day.book())
        };
        self.reply(chat.id, &text).await
    }

    /// Managers only; an unauthorized group gets told so.
    async fn may_record(&self, msg: &IncomingText) -> Result<bool> {
        let chat = &msg.chat;
        let (manager, authorized) = {
            let state = self.store.lock().await;
            (
                self.policy(&state).is_manager(chat, &msg.from),
                state.is_chat_authorized(chat.id),
            )
        };
        if !manager {
            return Ok(false);
        }
        if chat.kind.is_group() && !authorized {
            self.reply(chat.id, NOT_AUTHORIZED_GROUP).await?;
            return Ok(false);
        }
        Ok(true)
    }

    async fn record_entry(&self, msg: &IncomingText, kind: EntryKind, entry: Entry) -> Result<()> {
        if !self.may_record(msg).await? {
            return Ok(());
        }
        let user = msg.from.display_name();
        let responder = msg.responder();
        let now = self.now();
        let chat_id = msg.chat.id.0;

        self.update_ledger(&msg.chat, move |ledger| {
            if let Some(rate) = entry.rate {
                ledger.set_fixed_rate(rate);
            }
            let record = match kind {
                EntryKind::Deposit => ledger.add_deposit(entry.amount, user, responder, now),
                EntryKind::Deduct => ledger.add_negative_deposit(entry.amount, user, now),
            };
            tracing::info!(
                chat_id,
                amount = record.amount,
                usd = record.usd_equivalent,
                user = %record.user,
                "deposit recorded"
            );
        })
        .await?;
        self.show_bill(&msg.chat).await
    }

    async fn payout(&self, msg: &IncomingText, kind: PayoutKind, usdt: f64) -> Result<()> {
        if !self.is_manager(&msg.chat, &msg.from).await {
            return Ok(());
        }
        let user = msg.from.display_name();
        let now = self.now();
        let chat_id = msg.chat.id.0;
        self.update_ledger(&msg.chat, move |ledger| {
            let record = ledger.add_withdrawal(usdt, user, now);
            tracing::info!(
                chat_id,
                usdt = record.usd_equivalent,
                local = record.amount,
                "withdrawal recorded"
            );
        })
        .await?;
        self.reply(msg.chat.id, kind.ack()).await?;
        self.show_bill(&msg.chat).await
    }

    async fn set_fee_rate(&self, msg: &IncomingText, rate: f64) -> Result<()> {
        if !self.is_manager(&msg.chat, &msg.from).await {
            return Ok(());
        }
        self.update_ledger(&msg.chat, move |ledger| ledger.set_fee_rate(rate))
            .await?;
        self.reply(msg.chat.id, &format!("✅ 已设置费率: {}%", plain_number(rate)))
            .await?;
        self.show_bill(&msg.chat).await
    }

    async fn set_fixed_rate(&self, msg: &IncomingText, rate: f64) -> Result<()> {
        if !self.is_manager(&msg.chat, &msg.from).await {
            return Ok(());
        }
        self.update_ledger(&msg.chat, move |ledger| ledger.set_fixed_rate(rate))
            .await?;
        self.reply(msg.chat.id, &format!("✅ 已设置汇率: {}", plain_number(rate)))
            .await?;
        self.show_bill(&msg.chat).await
    }

    async fn export_yesterday(&self, msg: &IncomingText) -> Result<()> {
        if !self.is_manager(&msg.chat, &msg.from).await {
            return Ok(());
        }
        let chat = &msg.chat;
        let yesterday = (self.today() - chrono::Duration::days(1))
            .format(DATE_FORMAT)
            .to_string();
        let status = self
            .messenger
            .send_text(chat.id, &format!("正在导出 {yesterday} 的账单数据..."))
            .await?;

        let day = {
            let state = self.store.lock().await;
            state
                .ledger(chat.id)
                .map(|l| l.day(&yesterday))
                .filter(|d| !d.is_empty())
        };
        let Some(day) = day else {
            return self
                .messenger
                .edit_text(status, &format!("在 {yesterday} 没有找到任何记账记录"), None)
                .await;
        };

        let title = chat.display_title();
        let now = self.now();
        let content = report::date_export(&title, &day, now);
        let file = self
            .exporter
            .date_bill(&title, &yesterday, &content, now)
            .await?;
        self.messenger.send_document(chat.id, file).await?;
        self.messenger
            .edit_text(status, &report::date_summary(&title, &day), None)
            .await
    }
}

enum Replied {
    Username(String),
    NoUsername,
    NoReply,
}

fn replied_username(msg: &IncomingText) -> Replied {
    match (&msg.reply_to, msg.replied_username()) {
        (_, Some(name)) => Replied::Username(name),
        (Some(_), None) => Replied::NoUsername,
        (None, None) => Replied::NoReply,
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use crate::domain::ChatId;
    use crate::messaging::types::RepliedMessage;

    #[tokio::test]
    async fn deposit_then_payout_updates_the_bill() {
        let h = Harness::new();
        h.authorize(GROUP).await;

        h.text(GROUP, ADMIN, "+700/7").await;
        h.text(GROUP, ADMIN, "下发50").await;

        let state = h.store.lock().await;
        let ledger = state.ledger(ChatId(GROUP)).unwrap();
        assert_eq!(ledger.fixed_rate, 7.0);
        assert_eq!(ledger.deposits.len(), 1);
        assert!((ledger.deposits[0].usd_equivalent - 100.0).abs() < 1e-9);
        assert_eq!(ledger.withdrawals[0].amount, 350.0);
        assert_eq!(ledger.title.as_deref(), Some("Test Group"));
        drop(state);

        assert!(h.messenger.texts().contains(&"已下发".to_string()));
        let (_, bill, kb) = h.messenger.last_keyboard().unwrap();
        assert!(bill.contains("总入款：700.00"));
        assert!(bill.contains("未下发：350.00｜50.00U"));
        assert_eq!(kb.callback_data(), vec!["export_bill_-100", "view_history_-100"]);
    }

    #[tokio::test]
    async fn deduct_stores_a_negative_deposit_without_responder() {
        let h = Harness::new();
        h.authorize(GROUP).await;
        h.text(GROUP, ADMIN, "+10/2").await;

        let mut msg = h.message(GROUP, ADMIN, "-4");
        msg.reply_to = Some(RepliedMessage {
            forward_sender_name: Some("someone".into()),
            ..Default::default()
        });
        h.bot.handle_text(msg).await.unwrap();

        let state = h.store.lock().await;
        let d = &state.ledger(ChatId(GROUP)).unwrap().deposits[1];
        assert_eq!(d.amount, -4.0);
        assert_eq!(d.usd_equivalent, -2.0);
        assert!(d.responder.is_none());
    }

    #[tokio::test]
    async fn malformed_amounts_get_an_error() {
        let h = Harness::new();
        h.authorize(GROUP).await;
        h.text(GROUP, ADMIN, "+abc").await;
        h.text(GROUP, ADMIN, "-1/x").await;
        assert_eq!(
            h.messenger.texts()[1..].to_vec(),
            vec!["❌ 入款金额必须是数字", "❌ 减款金额必须是数字"]
        );
    }

    #[tokio::test]
    async fn admin_in_unauthorized_group_is_told_to_authorize() {
        let h = Harness::new();
        h.text(GROUP, ADMIN, "+100").await;
        assert_eq!(h.messenger.texts(), vec!["❌ 此群组未授权，请联系管理员进行授权"]);
        assert!(h.store.lock().await.ledger(ChatId(GROUP)).is_none());
    }

    #[tokio::test]
    async fn unauthorized_group_ignores_everyone_else() {
        let h = Harness::new();
        h.text(GROUP, STRANGER, "1+1").await;
        h.text(GROUP, STRANGER, "授权群").await;
        assert_eq!(h.messenger.texts(), vec!["❌ 只有管理员和操作员才能授权群组"]);
    }

    #[tokio::test]
    async fn authorize_seeds_initial_operators_once() {
        let h = Harness::new();
        h.text(PRIVATE, ADMIN, "授权群").await;
        h.authorize(GROUP).await;
        {
            let state = h.store.lock().await;
            assert!(state.is_chat_authorized(ChatId(GROUP)));
            assert!(state.operators(ChatId(GROUP)).unwrap().contains("root"));
        }
        let texts = h.messenger.texts();
        assert_eq!(texts[0], "❌ 此命令只能在群组中使用");
        assert_eq!(texts[1], "✅ 此群组已成功授权，可以开始使用机器人功能");
    }

    #[tokio::test]
    async fn operators_can_record_once_added() {
        let h = Harness::new();
        h.authorize(GROUP).await;

        h.text(GROUP, OPERATOR, "+5").await;
        assert!(h.store.lock().await.ledger(ChatId(GROUP)).is_none());

        h.text(GROUP, ADMIN, "设置操作人 @op").await;
        h.text(GROUP, OPERATOR, "+5").await;
        assert_eq!(
            h.store.lock().await.ledger(ChatId(GROUP)).unwrap().deposits.len(),
            1
        );

        h.text(GROUP, OPERATOR, "设置操作人 @other").await;
        h.text(GROUP, ADMIN, "删除操作人 @nobody").await;
        h.text(GROUP, ADMIN, "显示操作人").await;
        let texts = h.messenger.texts();
        assert!(texts.contains(&"已添加此群操作人: @op".to_string()));
        assert!(texts.contains(&"❌ 只有全局管理员才能执行此命令".to_string()));
        assert!(texts.contains(&"此群操作人 @nobody 不存在".to_string()));
        assert_eq!(texts.last().unwrap(), "此群当前操作人: @op, @root");
    }

    #[tokio::test]
    async fn operator_from_reply_needs_a_username() {
        let h = Harness::new();
        h.authorize(GROUP).await;

        let mut msg = h.message(GROUP, ADMIN, "设置操作人");
        msg.reply_to = Some(RepliedMessage {
            from: Some(h.user(STRANGER, None)),
            ..Default::default()
        });
        h.bot.handle_text(msg).await.unwrap();

        let mut msg = h.message(GROUP, ADMIN, "删除操作人");
        msg.reply_to = Some(RepliedMessage {
            from: Some(h.user(OPERATOR, Some("op"))),
            ..Default::default()
        });
        h.bot.handle_text(msg).await.unwrap();

        let texts = h.messenger.texts();
        assert!(texts.contains(&"无法设置操作人：被回复的用户没有用户名".to_string()));
        assert!(texts.contains(&"此群操作人 @op 不存在".to_string()));
    }

    #[tokio::test]
    async fn reset_and_clear_operators() {
        let h = Harness::new();
        h.authorize(GROUP).await;
        h.text(GROUP, ADMIN, "设置操作人 @op").await;
        h.text(GROUP, ADMIN, "重置授权人").await;
        h.text(GROUP, ADMIN, "清空操作人").await;
        h.text(GROUP, ADMIN, "显示操作人").await;

        let texts = h.messenger.texts();
        assert!(texts.contains(&"已重置此群授权人: @root".to_string()));
        assert!(texts.contains(&"已清空此群所有操作人".to_string()));
        assert_eq!(texts.last().unwrap(), "此群当前操作人: 无");
    }

    #[tokio::test]
    async fn duplicate_message_ids_are_handled_once() {
        let h = Harness::new();
        let msg = h.message(PRIVATE, ADMIN, "1+2");
        h.bot.handle_text(msg.clone()).await.unwrap();
        h.bot.handle_text(msg).await.unwrap();
        assert_eq!(h.messenger.texts(), vec!["计算结果: 1+2 = 3"]);
    }

    #[tokio::test]
    async fn mentions_of_other_bots_are_ignored() {
        let h = Harness::new();
        h.authorize(GROUP).await;
        h.text(GROUP, ADMIN, "计算@otherbot 2*3").await;
        h.text(GROUP, ADMIN, "计算@acb_test_bot 2*3").await;
        assert_eq!(h.messenger.texts().last().unwrap(), "计算结果: 2*3 = 6");
        assert_eq!(h.messenger.texts().len(), 2);
    }

    #[tokio::test]
    async fn rates_are_echoed_in_float_style() {
        let h = Harness::new();
        h.authorize(GROUP).await;
        h.text(GROUP, ADMIN, "设置费率5%").await;
        h.text(GROUP, ADMIN, "设置汇率7.25").await;
        let texts = h.messenger.texts();
        assert!(texts.contains(&"✅ 已设置费率: 5.0%".to_string()));
        assert!(texts.contains(&"✅ 已设置汇率: 7.25".to_string()));
        let state = h.store.lock().await;
        assert_eq!(state.ledger(ChatId(GROUP)).unwrap().fee_rate, 5.0);
    }

    #[tokio::test]
    async fn finance_words_are_for_managers() {
        let h = Harness::new();
        h.authorize(GROUP).await;
        h.text(GROUP, STRANGER, "财务").await;
        h.text(GROUP, ADMIN, "财务统计").await;
        let texts = h.messenger.texts();
        assert!(texts.contains(&"❌ 只有管理员和操作员才能使用财务账单功能".to_string()));
        assert!(texts.last().unwrap().contains("财务账单"));
    }

    #[tokio::test]
    async fn export_recent_without_records() {
        let h = Harness::new();
        h.authorize(GROUP).await;
        h.text(GROUP, STRANGER, "导出全部账单").await;
        assert_eq!(h.messenger.texts().last().unwrap(), "Test Group 最近7天内没有任何记账记录");

        h.text(GROUP, ADMIN, "+1").await;
        h.text(GROUP, STRANGER, "导出全部账单").await;
        let (_, prompt, kb) = h.messenger.last_keyboard().unwrap();
        assert_eq!(prompt, "请选择要导出的日期:");
        assert_eq!(kb.rows.len(), 1);
        assert!(kb.rows[0][0].callback_data.starts_with("export_date_"));
    }

    #[tokio::test]
    async fn export_yesterday_reports_empty_day() {
        let h = Harness::new();
        h.authorize(GROUP).await;
        h.text(GROUP, ADMIN, "导出昨日账单").await;
        let edits = h.messenger.edits();
        assert_eq!(edits.len(), 1);
        assert!(edits[0].1.starts_with("在 "));
        assert!(edits[0].1.ends_with(" 没有找到任何记账记录"));
        assert!(h.messenger.documents().is_empty());
    }

    #[tokio::test]
    async fn export_yesterday_sends_archived_records() {
        let h = Harness::new();
        h.authorize(GROUP).await;
        let yesterday = h.bot.today() - chrono::Duration::days(1);
        let date = yesterday.format(crate::ledger::DATE_FORMAT).to_string();
        h.store
            .update(|s| {
                let ledger = s.ledger_mut(ChatId(GROUP));
                ledger.set_fixed_rate(2.0);
                ledger.add_deposit(10.0, "op".into(), None, yesterday.and_hms_opt(9, 0, 0).unwrap());
                ledger.roll_over(&date);
            })
            .await
            .unwrap();

        h.text(GROUP, ADMIN, "导出昨日账单").await;
        let docs = h.messenger.documents();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].1.file_name, format!("Test Group_{date}_账单.txt"));
        assert_eq!(docs[0].1.caption, format!("Test Group {date} 财务账单导出文件"));
        let content = std::fs::read_to_string(&docs[0].1.path).unwrap();
        assert!(content.contains("金额: 10.00"));
        assert!(h.messenger.edits()[0].1.contains("入款（1笔）"));
    }

    #[tokio::test]
    async fn private_chat_fallback_sends_help() {
        let h = Harness::new();
        h.text(PRIVATE, STRANGER, "hello").await;
        let help = h.messenger.texts().pop().unwrap();
        assert!(help.starts_with("🤖 账务机器人使用指南"));
        assert!(!help.contains("管理员专属命令"));

        h.text(GROUP, ADMIN, "hello").await;
        assert_eq!(h.messenger.texts().len(), 1);
    }
}
