//! Slash commands.

use crate::{
    calc,
    command::parse_amount,
    formatting::plain_number,
    messaging::types::Command,
    report,
    security::AccessPolicy,
    Result,
};

use super::{views, AccountingBot};

impl AccountingBot {
    pub(super) async fn dispatch_command(&self, cmd: &Command) -> Result<()> {
        let chat = &cmd.chat;
        match cmd.name.as_str() {
            "help" => return self.send_help(cmd).await,
            "set_admin" => return self.claim_admin(cmd).await,
            _ => {}
        }
        if !self.is_manager(chat, &cmd.from).await {
            tracing::debug!(chat_id = chat.id.0, command = %cmd.name, "command ignored for non-manager");
            return Ok(());
        }

        let res = match cmd.name.as_str() {
            "start" => self.reply(chat.id, "记账机器人已启动，使用 /help 查看命令.").await,
            "deposit" => self.cmd_deposit(cmd).await,
            "withdraw" => self.cmd_withdraw(cmd).await,
            "user" => self.cmd_user(cmd).await,
            "rate" => self.cmd_rate(cmd).await,
            "fixed_rate" => self.cmd_fixed_rate(cmd).await,
            "summary" => self.show_bill(chat).await,
            "reset" => self.cmd_reset(cmd).await,
            "calc" => {
                self.reply(chat.id, &calc::reply(&cmd.args.join(" ")))
                    .await
            }
            "allbills" => {
                self.messenger
                    .send_keyboard(chat.id, views::MENU_PROMPT, views::bills_menu())
                    .await?;
                Ok(())
            }
            "financial" => self.send_financial_summary(chat).await,
            "income" => self.show_income_dates(chat.id).await,
            other => {
                tracing::debug!(command = other, "unknown command");
                Ok(())
            }
        };
        self.settle(chat.id, "❌ 操作失败", res).await
    }

    async fn send_help(&self, cmd: &Command) -> Result<()> {
        let (manager, admin) = {
            let state = self.store.lock().await;
            let policy = self.policy(&state);
            (
                policy.is_manager(&cmd.chat, &cmd.from),
                policy.is_global_admin(cmd.from.id),
            )
        };
        let text = if cmd.chat.kind.is_group() {
            report::brief_help(manager)
        } else {
            report::full_help(manager, admin)
        };
        self.reply(cmd.chat.id, &text).await
    }

    async fn claim_admin(&self, cmd: &Command) -> Result<()> {
        let user = cmd.from.id;
        let admins = self.cfg.admin_user_ids.clone();
        let claimed = self
            .store
            .update(move |state| {
                let taken = AccessPolicy::new(&admins, state).has_any_admin();
                if !taken {
                    state.admins.push(user.0);
                }
                !taken
            })
            .await?;
        if claimed {
            tracing::info!(user_id = user.0, "admin claimed via /set_admin");
            self.reply(cmd.chat.id, &format!("您已被设置为管理员，用户ID: {}", user.0))
                .await
        } else {
            self.reply(cmd.chat.id, "管理员已经设置，无法更改").await
        }
    }

    async fn cmd_deposit(&self, cmd: &Command) -> Result<()> {
        let chat = &cmd.chat;
        let Some(raw) = cmd.args.first() else {
            return self.reply(chat.id, "使用方法: /deposit <金额>").await;
        };
        let Some(amount) = parse_amount(raw) else {
            return self.reply(chat.id, "金额必须是数字").await;
        };
        let user = cmd.from.display_name();
        let now = self.now();
        self.update_ledger(chat, move |ledger| {
            ledger.add_deposit(amount, user, None, now);
        })
        .await?;
        self.reply(chat.id, &format!("✅ 已入款: +{}", plain_number(amount)))
            .await?;
        self.show_bill(chat).await
    }

    async fn cmd_withdraw(&self, cmd: &Command) -> Result<()> {
        let chat = &cmd.chat;
        let Some(raw) = cmd.args.first() else {
            return self.reply(chat.id, "使用方法: /withdraw <USDT金额>").await;
        };
        let Some(usdt) = parse_amount(raw) else {
            return self.reply(chat.id, "金额必须是数字").await;
        };
        let user = cmd.from.display_name();
        let now = self.now();
        self.update_ledger(chat, move |ledger| {
            ledger.add_withdrawal(usdt, user, now);
        })
        .await?;
        self.reply(chat.id, "✅ 已出款").await?;
        self.show_bill(chat).await
    }

    async fn cmd_user(&self, cmd: &Command) -> Result<()> {
        let chat = &cmd.chat;
        let [id, up, down] = cmd.args.as_slice() else {
            return self
                .reply(chat.id, "使用方法: /user [用户ID] [上分金额] [下分金额]")
                .await;
        };
        let (Some(up), Some(down)) = (parse_amount(up), parse_amount(down)) else {
            return self.reply(chat.id, "金额必须是数字").await;
        };
        let id = id.clone();
        let key = id.clone();
        let class = self
            .update_ledger(chat, move |ledger| ledger.set_user_class(&key, up, down))
            .await?;
        self.reply(
            chat.id,
            &format!(
                "已记录用户分类: {id} - 上分:{} 下分:{} 余额:{:.2}U",
                plain_number(up),
                plain_number(down),
                class.balance
            ),
        )
        .await?;
        self.show_bill(chat).await
    }

    async fn cmd_rate(&self, cmd: &Command) -> Result<()> {
        let chat = &cmd.chat;
        let Some(raw) = cmd.args.first() else {
            return self.reply(chat.id, "使用方法: /rate <费率百分比>").await;
        };
        let Some(rate) = parse_amount(raw) else {
            return self.reply(chat.id, "费率必须是数字").await;
        };
        self.update_ledger(chat, move |ledger| ledger.set_fee_rate(rate))
            .await?;
        self.reply(chat.id, &format!("已设置费率: {}%", plain_number(rate)))
            .await?;
        self.show_bill(chat).await
    }

    async fn cmd_fixed_rate(&self, cmd: &Command) -> Result<()> {
        let chat = &cmd.chat;
        let Some(raw) = cmd.args.first() else {
            return self.reply(chat.id, "使用方法: /fixed_rate <汇率>").await;
        };
        let Some(rate) = parse_amount(raw) else {
            return self.reply(chat.id, "汇率必须是数字").await;
        };
        self.update_ledger(chat, move |ledger| ledger.set_fixed_rate(rate))
            .await?;
        self.reply(chat.id, &format!("已设置固定汇率: {}", plain_number(rate)))
            .await?;
        self.show_bill(chat).await
    }

    async fn cmd_reset(&self, cmd: &Command) -> Result<()> {
        self.update_ledger(&cmd.chat, |ledger| ledger.reset()).await?;
        tracing::info!(chat_id = cmd.chat.id.0, "ledger reset");
        self.reply(cmd.chat.id, "已重置当前群组的账单").await
    }
}
