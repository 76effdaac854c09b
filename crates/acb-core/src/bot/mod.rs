//! The accounting bot: turns incoming texts, commands and button presses into
//! ledger mutations and replies.
//!
//! Everything platform-specific sits behind [`MessagingPort`]; the Telegram
//! adapter only converts updates and calls the three `handle_*` entry points.

mod callbacks;
mod commands;
mod text;
pub mod views;

#[cfg(test)]
mod testing;

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use chrono::{NaiveDate, NaiveDateTime};

use crate::{
    config::Config,
    domain::{ChatId, ChatInfo, ChatKind, MessageId, MessageRef, UserId, UserProfile},
    export::Exporter,
    ledger::{Ledger, DATE_FORMAT},
    messaging::{
        port::MessagingPort,
        types::{CallbackQuery, Command, IncomingText, InlineKeyboard},
    },
    report,
    security::AccessPolicy,
    store::{BotState, StateStore},
    Result,
};

pub struct AccountingBot {
    cfg: Arc<Config>,
    store: Arc<StateStore>,
    messenger: Arc<dyn MessagingPort>,
    exporter: Exporter,
    /// Recently handled message ids, per chat.
    recent: Mutex<HashMap<i64, VecDeque<i32>>>,
    bot_username: Option<String>,
}

impl AccountingBot {
    pub fn new(
        cfg: Arc<Config>,
        store: Arc<StateStore>,
        messenger: Arc<dyn MessagingPort>,
    ) -> Self {
        let exporter = Exporter::new(cfg.export_dir.clone());
        Self {
            cfg,
            store,
            messenger,
            exporter,
            recent: Mutex::new(HashMap::new()),
            bot_username: None,
        }
    }

    /// Our own username, used to strip `cmd@ourbot` mentions in groups.
    pub fn with_bot_username(mut self, username: Option<String>) -> Self {
        self.bot_username = username.map(|u| u.trim_start_matches('@').to_string());
        self
    }

    pub async fn handle_text(&self, msg: IncomingText) -> Result<()> {
        if self.is_duplicate(msg.chat.id, msg.message_id) {
            tracing::debug!(
                chat_id = msg.chat.id.0,
                message_id = msg.message_id.0,
                "skipping already handled message"
            );
            return Ok(());
        }
        self.dispatch_text(&msg).await
    }

    pub async fn handle_command(&self, cmd: Command) -> Result<()> {
        self.dispatch_command(&cmd).await
    }

    pub async fn handle_callback(&self, query: CallbackQuery) -> Result<()> {
        self.dispatch_callback(&query).await
    }

    // ============== Shared helpers ==============

    fn now(&self) -> NaiveDateTime {
        self.cfg.now()
    }

    fn today(&self) -> NaiveDate {
        self.now().date()
    }

    fn today_str(&self) -> String {
        self.today().format(DATE_FORMAT).to_string()
    }

    fn is_duplicate(&self, chat: ChatId, id: MessageId) -> bool {
        let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
        let seen = recent.entry(chat.0).or_default();
        if seen.contains(&id.0) {
            return true;
        }
        seen.push_back(id.0);
        while seen.len() > self.cfg.max_processed_messages {
            seen.pop_front();
        }
        false
    }

    fn policy<'a>(&'a self, state: &'a BotState) -> AccessPolicy<'a> {
        AccessPolicy::new(&self.cfg.admin_user_ids, state)
    }

    async fn is_manager(&self, chat: &ChatInfo, user: &UserProfile) -> bool {
        let state = self.store.lock().await;
        self.policy(&state).is_manager(chat, user)
    }

    async fn is_global_admin(&self, user: UserId) -> bool {
        let state = self.store.lock().await;
        self.policy(&state).is_global_admin(user)
    }

    async fn is_chat_open(&self, chat: &ChatInfo, user: &UserProfile) -> bool {
        let state = self.store.lock().await;
        self.policy(&state).is_chat_open(chat, user)
    }

    /// Mutate the chat's ledger (creating it if needed), remember its title, then persist.
    async fn update_ledger<R>(
        &self,
        chat: &ChatInfo,
        f: impl FnOnce(&mut Ledger) -> R,
    ) -> Result<R> {
        let id = chat.id;
        let title = chat.display_title();
        self.store
            .update(move |state| {
                let ledger = state.ledger_mut(id);
                ledger.title = Some(title);
                f(ledger)
            })
            .await
    }

    /// The main bill with its `详细账单` / `历史账单` buttons.
    async fn show_bill(&self, chat: &ChatInfo) -> Result<()> {
        let text = {
            let state = self.store.lock().await;
            let empty = Ledger::default();
            let ledger = state.ledger(chat.id).unwrap_or(&empty);
            report::main_bill(&chat.display_title(), &ledger.book())
        };
        self.messenger
            .send_keyboard(chat.id, &text, views::bill_keyboard(chat.id))
            .await?;
        Ok(())
    }

    async fn reply(&self, chat: ChatId, text: &str) -> Result<()> {
        self.messenger.send_text(chat, text).await?;
        Ok(())
    }

    /// Log a failed action and tell the chat about it.
    async fn settle(&self, chat: ChatId, context: &str, res: Result<()>) -> Result<()> {
        match res {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(chat_id = chat.0, "{context}: {e}");
                self.reply(chat, &format!("{context}: {e}")).await
            }
        }
    }

    /// Show the 7-day export picker, either as a new message or by editing `edit`.
    async fn show_export_dates(
        &self,
        chat: &ChatInfo,
        edit: Option<MessageRef>,
    ) -> Result<()> {
        let dates = {
            let state = self.store.lock().await;
            views::chat_dates_with_records(state.ledger(chat.id), self.today())
        };
        let (text, keyboard) = if dates.is_empty() {
            (
                format!("{} 最近7天内没有任何记账记录", chat.display_title()),
                None,
            )
        } else {
            (
                views::EXPORT_DATE_PROMPT.to_string(),
                Some(views::export_dates_keyboard(chat.id, &dates)),
            )
        };
        self.present(chat.id, edit, &text, keyboard).await
    }

    /// `财务查账` / `/income`: dates of the last week with records in any chat.
    async fn show_income_dates(&self, chat: ChatId) -> Result<()> {
        let dates = {
            let state = self.store.lock().await;
            views::any_chat_dates_with_records(&state, self.today())
        };
        if dates.is_empty() {
            return self.reply(chat, views::NO_DATES).await;
        }
        self.messenger
            .send_keyboard(
                chat,
                views::PICK_DATE_PROMPT,
                views::income_dates_keyboard(&dates),
            )
            .await?;
        Ok(())
    }

    /// Edit `edit` in place when given, otherwise send a new message.
    async fn present(
        &self,
        chat: ChatId,
        edit: Option<MessageRef>,
        text: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<()> {
        match (edit, keyboard) {
            (Some(msg), keyboard) => self.messenger.edit_text(msg, text, keyboard).await,
            (None, Some(keyboard)) => {
                self.messenger.send_keyboard(chat, text, keyboard).await?;
                Ok(())
            }
            (None, None) => self.reply(chat, text).await,
        }
    }
}

/// What we know about a chat that is not the one the update came from.
fn known_chat(state: &BotState, id: ChatId) -> ChatInfo {
    ChatInfo {
        id,
        kind: if id.is_group() {
            ChatKind::Group
        } else {
            ChatKind::Private
        },
        title: state.ledger(id).and_then(|l| l.title.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use crate::domain::MessageId;

    #[tokio::test]
    async fn dedup_window_evicts_oldest_per_chat() {
        let h = Harness::configured(vec![ADMIN], |cfg| cfg.max_processed_messages = 2);
        let other = PRIVATE + 1;
        let send = |chat: i64, id: i32| {
            let mut msg = h.message(chat, ADMIN, "1+2");
            msg.message_id = MessageId(id);
            h.bot.handle_text(msg)
        };

        for id in [1, 2, 3] {
            send(PRIVATE, id).await.unwrap();
        }
        assert_eq!(h.messenger.texts().len(), 3);

        // 1 fell out of the window when 3 arrived.
        send(PRIVATE, 1).await.unwrap();
        assert_eq!(h.messenger.texts().len(), 4);
        send(PRIVATE, 3).await.unwrap();
        assert_eq!(h.messenger.texts().len(), 4);

        // Same id in another chat is a different message.
        send(other, 3).await.unwrap();
        assert_eq!(h.messenger.texts().len(), 5);
        send(other, 3).await.unwrap();
        assert_eq!(h.messenger.texts().len(), 5);
    }
}
