//! Telegram update handlers.
//!
//! Each handler converts a teloxide update into the core's platform-neutral
//! types and hands it to the [`AccountingBot`](acb_core::bot::AccountingBot).
//! Failures are logged, never surfaced to the dispatcher.

use std::{collections::HashMap, sync::Arc};

use teloxide::{
    prelude::*,
    types::{Chat, Message, User},
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use acb_core::{
    domain::{ChatId, ChatInfo, ChatKind, MessageId, UserId, UserProfile},
    messaging::types::{IncomingText, RepliedMessage},
};

use crate::router::AppState;

mod callback;
mod commands;
mod text;

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    callback::handle_callback(q, state).await
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(body) = msg.text() else {
        return Ok(());
    };

    // Ledger updates from one chat are applied in arrival order.
    let _guard = state.chat_locks.lock_chat(msg.chat.id.0).await;
    if body.starts_with('/') {
        return commands::handle_command(msg, state).await;
    }
    text::handle_text(msg, state).await
}

#[derive(Default)]
pub struct ChatLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub async fn lock_chat(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

pub(crate) fn chat_info(chat: &Chat) -> ChatInfo {
    let kind = if chat.is_private() {
        ChatKind::Private
    } else if chat.is_channel() {
        ChatKind::Channel
    } else {
        ChatKind::Group
    };
    ChatInfo {
        id: ChatId(chat.id.0),
        kind,
        title: chat.title().map(str::to_string),
    }
}

pub(crate) fn user_profile(user: &User) -> UserProfile {
    UserProfile {
        id: UserId(user.id.0 as i64),
        username: user.username.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
    }
}

fn replied_message(msg: &Message) -> RepliedMessage {
    RepliedMessage {
        forward_sender_name: msg.forward_from_sender_name().map(str::to_string),
        caption: msg.caption().map(str::to_string),
        from: msg.from().map(user_profile),
    }
}

pub(crate) fn incoming_text(msg: &Message) -> Option<IncomingText> {
    let from = msg.from()?;
    let text = msg.text()?;
    Some(IncomingText {
        chat: chat_info(&msg.chat),
        from: user_profile(from),
        message_id: MessageId(msg.id.0),
        text: text.to_string(),
        reply_to: msg.reply_to_message().map(replied_message),
    })
}
