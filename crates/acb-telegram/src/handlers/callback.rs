use std::sync::Arc;

use teloxide::prelude::*;

use acb_core::{
    domain::{ChatId, MessageId, MessageRef},
    messaging::port::MessagingPort,
    messaging::types::CallbackQuery as Query,
};

use super::{chat_info, user_profile};
use crate::router::AppState;

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    let data = q.data.clone().unwrap_or_default();

    // Always answer callback query eventually.
    let Some(message) = q.message.as_ref().filter(|_| !data.is_empty()) else {
        let _ = state.messenger.answer_callback_query(&q.id, None).await;
        return Ok(());
    };

    let chat_id = message.chat.id.0;
    let _guard = state.chat_locks.lock_chat(chat_id).await;

    let query = Query {
        chat: chat_info(&message.chat),
        from: user_profile(&q.from),
        callback_id: q.id.clone(),
        data,
        message: Some(MessageRef {
            chat_id: ChatId(chat_id),
            message_id: MessageId(message.id.0),
        }),
    };
    if let Err(e) = state.bot.handle_callback(query).await {
        tracing::warn!(chat_id, error = %e, "callback failed");
        let _ = state.messenger.answer_callback_query(&q.id, None).await;
    }
    Ok(())
}
