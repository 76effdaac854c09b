use std::sync::Arc;

use teloxide::prelude::*;

use super::incoming_text;
use crate::router::AppState;

pub async fn handle_text(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(incoming) = incoming_text(&msg) else {
        return Ok(());
    };
    if incoming.text.trim().is_empty() {
        return Ok(());
    }

    let chat_id = incoming.chat.id.0;
    if let Err(e) = state.bot.handle_text(incoming).await {
        tracing::warn!(chat_id, error = %e, "text handling failed");
    }
    Ok(())
}
