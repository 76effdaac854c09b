use std::sync::Arc;

use teloxide::prelude::*;

use acb_core::messaging::types::Command;

use super::{chat_info, user_profile};
use crate::router::AppState;

fn parse_command(text: &str) -> (String, Vec<String>) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.split_whitespace();
    let first = parts.next().unwrap_or("");

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, parts.map(str::to_string).collect())
}

pub async fn handle_command(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let (name, args) = parse_command(text);
    if name.is_empty() {
        return Ok(());
    }
    tracing::debug!(chat_id = msg.chat.id.0, command = %name, "command received");

    let cmd = Command {
        chat: chat_info(&msg.chat),
        from: user_profile(user),
        name,
        args,
    };
    if let Err(e) = state.bot.handle_command(cmd).await {
        tracing::warn!(chat_id = msg.chat.id.0, error = %e, "command failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_slash_and_bot_mention() {
        assert_eq!(
            parse_command("/Deposit@acb_bot 100"),
            ("deposit".to_string(), vec!["100".to_string()])
        );
        assert_eq!(
            parse_command("  /user  42 100   30 "),
            (
                "user".to_string(),
                vec!["42".to_string(), "100".to_string(), "30".to_string()]
            )
        );
        assert_eq!(parse_command("/summary"), ("summary".to_string(), vec![]));
    }
}
