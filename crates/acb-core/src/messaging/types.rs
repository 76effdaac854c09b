use std::path::PathBuf;

use crate::domain::{ChatInfo, MessageId, MessageRef, UserProfile};

/// A plain text message addressed to the bot.
#[derive(Clone, Debug)]
pub struct IncomingText {
    pub chat: ChatInfo,
    pub from: UserProfile,
    pub message_id: MessageId,
    pub text: String,
    pub reply_to: Option<RepliedMessage>,
}

/// The message an incoming text replies to.
#[derive(Clone, Debug, Default)]
pub struct RepliedMessage {
    /// Sender name of a forwarded message from a hidden account.
    pub forward_sender_name: Option<String>,
    pub caption: Option<String>,
    pub from: Option<UserProfile>,
}

impl IncomingText {
    /// Label attached to deposits made as a reply.
    ///
    /// Forward sender name first. Then the caption: its third space-separated
    /// token when there are at least three (`ref 179 name`), else the whole
    /// caption. Then the replied user's display name.
    pub fn responder(&self) -> Option<String> {
        let reply = self.reply_to.as_ref()?;
        if let Some(name) = reply.forward_sender_name.as_deref().filter(|n| !n.is_empty()) {
            return Some(name.to_string());
        }
        if let Some(caption) = reply.caption.as_deref().filter(|c| !c.is_empty()) {
            let parts: Vec<&str> = caption.split(' ').collect();
            if parts.len() >= 3 {
                return Some(parts[2].to_string());
            }
            return Some(caption.to_string());
        }
        reply.from.as_ref().map(UserProfile::display_name)
    }

    /// Username of the replied-to account, if it has one.
    pub fn replied_username(&self) -> Option<String> {
        self.reply_to
            .as_ref()?
            .from
            .as_ref()?
            .username
            .clone()
            .filter(|u| !u.is_empty())
    }
}

#[derive(Clone, Debug)]
pub struct Command {
    pub chat: ChatInfo,
    pub from: UserProfile,
    /// Lowercase, without `/` or `@botname`.
    pub name: String,
    pub args: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct CallbackQuery {
    pub chat: ChatInfo,
    pub from: UserProfile,
    pub callback_id: String,
    pub data: String,
    /// The message carrying the button.
    pub message: Option<MessageRef>,
}

/// Inline keyboard, row-major.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            callback_data: callback_data.into(),
        }
    }
}

impl InlineKeyboard {
    pub fn new(rows: Vec<Vec<InlineButton>>) -> Self {
        Self { rows }
    }

    pub fn one_per_row(buttons: Vec<InlineButton>) -> Self {
        Self {
            rows: buttons.into_iter().map(|b| vec![b]).collect(),
        }
    }

    /// Two buttons per row; an odd last button gets its own row.
    pub fn pairs(buttons: Vec<InlineButton>) -> Self {
        let mut rows = Vec::new();
        let mut iter = buttons.into_iter();
        while let Some(first) = iter.next() {
            let mut row = vec![first];
            if let Some(second) = iter.next() {
                row.push(second);
            }
            rows.push(row);
        }
        Self { rows }
    }

    pub fn push_row(mut self, row: Vec<InlineButton>) -> Self {
        self.rows.push(row);
        self
    }

    pub fn single(label: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self::one_per_row(vec![InlineButton::new(label, callback_data)])
    }

    pub fn callback_data(&self) -> Vec<&str> {
        self.rows
            .iter()
            .flatten()
            .map(|b| b.callback_data.as_str())
            .collect()
    }
}

/// A file on disk plus how it should be presented to the chat.
#[derive(Clone, Debug, PartialEq)]
pub struct ExportFile {
    pub path: PathBuf,
    /// Name shown to the recipient.
    pub file_name: String,
    pub caption: String,
}
