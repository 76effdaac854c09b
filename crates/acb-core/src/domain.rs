/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric). Groups and supergroups are negative.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChatId(pub i64);

impl ChatId {
    pub fn is_group(self) -> bool {
        self.0 < 0
    }
}

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
    Channel,
}

impl ChatKind {
    /// Groups and supergroups.
    pub fn is_group(self) -> bool {
        matches!(self, ChatKind::Group)
    }
}

/// The conversation an update arrived in.
#[derive(Clone, Debug)]
pub struct ChatInfo {
    pub id: ChatId,
    pub kind: ChatKind,
    pub title: Option<String>,
}

impl ChatInfo {
    /// Title used in bill headers.
    pub fn display_title(&self) -> String {
        match (&self.title, self.kind) {
            (Some(t), _) if !t.trim().is_empty() => t.clone(),
            (_, ChatKind::Private) => "私聊".to_string(),
            _ => format!("Chat {}", self.id.0),
        }
    }
}

/// A Telegram account as seen on a message.
#[derive(Clone, Debug)]
pub struct UserProfile {
    pub id: UserId,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
}

impl UserProfile {
    /// "first last", then first name, then username, then the numeric id.
    pub fn display_name(&self) -> String {
        let first = self.first_name.trim();
        let last = self.last_name.as_deref().map(str::trim).unwrap_or("");
        if !first.is_empty() && !last.is_empty() {
            return format!("{first} {last}");
        }
        if !first.is_empty() {
            return first.to_string();
        }
        match self.username.as_deref() {
            Some(u) if !u.is_empty() => u.to_string(),
            _ => self.id.0.to_string(),
        }
    }
}
