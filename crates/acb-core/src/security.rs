use crate::{
    domain::{ChatId, ChatInfo, ChatKind, UserId, UserProfile},
    store::BotState,
};

// ============== Authorization ==============

pub fn is_listed(user_id: Option<UserId>, allowed_users: &[i64]) -> bool {
    let Some(user_id) = user_id else {
        return false;
    };
    allowed_users.contains(&user_id.0)
}

/// Role checks over the configured admins and the persisted state.
#[derive(Clone, Copy)]
pub struct AccessPolicy<'a> {
    configured_admins: &'a [i64],
    state: &'a BotState,
}

impl<'a> AccessPolicy<'a> {
    pub fn new(configured_admins: &'a [i64], state: &'a BotState) -> Self {
        Self {
            configured_admins,
            state,
        }
    }

    pub fn is_global_admin(&self, user: UserId) -> bool {
        is_listed(Some(user), self.configured_admins) || is_listed(Some(user), &self.state.admins)
    }

    pub fn has_any_admin(&self) -> bool {
        !self.configured_admins.is_empty() || !self.state.admins.is_empty()
    }

    pub fn is_operator(&self, chat: ChatId, username: Option<&str>) -> bool {
        let Some(username) = username.filter(|u| !u.is_empty()) else {
            return false;
        };
        self.state
            .operators(chat)
            .map(|ops| ops.contains(username))
            .unwrap_or(false)
    }

    /// May run financial commands in `chat`.
    ///
    /// Private chats: global admins only. Groups: global admins anywhere,
    /// operators only once the group is authorized.
    pub fn is_manager(&self, chat: &ChatInfo, user: &UserProfile) -> bool {
        match chat.kind {
            ChatKind::Private => self.is_global_admin(user.id),
            ChatKind::Group => {
                if self.is_global_admin(user.id) {
                    return true;
                }
                if !self.state.is_chat_authorized(chat.id) {
                    tracing::debug!(chat_id = chat.id.0, "group not authorized");
                    return false;
                }
                self.is_operator(chat.id, user.username.as_deref())
            }
            ChatKind::Channel => false,
        }
    }

    /// Groups only see the bot after `授权群`, unless an admin is talking.
    pub fn is_chat_open(&self, chat: &ChatInfo, user: &UserProfile) -> bool {
        !chat.kind.is_group() || self.state.is_chat_authorized(chat.id) || self.is_global_admin(user.id)
    }
}
