//! Test doubles shared by the bot's handler tests.

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc, Mutex,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;

use crate::{
    config::{default_timezone, Config},
    domain::{ChatId, ChatInfo, ChatKind, MessageId, MessageRef, UserId, UserProfile},
    ledger::DATE_FORMAT,
    messaging::{
        port::MessagingPort,
        types::{CallbackQuery, Command, ExportFile, IncomingText, InlineKeyboard},
    },
    store::{BotState, StateStore},
    Result,
};

use super::AccountingBot;

pub const ADMIN: i64 = 1;
pub const OPERATOR: i64 = 2;
pub const STRANGER: i64 = 3;
pub const GROUP: i64 = -100;
pub const PRIVATE: i64 = 500;

type Edit = (MessageRef, String, Option<InlineKeyboard>);

#[derive(Default)]
pub struct FakeMessenger {
    next_id: Mutex<i32>,
    sends: Mutex<Vec<(ChatId, String)>>,
    keyboards: Mutex<Vec<(ChatId, String, InlineKeyboard)>>,
    edits: Mutex<Vec<Edit>>,
    documents: Mutex<Vec<(ChatId, ExportFile)>>,
    answers: Mutex<Vec<Option<String>>>,
}

impl FakeMessenger {
    fn alloc(&self, chat_id: ChatId) -> MessageRef {
        let mut guard = self.next_id.lock().unwrap();
        *guard += 1;
        MessageRef {
            chat_id,
            message_id: MessageId(*guard),
        }
    }

    pub fn texts(&self) -> Vec<String> {
        self.sends
            .lock()
            .unwrap()
            .iter()
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub fn last_keyboard(&self) -> Option<(ChatId, String, InlineKeyboard)> {
        self.keyboards.lock().unwrap().last().cloned()
    }

    pub fn edits(&self) -> Vec<Edit> {
        self.edits.lock().unwrap().clone()
    }

    pub fn documents(&self) -> Vec<(ChatId, ExportFile)> {
        self.documents.lock().unwrap().clone()
    }

    pub fn answers(&self) -> Vec<Option<String>> {
        self.answers.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sends.lock().unwrap().clear();
        self.keyboards.lock().unwrap().clear();
        self.edits.lock().unwrap().clear();
        self.documents.lock().unwrap().clear();
        self.answers.lock().unwrap().clear();
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        self.sends.lock().unwrap().push((chat_id, text.to_string()));
        Ok(self.alloc(chat_id))
    }

    async fn send_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.keyboards
            .lock()
            .unwrap()
            .push((chat_id, text.to_string(), keyboard));
        Ok(self.alloc(chat_id))
    }

    async fn edit_text(
        &self,
        msg: MessageRef,
        text: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<()> {
        self.edits
            .lock()
            .unwrap()
            .push((msg, text.to_string(), keyboard));
        Ok(())
    }

    async fn send_document(&self, chat_id: ChatId, file: ExportFile) -> Result<MessageRef> {
        self.documents.lock().unwrap().push((chat_id, file));
        Ok(self.alloc(chat_id))
    }

    async fn answer_callback_query(&self, _callback_id: &str, text: Option<&str>) -> Result<()> {
        self.answers.lock().unwrap().push(text.map(str::to_string));
        Ok(())
    }
}

fn temp_root() -> PathBuf {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("acb-bot-{}-{ts}", std::process::id()))
}

pub fn test_config(root: &std::path::Path, admins: Vec<i64>) -> Arc<Config> {
    Arc::new(Config {
        bot_token: "x".to_string(),
        admin_user_ids: admins,
        initial_operators: vec!["root".to_string()],
        timezone: default_timezone(),
        reset_check_interval: Duration::from_secs(3600),
        save_interval: Duration::from_secs(300),
        history_retention_days: 7,
        data_file: root.join("bot_data.json"),
        export_dir: root.join("exports"),
        max_processed_messages: 100,
    })
}

pub struct Harness {
    pub bot: AccountingBot,
    pub store: Arc<StateStore>,
    pub messenger: Arc<FakeMessenger>,
    root: PathBuf,
    next_message: AtomicI32,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_admins(vec![ADMIN])
    }

    pub fn with_admins(admins: Vec<i64>) -> Self {
        Self::configured(admins, |_| {})
    }

    pub fn configured(admins: Vec<i64>, adjust: impl FnOnce(&mut Config)) -> Self {
        let root = temp_root();
        let mut cfg = test_config(&root, admins);
        adjust(Arc::make_mut(&mut cfg));
        let store = Arc::new(StateStore::in_memory(
            cfg.data_file.clone(),
            BotState::default(),
        ));
        let messenger = Arc::new(FakeMessenger::default());
        let bot = AccountingBot::new(cfg, store.clone(), messenger.clone())
            .with_bot_username(Some("acb_test_bot".to_string()));
        Self {
            bot,
            store,
            messenger,
            root,
            next_message: AtomicI32::new(1),
        }
    }

    pub fn today(&self) -> String {
        self.bot.today().format(DATE_FORMAT).to_string()
    }

    pub fn chat(&self, id: i64) -> ChatInfo {
        if id < 0 {
            ChatInfo {
                id: ChatId(id),
                kind: ChatKind::Group,
                title: Some("Test Group".to_string()),
            }
        } else {
            ChatInfo {
                id: ChatId(id),
                kind: ChatKind::Private,
                title: None,
            }
        }
    }

    pub fn user(&self, id: i64, username: Option<&str>) -> UserProfile {
        UserProfile {
            id: UserId(id),
            username: username.map(str::to_string),
            first_name: format!("user{id}"),
            last_name: None,
        }
    }

    fn default_user(&self, id: i64) -> UserProfile {
        let username = match id {
            ADMIN => Some("boss"),
            OPERATOR => Some("op"),
            _ => Some("guest"),
        };
        self.user(id, username)
    }

    pub fn message(&self, chat: i64, from: i64, text: &str) -> IncomingText {
        IncomingText {
            chat: self.chat(chat),
            from: self.default_user(from),
            message_id: MessageId(self.next_message.fetch_add(1, Ordering::SeqCst)),
            text: text.to_string(),
            reply_to: None,
        }
    }

    pub async fn text(&self, chat: i64, from: i64, text: &str) {
        let msg = self.message(chat, from, text);
        self.bot.handle_text(msg).await.unwrap();
    }

    pub async fn authorize(&self, chat: i64) {
        self.text(chat, ADMIN, "授权群").await;
    }

    pub async fn command(&self, chat: i64, from: i64, name: &str, args: &[&str]) {
        let cmd = Command {
            chat: self.chat(chat),
            from: self.default_user(from),
            name: name.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        };
        self.bot.handle_command(cmd).await.unwrap();
    }

    pub async fn callback(&self, chat: i64, from: i64, data: &str) {
        let query = CallbackQuery {
            chat: self.chat(chat),
            from: self.default_user(from),
            callback_id: format!("cb-{}", self.next_message.fetch_add(1, Ordering::SeqCst)),
            data: data.to_string(),
            message: Some(MessageRef {
                chat_id: ChatId(chat),
                message_id: MessageId(999),
            }),
        };
        self.bot.handle_callback(query).await.unwrap();
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}
