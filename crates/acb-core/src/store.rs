use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

use crate::{domain::ChatId, errors::Error, ledger::Ledger, Result};

/// Everything the bot persists, in the `bot_data.json` layout.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BotState {
    #[serde(default)]
    pub chat_accounting: BTreeMap<i64, Ledger>,
    #[serde(default)]
    pub group_operators: BTreeMap<i64, BTreeSet<String>>,
    #[serde(default)]
    pub authorized_groups: BTreeSet<i64>,
    /// Admins claimed through `/set_admin`.
    #[serde(default)]
    pub admins: Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reset_date: Option<String>,
}

impl BotState {
    pub fn ledger(&self, chat: ChatId) -> Option<&Ledger> {
        self.chat_accounting.get(&chat.0)
    }

    /// Creates an empty ledger on first use.
    pub fn ledger_mut(&mut self, chat: ChatId) -> &mut Ledger {
        self.chat_accounting.entry(chat.0).or_insert_with(|| {
            tracing::info!(chat_id = chat.0, "creating ledger");
            Ledger::default()
        })
    }

    pub fn is_chat_authorized(&self, chat: ChatId) -> bool {
        self.authorized_groups.contains(&chat.0)
    }

    pub fn operators(&self, chat: ChatId) -> Option<&BTreeSet<String>> {
        self.group_operators.get(&chat.0)
    }

    pub fn operators_mut(&mut self, chat: ChatId) -> &mut BTreeSet<String> {
        self.group_operators.entry(chat.0).or_default()
    }

    pub fn reset_operators(&mut self, chat: ChatId, initial: &[String]) -> &BTreeSet<String> {
        let set = self.operators_mut(chat);
        set.clear();
        set.extend(initial.iter().cloned());
        set
    }

    /// Give every authorized chat without an operator set the initial operators.
    pub fn seed_operators(&mut self, initial: &[String]) -> usize {
        let missing: Vec<i64> = self
            .authorized_groups
            .iter()
            .copied()
            .filter(|id| !self.group_operators.contains_key(id))
            .collect();
        for id in &missing {
            self.group_operators
                .insert(*id, initial.iter().cloned().collect());
        }
        missing.len()
    }
}

pub fn load_state(path: &Path) -> Result<BotState> {
    if !path.exists() {
        return Ok(BotState::default());
    }
    let txt = std::fs::read_to_string(path)?;
    if txt.trim().is_empty() {
        return Ok(BotState::default());
    }
    serde_json::from_str(&txt).map_err(|e| Error::State {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// The whole bot state behind one async lock, plus where it is saved.
///
/// Writers take `write_lock` before the state lock, so snapshots reach disk
/// in the order they were taken and only one temp file exists at a time.
pub struct StateStore {
    path: PathBuf,
    state: Mutex<BotState>,
    write_lock: Mutex<()>,
}

impl StateStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = load_state(&path)?;
        tracing::info!(
            path = %path.display(),
            chats = state.chat_accounting.len(),
            authorized = state.authorized_groups.len(),
            "state loaded"
        );
        Ok(Self {
            path,
            state: Mutex::new(state),
            write_lock: Mutex::new(()),
        })
    }

    pub fn in_memory(path: impl Into<PathBuf>, state: BotState) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(state),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn lock(&self) -> MutexGuard<'_, BotState> {
        self.state.lock().await
    }

    /// Apply `f` under the lock, then persist.
    pub async fn update<R>(&self, f: impl FnOnce(&mut BotState) -> R) -> Result<R> {
        let _writing = self.write_lock.lock().await;
        let (out, txt) = {
            let mut guard = self.state.lock().await;
            let out = f(&mut guard);
            (out, serde_json::to_string_pretty(&*guard)?)
        };
        self.write(&txt).await?;
        Ok(out)
    }

    pub async fn save(&self) -> Result<()> {
        let _writing = self.write_lock.lock().await;
        let txt = {
            let guard = self.state.lock().await;
            serde_json::to_string_pretty(&*guard)?
        };
        self.write(&txt).await
    }

    async fn write(&self, txt: &str) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, txt).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::debug!(path = %self.path.display(), "state saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_path(name: &str) -> PathBuf {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("acb-{name}-{}-{ts}.json", std::process::id()))
    }

    #[test]
    fn missing_or_empty_file_is_default_state() {
        let path = temp_path("missing");
        assert_eq!(load_state(&path).unwrap(), BotState::default());

        std::fs::write(&path, "  \n").unwrap();
        assert_eq!(load_state(&path).unwrap(), BotState::default());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let path = temp_path("malformed");
        std::fs::write(&path, "{not json").unwrap();
        let err = load_state(&path).unwrap_err();
        assert!(matches!(err, Error::State { .. }));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn loads_legacy_layout_with_string_chat_keys() {
        let path = temp_path("legacy");
        std::fs::write(
            &path,
            r#"{
                "chat_accounting": {"-100": {"deposits": [], "withdrawals": [], "rate": 0.0, "fixed_rate": 7.0, "users": {}}},
                "group_operators": {"-100": ["alice"]},
                "authorized_groups": [-100]
            }"#,
        )
        .unwrap();
        let state = load_state(&path).unwrap();
        assert_eq!(state.ledger(ChatId(-100)).unwrap().fixed_rate, 7.0);
        assert!(state.operators(ChatId(-100)).unwrap().contains("alice"));
        assert!(state.is_chat_authorized(ChatId(-100)));
        assert!(state.last_reset_date.is_none());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn seeds_only_chats_without_operators() {
        let mut state = BotState::default();
        state.authorized_groups.extend([-1, -2]);
        state.operators_mut(ChatId(-2)).insert("kept".to_string());

        let seeded = state.seed_operators(&["root".to_string()]);
        assert_eq!(seeded, 1);
        assert!(state.operators(ChatId(-1)).unwrap().contains("root"));
        assert!(!state.operators(ChatId(-2)).unwrap().contains("root"));
    }

    #[tokio::test]
    async fn update_persists_and_reopens() {
        let path = temp_path("roundtrip");
        let store = StateStore::open(&path).unwrap();
        store
            .update(|s| {
                s.authorized_groups.insert(-5);
                s.ledger_mut(ChatId(-5)).set_fixed_rate(7.1);
            })
            .await
            .unwrap();

        let reopened = StateStore::open(&path).unwrap();
        let state = reopened.lock().await;
        assert!(state.is_chat_authorized(ChatId(-5)));
        assert_eq!(state.ledger(ChatId(-5)).unwrap().fixed_rate, 7.1);
        drop(state);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_updates_and_saves_all_persist() {
        let path = temp_path("concurrent");
        let store = std::sync::Arc::new(StateStore::open(&path).unwrap());

        let mut handles = Vec::new();
        for i in 0..200i64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                if i % 10 == 0 {
                    store.save().await?;
                }
                store
                    .update(move |s| {
                        s.authorized_groups.insert(-i - 1);
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let on_disk = load_state(&path).unwrap();
        assert_eq!(on_disk.authorized_groups.len(), 200);
        assert_eq!(on_disk, *store.lock().await);

        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        assert!(!PathBuf::from(tmp).exists());
        let _ = std::fs::remove_file(&path);
    }
}
