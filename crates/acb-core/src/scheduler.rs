//! Background jobs: the daily rollover and the periodic save.
//!
//! Both run as tokio tasks on fixed intervals and stop on a shared
//! cancellation token. The rollover itself is a pure function over
//! [`BotState`] so it can be tested without timers.

use std::{sync::Arc, time::Duration};

use chrono::NaiveDate;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{config::Config, ledger::DATE_FORMAT, store::BotState, store::StateStore, Result};

const FIRST_SAVE_DELAY: Duration = Duration::from_secs(60);

/// What one rollover check did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RolloverOutcome {
    /// The date the active records were archived under, if the day changed.
    pub rolled_from: Option<String>,
    /// Chats that got a new snapshot.
    pub archived_chats: usize,
    pub pruned_snapshots: usize,
}

impl RolloverOutcome {
    pub fn changed_anything(&self) -> bool {
        self.rolled_from.is_some() || self.pruned_snapshots > 0
    }
}

/// Archive yesterday's books once the calendar day changes, then prune old snapshots.
///
/// The very first check only records `today`: there is no earlier day to
/// archive under yet.
pub fn apply_rollover(state: &mut BotState, today: NaiveDate, retention_days: i64) -> RolloverOutcome {
    let today_str = today.format(DATE_FORMAT).to_string();
    let mut outcome = RolloverOutcome::default();

    let Some(last) = state.last_reset_date.clone() else {
        tracing::info!(date = %today_str, "first rollover check, recording date");
        state.last_reset_date = Some(today_str);
        return outcome;
    };

    if last != today_str {
        for (chat_id, ledger) in state.chat_accounting.iter_mut() {
            if ledger.roll_over(&last) {
                tracing::info!(chat_id, date = %last, "archived daily records");
                outcome.archived_chats += 1;
            }
        }
        state.last_reset_date = Some(today_str);
        outcome.rolled_from = Some(last);
    }

    // A window reaching past the earliest representable date keeps everything.
    let Some(cutoff) = chrono::Duration::try_days(retention_days)
        .and_then(|window| today.checked_sub_signed(window))
        .map(|d| d.format(DATE_FORMAT).to_string())
    else {
        return outcome;
    };
    for ledger in state.chat_accounting.values_mut() {
        outcome.pruned_snapshots += ledger.prune_history(&cutoff);
    }
    if outcome.pruned_snapshots > 0 {
        tracing::info!(
            cutoff = %cutoff,
            pruned = outcome.pruned_snapshots,
            "pruned old snapshots"
        );
    }
    outcome
}

#[derive(Clone)]
pub struct RolloverScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    cfg: Arc<Config>,
    store: Arc<StateStore>,
    state: tokio::sync::Mutex<SchedulerState>,
}

#[derive(Default)]
struct SchedulerState {
    jobs: Vec<JobEntry>,
}

struct JobEntry {
    name: &'static str,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RolloverScheduler {
    pub fn new(cfg: Arc<Config>, store: Arc<StateStore>) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                cfg,
                store,
                state: tokio::sync::Mutex::new(SchedulerState::default()),
            }),
        }
    }

    /// Spawn the rollover check (first run immediately) and the periodic save.
    pub async fn start(&self) {
        self.stop().await;

        let rollover = self.spawn_rollover_loop();
        let save = self.spawn_save_loop();

        let mut st = self.inner.state.lock().await;
        st.jobs.push(rollover);
        st.jobs.push(save);
        tracing::info!(
            reset_check_secs = self.inner.cfg.reset_check_interval.as_secs(),
            save_secs = self.inner.cfg.save_interval.as_secs(),
            "scheduler started"
        );
    }

    pub async fn stop(&self) {
        let mut st = self.inner.state.lock().await;
        for job in st.jobs.drain(..) {
            job.cancel.cancel();
            job.handle.abort();
            tracing::debug!(job = job.name, "scheduler job stopped");
        }
    }

    /// Run one rollover check now and persist the result.
    pub async fn check_now(&self) -> Result<RolloverOutcome> {
        run_check(&self.inner).await
    }

    fn spawn_rollover_loop(&self) -> JobEntry {
        let cancel = CancellationToken::new();
        let tok = cancel.clone();
        let inner = self.inner.clone();

        let handle = tokio::spawn(async move {
            let mut tick = interval(inner.cfg.reset_check_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tok.cancelled() => break,
                    _ = tick.tick() => {
                        if let Err(e) = run_check(&inner).await {
                            tracing::error!("rollover check failed: {e}");
                        }
                    }
                }
            }
        });

        JobEntry {
            name: "rollover",
            cancel,
            handle,
        }
    }

    fn spawn_save_loop(&self) -> JobEntry {
        let cancel = CancellationToken::new();
        let tok = cancel.clone();
        let inner = self.inner.clone();

        let handle = tokio::spawn(async move {
            let period = inner.cfg.save_interval;
            let mut tick = interval_at(Instant::now() + FIRST_SAVE_DELAY, period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tok.cancelled() => break,
                    _ = tick.tick() => {
                        match inner.store.save().await {
                            Ok(()) => tracing::debug!("periodic save done"),
                            Err(e) => tracing::error!("periodic save failed: {e}"),
                        }
                    }
                }
            }
        });

        JobEntry {
            name: "save",
            cancel,
            handle,
        }
    }
}

async fn run_check(inner: &SchedulerInner) -> Result<RolloverOutcome> {
    let today = inner.cfg.now().date();
    let retention = inner.cfg.history_retention_days;
    let outcome = inner
        .store
        .update(|state| apply_rollover(state, today, retention))
        .await?;
    if outcome.changed_anything() {
        tracing::info!(
            from = ?outcome.rolled_from,
            archived = outcome.archived_chats,
            pruned = outcome.pruned_snapshots,
            "daily rollover done"
        );
    }
    Ok(outcome)
}
