use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use acb_core::{
    bot::AccountingBot, config::Config, messaging::port::MessagingPort,
    scheduler::RolloverScheduler, store::StateStore,
};

use crate::handlers::{self, ChatLocks};
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub bot: Arc<AccountingBot>,
    pub messenger: Arc<dyn MessagingPort>,
    pub chat_locks: Arc<ChatLocks>,
}

pub async fn run_polling(cfg: Arc<Config>, store: Arc<StateStore>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.bot_token.clone());

    let username = match bot.get_me().await {
        Ok(me) => {
            tracing::info!(username = %me.username(), "acb started");
            Some(me.username().to_string())
        }
        Err(e) => {
            tracing::warn!(error = %e, "get_me failed; group mentions will not be stripped");
            None
        }
    };
    tracing::info!(
        data_file = %cfg.data_file.display(),
        admins = cfg.admin_user_ids.len(),
        utc_offset_secs = cfg.timezone.local_minus_utc(),
        "configuration loaded"
    );

    let initial = cfg.initial_operators.clone();
    let seeded = store.update(move |s| s.seed_operators(&initial)).await?;
    if seeded > 0 {
        tracing::info!(groups = seeded, "seeded initial operators");
    }
    store.save().await?;

    let scheduler = RolloverScheduler::new(cfg.clone(), store.clone());
    scheduler.start().await;

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let accounting = Arc::new(
        AccountingBot::new(cfg.clone(), store.clone(), messenger.clone()).with_bot_username(username),
    );

    let state = Arc::new(AppState {
        bot: accounting,
        messenger,
        chat_locks: Arc::new(ChatLocks::default()),
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    tracing::info!("dispatcher stopped, saving state");
    scheduler.stop().await;
    store.save().await?;
    Ok(())
}
