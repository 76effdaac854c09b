use std::sync::Arc;

use acb_core::{config::Config, store::StateStore};

#[tokio::main]
async fn main() -> Result<(), acb_core::Error> {
    acb_core::logging::init("acb")?;

    let cfg = Arc::new(Config::load()?);
    let store = Arc::new(StateStore::open(cfg.data_file.clone())?);

    acb_telegram::router::run_polling(cfg, store)
        .await
        .map_err(|e| acb_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
