use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use temps_sdk::offline::OfflineStore;
use temps_sdk::{Dsn, RequestStrategy, SqliteOfflineStore, Transport, TransportOptions};
use tracing::info;

#[derive(Args)]
pub struct ReplayCommand {
    /// Project DSN whose pending deliveries should be replayed
    #[arg(long, env = "TEMPS_DSN")]
    dsn: String,

    /// SQLite file holding undelivered events
    #[arg(long, env = "TEMPS_OFFLINE_DB")]
    offline_db: PathBuf,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 10)]
    timeout: u64,
}

impl ReplayCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.run())
    }

    async fn run(self) -> anyhow::Result<()> {
        let dsn = Dsn::parse(&self.dsn)?;
        let store = Arc::new(SqliteOfflineStore::open(&self.offline_db)?);

        let pending = store.list_pending().await?.len();
        info!("{} pending deliveries in {}", pending, self.offline_db.display());

        let make_request =
            RequestStrategy::Fetch.build(dsn.endpoint(), Duration::from_secs(self.timeout))?;
        let transport = Transport::new(
            TransportOptions::production().with_offline_store(store.clone()),
            make_request,
        )?;

        let replayed = transport.replay_offline().await;
        let remaining = store.list_pending().await?.len();
        info!("Replayed {} deliveries, {} still pending", replayed, remaining);

        Ok(())
    }
}
