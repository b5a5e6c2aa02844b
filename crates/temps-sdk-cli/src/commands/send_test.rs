use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Args;
use serde_json::json;
use temps_sdk::{
    classify_by_event_type, Capabilities, Client, ClientOptions, DropCounter, Environment,
    EventContext, Exception, SqliteOfflineStore,
};
use tracing::{info, warn};

/// Time given to beacon submissions to leave the process before exit
const BEACON_GRACE: Duration = Duration::from_millis(500);

#[derive(Args)]
pub struct SendTestCommand {
    /// Project DSN (https://PUBLIC_KEY@HOST/PROJECT_ID)
    #[arg(long, env = "TEMPS_DSN")]
    dsn: String,

    /// Actually deliver events; without it payloads are only logged
    #[arg(long)]
    production: bool,

    /// Use fire-and-forget beacon delivery instead of awaited requests
    #[arg(long)]
    beacon: bool,

    /// SQLite file for undelivered events
    #[arg(long, env = "TEMPS_OFFLINE_DB")]
    offline_db: Option<PathBuf>,

    /// Message of the test exception
    #[arg(long, default_value = "Test exception from temps-sdk CLI")]
    message: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 10)]
    timeout: u64,
}

impl SendTestCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.run())
    }

    async fn run(self) -> anyhow::Result<()> {
        let drops = DropCounter::new();
        let environment = if self.production {
            Environment::Production
        } else {
            Environment::Development
        };

        let mut options = ClientOptions::from_dsn(&self.dsn)?
            .with_environment(environment)
            .with_capabilities(Capabilities {
                beacon: self.beacon,
                response_required: false,
            })
            .with_request_timeout(Duration::from_secs(self.timeout))
            .with_category_classifier(classify_by_event_type)
            .with_drop_recorder(drops.recorder());
        if let Some(path) = &self.offline_db {
            options = options.with_offline_store(Arc::new(SqliteOfflineStore::open(path)?));
        }

        let client = Client::new(options)?;
        info!(
            "Sending test events to {} ({})",
            client.transport().destination(),
            environment
        );

        let started = Instant::now();
        let mut context = EventContext::new();
        context.insert("source".to_string(), json!("temps-sdk-cli"));
        client.capture_exception(Exception::new(self.message.clone()), Some(context.clone()));
        client.capture_performance(
            "cli.startup",
            started.elapsed().as_secs_f64() * 1000.0,
            Some(context),
        );

        if !client.flush().await {
            warn!("Transport stopped before all events were attempted");
        }
        if self.beacon && self.production {
            tokio::time::sleep(BEACON_GRACE).await;
        }

        let dropped = drops.snapshot();
        if dropped.is_empty() {
            info!("All events handed off without drops");
        } else {
            for (reason, category, count) in dropped {
                warn!("Dropped {} {} event(s): {}", count, category, reason);
            }
        }

        Ok(())
    }
}
