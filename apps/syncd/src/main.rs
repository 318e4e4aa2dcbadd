mod config;
mod main_lib;
mod progress;
mod scheduler;
mod secrets;

use anyhow::{bail, Context};
use config::Config;
use ledgerlink_sync::SyncRequest;
use main_lib::{build_state, init_tracing};

const USAGE: &str = "usage: ledgerlink-syncd [sync <account_id> [--initial]]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    init_tracing(&config);

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None => {
            let state = build_state(config).await?;
            tokio::select! {
                _ = scheduler::run_scheduler(state) => {}
                _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
            }
            Ok(())
        }
        Some("sync") => {
            let account_id = args.get(1).context(USAGE)?;
            let initial = args.iter().skip(2).any(|a| a == "--initial");
            let plan = config.plan;
            let state = build_state(config).await?;

            let report = state
                .sync_service
                .sync(SyncRequest::manual(account_id, plan, initial))
                .await
                .map_err(|e| anyhow::anyhow!("{} ({})", e.user_message(), e))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Some(other) => bail!("unknown command '{}'\n{}", other, USAGE),
    }
}
