//! Environment configuration (`LL_*` variables, `.env` honoured).

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use ledgerlink_connectors::settings::{plaid_base_url, ConnectorSettings, ProviderKeys};
use ledgerlink_core::sync::Plan;
use ledgerlink_sync::SyncConfig;

const DEFAULT_DB_PATH: &str = "./data/ledgerlink.db";
const DEFAULT_SECRET_FILE: &str = "./data/secrets.json";
/// Scheduled syncs run every 4 hours unless overridden.
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 4 * 60 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub secret_file: String,
    pub secret_key: Option<String>,
    pub sync_interval: Duration,
    pub log_format: String,
    /// Tier applied to every account this worker syncs.
    pub plan: Plan,
    pub connectors: ConnectorSettings,
    pub sync: SyncConfig,
}

impl Config {
    pub fn from_env() -> Self {
        // A missing .env file is fine.
        let _ = dotenvy::dotenv();

        let mut connectors = ConnectorSettings {
            keys: ProviderKeys {
                alchemy: var("LL_ALCHEMY_API_KEY"),
                etherscan: var("LL_ETHERSCAN_API_KEY"),
                helius: var("LL_HELIUS_API_KEY"),
                tatum: var("LL_TATUM_API_KEY"),
                blockfrost: var("LL_BLOCKFROST_PROJECT_ID"),
                trongrid: var("LL_TRONGRID_API_KEY"),
            },
            ..ConnectorSettings::default()
        };
        if let Some(plaid_env) = var("LL_PLAID_ENV") {
            connectors.endpoints.plaid = plaid_base_url(&plaid_env).to_string();
        }
        if let Some(secs) = parsed::<u64>("LL_REQUEST_TIMEOUT_SECS") {
            connectors.request_timeout = Duration::from_secs(secs);
        }
        if let Some(size) = parsed::<u32>("LL_PAGE_SIZE") {
            connectors.page_size = size;
        }
        merge_spacing(&mut connectors.min_call_spacing, var("LL_MIN_CALL_SPACING_MS"));

        let mut sync = SyncConfig::default();
        if let Some(pages) = parsed::<usize>("LL_MAX_PAGES") {
            sync.max_pages = pages;
        }
        if let Some(cap) = parsed::<u32>("LL_BASIC_MANUAL_SYNCS_PER_DAY") {
            sync.policy.basic_manual_cap = cap;
        }

        Self {
            db_path: var("LL_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            secret_file: var("LL_SECRET_FILE").unwrap_or_else(|| DEFAULT_SECRET_FILE.to_string()),
            secret_key: var("LL_SECRET_KEY"),
            sync_interval: Duration::from_secs(
                parsed("LL_SYNC_INTERVAL_SECS").unwrap_or(DEFAULT_SYNC_INTERVAL_SECS),
            ),
            log_format: var("LL_LOG_FORMAT").unwrap_or_else(|| "text".to_string()),
            plan: parsed("LL_PLAN").unwrap_or(Plan::Premium),
            connectors,
            sync,
        }
    }
}

fn var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T: FromStr>(name: &str) -> Option<T> {
    let raw = var(name)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            eprintln!("Ignoring invalid {}={}", name, raw);
            None
        }
    }
}

/// `PROVIDER=millis,PROVIDER=millis` overrides on top of the defaults.
fn merge_spacing(spacing: &mut HashMap<String, Duration>, raw: Option<String>) {
    let Some(raw) = raw else {
        return;
    };
    for entry in raw.split(',') {
        if let Some((provider, millis)) = entry.split_once('=') {
            if let Ok(millis) = millis.trim().parse::<u64>() {
                spacing.insert(
                    provider.trim().to_ascii_uppercase(),
                    Duration::from_millis(millis),
                );
            }
        }
    }
}
