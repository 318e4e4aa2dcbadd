use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use ledgerlink_connectors::ConnectorFactory;
use ledgerlink_core::{
    accounts::AccountRepositoryTrait, categories::CategoryService, ledger::LedgerService,
};
use ledgerlink_storage_sqlite::{
    accounts::AccountRepository, categories::CategoryRuleRepository, db, ledger::LedgerRepository,
    sync::SyncAuditRepository,
};
use ledgerlink_sync::SyncService;

use crate::config::Config;
use crate::progress::LogProgressReporter;
use crate::secrets::FileSecretStore;

pub struct AppState {
    pub accounts: Arc<dyn AccountRepositoryTrait>,
    pub sync_service: SyncService<LogProgressReporter>,
    pub config: Config,
}

pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if config.log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

pub async fn build_state(config: Config) -> anyhow::Result<Arc<AppState>> {
    let db_path = db::init(&config.db_path)?;
    let pool = db::create_pool(&db_path)?;
    db::run_migrations(&pool)?;
    let writer = db::spawn_writer((*pool).clone());

    let accounts: Arc<dyn AccountRepositoryTrait> =
        Arc::new(AccountRepository::new(pool.clone(), writer.clone()));
    let categories = Arc::new(CategoryService::new(Arc::new(CategoryRuleRepository::new(
        pool.clone(),
        writer.clone(),
    ))));
    let ledger = Arc::new(LedgerService::new(
        Arc::new(LedgerRepository::new(pool.clone(), writer)),
        categories,
    ));
    let audit = Arc::new(SyncAuditRepository::new(pool));
    let secrets = Arc::new(FileSecretStore::new(
        PathBuf::from(&config.secret_file),
        config.secret_key.as_deref(),
    )?);
    let connectors = Arc::new(ConnectorFactory::new(config.connectors.clone()));

    let sync_service = SyncService::new(
        accounts.clone(),
        audit,
        ledger,
        secrets,
        connectors,
        Arc::new(LogProgressReporter),
        config.sync.clone(),
    );

    Ok(Arc::new(AppState {
        accounts,
        sync_service,
        config,
    }))
}
