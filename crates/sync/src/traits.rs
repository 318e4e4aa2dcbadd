//! Seams the orchestrator depends on.

use ledgerlink_connectors::{AccountContext, Connector, ConnectorFactory, Result};
use ledgerlink_core::accounts::AccountType;

/// Builds the connector for one sync.
pub trait ConnectorProvider: Send + Sync {
    fn build_connector(&self, kind: AccountType, context: AccountContext) -> Result<Connector>;
}

impl ConnectorProvider for ConnectorFactory {
    fn build_connector(&self, kind: AccountType, context: AccountContext) -> Result<Connector> {
        ConnectorFactory::build_connector(self, kind, context)
    }
}
