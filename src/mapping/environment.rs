use std::collections::HashMap;
use std::sync::Arc;

use crate::datasource::DataSource;
use crate::error::Result;
use crate::transaction::TransactionManagerKind;

/// One `<environment>`: a transaction factory plus a data source.
/// Exactly one environment is active per configuration.
#[derive(Clone)]
pub struct Environment {
    pub id: String,
    pub transaction_manager: TransactionManagerKind,
    pub data_source: Arc<dyn DataSource>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("id", &self.id)
            .field("transaction_manager", &self.transaction_manager)
            .finish()
    }
}

impl Environment {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        transaction_manager: TransactionManagerKind,
        data_source: Arc<dyn DataSource>,
    ) -> Self {
        Self {
            id: id.into(),
            transaction_manager,
            data_source,
        }
    }
}

/// Maps vendor product strings to the short ids statements discriminate
/// on (`databaseId="sqlite"`).
#[derive(Debug, Clone, Default)]
pub struct DatabaseIdProvider {
    /// Product name (or prefix) → short id.
    aliases: HashMap<String, String>,
}

impl DatabaseIdProvider {
    #[must_use]
    pub fn new(aliases: HashMap<String, String>) -> Self {
        Self { aliases }
    }

    /// Resolve the short id by probing a live connection's product name.
    pub fn database_id(&self, data_source: &dyn DataSource) -> Result<Option<String>> {
        let mut conn = data_source.get_connection()?;
        let product = conn.product_name();
        let _ = conn.close();
        if let Some(short) = self.aliases.get(&product) {
            return Ok(Some(short.clone()));
        }
        // Prefix match tolerates versioned product strings.
        for (name, short) in &self.aliases {
            if product.starts_with(name.as_str()) {
                return Ok(Some(short.clone()));
            }
        }
        Ok(Some(product.to_lowercase()))
    }
}
