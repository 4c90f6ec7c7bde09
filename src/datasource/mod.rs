//! Data sources: the factory seam between environment configuration and
//! raw connections. `UNPOOLED` opens a fresh connection per request;
//! `POOLED` reuses, validates and reclaims connections under caps and
//! timeouts.

pub mod pooled;
pub mod unpooled;

pub use pooled::{PoolStatus, PooledDataSource};
pub use unpooled::UnpooledDataSource;

use std::collections::HashMap;
use std::sync::Arc;

use crate::driver::{lookup_driver, ConnectionSpec, RawConnection};
use crate::error::{Result, SqlMapperError};

/// A connection factory. Implementations are shared behind `Arc` and must
/// be safe to call from many threads.
pub trait DataSource: Send + Sync {
    fn get_connection(&self) -> Result<Box<dyn RawConnection>>;

    /// Hash of (url, username, password) expected on every pooled entry.
    fn type_code(&self) -> i64;
}

/// Build a data source from `<dataSource type=… >` configuration.
pub fn build_data_source(
    kind: &str,
    properties: &HashMap<String, String>,
) -> Result<Arc<dyn DataSource>> {
    let driver_name = properties
        .get("driver")
        .map(String::as_str)
        .unwrap_or("sqlite");
    let driver = lookup_driver(driver_name)?;
    let spec = ConnectionSpec {
        url: properties.get("url").cloned().unwrap_or_default(),
        username: properties.get("username").cloned().unwrap_or_default(),
        password: properties.get("password").cloned().unwrap_or_default(),
        properties: properties.clone(),
    };

    match kind.to_ascii_uppercase().as_str() {
        "UNPOOLED" => Ok(Arc::new(UnpooledDataSource::new(driver, spec))),
        "POOLED" => {
            let mut pool = PooledDataSource::new(driver, spec);
            pool.apply_properties(properties)?;
            Ok(Arc::new(pool))
        }
        other => Err(SqlMapperError::Config(format!(
            "unknown data source type '{other}'"
        ))),
    }
}
