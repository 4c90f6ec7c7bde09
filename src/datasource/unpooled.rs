use std::sync::Arc;

use crate::driver::{ConnectionSpec, Driver, RawConnection};
use crate::error::Result;

use super::DataSource;

/// Opens a fresh connection for every request; `close` goes straight to
/// the engine. The pooled variant borrows this shape for its real
/// connections.
pub struct UnpooledDataSource {
    driver: Arc<dyn Driver>,
    spec: ConnectionSpec,
}

impl UnpooledDataSource {
    #[must_use]
    pub fn new(driver: Arc<dyn Driver>, spec: ConnectionSpec) -> Self {
        Self { driver, spec }
    }

    #[must_use]
    pub fn spec(&self) -> &ConnectionSpec {
        &self.spec
    }

    pub(crate) fn open(&self) -> Result<Box<dyn RawConnection>> {
        self.driver.connect(&self.spec)
    }
}

impl DataSource for UnpooledDataSource {
    fn get_connection(&self) -> Result<Box<dyn RawConnection>> {
        self.open()
    }

    fn type_code(&self) -> i64 {
        self.spec.type_code()
    }
}
