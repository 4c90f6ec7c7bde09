//! Scoped connection lifecycle and the commit/rollback contract.
//!
//! `Managed` transactions drive commit/rollback on the connection; the
//! externally-managed variant leaves both to the surrounding container.
//! Both acquire the connection lazily on first use and close only when
//! told, never on error paths.

use std::sync::Arc;
use std::time::Duration;

use crate::datasource::DataSource;
use crate::driver::{IsolationLevel, RawConnection};
use crate::error::Result;

pub trait Transaction: Send {
    /// The connection, opened on first call.
    fn connection(&mut self) -> Result<&mut dyn RawConnection>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    /// Optional driver-level timeout for statements on this transaction.
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

/// Which transaction flavor an environment uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionManagerKind {
    /// Driver-managed commit/rollback (`JDBC` in configuration files).
    Managed,
    /// Container-managed; commit/rollback are no-ops (`MANAGED`).
    External,
}

impl TransactionManagerKind {
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "JDBC" | "MANAGED_CONNECTION" => Some(Self::Managed),
            "MANAGED" | "EXTERNAL" => Some(Self::External),
            _ => None,
        }
    }

    #[must_use]
    pub fn new_transaction(
        &self,
        data_source: Arc<dyn DataSource>,
        isolation: Option<IsolationLevel>,
        auto_commit: bool,
    ) -> Box<dyn Transaction> {
        match self {
            Self::Managed => Box::new(ManagedTransaction {
                data_source,
                connection: None,
                isolation,
                auto_commit,
            }),
            Self::External => Box::new(ExternalTransaction {
                data_source,
                connection: None,
                isolation,
                close_connection: true,
            }),
        }
    }
}

/// Commit and rollback delegate to the connection; close returns it to
/// its source (the pool proxy handles the actual return).
pub struct ManagedTransaction {
    data_source: Arc<dyn DataSource>,
    connection: Option<Box<dyn RawConnection>>,
    isolation: Option<IsolationLevel>,
    auto_commit: bool,
}

impl ManagedTransaction {
    #[must_use]
    pub fn new(
        data_source: Arc<dyn DataSource>,
        isolation: Option<IsolationLevel>,
        auto_commit: bool,
    ) -> Self {
        Self {
            data_source,
            connection: None,
            isolation,
            auto_commit,
        }
    }

    fn open_connection(&mut self) -> Result<()> {
        tracing::debug!("opening connection for managed transaction");
        let mut conn = self.data_source.get_connection()?;
        if let Some(level) = self.isolation {
            conn.set_isolation(level)?;
        }
        conn.set_auto_commit(self.auto_commit)?;
        self.connection = Some(conn);
        Ok(())
    }
}

impl Transaction for ManagedTransaction {
    fn connection(&mut self) -> Result<&mut dyn RawConnection> {
        if self.connection.is_none() {
            self.open_connection()?;
        }
        Ok(self
            .connection
            .as_mut()
            .expect("connection opened above")
            .as_mut())
    }

    fn commit(&mut self) -> Result<()> {
        if let Some(conn) = self.connection.as_mut() {
            if !conn.is_auto_commit() {
                tracing::debug!("committing managed transaction");
                conn.commit()?;
            }
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if let Some(conn) = self.connection.as_mut() {
            if !conn.is_auto_commit() {
                tracing::debug!("rolling back managed transaction");
                conn.rollback()?;
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut conn) = self.connection.take() {
            // Reset so the pooled connection returns in auto-commit state.
            let _ = conn.set_auto_commit(true);
            conn.close()?;
        }
        Ok(())
    }
}

/// The container owns the transaction boundary; commit and rollback do
/// nothing here.
pub struct ExternalTransaction {
    data_source: Arc<dyn DataSource>,
    connection: Option<Box<dyn RawConnection>>,
    isolation: Option<IsolationLevel>,
    close_connection: bool,
}

impl ExternalTransaction {
    #[must_use]
    pub fn new(
        data_source: Arc<dyn DataSource>,
        isolation: Option<IsolationLevel>,
        close_connection: bool,
    ) -> Self {
        Self {
            data_source,
            connection: None,
            isolation,
            close_connection,
        }
    }
}

impl Transaction for ExternalTransaction {
    fn connection(&mut self) -> Result<&mut dyn RawConnection> {
        if self.connection.is_none() {
            tracing::debug!("opening connection for externally managed transaction");
            let mut conn = self.data_source.get_connection()?;
            if let Some(level) = self.isolation {
                conn.set_isolation(level)?;
            }
            self.connection = Some(conn);
        }
        Ok(self
            .connection
            .as_mut()
            .expect("connection opened above")
            .as_mut())
    }

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.close_connection {
            if let Some(mut conn) = self.connection.take() {
                conn.close()?;
            }
        }
        Ok(())
    }
}
