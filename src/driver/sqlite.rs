use std::sync::Arc;

use rusqlite::types::{Value as SqliteValue, ValueRef};
use rusqlite::{Connection, ToSql};

use crate::error::{Result, SqlMapperError};
use crate::results::ResultSet;
use crate::types::DbValue;

use super::{
    ConnectionSpec, Driver, ExecuteResult, IsolationLevel, RawConnection, StatementSpec,
};

/// SQLite driver over rusqlite. The `url` of the connection spec is the
/// database path; `:memory:` and `file:` URIs work as rusqlite accepts
/// them.
pub struct SqliteDriver;

impl Driver for SqliteDriver {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn connect(&self, spec: &ConnectionSpec) -> Result<Box<dyn RawConnection>> {
        let conn = if spec.url == ":memory:" || spec.url.is_empty() {
            Connection::open_in_memory()?
        } else {
            Connection::open(&spec.url)?
        };
        if let Some(pragmas) = spec.properties.get("pragmas") {
            conn.execute_batch(pragmas)?;
        }
        Ok(Box::new(SqliteConnection {
            conn,
            desired_auto_commit: true,
        }))
    }
}

#[derive(Debug)]
pub struct SqliteConnection {
    conn: Connection,
    desired_auto_commit: bool,
}

impl SqliteConnection {
    fn apply_timeout(&self, stmt: &StatementSpec<'_>) -> Result<()> {
        if let Some(timeout) = stmt.timeout {
            self.conn.busy_timeout(timeout)?;
        }
        Ok(())
    }

    /// JDBC-style implicit transactions: with auto-commit off, a statement
    /// opens a transaction if none is active.
    fn ensure_transaction(&mut self) -> Result<()> {
        if !self.desired_auto_commit && self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }
}

fn to_sqlite_value(value: &DbValue) -> SqliteValue {
    match value {
        DbValue::Int(i) => SqliteValue::Integer(*i),
        DbValue::Float(f) => SqliteValue::Real(*f),
        DbValue::Text(s) => SqliteValue::Text(s.clone()),
        DbValue::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        DbValue::Timestamp(ts) => {
            SqliteValue::Text(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string())
        }
        DbValue::Null => SqliteValue::Null,
        DbValue::Blob(bytes) => SqliteValue::Blob(bytes.clone()),
    }
}

fn from_sqlite_value(value: ValueRef<'_>) -> DbValue {
    match value {
        ValueRef::Null => DbValue::Null,
        ValueRef::Integer(i) => DbValue::Int(i),
        ValueRef::Real(f) => DbValue::Float(f),
        ValueRef::Text(bytes) => DbValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => DbValue::Blob(bytes.to_vec()),
    }
}

fn build_result_set(stmt: &mut rusqlite::Statement<'_>, params: &[DbValue]) -> Result<ResultSet> {
    let values: Vec<SqliteValue> = params.iter().map(to_sqlite_value).collect();
    let param_refs: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();

    let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let column_count = column_names.len();

    let mut result_set = ResultSet::with_capacity(16);
    result_set.set_column_names(Arc::new(column_names));

    let mut rows = stmt.query(&param_refs[..])?;
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            let value = row
                .get_ref(i)
                .map_err(SqlMapperError::SqliteError)
                .map(from_sqlite_value)?;
            values.push(value);
        }
        result_set.push_values(values);
    }

    Ok(result_set)
}

impl RawConnection for SqliteConnection {
    fn query(&mut self, stmt: &StatementSpec<'_>, params: &[DbValue]) -> Result<ResultSet> {
        self.apply_timeout(stmt)?;
        self.ensure_transaction()?;
        if stmt.reuse {
            let mut prepared = self.conn.prepare_cached(stmt.sql)?;
            build_result_set(&mut prepared, params)
        } else {
            let mut prepared = self.conn.prepare(stmt.sql)?;
            build_result_set(&mut prepared, params)
        }
    }

    fn execute(&mut self, stmt: &StatementSpec<'_>, params: &[DbValue]) -> Result<ExecuteResult> {
        self.apply_timeout(stmt)?;
        self.ensure_transaction()?;
        let values: Vec<SqliteValue> = params.iter().map(to_sqlite_value).collect();
        let param_refs: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();
        let rows_affected = if stmt.reuse {
            let mut prepared = self.conn.prepare_cached(stmt.sql)?;
            prepared.execute(&param_refs[..])?
        } else {
            let mut prepared = self.conn.prepare(stmt.sql)?;
            prepared.execute(&param_refs[..])?
        };
        Ok(ExecuteResult {
            rows_affected: rows_affected as i64,
            generated_key: Some(DbValue::Int(self.conn.last_insert_rowid())),
        })
    }

    fn execute_script(&mut self, sql: &str) -> Result<()> {
        self.ensure_transaction()?;
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        if auto_commit && !self.conn.is_autocommit() {
            // Enabling auto-commit commits the open transaction.
            self.conn.execute_batch("COMMIT")?;
        }
        self.desired_auto_commit = auto_commit;
        Ok(())
    }

    fn is_auto_commit(&self) -> bool {
        self.desired_auto_commit
    }

    fn commit(&mut self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn set_isolation(&mut self, level: IsolationLevel) -> Result<()> {
        // SQLite serializes writers; only read-uncommitted is tunable.
        let read_uncommitted = matches!(level, IsolationLevel::ReadUncommitted);
        self.conn.pragma_update(
            None,
            "read_uncommitted",
            if read_uncommitted { "1" } else { "0" },
        )?;
        Ok(())
    }

    fn ping(&mut self, query: &str) -> Result<()> {
        let mut stmt = self.conn.prepare(query)?;
        let mut rows = stmt.query([])?;
        rows.next()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.rollback()
    }

    fn product_name(&self) -> String {
        "SQLite".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::lookup_driver;

    fn memory_conn() -> Box<dyn RawConnection> {
        let driver = lookup_driver("sqlite").unwrap();
        driver
            .connect(&ConnectionSpec {
                url: ":memory:".into(),
                ..ConnectionSpec::default()
            })
            .unwrap()
    }

    #[test]
    fn roundtrip_query_and_execute() {
        let mut conn = memory_conn();
        conn.execute_script("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();
        let result = conn
            .execute(
                &StatementSpec::prepared("INSERT INTO t (name) VALUES (?)"),
                &[DbValue::Text("ann".into())],
            )
            .unwrap();
        assert_eq!(result.rows_affected, 1);
        assert_eq!(result.generated_key, Some(DbValue::Int(1)));

        let rs = conn
            .query(
                &StatementSpec::prepared("SELECT id, name FROM t WHERE id = ?"),
                &[DbValue::Int(1)],
            )
            .unwrap();
        assert_eq!(rs.len(), 1);
        assert_eq!(rs.rows[0].get("name"), Some(&DbValue::Text("ann".into())));
    }

    #[test]
    fn manual_transaction_rolls_back() {
        let mut conn = memory_conn();
        conn.execute_script("CREATE TABLE t (id INTEGER)").unwrap();
        conn.set_auto_commit(false).unwrap();
        conn.execute(
            &StatementSpec::prepared("INSERT INTO t (id) VALUES (?)"),
            &[DbValue::Int(1)],
        )
        .unwrap();
        conn.rollback().unwrap();
        let rs = conn
            .query(&StatementSpec::prepared("SELECT COUNT(*) AS c FROM t"), &[])
            .unwrap();
        assert_eq!(rs.rows[0].get("c"), Some(&DbValue::Int(0)));
    }

    #[test]
    fn ping_fails_on_bad_query() {
        let mut conn = memory_conn();
        assert!(conn.ping("SELECT 1").is_ok());
        assert!(conn.ping("SELECT * FROM missing_table").is_err());
    }
}
