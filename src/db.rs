//! The persistence collaborator boundary.
//!
//! Connecting to an actual database happens outside this crate; what lives
//! here is the trait contract Script endpoints consume, the Lua bindings
//! that expose it as the `database` global, and the readiness gate the
//! startup sequence awaits once.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use mlua::{Table, UserData, UserDataMethods, Value};
use tokio::sync::oneshot;
use tracing::{error, warn};

/// A value crossing the persistence boundary, in either direction.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// A script object outside the scalar contract, passed through
    /// uninterpreted. The backend decides whether it can bind it.
    Opaque(Value),
}

/// One result row: column name to value, in result-set order.
pub type Row = Vec<(String, SqlValue)>;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct DbError(pub String);

/// A prepared statement handle.
pub trait Statement {
    /// Run a query; rows are ordered as produced by the backend.
    fn select(&mut self, params: &[SqlValue]) -> Result<Vec<Row>, DbError>;
    /// Run an update; returns the affected row count.
    fn update(&mut self, params: &[SqlValue]) -> Result<u64, DbError>;
}

pub trait Database {
    fn prepare(&self, sql: &str) -> Result<Box<dyn Statement>, DbError>;
}

/// The `database` global handed to scripts.
pub struct DatabaseHandle(pub Rc<dyn Database>);

impl UserData for DatabaseHandle {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        // Failures surface to scripts as nil, with the detail logged.
        methods.add_method("prepare", |_, this, sql: String| {
            match this.0.prepare(&sql) {
                Ok(statement) => Ok(Some(StatementHandle(RefCell::new(statement)))),
                Err(err) => {
                    error!(error = %err, sql, "could not prepare statement");
                    Ok(None)
                }
            }
        });
    }
}

pub struct StatementHandle(RefCell<Box<dyn Statement>>);

impl UserData for StatementHandle {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("select", |lua, this, params: Option<Table>| {
            let params = bind_params(params.as_ref())?;
            match this.0.borrow_mut().select(&params) {
                Ok(rows) => {
                    let data = lua.create_table()?;
                    for (index, row) in rows.iter().enumerate() {
                        let entry = lua.create_table()?;
                        for (column, value) in row {
                            entry.set(column.as_str(), sql_to_lua(lua, value)?)?;
                        }
                        data.set(index + 1, entry)?;
                    }
                    Ok(Value::Table(data))
                }
                Err(err) => {
                    error!(error = %err, "select failed");
                    Ok(Value::Nil)
                }
            }
        });

        methods.add_method("update", |_, this, params: Option<Table>| {
            let params = bind_params(params.as_ref())?;
            match this.0.borrow_mut().update(&params) {
                Ok(count) => Ok(Value::Integer(count as i64)),
                Err(err) => {
                    error!(error = %err, "update failed");
                    Ok(Value::Nil)
                }
            }
        });
    }
}

/// Positional parameter binding from a Lua table. Userdata objects pass
/// through as [`SqlValue::Opaque`]; anything else outside the contract is
/// logged and bound as null so the remaining parameters keep their
/// positions, which may fail the statement downstream.
fn bind_params(params: Option<&Table>) -> mlua::Result<Vec<SqlValue>> {
    let mut bound = Vec::new();
    if let Some(table) = params {
        for index in 1..=table.raw_len() {
            let value: Value = table.raw_get(index)?;
            bound.push(match value {
                Value::Nil => SqlValue::Null,
                Value::Boolean(b) => SqlValue::Bool(b),
                Value::Integer(i) => SqlValue::Int(i),
                Value::Number(n) => SqlValue::Float(n),
                Value::String(s) => SqlValue::Text(s.to_string_lossy().to_string()),
                Value::UserData(_) => SqlValue::Opaque(value),
                other => {
                    warn!(
                        kind = other.type_name(),
                        index, "unsupported prepared statement parameter type, bound as null"
                    );
                    SqlValue::Null
                }
            });
        }
    }
    Ok(bound)
}

fn sql_to_lua(lua: &mlua::Lua, value: &SqlValue) -> mlua::Result<Value> {
    Ok(match value {
        SqlValue::Null => Value::Nil,
        SqlValue::Bool(b) => Value::Boolean(*b),
        SqlValue::Int(i) => Value::Integer(*i),
        SqlValue::Float(f) => Value::Number(*f),
        SqlValue::Text(s) => Value::String(lua.create_string(s)?),
        SqlValue::Opaque(value) => value.clone(),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ReadinessError {
    #[error("readiness signal dropped before completion")]
    Abandoned,
    #[error("timed out waiting for readiness")]
    TimedOut,
}

/// The completion side of the readiness gate, handed to whatever connects
/// the database in the background.
pub struct ReadySignal(oneshot::Sender<()>);

impl ReadySignal {
    pub fn ready(self) {
        let _ = self.0.send(());
    }
}

/// The waiting side; awaited once by the startup sequence, with an explicit
/// timeout so a driver that never resolves cannot hang startup forever.
pub struct Readiness(oneshot::Receiver<()>);

impl Readiness {
    pub async fn wait(self, limit: Duration) -> Result<(), ReadinessError> {
        match tokio::time::timeout(limit, self.0).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ReadinessError::Abandoned),
            Err(_) => Err(ReadinessError::TimedOut),
        }
    }
}

pub fn readiness() -> (ReadySignal, Readiness) {
    let (tx, rx) = oneshot::channel();
    (ReadySignal(tx), Readiness(rx))
}
