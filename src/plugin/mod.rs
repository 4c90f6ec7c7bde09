//! Interceptors wrap execution-pipeline operations without dynamic
//! proxies: each registered extension declares the (target, method)
//! signatures it wants, and matching calls are routed through a typed
//! [`Invocation`] carrying a `proceed` continuation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::mapping::{BoundSql, MappedStatement};
use crate::session::RowBounds;

/// Which pipeline component a signature applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Executor,
    ParameterHandler,
    ResultSetHandler,
    StatementHandler,
}

/// One intercepted method: target component plus method name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub target: TargetKind,
    pub method: &'static str,
}

impl Signature {
    #[must_use]
    pub fn new(target: TargetKind, method: &'static str) -> Self {
        Self { target, method }
    }
}

/// The typed arguments of an intercepted call.
pub enum Call<'a> {
    ExecutorQuery {
        statement: &'a MappedStatement,
        parameter: &'a Value,
        bounds: RowBounds,
    },
    ExecutorUpdate {
        statement: &'a MappedStatement,
        parameter: &'a Value,
    },
    ExecutorCommit {
        required: bool,
    },
    ExecutorRollback {
        required: bool,
    },
    SetParameters {
        statement: &'a MappedStatement,
        bound_sql: &'a BoundSql,
    },
    HandleResultSets {
        statement: &'a MappedStatement,
        row_count: usize,
    },
    PrepareStatement {
        statement: &'a MappedStatement,
        sql: &'a str,
    },
}

impl Call<'_> {
    #[must_use]
    pub fn signature(&self) -> Signature {
        match self {
            Call::ExecutorQuery { .. } => Signature::new(TargetKind::Executor, "query"),
            Call::ExecutorUpdate { .. } => Signature::new(TargetKind::Executor, "update"),
            Call::ExecutorCommit { .. } => Signature::new(TargetKind::Executor, "commit"),
            Call::ExecutorRollback { .. } => Signature::new(TargetKind::Executor, "rollback"),
            Call::SetParameters { .. } => {
                Signature::new(TargetKind::ParameterHandler, "set_parameters")
            }
            Call::HandleResultSets { .. } => {
                Signature::new(TargetKind::ResultSetHandler, "handle_result_sets")
            }
            Call::PrepareStatement { .. } => {
                Signature::new(TargetKind::StatementHandler, "prepare")
            }
        }
    }
}

/// What an intercepted call produced.
#[derive(Debug, Clone)]
pub enum Outcome {
    Rows(Vec<Value>),
    Affected(i64),
    Unit,
}

impl Outcome {
    #[must_use]
    pub fn rows(self) -> Vec<Value> {
        match self {
            Outcome::Rows(rows) => rows,
            _ => Vec::new(),
        }
    }

    #[must_use]
    pub fn affected(&self) -> i64 {
        match self {
            Outcome::Affected(n) => *n,
            _ => 0,
        }
    }
}

/// The invocation value handed to an interceptor. `proceed` continues down
/// the chain and finally into the real operation.
pub struct Invocation<'a, 'b> {
    pub call: &'a Call<'b>,
    chain: &'a [Arc<dyn Interceptor>],
    terminal: &'a mut dyn FnMut(&Call<'b>) -> Result<Outcome>,
}

impl<'a, 'b> Invocation<'a, 'b> {
    pub fn proceed(self) -> Result<Outcome> {
        run_chain_inner(self.chain, self.call, self.terminal)
    }
}

/// A registered extension. `intercept` runs only for calls matching one of
/// the declared signatures; everything else bypasses it.
pub trait Interceptor: Send + Sync {
    fn signatures(&self) -> &[Signature];

    fn intercept(&self, invocation: Invocation<'_, '_>) -> Result<Outcome>;
}

impl fmt::Debug for dyn Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Interceptor({:?})", self.signatures())
    }
}

/// Builds interceptor instances from `<plugin>` properties.
pub type InterceptorFactory =
    Arc<dyn Fn(&HashMap<String, String>) -> Result<Arc<dyn Interceptor>> + Send + Sync>;

/// Run `call` through `interceptors` (first registered outermost) and then
/// the terminal operation.
pub fn run_chain(
    interceptors: &[Arc<dyn Interceptor>],
    call: &Call<'_>,
    terminal: &mut dyn FnMut(&Call<'_>) -> Result<Outcome>,
) -> Result<Outcome> {
    run_chain_inner(interceptors, call, terminal)
}

fn run_chain_inner<'b>(
    chain: &[Arc<dyn Interceptor>],
    call: &Call<'b>,
    terminal: &mut dyn FnMut(&Call<'b>) -> Result<Outcome>,
) -> Result<Outcome> {
    let signature = call.signature();
    for (i, interceptor) in chain.iter().enumerate() {
        if interceptor.signatures().contains(&signature) {
            let rest = &chain[i + 1..];
            return interceptor.intercept(Invocation {
                call,
                chain: rest,
                terminal,
            });
        }
    }
    terminal(call)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::StatementKind;
    use crate::scripting::SqlNode;
    use std::sync::Mutex;

    fn test_statement() -> Arc<MappedStatement> {
        let source = Arc::new(crate::scripting::DynamicSqlSource::new(SqlNode::StaticText(
            "SELECT 1".into(),
        )));
        MappedStatement::builder("ns.stmt", StatementKind::Select, source).build()
    }

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        signatures: Vec<Signature>,
    }

    impl Interceptor for Recorder {
        fn signatures(&self) -> &[Signature] {
            &self.signatures
        }

        fn intercept(&self, invocation: Invocation<'_, '_>) -> Result<Outcome> {
            self.log.lock().unwrap().push(self.name);
            invocation.proceed()
        }
    }

    #[test]
    fn first_registered_runs_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain: Vec<Arc<dyn Interceptor>> = vec![
            Arc::new(Recorder {
                name: "first",
                log: log.clone(),
                signatures: vec![Signature::new(TargetKind::Executor, "query")],
            }),
            Arc::new(Recorder {
                name: "second",
                log: log.clone(),
                signatures: vec![Signature::new(TargetKind::Executor, "query")],
            }),
        ];

        let statement = test_statement();
        let parameter = Value::Null;
        let call = Call::ExecutorQuery {
            statement: statement.as_ref(),
            parameter: &parameter,
            bounds: RowBounds::default(),
        };
        let mut terminal = |_: &Call<'_>| Ok(Outcome::Rows(vec![Value::from(1)]));
        let outcome = run_chain(&chain, &call, &mut terminal).unwrap();
        assert_eq!(outcome.rows().len(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn non_matching_signatures_are_skipped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain: Vec<Arc<dyn Interceptor>> = vec![Arc::new(Recorder {
            name: "updates-only",
            log: log.clone(),
            signatures: vec![Signature::new(TargetKind::Executor, "update")],
        })];

        let statement = test_statement();
        let parameter = Value::Null;
        let call = Call::ExecutorQuery {
            statement: statement.as_ref(),
            parameter: &parameter,
            bounds: RowBounds::default(),
        };
        let mut terminal = |_: &Call<'_>| Ok(Outcome::Rows(Vec::new()));
        run_chain(&chain, &call, &mut terminal).unwrap();
        assert!(log.lock().unwrap().is_empty());
    }
}
