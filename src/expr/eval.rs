use serde_json::{Map, Value};

use crate::error::{Result, SqlMapperError};

use super::parser::{CmpOp, Expr, PathSeg};

/// Name resolution scope: the local bindings map, falling back into the
/// `_parameter` object when a name is not bound locally.
pub struct Scope<'a> {
    bindings: &'a Map<String, Value>,
}

impl<'a> Scope<'a> {
    #[must_use]
    pub fn new(bindings: &'a Map<String, Value>) -> Self {
        Self { bindings }
    }

    fn lookup(&self, name: &str) -> Value {
        if let Some(v) = self.bindings.get(name) {
            return v.clone();
        }
        if let Some(param) = self.bindings.get(crate::scripting::PARAMETER_OBJECT_KEY) {
            if let Some(map) = param.as_object() {
                if let Some(v) = map.get(name) {
                    return v.clone();
                }
            }
        }
        Value::Null
    }
}

impl Expr {
    /// Evaluate against the scope, yielding a JSON value.
    pub fn eval(&self, scope: &Scope<'_>) -> Result<Value> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Path(segments) => Ok(eval_path(segments, scope)),
            Expr::Not(inner) => Ok(Value::Bool(!truthy(&inner.eval(scope)?))),
            Expr::And(l, r) => {
                if truthy(&l.eval(scope)?) {
                    Ok(Value::Bool(truthy(&r.eval(scope)?)))
                } else {
                    Ok(Value::Bool(false))
                }
            }
            Expr::Or(l, r) => {
                if truthy(&l.eval(scope)?) {
                    Ok(Value::Bool(true))
                } else {
                    Ok(Value::Bool(truthy(&r.eval(scope)?)))
                }
            }
            Expr::Cmp(op, l, r) => {
                let lv = l.eval(scope)?;
                let rv = r.eval(scope)?;
                compare(*op, &lv, &rv).map(Value::Bool)
            }
        }
    }

    /// Evaluate and reduce through truthiness.
    pub fn eval_bool(&self, scope: &Scope<'_>) -> Result<bool> {
        Ok(truthy(&self.eval(scope)?))
    }
}

fn eval_path(segments: &[PathSeg], scope: &Scope<'_>) -> Value {
    let mut iter = segments.iter();
    let mut current = match iter.next() {
        Some(PathSeg::Name(name)) => scope.lookup(name),
        _ => return Value::Null,
    };
    for segment in iter {
        current = match segment {
            PathSeg::Name(name) => match current.as_object() {
                Some(map) => map
                    .get(name)
                    .cloned()
                    .or_else(|| {
                        map.iter()
                            .find(|(k, _)| k.eq_ignore_ascii_case(name))
                            .map(|(_, v)| v.clone())
                    })
                    .unwrap_or(Value::Null),
                None => Value::Null,
            },
            PathSeg::Position(n) => current
                .as_array()
                .and_then(|a| a.get(*n))
                .cloned()
                .unwrap_or(Value::Null),
            PathSeg::Key(k) => current
                .as_object()
                .and_then(|m| m.get(k))
                .cloned()
                .unwrap_or(Value::Null),
        };
    }
    current
}

/// `null`, `false`, numeric zero and the empty string are false;
/// everything else is true.
#[must_use]
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool> {
    use std::cmp::Ordering;

    let ordering: Option<Ordering> = match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64(), b.as_f64());
            match (a, b) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            }
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    };

    match op {
        CmpOp::Eq => Ok(match ordering {
            Some(Ordering::Equal) => true,
            Some(_) => false,
            None => left == right,
        }),
        CmpOp::Ne => Ok(match ordering {
            Some(Ordering::Equal) => false,
            Some(_) => true,
            None => left != right,
        }),
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => match ordering {
            Some(ord) => Ok(match op {
                CmpOp::Lt => ord == Ordering::Less,
                CmpOp::Le => ord != Ordering::Greater,
                CmpOp::Gt => ord == Ordering::Greater,
                CmpOp::Ge => ord != Ordering::Less,
                _ => unreachable!(),
            }),
            None => Err(SqlMapperError::Expression(format!(
                "cannot order {left} against {right}"
            ))),
        },
    }
}
