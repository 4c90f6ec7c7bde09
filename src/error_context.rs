//! Thread-local breadcrumbs attached to runtime errors.
//!
//! Builders and executors record where they are (`resource`, `activity`,
//! `object`, `sql`) as work proceeds; when an error surfaces, the current
//! breadcrumb is rendered into the stable multi-line diagnostic appended to
//! the error message. `store`/`recall` give a push/pop discipline for
//! nested operations such as select-key statements.

use std::cell::RefCell;
use std::fmt;

thread_local! {
    static CONTEXT: RefCell<Vec<ErrorContext>> = RefCell::new(vec![ErrorContext::default()]);
}

#[derive(Debug, Default, Clone)]
pub struct ErrorContext {
    pub resource: Option<String>,
    pub activity: Option<String>,
    pub object: Option<String>,
    pub message: Option<String>,
    pub sql: Option<String>,
    pub cause: Option<String>,
}

impl ErrorContext {
    /// Mutate the innermost context for this thread.
    pub fn with<F: FnOnce(&mut ErrorContext)>(f: F) {
        CONTEXT.with(|c| {
            let mut stack = c.borrow_mut();
            if let Some(top) = stack.last_mut() {
                f(top);
            }
        });
    }

    pub fn resource(value: impl Into<String>) {
        Self::with(|c| c.resource = Some(value.into()));
    }

    pub fn activity(value: impl Into<String>) {
        Self::with(|c| c.activity = Some(value.into()));
    }

    pub fn object(value: impl Into<String>) {
        Self::with(|c| c.object = Some(value.into()));
    }

    pub fn sql(value: impl Into<String>) {
        Self::with(|c| c.sql = Some(value.into()));
    }

    /// Push a fresh context, parking the current one; pairs with [`ErrorContext::recall`].
    pub fn store() {
        CONTEXT.with(|c| c.borrow_mut().push(ErrorContext::default()));
    }

    /// Pop back to the parked context. A lone context is left in place.
    pub fn recall() {
        CONTEXT.with(|c| {
            let mut stack = c.borrow_mut();
            if stack.len() > 1 {
                stack.pop();
            }
        });
    }

    /// Clear everything recorded on this thread. Called at session boundaries.
    pub fn reset() {
        CONTEXT.with(|c| {
            let mut stack = c.borrow_mut();
            stack.clear();
            stack.push(ErrorContext::default());
        });
    }

    /// Render `message` with the current breadcrumb appended.
    #[must_use]
    pub fn current_message(message: &str) -> String {
        CONTEXT.with(|c| {
            let stack = c.borrow();
            match stack.last() {
                Some(ctx) if !ctx.is_empty() => format!("{message}\n{ctx}"),
                _ => message.to_string(),
            }
        })
    }

    fn is_empty(&self) -> bool {
        self.resource.is_none()
            && self.activity.is_none()
            && self.object.is_none()
            && self.message.is_none()
            && self.sql.is_none()
            && self.cause.is_none()
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(message) = &self.message {
            writeln!(f, "### {message}")?;
        }
        if let Some(resource) = &self.resource {
            writeln!(f, "### The error may exist in {resource}")?;
        }
        if let Some(object) = &self.object {
            writeln!(f, "### The error may involve {object}")?;
        }
        if let Some(activity) = &self.activity {
            writeln!(f, "### The error occurred while {activity}")?;
        }
        if let Some(sql) = &self.sql {
            let flattened = sql
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(f, "### SQL: {flattened}")?;
        }
        if let Some(cause) = &self.cause {
            writeln!(f, "### Cause: {cause}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_breadcrumb_lines() {
        ErrorContext::reset();
        ErrorContext::resource("mapper/UserMapper.xml");
        ErrorContext::activity("executing a query");
        ErrorContext::sql("SELECT *\n   FROM users");
        let msg = ErrorContext::current_message("boom");
        assert!(msg.starts_with("boom\n"));
        assert!(msg.contains("### The error may exist in mapper/UserMapper.xml"));
        assert!(msg.contains("### SQL: SELECT * FROM users"));
        ErrorContext::reset();
    }

    #[test]
    fn store_and_recall_nest() {
        ErrorContext::reset();
        ErrorContext::resource("outer.xml");
        ErrorContext::store();
        ErrorContext::resource("inner.xml");
        assert!(ErrorContext::current_message("x").contains("inner.xml"));
        ErrorContext::recall();
        assert!(ErrorContext::current_message("x").contains("outer.xml"));
        ErrorContext::reset();
    }
}
