//! The shared message sink.
//!
//! Stages never print and never return user errors as panics: they append a
//! [`CompilationError`] to [`Diagnostics`] and fail the current node. The
//! sink serializes appends so functions compiled on different threads can
//! share one instance through an `Arc`.

use std::fmt;

use parking_lot::Mutex;

use crate::error::{CompilationError, Severity};

/// Accumulates errors and warnings in the order they were reported.
#[derive(Default)]
pub struct Diagnostics {
    messages: Mutex<Vec<CompilationError>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message.
    pub fn add(&self, error: CompilationError) {
        match error.severity() {
            Severity::Error => tracing::warn!(at = %error.span(), "{error}"),
            Severity::Warning => tracing::debug!(at = %error.span(), "{error}"),
        }
        self.messages.lock().push(error);
    }

    /// Append a message if `result` holds one; returns the success value.
    pub fn report<T>(&self, result: Result<T, CompilationError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.add(error);
                None
            }
        }
    }

    pub fn has_errors(&self) -> bool {
        self.messages.lock().iter().any(CompilationError::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.count_where(CompilationError::is_error)
    }

    pub fn warning_count(&self) -> usize {
        self.count_where(|m| m.severity() == Severity::Warning)
    }

    pub fn count_where(&self, predicate: impl Fn(&CompilationError) -> bool) -> usize {
        self.messages.lock().iter().filter(|m| predicate(m)).count()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    /// A copy of every message reported so far.
    pub fn messages(&self) -> Vec<CompilationError> {
        self.messages.lock().clone()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.messages.lock().iter()).finish()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for message in self.messages.lock().iter() {
            let kind = match message.severity() {
                Severity::Error => "error",
                Severity::Warning => "warning",
            };
            writeln!(f, "{kind}: {message}")?;
        }
        Ok(())
    }
}
