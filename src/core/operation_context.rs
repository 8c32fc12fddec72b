//! Operation-scoped message deduplication.
//!
//! Conflict reconciliation can report the same problem once per subpackage of
//! a dependency. An [`OperationContext`] lives for one update run and lets
//! callers emit each distinct warning or notice a single time.

use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct OperationContext {
    warned: Mutex<HashSet<String>>,
    informed: Mutex<HashSet<String>>,
}

impl OperationContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Log `message` at warn level unless it was already logged in this run.
    pub fn warn_once(&self, message: impl Into<String>) {
        let message = message.into();
        if Self::first_time(&self.warned, &message) {
            tracing::warn!("{}", message);
        }
    }

    /// Log `message` at info level unless it was already logged in this run.
    pub fn info_once(&self, message: impl Into<String>) {
        let message = message.into();
        if Self::first_time(&self.informed, &message) {
            tracing::info!("{}", message);
        }
    }

    pub fn warning_count(&self) -> usize {
        self.warned.lock().map(|set| set.len()).unwrap_or_default()
    }

    fn first_time(seen: &Mutex<HashSet<String>>, message: &str) -> bool {
        match seen.lock() {
            Ok(mut set) => set.insert(message.to_string()),
            // A poisoned set only costs a duplicate line
            Err(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warn_once_deduplicates() {
        let ctx = OperationContext::new();
        ctx.warn_once("Conflict: a");
        ctx.warn_once("Conflict: a");
        ctx.warn_once("Conflict: b");
        assert_eq!(ctx.warning_count(), 2);
    }

    #[test]
    fn test_info_does_not_count_as_warning() {
        let ctx = OperationContext::new();
        ctx.info_once("Keeping a 1.0.0");
        assert_eq!(ctx.warning_count(), 0);
    }
}
