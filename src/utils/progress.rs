//! Terminal progress for long fetch/export runs.
//!
//! The bar is hidden when `GROVE_NO_PROGRESS` is set, when output is quiet,
//! or when stderr is not a terminal.

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle};
use std::io::IsTerminal;

fn is_progress_disabled(quiet: bool) -> bool {
    quiet || std::env::var("GROVE_NO_PROGRESS").is_ok() || !std::io::stderr().is_terminal()
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸━")
}

/// A counting progress bar shared by the worker pool.
///
/// Cloning is cheap; all clones drive the same bar.
#[derive(Clone)]
pub struct ProgressBar {
    inner: IndicatifBar,
}

impl ProgressBar {
    pub fn new(len: u64, prefix: &str, quiet: bool) -> Self {
        let inner = if is_progress_disabled(quiet) {
            IndicatifBar::hidden()
        } else {
            let bar = IndicatifBar::new(len);
            bar.set_style(bar_style());
            bar.set_prefix(prefix.to_string());
            bar
        };
        Self { inner }
    }

    /// A bar that never draws.
    pub fn hidden() -> Self {
        Self {
            inner: IndicatifBar::hidden(),
        }
    }

    pub fn set_message(&self, msg: impl Into<String>) {
        self.inner.set_message(msg.into());
    }

    pub fn inc(&self, delta: u64) {
        self.inner.inc(delta);
    }

    pub fn position(&self) -> u64 {
        self.inner.position()
    }

    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_bar_still_counts() {
        let bar = ProgressBar::new(3, "Fetching", true);
        bar.inc(1);
        bar.clone().inc(1);
        assert_eq!(bar.position(), 2);
        bar.finish_and_clear();
    }
}
