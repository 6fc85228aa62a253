//! Terminal progress reporting.

use std::sync::Mutex;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use community_migrate::Reporter;

/// Reporter that draws one progress bar per importer pass.
pub struct ConsoleReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn with_bar<F: FnOnce(&ProgressBar)>(&self, f: F) -> bool {
        match self.bar.lock() {
            Ok(guard) => match guard.as_ref() {
                Some(bar) => {
                    f(bar);
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }
}

impl Reporter for ConsoleReporter {
    fn info(&self, message: &str) {
        let line = format!("{} {}", style("→").cyan(), message);
        if !self.with_bar(|bar| bar.println(&line)) {
            println!("{}", line);
        }
    }

    fn error(&self, message: &str) {
        let line = format!("{} {}", style("✗").red(), message);
        if !self.with_bar(|bar| bar.println(&line)) {
            eprintln!("{}", line);
        }
    }

    fn progress(&self, total: u64) {
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(old) = guard.replace(bar) {
                old.finish_and_clear();
            }
        }
    }

    fn advance(&self) {
        self.with_bar(|bar| bar.inc(1));
    }

    fn finish(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(bar) = guard.take() {
                bar.finish_and_clear();
            }
        }
    }
}
