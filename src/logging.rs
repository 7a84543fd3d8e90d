//! Minimal stderr logger threaded through the pipeline as an explicit value.

use std::fmt::Display;

#[derive(Clone, Debug)]
pub struct Logger {
    verbose: u8,
    quiet: bool,
    scope: Option<String>,
}

impl Logger {
    pub fn new(verbose: u8, quiet: bool) -> Self {
        Self {
            verbose,
            quiet,
            scope: None,
        }
    }

    /// Returns a copy of this logger that prefixes every line with a scope,
    /// used to attribute output to one deployment target.
    pub fn scoped(&self, scope: impl Into<String>) -> Self {
        Self {
            verbose: self.verbose,
            quiet: self.quiet,
            scope: Some(scope.into()),
        }
    }

    pub fn info(&self, message: impl Display) {
        if !self.quiet {
            match &self.scope {
                Some(scope) => eprintln!("[{scope}] {message}"),
                None => eprintln!("{message}"),
            }
        }
    }

    pub fn verbose(&self, level: u8, message: impl Display) {
        if self.verbose >= level {
            self.info(message);
        }
    }

    pub fn quiet(&self) -> bool {
        self.quiet
    }

    pub fn level(&self) -> u8 {
        self.verbose
    }
}
