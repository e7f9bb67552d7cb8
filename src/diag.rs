//! Diagnostics: the error type every pass reports through, and a small
//! context object the front end threads explicitly (current source
//! location, running error count) rather than reaching for a process-global
//! logger or panic handler.

use std::fmt;
use thiserror::Error;

/// A compile-time source location, as the front end would attach to an
/// instruction when it's built. Not produced by anything in this crate
/// (there is no front end here), but plumbed through so translation code can
/// decorate diagnostics with it when one is available.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SourceLoc {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The three kinds of failure a pass can report:
///
/// - a *user error*: something wrong with the input program (duplicate
///   symbol, unsatisfiable register pin). Reporting one does not stop the
///   pass immediately — more may be found in the same walk — but the pass
///   aborts once it reaches its end if any were recorded.
/// - a *translation failure*: the program cannot be lowered as given (an
///   unresolved branch target, an instruction with no legal encoding). Fatal
///   immediately.
/// - an *internal* invariant violation: a bug in this crate, not the input.
///   Fatal immediately.
#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("{count} error(s) found")]
    UserErrors { count: usize },

    #[error("{0}")]
    TranslationFailure(String),

    #[error("internal invariant violation: {0}")]
    Internal(String),
}

/// Threaded explicitly through translation: the current source location
/// (for decorating comments/diagnostics) and a running count of user errors
/// reported so far. A pass that records at least one user error should stop
/// producing further output and return `CodegenError::UserErrors` once it's
/// done walking the program, rather than bailing out on the first one.
#[derive(Default)]
pub struct Diagnostics {
    here: SourceLoc,
    error_count: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_location(&mut self, loc: SourceLoc) {
        self.here = loc;
    }

    pub fn here(&self) -> SourceLoc {
        self.here
    }

    /// Record a user error and log it at `error` level. Does not abort by
    /// itself; call `finish` once the pass has walked everything it's going
    /// to.
    pub fn report_user_error(&mut self, message: &str) {
        self.error_count += 1;
        log::error!("{}: {}", self.here, message);
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Turn an accumulated error count into a result: `Ok(())` if none were
    /// recorded, `Err(CodegenError::UserErrors)` otherwise.
    pub fn finish(&self) -> Result<(), CodegenError> {
        if self.error_count == 0 {
            Ok(())
        } else {
            Err(CodegenError::UserErrors { count: self.error_count })
        }
    }

    /// Format a comment decorating an instruction built at the current
    /// location, for `Program::append_instruction`'s `comment` parameter.
    pub fn location_comment(&self) -> String {
        format!("@ {}", self.here)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_is_ok_with_no_errors() {
        let diag = Diagnostics::new();
        assert!(diag.finish().is_ok());
    }

    #[test]
    fn finish_reports_accumulated_count() {
        let mut diag = Diagnostics::new();
        diag.report_user_error("duplicate symbol `x`");
        diag.report_user_error("duplicate symbol `y`");
        match diag.finish() {
            Err(CodegenError::UserErrors { count }) => assert_eq!(count, 2),
            other => panic!("expected UserErrors, got {:?}", other),
        }
    }
}
