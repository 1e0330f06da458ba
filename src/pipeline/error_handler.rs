//! Shader compile error reporting.

use std::fmt::Write as _;

/// Receives shader translation, validation and driver compile failures.
///
/// Handlers must be `Send + Sync`; they are shared between contexts through
/// [`ContextOptions`](crate::ContextOptions).
pub trait ShaderErrorHandler: Send + Sync {
    /// `source` is the full shader text, `errors` the compiler diagnostics.
    fn handle_compile_error(&self, source: &str, errors: &str);
}

impl<F> ShaderErrorHandler for F
where
    F: Fn(&str, &str) + Send + Sync,
{
    fn handle_compile_error(&self, source: &str, errors: &str) {
        self(source, errors)
    }
}

/// Format `source` with 1-based line numbers, one line per row.
pub fn numbered_source(source: &str) -> String {
    let mut out = String::with_capacity(source.len() + source.len() / 8);
    for (i, line) in source.lines().enumerate() {
        let _ = writeln!(out, "{:>4}\t{}", i + 1, line);
    }
    out
}

fn report(source: &str, errors: &str) {
    log::error!(
        "Shader compilation error\n{}\n{}Errors:\n{}",
        "-".repeat(48),
        numbered_source(source),
        errors
    );
}

/// Logs the numbered source and diagnostics, then fails a debug assertion.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultShaderErrorHandler;

impl ShaderErrorHandler for DefaultShaderErrorHandler {
    fn handle_compile_error(&self, source: &str, errors: &str) {
        report(source, errors);
        debug_assert!(false, "shader compilation failed: {errors}");
    }
}

/// Logs like [`DefaultShaderErrorHandler`] but never asserts.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingShaderErrorHandler;

impl ShaderErrorHandler for LoggingShaderErrorHandler {
    fn handle_compile_error(&self, source: &str, errors: &str) {
        report(source, errors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_numbered_source() {
        let text = numbered_source("fn a() {}\n\nfn b() {}");
        assert_eq!(text, "   1\tfn a() {}\n   2\t\n   3\tfn b() {}\n");
    }

    #[test]
    fn test_closure_handler() {
        let seen = Mutex::new(Vec::new());
        let handler = |_source: &str, errors: &str| seen.lock().unwrap().push(errors.to_string());
        handler.handle_compile_error("src", "bad token");
        assert_eq!(seen.lock().unwrap().as_slice(), ["bad token"]);
    }

    #[test]
    fn test_logging_handler_does_not_panic() {
        LoggingShaderErrorHandler.handle_compile_error("x", "y");
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "shader compilation failed")]
    fn test_default_handler_asserts_in_debug() {
        DefaultShaderErrorHandler.handle_compile_error("x", "y");
    }
}
