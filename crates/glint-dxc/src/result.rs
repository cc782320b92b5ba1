//! Compilation outcome record
//!
//! A [`CompilationResult`] is immutable once constructed and owns its data
//! outright: the bytecode is copied out of the native blob before that blob
//! is released, so the result has no lifetime tie to the engine call that
//! produced it. Release is `Drop`; use-after-free is unrepresentable.

/// Outcome of a single compile invocation.
#[derive(Debug)]
pub struct CompilationResult {
    outcome: Outcome,
}

#[derive(Debug)]
enum Outcome {
    Success { bytecode: Vec<u8> },
    Failure { message: String },
}

impl CompilationResult {
    /// Wrap a successful compile's bytecode.
    pub fn success(bytecode: Vec<u8>) -> Self {
        CompilationResult {
            outcome: Outcome::Success { bytecode },
        }
    }

    /// Wrap a rejected compile's diagnostic text.
    pub fn failure(message: String) -> Self {
        CompilationResult {
            outcome: Outcome::Failure { message },
        }
    }

    /// Whether the compile produced bytecode.
    pub fn is_successful(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    /// Diagnostic text; `Some` exactly when the compile failed.
    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::Failure { message } => Some(message),
        }
    }

    /// Compiled bytecode; empty exactly when the compile failed.
    pub fn bytecode(&self) -> &[u8] {
        match &self.outcome {
            Outcome::Success { bytecode } => bytecode,
            Outcome::Failure { .. } => &[],
        }
    }
}
